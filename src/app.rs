//! End-to-end pipeline: compile, ground, solve and aggregate.

use std::fmt::{self, Display, Formatter};

use itertools::Itertools;
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    compiler::{self, meta},
    config::{Configuration, Frontend},
    lang::{self, Program, Symbol},
    probability::{compute_probabilities, ProbabilityReport},
    query::{collect_queries, QueryEntry},
    solver::{Engine, EnumerationStats, MinimizeObserver, OptEnum, OptMode, SolveConfig},
    Result,
};

/// Everything a run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    /// Compiled program, set in ProbLog-export mode where nothing is solved.
    pub program: Option<String>,
    /// Atoms of the best model of a plain optimizing search.
    pub answer: Option<Vec<String>>,
    /// Cost vectors of the recorded models.
    pub costs: Vec<Vec<i64>>,
    pub priorities: Vec<i32>,
    pub probabilities: Option<ProbabilityReport>,
    pub stats: Option<EnumerationStats>,
    pub interrupted: bool,
    #[serde(skip)]
    display_all: bool,
}

impl Display for Report {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(program) = &self.program {
            return write!(f, "{}", program);
        }
        if let Some(answer) = &self.answer {
            writeln!(f, "Answer: {}", answer.iter().join(" "))?;
        }
        let Some(probabilities) = &self.probabilities else {
            return Ok(());
        };
        if self.display_all {
            for &i in &probabilities.stable_models {
                if let Some(p) = probabilities.model_probabilities.get(i) {
                    writeln!(f, "Probability of Answer {}: {:.5}", i + 1, p)?;
                }
            }
        }
        for query in &probabilities.queries {
            match &query.probability {
                Ok(p) => writeln!(f, "{}: {:.5}", query.query, p)?,
                Err(e) => writeln!(f, "{}: undefined ({})", query.query, e)?,
            }
        }
        Ok(())
    }
}

pub struct Plingo {
    config: Configuration,
}

impl Plingo {
    pub fn new(config: Configuration) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Parses `source` together with the configured queries and evidence and
    /// compiles the result.
    pub fn compile(&self, source: &str) -> Result<Program> {
        let mut program = lang::parse(source)?;
        for query in &self.config.queries {
            program.extend(lang::parse(&format!("&query({}).", query))?.statements);
        }
        let mut compiled = compiler::compile(&program, &self.config)?;

        if let Some(evidence) = &self.config.evidence {
            // Evidence is never weighted, so it is compiled without lpmln
            // translation of its constraints.
            let config = Configuration {
                frontend: Frontend::Plingo,
                ..self.config.clone()
            };
            let evidence = compiler::compile(&lang::parse(evidence)?, &config)?;
            let new: Vec<_> = evidence
                .statements
                .into_iter()
                .filter(|s| !compiled.statements.contains(s))
                .collect();
            compiled.extend(new);
        }
        Ok(compiled)
    }

    pub fn run(&self, source: &str, engine: &mut dyn Engine) -> Result<Report> {
        self.config.validate()?;
        let program = self.compile(source)?;
        if self.config.problog_export {
            return Ok(Report {
                program: Some(program.to_string()),
                ..Default::default()
            });
        }

        if self.config.frontend == Frontend::Plog {
            for (name, function) in meta::script_functions() {
                engine.register_function(name, function)?;
            }
        }
        engine.add(&program)?;
        let mut observer = MinimizeObserver::new(self.config.opt_enum);
        engine.ground(&mut observer)?;
        let queries = collect_queries(&engine.theory_atoms(), &self.config)?;
        debug!("{} queries, priorities {:?}", queries.len(), observer.priorities());

        let recorded = if self.config.opt_enum {
            if self.config.two_phase {
                engine.assign_external(&Symbol::constant(meta::EXT_HELPER), true)?;
            }
            let enumeration = OptEnum::new(queries, self.config.balanced, self.config.use_backend)
                .run(engine, &observer, self.config.model_limit())?;
            Recorded {
                costs: enumeration.costs,
                priorities: enumeration.priorities,
                queries: enumeration.queries,
                answer: None,
                stats: Some(enumeration.stats),
                interrupted: enumeration.interrupted,
            }
        } else {
            self.solve_classic(engine, &observer, queries)?
        };

        let probabilities = if recorded.costs.is_empty() {
            None
        } else if !recorded.priorities.contains(&0) {
            warn!("no soft weights in program, cannot compute probabilities");
            None
        } else {
            Some(compute_probabilities(
                &recorded.costs,
                &recorded.priorities,
                &recorded.queries,
                &self.config,
            )?)
        };
        Ok(Report {
            program: None,
            answer: recorded.answer,
            costs: recorded.costs,
            priorities: recorded.priorities,
            probabilities,
            stats: recorded.stats,
            interrupted: recorded.interrupted,
            display_all: self.config.display_all,
        })
    }

    /// Solves without optimal enumeration. In two-phase mode, a first search
    /// with soft rules switched off finds the best hard cost, which then
    /// bounds the second one. Costs are only recorded when probabilities are
    /// requested.
    fn solve_classic(
        &self,
        engine: &mut dyn Engine,
        observer: &MinimizeObserver,
        mut queries: Vec<QueryEntry>,
    ) -> Result<Recorded> {
        let mut hard_bound = None;
        if self.config.two_phase {
            let helper = Symbol::constant(meta::EXT_HELPER);
            // Without a hard level the first phase has nothing to bound.
            if observer.priorities_desc().len() > 1 {
                engine.assign_external(&helper, false)?;
                let optimize = SolveConfig {
                    opt_mode: OptMode::Optimize,
                    models: 0,
                };
                for model in engine.solve(&optimize, &[])? {
                    hard_bound = model.cost.first().copied();
                }
                info!("best hard cost: {:?}", hard_bound);
            }
            engine.assign_external(&helper, true)?;
        }

        let record = self.config.display_all || !queries.is_empty();
        let solve_config = if record {
            SolveConfig {
                opt_mode: OptMode::Enumerate {
                    bound: hard_bound.into_iter().collect(),
                },
                models: 0,
            }
        } else {
            SolveConfig {
                opt_mode: OptMode::Optimize,
                models: 0,
            }
        };

        let mut costs = Vec::new();
        let mut best = None;
        let mut handle = engine.solve(&solve_config, &[])?;
        while let Some(model) = handle.next() {
            if record {
                queries.iter_mut().for_each(|q| q.record(&model, costs.len()));
                costs.push(model.cost.clone());
            }
            best = Some(model);
        }
        let interrupted = handle.outcome().interrupted;

        let answer = best.filter(|_| !record).map(|model| {
            model
                .atoms
                .iter()
                .filter(|s| !s.name().is_some_and(|n| n.starts_with("_plingo")))
                .map(|s| s.to_string())
                .collect()
        });
        Ok(Recorded {
            costs,
            priorities: observer.priorities_desc(),
            queries,
            answer,
            stats: None,
            interrupted,
        })
    }
}

/// Models recorded by either solving path.
struct Recorded {
    costs: Vec<Vec<i64>>,
    priorities: Vec<i32>,
    queries: Vec<QueryEntry>,
    answer: Option<Vec<String>>,
    stats: Option<EnumerationStats>,
    interrupted: bool,
}
