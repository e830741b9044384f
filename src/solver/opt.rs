//! Optimal model enumeration.
//!
//! Each round asks the engine for all optimal models under the current bound,
//! then forbids every cost vector up to the optimum found, so the next round
//! finds the next best models. In balanced mode the rounds are steered so
//! that at most `N` models contain the query and at most `N` do not.

use log::{debug, info};
use serde::Serialize;

use crate::{
    config::Configuration,
    lang::{Program, Symbol},
    query::{collect_queries, QueryEntry},
    solver::{
        bounds::AuxAtomCache, Engine, EngineError, Lit, MinimizeObserver, Model, OptMode,
        SolveConfig, SolveHandle, SolveOutcome,
    },
};

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnumerationStats {
    /// Models with proven optimality, i.e. the recorded ones.
    pub proven: usize,
    /// Models reported while the optimum was still being searched for.
    pub intermediate: usize,
    /// Recorded models containing the first query, if there is one.
    pub containing_query: Option<usize>,
}

/// Result of an enumeration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumeration {
    /// Cost vector of each recorded model, in discovery order.
    pub costs: Vec<Vec<i64>>,
    /// Priorities of the cost entries, most significant first.
    pub priorities: Vec<i32>,
    pub queries: Vec<QueryEntry>,
    pub stats: EnumerationStats,
    /// The engine stopped early; the result holds what was found until then.
    pub interrupted: bool,
}

pub struct OptEnum {
    cache: AuxAtomCache,
    proven: usize,
    intermediate: usize,
    costs: Vec<Vec<i64>>,
    queries: Vec<QueryEntry>,
    balanced: Option<usize>,
    /// Set once `N` models with (`true`) or without (`false`) the query were
    /// recorded.
    reached_max: Option<bool>,
    assumptions: Vec<(Symbol, bool)>,
    use_backend: bool,
}

impl OptEnum {
    pub fn new(queries: Vec<QueryEntry>, balanced: Option<usize>, use_backend: bool) -> Self {
        Self {
            cache: AuxAtomCache::new(),
            proven: 0,
            intermediate: 0,
            costs: Vec::new(),
            queries,
            balanced,
            reached_max: None,
            assumptions: Vec::new(),
            use_backend,
        }
    }

    pub fn cache(&self) -> &AuxAtomCache {
        &self.cache
    }

    pub fn assumptions(&self) -> &[(Symbol, bool)] {
        &self.assumptions
    }

    /// Runs rounds until the engine finds no more models, is interrupted, or
    /// `models` optimal models were recorded (0 for no limit).
    pub fn run(
        &mut self,
        engine: &mut dyn Engine,
        observer: &MinimizeObserver,
        models: usize,
    ) -> Result<Enumeration, EngineError> {
        let levels = observer.levels();
        let mut quota = models;

        let query_literal = match (&self.balanced, self.use_backend, self.queries.first()) {
            (Some(_), true, Some(query)) => Some(
                engine
                    .lookup(&query.target)
                    .ok_or_else(|| EngineError::UnknownAtom(query.target.clone()))?,
            ),
            _ => None,
        };

        let mut round = 0;
        let mut outcome = match self.search(engine, quota) {
            Ok(outcome) => outcome,
            Err(EngineError::Interrupted) => return Ok(self.finish(observer, true)),
            Err(e) => return Err(e),
        };
        while outcome.satisfiable && !outcome.interrupted && !levels.is_empty() {
            let Some(bound) = engine.statistics().costs.clone() else {
                break;
            };
            if quota > 0 {
                let found = engine.statistics().optimal_models;
                if found >= quota {
                    break;
                }
                quota -= found;
            }

            debug!("Round {}: forbidding costs up to {:?}", round, bound);
            self.cache.forbid_up_to(engine.backend(), &levels, &bound)?;
            if let (Some(literal), Some(reached)) = (query_literal, self.reached_max) {
                if self.use_backend {
                    steer(engine, literal, reached)?;
                    self.use_backend = false;
                }
            }

            round += 1;
            outcome = match self.search(engine, quota) {
                Ok(outcome) => outcome,
                Err(EngineError::Interrupted) => return Ok(self.finish(observer, true)),
                Err(e) => return Err(e),
            };
        }
        Ok(self.finish(observer, outcome.interrupted))
    }

    fn search(&mut self, engine: &mut dyn Engine, quota: usize) -> Result<SolveOutcome, EngineError> {
        let config = SolveConfig {
            opt_mode: OptMode::OptimalEnumeration,
            models: quota,
        };
        let mut handle = engine.solve(&config, &self.assumptions)?;
        while let Some(model) = handle.next() {
            self.on_model(&model, handle.as_mut())?;
        }
        Ok(handle.outcome())
    }

    fn on_model(&mut self, model: &Model, handle: &mut dyn SolveHandle) -> Result<(), EngineError> {
        if !model.optimality_proven {
            self.intermediate += 1;
            return Ok(());
        }
        let index = self.proven;
        self.costs.push(model.cost.clone());
        self.queries.iter_mut().for_each(|q| q.record(model, index));
        self.proven += 1;

        if self.balanced.is_some() && self.reached_max.is_none() {
            self.check_reached_max();
            if let (Some(reached), Some(query)) = (self.reached_max, self.queries.first()) {
                debug!(
                    "Balanced sample full on the {} side of {}",
                    if reached { "positive" } else { "negative" },
                    query.target
                );
                handle.add_clause(&[(query.target.clone(), !reached)])?;
            }
        }
        Ok(())
    }

    fn check_reached_max(&mut self) {
        let (Some(n), Some(query)) = (self.balanced, self.queries.first()) else {
            return;
        };
        let with = query.target_models.len();
        if with == n {
            self.reached_max = Some(true);
        }
        if self.costs.len() - with == n {
            self.reached_max = Some(false);
        }
        if let Some(reached) = self.reached_max {
            if !self.use_backend {
                self.assumptions.push((query.target.clone(), !reached));
            }
        }
    }

    fn finish(&mut self, observer: &MinimizeObserver, interrupted: bool) -> Enumeration {
        let stats = EnumerationStats {
            proven: self.proven,
            intermediate: self.intermediate,
            containing_query: self.queries.first().map(|q| q.target_models.len()),
        };
        info!(
            "Enumerated {} optimal models ({} intermediate{})",
            stats.proven,
            stats.intermediate,
            stats
                .containing_query
                .map(|n| format!(", {} containing the query", n))
                .unwrap_or_default()
        );
        if interrupted {
            info!("Search interrupted, returning the models found so far");
        }
        Enumeration {
            costs: std::mem::take(&mut self.costs),
            priorities: observer.priorities_desc(),
            queries: std::mem::take(&mut self.queries),
            stats,
            interrupted,
        }
    }
}

/// Permanently forbids the side of the query whose sample is full.
fn steer(engine: &mut dyn Engine, literal: Lit, reached: bool) -> Result<(), EngineError> {
    let body = if reached { literal } else { -literal };
    engine.backend().add_rule(&[], &[body], false)
}

/// Adds `program` to `engine`, grounds it and runs optimal enumeration.
pub fn enumerate(
    engine: &mut dyn Engine,
    program: &Program,
    config: &Configuration,
) -> crate::Result<Enumeration> {
    config.validate()?;
    let mut observer = MinimizeObserver::new(true);
    engine.add(program)?;
    engine.ground(&mut observer)?;
    let queries = collect_queries(&engine.theory_atoms(), config)?;
    let mut opt = OptEnum::new(queries, config.balanced, config.use_backend);
    Ok(opt.run(engine, &observer, config.model_limit())?)
}
