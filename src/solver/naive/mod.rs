//! A small reference engine for the compiled programs.
//!
//! Grounding is a bottom-up instantiation over the atoms that can possibly be
//! derived (see [`grounder`]). Search guesses the atoms that occur in choice
//! heads or under negation, and keeps a guess when the least model of the
//! reduct agrees with it. This is exponential in the number of guessed atoms
//! and is meant for small programs and tests, not as a production solver.

mod grounder;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use anyhow::anyhow;
use itertools::Itertools;
use log::{debug, trace};

use crate::{
    lang::{Program, Statement, Symbol},
    solver::{
        AtomId, Backend, Engine, EngineError, GroundTheoryAtom, Lit, Model, Observer, OptMode,
        ScriptFunction, SolveConfig, SolveHandle, SolveOutcome, Statistics, WeightedLiteral,
    },
};

/// Guessed atoms beyond this are refused.
pub const MAX_GUESSED_ATOMS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NormalRule {
    pub head: Vec<AtomId>,
    pub body: Vec<Lit>,
    pub choice: bool,
}

/// `head :- lower <= #sum { w : l }` with all weights positive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WeightRule {
    pub head: Vec<AtomId>,
    pub lower: i64,
    pub body: Vec<WeightedLiteral>,
    pub choice: bool,
}

/// Ground rules over interned atoms. Atom `n` is stored at index `n - 1`;
/// auxiliary atoms have no symbol and never show up in models.
#[derive(Debug, Default)]
pub struct GroundProgram {
    symbols: Vec<Option<Symbol>>,
    index: HashMap<Symbol, AtomId>,
    pub(crate) rules: Vec<NormalRule>,
    pub(crate) weight_rules: Vec<WeightRule>,
}

impl GroundProgram {
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Interns `symbol`.
    pub fn atom(&mut self, symbol: &Symbol) -> AtomId {
        if let Some(id) = self.index.get(symbol) {
            return *id;
        }
        self.add_atom(Some(symbol))
    }

    pub fn lookup(&self, symbol: &Symbol) -> Option<AtomId> {
        self.index.get(symbol).copied()
    }

    pub fn symbol(&self, atom: AtomId) -> Option<&Symbol> {
        self.symbols
            .get((atom as usize).checked_sub(1)?)
            .and_then(Option::as_ref)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().flatten()
    }

    fn check_atom(&self, atom: AtomId) -> Result<(), EngineError> {
        if atom == 0 || atom as usize > self.symbols.len() {
            return Err(anyhow!("unknown atom id {}", atom).into());
        }
        Ok(())
    }

    fn check_literal(&self, lit: Lit) -> Result<(), EngineError> {
        self.check_atom(lit.unsigned_abs())
    }
}

impl Backend for GroundProgram {
    fn add_atom(&mut self, symbol: Option<&Symbol>) -> AtomId {
        self.symbols.push(symbol.cloned());
        let id = self.symbols.len() as AtomId;
        if let Some(symbol) = symbol {
            self.index.insert(symbol.clone(), id);
        }
        id
    }

    fn add_rule(&mut self, head: &[AtomId], body: &[Lit], choice: bool) -> Result<(), EngineError> {
        if head.len() > 1 && !choice {
            return Err(EngineError::Unsupported("disjunctive rule".to_string()));
        }
        head.iter().try_for_each(|a| self.check_atom(*a))?;
        body.iter().try_for_each(|l| self.check_literal(*l))?;
        self.rules.push(NormalRule {
            head: head.to_vec(),
            body: body.to_vec(),
            choice,
        });
        Ok(())
    }

    fn add_weight_rule(
        &mut self,
        head: &[AtomId],
        lower: i64,
        body: &[WeightedLiteral],
        choice: bool,
    ) -> Result<(), EngineError> {
        if head.len() > 1 && !choice {
            return Err(EngineError::Unsupported("disjunctive rule".to_string()));
        }
        head.iter().try_for_each(|a| self.check_atom(*a))?;
        let mut lower = lower;
        let mut normalized = Vec::with_capacity(body.len());
        for &(lit, weight) in body {
            self.check_literal(lit)?;
            // w*[l] == w + (-w)*[not l]
            match weight {
                0 => {}
                w if w > 0 => normalized.push((lit, w)),
                w => {
                    lower -= w;
                    normalized.push((-lit, -w));
                }
            }
        }
        self.weight_rules.push(WeightRule {
            head: head.to_vec(),
            lower,
            body: normalized,
            choice,
        });
        Ok(())
    }
}

/// Reference [`Engine`] for small ground or groundable programs.
#[derive(Debug, Default)]
pub struct NaiveEngine {
    pending: Vec<Statement>,
    functions: HashMap<String, ScriptFunction>,
    ground: GroundProgram,
    externals: BTreeMap<AtomId, bool>,
    theory_atoms: Vec<GroundTheoryAtom>,
    minimize: BTreeMap<i32, Vec<WeightedLiteral>>,
    statistics: Statistics,
    model_budget: Option<usize>,
}

impl NaiveEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops the search after `models` reported models over the lifetime of
    /// the engine, as if the search had been interrupted.
    pub fn with_model_budget(mut self, models: usize) -> Self {
        self.model_budget = Some(models);
        self
    }

    pub fn ground_program(&self) -> &GroundProgram {
        &self.ground
    }

    /// Atoms guessed during search: choice heads and atoms occurring
    /// negatively in rules that derive something. Externals are fixed.
    fn guessed_atoms(&self) -> Vec<AtomId> {
        let mut guessed = BTreeSet::new();
        for rule in &self.ground.rules {
            if rule.choice {
                guessed.extend(rule.head.iter().copied());
            }
            if !rule.head.is_empty() {
                guessed.extend(rule.body.iter().filter(|l| **l < 0).map(|l| l.unsigned_abs()));
            }
        }
        for rule in &self.ground.weight_rules {
            if rule.choice {
                guessed.extend(rule.head.iter().copied());
            }
            if !rule.head.is_empty() {
                guessed.extend(
                    rule.body
                        .iter()
                        .filter(|(l, _)| *l < 0)
                        .map(|(l, _)| l.unsigned_abs()),
                );
            }
        }
        guessed
            .into_iter()
            .filter(|a| !self.externals.contains_key(a))
            .collect()
    }

    /// Least model of the reduct of the program wrt `assumed`.
    fn least_model(&self, assumed: &HashSet<AtomId>) -> HashSet<AtomId> {
        let negative_holds = |lit: Lit| lit > 0 || !assumed.contains(&lit.unsigned_abs());
        let mut model: HashSet<AtomId> = self
            .externals
            .iter()
            .filter(|(_, value)| **value)
            .map(|(atom, _)| *atom)
            .collect();

        loop {
            let mut changed = false;
            let mut derive = |head: &[AtomId], choice: bool, model: &mut HashSet<AtomId>| {
                for atom in head {
                    if (!choice || assumed.contains(atom)) && model.insert(*atom) {
                        changed = true;
                    }
                }
            };
            for rule in self.ground.rules.iter().filter(|r| !r.head.is_empty()) {
                let fires = rule.body.iter().all(|&l| {
                    if l > 0 {
                        model.contains(&(l as AtomId))
                    } else {
                        negative_holds(l)
                    }
                });
                if fires {
                    derive(&rule.head, rule.choice, &mut model);
                }
            }
            for rule in self.ground.weight_rules.iter().filter(|r| !r.head.is_empty()) {
                let sum: i64 = rule
                    .body
                    .iter()
                    .filter(|(l, _)| {
                        if *l > 0 {
                            model.contains(&(*l as AtomId))
                        } else {
                            negative_holds(*l)
                        }
                    })
                    .map(|(_, w)| w)
                    .sum();
                if sum >= rule.lower {
                    derive(&rule.head, rule.choice, &mut model);
                }
            }
            if !changed {
                return model;
            }
        }
    }

    fn violates_constraints(&self, model: &HashSet<AtomId>) -> bool {
        let holds = |l: Lit| model.contains(&l.unsigned_abs()) == (l > 0);
        let normal = self
            .ground
            .rules
            .iter()
            .filter(|r| r.head.is_empty() && !r.choice)
            .any(|r| r.body.iter().all(|l| holds(*l)));
        let weighted = self
            .ground
            .weight_rules
            .iter()
            .filter(|r| r.head.is_empty() && !r.choice)
            .any(|r| {
                r.body
                    .iter()
                    .filter(|(l, _)| holds(*l))
                    .map(|(_, w)| w)
                    .sum::<i64>()
                    >= r.lower
            });
        normal || weighted
    }

    fn stable_models(&self) -> Result<Vec<HashSet<AtomId>>, EngineError> {
        let guessed = self.guessed_atoms();
        if guessed.len() > MAX_GUESSED_ATOMS {
            return Err(EngineError::TooLarge {
                atoms: guessed.len(),
                limit: MAX_GUESSED_ATOMS,
            });
        }
        debug!(
            "Searching {} atoms, {} guessed, {} rules, {} weight rules",
            self.ground.len(),
            guessed.len(),
            self.ground.rules.len(),
            self.ground.weight_rules.len()
        );

        let fixed: Vec<(AtomId, bool)> = self.externals.iter().map(|(a, v)| (*a, *v)).collect();
        let mut models = Vec::new();
        for mask in 0u64..(1u64 << guessed.len()) {
            let mut assumed: HashSet<AtomId> = guessed
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, a)| *a)
                .collect();
            assumed.extend(fixed.iter().filter(|(_, v)| *v).map(|(a, _)| *a));

            let model = self.least_model(&assumed);
            let agrees = guessed
                .iter()
                .chain(fixed.iter().map(|(a, _)| a))
                .all(|a| model.contains(a) == assumed.contains(a));
            if agrees && !self.violates_constraints(&model) {
                trace!("Stable model for guess {:b}: {:?}", mask, model);
                models.push(model);
            }
        }
        Ok(models)
    }

    fn cost(&self, model: &HashSet<AtomId>) -> Vec<i64> {
        self.minimize
            .values()
            .rev()
            .map(|wlits| {
                wlits
                    .iter()
                    .filter(|(l, _)| model.contains(&l.unsigned_abs()) == (*l > 0))
                    .map(|(_, w)| w)
                    .sum()
            })
            .collect()
    }

    fn named_atoms(&self, model: &HashSet<AtomId>) -> BTreeSet<Symbol> {
        model
            .iter()
            .filter_map(|a| self.ground.symbol(*a))
            .cloned()
            .collect()
    }
}

impl Engine for NaiveEngine {
    fn add(&mut self, program: &Program) -> Result<(), EngineError> {
        self.pending.extend(program.statements.iter().cloned());
        Ok(())
    }

    fn register_function(
        &mut self,
        name: &str,
        function: ScriptFunction,
    ) -> Result<(), EngineError> {
        debug!("Registered script function @{}", name);
        self.functions.insert(name.to_string(), function);
        Ok(())
    }

    fn ground(&mut self, observer: &mut dyn Observer) -> Result<(), EngineError> {
        let statements = std::mem::take(&mut self.pending);
        let output =
            grounder::Grounder::new(&mut self.ground, &self.functions).ground(&statements)?;
        for atom in output.externals {
            self.externals.entry(atom).or_insert(false);
        }
        for atom in output.theory_atoms {
            if !self.theory_atoms.contains(&atom) {
                self.theory_atoms.push(atom);
            }
        }
        for (priority, wlits) in output.minimize {
            observer.minimize(priority, &wlits);
            self.minimize.entry(priority).or_default().extend(wlits);
        }
        debug!(
            "Grounded {} atoms, {} externals, {} theory atoms, priorities {:?}",
            self.ground.len(),
            self.externals.len(),
            self.theory_atoms.len(),
            self.minimize.keys().collect::<Vec<_>>()
        );
        Ok(())
    }

    fn theory_atoms(&self) -> Vec<GroundTheoryAtom> {
        self.theory_atoms.clone()
    }

    fn lookup(&self, symbol: &Symbol) -> Option<Lit> {
        self.ground.lookup(symbol).map(|a| a as Lit)
    }

    fn assign_external(&mut self, symbol: &Symbol, value: bool) -> Result<(), EngineError> {
        let atom = self
            .ground
            .lookup(symbol)
            .filter(|a| self.externals.contains_key(a))
            .ok_or_else(|| EngineError::UnknownAtom(symbol.clone()))?;
        self.externals.insert(atom, value);
        Ok(())
    }

    fn backend(&mut self) -> &mut dyn Backend {
        &mut self.ground
    }

    fn solve(
        &mut self,
        config: &SolveConfig,
        assumptions: &[(Symbol, bool)],
    ) -> Result<Box<dyn SolveHandle + '_>, EngineError> {
        self.statistics = Statistics::default();
        if self.model_budget == Some(0) {
            return Err(EngineError::Interrupted);
        }

        let mut candidates = Vec::new();
        for model in self.stable_models()? {
            let satisfies = assumptions.iter().all(|(symbol, value)| {
                match self.ground.lookup(symbol) {
                    Some(atom) => model.contains(&atom) == *value,
                    None => !*value,
                }
            });
            if satisfies {
                candidates.push(Candidate {
                    cost: self.cost(&model),
                    atoms: self.named_atoms(&model),
                });
            }
        }
        debug!(
            "{} candidate models under {} assumptions",
            candidates.len(),
            assumptions.len()
        );

        let has_objective = !self.minimize.is_empty();
        let phase = match (&config.opt_mode, has_objective) {
            (OptMode::Enumerate { bound }, _) => Phase::Enumerate {
                pos: 0,
                bound: bound.clone(),
            },
            (_, false) => Phase::Optimal {
                pos: 0,
                optimum: Vec::new(),
            },
            (_, true) => Phase::Improving { pos: 0, best: None },
        };
        Ok(Box::new(NaiveHandle {
            candidates,
            clauses: Vec::new(),
            phase,
            enumerate_optimal: config.opt_mode == OptMode::OptimalEnumeration,
            has_objective,
            limit: config.models,
            outcome: SolveOutcome::default(),
            statistics: &mut self.statistics,
            budget: &mut self.model_budget,
        }))
    }

    fn statistics(&self) -> &Statistics {
        &self.statistics
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    cost: Vec<i64>,
    atoms: BTreeSet<Symbol>,
}

#[derive(Debug, Clone)]
enum Phase {
    /// Strictly improving models.
    Improving { pos: usize, best: Option<Vec<i64>> },
    /// All models with cost `optimum`.
    Optimal { pos: usize, optimum: Vec<i64> },
    Enumerate { pos: usize, bound: Vec<i64> },
    Done,
}

struct NaiveHandle<'a> {
    candidates: Vec<Candidate>,
    clauses: Vec<Vec<(Symbol, bool)>>,
    phase: Phase,
    enumerate_optimal: bool,
    has_objective: bool,
    limit: usize,
    outcome: SolveOutcome,
    statistics: &'a mut Statistics,
    budget: &'a mut Option<usize>,
}

/// `cost <= bound`, comparing only the levels the bound covers.
fn within_bound(cost: &[i64], bound: &[i64]) -> bool {
    let n = bound.len().min(cost.len());
    cost[..n] <= bound[..n]
}

impl NaiveHandle<'_> {
    fn allowed(&self, candidate: &Candidate) -> bool {
        self.clauses.iter().all(|clause| {
            clause
                .iter()
                .any(|(symbol, value)| candidate.atoms.contains(symbol) == *value)
        })
    }

    fn find(&self, from: usize, accept: impl Fn(&Candidate) -> bool) -> Option<usize> {
        (from..self.candidates.len())
            .find(|i| self.allowed(&self.candidates[*i]) && accept(&self.candidates[*i]))
    }

    /// Next `(index, proven)` to report, advancing the phase.
    fn advance(&mut self) -> Option<(usize, bool)> {
        loop {
            match std::mem::replace(&mut self.phase, Phase::Done) {
                Phase::Improving { pos, best } => {
                    let better = |c: &Candidate| best.as_ref().map_or(true, |b| c.cost < *b);
                    match Self::find(self, pos, better) {
                        Some(i) => {
                            let cost = self.candidates[i].cost.clone();
                            let optimal = Self::find(self, 0, |c| c.cost < cost).is_none();
                            if !optimal {
                                self.phase = Phase::Improving {
                                    pos: i + 1,
                                    best: Some(cost),
                                };
                            } else if self.enumerate_optimal {
                                self.phase = Phase::Optimal {
                                    pos: 0,
                                    optimum: cost,
                                };
                            }
                            return Some((i, optimal && !self.enumerate_optimal));
                        }
                        None => match best {
                            Some(optimum) if self.enumerate_optimal => {
                                self.phase = Phase::Optimal { pos: 0, optimum };
                            }
                            _ => return None,
                        },
                    }
                }
                Phase::Optimal { pos, optimum } => {
                    let i = Self::find(self, pos, |c| !self.has_objective || c.cost == optimum)?;
                    self.phase = Phase::Optimal {
                        pos: i + 1,
                        optimum,
                    };
                    return Some((i, true));
                }
                Phase::Enumerate { pos, bound } => {
                    let i = Self::find(self, pos, |c| within_bound(&c.cost, &bound))?;
                    self.phase = Phase::Enumerate { pos: i + 1, bound };
                    return Some((i, false));
                }
                Phase::Done => return None,
            }
        }
    }
}

impl Iterator for NaiveHandle<'_> {
    type Item = Model;

    fn next(&mut self) -> Option<Model> {
        let reported = match self.phase {
            Phase::Optimal { .. } => Some(self.statistics.optimal_models),
            Phase::Enumerate { .. } => Some(self.statistics.models),
            Phase::Improving { .. } | Phase::Done => None,
        };
        if self.limit > 0 && reported.is_some_and(|n| n >= self.limit) {
            return None;
        }
        if *self.budget == Some(0) {
            self.outcome.interrupted = true;
            return None;
        }

        let (index, proven) = self.advance()?;
        let candidate = &self.candidates[index];
        if let Some(budget) = self.budget.as_mut() {
            *budget -= 1;
        }
        self.outcome.satisfiable = true;
        self.statistics.models += 1;
        if proven {
            self.statistics.optimal_models += 1;
        }
        if self.has_objective {
            let improves = self
                .statistics
                .costs
                .as_ref()
                .map_or(true, |best| candidate.cost < *best);
            if improves {
                self.statistics.costs = Some(candidate.cost.clone());
            }
        }
        trace!(
            "Model {}: cost {:?}, proven {}, {{{}}}",
            self.statistics.models,
            candidate.cost,
            proven,
            candidate.atoms.iter().join(" ")
        );
        Some(Model {
            number: self.statistics.models,
            cost: candidate.cost.clone(),
            optimality_proven: proven,
            atoms: candidate.atoms.clone(),
        })
    }
}

impl SolveHandle for NaiveHandle<'_> {
    fn add_clause(&mut self, clause: &[(Symbol, bool)]) -> Result<(), EngineError> {
        self.clauses.push(clause.to_vec());
        Ok(())
    }

    fn outcome(&self) -> SolveOutcome {
        self.outcome
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{lang::parse, solver::MinimizeObserver};

    fn setup() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn engine(source: &str) -> (NaiveEngine, MinimizeObserver) {
        let mut engine = NaiveEngine::new();
        let mut observer = MinimizeObserver::new(true);
        engine.add(&parse(source).unwrap()).unwrap();
        engine.ground(&mut observer).unwrap();
        (engine, observer)
    }

    fn atoms(model: &Model) -> Vec<String> {
        model.atoms.iter().map(|s| s.to_string()).collect()
    }

    fn enumerate_all(engine: &mut NaiveEngine) -> Vec<Model> {
        let config = SolveConfig {
            opt_mode: OptMode::Enumerate { bound: Vec::new() },
            models: 0,
        };
        engine.solve(&config, &[]).unwrap().collect()
    }

    #[test]
    fn test_stratified_program() {
        setup();
        let (mut engine, _) = engine(
            "edge(1,2). edge(2,3).
             path(X,Y) :- edge(X,Y).
             path(X,Z) :- path(X,Y), edge(Y,Z).
             start(X) :- edge(X,_Y), not target(X).
             target(Y) :- edge(_X,Y).",
        );
        let models = enumerate_all(&mut engine);
        assert_eq!(models.len(), 1);
        assert_eq!(
            atoms(&models[0]),
            vec![
                "edge(1,2)",
                "edge(2,3)",
                "path(1,2)",
                "path(1,3)",
                "path(2,3)",
                "start(1)",
                "target(2)",
                "target(3)",
            ]
        );
    }

    #[test]
    fn test_choice_and_negation() {
        setup();
        let (mut engine, _) = self::engine("{ a }. b :- not a. :- a, c. c :- b.");
        let models = enumerate_all(&mut engine);
        let found: Vec<Vec<String>> = models.iter().map(atoms).collect();
        assert_eq!(found, vec![vec!["b", "c"], vec!["a"]]);

        // even loop through negation
        let (mut engine, _) = self::engine("p :- not q. q :- not p.");
        assert_eq!(enumerate_all(&mut engine).len(), 2);
        // odd loop
        let (mut engine, _) = self::engine("p :- not p.");
        assert!(enumerate_all(&mut engine).is_empty());
    }

    #[test]
    fn test_bounded_choice_and_aggregates() {
        setup();
        let (mut engine, _) = self::engine("1 { a; b; c } 1.");
        let found: Vec<Vec<String>> = enumerate_all(&mut engine).iter().map(atoms).collect();
        assert_eq!(found, vec![vec!["a"], vec!["b"], vec!["c"]]);

        let (mut engine, _) = self::engine(
            "p(1). p(2). p(3).
             { q(X) : p(X) }.
             many :- 2 <= { q(X) : p(X) }.
             :- not many.",
        );
        let models = enumerate_all(&mut engine);
        // subsets of three with at least two elements
        assert_eq!(models.len(), 4);
        assert!(models.iter().all(|m| m.contains(&Symbol::constant("many"))));
    }

    #[test]
    fn test_weak_constraints_and_optimization() {
        setup();
        let (mut engine, observer) = self::engine(
            "{ a }. { b }.
             :~ not a. [100@0,0,()]
             :~ not b. [200@0,1,()]",
        );
        assert_eq!(observer.priorities_desc(), vec![0]);

        let mut costs: Vec<i64> = enumerate_all(&mut engine).iter().map(|m| m.cost[0]).collect();
        costs.sort();
        assert_eq!(costs, vec![0, 100, 200, 300]);

        let config = SolveConfig {
            opt_mode: OptMode::Optimize,
            models: 0,
        };
        let models: Vec<Model> = engine.solve(&config, &[]).unwrap().collect();
        let last = models.last().unwrap();
        assert_eq!(last.cost, vec![0]);
        assert!(last.optimality_proven);
        assert!(models[..models.len() - 1].iter().all(|m| !m.optimality_proven));
        assert_eq!(engine.statistics().costs, Some(vec![0]));
    }

    #[test]
    fn test_optimal_enumeration_reports_all_optima() {
        setup();
        let (mut engine, _) = self::engine(
            "{ a }. { b }.
             :~ a. [1@0,0,()]
             :~ b. [1@0,1,()]
             :- not a, not b.",
        );
        let config = SolveConfig {
            opt_mode: OptMode::OptimalEnumeration,
            models: 0,
        };
        let proven: Vec<Vec<String>> = engine
            .solve(&config, &[])
            .unwrap()
            .filter(|m| m.optimality_proven)
            .map(|m| atoms(&m))
            .collect();
        assert_eq!(proven, vec![vec!["a"], vec!["b"]]);
        assert_eq!(engine.statistics().optimal_models, 2);
        assert_eq!(engine.statistics().costs, Some(vec![1]));
    }

    #[test]
    fn test_weak_constraint_tuples_count_once() {
        setup();
        let (mut engine, observer) = self::engine(
            "a. b.
             :~ a. [5@1,t]
             :~ b. [5@1,t]
             :~ b. [3@0,u]",
        );
        assert_eq!(observer.priorities_desc(), vec![1, 0]);
        let models = enumerate_all(&mut engine);
        assert_eq!(models[0].cost, vec![5, 3]);
    }

    #[test]
    fn test_externals_and_assumptions() {
        setup();
        let (mut engine, _) = self::engine("#external e. a :- e. { b }.");
        let e = Symbol::constant("e");
        let b = Symbol::constant("b");
        assert_eq!(enumerate_all(&mut engine).len(), 2);
        assert!(enumerate_all(&mut engine)
            .iter()
            .all(|m| !m.contains(&Symbol::constant("a"))));

        engine.assign_external(&e, true).unwrap();
        let models = enumerate_all(&mut engine);
        assert!(models.iter().all(|m| m.contains(&Symbol::constant("a"))));

        let config = SolveConfig {
            opt_mode: OptMode::Enumerate { bound: Vec::new() },
            models: 0,
        };
        let models: Vec<Model> = engine.solve(&config, &[(b.clone(), true)]).unwrap().collect();
        assert_eq!(models.len(), 1);
        assert!(models[0].contains(&b));

        assert!(matches!(
            engine.assign_external(&b, true),
            Err(EngineError::UnknownAtom(_))
        ));
    }

    #[test]
    fn test_clauses_restrict_running_search() {
        setup();
        let (mut engine, _) = self::engine("{ a }. { b }.");
        let config = SolveConfig {
            opt_mode: OptMode::Enumerate { bound: Vec::new() },
            models: 0,
        };
        let mut handle = engine.solve(&config, &[]).unwrap();
        let first = handle.next().unwrap();
        assert!(first.atoms.is_empty());
        handle
            .add_clause(&[(Symbol::constant("a"), false)])
            .unwrap();
        let rest: Vec<Vec<String>> = handle.map(|m| atoms(&m)).collect();
        assert_eq!(rest, vec![vec!["b"]]);
    }

    #[test]
    fn test_theory_atoms_and_consts() {
        setup();
        let (engine, _) = self::engine(
            "#const n = 2.
             p(n).
             &query(a).
             &query(p(X), b) :- p(X).",
        );
        assert!(engine
            .ground_program()
            .lookup(&Symbol::function("p", vec![Symbol::Number(2)]))
            .is_some());
        assert_eq!(
            engine.theory_atoms(),
            vec![
                GroundTheoryAtom {
                    name: "query".to_string(),
                    arguments: vec![Symbol::constant("a")],
                },
                GroundTheoryAtom {
                    name: "query".to_string(),
                    arguments: vec![
                        Symbol::function("p", vec![Symbol::Number(2)]),
                        Symbol::constant("b"),
                    ],
                },
            ]
        );
    }

    #[test]
    fn test_unsafe_and_unsupported_input() {
        setup();
        let mut engine = NaiveEngine::new();
        engine.add(&parse("p(X) :- not q(X).").unwrap()).unwrap();
        assert!(matches!(
            engine.ground(&mut MinimizeObserver::new(false)),
            Err(EngineError::NonGround(_))
        ));

        let mut engine = NaiveEngine::new();
        let program = Program::new(vec![Statement::Raw("#script (python) #end.".to_string())]);
        engine.add(&program).unwrap();
        assert!(matches!(
            engine.ground(&mut MinimizeObserver::new(false)),
            Err(EngineError::Unsupported(_))
        ));
    }

    #[test]
    fn test_model_budget_interrupts() {
        setup();
        let mut engine = NaiveEngine::new().with_model_budget(1);
        engine.add(&parse("{ a }.").unwrap()).unwrap();
        engine.ground(&mut MinimizeObserver::new(false)).unwrap();
        let config = SolveConfig {
            opt_mode: OptMode::Enumerate { bound: Vec::new() },
            models: 0,
        };
        {
            let mut handle = engine.solve(&config, &[]).unwrap();
            assert!(handle.next().is_some());
            assert!(handle.next().is_none());
            assert!(handle.outcome().interrupted);
        }
        assert!(matches!(
            engine.solve(&config, &[]),
            Err(EngineError::Interrupted)
        ));
    }

    #[test]
    fn test_backend_rules_apply_to_next_solve() {
        setup();
        let (mut engine, _) = self::engine("{ a }. { b }.");
        let a = engine.lookup(&Symbol::constant("a")).unwrap();
        engine.backend().add_rule(&[], &[-a], false).unwrap();
        let models = enumerate_all(&mut engine);
        assert_eq!(models.len(), 2);
        assert!(models.iter().all(|m| m.contains(&Symbol::constant("a"))));

        assert!(engine.backend().add_rule(&[], &[999], false).is_err());
    }
}
