//! Contract with the grounding/search engine, plus the optimal-enumeration
//! controller built on top of it.
//!
//! The engine is external: anything implementing [`Engine`] can drive the
//! controller. [`naive::NaiveEngine`] is a small reference implementation for
//! ground programs.

pub mod bounds;
pub mod error;
pub mod naive;
pub mod observer;
pub mod opt;

use std::collections::BTreeSet;

pub use error::EngineError;
pub use observer::MinimizeObserver;
pub use opt::{enumerate, Enumeration, EnumerationStats, OptEnum};
use serde::{Deserialize, Serialize};

use crate::lang::{Program, Symbol};

/// Solver literal: a positive atom id, or its negation.
pub type Lit = i32;
pub type AtomId = u32;
pub type WeightedLiteral = (Lit, i64);

/// Called for `@name(args)` terms while grounding. `None` means the
/// arguments are outside the function's domain.
pub type ScriptFunction = fn(&[Symbol]) -> Option<Symbol>;

/// Receives the ground minimize statements while grounding.
pub trait Observer {
    fn minimize(&mut self, priority: i32, literals: &[WeightedLiteral]);
}

/// Adds ground rules to a running engine.
pub trait Backend {
    /// Fresh atom, optionally named.
    fn add_atom(&mut self, symbol: Option<&Symbol>) -> AtomId;
    /// An empty non-choice `head` is an integrity constraint.
    fn add_rule(&mut self, head: &[AtomId], body: &[Lit], choice: bool)
        -> Result<(), EngineError>;
    /// `head :- lower <= #sum { w : l }`.
    fn add_weight_rule(
        &mut self,
        head: &[AtomId],
        lower: i64,
        body: &[WeightedLiteral],
        choice: bool,
    ) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptMode {
    /// Report improving models until an optimum is found.
    Optimize,
    /// Find the optimum, then report all optimal models.
    OptimalEnumeration,
    /// Report every model whose cost is lexicographically at most `bound`.
    /// Missing bound entries are unbounded.
    Enumerate { bound: Vec<i64> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveConfig {
    pub opt_mode: OptMode,
    /// Number of models to report (optimal ones in optimal enumeration), 0
    /// for all.
    pub models: usize,
}

/// One model as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    /// 1-based position within its solve call.
    pub number: usize,
    /// Costs per priority level, most significant first.
    pub cost: Vec<i64>,
    pub optimality_proven: bool,
    pub atoms: BTreeSet<Symbol>,
}

impl Model {
    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.atoms.contains(symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SolveOutcome {
    pub satisfiable: bool,
    pub interrupted: bool,
}

/// A running search. Models are pulled one at a time; dropping the handle
/// ends the search.
pub trait SolveHandle: Iterator<Item = Model> {
    /// Adds `l1 | .. | ln` for the rest of this search, where `(a, true)` is
    /// the literal `a` and `(a, false)` is `not a`.
    fn add_clause(&mut self, clause: &[(Symbol, bool)]) -> Result<(), EngineError>;
    fn outcome(&self) -> SolveOutcome;
}

/// A ground theory atom left in the program, e.g. `&query(a)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroundTheoryAtom {
    pub name: String,
    pub arguments: Vec<Symbol>,
}

/// Statistics of the last solve call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Statistics {
    /// Best cost found, absent when the program has no minimize statement
    /// or no model was found.
    pub costs: Option<Vec<i64>>,
    pub models: usize,
    pub optimal_models: usize,
}

pub trait Engine {
    fn add(&mut self, program: &Program) -> Result<(), EngineError>;
    /// Makes `@name(..)` available to programs grounded afterwards.
    fn register_function(
        &mut self,
        name: &str,
        function: ScriptFunction,
    ) -> Result<(), EngineError>;
    fn ground(&mut self, observer: &mut dyn Observer) -> Result<(), EngineError>;
    fn theory_atoms(&self) -> Vec<GroundTheoryAtom>;
    fn lookup(&self, symbol: &Symbol) -> Option<Lit>;
    fn assign_external(&mut self, symbol: &Symbol, value: bool) -> Result<(), EngineError>;
    fn backend(&mut self) -> &mut dyn Backend;
    fn solve(
        &mut self,
        config: &SolveConfig,
        assumptions: &[(Symbol, bool)],
    ) -> Result<Box<dyn SolveHandle + '_>, EngineError>;
    fn statistics(&self) -> &Statistics;
}

/// `(priority, cost)` pairs, most significant (highest priority) first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostVector(Vec<(i32, i64)>);

impl CostVector {
    /// Pairs the engine's cost list with the priorities in descending order.
    pub fn new(priorities: &[i32], costs: &[i64]) -> Result<Self, EngineError> {
        if priorities.len() != costs.len() {
            return Err(EngineError::InconsistentCost {
                costs: costs.to_vec(),
                priorities: priorities.to_vec(),
            });
        }
        Ok(Self(
            priorities.iter().copied().zip(costs.iter().copied()).collect(),
        ))
    }

    pub fn entries(&self) -> &[(i32, i64)] {
        &self.0
    }

    /// Most significant cost.
    pub fn hard(&self) -> Option<i64> {
        self.0.first().map(|(_, c)| *c)
    }

    /// Least significant cost.
    pub fn soft(&self) -> Option<i64> {
        self.0.last().map(|(_, c)| *c)
    }

    pub fn cost_of(&self, priority: i32) -> Option<i64> {
        self.0.iter().find(|(p, _)| *p == priority).map(|(_, c)| *c)
    }
}
