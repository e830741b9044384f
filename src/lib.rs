//! Compiles weighted and probabilistic logic programs (plingo, LP^MLN,
//! ProbLog and P-Log style) into plain programs with weak constraints,
//! enumerates models by optimality and turns their costs into probabilities.

pub mod app;
pub mod compiler;
pub mod config;
mod error;
pub use error::{Error, Result};
pub mod lang;
pub mod probability;
pub mod query;
pub mod solver;

pub use app::{Plingo, Report};
pub use config::Configuration;
