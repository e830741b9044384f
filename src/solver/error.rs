use thiserror::Error;

use crate::lang::Symbol;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("program is not ground: {0}")]
    NonGround(String),
    #[error("unsupported input: {0}")]
    Unsupported(String),
    #[error("search space too large: {atoms} guessed atoms (limit {limit})")]
    TooLarge { atoms: usize, limit: usize },
    #[error("unknown script function @{0}")]
    UnknownFunction(String),
    #[error("@{name}({arguments}) has no value")]
    Script { name: String, arguments: String },
    #[error("unknown atom: {0}")]
    UnknownAtom(Symbol),
    #[error("cost vector {costs:?} does not match priorities {priorities:?}")]
    InconsistentCost {
        costs: Vec<i64>,
        priorities: Vec<i32>,
    },
    #[error("search interrupted")]
    Interrupted,
    #[error("engine error: {0}")]
    Backend(#[from] anyhow::Error),
}
