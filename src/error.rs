use crate::{
    compiler::CompilerError, config::ConfigError, lang::LangError, probability::ProbabilityError,
    solver::EngineError,
};

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Lang(#[from] LangError),
    #[error(transparent)]
    Compiler(#[from] CompilerError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Probability(#[from] ProbabilityError),
}
