use thiserror::Error;

use crate::lang::{ast::AstBuildError, parser::ParseError};

#[derive(Error, Debug)]
pub enum LangError {
    #[error("Parsing failed: {0}")]
    Parse(Box<ParseError>),

    #[error("AST construction failed: {0}")]
    Ast(Box<AstBuildError>),
}

// `?` needs to convert the unboxed errors into the boxed variants.

impl From<ParseError> for LangError {
    fn from(err: ParseError) -> Self {
        LangError::Parse(Box::new(err))
    }
}

impl From<AstBuildError> for LangError {
    fn from(err: AstBuildError) -> Self {
        LangError::Ast(Box::new(err))
    }
}
