//! Surface syntax of weighted and probabilistic logic programs.
//!
//! - [`parse`]: program text to a [`Program`].
//! - [`parse_term`]: a single term, used for queries given as options.
//! - [`PrettyPrint`] / `Display`: the way back to text.
//!
pub mod ast;
pub mod error;
pub mod parser;
pub mod pretty_print;

pub use ast::{
    AggregateElement, AggregateFunction, Atom, BodyElement, ChoiceAggregate, ChoiceElement,
    Comparator, Guard, Head, Literal, Program, Rule, SetAggregate, Sign, Signature, Statement,
    Symbol, Term, TheoryAtom, TheoryElement, TheoryKind, WeakConstraint,
};
pub use error::LangError;
pub use parser::{ParseError, PlingoParser};
pub use pretty_print::PrettyPrint;

/// Parses a full program.
pub fn parse(source: &str) -> Result<Program, LangError> {
    let pairs = parser::parse_program_pairs(source)?;
    Ok(ast::build_program(pairs)?)
}

/// Parses a single term such as `alarm` or `h(d1, (x, y))`.
pub fn parse_term(source: &str) -> Result<Term, LangError> {
    let mut pairs = parser::parse_term_pairs(source)?;
    let pair = pairs
        .next()
        .ok_or_else(|| ast::AstBuildError::Internal("empty term input".to_string()))?;
    Ok(ast::build_term(pair)?)
}
