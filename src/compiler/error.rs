use itertools::Itertools;
use thiserror::Error;

use crate::lang::TheoryKind;

/// A problem with one source rule.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("&pr atom without a probability guard in `{rule}`")]
    MissingGuard { rule: String },
    #[error("&{kind} atom must not have a body: `{rule}`")]
    UnexpectedBody { kind: TheoryKind, rule: String },
    #[error("&{kind} atom without an element in `{rule}`")]
    MissingElement { kind: TheoryKind, rule: String },
    #[error("malformed attribute `{term}` in `{rule}`: {reason}")]
    MalformedAttribute {
        term: String,
        rule: String,
        reason: String,
    },
    #[error("invalid weight `{value}` in `{rule}`: {reason}")]
    InvalidWeight {
        value: String,
        rule: String,
        reason: String,
    },
    #[error("invalid probability `{value}` in `{rule}`, expected a value in [0, 1]")]
    InvalidProbability { value: String, rule: String },
    #[error("unknown theory atom &{name} in `{rule}`")]
    UnknownTheoryAtom { name: String, rule: String },
    #[error("&{kind} atom is not allowed in the {position} of `{rule}`")]
    MisplacedTheoryAtom {
        kind: TheoryKind,
        position: &'static str,
        rule: String,
    },
    #[error("more than one theory atom in `{rule}`")]
    MultipleTheoryAtoms { rule: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompilerError {
    #[error("{} rule(s) failed to compile:\n{}", .0.len(), .0.iter().join("\n"))]
    Rules(Vec<CompileError>),
    /// Ground instances of a generated weak constraint could collapse.
    #[error("encoding invariant violated: {0}")]
    EncodingInvariantViolation(String),
}
