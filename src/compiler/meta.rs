//! Fixed program texts attached to compiled programs, and the script
//! functions the P-Log encoding calls during grounding.

use crate::{lang::Symbol, solver::ScriptFunction};

pub const EXT_HELPER: &str = "_plingo_ext_helper";
pub const RANDOM: &str = "_plingo_random";
pub const PR: &str = "_plingo_pr";
pub const OBS: &str = "_plingo_obs";
pub const DO: &str = "_plingo_do";
pub const HOLDS: &str = "_plingo_h";
pub const FACTOR: &str = "_plingo_factor";

/// Theory declaration for the atoms left to the engine.
pub const THEORY: &str = "\
#theory plingo {
    constant { };
    &query/1: constant, head;
    &query/2: constant, head
}.";

/// `10^precision`, the fixed-point representation of probability 1.
pub const ONE: &str = "_plingo_one";

/// P-Log semantics over the relations emitted by
/// [`crate::compiler::plog::PlogConverter`].
///
/// Explicit probabilities are fixed-point integers scaled by `_plingo_one`.
/// The costs are `-log` of the outcome probability, scaled the same way, so
/// that `exp(-cost)` of a model is its probability. Outcomes without an
/// explicit probability share what is left of `_plingo_one`; if nothing is
/// left they are impossible, and explicit probabilities above 1 leave no
/// model at all.
pub const PLOG_META: &str = "\
_plingo_intervened(E) :- _plingo_random(E,A), _plingo_do(A).
_plingo_h(A) :- _plingo_do(A).
_plingo_label(E) :- _plingo_random(E,A).
1 { _plingo_h(A) : _plingo_random(E,A) } 1 :- _plingo_label(E), not _plingo_intervened(E).
:- _plingo_obs(A,true), not _plingo_h(A).
:- _plingo_obs(A,false), _plingo_h(A).
_plingo_explicit(E,A,P) :- _plingo_pr(E,A,P), _plingo_random(E,A).
_plingo_has_pr(E,A) :- _plingo_explicit(E,A,P).
_plingo_mass(E,S) :- _plingo_label(E), S = #sum { P,A : _plingo_explicit(E,A,P) }.
_plingo_defaults(E,M) :- _plingo_label(E), M = #count { A : _plingo_random(E,A), not _plingo_has_pr(E,A) }.
:- _plingo_mass(E,S), S > _plingo_one.
:- _plingo_h(A), _plingo_explicit(E,A,0), not _plingo_intervened(E).
:~ _plingo_h(A), _plingo_explicit(E,A,P), P > 0, not _plingo_intervened(E). [@plingo_log(P,_plingo_factor)@0,pr,E,A]
:~ _plingo_h(A), _plingo_random(E,A), not _plingo_has_pr(E,A), not _plingo_intervened(E), _plingo_mass(E,S), _plingo_defaults(E,M), S < _plingo_one. [@plingo_residual(S,M,_plingo_factor)@0,default,E,A]
:- _plingo_h(A), _plingo_random(E,A), not _plingo_has_pr(E,A), not _plingo_intervened(E), _plingo_mass(E,S), S >= _plingo_one.";

/// The functions [`PLOG_META`] calls, by name.
pub fn script_functions() -> [(&'static str, ScriptFunction); 2] {
    [
        ("plingo_log", log_script as ScriptFunction),
        ("plingo_residual", residual_script as ScriptFunction),
    ]
}

fn log_script(args: &[Symbol]) -> Option<Symbol> {
    match args {
        [Symbol::Number(p), Symbol::Number(factor)] => {
            plingo_log(*p, *factor).map(Symbol::Number)
        }
        _ => None,
    }
}

fn residual_script(args: &[Symbol]) -> Option<Symbol> {
    match args {
        [Symbol::Number(sum), Symbol::Number(defaults), Symbol::Number(factor)] => {
            plingo_residual(*sum, *defaults, *factor).map(Symbol::Number)
        }
        _ => None,
    }
}

fn scale(factor: i64) -> Option<f64> {
    let factor = i32::try_from(factor).ok().filter(|f| (0..=15).contains(f))?;
    Some(10f64.powi(factor))
}

/// `round(-ln(P / 10^factor) * 10^factor)` for a fixed-point probability `P`.
pub fn plingo_log(probability: i64, factor: i64) -> Option<i64> {
    let scale = scale(factor)?;
    if probability <= 0 || probability as f64 > scale {
        return None;
    }
    Some((-(probability as f64 / scale).ln() * scale).round() as i64)
}

/// Cost of one of `defaults` outcomes sharing the mass left over by the
/// explicit probabilities summing to `sum` (both fixed-point).
pub fn plingo_residual(sum: i64, defaults: i64, factor: i64) -> Option<i64> {
    let scale = scale(factor)?;
    if defaults <= 0 || sum < 0 || sum as f64 >= scale {
        return None;
    }
    let share = (1.0 - sum as f64 / scale) / defaults as f64;
    Some((-share.ln() * scale).round() as i64)
}
