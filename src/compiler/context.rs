//! Per-rule state gathered before a rule is rewritten.

use crate::{
    compiler::error::CompileError,
    config::Configuration,
    lang::{BodyElement, Head, Rule, Symbol, Term, TheoryAtom, TheoryKind},
};

/// Weight of a rule after resolving its theory atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weight {
    /// No weight given; only translated in lpmln mode.
    Hard,
    /// Fixed-point soft weight.
    Soft(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Head,
    Body,
}

impl Position {
    fn as_str(self) -> &'static str {
        match self {
            Position::Head => "head",
            Position::Body => "body",
        }
    }
}

/// What the compiler needs to know about one source rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleContext {
    pub theory: Option<(TheoryKind, TheoryAtom, Position)>,
    /// Global variables in first-occurrence order, head before body.
    pub variables: Vec<String>,
    /// Source text, for error messages.
    pub text: String,
}

impl RuleContext {
    pub fn scan(rule: &Rule) -> Result<Self, CompileError> {
        let text = rule.to_string();
        let mut found = Vec::new();
        if let Head::Theory(atom) = &rule.head {
            found.push((atom, Position::Head));
        }
        found.extend(rule.body.iter().filter_map(|elem| match elem {
            BodyElement::Theory(atom) => Some((atom, Position::Body)),
            _ => None,
        }));
        if found.len() > 1 {
            return Err(CompileError::MultipleTheoryAtoms { rule: text });
        }

        let theory = match found.pop() {
            None => None,
            Some((atom, position)) => {
                let kind = atom
                    .kind()
                    .ok_or_else(|| CompileError::UnknownTheoryAtom {
                        name: atom.name.clone(),
                        rule: text.clone(),
                    })?;
                let expected = match kind {
                    TheoryKind::Weight | TheoryKind::Log | TheoryKind::Problog => Position::Body,
                    _ => Position::Head,
                };
                if position != expected {
                    return Err(CompileError::MisplacedTheoryAtom {
                        kind,
                        position: position.as_str(),
                        rule: text,
                    });
                }
                Some((kind, atom.clone(), position))
            }
        };

        let mut variables = Vec::new();
        rule.collect_variables(&mut variables);
        Ok(Self {
            theory,
            variables,
            text,
        })
    }

    pub fn kind(&self) -> Option<TheoryKind> {
        self.theory.as_ref().map(|(kind, _, _)| *kind)
    }

    /// Resolves `&weight`, `&log` and `&problog`; anything else is hard.
    pub fn weight(&self, config: &Configuration) -> Result<Weight, CompileError> {
        let Some((kind, atom, _)) = &self.theory else {
            return Ok(Weight::Hard);
        };
        let argument = match atom.arguments.as_slice() {
            [argument] => argument,
            _ => {
                return Err(CompileError::InvalidWeight {
                    value: atom.to_string(),
                    rule: self.text.clone(),
                    reason: "expected exactly one argument".to_string(),
                })
            }
        };
        let invalid = |reason: &str| CompileError::InvalidWeight {
            value: argument.to_string(),
            rule: self.text.clone(),
            reason: reason.to_string(),
        };
        let value = parse_numeric(argument).ok_or_else(|| invalid("not a number"))?;
        let weight = match kind {
            TheoryKind::Weight => value,
            TheoryKind::Log => {
                if value <= 0.0 {
                    return Err(invalid("logarithm of a non-positive value"));
                }
                value.ln()
            }
            TheoryKind::Problog => {
                if value <= 0.0 || value >= 1.0 {
                    return Err(invalid("ProbLog probabilities must lie strictly in (0, 1)"));
                }
                (value / (1.0 - value)).ln()
            }
            _ => return Ok(Weight::Hard),
        };
        if !weight.is_finite() {
            return Err(invalid("weight is not finite"));
        }
        Ok(Weight::Soft(config.fixed_point(weight)))
    }

    /// The rule body with the (single) theory atom removed.
    pub fn plain_body(rule: &Rule) -> Vec<BodyElement> {
        rule.body
            .iter()
            .filter(|elem| !matches!(elem, BodyElement::Theory(_)))
            .cloned()
            .collect()
    }
}

/// Reads a number given as an integer or as a string such as `"0.25"`,
/// `"-1.5"` or `"3/20"`.
pub fn parse_numeric(term: &Term) -> Option<f64> {
    match term {
        Term::Constant(Symbol::Number(n)) => Some(*n as f64),
        Term::Constant(Symbol::String(s)) => parse_numeric_str(s),
        _ => None,
    }
}

fn parse_numeric_str(s: &str) -> Option<f64> {
    let s = s.trim();
    if let Some((numerator, denominator)) = s.split_once('/') {
        let numerator: f64 = numerator.trim().parse().ok()?;
        let denominator: f64 = denominator.trim().parse().ok()?;
        if denominator == 0.0 {
            return None;
        }
        return Some(numerator / denominator);
    }
    s.parse().ok().filter(|v: &f64| v.is_finite())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::lang::parse;

    fn scan(src: &str) -> Result<RuleContext, CompileError> {
        let program = parse(src).unwrap();
        let context = RuleContext::scan(program.rules().next().unwrap());
        context
    }

    #[test]
    fn test_parse_numeric() {
        assert_eq!(parse_numeric(&Term::number(-2)), Some(-2.0));
        assert_eq!(parse_numeric(&Term::string("3/20")), Some(0.15));
        assert_eq!(parse_numeric(&Term::string(" 0.25 ")), Some(0.25));
        assert_eq!(parse_numeric(&Term::string("1/0")), None);
        assert_eq!(parse_numeric(&Term::string("abc")), None);
        assert_eq!(parse_numeric(&Term::constant("a")), None);
    }

    #[test]
    fn test_scan_weight() {
        let config = Configuration::default();
        let ctx = scan("a(X) :- b(X, Y), &weight(\"-1.5\").").unwrap();
        assert_eq!(ctx.kind(), Some(TheoryKind::Weight));
        assert_eq!(ctx.variables, vec!["X", "Y"]);
        assert_eq!(ctx.weight(&config), Ok(Weight::Soft(-150000)));

        let ctx = scan("a :- &log(\"0.5\").").unwrap();
        assert_eq!(
            ctx.weight(&config),
            Ok(Weight::Soft(config.fixed_point(0.5f64.ln())))
        );

        let ctx = scan("a :- &problog(\"0.5\").").unwrap();
        assert_eq!(ctx.weight(&config), Ok(Weight::Soft(0)));

        let ctx = scan("a :- b.").unwrap();
        assert_eq!(ctx.weight(&config), Ok(Weight::Hard));
    }

    #[test]
    fn test_scan_rejects_bad_theory_atoms() {
        assert!(matches!(
            scan("a :- &weight(1), &log(\"0.2\")."),
            Err(CompileError::MultipleTheoryAtoms { .. })
        ));
        assert!(matches!(
            scan("a :- &foo(1)."),
            Err(CompileError::UnknownTheoryAtom { .. })
        ));
        assert!(matches!(
            scan("&weight(1) :- a."),
            Err(CompileError::MisplacedTheoryAtom {
                kind: TheoryKind::Weight,
                ..
            })
        ));
        assert!(matches!(
            scan("a :- &query(b)."),
            Err(CompileError::MisplacedTheoryAtom {
                kind: TheoryKind::Query,
                ..
            })
        ));

        let config = Configuration::default();
        let ctx = scan("a :- &problog(\"1.5\").").unwrap();
        assert!(matches!(
            ctx.weight(&config),
            Err(CompileError::InvalidWeight { .. })
        ));
        let ctx = scan("a :- &log(\"0\").").unwrap();
        assert!(ctx.weight(&config).is_err());
    }

    #[test]
    fn test_aggregate_elements_are_local() {
        let ctx = scan("{ h(D, Y) : v(Y) } = 1 :- d(D), &weight(1).").unwrap();
        assert_eq!(ctx.variables, vec!["D"]);
    }
}
