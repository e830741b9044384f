//! P-Log attribute atoms (`&random`, `&pr`, `&obs`, `&do`) to plain rules
//! over the `_plingo_*` relations read by the meta encoding.

use crate::{
    compiler::{
        context::{parse_numeric, RuleContext},
        error::CompileError,
        meta,
    },
    config::Configuration,
    lang::{
        BodyElement, Head, Literal, Rule, Statement, Term, TheoryAtom, TheoryElement, TheoryKind,
    },
};

/// `name(D1..Dk, Y)` split into the outcome tuple `(name, (D1..Dk), Y)` and
/// the default label `name((D1..Dk))`.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub term: Term,
    pub outcome: Term,
    pub label: Term,
}

impl Attribute {
    pub fn split(term: &Term, rule: &str) -> Result<Self, CompileError> {
        let malformed = |reason: &str| CompileError::MalformedAttribute {
            term: term.to_string(),
            rule: rule.to_string(),
            reason: reason.to_string(),
        };
        let name = term
            .name()
            .ok_or_else(|| malformed("attribute must be a function term"))?;
        let (value, domain) = term
            .arguments()
            .split_last()
            .ok_or_else(|| malformed("attribute needs at least a value argument"))?;
        let domain = Term::tuple(domain.to_vec());
        Ok(Self {
            term: term.clone(),
            outcome: Term::tuple(vec![Term::constant(name), domain.clone(), value.clone()]),
            label: Term::function(name, vec![domain]),
        })
    }
}

pub struct PlogConverter<'a> {
    config: &'a Configuration,
}

impl<'a> PlogConverter<'a> {
    pub fn new(config: &'a Configuration) -> Self {
        Self { config }
    }

    pub fn convert(
        &self,
        ctx: &RuleContext,
        body: Vec<BodyElement>,
    ) -> Result<Vec<Statement>, CompileError> {
        let Some((kind, atom, _)) = &ctx.theory else {
            return Ok(Vec::new());
        };
        let element = first_element(*kind, atom, &ctx.text)?;
        let attribute = Attribute::split(
            element.terms.first().ok_or_else(|| CompileError::MissingElement {
                kind: *kind,
                rule: ctx.text.clone(),
            })?,
            &ctx.text,
        )?;
        let label = atom
            .arguments
            .first()
            .cloned()
            .unwrap_or_else(|| attribute.label.clone());

        match kind {
            TheoryKind::Random => Ok(self.convert_random(element, attribute, label, body)),
            TheoryKind::Pr => {
                let guard = atom.guard.as_ref().ok_or_else(|| CompileError::MissingGuard {
                    rule: ctx.text.clone(),
                })?;
                let probability = self.probability(&guard.term, &ctx.text)?;
                Ok(vec![fact_or_rule(
                    Term::function(
                        meta::PR,
                        vec![label, attribute.outcome, Term::number(probability)],
                    ),
                    body,
                )])
            }
            TheoryKind::Obs => {
                ensure_no_body(*kind, &body, &ctx.text)?;
                let value = atom
                    .guard
                    .as_ref()
                    .map(|g| g.term.clone())
                    .unwrap_or_else(|| Term::constant("true"));
                Ok(vec![fact_or_rule(
                    Term::function(meta::OBS, vec![attribute.outcome, value]),
                    body,
                )])
            }
            TheoryKind::Do => {
                ensure_no_body(*kind, &body, &ctx.text)?;
                Ok(vec![fact_or_rule(
                    Term::function(meta::DO, vec![attribute.outcome]),
                    body,
                )])
            }
            _ => Ok(Vec::new()),
        }
    }

    fn convert_random(
        &self,
        element: &TheoryElement,
        attribute: Attribute,
        label: Term,
        body: Vec<BodyElement>,
    ) -> Vec<Statement> {
        let mut guarded: Vec<BodyElement> = element
            .condition
            .iter()
            .cloned()
            .map(BodyElement::Literal)
            .collect();
        guarded.extend(body);

        let chosen = Term::function(meta::HOLDS, vec![attribute.outcome.clone()]);
        vec![
            fact_or_rule(
                Term::function(meta::RANDOM, vec![label, attribute.outcome]),
                guarded,
            ),
            fact_or_rule(
                chosen.clone(),
                vec![BodyElement::Literal(Literal::positive(attribute.term.clone()))],
            ),
            fact_or_rule(
                attribute.term,
                vec![BodyElement::Literal(Literal::positive(chosen))],
            ),
        ]
    }

    fn probability(&self, term: &Term, rule: &str) -> Result<i64, CompileError> {
        let invalid = || CompileError::InvalidProbability {
            value: term.to_string(),
            rule: rule.to_string(),
        };
        let p = parse_numeric(term).ok_or_else(invalid)?;
        if !(0.0..=1.0).contains(&p) {
            return Err(invalid());
        }
        Ok(self.config.fixed_point(p))
    }
}

fn first_element<'t>(
    kind: TheoryKind,
    atom: &'t TheoryAtom,
    rule: &str,
) -> Result<&'t TheoryElement, CompileError> {
    atom.elements.first().ok_or_else(|| CompileError::MissingElement {
        kind,
        rule: rule.to_string(),
    })
}

fn ensure_no_body(kind: TheoryKind, body: &[BodyElement], rule: &str) -> Result<(), CompileError> {
    if body.is_empty() {
        Ok(())
    } else {
        Err(CompileError::UnexpectedBody {
            kind,
            rule: rule.to_string(),
        })
    }
}

fn fact_or_rule(head: Term, body: Vec<BodyElement>) -> Statement {
    Statement::Rule(Rule::new(Head::Literal(Literal::positive(head)), body))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::lang::parse;

    fn convert(src: &str) -> Result<String, CompileError> {
        let config = Configuration {
            precision: 2,
            ..Default::default()
        };
        let program = parse(src).unwrap();
        let rule = program.rules().next().unwrap();
        let ctx = RuleContext::scan(rule).unwrap();
        let out = PlogConverter::new(&config).convert(&ctx, rule.body.clone())?;
        Ok(out
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    #[test]
    fn test_split_attribute() {
        let attr = Attribute::split(
            &Term::function("h", vec![Term::variable("D"), Term::variable("Y")]),
            "",
        )
        .unwrap();
        assert_eq!(attr.outcome.to_string(), "(h,(D,),Y)");
        assert_eq!(attr.label.to_string(), "h((D,))");

        let attr = Attribute::split(&Term::function("dice", vec![Term::number(6)]), "").unwrap();
        assert_eq!(attr.outcome.to_string(), "(dice,(),6)");
        assert_eq!(attr.label.to_string(), "dice(())");

        assert!(Attribute::split(&Term::constant("flip"), "").is_err());
    }

    #[test]
    fn test_convert_random() {
        assert_eq!(
            convert("&random { h(D, Y) : v(Y) } :- d(D).").unwrap(),
            [
                "_plingo_random(h((D,)),(h,(D,),Y)) :- v(Y), d(D).",
                "_plingo_h((h,(D,),Y)) :- h(D,Y).",
                "h(D,Y) :- _plingo_h((h,(D,),Y)).",
            ]
            .join("\n")
        );
        assert_eq!(
            convert("&random(r(D)) { h(D, Y) : v(Y) } :- d(D).")
                .unwrap()
                .lines()
                .next(),
            Some("_plingo_random(r(D),(h,(D,),Y)) :- v(Y), d(D).")
        );
    }

    #[test]
    fn test_convert_pr() {
        assert_eq!(
            convert("&pr { h(d1, y) } = \"3/20\" :- c.").unwrap(),
            "_plingo_pr(h((d1,)),(h,(d1,),y),15) :- c."
        );
        assert!(matches!(
            convert("&pr { h(d1, y) } :- c."),
            Err(CompileError::MissingGuard { .. })
        ));
        assert!(matches!(
            convert("&pr { h(d1, y) } = \"1.5\"."),
            Err(CompileError::InvalidProbability { .. })
        ));
    }

    #[test]
    fn test_convert_obs_and_do() {
        assert_eq!(
            convert("&obs { h(d1, y) }.").unwrap(),
            "_plingo_obs((h,(d1,),y),true)."
        );
        assert_eq!(
            convert("&obs { h(d1, y) } = false.").unwrap(),
            "_plingo_obs((h,(d1,),y),false)."
        );
        assert_eq!(
            convert("&do { h(d1, y) }.").unwrap(),
            "_plingo_do((h,(d1,),y))."
        );
        assert!(matches!(
            convert("&do { h(d1, y) } :- c."),
            Err(CompileError::UnexpectedBody {
                kind: TheoryKind::Do,
                ..
            })
        ));
        assert!(matches!(
            convert("&obs { }."),
            Err(CompileError::MissingElement { .. })
        ));
    }
}
