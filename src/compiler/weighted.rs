//! Weighted rules to choice rules and weak constraints ("penalty way").

use crate::{
    compiler::{
        context::{parse_numeric, RuleContext, Weight},
        error::CompileError,
        meta,
    },
    config::{Configuration, Encoding},
    lang::{
        Atom, BodyElement, ChoiceAggregate, Head, Literal, Rule, Sign, Statement, Symbol, Term,
        WeakConstraint,
    },
};

pub const HARD_PRIORITY: u32 = 1;
pub const SOFT_PRIORITY: u32 = 0;
/// Weight label of hard rules inside `unsat/3` atoms.
pub const HARD_LABEL: &str = "alpha";

/// Encodes one weighted rule. `head` and `body` are already free of theory
/// atoms.
pub struct WeightedEncoder<'a> {
    config: &'a Configuration,
}

impl<'a> WeightedEncoder<'a> {
    pub fn new(config: &'a Configuration) -> Self {
        Self { config }
    }

    pub fn encode(
        &self,
        head: Head,
        body: Vec<BodyElement>,
        weight: Weight,
        index: u64,
        variables: &[String],
    ) -> Vec<Statement> {
        // Unbounded choices can always be satisfied.
        if let Head::Choice(choice) = &head {
            if !choice.is_bounded() {
                return vec![Statement::Rule(Rule::new(head, body))];
            }
        }

        let (cost, priority, label) = match weight {
            Weight::Hard => (
                Term::number(1),
                HARD_PRIORITY,
                Term::string(HARD_LABEL),
            ),
            Weight::Soft(w) => (Term::number(w), SOFT_PRIORITY, Term::number(w)),
        };
        let discriminant = discriminant(index, variables);

        match self.config.encoding {
            Encoding::Direct => self.encode_direct(head, body, cost, priority, discriminant),
            Encoding::Unsat => {
                self.encode_unsat(head, body, cost, priority, label, index, variables)
            }
        }
    }

    fn encode_direct(
        &self,
        head: Head,
        body: Vec<BodyElement>,
        cost: Term,
        priority: u32,
        discriminant: Vec<Term>,
    ) -> Vec<Statement> {
        let mut out = Vec::new();
        let mut penalized = body.clone();
        match head {
            Head::Choice(choice) => {
                out.push(Statement::Rule(Rule::new(
                    Head::Choice(choice.unbounded()),
                    body,
                )));
                penalized.insert(0, BodyElement::Aggregate(Sign::Negated, choice));
            }
            Head::Literal(lit) if lit.is_false() => {}
            Head::Literal(lit) => {
                penalized.insert(0, BodyElement::Literal(negate_head(&lit)));
                out.push(Statement::Rule(Rule::new(
                    Head::Choice(ChoiceAggregate::single(lit)),
                    body,
                )));
            }
            Head::Theory(_) => unreachable!("theory heads never reach the weighted encoder"),
        }
        self.guard_soft(&mut penalized, priority);
        out.push(Statement::WeakConstraint(WeakConstraint {
            weight: cost,
            priority,
            terms: discriminant,
            body: penalized,
        }));
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn encode_unsat(
        &self,
        head: Head,
        body: Vec<BodyElement>,
        cost: Term,
        priority: u32,
        label: Term,
        index: u64,
        variables: &[String],
    ) -> Vec<Statement> {
        let unsat = Term::function(
            "unsat",
            vec![Term::number(index as i64), label, variables_tuple(variables)],
        );
        let not_head = match &head {
            Head::Choice(choice) => BodyElement::Aggregate(Sign::Negated, choice.clone()),
            Head::Literal(lit) => BodyElement::Literal(negate_head(lit)),
            Head::Theory(_) => unreachable!("theory heads never reach the weighted encoder"),
        };

        let mut violated = vec![not_head];
        violated.extend(body.iter().cloned());
        let mut satisfied = vec![BodyElement::Literal(Literal::negated(unsat.clone()))];
        satisfied.extend(body);

        let mut penalized = vec![BodyElement::Literal(Literal::positive(unsat.clone()))];
        self.guard_soft(&mut penalized, priority);

        vec![
            Statement::Rule(Rule::new(Head::Literal(Literal::positive(unsat)), violated)),
            Statement::Rule(Rule::new(head, satisfied)),
            Statement::WeakConstraint(WeakConstraint {
                weight: cost,
                priority,
                terms: discriminant(index, variables),
                body: penalized,
            }),
        ]
    }

    /// Two-phase solving switches soft constraints off through an external.
    fn guard_soft(&self, body: &mut Vec<BodyElement>, priority: u32) {
        if self.config.two_phase && priority == SOFT_PRIORITY {
            body.insert(
                0,
                BodyElement::Literal(Literal::positive(Term::constant(meta::EXT_HELPER))),
            );
        }
    }
}

fn negate_head(lit: &Literal) -> Literal {
    Literal {
        sign: Sign::Negated,
        atom: lit.atom.clone(),
    }
}

fn variables_tuple(variables: &[String]) -> Term {
    Term::tuple(variables.iter().map(Term::variable).collect())
}

/// `[index, (X1, .., Xn)]`
pub fn discriminant(index: u64, variables: &[String]) -> Vec<Term> {
    vec![Term::number(index as i64), variables_tuple(variables)]
}

/// Rescales a user weak constraint of the plingo frontend: the written weight
/// is a reward, so the emitted cost is its negated fixed-point value.
///
/// The output is an ordinary weak constraint, so compiling an already
/// compiled plingo program rescales every weak constraint in it a second
/// time, the generated ones included. Only the lpmln frontends are
/// idempotent.
pub fn rescale_weak_constraint(
    wc: &WeakConstraint,
    config: &Configuration,
) -> Result<WeakConstraint, CompileError> {
    let text = wc.to_string();
    let value = parse_numeric(&wc.weight).ok_or_else(|| CompileError::InvalidWeight {
        value: wc.weight.to_string(),
        rule: text.clone(),
        reason: "weak constraint weights must be numbers or numeric strings".to_string(),
    })?;

    let mut body_vars = Vec::new();
    wc.body.iter().for_each(|elem| elem.collect_variables(&mut body_vars));
    let mut term_vars = Vec::new();
    wc.terms.iter().for_each(|t| t.collect_variables(&mut term_vars));
    let missing: Vec<_> = body_vars
        .iter()
        .filter(|v| !term_vars.contains(v))
        .collect();
    if !missing.is_empty() {
        log::warn!(
            "variables {:?} of `{}` are not in its terms; distinct groundings share one penalty",
            missing,
            text
        );
    }

    Ok(WeakConstraint {
        weight: Term::number(config.fixed_point(-value)),
        ..wc.clone()
    })
}

/// `:- not A, Body.` or, for `&evidence(A, false)`, `:- A, Body.`
pub fn encode_evidence(ctx: &RuleContext, body: Vec<BodyElement>) -> Result<Rule, CompileError> {
    let Some((kind, atom, _)) = &ctx.theory else {
        unreachable!("evidence rules always carry their theory atom")
    };
    let (target, negative) = match atom.arguments.as_slice() {
        [target] => (target, false),
        [target, flag] => (target, flag == &Term::constant("false")),
        _ => {
            return Err(CompileError::MalformedAttribute {
                term: atom.to_string(),
                rule: ctx.text.clone(),
                reason: format!("&{} expects one or two arguments", kind),
            })
        }
    };
    let literal = Literal {
        sign: if negative {
            Sign::Positive
        } else {
            Sign::Negated
        },
        atom: Atom::Symbolic(target.clone()),
    };
    let mut constraint_body = vec![BodyElement::Literal(literal)];
    constraint_body.extend(body);
    Ok(Rule::constraint(constraint_body))
}

/// ProbLog export: `&query(A)` becomes `query(A).` plus a display directive.
pub fn encode_problog_query(ctx: &RuleContext, body: Vec<BodyElement>) -> Vec<Statement> {
    let Some((_, atom, _)) = &ctx.theory else {
        return Vec::new();
    };
    let Some(target) = atom.arguments.first() else {
        return Vec::new();
    };
    let signature = crate::lang::Signature {
        name: target.name().unwrap_or_default().to_string(),
        arity: target.arguments().len(),
    };
    vec![
        Statement::Rule(Rule::new(
            Head::Literal(Literal::positive(Term::function(
                "query",
                vec![target.clone()],
            ))),
            body,
        )),
        Statement::Show(Some(signature)),
    ]
}

/// Reads the fixed-point cost back from an emitted weak constraint.
pub fn fixed_point_cost(wc: &WeakConstraint) -> Option<i64> {
    match &wc.weight {
        Term::Constant(Symbol::Number(n)) => Some(*n),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{config::Frontend, lang::parse};

    fn encode(src: &str, config: &Configuration) -> String {
        let program = parse(src).unwrap();
        let rule = program.rules().next().unwrap();
        let ctx = RuleContext::scan(rule).unwrap();
        let weight = ctx.weight(config).unwrap();
        WeightedEncoder::new(config)
            .encode(
                rule.head.clone(),
                RuleContext::plain_body(rule),
                weight,
                7,
                &ctx.variables,
            )
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn config(encoding: Encoding) -> Configuration {
        Configuration {
            encoding,
            precision: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_direct_encoding() {
        let config = config(Encoding::Direct);
        assert_eq!(
            encode("a(X) :- b(X), &weight(\"1.5\").", &config),
            "{ a(X) } :- b(X).\n:~ not a(X), b(X). [150@0,7,(X,)]"
        );
        assert_eq!(
            encode(":- a, b(Y), &weight(-2).", &config),
            ":~ a, b(Y). [-200@0,7,(Y,)]"
        );
        assert_eq!(
            encode("{ a; b } = 1 :- c, &weight(1).", &config),
            "{ a; b } :- c.\n:~ not { a; b } = 1, c. [100@0,7,()]"
        );
        assert_eq!(
            encode("{ a; b } :- c, &weight(1).", &config),
            "{ a; b } :- c."
        );
    }

    #[test]
    fn test_unsat_encoding() {
        let config = config(Encoding::Unsat);
        assert_eq!(
            encode("a(X) :- b(X), &weight(1).", &config),
            [
                "unsat(7,100,(X,)) :- not a(X), b(X).",
                "a(X) :- not unsat(7,100,(X,)), b(X).",
                ":~ unsat(7,100,(X,)). [100@0,7,(X,)]",
            ]
            .join("\n")
        );
    }

    #[test]
    fn test_hard_rules() {
        let config = Configuration {
            frontend: Frontend::Lpmln,
            ..config(Encoding::Unsat)
        };
        assert_eq!(
            encode("a :- b.", &config),
            [
                "unsat(7,\"alpha\",()) :- not a, b.",
                "a :- not unsat(7,\"alpha\",()), b.",
                ":~ unsat(7,\"alpha\",()). [1@1,7,()]",
            ]
            .join("\n")
        );
        let direct = Configuration {
            encoding: Encoding::Direct,
            ..config
        };
        assert_eq!(
            encode("a :- b.", &direct),
            "{ a } :- b.\n:~ not a, b. [1@1,7,()]"
        );
    }

    #[test]
    fn test_two_phase_guards_soft_constraints_only() {
        let config = Configuration {
            frontend: Frontend::Lpmln,
            two_phase: true,
            ..config(Encoding::Direct)
        };
        assert_eq!(
            encode("a :- b, &weight(1).", &config),
            "{ a } :- b.\n:~ _plingo_ext_helper, not a, b. [100@0,7,()]"
        );
        assert_eq!(
            encode("a :- b.", &config),
            "{ a } :- b.\n:~ not a, b. [1@1,7,()]"
        );
        let unsat = Configuration {
            encoding: Encoding::Unsat,
            ..config
        };
        assert!(encode("a :- &weight(1).", &unsat)
            .ends_with(":~ _plingo_ext_helper, unsat(7,100,()). [100@0,7,()]"));
    }

    #[test]
    fn test_weight_round_trip() {
        let config = config(Encoding::Direct);
        for (weight, expected) in [("0", 0), ("-3", -300), ("0.125", 13), ("-1.239", -124)] {
            let src = format!("a :- b, &weight(\"{}\").", weight);
            let program = parse(&src).unwrap();
            let rule = program.rules().next().unwrap();
            let ctx = RuleContext::scan(rule).unwrap();
            let out = WeightedEncoder::new(&config).encode(
                rule.head.clone(),
                RuleContext::plain_body(rule),
                ctx.weight(&config).unwrap(),
                0,
                &ctx.variables,
            );
            let Some(Statement::WeakConstraint(wc)) = out.last() else {
                panic!("expected a weak constraint");
            };
            assert_eq!(fixed_point_cost(wc), Some(expected), "weight {}", weight);
        }
    }

    #[test]
    fn test_rescale_weak_constraint() {
        let config = config(Encoding::Direct);
        let program = parse(":~ a(X), b(Y). [\"0.5\"@0, X]").unwrap();
        let wc = program.weak_constraints().next().unwrap();
        let rescaled = rescale_weak_constraint(wc, &config).unwrap();
        assert_eq!(rescaled.to_string(), ":~ a(X), b(Y). [-50@0,X]");

        let program = parse(":~ a(X). [W@0, X]").unwrap();
        let wc = program.weak_constraints().next().unwrap();
        assert!(rescale_weak_constraint(wc, &config).is_err());
    }
}
