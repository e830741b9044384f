//! Rewrites weighted and probabilistic programs into plain programs with weak
//! constraints.
//!
//! Rules are handled one at a time. Each rule goes to exactly one of:
//!
//! - the P-Log converter ([`plog`]) for `&random`, `&pr`, `&obs` and `&do`,
//! - the weighted encoder ([`weighted`]) for `&weight`, `&log`, `&problog` and,
//!   in lpmln mode, for every hard rule,
//! - evidence and query handling, or
//! - nothing, when the rule is returned unchanged.
//!
//! Per-rule state lives in a [`RuleContext`]; the only state carried across
//! rules is the rule index used in weak-constraint discriminants.

pub mod context;
pub mod error;
pub mod meta;
pub mod plog;
pub mod weighted;

use std::collections::HashSet;

pub use context::{RuleContext, Weight};
pub use error::{CompileError, CompilerError};
use weighted::WeightedEncoder;

use crate::{
    config::{Configuration, Frontend},
    lang::{Head, Program, Rule, Statement, Term, TheoryKind, WeakConstraint},
};

/// Compiles `program` under `config`.
pub fn compile(program: &Program, config: &Configuration) -> Result<Program, CompilerError> {
    Compiler::new(config).compile(program)
}

pub struct Compiler<'a> {
    config: &'a Configuration,
    rule_idx: u64,
    /// Weak constraints produced by the weighted encoder, with their index.
    generated: Vec<(u64, WeakConstraint)>,
}

impl<'a> Compiler<'a> {
    pub fn new(config: &'a Configuration) -> Self {
        Self {
            config,
            rule_idx: 0,
            generated: Vec::new(),
        }
    }

    pub fn compile(mut self, program: &Program) -> Result<Program, CompilerError> {
        let mut out = Program::default();
        self.prelude(program, &mut out);

        let mut errors = Vec::new();
        for statement in &program.statements {
            match statement {
                Statement::Rule(rule) => match self.compile_rule(rule) {
                    Ok(statements) => out.extend(statements),
                    Err(e) => {
                        log::debug!("rule rejected: {}", e);
                        errors.push(e)
                    }
                },
                Statement::WeakConstraint(wc) if self.config.frontend == Frontend::Plingo => {
                    match weighted::rescale_weak_constraint(wc, self.config) {
                        Ok(wc) => out.push(Statement::WeakConstraint(wc)),
                        Err(e) => errors.push(e),
                    }
                }
                other => out.push(other.clone()),
            }
        }
        if !errors.is_empty() {
            return Err(CompilerError::Rules(errors));
        }

        validate_discriminants(&self.generated)?;
        log::debug!(
            "compiled {} statements into {} ({} weighted rules)",
            program.statements.len(),
            out.statements.len(),
            self.rule_idx
        );
        Ok(out)
    }

    /// Fixed statements every compiled program starts with. Statements the
    /// input already contains are not repeated.
    fn prelude(&self, program: &Program, out: &mut Program) {
        let mut prelude = vec![Statement::Raw(meta::THEORY.to_string())];
        if self.config.frontend == Frontend::Plog {
            prelude.push(Statement::Raw(meta::PLOG_META.to_string()));
            prelude.push(Statement::Const(
                meta::FACTOR.to_string(),
                Term::number(i64::from(self.config.precision)),
            ));
            prelude.push(Statement::Const(
                meta::ONE.to_string(),
                Term::number(self.config.fixed_point(1.0)),
            ));
        }
        if self.config.two_phase {
            prelude.push(Statement::External(Term::constant(meta::EXT_HELPER)));
        }
        out.extend(
            prelude
                .into_iter()
                .filter(|s| !program.statements.contains(s)),
        );
    }

    /// Compiles a single source rule.
    pub fn compile_rule(&mut self, rule: &Rule) -> Result<Vec<Statement>, CompileError> {
        let is_theory_head = matches!(rule.head, Head::Theory(_));
        if rule.body.is_empty() && !is_theory_head && !self.config.translates_hard_rules() {
            return Ok(vec![Statement::Rule(rule.clone())]);
        }

        let ctx = RuleContext::scan(rule)?;
        let body = RuleContext::plain_body(rule);
        match ctx.kind() {
            Some(TheoryKind::Query) if self.config.problog_export => {
                Ok(weighted::encode_problog_query(&ctx, body))
            }
            Some(TheoryKind::Query) => Ok(vec![Statement::Rule(rule.clone())]),
            Some(TheoryKind::Evidence) => {
                Ok(vec![Statement::Rule(weighted::encode_evidence(&ctx, body)?)])
            }
            Some(TheoryKind::Random | TheoryKind::Pr | TheoryKind::Obs | TheoryKind::Do) => {
                plog::PlogConverter::new(self.config).convert(&ctx, body)
            }
            Some(TheoryKind::Weight | TheoryKind::Log | TheoryKind::Problog) | None => {
                let weight = ctx.weight(self.config)?;
                let index = self.rule_idx;
                self.rule_idx += 1;
                if weight == Weight::Hard && !self.config.translates_hard_rules() {
                    return Ok(vec![Statement::Rule(rule.clone())]);
                }
                let out = WeightedEncoder::new(self.config).encode(
                    rule.head.clone(),
                    body,
                    weight,
                    index,
                    &ctx.variables,
                );
                self.generated
                    .extend(out.iter().filter_map(|s| match s {
                        Statement::WeakConstraint(wc) => Some((index, wc.clone())),
                        _ => None,
                    }));
                Ok(out)
            }
        }
    }
}

/// Every generated weak constraint must be told apart from all others by its
/// terms: the leading index is unique per source rule and all body variables
/// occur in the terms.
pub(crate) fn validate_discriminants(
    generated: &[(u64, WeakConstraint)],
) -> Result<(), CompilerError> {
    let mut seen = HashSet::new();
    for (index, wc) in generated {
        if wc.terms.first() != Some(&Term::number(*index as i64)) {
            return Err(CompilerError::EncodingInvariantViolation(format!(
                "`{}` does not start its terms with rule index {}",
                wc, index
            )));
        }
        if !seen.insert(*index) {
            return Err(CompilerError::EncodingInvariantViolation(format!(
                "rule index {} is used by more than one weak constraint (`{}`)",
                index, wc
            )));
        }
        let mut body_vars = Vec::new();
        wc.body
            .iter()
            .for_each(|elem| elem.collect_variables(&mut body_vars));
        let mut term_vars = Vec::new();
        wc.terms
            .iter()
            .for_each(|t| t.collect_variables(&mut term_vars));
        if let Some(var) = body_vars.iter().find(|v| !term_vars.contains(v)) {
            return Err(CompilerError::EncodingInvariantViolation(format!(
                "variable {} of `{}` is missing from its terms",
                var, wc
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{config::Encoding, lang::parse};

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn config(frontend: Frontend) -> Configuration {
        Configuration {
            frontend,
            precision: 2,
            ..Default::default()
        }
    }

    /// The compiled program without the theory declaration.
    fn compile_text(src: &str, config: &Configuration) -> String {
        let out = compile(&parse(src).unwrap(), config).unwrap();
        out.statements
            .iter()
            .filter(|s| !matches!(s, Statement::Raw(text) if text == meta::THEORY))
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_two_weighted_facts() {
        init();
        let config = config(Frontend::Plingo);
        assert_eq!(
            compile_text("a :- &weight(1). b :- &weight(2).", &config),
            [
                "{ a }.",
                ":~ not a. [100@0,0,()]",
                "{ b }.",
                ":~ not b. [200@0,1,()]",
            ]
            .join("\n")
        );
    }

    #[test]
    fn test_plain_rules_pass_through() {
        init();
        let config = config(Frontend::Plingo);
        assert_eq!(
            compile_text("a. b :- a. c :- b, &weight(1).", &config),
            ["a.", "b :- a.", "{ c } :- b.", ":~ not c, b. [100@0,1,()]"].join("\n")
        );
    }

    #[test]
    fn test_lpmln_translates_hard_rules() {
        init();
        let config = config(Frontend::Lpmln);
        assert_eq!(
            compile_text("a. b :- a, &weight(1).", &config),
            [
                "{ a }.",
                ":~ not a. [1@1,0,()]",
                "{ b } :- a.",
                ":~ not b, a. [100@0,1,()]",
            ]
            .join("\n")
        );
    }

    #[test]
    fn test_evidence_and_queries() {
        init();
        let config = config(Frontend::Plingo);
        assert_eq!(
            compile_text(
                "&evidence(a). &evidence(b, false) :- c. &query(a). &query(b, c) :- d.",
                &config
            ),
            [
                ":- not a.",
                ":- b, c.",
                "&query(a).",
                "&query(b,c) :- d.",
            ]
            .join("\n")
        );

        let export = Configuration {
            problog_export: true,
            ..config
        };
        assert_eq!(
            compile_text("&query(h(d1, y)).", &export),
            "query(h(d1,y)).\n#show h/2."
        );
    }

    #[test]
    fn test_user_weak_constraints_are_rescaled() {
        init();
        assert_eq!(
            compile_text(":~ a. [\"1.5\"@0]", &config(Frontend::Plingo)),
            ":~ a. [-150@0]"
        );
        assert_eq!(
            compile_text(":~ a. [3@1]", &config(Frontend::LpmlnAlt)),
            ":~ a. [3@1]"
        );
    }

    #[test]
    fn test_prelude() {
        init();
        let plog = config(Frontend::Plog);
        let out = compile(&parse("a.").unwrap(), &plog).unwrap();
        assert_eq!(out.statements[0], Statement::Raw(meta::THEORY.to_string()));
        assert_eq!(out.statements[1], Statement::Raw(meta::PLOG_META.to_string()));
        assert_eq!(out.statements[2].to_string(), "#const _plingo_factor=2.");
        assert_eq!(out.statements[3].to_string(), "#const _plingo_one=100.");

        let two_phase = Configuration {
            two_phase: true,
            ..config(Frontend::Lpmln)
        };
        let out = compile(&Program::default(), &two_phase).unwrap();
        assert_eq!(out.statements[1].to_string(), "#external _plingo_ext_helper.");
    }

    #[test]
    fn test_errors_are_collected() {
        init();
        let config = config(Frontend::Plog);
        let program = parse(
            "&pr { h(d, y) } :- c. ok :- &weight(1). &do { h(d, y) } :- c. &obs { h(d, y) }.",
        )
        .unwrap();
        let Err(CompilerError::Rules(errors)) = compile(&program, &config) else {
            panic!("expected compile errors");
        };
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], CompileError::MissingGuard { .. }));
        assert!(matches!(
            errors[1],
            CompileError::UnexpectedBody {
                kind: TheoryKind::Do,
                ..
            }
        ));
    }

    #[test]
    fn test_compile_is_idempotent() {
        init();
        let src = "a :- &weight(1). b(X) :- a, c(X), &log(\"0.5\"). \
                   { d; e } = 1 :- &problog(\"0.25\"). :- a, b(1), &weight(-1). f :- a.";
        for encoding in [Encoding::Direct, Encoding::Unsat] {
            let config = Configuration {
                encoding,
                ..config(Frontend::LpmlnAlt)
            };
            let once = compile(&parse(src).unwrap(), &config).unwrap();
            let twice = compile(&once, &config).unwrap();
            assert_eq!(once, twice);
            let reparsed = parse(
                &once
                    .statements
                    .iter()
                    .filter(|s| !matches!(s, Statement::Raw(_)))
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
            .unwrap();
            let again = compile(&reparsed, &config).unwrap();
            assert!(again.statements.iter().all(|s| once.statements.contains(s)));
        }

        // with the plingo frontend, compiled rules are left alone
        let config = config(Frontend::Plingo);
        let mut compiler = Compiler::new(&config);
        let out = compiler
            .compile_rule(parse("a :- b, &weight(1).").unwrap().rules().next().unwrap())
            .unwrap();
        for statement in &out {
            if let Statement::Rule(rule) = statement {
                assert_eq!(
                    compiler.compile_rule(rule).unwrap(),
                    vec![statement.clone()]
                );
            }
        }
    }

    #[test]
    fn test_plingo_recompile_rescales_again() {
        init();
        let config = config(Frontend::Plingo);
        let once = compile(&parse(":~ a. [\"0.5\"@0]").unwrap(), &config).unwrap();
        let twice = compile(&once, &config).unwrap();
        let weights = |program: &Program| -> Vec<String> {
            program
                .weak_constraints()
                .map(|wc| wc.weight.to_string())
                .collect()
        };
        assert_eq!(weights(&once), vec!["-50"]);
        assert_eq!(weights(&twice), vec!["5000"]);
    }

    #[test]
    fn test_discriminant_validation() {
        let program = parse(":~ a(X), b(Y). [1@0, 3, (X,)] :~ c. [1@0, 4, ()]").unwrap();
        let wcs: Vec<_> = program.weak_constraints().cloned().collect();
        assert!(matches!(
            validate_discriminants(&[(3, wcs[0].clone())]),
            Err(CompilerError::EncodingInvariantViolation(_))
        ));
        assert!(matches!(
            validate_discriminants(&[(5, wcs[1].clone())]),
            Err(CompilerError::EncodingInvariantViolation(_))
        ));
        assert!(matches!(
            validate_discriminants(&[(4, wcs[1].clone()), (4, wcs[1].clone())]),
            Err(CompilerError::EncodingInvariantViolation(_))
        ));
        assert_eq!(validate_discriminants(&[(4, wcs[1].clone())]), Ok(()));
    }
}
