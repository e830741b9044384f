//! Printing of programs back to ASP source text.
//!
//! The output of [`Display`] for every AST node is valid input for
//! [`crate::lang::parse`], which is how rewritten programs are handed to the
//! engine.

use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use crate::lang::ast::{
    AggregateElement, Atom, BodyElement, ChoiceAggregate, ChoiceElement, Comparator, Guard, Head,
    Literal, Program, Rule, SetAggregate, Sign, Signature, Statement, Symbol, Term, TheoryAtom,
    WeakConstraint,
};

/// Trait for converting AST nodes to program source code
pub trait PrettyPrint {
    fn to_asp_string(&self) -> String;
}

impl<T: Display> PrettyPrint for T {
    fn to_asp_string(&self) -> String {
        self.to_string()
    }
}

fn write_string_literal(f: &mut Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in s.chars() {
        match c {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            c => write!(f, "{}", c)?,
        }
    }
    write!(f, "\"")
}

fn write_tuple<T: Display>(f: &mut Formatter<'_>, args: &[T]) -> fmt::Result {
    if args.len() == 1 {
        write!(f, "({},)", args[0])
    } else {
        write!(f, "({})", args.iter().join(","))
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Number(n) => write!(f, "{}", n),
            Symbol::String(s) => write_string_literal(f, s),
            Symbol::Function(name, args) if name.is_empty() => write_tuple(f, args),
            Symbol::Function(name, args) if args.is_empty() => write!(f, "{}", name),
            Symbol::Function(name, args) => write!(f, "{}({})", name, args.iter().join(",")),
        }
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Term::Variable(name) => write!(f, "{}", name),
            Term::Constant(symbol) => write!(f, "{}", symbol),
            Term::Function(name, args) => write!(f, "{}({})", name, args.iter().join(",")),
            Term::Tuple(args) => write_tuple(f, args),
            Term::Script(name, args) => write!(f, "@{}({})", name, args.iter().join(",")),
        }
    }
}

impl Display for Sign {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Sign::Positive => Ok(()),
            Sign::Negated => write!(f, "not "),
            Sign::DoubleNegated => write!(f, "not not "),
        }
    }
}

impl Display for Comparator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let op = match self {
            Comparator::Eq => "=",
            Comparator::Ne => "!=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
        };
        write!(f, "{}", op)
    }
}

impl Display for Atom {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Symbolic(term) => write!(f, "{}", term),
            Atom::Boolean(true) => write!(f, "#true"),
            Atom::Boolean(false) => write!(f, "#false"),
            Atom::Comparison(lhs, op, rhs) => write!(f, "{}{}{}", lhs, op, rhs),
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.sign, self.atom)
    }
}

impl Display for ChoiceElement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.literal)?;
        if !self.condition.is_empty() {
            write!(f, ": {}", self.condition.iter().join(", "))?;
        }
        Ok(())
    }
}

impl Display for ChoiceAggregate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(Guard { comparator, term }) = &self.left {
            write!(f, "{} {} ", term, comparator)?;
        }
        write!(f, "{{ {} }}", self.elements.iter().join("; "))?;
        if let Some(Guard { comparator, term }) = &self.right {
            write!(f, " {} {}", comparator, term)?;
        }
        Ok(())
    }
}

impl Display for AggregateElement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.terms.iter().join(","))?;
        if !self.condition.is_empty() {
            write!(f, ": {}", self.condition.iter().join(", "))?;
        }
        Ok(())
    }
}

impl Display for SetAggregate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(Guard { comparator, term }) = &self.left {
            write!(f, "{} {} ", term, comparator)?;
        }
        write!(
            f,
            "#{} {{ {} }}",
            self.function,
            self.elements.iter().join("; ")
        )?;
        if let Some(Guard { comparator, term }) = &self.right {
            write!(f, " {} {}", comparator, term)?;
        }
        Ok(())
    }
}

impl Display for TheoryAtom {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "&{}", self.name)?;
        if !self.arguments.is_empty() {
            write!(f, "({})", self.arguments.iter().join(","))?;
        }
        if !self.elements.is_empty() {
            let elements = self.elements.iter().map(|e| {
                let terms = e.terms.iter().join(",");
                if e.condition.is_empty() {
                    terms
                } else {
                    format!("{}: {}", terms, e.condition.iter().join(", "))
                }
            });
            write!(f, " {{ {} }}", elements.format("; "))?;
        }
        if let Some(guard) = &self.guard {
            write!(f, " {} {}", guard.comparator, guard.term)?;
        }
        Ok(())
    }
}

impl Display for Head {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Head::Literal(lit) => write!(f, "{}", lit),
            Head::Choice(choice) => write!(f, "{}", choice),
            Head::Theory(theory) => write!(f, "{}", theory),
        }
    }
}

impl Display for BodyElement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BodyElement::Literal(lit) => write!(f, "{}", lit),
            BodyElement::Aggregate(sign, choice) => write!(f, "{}{}", sign, choice),
            BodyElement::SetAggregate(sign, aggregate) => write!(f, "{}{}", sign, aggregate),
            BodyElement::Theory(theory) => write!(f, "{}", theory),
        }
    }
}

impl Display for Rule {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let body = self.body.iter().join(", ");
        match &self.head {
            Head::Literal(lit) if lit.is_false() => write!(f, ":- {}.", body),
            head if self.body.is_empty() => write!(f, "{}.", head),
            head => write!(f, "{} :- {}.", head, body),
        }
    }
}

impl Display for WeakConstraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            ":~ {}. [{}@{}",
            self.body.iter().join(", "),
            self.weight,
            self.priority
        )?;
        for term in &self.terms {
            write!(f, ",{}", term)?;
        }
        write!(f, "]")
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Rule(rule) => write!(f, "{}", rule),
            Statement::WeakConstraint(wc) => write!(f, "{}", wc),
            Statement::Show(None) => write!(f, "#show."),
            Statement::Show(Some(signature)) => write!(f, "#show {}.", signature),
            Statement::External(term) => write!(f, "#external {}.", term),
            Statement::Const(name, value) => write!(f, "#const {}={}.", name, value),
            Statement::Program(name) => write!(f, "#program {}.", name),
            Statement::Raw(text) => write!(f, "{}", text.trim_end()),
        }
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for statement in &self.statements {
            writeln!(f, "{}", statement)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::lang::parse;

    fn roundtrip(src: &str) -> String {
        let program = parse(src).unwrap();
        let printed = program.to_string();
        let reparsed = parse(&printed).unwrap();
        assert_eq!(program, reparsed, "reparse of {:?} differs", printed);
        printed
    }

    #[test]
    fn test_print_rules() {
        assert_eq!(roundtrip("a."), "a.\n");
        assert_eq!(roundtrip("b:-a ,not   c."), "b :- a, not c.\n");
        assert_eq!(roundtrip(":- a, X < 2."), ":- a, X<2.\n");
        assert_eq!(roundtrip("{a;b:c}=1."), "{ a; b: c } = 1.\n");
        assert_eq!(roundtrip("1{a}:-not not b."), "1 <= { a } :- not not b.\n");
    }

    #[test]
    fn test_print_set_aggregates() {
        assert_eq!(
            roundtrip("m(S) :- S=#sum{P,A:x(A,P);1}."),
            "m(S) :- S = #sum { P,A: x(A,P); 1 }.\n"
        );
        assert_eq!(
            roundtrip("n :- not 2 <= #count{A : r(A), not s(A)}."),
            "n :- not 2 <= #count { A: r(A), not s(A) }.\n"
        );
    }

    #[test]
    fn test_print_weak_constraint() {
        assert_eq!(
            roundtrip(":~ p(X), q. [-3@1, X, (a,)]"),
            ":~ p(X), q. [-3@1,X,(a,)]\n"
        );
        assert_eq!(roundtrip(":~ . [1@0]"), ":~ . [1@0]\n");
        assert_eq!(
            roundtrip(":~ m(S). [@f(S, 2)@0, S]"),
            ":~ m(S). [@f(S,2)@0,S]\n"
        );
    }

    #[test]
    fn test_print_theory_atoms() {
        assert_eq!(
            roundtrip("&random(r) { h(D,Y) : v(Y) } :- d(D)."),
            "&random(r) { h(D,Y): v(Y) } :- d(D).\n"
        );
        assert_eq!(roundtrip("&pr{h(a)}=\"1/2\"."), "&pr { h(a) } = \"1/2\".\n");
        assert_eq!(roundtrip("a :- &weight(2)."), "a :- &weight(2).\n");
    }

    #[test]
    fn test_print_symbols() {
        assert_eq!(Symbol::tuple(vec![]).to_string(), "()");
        assert_eq!(
            Symbol::tuple(vec![Symbol::Number(1), Symbol::tuple(vec![])]).to_string(),
            "(1,())"
        );
        assert_eq!(Symbol::String("a\"b".into()).to_string(), "\"a\\\"b\"");
        assert_eq!(
            Symbol::function("f", vec![Symbol::constant("x")]).to_string(),
            "f(x)"
        );
    }

    #[test]
    fn test_print_directives() {
        assert_eq!(
            roundtrip("#show. #show a/1. #external e. #const n=2. #program base."),
            "#show.\n#show a/1.\n#external e.\n#const n=2.\n#program base.\n"
        );
    }
}
