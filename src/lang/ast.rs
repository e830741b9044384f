use std::cmp::Ordering;

use pest::iterators::{Pair, Pairs};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

use crate::lang::parser::Rule as GrammarRule;

// --- Error Type ---
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AstBuildError {
    #[error("AST build failed at {span:?}: {message}")]
    Generic {
        message: String,
        span: Option<(usize, usize)>,
    },
    #[error("Unexpected rule {rule:?} at {span:?}")]
    UnexpectedRule {
        rule: GrammarRule,
        span: Option<(usize, usize)>,
    },
    #[error("Invalid literal format for {kind}: '{value}' at {span:?}")]
    InvalidLiteralFormat {
        kind: String,
        value: String,
        span: Option<(usize, usize)>,
    },
    #[error("Internal error during AST build: {0}")]
    Internal(String),
}

// Helper to get span from a Pair
fn get_span(pair: &Pair<GrammarRule>) -> (usize, usize) {
    let span = pair.as_span();
    (span.start(), span.end())
}

// Helper macro for errors with spans
macro_rules! ast_err {
    (Generic, $pair:expr, $($arg:tt)*) => {
        AstBuildError::Generic {
            message: format!($($arg)*),
            span: Some(get_span($pair)),
        }
    };
    (UnexpectedRule, $pair:expr) => {
        AstBuildError::UnexpectedRule {
            rule: $pair.as_rule(),
            span: Some(get_span($pair)),
        }
    };
    (InvalidLiteralFormat, $kind:expr, $pair:expr) => {
        AstBuildError::InvalidLiteralFormat {
            kind: $kind.to_string(),
            value: $pair.as_str().to_string(),
            span: Some(get_span($pair)),
        }
    };
}

// --- Symbols and terms ---

/// A ground value as reported by the engine.
///
/// A `Function` with an empty name is a tuple, one without arguments is a
/// constant such as `a` or `true`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    Number(i64),
    String(String),
    Function(String, Vec<Symbol>),
}

impl Symbol {
    pub fn constant(name: impl Into<String>) -> Self {
        Symbol::Function(name.into(), Vec::new())
    }

    pub fn function(name: impl Into<String>, args: Vec<Symbol>) -> Self {
        Symbol::Function(name.into(), args)
    }

    pub fn tuple(args: Vec<Symbol>) -> Self {
        Symbol::Function(String::new(), args)
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Symbol::Function(name, _) if !name.is_empty() => Some(name),
            _ => None,
        }
    }

    pub fn arguments(&self) -> &[Symbol] {
        match self {
            Symbol::Function(_, args) => args,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Variable(String),
    Constant(Symbol),
    Function(String, Vec<Term>),
    Tuple(Vec<Term>),
    /// `@name(args)`, evaluated by the engine while grounding.
    Script(String, Vec<Term>),
}

impl Term {
    pub fn variable(name: impl Into<String>) -> Self {
        Term::Variable(name.into())
    }

    pub fn constant(name: impl Into<String>) -> Self {
        Term::Constant(Symbol::constant(name))
    }

    pub fn number(n: i64) -> Self {
        Term::Constant(Symbol::Number(n))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Term::Constant(Symbol::String(s.into()))
    }

    /// Builds `name(args)`, collapsing to a constant when `args` is empty.
    pub fn function(name: impl Into<String>, args: Vec<Term>) -> Self {
        if args.is_empty() {
            Term::constant(name)
        } else {
            Term::Function(name.into(), args)
        }
    }

    pub fn tuple(args: Vec<Term>) -> Self {
        Term::Tuple(args)
    }

    pub fn is_ground(&self) -> bool {
        match self {
            Term::Variable(_) => false,
            Term::Constant(_) => true,
            Term::Function(_, args) | Term::Tuple(args) | Term::Script(_, args) => {
                args.iter().all(Term::is_ground)
            }
        }
    }

    /// Converts a variable-free term into the symbol the engine would report.
    /// Script calls have no value until they are evaluated.
    pub fn to_symbol(&self) -> Option<Symbol> {
        match self {
            Term::Variable(_) => None,
            Term::Constant(symbol) => Some(symbol.clone()),
            Term::Function(name, args) => Some(Symbol::Function(
                name.clone(),
                args.iter().map(Term::to_symbol).collect::<Option<_>>()?,
            )),
            Term::Tuple(args) => Some(Symbol::tuple(
                args.iter().map(Term::to_symbol).collect::<Option<_>>()?,
            )),
            Term::Script(..) => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            Term::Constant(Symbol::Number(n)) => Some(*n),
            _ => None,
        }
    }

    /// Name of a constant or function term.
    pub fn name(&self) -> Option<&str> {
        match self {
            Term::Constant(Symbol::Function(name, _)) | Term::Function(name, _)
                if !name.is_empty() =>
            {
                Some(name)
            }
            _ => None,
        }
    }

    pub fn arguments(&self) -> &[Term] {
        match self {
            Term::Function(_, args) | Term::Tuple(args) => args,
            _ => &[],
        }
    }

    /// Appends the variables of this term to `out` in first-occurrence order.
    pub fn collect_variables(&self, out: &mut Vec<String>) {
        match self {
            Term::Variable(name) => push_unique(out, name),
            Term::Constant(_) => {}
            Term::Function(_, args) | Term::Tuple(args) | Term::Script(_, args) => {
                args.iter().for_each(|arg| arg.collect_variables(out))
            }
        }
    }
}

impl From<Symbol> for Term {
    fn from(symbol: Symbol) -> Self {
        match symbol {
            Symbol::Function(name, args) if name.is_empty() => {
                Term::Tuple(args.into_iter().map(Term::from).collect())
            }
            Symbol::Function(name, args) if !args.is_empty() => {
                Term::Function(name, args.into_iter().map(Term::from).collect())
            }
            other => Term::Constant(other),
        }
    }
}

fn push_unique(out: &mut Vec<String>, name: &str) {
    if !out.iter().any(|v| v == name) {
        out.push(name.to_string());
    }
}

// --- Literals ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sign {
    Positive,
    Negated,
    DoubleNegated,
}

impl Sign {
    /// Sign of `not L` for a literal `L` carrying this sign.
    pub fn negate(self) -> Self {
        match self {
            Sign::Positive => Sign::Negated,
            Sign::Negated => Sign::DoubleNegated,
            Sign::DoubleNegated => Sign::Negated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    /// Whether `lhs <op> rhs` holds given `lhs.cmp(rhs)`.
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Comparator::Eq => ordering == Ordering::Equal,
            Comparator::Ne => ordering != Ordering::Equal,
            Comparator::Lt => ordering == Ordering::Less,
            Comparator::Le => ordering != Ordering::Greater,
            Comparator::Gt => ordering == Ordering::Greater,
            Comparator::Ge => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Atom {
    Symbolic(Term),
    Boolean(bool),
    Comparison(Term, Comparator, Term),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Literal {
    pub sign: Sign,
    pub atom: Atom,
}

impl Literal {
    pub fn positive(term: Term) -> Self {
        Self {
            sign: Sign::Positive,
            atom: Atom::Symbolic(term),
        }
    }

    pub fn negated(term: Term) -> Self {
        Self {
            sign: Sign::Negated,
            atom: Atom::Symbolic(term),
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self {
            sign: Sign::Positive,
            atom: Atom::Boolean(value),
        }
    }

    /// `not L`.
    pub fn negate(&self) -> Self {
        Self {
            sign: self.sign.negate(),
            atom: self.atom.clone(),
        }
    }

    pub fn is_false(&self) -> bool {
        self.sign == Sign::Positive && self.atom == Atom::Boolean(false)
    }

    pub fn collect_variables(&self, out: &mut Vec<String>) {
        match &self.atom {
            Atom::Symbolic(term) => term.collect_variables(out),
            Atom::Boolean(_) => {}
            Atom::Comparison(lhs, _, rhs) => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
        }
    }
}

// --- Aggregates ---

/// `term <op> {..}` on the left, `{..} <op> term` on the right.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guard {
    pub comparator: Comparator,
    pub term: Term,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChoiceElement {
    pub literal: Literal,
    pub condition: Vec<Literal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChoiceAggregate {
    pub left: Option<Guard>,
    pub elements: Vec<ChoiceElement>,
    pub right: Option<Guard>,
}

impl ChoiceAggregate {
    /// `{ L }` for a single unconditional literal.
    pub fn single(literal: Literal) -> Self {
        Self {
            left: None,
            elements: vec![ChoiceElement {
                literal,
                condition: Vec::new(),
            }],
            right: None,
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.left.is_some() || self.right.is_some()
    }

    /// The same elements without cardinality bounds.
    pub fn unbounded(&self) -> Self {
        Self {
            left: None,
            elements: self.elements.clone(),
            right: None,
        }
    }

    /// Variables of the guards only; element variables are local.
    pub fn collect_global_variables(&self, out: &mut Vec<String>) {
        for guard in self.left.iter().chain(self.right.iter()) {
            guard.term.collect_variables(out);
        }
    }

    pub fn collect_variables(&self, out: &mut Vec<String>) {
        if let Some(guard) = &self.left {
            guard.term.collect_variables(out);
        }
        for element in &self.elements {
            element.literal.collect_variables(out);
            element
                .condition
                .iter()
                .for_each(|lit| lit.collect_variables(out));
        }
        if let Some(guard) = &self.right {
            guard.term.collect_variables(out);
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString, Display, AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum AggregateFunction {
    Count,
    Sum,
}

/// `t1, .., tn : condition`; an element counts once per distinct tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggregateElement {
    pub terms: Vec<Term>,
    pub condition: Vec<Literal>,
}

/// `#count { .. }` or `#sum { .. }` in a rule body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SetAggregate {
    pub function: AggregateFunction,
    pub left: Option<Guard>,
    pub elements: Vec<AggregateElement>,
    pub right: Option<Guard>,
}

impl SetAggregate {
    /// The variable of `X = #f { .. }` or `#f { .. } = X`.
    pub fn assigned_variable(&self) -> Option<&str> {
        self.left
            .iter()
            .chain(self.right.iter())
            .find_map(|guard| match (&guard.comparator, &guard.term) {
                (Comparator::Eq, Term::Variable(name)) => Some(name.as_str()),
                _ => None,
            })
    }

    pub fn collect_global_variables(&self, out: &mut Vec<String>) {
        for guard in self.left.iter().chain(self.right.iter()) {
            guard.term.collect_variables(out);
        }
    }
}

// --- Theory atoms ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum TheoryKind {
    Weight,
    Log,
    Problog,
    Random,
    Pr,
    Obs,
    Do,
    Query,
    Evidence,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TheoryElement {
    pub terms: Vec<Term>,
    pub condition: Vec<Literal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TheoryAtom {
    pub name: String,
    pub arguments: Vec<Term>,
    pub elements: Vec<TheoryElement>,
    pub guard: Option<Guard>,
}

impl TheoryAtom {
    /// The recognised kind, or `None` for theory atoms of other theories.
    pub fn kind(&self) -> Option<TheoryKind> {
        self.name.parse().ok()
    }
}

// --- Rules and statements ---

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Head {
    Literal(Literal),
    Choice(ChoiceAggregate),
    Theory(TheoryAtom),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BodyElement {
    Literal(Literal),
    Aggregate(Sign, ChoiceAggregate),
    SetAggregate(Sign, SetAggregate),
    Theory(TheoryAtom),
}

impl BodyElement {
    /// Global variables in first-occurrence order. Theory atoms are not
    /// scanned and aggregate elements only contribute through their guards.
    pub fn collect_variables(&self, out: &mut Vec<String>) {
        match self {
            BodyElement::Literal(lit) => lit.collect_variables(out),
            BodyElement::Aggregate(_, aggregate) => aggregate.collect_global_variables(out),
            BodyElement::SetAggregate(_, aggregate) => aggregate.collect_global_variables(out),
            BodyElement::Theory(_) => {}
        }
    }
}

impl From<Literal> for BodyElement {
    fn from(lit: Literal) -> Self {
        BodyElement::Literal(lit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    pub head: Head,
    pub body: Vec<BodyElement>,
}

impl Rule {
    pub fn new(head: Head, body: Vec<BodyElement>) -> Self {
        Self { head, body }
    }

    pub fn fact(term: Term) -> Self {
        Self::new(Head::Literal(Literal::positive(term)), Vec::new())
    }

    /// `:- body.`
    pub fn constraint(body: Vec<BodyElement>) -> Self {
        Self::new(Head::Literal(Literal::boolean(false)), body)
    }

    pub fn collect_variables(&self, out: &mut Vec<String>) {
        match &self.head {
            Head::Literal(lit) => lit.collect_variables(out),
            Head::Choice(aggregate) => aggregate.collect_global_variables(out),
            Head::Theory(_) => {}
        }
        self.body.iter().for_each(|elem| elem.collect_variables(out));
    }
}

/// `:~ body. [weight@priority, terms]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WeakConstraint {
    pub weight: Term,
    pub priority: u32,
    pub terms: Vec<Term>,
    pub body: Vec<BodyElement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub name: String,
    pub arity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Statement {
    Rule(Rule),
    WeakConstraint(WeakConstraint),
    Show(Option<Signature>),
    External(Term),
    Const(String, Term),
    Program(String),
    /// Verbatim program text, used for the fixed meta encodings.
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl Program {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }

    pub fn push(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Rule(rule) => Some(rule),
            _ => None,
        })
    }

    pub fn weak_constraints(&self) -> impl Iterator<Item = &WeakConstraint> {
        self.statements.iter().filter_map(|s| match s {
            Statement::WeakConstraint(wc) => Some(wc),
            _ => None,
        })
    }
}

impl Extend<Statement> for Program {
    fn extend<T: IntoIterator<Item = Statement>>(&mut self, iter: T) {
        self.statements.extend(iter)
    }
}

impl FromIterator<Statement> for Program {
    fn from_iter<T: IntoIterator<Item = Statement>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// --- AST Building Logic ---

pub fn build_program(pairs: Pairs<'_, GrammarRule>) -> Result<Program, AstBuildError> {
    let mut statements = Vec::new();

    for pair in pairs.flat_map(|p| {
        if p.as_rule() == GrammarRule::program {
            p.into_inner().collect::<Vec<_>>()
        } else {
            vec![p]
        }
    }) {
        match pair.as_rule() {
            GrammarRule::rule => statements.push(Statement::Rule(build_rule(pair)?)),
            GrammarRule::weak_constraint => {
                statements.push(Statement::WeakConstraint(build_weak_constraint(pair)?))
            }
            GrammarRule::show => {
                let signature = pair.into_inner().next().map(build_signature).transpose()?;
                statements.push(Statement::Show(signature));
            }
            GrammarRule::external => {
                let term = build_term(single_inner(pair)?)?;
                statements.push(Statement::External(term));
            }
            GrammarRule::const_def => {
                let mut inner = pair.into_inner();
                let name = next_pair(&mut inner, "constant name")?.as_str().to_string();
                let value = build_term(next_pair(&mut inner, "constant value")?)?;
                statements.push(Statement::Const(name, value));
            }
            GrammarRule::program_part => {
                let name = single_inner(pair)?.as_str().to_string();
                statements.push(Statement::Program(name));
            }
            GrammarRule::EOI => break,
            _ => return Err(ast_err!(UnexpectedRule, &pair)),
        }
    }

    Ok(Program { statements })
}

fn next_pair<'a>(
    pairs: &mut Pairs<'a, GrammarRule>,
    what: &str,
) -> Result<Pair<'a, GrammarRule>, AstBuildError> {
    pairs
        .next()
        .ok_or_else(|| AstBuildError::Internal(format!("missing {}", what)))
}

fn single_inner(pair: Pair<'_, GrammarRule>) -> Result<Pair<'_, GrammarRule>, AstBuildError> {
    let kind = pair.as_rule();
    pair.into_inner()
        .next()
        .ok_or_else(|| AstBuildError::Internal(format!("{:?} has no inner pair", kind)))
}

fn build_signature(pair: Pair<'_, GrammarRule>) -> Result<Signature, AstBuildError> {
    let mut inner = pair.into_inner();
    let name = next_pair(&mut inner, "signature name")?.as_str().to_string();
    let arity_pair = next_pair(&mut inner, "signature arity")?;
    let arity = arity_pair
        .as_str()
        .parse()
        .map_err(|_| ast_err!(InvalidLiteralFormat, "arity", &arity_pair))?;
    Ok(Signature { name, arity })
}

fn build_rule(pair: Pair<'_, GrammarRule>) -> Result<Rule, AstBuildError> {
    let mut head = None;
    let mut body = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            GrammarRule::head => head = Some(build_head(single_inner(inner)?)?),
            GrammarRule::body => body = build_body(inner)?,
            _ => return Err(ast_err!(UnexpectedRule, &inner)),
        }
    }
    // `:- body.` has no head pair
    let head = head.unwrap_or_else(|| Head::Literal(Literal::boolean(false)));
    Ok(Rule { head, body })
}

fn build_head(pair: Pair<'_, GrammarRule>) -> Result<Head, AstBuildError> {
    match pair.as_rule() {
        GrammarRule::theory_atom => Ok(Head::Theory(build_theory_atom(pair)?)),
        GrammarRule::choice => Ok(Head::Choice(build_choice(pair)?)),
        GrammarRule::literal => Ok(Head::Literal(build_literal(pair)?)),
        _ => Err(ast_err!(UnexpectedRule, &pair)),
    }
}

fn build_body(pair: Pair<'_, GrammarRule>) -> Result<Vec<BodyElement>, AstBuildError> {
    pair.into_inner()
        .map(|elem| match elem.as_rule() {
            GrammarRule::theory_atom => Ok(BodyElement::Theory(build_theory_atom(elem)?)),
            GrammarRule::literal => Ok(BodyElement::Literal(build_literal(elem)?)),
            GrammarRule::body_aggregate => {
                let mut sign = Sign::Positive;
                let mut aggregate = None;
                for inner in elem.into_inner() {
                    match inner.as_rule() {
                        GrammarRule::sign => sign = build_sign(inner),
                        GrammarRule::choice => aggregate = Some(build_choice(inner)?),
                        _ => return Err(ast_err!(UnexpectedRule, &inner)),
                    }
                }
                let aggregate = aggregate
                    .ok_or_else(|| AstBuildError::Internal("aggregate without braces".into()))?;
                Ok(BodyElement::Aggregate(sign, aggregate))
            }
            GrammarRule::set_aggregate => {
                let mut sign = Sign::Positive;
                let mut inner = elem.into_inner().peekable();
                if let Some(pair) = inner.next_if(|p| p.as_rule() == GrammarRule::sign) {
                    sign = build_sign(pair);
                }
                Ok(BodyElement::SetAggregate(sign, build_set_aggregate(inner)?))
            }
            _ => Err(ast_err!(UnexpectedRule, &elem)),
        })
        .collect()
}

fn build_weak_constraint(pair: Pair<'_, GrammarRule>) -> Result<WeakConstraint, AstBuildError> {
    let mut body = Vec::new();
    let mut weight = None;
    let mut priority = 0;
    let mut terms = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            GrammarRule::body => body = build_body(inner)?,
            GrammarRule::weight_spec => {
                let mut spec = inner.into_inner();
                weight = Some(build_term(next_pair(&mut spec, "weight")?)?);
                if let Some(level) = spec.next() {
                    priority = level
                        .as_str()
                        .parse()
                        .map_err(|_| ast_err!(InvalidLiteralFormat, "priority", &level))?;
                }
            }
            _ => terms.push(build_term(inner)?),
        }
    }
    let weight = weight.ok_or_else(|| AstBuildError::Internal("missing weight".into()))?;
    Ok(WeakConstraint {
        weight,
        priority,
        terms,
        body,
    })
}

fn build_sign(pair: Pair<'_, GrammarRule>) -> Sign {
    match pair.into_inner().count() {
        1 => Sign::Negated,
        _ => Sign::DoubleNegated,
    }
}

fn build_literal(pair: Pair<'_, GrammarRule>) -> Result<Literal, AstBuildError> {
    let mut sign = Sign::Positive;
    let mut atom = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            GrammarRule::sign => sign = build_sign(inner),
            GrammarRule::boolean => atom = Some(Atom::Boolean(inner.as_str() == "#true")),
            GrammarRule::symbolic_atom => {
                atom = Some(Atom::Symbolic(build_term(single_inner(inner)?)?))
            }
            GrammarRule::comparison => {
                let mut parts = inner.into_inner();
                let lhs = build_term(next_pair(&mut parts, "left operand")?)?;
                let op = build_comparator(&next_pair(&mut parts, "comparator")?)?;
                let rhs = build_term(next_pair(&mut parts, "right operand")?)?;
                atom = Some(Atom::Comparison(lhs, op, rhs));
            }
            _ => return Err(ast_err!(UnexpectedRule, &inner)),
        }
    }
    let atom = atom.ok_or_else(|| AstBuildError::Internal("literal without atom".into()))?;
    Ok(Literal { sign, atom })
}

fn build_comparator(pair: &Pair<'_, GrammarRule>) -> Result<Comparator, AstBuildError> {
    match pair.as_str() {
        "=" | "==" => Ok(Comparator::Eq),
        "!=" => Ok(Comparator::Ne),
        "<" => Ok(Comparator::Lt),
        "<=" => Ok(Comparator::Le),
        ">" => Ok(Comparator::Gt),
        ">=" => Ok(Comparator::Ge),
        _ => Err(ast_err!(InvalidLiteralFormat, "comparator", pair)),
    }
}

fn build_guard(pair: Pair<'_, GrammarRule>) -> Result<Guard, AstBuildError> {
    // An omitted comparator means `<=` on either side.
    let mut comparator = Comparator::Le;
    let mut term = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            GrammarRule::comparator => comparator = build_comparator(&inner)?,
            _ => term = Some(build_term(inner)?),
        }
    }
    let term = term.ok_or_else(|| AstBuildError::Internal("guard without term".into()))?;
    Ok(Guard { comparator, term })
}

fn build_condition(pair: Pair<'_, GrammarRule>) -> Result<Vec<Literal>, AstBuildError> {
    pair.into_inner().map(build_literal).collect()
}

fn build_choice(pair: Pair<'_, GrammarRule>) -> Result<ChoiceAggregate, AstBuildError> {
    let mut aggregate = ChoiceAggregate {
        left: None,
        elements: Vec::new(),
        right: None,
    };
    for inner in pair.into_inner() {
        match inner.as_rule() {
            GrammarRule::left_guard => aggregate.left = Some(build_guard(inner)?),
            GrammarRule::right_guard => aggregate.right = Some(build_guard(inner)?),
            GrammarRule::choice_element => {
                let mut parts = inner.into_inner();
                let literal = build_literal(next_pair(&mut parts, "choice literal")?)?;
                let condition = parts
                    .next()
                    .map(build_condition)
                    .transpose()?
                    .unwrap_or_default();
                aggregate.elements.push(ChoiceElement { literal, condition });
            }
            _ => return Err(ast_err!(UnexpectedRule, &inner)),
        }
    }
    Ok(aggregate)
}

fn build_set_aggregate<'a>(
    pairs: impl Iterator<Item = Pair<'a, GrammarRule>>,
) -> Result<SetAggregate, AstBuildError> {
    let mut function = None;
    let mut left = None;
    let mut elements = Vec::new();
    let mut right = None;
    for inner in pairs {
        match inner.as_rule() {
            GrammarRule::left_guard => left = Some(build_guard(inner)?),
            GrammarRule::right_guard => right = Some(build_guard(inner)?),
            GrammarRule::aggregate_function => {
                let name = inner.as_str().trim_start_matches('#');
                function = Some(
                    name.parse()
                        .map_err(|_| ast_err!(InvalidLiteralFormat, "aggregate function", &inner))?,
                );
            }
            GrammarRule::aggregate_element => {
                let mut terms = Vec::new();
                let mut condition = Vec::new();
                for part in inner.into_inner() {
                    match part.as_rule() {
                        GrammarRule::condition => condition = build_condition(part)?,
                        _ => terms.push(build_term(part)?),
                    }
                }
                elements.push(AggregateElement { terms, condition });
            }
            _ => return Err(ast_err!(UnexpectedRule, &inner)),
        }
    }
    let function =
        function.ok_or_else(|| AstBuildError::Internal("aggregate without function".into()))?;
    Ok(SetAggregate {
        function,
        left,
        elements,
        right,
    })
}

fn build_theory_atom(pair: Pair<'_, GrammarRule>) -> Result<TheoryAtom, AstBuildError> {
    let mut atom = TheoryAtom {
        name: String::new(),
        arguments: Vec::new(),
        elements: Vec::new(),
        guard: None,
    };
    for inner in pair.into_inner() {
        match inner.as_rule() {
            GrammarRule::identifier => atom.name = inner.as_str().to_string(),
            GrammarRule::theory_arguments => {
                atom.arguments = inner.into_inner().map(build_term).collect::<Result<_, _>>()?
            }
            GrammarRule::theory_elements => {
                for element in inner.into_inner() {
                    let mut terms = Vec::new();
                    let mut condition = Vec::new();
                    for part in element.into_inner() {
                        match part.as_rule() {
                            GrammarRule::condition => condition = build_condition(part)?,
                            _ => terms.push(build_term(part)?),
                        }
                    }
                    atom.elements.push(TheoryElement { terms, condition });
                }
            }
            GrammarRule::theory_guard => {
                let mut parts = inner.into_inner();
                let comparator = build_comparator(&next_pair(&mut parts, "theory comparator")?)?;
                let term = build_term(next_pair(&mut parts, "theory guard term")?)?;
                atom.guard = Some(Guard { comparator, term });
            }
            _ => return Err(ast_err!(UnexpectedRule, &inner)),
        }
    }
    Ok(atom)
}

pub(crate) fn build_term(pair: Pair<'_, GrammarRule>) -> Result<Term, AstBuildError> {
    match pair.as_rule() {
        GrammarRule::variable => Ok(Term::variable(pair.as_str())),
        GrammarRule::constant => Ok(Term::constant(pair.as_str())),
        GrammarRule::number => pair
            .as_str()
            .parse::<i64>()
            .map(Term::number)
            .map_err(|_| ast_err!(InvalidLiteralFormat, "number", &pair)),
        GrammarRule::string => {
            let raw = single_inner(pair)?.as_str();
            Ok(Term::string(unescape(raw)))
        }
        GrammarRule::function => {
            let mut inner = pair.into_inner();
            let name = next_pair(&mut inner, "function name")?.as_str().to_string();
            let args = inner.map(build_term).collect::<Result<Vec<_>, _>>()?;
            Ok(Term::function(name, args))
        }
        GrammarRule::script_call => {
            let mut inner = pair.into_inner();
            let name = next_pair(&mut inner, "script name")?.as_str().to_string();
            let args = inner.map(build_term).collect::<Result<Vec<_>, _>>()?;
            Ok(Term::Script(name, args))
        }
        GrammarRule::tuple => {
            let mut args = Vec::new();
            let mut trailing_comma = false;
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    GrammarRule::trailing_comma => trailing_comma = true,
                    _ => args.push(build_term(inner)?),
                }
            }
            // `(t)` is just a parenthesised term, `(t,)` is a one-tuple
            if args.len() == 1 && !trailing_comma {
                Ok(args.remove(0))
            } else {
                Ok(Term::Tuple(args))
            }
        }
        GrammarRule::term_only => build_term(single_inner(pair)?),
        _ => Err(ast_err!(Generic, &pair, "expected a term, found {:?}", pair.as_rule())),
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::lang::parse;

    #[test]
    fn test_symbol_term_conversion() {
        let symbol = Symbol::function(
            "attr",
            vec![
                Symbol::tuple(vec![Symbol::constant("d1")]),
                Symbol::Number(3),
            ],
        );
        let term = Term::from(symbol.clone());
        assert_eq!(
            term,
            Term::function(
                "attr",
                vec![Term::tuple(vec![Term::constant("d1")]), Term::number(3)]
            )
        );
        assert_eq!(term.to_symbol(), Some(symbol));
        assert_eq!(Term::variable("X").to_symbol(), None);
    }

    #[test]
    fn test_variables_first_occurrence_order() {
        let program = parse("h(Y, X) :- p(X, Z), q(Y), Z > X.").unwrap();
        let rule = program.rules().next().unwrap();
        let mut vars = Vec::new();
        rule.collect_variables(&mut vars);
        assert_eq!(vars, vec!["Y", "X", "Z"]);
    }

    #[test]
    fn test_theory_atom_variables_are_skipped() {
        let program = parse("a(X) :- b(X), &weight(W).").unwrap();
        let mut vars = Vec::new();
        program.rules().next().unwrap().collect_variables(&mut vars);
        assert_eq!(vars, vec!["X"]);
    }

    #[test]
    fn test_build_rule_shapes() {
        let program = parse(
            r#"
            a.
            :- b, not c.
            { x; y : z } = 1 :- not not w.
            &random(r) { h(D, Y) : v(Y) } :- dom(D).
            &pr { h(d, y) } = "3/20".
            :~ p(X). [2@1, X]
            "#,
        )
        .unwrap();
        assert_eq!(program.statements.len(), 6);

        let rules: Vec<_> = program.rules().collect();
        assert_eq!(rules[0], &Rule::fact(Term::constant("a")));
        assert!(matches!(&rules[1].head, Head::Literal(lit) if lit.is_false()));
        assert_eq!(
            rules[1].body[1],
            BodyElement::Literal(Literal::negated(Term::constant("c")))
        );

        let Head::Choice(choice) = &rules[2].head else {
            panic!("expected choice head");
        };
        assert_eq!(choice.elements.len(), 2);
        assert_eq!(choice.elements[1].condition.len(), 1);
        assert_eq!(
            choice.right,
            Some(Guard {
                comparator: Comparator::Eq,
                term: Term::number(1)
            })
        );
        assert!(
            matches!(&rules[2].body[0], BodyElement::Literal(lit) if lit.sign == Sign::DoubleNegated)
        );

        let Head::Theory(random) = &rules[3].head else {
            panic!("expected theory head");
        };
        assert_eq!(random.kind(), Some(TheoryKind::Random));
        assert_eq!(random.arguments, vec![Term::constant("r")]);
        assert_eq!(random.elements[0].condition.len(), 1);

        let Head::Theory(pr) = &rules[4].head else {
            panic!("expected theory head");
        };
        assert_eq!(pr.guard.as_ref().unwrap().term, Term::string("3/20"));

        let wc = program.weak_constraints().next().unwrap();
        assert_eq!(wc.weight, Term::number(2));
        assert_eq!(wc.priority, 1);
        assert_eq!(wc.terms, vec![Term::variable("X")]);
    }

    #[test]
    fn test_tuples_and_parentheses() {
        let program = parse("p((a,), (b), (), (c, d)).").unwrap();
        let rule = program.rules().next().unwrap();
        let Head::Literal(Literal {
            atom: Atom::Symbolic(term),
            ..
        }) = &rule.head
        else {
            panic!("expected literal head");
        };
        assert_eq!(
            term.arguments(),
            &[
                Term::tuple(vec![Term::constant("a")]),
                Term::constant("b"),
                Term::tuple(vec![]),
                Term::tuple(vec![Term::constant("c"), Term::constant("d")]),
            ]
        );
    }

    #[test]
    fn test_set_aggregates_and_script_calls() {
        let program = parse(
            "m(E,S) :- l(E), S = #sum { P,A : x(E,A,P); 1 : y }.
             n :- not 2 <= #count { A : r(A), not s(A) }.
             :~ m(E,S). [@cost(S,3)@0,E]",
        )
        .unwrap();
        let rules: Vec<_> = program.rules().collect();

        let BodyElement::SetAggregate(Sign::Positive, sum) = &rules[0].body[1] else {
            panic!("expected a set aggregate");
        };
        assert_eq!(sum.function, AggregateFunction::Sum);
        assert_eq!(sum.assigned_variable(), Some("S"));
        assert_eq!(sum.elements.len(), 2);
        assert_eq!(sum.elements[0].terms.len(), 2);
        assert!(sum.elements[1].condition.is_empty());

        let BodyElement::SetAggregate(Sign::Negated, count) = &rules[1].body[0] else {
            panic!("expected a negated set aggregate");
        };
        assert_eq!(count.function, AggregateFunction::Count);
        assert_eq!(count.assigned_variable(), None);
        assert_eq!(count.elements[0].condition.len(), 2);

        let wc = program.weak_constraints().next().unwrap();
        assert_eq!(
            wc.weight,
            Term::Script(
                "cost".to_string(),
                vec![Term::variable("S"), Term::number(3)]
            )
        );
        assert!(!wc.weight.is_ground());
        assert_eq!(wc.weight.to_symbol(), None);
        assert_eq!(wc.terms, vec![Term::variable("E")]);
    }

    #[test]
    fn test_unknown_theory_name_is_kept() {
        let program = parse("&diff { x; y } <= 3.").unwrap();
        let rule = program.rules().next().unwrap();
        let Head::Theory(atom) = &rule.head else {
            panic!("expected theory head");
        };
        assert_eq!(atom.kind(), None);
        assert_eq!(atom.elements.len(), 2);
    }
}
