//! Bottom-up instantiation of non-ground programs.
//!
//! Grounding runs in two passes. The first computes every atom that can
//! possibly be derived, treating negative literals and choice aggregates as
//! satisfiable. The second instantiates each statement by joining its
//! positive body literals against those atoms and translates the rest of the
//! body into solver literals over [`GroundProgram`].
//!
//! `#sum` and `#count` are evaluated during the join. Their elements may only
//! depend on certain atoms, those derived from facts by rules without
//! negation, so each instance has a single value.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use itertools::Itertools;
use log::{debug, trace};

use crate::{
    lang::{
        self, AggregateFunction, Atom, BodyElement, ChoiceAggregate, Comparator, Head, Literal,
        Rule, SetAggregate, Sign, Statement, Symbol, Term, WeakConstraint,
    },
    solver::{
        naive::{GroundProgram, NormalRule},
        AtomId, Backend, EngineError, GroundTheoryAtom, Lit, ScriptFunction, WeightedLiteral,
    },
};

/// Possible atoms beyond this are refused.
pub const MAX_POSSIBLE_ATOMS: usize = 100_000;

/// A map from the variables of a statement to their values for one instance.
pub type Bindings = HashMap<String, Symbol>;

/// What one grounding pass produced besides rules.
#[derive(Debug, Default)]
pub(crate) struct Grounding {
    pub externals: Vec<AtomId>,
    pub theory_atoms: Vec<GroundTheoryAtom>,
    pub minimize: BTreeMap<i32, Vec<WeightedLiteral>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroundLit {
    True,
    False,
    Lit(Lit),
}

impl From<bool> for GroundLit {
    fn from(value: bool) -> Self {
        if value {
            GroundLit::True
        } else {
            GroundLit::False
        }
    }
}

/// A body item as seen by the join.
#[derive(Debug)]
enum Item<'p> {
    /// Positive symbolic literal, matched against the possible atoms.
    Match(&'p Term),
    /// Comparison, which can bind a variable through `X = t`.
    Compare(Sign, &'p Term, Comparator, &'p Term),
    /// Evaluated after the join; only needs its variables bound.
    Check(Vec<String>),
    /// `#count`/`#sum`, run after every match; `X = #f {..}` binds `X`.
    Aggregate(Sign, &'p SetAggregate),
}

impl Item<'_> {
    fn variables(&self) -> Vec<String> {
        match self {
            Item::Match(term) => term_variables(term),
            Item::Compare(_, lhs, _, rhs) => {
                let mut out = term_variables(lhs);
                rhs.collect_variables(&mut out);
                out
            }
            Item::Check(vars) => vars.clone(),
            Item::Aggregate(_, aggregate) => {
                let mut out = Vec::new();
                aggregate.collect_global_variables(&mut out);
                out
            }
        }
    }
}

fn term_variables(term: &Term) -> Vec<String> {
    let mut out = Vec::new();
    term.collect_variables(&mut out);
    out
}

fn literal_variables(literal: &Literal) -> Vec<String> {
    let mut out = Vec::new();
    literal.collect_variables(&mut out);
    out
}

fn literal_item(literal: &Literal) -> Item<'_> {
    match (&literal.sign, &literal.atom) {
        (Sign::Positive, Atom::Symbolic(term)) => Item::Match(term),
        (sign, Atom::Comparison(lhs, op, rhs)) => Item::Compare(*sign, lhs, *op, rhs),
        _ => Item::Check(literal_variables(literal)),
    }
}

fn head_variables(head: &Head) -> Vec<String> {
    let mut out = Vec::new();
    match head {
        Head::Literal(literal) => literal.collect_variables(&mut out),
        Head::Choice(aggregate) => aggregate.collect_global_variables(&mut out),
        Head::Theory(atom) => atom
            .arguments
            .iter()
            .for_each(|arg| arg.collect_variables(&mut out)),
    }
    out
}

fn signature(term: &Term) -> Option<(&str, usize)> {
    match term {
        Term::Constant(Symbol::Function(name, args)) => Some((name, args.len())),
        Term::Function(name, args) => Some((name, args.len())),
        Term::Tuple(args) => Some(("", args.len())),
        _ => None,
    }
}

fn assigned_variable(sign: Sign, aggregate: &SetAggregate) -> Option<&str> {
    match sign {
        Sign::Positive => aggregate.assigned_variable(),
        _ => None,
    }
}

/// Rules whose head holds in every model once their body matches.
fn is_definite(rule: &Rule) -> bool {
    let positive = |literal: &Literal| match &literal.atom {
        Atom::Symbolic(_) => literal.sign == Sign::Positive,
        Atom::Comparison(..) => true,
        Atom::Boolean(_) => false,
    };
    let head = match &rule.head {
        Head::Literal(literal) => {
            literal.sign == Sign::Positive && matches!(literal.atom, Atom::Symbolic(_))
        }
        _ => false,
    };
    head && rule.body.iter().all(|element| match element {
        BodyElement::Literal(literal) => positive(literal),
        _ => false,
    })
}

fn apply_sign(sign: Sign, value: bool) -> bool {
    match sign {
        Sign::Negated => !value,
        Sign::Positive | Sign::DoubleNegated => value,
    }
}

/// One instance of an aggregate element: its literal and ground condition.
#[derive(Debug)]
struct ElementInstance {
    index: usize,
    literal: GroundLit,
    condition: Vec<Lit>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum ElementKey {
    Lit(Lit),
    Fixed(usize),
}

pub(crate) struct Grounder<'g> {
    ground: &'g mut GroundProgram,
    functions: &'g HashMap<String, ScriptFunction>,
    consts: HashMap<String, Symbol>,
    possible: HashSet<Symbol>,
    certain: HashSet<Symbol>,
    by_signature: HashMap<(String, usize), Vec<Symbol>>,
    double_negations: HashMap<AtomId, AtomId>,
    truth: Option<AtomId>,
}

impl<'g> Grounder<'g> {
    pub fn new(
        ground: &'g mut GroundProgram,
        functions: &'g HashMap<String, ScriptFunction>,
    ) -> Self {
        let mut grounder = Self {
            ground,
            functions,
            consts: HashMap::new(),
            possible: HashSet::new(),
            certain: HashSet::new(),
            by_signature: HashMap::new(),
            double_negations: HashMap::new(),
            truth: None,
        };
        let known: Vec<Symbol> = grounder.ground.symbols().cloned().collect();
        for symbol in known {
            grounder.add_possible(symbol);
        }
        grounder
    }

    pub fn ground(mut self, statements: &[Statement]) -> Result<Grounding, EngineError> {
        let mut out = Grounding::default();
        let active = self.active_statements(statements)?;

        for statement in &active {
            if let Statement::External(term) = statement {
                let symbol = self.eval(term, &Bindings::new())?;
                let atom = self.ground.atom(&symbol);
                self.add_possible(symbol);
                out.externals.push(atom);
            }
        }

        let rules: Vec<&Rule> = active
            .iter()
            .filter_map(|s| match s {
                Statement::Rule(rule) => Some(rule),
                _ => None,
            })
            .collect();
        self.derive_certain_atoms(&rules)?;
        self.derive_atoms(&rules)?;

        let mut weak: BTreeMap<(i32, i64, Vec<Symbol>), Vec<Vec<Lit>>> = BTreeMap::new();
        for statement in &active {
            match statement {
                Statement::Rule(rule) => self.instantiate_rule(rule, &mut out)?,
                Statement::WeakConstraint(wc) => self.instantiate_weak_constraint(wc, &mut weak)?,
                _ => {}
            }
        }
        for ((priority, weight, _), bodies) in weak {
            let lit = self.disjunction(&bodies)?;
            out.minimize.entry(priority).or_default().push((lit, weight));
        }
        debug!(
            "Grounding produced {} rules, {} weight rules over {} atoms",
            self.ground.rules.len(),
            self.ground.weight_rules.len(),
            self.ground.len()
        );
        Ok(out)
    }

    /// Statements of the `base` part, with constants collected. Verbatim
    /// program text is parsed, except for theory declarations.
    fn active_statements(
        &mut self,
        statements: &[Statement],
    ) -> Result<Vec<Statement>, EngineError> {
        let mut active = Vec::new();
        let mut in_base = true;
        for statement in statements {
            match statement {
                Statement::Program(name) => {
                    in_base = name == "base";
                    if !in_base {
                        debug!("Skipping program part {}", name);
                    }
                }
                _ if !in_base => {}
                Statement::Const(name, term) => {
                    let value = self.eval(term, &Bindings::new())?;
                    self.consts.insert(name.clone(), value);
                }
                Statement::Raw(text) if text.trim_start().starts_with("#theory") => {}
                Statement::Raw(text) => {
                    let program = lang::parse(text).map_err(|e| {
                        let first = text.lines().next().unwrap_or_default();
                        EngineError::Unsupported(format!("{}: {}", first, e))
                    })?;
                    active.extend(self.active_statements(&program.statements)?);
                }
                Statement::Show(_) => {}
                _ => active.push(statement.clone()),
            }
        }
        Ok(active)
    }

    fn add_possible(&mut self, symbol: Symbol) -> bool {
        if self.possible.contains(&symbol) {
            return false;
        }
        if let Symbol::Function(name, args) = &symbol {
            self.by_signature
                .entry((name.clone(), args.len()))
                .or_default()
                .push(symbol.clone());
        }
        self.possible.insert(symbol)
    }

    // --- Terms ---

    fn resolve(&self, symbol: &Symbol) -> Symbol {
        match symbol {
            Symbol::Function(name, args) if args.is_empty() => self
                .consts
                .get(name)
                .cloned()
                .unwrap_or_else(|| symbol.clone()),
            Symbol::Function(name, args) => {
                Symbol::Function(name.clone(), args.iter().map(|a| self.resolve(a)).collect())
            }
            _ => symbol.clone(),
        }
    }

    fn eval(&self, term: &Term, bindings: &Bindings) -> Result<Symbol, EngineError> {
        match term {
            Term::Variable(name) => bindings
                .get(name)
                .cloned()
                .ok_or_else(|| EngineError::NonGround(format!("unbound variable {}", name))),
            Term::Constant(symbol) => Ok(self.resolve(symbol)),
            Term::Function(name, args) => Ok(Symbol::Function(
                name.clone(),
                args.iter()
                    .map(|a| self.eval(a, bindings))
                    .collect::<Result<_, _>>()?,
            )),
            Term::Tuple(args) => Ok(Symbol::tuple(
                args.iter()
                    .map(|a| self.eval(a, bindings))
                    .collect::<Result<_, _>>()?,
            )),
            Term::Script(name, args) => {
                let function = self
                    .functions
                    .get(name)
                    .ok_or_else(|| EngineError::UnknownFunction(name.clone()))?;
                let values = args
                    .iter()
                    .map(|a| self.eval(a, bindings))
                    .collect::<Result<Vec<_>, _>>()?;
                function(&values).ok_or_else(|| EngineError::Script {
                    name: name.clone(),
                    arguments: values.iter().join(","),
                })
            }
        }
    }

    fn unify(&self, pattern: &Term, value: &Symbol, bindings: &mut Bindings) -> bool {
        match (pattern, value) {
            (Term::Variable(name), _) => match bindings.get(name) {
                Some(bound) => bound == value,
                None => {
                    bindings.insert(name.clone(), value.clone());
                    true
                }
            },
            (Term::Constant(symbol), _) => self.resolve(symbol) == *value,
            (Term::Function(name, args), Symbol::Function(vname, vargs)) => {
                name == vname && self.unify_all(args, vargs, bindings)
            }
            (Term::Tuple(args), Symbol::Function(vname, vargs)) => {
                vname.is_empty() && self.unify_all(args, vargs, bindings)
            }
            (Term::Script(..), _) => self.eval(pattern, bindings).is_ok_and(|v| v == *value),
            _ => false,
        }
    }

    fn unify_all(&self, patterns: &[Term], values: &[Symbol], bindings: &mut Bindings) -> bool {
        patterns.len() == values.len()
            && patterns
                .iter()
                .zip(values)
                .all(|(p, v)| self.unify(p, v, bindings))
    }

    // --- Joins ---

    /// Orders `items` so that every item only runs once its inputs are
    /// bound, or reports the variables that nothing binds.
    fn plan(
        &self,
        items: &[Item<'_>],
        bound: &HashSet<String>,
        context: &dyn std::fmt::Display,
    ) -> Result<Vec<usize>, EngineError> {
        let mut bound = bound.clone();
        let mut remaining: Vec<usize> = (0..items.len()).collect();
        let mut order = Vec::with_capacity(items.len());
        while !remaining.is_empty() {
            let ready = remaining.iter().position(|&i| match &items[i] {
                Item::Match(_) => true,
                Item::Compare(sign, lhs, op, rhs) => {
                    let free: Vec<String> = items[i]
                        .variables()
                        .into_iter()
                        .filter(|v| !bound.contains(v))
                        .collect();
                    free.is_empty()
                        || (*sign == Sign::Positive
                            && *op == Comparator::Eq
                            && free.len() == 1
                            && ((matches!(lhs, Term::Variable(v) if *v == free[0])
                                && !term_variables(rhs).contains(&free[0]))
                                || (matches!(rhs, Term::Variable(v) if *v == free[0])
                                    && !term_variables(lhs).contains(&free[0]))))
                }
                Item::Check(vars) => vars.iter().all(|v| bound.contains(v)),
                Item::Aggregate(sign, aggregate) => {
                    let assigned = assigned_variable(*sign, aggregate);
                    !remaining.iter().any(|&j| matches!(items[j], Item::Match(_)))
                        && items[i]
                            .variables()
                            .iter()
                            .all(|v| bound.contains(v) || Some(v.as_str()) == assigned)
                }
            });
            let Some(pos) = ready else {
                let unbound = remaining
                    .iter()
                    .flat_map(|&i| items[i].variables())
                    .filter(|v| !bound.contains(v))
                    .unique()
                    .join(", ");
                return Err(EngineError::NonGround(format!(
                    "unsafe variables {} in {}",
                    unbound, context
                )));
            };
            let index = remaining.remove(pos);
            bound.extend(items[index].variables());
            order.push(index);
        }
        Ok(order)
    }

    fn run(
        &self,
        items: &[Item<'_>],
        order: &[usize],
        seed: Bindings,
    ) -> Result<Vec<Bindings>, EngineError> {
        let mut current = vec![seed];
        for &index in order {
            let mut next = Vec::new();
            for bindings in current {
                self.extend(&items[index], bindings, &mut next)?;
            }
            if next.is_empty() {
                return Ok(next);
            }
            current = next;
        }
        Ok(current)
    }

    fn extend(
        &self,
        item: &Item<'_>,
        bindings: Bindings,
        out: &mut Vec<Bindings>,
    ) -> Result<(), EngineError> {
        match item {
            Item::Match(term) => {
                let candidates: Box<dyn Iterator<Item = &Symbol>> = match signature(term) {
                    Some((name, arity)) => Box::new(
                        self.by_signature
                            .get(&(name.to_string(), arity))
                            .into_iter()
                            .flatten(),
                    ),
                    None => Box::new(self.possible.iter()),
                };
                for symbol in candidates {
                    let mut extended = bindings.clone();
                    if self.unify(term, symbol, &mut extended) {
                        out.push(extended);
                    }
                }
            }
            Item::Compare(sign, lhs, op, rhs) => {
                let (lhs, rhs): (&Term, &Term) = (lhs, rhs);
                let unbound = |t: &Term| matches!(t, Term::Variable(v) if !bindings.contains_key(v));
                if unbound(lhs) || unbound(rhs) {
                    let (var, value) = if unbound(lhs) { (lhs, rhs) } else { (rhs, lhs) };
                    let value = self.eval(value, &bindings)?;
                    let mut extended = bindings;
                    if self.unify(var, &value, &mut extended) {
                        out.push(extended);
                    }
                } else {
                    let l = self.eval(lhs, &bindings)?;
                    let r = self.eval(rhs, &bindings)?;
                    if apply_sign(*sign, op.holds(l.cmp(&r))) {
                        out.push(bindings);
                    }
                }
            }
            Item::Check(_) => out.push(bindings),
            Item::Aggregate(sign, aggregate) => {
                let value = Symbol::Number(self.aggregate_value(aggregate, &bindings)?);
                let mut extended = bindings;
                if let Some(var) = assigned_variable(*sign, aggregate) {
                    extended
                        .entry(var.to_string())
                        .or_insert_with(|| value.clone());
                }
                if apply_sign(*sign, self.guards_hold(aggregate, &value, &extended)?) {
                    out.push(extended);
                }
            }
        }
        Ok(())
    }

    fn body_items<'p>(&self, body: &'p [BodyElement]) -> Result<Vec<Item<'p>>, EngineError> {
        body.iter()
            .map(|element| match element {
                BodyElement::Literal(literal) => Ok(literal_item(literal)),
                BodyElement::Aggregate(_, aggregate) => {
                    let mut vars = Vec::new();
                    aggregate.collect_global_variables(&mut vars);
                    Ok(Item::Check(vars))
                }
                BodyElement::SetAggregate(sign, aggregate) => Ok(Item::Aggregate(*sign, aggregate)),
                BodyElement::Theory(atom) => Err(EngineError::Unsupported(format!(
                    "theory atom &{} in a rule body",
                    atom.name
                ))),
            })
            .collect()
    }

    // --- Possible atoms ---

    /// Closure of the definite rules, computed against an empty atom set and
    /// then merged into the possible atoms.
    fn derive_certain_atoms(&mut self, rules: &[&Rule]) -> Result<(), EngineError> {
        let definite: Vec<&Rule> = rules.iter().copied().filter(|r| is_definite(r)).collect();
        let possible = std::mem::take(&mut self.possible);
        let by_signature = std::mem::take(&mut self.by_signature);
        let result = self.derive_atoms(&definite);
        self.certain = std::mem::replace(&mut self.possible, possible);
        self.by_signature = by_signature;
        result?;

        for symbol in self.certain.clone() {
            self.add_possible(symbol);
        }
        debug!("{} certain atoms", self.certain.len());
        Ok(())
    }

    fn derive_atoms(&mut self, rules: &[&Rule]) -> Result<(), EngineError> {
        let mut plans = Vec::with_capacity(rules.len());
        for rule in rules {
            let items: Vec<Item<'_>> = self
                .body_items(&rule.body)?
                .into_iter()
                .filter(|item| !matches!(item, Item::Check(_)))
                .collect();
            let order = self.plan(&items, &HashSet::new(), rule)?;
            plans.push((*rule, items, order));
        }

        let mut iteration = 0;
        loop {
            let mut derived = Vec::new();
            for (rule, items, order) in &plans {
                for bindings in self.run(items, order, Bindings::new())? {
                    self.head_atoms(&rule.head, &bindings, &mut derived)?;
                }
            }
            let mut changed = false;
            for symbol in derived {
                changed |= self.add_possible(symbol);
            }
            trace!(
                "Possible atoms after iteration {}: {}",
                iteration,
                self.possible.len()
            );
            if !changed {
                debug!("Atom fixpoint reached after {} iterations", iteration);
                return Ok(());
            }
            if self.possible.len() > MAX_POSSIBLE_ATOMS {
                return Err(EngineError::TooLarge {
                    atoms: self.possible.len(),
                    limit: MAX_POSSIBLE_ATOMS,
                });
            }
            iteration += 1;
        }
    }

    fn head_atoms(
        &self,
        head: &Head,
        bindings: &Bindings,
        out: &mut Vec<Symbol>,
    ) -> Result<(), EngineError> {
        match head {
            Head::Literal(Literal {
                sign: Sign::Positive,
                atom: Atom::Symbolic(term),
            }) => out.push(self.eval(term, bindings)?),
            Head::Choice(aggregate) => {
                for element in &aggregate.elements {
                    let Atom::Symbolic(term) = &element.literal.atom else {
                        continue;
                    };
                    let items: Vec<Item<'_>> = element
                        .condition
                        .iter()
                        .map(literal_item)
                        .filter(|item| !matches!(item, Item::Check(_)))
                        .collect();
                    let bound: HashSet<String> = bindings.keys().cloned().collect();
                    let order = self.plan(&items, &bound, &element.literal)?;
                    for local in self.run(&items, &order, bindings.clone())? {
                        out.push(self.eval(term, &local)?);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    // --- Instantiation ---

    fn instantiate_rule(&mut self, rule: &Rule, out: &mut Grounding) -> Result<(), EngineError> {
        let mut items = self.body_items(&rule.body)?;
        items.push(Item::Check(head_variables(&rule.head)));
        let order = self.plan(&items, &HashSet::new(), rule)?;
        let instances = self.run(&items, &order, Bindings::new())?;
        trace!("{} instances of {}", instances.len(), rule);

        for bindings in instances {
            let Some(mut body) = self.translate_body(&rule.body, &bindings)? else {
                continue;
            };
            match &rule.head {
                Head::Literal(literal) => match &literal.atom {
                    Atom::Symbolic(_) => match self.translate_literal(literal, &bindings)? {
                        GroundLit::True => {}
                        GroundLit::False => self.ground.add_rule(&[], &body, false)?,
                        GroundLit::Lit(lit) if literal.sign == Sign::Positive => {
                            self.ground.add_rule(&[lit.unsigned_abs()], &body, false)?
                        }
                        // `not a :- B` is `:- B, a`
                        GroundLit::Lit(lit) => {
                            body.push(-lit);
                            self.ground.add_rule(&[], &body, false)?
                        }
                    },
                    Atom::Boolean(value) => {
                        if !apply_sign(literal.sign, *value) {
                            self.ground.add_rule(&[], &body, false)?;
                        }
                    }
                    Atom::Comparison(..) => {
                        return Err(EngineError::Unsupported(format!(
                            "comparison in rule head: {}",
                            rule
                        )))
                    }
                },
                Head::Choice(aggregate) => {
                    self.instantiate_choice(aggregate, &bindings, &body)?;
                }
                Head::Theory(atom) => {
                    let ground = GroundTheoryAtom {
                        name: atom.name.clone(),
                        arguments: atom
                            .arguments
                            .iter()
                            .map(|arg| self.eval(arg, &bindings))
                            .collect::<Result<_, _>>()?,
                    };
                    if !out.theory_atoms.contains(&ground) {
                        out.theory_atoms.push(ground);
                    }
                }
            }
        }
        Ok(())
    }

    fn instantiate_choice(
        &mut self,
        aggregate: &ChoiceAggregate,
        bindings: &Bindings,
        body: &[Lit],
    ) -> Result<(), EngineError> {
        let instances = self.expand_elements(aggregate, bindings, false)?;
        for instance in &instances {
            if let GroundLit::Lit(head) = instance.literal {
                let rule_body = [body, &instance.condition[..]].concat();
                self.ground
                    .add_rule(&[head.unsigned_abs()], &rule_body, true)?;
            }
        }
        if aggregate.is_bounded() {
            match self.count_literal(aggregate, &instances, bindings)? {
                GroundLit::True => {}
                GroundLit::False => self.ground.add_rule(&[], body, false)?,
                GroundLit::Lit(within) => {
                    let constraint = [body, &[-within][..]].concat();
                    self.ground.add_rule(&[], &constraint, false)?;
                }
            }
        }
        Ok(())
    }

    fn instantiate_weak_constraint(
        &mut self,
        wc: &WeakConstraint,
        out: &mut BTreeMap<(i32, i64, Vec<Symbol>), Vec<Vec<Lit>>>,
    ) -> Result<(), EngineError> {
        let mut items = self.body_items(&wc.body)?;
        let mut vars = term_variables(&wc.weight);
        wc.terms.iter().for_each(|t| t.collect_variables(&mut vars));
        items.push(Item::Check(vars));
        let order = self.plan(&items, &HashSet::new(), wc)?;
        let priority = i32::try_from(wc.priority)
            .map_err(|_| EngineError::Unsupported(format!("priority {}", wc.priority)))?;

        for bindings in self.run(&items, &order, Bindings::new())? {
            let Some(body) = self.translate_body(&wc.body, &bindings)? else {
                continue;
            };
            let weight = match self.eval(&wc.weight, &bindings)? {
                Symbol::Number(w) => w,
                other => {
                    return Err(EngineError::Unsupported(format!(
                        "weight {} is not an integer",
                        other
                    )))
                }
            };
            let terms = wc
                .terms
                .iter()
                .map(|t| self.eval(t, &bindings))
                .collect::<Result<Vec<_>, _>>()?;
            out.entry((priority, weight, terms)).or_default().push(body);
        }
        Ok(())
    }

    // --- Literals ---

    /// Ground body, or `None` when some literal is false.
    fn translate_body(
        &mut self,
        body: &[BodyElement],
        bindings: &Bindings,
    ) -> Result<Option<Vec<Lit>>, EngineError> {
        let mut lits = Vec::with_capacity(body.len());
        for element in body {
            let ground = match element {
                BodyElement::Literal(literal) => self.translate_literal(literal, bindings)?,
                BodyElement::Aggregate(sign, aggregate) => {
                    let instances = self.expand_elements(aggregate, bindings, true)?;
                    let count = self.count_literal(aggregate, &instances, bindings)?;
                    self.signed(*sign, count)
                }
                // decided by the join
                BodyElement::SetAggregate(..) => GroundLit::True,
                BodyElement::Theory(atom) => {
                    return Err(EngineError::Unsupported(format!(
                        "theory atom &{} in a rule body",
                        atom.name
                    )))
                }
            };
            match ground {
                GroundLit::True => {}
                GroundLit::False => return Ok(None),
                GroundLit::Lit(lit) => lits.push(lit),
            }
        }
        Ok(Some(lits))
    }

    fn translate_literal(
        &mut self,
        literal: &Literal,
        bindings: &Bindings,
    ) -> Result<GroundLit, EngineError> {
        match &literal.atom {
            Atom::Boolean(value) => Ok(apply_sign(literal.sign, *value).into()),
            Atom::Comparison(lhs, op, rhs) => {
                let l = self.eval(lhs, bindings)?;
                let r = self.eval(rhs, bindings)?;
                Ok(apply_sign(literal.sign, op.holds(l.cmp(&r))).into())
            }
            Atom::Symbolic(term) => {
                let symbol = self.eval(term, bindings)?;
                if !self.possible.contains(&symbol) {
                    return Ok(apply_sign(literal.sign, false).into());
                }
                let atom = self.ground.atom(&symbol);
                Ok(self.signed(literal.sign, GroundLit::Lit(atom as Lit)))
            }
        }
    }

    fn signed(&mut self, sign: Sign, ground: GroundLit) -> GroundLit {
        match (sign, ground) {
            (Sign::Positive, g) => g,
            (_, GroundLit::True) => apply_sign(sign, true).into(),
            (_, GroundLit::False) => apply_sign(sign, false).into(),
            (Sign::Negated, GroundLit::Lit(lit)) => GroundLit::Lit(self.not_lit(lit)),
            (Sign::DoubleNegated, GroundLit::Lit(lit)) => {
                let negated = self.not_lit(lit);
                GroundLit::Lit(self.not_lit(negated))
            }
        }
    }

    /// `not l`; for `l = not a` this is `not n` with `n :- not a`.
    fn not_lit(&mut self, lit: Lit) -> Lit {
        if lit > 0 {
            return -lit;
        }
        let atom = lit.unsigned_abs();
        if let Some(aux) = self.double_negations.get(&atom) {
            return -(*aux as Lit);
        }
        let aux = self.ground.add_atom(None);
        self.ground.rules.push(NormalRule {
            head: vec![aux],
            body: vec![lit],
            choice: false,
        });
        self.double_negations.insert(atom, aux);
        -(aux as Lit)
    }

    /// A literal true iff one of `bodies` holds.
    fn disjunction(&mut self, bodies: &[Vec<Lit>]) -> Result<Lit, EngineError> {
        if bodies.iter().any(Vec::is_empty) {
            return Ok(self.truth()? as Lit);
        }
        if let [single] = bodies {
            if let [lit] = single.as_slice() {
                return Ok(*lit);
            }
        }
        let aux = self.ground.add_atom(None);
        for body in bodies {
            self.ground.add_rule(&[aux], body, false)?;
        }
        Ok(aux as Lit)
    }

    fn truth(&mut self) -> Result<AtomId, EngineError> {
        if let Some(atom) = self.truth {
            return Ok(atom);
        }
        let atom = self.ground.add_atom(None);
        self.ground.add_rule(&[atom], &[], false)?;
        self.truth = Some(atom);
        Ok(atom)
    }

    // --- Aggregates ---

    /// Ground instances of the elements of `aggregate`. In heads the element
    /// literal must be an atom and its variables come from the condition; in
    /// bodies a positive element literal also binds variables.
    fn expand_elements(
        &mut self,
        aggregate: &ChoiceAggregate,
        bindings: &Bindings,
        in_body: bool,
    ) -> Result<Vec<ElementInstance>, EngineError> {
        let mut instances = Vec::new();
        let bound: HashSet<String> = bindings.keys().cloned().collect();
        for (index, element) in aggregate.elements.iter().enumerate() {
            let mut items: Vec<Item<'_>> = element.condition.iter().map(literal_item).collect();
            match (&element.literal.sign, &element.literal.atom) {
                (Sign::Positive, Atom::Symbolic(_)) if in_body => {
                    items.push(literal_item(&element.literal))
                }
                (Sign::Positive, Atom::Symbolic(_)) => {
                    items.push(Item::Check(literal_variables(&element.literal)))
                }
                _ if in_body => items.push(Item::Check(literal_variables(&element.literal))),
                _ => {
                    return Err(EngineError::Unsupported(format!(
                        "choice element {} is not an atom",
                        element.literal
                    )))
                }
            }
            let order = self.plan(&items, &bound, &element.literal)?;
            for local in self.run(&items, &order, bindings.clone())? {
                let mut condition = Vec::with_capacity(element.condition.len());
                let mut holds = true;
                for literal in &element.condition {
                    match self.translate_literal(literal, &local)? {
                        GroundLit::True => {}
                        GroundLit::False => {
                            holds = false;
                            break;
                        }
                        GroundLit::Lit(lit) => condition.push(lit),
                    }
                }
                if !holds {
                    continue;
                }
                let literal = if in_body {
                    self.translate_literal(&element.literal, &local)?
                } else {
                    let symbol = match &element.literal.atom {
                        Atom::Symbolic(term) => self.eval(term, &local)?,
                        _ => continue,
                    };
                    GroundLit::Lit(self.ground.atom(&symbol) as Lit)
                };
                instances.push(ElementInstance {
                    index,
                    literal,
                    condition,
                });
            }
        }
        Ok(instances)
    }

    /// A literal true iff the number of holding elements satisfies the
    /// guards of `aggregate`.
    fn count_literal(
        &mut self,
        aggregate: &ChoiceAggregate,
        instances: &[ElementInstance],
        bindings: &Bindings,
    ) -> Result<GroundLit, EngineError> {
        let mut elements: BTreeMap<ElementKey, Vec<Vec<Lit>>> = BTreeMap::new();
        for instance in instances {
            let (key, conjunction) = match instance.literal {
                GroundLit::False => continue,
                GroundLit::True => (ElementKey::Fixed(instance.index), instance.condition.clone()),
                GroundLit::Lit(lit) => (
                    ElementKey::Lit(lit),
                    [&[lit][..], &instance.condition[..]].concat(),
                ),
            };
            elements.entry(key).or_default().push(conjunction);
        }

        let total = elements.len() as i64;
        let mut fixed = 0i64;
        let mut open = Vec::new();
        for conjunctions in elements.values() {
            if conjunctions.iter().any(Vec::is_empty) {
                fixed += 1;
            } else {
                open.push(self.disjunction(conjunctions)?);
            }
        }

        let left = match &aggregate.left {
            Some(guard) => Some((guard.comparator, self.eval(&guard.term, bindings)?)),
            None => None,
        };
        let right = match &aggregate.right {
            Some(guard) => Some((guard.comparator, self.eval(&guard.term, bindings)?)),
            None => None,
        };
        let allowed = |count: i64| {
            let count = Symbol::Number(count);
            left.as_ref()
                .map_or(true, |(op, bound)| op.holds(bound.cmp(&count)))
                && right
                    .as_ref()
                    .map_or(true, |(op, bound)| op.holds(count.cmp(bound)))
        };

        let mut intervals: Vec<(i64, i64)> = Vec::new();
        for count in fixed..=total {
            if !allowed(count) {
                continue;
            }
            match intervals.last_mut() {
                Some((_, hi)) if *hi + 1 == count => *hi = count,
                _ => intervals.push((count, count)),
            }
        }
        match intervals.as_slice() {
            [] => return Ok(GroundLit::False),
            [(lo, hi)] if *lo == fixed && *hi == total => return Ok(GroundLit::True),
            _ => {}
        }

        let within = self.ground.add_atom(None);
        for (lo, hi) in intervals {
            let mut body = Vec::new();
            if lo > fixed {
                body.push(self.at_least(&open, lo - fixed)? as Lit);
            }
            if hi < total {
                body.push(-(self.at_least(&open, hi + 1 - fixed)? as Lit));
            }
            self.ground.add_rule(&[within], &body, false)?;
        }
        Ok(GroundLit::Lit(within as Lit))
    }

    fn at_least(&mut self, lits: &[Lit], count: i64) -> Result<AtomId, EngineError> {
        let atom = self.ground.add_atom(None);
        let body: Vec<WeightedLiteral> = lits.iter().map(|l| (*l, 1)).collect();
        self.ground.add_weight_rule(&[atom], count, &body, false)?;
        Ok(atom)
    }

    /// Value of a `#count` or `#sum` aggregate. Each distinct element tuple
    /// counts once; `#sum` skips tuples whose first term is not a number.
    fn aggregate_value(
        &self,
        aggregate: &SetAggregate,
        bindings: &Bindings,
    ) -> Result<i64, EngineError> {
        let bound: HashSet<String> = bindings.keys().cloned().collect();
        let mut tuples = BTreeSet::new();
        for element in &aggregate.elements {
            let mut items: Vec<Item<'_>> = element.condition.iter().map(literal_item).collect();
            let mut vars = Vec::new();
            element.terms.iter().for_each(|t| t.collect_variables(&mut vars));
            items.push(Item::Check(vars));
            let order = self.plan(&items, &bound, aggregate)?;
            'instances: for local in self.run(&items, &order, bindings.clone())? {
                for literal in &element.condition {
                    if !self.fixed_truth(literal, &local, aggregate)? {
                        continue 'instances;
                    }
                }
                let tuple = element
                    .terms
                    .iter()
                    .map(|t| self.eval(t, &local))
                    .collect::<Result<Vec<_>, _>>()?;
                tuples.insert(tuple);
            }
        }
        let value = match aggregate.function {
            AggregateFunction::Count => tuples.len() as i64,
            AggregateFunction::Sum => tuples
                .iter()
                .filter_map(|tuple| match tuple.first() {
                    Some(Symbol::Number(n)) => Some(*n),
                    _ => None,
                })
                .sum(),
        };
        trace!("{} = {}", aggregate, value);
        Ok(value)
    }

    /// Truth of an element condition literal, which must not depend on the
    /// model.
    fn fixed_truth(
        &self,
        literal: &Literal,
        bindings: &Bindings,
        aggregate: &SetAggregate,
    ) -> Result<bool, EngineError> {
        let value = match &literal.atom {
            Atom::Boolean(value) => *value,
            Atom::Comparison(lhs, op, rhs) => {
                op.holds(self.eval(lhs, bindings)?.cmp(&self.eval(rhs, bindings)?))
            }
            Atom::Symbolic(term) => {
                let symbol = self.eval(term, bindings)?;
                if self.certain.contains(&symbol) {
                    true
                } else if !self.possible.contains(&symbol) {
                    false
                } else {
                    return Err(EngineError::Unsupported(format!(
                        "{} depends on {}, which is not fixed",
                        aggregate, symbol
                    )));
                }
            }
        };
        Ok(apply_sign(literal.sign, value))
    }

    fn guards_hold(
        &self,
        aggregate: &SetAggregate,
        value: &Symbol,
        bindings: &Bindings,
    ) -> Result<bool, EngineError> {
        if let Some(guard) = &aggregate.left {
            let bound = self.eval(&guard.term, bindings)?;
            if !guard.comparator.holds(bound.cmp(value)) {
                return Ok(false);
            }
        }
        if let Some(guard) = &aggregate.right {
            let bound = self.eval(&guard.term, bindings)?;
            if !guard.comparator.holds(value.cmp(&bound)) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
