//! Ground `&query` atoms and the models they hold in.

use std::{
    collections::BTreeSet,
    fmt::{self, Display, Formatter},
};

use crate::{
    config::{ConfigError, Configuration},
    lang::Symbol,
    solver::{GroundTheoryAtom, Model},
};

/// One ground query `&query(target)` or `&query(target, condition)`, with the
/// indices of the recorded models containing each atom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryEntry {
    pub target: Symbol,
    pub condition: Option<Symbol>,
    pub target_models: BTreeSet<usize>,
    pub condition_models: BTreeSet<usize>,
}

impl QueryEntry {
    pub fn new(target: Symbol, condition: Option<Symbol>) -> Self {
        Self {
            target,
            condition,
            target_models: BTreeSet::new(),
            condition_models: BTreeSet::new(),
        }
    }

    /// Notes that the model recorded at `index` is `model`.
    pub fn record(&mut self, model: &Model, index: usize) {
        if model.contains(&self.target) {
            self.target_models.insert(index);
        }
        if let Some(condition) = &self.condition {
            if model.contains(condition) {
                self.condition_models.insert(index);
            }
        }
    }
}

impl Display for QueryEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.condition {
            Some(condition) => write!(f, "{} | {}", self.target, condition),
            None => write!(f, "{}", self.target),
        }
    }
}

/// Builds one entry per distinct ground `&query` atom.
pub fn collect_queries(
    atoms: &[GroundTheoryAtom],
    config: &Configuration,
) -> Result<Vec<QueryEntry>, ConfigError> {
    let mut queries: Vec<QueryEntry> = Vec::new();
    for atom in atoms.iter().filter(|a| a.name == "query") {
        let entry = match atom.arguments.as_slice() {
            [target] => QueryEntry::new(target.clone(), None),
            [target, condition] => QueryEntry::new(target.clone(), Some(condition.clone())),
            other => {
                log::warn!("ignoring &query atom with {} arguments", other.len());
                continue;
            }
        };
        let known = queries
            .iter()
            .any(|q| q.target == entry.target && q.condition == entry.condition);
        if !known {
            queries.push(entry);
        }
    }
    if config.balanced.is_some() && queries.len() != 1 {
        return Err(ConfigError::BalancedQueryCount(queries.len()));
    }
    Ok(queries)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use pretty_assertions::assert_eq;

    use super::*;

    fn query(args: Vec<Symbol>) -> GroundTheoryAtom {
        GroundTheoryAtom {
            name: "query".to_string(),
            arguments: args,
        }
    }

    fn model(atoms: &[&str]) -> Model {
        Model {
            number: 1,
            cost: vec![],
            optimality_proven: true,
            atoms: atoms.iter().map(|a| Symbol::constant(*a)).collect(),
        }
    }

    #[test]
    fn test_collect_and_record() {
        let config = Configuration::default();
        let atoms = vec![
            query(vec![Symbol::constant("a")]),
            query(vec![Symbol::constant("a")]),
            query(vec![Symbol::constant("a"), Symbol::constant("c")]),
            GroundTheoryAtom {
                name: "other".to_string(),
                arguments: vec![],
            },
        ];
        let mut queries = collect_queries(&atoms, &config).unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[1].to_string(), "a | c");

        for (i, m) in [model(&["a", "c"]), model(&["c"]), model(&[])].iter().enumerate() {
            queries.iter_mut().for_each(|q| q.record(m, i));
        }
        assert_eq!(queries[0].target_models, BTreeSet::from([0]));
        assert!(queries[0].condition_models.is_empty());
        assert_eq!(queries[1].condition_models, BTreeSet::from([0, 1]));
    }

    #[test]
    fn test_balanced_needs_one_query() {
        let config = Configuration {
            opt_enum: true,
            balanced: Some(3),
            ..Default::default()
        };
        assert_eq!(
            collect_queries(&[], &config),
            Err(ConfigError::BalancedQueryCount(0))
        );
        let atoms = vec![
            query(vec![Symbol::constant("a")]),
            query(vec![Symbol::constant("b")]),
        ];
        assert_eq!(
            collect_queries(&atoms, &config),
            Err(ConfigError::BalancedQueryCount(2))
        );
    }
}
