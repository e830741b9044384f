use std::collections::{BTreeMap, BTreeSet};

use crate::solver::{Observer, WeightedLiteral};

/// Records the ground minimize statements seen while grounding.
///
/// Priorities are always recorded. Literals are only kept when optimal
/// enumeration needs them to tighten bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinimizeObserver {
    keep_literals: bool,
    priorities: BTreeSet<i32>,
    literals: BTreeMap<i32, Vec<WeightedLiteral>>,
}

impl MinimizeObserver {
    pub fn new(keep_literals: bool) -> Self {
        Self {
            keep_literals,
            ..Default::default()
        }
    }

    pub fn priorities(&self) -> &BTreeSet<i32> {
        &self.priorities
    }

    /// Priorities from most to least significant.
    pub fn priorities_desc(&self) -> Vec<i32> {
        self.priorities.iter().rev().copied().collect()
    }

    /// Weighted literals per level, most significant level first.
    pub fn levels(&self) -> Vec<Vec<WeightedLiteral>> {
        self.literals.values().rev().cloned().collect()
    }

    pub fn has_objective(&self) -> bool {
        !self.priorities.is_empty()
    }
}

impl Observer for MinimizeObserver {
    fn minimize(&mut self, priority: i32, literals: &[WeightedLiteral]) {
        log::trace!("minimize @{}: {:?}", priority, literals);
        self.priorities.insert(priority);
        if self.keep_literals {
            self.literals
                .entry(priority)
                .or_default()
                .extend_from_slice(literals);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_levels_are_most_significant_first() {
        let mut obs = MinimizeObserver::new(true);
        obs.minimize(0, &[(1, 10)]);
        obs.minimize(1, &[(-2, 1)]);
        obs.minimize(0, &[(3, -5)]);
        assert_eq!(obs.priorities_desc(), vec![1, 0]);
        assert_eq!(obs.levels(), vec![vec![(-2, 1)], vec![(1, 10), (3, -5)]]);

        let mut obs = MinimizeObserver::new(false);
        obs.minimize(0, &[(1, 10)]);
        assert!(obs.has_objective());
        assert!(obs.levels().is_empty());
    }
}
