//! Constraints that forbid every model at or below a cost bound.

use std::collections::HashMap;

use crate::solver::{AtomId, Backend, EngineError, Lit, WeightedLiteral};

/// Auxiliary atoms `a <=> cost(level) <= bound`, created once per
/// `(level, bound)` and reused for the rest of the run.
#[derive(Debug, Default)]
pub struct AuxAtomCache {
    atoms: HashMap<(usize, i64), AtomId>,
}

impl AuxAtomCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn get(&self, level: usize, bound: i64) -> Option<AtomId> {
        self.atoms.get(&(level, bound)).copied()
    }

    /// Adds `a <=> sum(wlits) <= bound` and returns `a`; without a level,
    /// adds the constraint `:- sum(wlits) <= bound` instead.
    pub fn upper_bound(
        &mut self,
        backend: &mut dyn Backend,
        wlits: &[WeightedLiteral],
        bound: i64,
        level: Option<usize>,
    ) -> Result<Option<AtomId>, EngineError> {
        let mut head = Vec::new();
        if let Some(level) = level {
            if let Some(atom) = self.get(level, bound) {
                return Ok(Some(atom));
            }
            let atom = backend.add_atom(None);
            self.atoms.insert((level, bound), atom);
            head.push(atom);
        }

        // sum <= bound  iff  sum_{w>0} w*[not l] + sum_{w<0} -w*[l] >= sum_{w>0} w - bound
        let mut lower = -bound;
        let body: Vec<WeightedLiteral> = wlits
            .iter()
            .map(|&(lit, w)| {
                if w > 0 {
                    lower += w;
                    (-lit, w)
                } else {
                    (lit, -w)
                }
            })
            .collect();
        backend.add_weight_rule(&head, lower, &body, false)?;
        Ok(head.first().copied())
    }

    /// Forbids every cost vector lexicographically at most `bound`:
    ///
    /// ```text
    /// :- l0 <= b0-1
    /// :- l0 <= b0, l1 <= b1-1
    /// ...
    /// :- l0 <= b0, .., ln <= bn
    /// ```
    pub fn forbid_up_to(
        &mut self,
        backend: &mut dyn Backend,
        levels: &[Vec<WeightedLiteral>],
        bound: &[i64],
    ) -> Result<(), EngineError> {
        if levels.len() != bound.len() {
            return Err(EngineError::InconsistentCost {
                costs: bound.to_vec(),
                priorities: Vec::new(),
            });
        }
        if levels.len() == 1 {
            self.upper_bound(backend, &levels[0], bound[0], None)?;
            return Ok(());
        }

        let mut prefix: Vec<Lit> = Vec::with_capacity(levels.len());
        for (i, (wlits, &value)) in levels.iter().zip(bound).enumerate() {
            let last = i + 1 == levels.len();
            let below = if last { value } else { value - 1 };
            prefix.push(self.aux_literal(backend, wlits, below, i)?);
            backend.add_rule(&[], &prefix, false)?;
            if !last {
                let equal = self.aux_literal(backend, wlits, value, i)?;
                if let Some(slot) = prefix.last_mut() {
                    *slot = equal;
                }
            }
        }
        log::trace!("forbade costs <= {:?} ({} aux atoms)", bound, self.len());
        Ok(())
    }

    fn aux_literal(
        &mut self,
        backend: &mut dyn Backend,
        wlits: &[WeightedLiteral],
        bound: i64,
        level: usize,
    ) -> Result<Lit, EngineError> {
        let atom = self
            .upper_bound(backend, wlits, bound, Some(level))?
            .ok_or_else(|| anyhow::anyhow!("no auxiliary atom for level {}", level))?;
        Ok(atom as Lit)
    }
}
