//! Turns the cost vectors of recorded models into probabilities.
//!
//! The weight of a model is `exp(-soft / 10^precision)`, where `soft` is its
//! cost at priority 0. In lpmln mode only the models with the smallest hard
//! cost are kept. Costs are shifted by the smallest retained soft cost before
//! exponentiating, which cancels out after normalization.

use serde::Serialize;
use thiserror::Error;

use crate::{
    config::Configuration,
    query::QueryEntry,
    solver::CostVector,
};

#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum ProbabilityError {
    #[error("no models to compute probabilities for")]
    NoModels,
    #[error("cost vector of model {index} has {found} entries, expected {expected}")]
    InconsistentCost {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("probability of `{query}` is undefined: its condition has probability 0")]
    UndefinedConditionalProbability { query: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryProbability {
    pub query: String,
    pub probability: Result<f64, ProbabilityError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbabilityReport {
    /// One entry per recorded model, in recording order.
    pub model_probabilities: Vec<f64>,
    /// Indices of the models with nonzero weight.
    pub stable_models: Vec<usize>,
    pub queries: Vec<QueryProbability>,
}

pub fn compute_probabilities(
    costs: &[Vec<i64>],
    priorities: &[i32],
    queries: &[QueryEntry],
    config: &Configuration,
) -> Result<ProbabilityReport, ProbabilityError> {
    if costs.is_empty() {
        return Err(ProbabilityError::NoModels);
    }
    let vectors = costs
        .iter()
        .enumerate()
        .map(|(index, cost)| {
            CostVector::new(priorities, cost).map_err(|_| ProbabilityError::InconsistentCost {
                index,
                expected: priorities.len(),
                found: cost.len(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut retained = vec![true; vectors.len()];
    if config.translates_hard_rules() && priorities != [0] {
        let hard: Vec<i64> = vectors.iter().map(|v| v.hard().unwrap_or(0)).collect();
        if let Some(&min) = hard.iter().min() {
            retained = hard.iter().map(|&h| h == min).collect();
        }
    }

    let soft: Vec<i64> = vectors.iter().map(|v| v.soft().unwrap_or(0)).collect();
    let shift = soft
        .iter()
        .zip(&retained)
        .filter(|(_, &keep)| keep)
        .map(|(&s, _)| s)
        .min()
        .unwrap_or(0);
    let scale = config.scale();
    let weights: Vec<f64> = soft
        .iter()
        .zip(&retained)
        .map(|(&s, &keep)| {
            if keep {
                (-((s - shift) as f64) / scale).exp()
            } else {
                0.0
            }
        })
        .collect();
    let total: f64 = weights.iter().sum();
    let model_probabilities: Vec<f64> = weights.iter().map(|w| w / total).collect();
    log::debug!(
        "{} of {} models retained, soft costs shifted by {}",
        retained.iter().filter(|&&keep| keep).count(),
        retained.len(),
        shift
    );

    let stable_models = weights
        .iter()
        .enumerate()
        .filter(|(_, &w)| w > 0.0)
        .map(|(i, _)| i)
        .collect();
    let queries = queries
        .iter()
        .map(|query| QueryProbability {
            query: query.to_string(),
            probability: query_probability(query, &model_probabilities),
        })
        .collect();

    Ok(ProbabilityReport {
        model_probabilities,
        stable_models,
        queries,
    })
}

fn query_probability(query: &QueryEntry, probabilities: &[f64]) -> Result<f64, ProbabilityError> {
    let mass = |indices: Vec<usize>| -> f64 {
        indices.iter().filter_map(|&i| probabilities.get(i)).sum()
    };
    if query.condition.is_none() {
        return Ok(mass(query.target_models.iter().copied().collect()));
    }
    let condition = mass(query.condition_models.iter().copied().collect());
    if condition == 0.0 {
        return Err(ProbabilityError::UndefinedConditionalProbability {
            query: query.to_string(),
        });
    }
    let joint = mass(
        query
            .target_models
            .intersection(&query.condition_models)
            .copied()
            .collect(),
    );
    Ok(joint / condition)
}
