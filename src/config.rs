//! Run configuration.
//!
//! A [`Configuration`] is created once (usually from JSON) and validated with
//! [`Configuration::validate`]; every later stage only reads it.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

pub const DEFAULT_PRECISION: u32 = 5;
pub const MAX_PRECISION: u32 = 15;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("two-phase solving requires hard rules to be translated (frontend lpmln), got {0}")]
    TwoPhaseRequiresLpmln(Frontend),
    #[error("balanced sampling requires optimal enumeration")]
    BalancedRequiresOptEnum,
    #[error("backend injection requires balanced sampling")]
    BackendRequiresBalanced,
    #[error("precision must be between 1 and 15, got {0}")]
    InvalidPrecision(u32),
    #[error("balanced sample size must be positive")]
    EmptyBalancedSample,
    #[error("balanced sampling supports exactly one query, found {0}")]
    BalancedQueryCount(usize),
    #[error("invalid configuration: {0}")]
    Json(String),
}

/// Input language variant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumString, Display,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Frontend {
    #[default]
    Plingo,
    /// Hard rules are translated as well (`1@1` weights).
    Lpmln,
    LpmlnAlt,
    Problog,
    Plog,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumString, Display,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Encoding {
    #[default]
    Direct,
    Unsat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    pub frontend: Frontend,
    pub encoding: Encoding,
    pub two_phase: bool,
    /// Decimal digits kept when scaling weights to integers.
    pub precision: u32,
    pub opt_enum: bool,
    pub balanced: Option<usize>,
    pub use_backend: bool,
    pub display_all: bool,
    /// Extra query atoms, e.g. `"alarm"` or `"h(d1, y)"`.
    pub queries: Vec<String>,
    /// Evidence program text appended to the input verbatim.
    pub evidence: Option<String>,
    pub problog_export: bool,
    /// Model limit for optimal enumeration, 0 for all.
    pub models: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            frontend: Frontend::default(),
            encoding: Encoding::default(),
            two_phase: false,
            precision: DEFAULT_PRECISION,
            opt_enum: false,
            balanced: None,
            use_backend: false,
            display_all: false,
            queries: Vec::new(),
            evidence: None,
            problog_export: false,
            models: 0,
        }
    }
}

impl Configuration {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Json(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.two_phase && self.frontend != Frontend::Lpmln {
            return Err(ConfigError::TwoPhaseRequiresLpmln(self.frontend));
        }
        if !(1..=MAX_PRECISION).contains(&self.precision) {
            return Err(ConfigError::InvalidPrecision(self.precision));
        }
        if let Some(n) = self.balanced {
            if n == 0 {
                return Err(ConfigError::EmptyBalancedSample);
            }
            if !self.opt_enum {
                return Err(ConfigError::BalancedRequiresOptEnum);
            }
        }
        if self.use_backend && self.balanced.is_none() {
            return Err(ConfigError::BackendRequiresBalanced);
        }
        Ok(())
    }

    /// `10^precision`.
    pub fn scale(&self) -> f64 {
        10f64.powi(self.precision as i32)
    }

    /// Fixed-point representation of `weight`.
    pub fn fixed_point(&self, weight: f64) -> i64 {
        (weight * self.scale()).round() as i64
    }

    /// Whether hard rules are translated into weighted ones.
    pub fn translates_hard_rules(&self) -> bool {
        self.frontend == Frontend::Lpmln
    }

    /// Model limit handed to the enumeration: `2N` when balanced.
    pub fn model_limit(&self) -> usize {
        match self.balanced {
            Some(n) => 2 * n,
            None => self.models,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_from_json() {
        let config = Configuration::from_json(
            r#"{ "frontend": "lpmln-alt", "encoding": "unsat", "precision": 3, "queries": ["a"] }"#,
        )
        .unwrap();
        assert_eq!(config.frontend, Frontend::LpmlnAlt);
        assert_eq!(config.encoding, Encoding::Unsat);
        assert_eq!(config.precision, 3);
        assert_eq!(config.queries, vec!["a".to_string()]);
        assert!(!config.opt_enum);

        assert_eq!("plog".parse::<Frontend>().unwrap(), Frontend::Plog);
        assert_eq!(Frontend::LpmlnAlt.to_string(), "lpmln-alt");
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = Configuration::from_json(r#"{ "precison": 3 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_validate() {
        let two_phase = Configuration {
            two_phase: true,
            ..Default::default()
        };
        assert_eq!(
            two_phase.validate(),
            Err(ConfigError::TwoPhaseRequiresLpmln(Frontend::Plingo))
        );
        let two_phase = Configuration {
            frontend: Frontend::Lpmln,
            ..two_phase
        };
        assert_eq!(two_phase.validate(), Ok(()));

        let balanced = Configuration {
            balanced: Some(3),
            ..Default::default()
        };
        assert_eq!(
            balanced.validate(),
            Err(ConfigError::BalancedRequiresOptEnum)
        );
        let zero = Configuration {
            balanced: Some(0),
            opt_enum: true,
            ..Default::default()
        };
        assert_eq!(zero.validate(), Err(ConfigError::EmptyBalancedSample));

        let backend = Configuration {
            use_backend: true,
            opt_enum: true,
            ..Default::default()
        };
        assert_eq!(
            backend.validate(),
            Err(ConfigError::BackendRequiresBalanced)
        );

        for precision in [0, 16] {
            let config = Configuration {
                precision,
                ..Default::default()
            };
            assert_eq!(
                config.validate(),
                Err(ConfigError::InvalidPrecision(precision))
            );
        }
    }

    #[test]
    fn test_fixed_point() {
        let config = Configuration {
            precision: 2,
            ..Default::default()
        };
        assert_eq!(config.fixed_point(1.0), 100);
        assert_eq!(config.fixed_point(-0.3567), -36);
        assert_eq!(config.fixed_point(0.006), 1);
        let balanced = Configuration {
            opt_enum: true,
            balanced: Some(3),
            ..Default::default()
        };
        assert_eq!(balanced.model_limit(), 6);
    }
}
