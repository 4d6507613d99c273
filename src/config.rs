use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::insight_core::IsolationForestParams;
use crate::risk::CauseThresholds;
use crate::utils::{validate_contamination, AnalysisError, ConstantFeaturePolicy};

/// Where scoring batches take their distribution-relative cut-points from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantileMode {
    /// Reuse the training batch's cut-points
    #[default]
    Frozen,
    /// Recompute from each scoring batch's own distribution
    PerBatch,
}

/// Pipeline configuration, loadable from JSON with every field optional
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub n_estimators: usize,
    pub max_samples: usize,
    pub contamination: f64,
    pub seed: u64,
    pub rolling_window: usize,
    pub quantile_mode: QuantileMode,
    pub partition_by_subject: bool,
    pub allow_constant_features: bool,
    pub top_n: usize,
    pub causes: CauseThresholds,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let forest = IsolationForestParams::default();
        Self {
            n_estimators: forest.n_estimators,
            max_samples: forest.max_samples,
            contamination: forest.contamination,
            seed: forest.seed,
            rolling_window: 5,
            quantile_mode: QuantileMode::default(),
            partition_by_subject: false,
            allow_constant_features: false,
            top_n: 5,
            causes: CauseThresholds::default(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: PipelineConfig = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        validate_contamination(self.contamination)?;
        for (name, value) in [
            ("n_estimators", self.n_estimators),
            ("max_samples", self.max_samples),
            ("rolling_window", self.rolling_window),
        ] {
            if value == 0 {
                return Err(AnalysisError::ValidationError(format!("{name} must be > 0")));
            }
        }
        for (name, value) in [
            ("causes.route_deviation_m", self.causes.route_deviation_m),
            ("causes.stationary_s", self.causes.stationary_s),
            ("causes.silent_s", self.causes.silent_s),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(AnalysisError::ValidationError(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn forest_params(&self) -> IsolationForestParams {
        IsolationForestParams {
            n_estimators: self.n_estimators,
            max_samples: self.max_samples,
            contamination: self.contamination,
            seed: self.seed,
        }
    }

    pub fn constant_feature_policy(&self) -> ConstantFeaturePolicy {
        if self.allow_constant_features {
            ConstantFeaturePolicy::UnitScale
        } else {
            ConstantFeaturePolicy::Reject
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.n_estimators, 100);
        assert_eq!(config.contamination, 0.1);
        assert_eq!(config.seed, 42);
        assert_eq!(config.quantile_mode, QuantileMode::Frozen);
        assert_eq!(config.causes.stationary_s, 300.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"contamination": 0.05, "quantile_mode": "per_batch", "causes": {"silent_s": 900}}"#,
        )
        .unwrap();
        assert_eq!(config.contamination, 0.05);
        assert_eq!(config.quantile_mode, QuantileMode::PerBatch);
        assert_eq!(config.causes.silent_s, 900.0);
        assert_eq!(config.causes.route_deviation_m, 1000.0);
        assert_eq!(config.top_n, 5);
    }

    #[test]
    fn test_validation_errors() {
        let bad = [
            PipelineConfig {
                contamination: 0.6,
                ..Default::default()
            },
            PipelineConfig {
                rolling_window: 0,
                ..Default::default()
            },
            PipelineConfig {
                causes: CauseThresholds {
                    stationary_s: -1.0,
                    ..Default::default()
                },
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(matches!(
                config.validate(),
                Err(AnalysisError::ValidationError(_))
            ));
        }
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"seed": 7, "allow_constant_features": true}}"#).unwrap();

        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.forest_params().seed, 7);
        assert_eq!(
            config.constant_feature_policy(),
            ConstantFeaturePolicy::UnitScale
        );
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"contamination": 0}}"#).unwrap();
        assert!(PipelineConfig::from_file(file.path()).is_err());
    }
}
