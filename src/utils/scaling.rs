use ndarray::{Array1, Array2, Axis};
use tracing::{debug, warn};

use crate::utils::AnalysisError;

/// Treatment of features whose fit-time standard deviation is zero
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConstantFeaturePolicy {
    /// Fail the fit with a `ModelError` naming the column
    #[default]
    Reject,
    /// Keep the column with unit scale; it standardizes to all zeros
    UnitScale,
}

#[derive(Clone, Debug)]
enum ScalerState {
    Unfitted,
    Fitted { mean: Array1<f64>, std: Array1<f64> },
}

/// Standard scaler: (x - mean) / std with statistics frozen at fit time
///
/// Lifecycle is `Unfitted -> Fitted`, one-way. A fitted scaler refuses a
/// second `fit`; build a new scaler to refit.
#[derive(Clone, Debug)]
pub struct Scaler {
    policy: ConstantFeaturePolicy,
    names: Vec<String>,
    state: ScalerState,
}

impl Default for Scaler {
    fn default() -> Self {
        Self::new(ConstantFeaturePolicy::default())
    }
}

impl Scaler {
    pub fn new(policy: ConstantFeaturePolicy) -> Self {
        Self {
            policy,
            names: Vec::new(),
            state: ScalerState::Unfitted,
        }
    }

    /// Column names used in diagnostics, in matrix column order
    pub fn with_feature_names<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.names = names.iter().map(|n| n.as_ref().to_string()).collect();
        self
    }

    fn column_label(&self, col_idx: usize) -> String {
        match self.names.get(col_idx) {
            Some(name) => format!("'{name}' (column {col_idx})"),
            None => format!("column {col_idx}"),
        }
    }

    pub fn is_fitted(&self) -> bool {
        matches!(self.state, ScalerState::Fitted { .. })
    }

    /// Capture per-feature mean and population standard deviation
    ///
    /// # Errors
    /// * `StateError` if already fitted
    /// * `ModelError` for an empty matrix, non-finite values, or a zero-variance
    ///   column under `ConstantFeaturePolicy::Reject`
    pub fn fit(&mut self, features: &Array2<f64>) -> Result<(), AnalysisError> {
        if self.is_fitted() {
            return Err(AnalysisError::StateError(
                "scaler is already fitted; fitted statistics are immutable".to_string(),
            ));
        }
        validate_matrix(features)?;

        let mean = features
            .mean_axis(Axis(0))
            .ok_or_else(|| AnalysisError::ModelError("cannot fit scaler on empty matrix".into()))?;
        let mut std = features.std_axis(Axis(0), 0.0);

        for (col_idx, s) in std.iter_mut().enumerate() {
            if s.abs() < f64::EPSILON {
                match self.policy {
                    ConstantFeaturePolicy::Reject => {
                        return Err(AnalysisError::ModelError(format!(
                            "feature {} has zero variance; standardization is undefined",
                            self.column_label(col_idx)
                        )));
                    }
                    ConstantFeaturePolicy::UnitScale => {
                        warn!(
                            column = %self.column_label(col_idx),
                            "zero-variance feature kept with unit scale"
                        );
                        *s = 1.0;
                    }
                }
            }
        }

        debug!(features = mean.len(), "scaler fitted");
        self.state = ScalerState::Fitted { mean, std };
        Ok(())
    }

    /// Standardize with the fit-time statistics only
    ///
    /// # Errors
    /// * `StateError` before fit or on a column-count mismatch
    /// * `ModelError` for non-finite values
    pub fn transform(&self, features: &Array2<f64>) -> Result<Array2<f64>, AnalysisError> {
        let ScalerState::Fitted { mean, std } = &self.state else {
            return Err(AnalysisError::StateError(
                "transform called before the scaler was fitted".to_string(),
            ));
        };

        if features.ncols() != mean.len() {
            return Err(AnalysisError::StateError(format!(
                "scaler was fitted on {} features, got {}",
                mean.len(),
                features.ncols()
            )));
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::ModelError(
                "feature matrix contains NaN or Inf values".to_string(),
            ));
        }

        Ok((features - mean) / std)
    }

    /// Fit-time means, if fitted
    pub fn means(&self) -> Option<&Array1<f64>> {
        match &self.state {
            ScalerState::Fitted { mean, .. } => Some(mean),
            ScalerState::Unfitted => None,
        }
    }

    /// Fit-time standard deviations (after the constant-feature policy), if fitted
    pub fn scales(&self) -> Option<&Array1<f64>> {
        match &self.state {
            ScalerState::Fitted { std, .. } => Some(std),
            ScalerState::Unfitted => None,
        }
    }
}

/// Reject empty matrices and non-finite values before fitting
pub fn validate_matrix(features: &Array2<f64>) -> Result<(), AnalysisError> {
    if features.nrows() == 0 {
        return Err(AnalysisError::ModelError(
            "feature matrix cannot be empty".to_string(),
        ));
    }
    if features.ncols() == 0 {
        return Err(AnalysisError::ModelError(
            "feature matrix must have at least one column".to_string(),
        ));
    }
    if features.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::ModelError(
            "feature matrix contains NaN or Inf values".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_transform_fit_batch_is_standardized() {
        let features = arr2(&[
            [1.0, 10.0, -3.0],
            [2.0, 20.0, 0.5],
            [3.0, 35.0, 7.25],
            [8.0, 11.0, 2.0],
            [5.0, 19.0, -1.0],
        ]);
        let mut scaler = Scaler::default();
        scaler.fit(&features).unwrap();
        let scaled = scaler.transform(&features).unwrap();

        for col in scaled.columns() {
            assert!(col.mean().unwrap().abs() < 1e-6);
            assert!((col.std(0.0) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_transform_uses_fit_statistics() {
        let mut scaler = Scaler::default();
        scaler.fit(&arr2(&[[1.0], [2.0], [3.0]])).unwrap();

        // mean=2, std=sqrt(2/3)
        let scaled = scaler.transform(&arr2(&[[100.0], [102.0]])).unwrap();
        let std = (2.0_f64 / 3.0).sqrt();
        assert!((scaled[[0, 0]] - 98.0 / std).abs() < 1e-10);
        assert!((scaled[[1, 0]] - 100.0 / std).abs() < 1e-10);
    }

    #[test]
    fn test_transform_before_fit_fails() {
        let scaler = Scaler::default();
        let err = scaler.transform(&arr2(&[[1.0]])).unwrap_err();
        assert!(err.is_state_error());
    }

    #[test]
    fn test_refit_is_rejected() {
        let mut scaler = Scaler::default();
        scaler.fit(&arr2(&[[1.0], [2.0]])).unwrap();
        let err = scaler.fit(&arr2(&[[5.0], [9.0]])).unwrap_err();
        assert!(err.is_state_error());
        assert_eq!(scaler.means().unwrap()[0], 1.5);
    }

    #[test]
    fn test_column_count_mismatch() {
        let mut scaler = Scaler::default();
        scaler.fit(&arr2(&[[1.0, 2.0], [2.0, 4.0]])).unwrap();
        assert!(scaler.transform(&arr2(&[[1.0]])).unwrap_err().is_state_error());
    }

    #[test]
    fn test_constant_column_rejected_by_default() {
        let mut scaler = Scaler::default();
        let err = scaler.fit(&arr2(&[[5.0, 1.0], [5.0, 2.0]])).unwrap_err();
        assert!(err.is_model_error());
        assert!(err.to_string().contains("column 0"));
        assert!(!scaler.is_fitted());
    }

    #[test]
    fn test_constant_column_error_names_feature() {
        let mut scaler = Scaler::default().with_feature_names(&["speed", "signal_drop_flag"]);
        let err = scaler.fit(&arr2(&[[1.0, 0.0], [2.0, 0.0]])).unwrap_err();
        assert!(err.is_model_error());
        assert!(err.to_string().contains("'signal_drop_flag' (column 1)"));
    }

    #[test]
    fn test_constant_column_unit_scale() {
        let mut scaler = Scaler::new(ConstantFeaturePolicy::UnitScale);
        scaler.fit(&arr2(&[[5.0, 1.0], [5.0, 3.0]])).unwrap();
        let scaled = scaler.transform(&arr2(&[[5.0, 2.0], [6.0, 3.0]])).unwrap();
        assert_eq!(scaled[[0, 0]], 0.0);
        assert_eq!(scaled[[1, 0]], 1.0);
        assert_eq!(scaled[[0, 1]], 0.0);
    }

    #[test]
    fn test_empty_matrix_is_model_error() {
        let mut scaler = Scaler::default();
        let err = scaler.fit(&Array2::<f64>::zeros((0, 3))).unwrap_err();
        assert!(err.is_model_error());
    }

    #[test]
    fn test_validate_matrix_with_nan() {
        let features = arr2(&[[1.0, f64::NAN], [3.0, 4.0]]);
        let err = validate_matrix(&features).unwrap_err();
        assert!(err.to_string().contains("NaN"));
    }
}
