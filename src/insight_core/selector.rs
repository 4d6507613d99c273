use ndarray::Array2;
use tracing::{info, warn};

use crate::insight_core::feature::{self, FeatureFrame};
use crate::utils::AnalysisError;

/// Canonical model inputs, in model column order
pub const FEATURE_CATALOGUE: [&str; 27] = [
    // Route deviation
    "distance_from_route",
    "route_adherence_ratio",
    feature::ROUTE_DEVIATION_SEVERE,
    feature::ROUTE_ADHERENCE_POOR,
    // Movement
    "speed",
    "acceleration",
    "speed_variance",
    feature::SPEED_ANOMALY,
    feature::ACCELERATION_EXTREME,
    feature::SPEED_VARIANCE_HIGH,
    // Inactivity
    "silent_duration",
    "stationary_duration",
    "time_gap",
    feature::PROLONGED_STATIONARY,
    feature::PROLONGED_SILENT,
    feature::LARGE_TIME_GAP,
    // Communication
    "signal_drop_flag",
    feature::SIGNAL_ISSUES,
    // Temporal
    "hour_of_day",
    feature::IS_NIGHT,
    feature::IS_RUSH_HOUR,
    // Rolling statistics
    feature::SPEED_ROLLING_MEAN,
    feature::SPEED_ROLLING_STD,
    feature::DISTANCE_ROLLING_MEAN,
    // Sudden changes
    feature::SPEED_CHANGE,
    feature::LOCATION_JUMP,
    feature::SUDDEN_LOCATION_CHANGE,
];

/// Fixes the ordered feature set at fit time and enforces it when scoring
#[derive(Debug, Clone, Default)]
pub struct FeatureSelector {
    selected: Option<Vec<&'static str>>,
}

impl FeatureSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        self.selected.is_some()
    }

    /// Fit-time feature names in model column order
    pub fn feature_names(&self) -> Option<&[&'static str]> {
        self.selected.as_deref()
    }

    /// Record the catalogue features present in `frame` and project them
    ///
    /// # Errors
    /// * `StateError` if already fitted
    /// * `ModelError` if the frame carries no catalogue feature
    pub fn fit(&mut self, frame: &FeatureFrame) -> Result<Array2<f64>, AnalysisError> {
        if self.is_fitted() {
            return Err(AnalysisError::StateError(
                "feature selector is already fitted".to_string(),
            ));
        }

        let (present, absent): (Vec<&'static str>, Vec<&'static str>) =
            FEATURE_CATALOGUE.iter().partition(|name| frame.contains(name));

        if present.is_empty() {
            return Err(AnalysisError::ModelError(
                "no catalogue feature is present in the training batch".to_string(),
            ));
        }
        if !absent.is_empty() {
            warn!(?absent, "catalogue features absent from training batch");
        }
        info!(count = present.len(), "feature set fixed");

        let matrix = frame.to_matrix(&present)?;
        self.selected = Some(present);
        Ok(matrix)
    }

    /// Project `frame` onto exactly the fit-time feature list
    ///
    /// Extra columns are ignored.
    ///
    /// # Errors
    /// * `StateError` before fit, or when a fit-time feature is missing
    pub fn transform(&self, frame: &FeatureFrame) -> Result<Array2<f64>, AnalysisError> {
        let selected = self.selected.as_deref().ok_or_else(|| {
            AnalysisError::StateError("feature selector used before fit".to_string())
        })?;
        frame.to_matrix(selected)
    }
}
