//! Behavioral feature derivation
//!
//! Maps a time-ordered [`TelemetryBatch`] to a new, independently owned
//! [`FeatureFrame`]. The source records are never augmented in place.
//!
//! Missing observations are excluded from quantiles, rolling windows and
//! deltas, never raise a flag, and are filled with 0 only at the end. Each
//! frame row remembers which raw fields were zero-filled so a silent sensor
//! can still be told apart from a genuine zero.

use std::collections::{BTreeMap, HashMap};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::record::{Field, TelemetryBatch};
use crate::utils::{abs_diff, quantile, rolling_mean, rolling_std, AnalysisError};

pub const ROUTE_DEVIATION_SEVERE: &str = "route_deviation_severe";
pub const ROUTE_ADHERENCE_POOR: &str = "route_adherence_poor";
pub const SPEED_ANOMALY: &str = "speed_anomaly";
pub const ACCELERATION_EXTREME: &str = "acceleration_extreme";
pub const SPEED_VARIANCE_HIGH: &str = "speed_variance_high";
pub const PROLONGED_STATIONARY: &str = "prolonged_stationary";
pub const PROLONGED_SILENT: &str = "prolonged_silent";
pub const LARGE_TIME_GAP: &str = "large_time_gap";
pub const SIGNAL_ISSUES: &str = "signal_issues";
pub const IS_NIGHT: &str = "is_night";
pub const IS_RUSH_HOUR: &str = "is_rush_hour";
pub const SPEED_ROLLING_MEAN: &str = "speed_rolling_mean";
pub const SPEED_ROLLING_STD: &str = "speed_rolling_std";
pub const DISTANCE_ROLLING_MEAN: &str = "distance_rolling_mean";
pub const SPEED_CHANGE: &str = "speed_change";
pub const LOCATION_JUMP: &str = "location_jump";
pub const SUDDEN_LOCATION_CHANGE: &str = "sudden_location_change";

/// Degrees to meters, equirectangular approximation without latitude correction
pub const METERS_PER_DEGREE: f64 = 111_000.0;

pub const DEFAULT_ROLLING_WINDOW: usize = 5;

const POOR_ADHERENCE_RATIO: f64 = 0.3;
const PROLONGED_STATIONARY_S: f64 = 300.0;
const PROLONGED_SILENT_S: f64 = 600.0;
const LARGE_TIME_GAP_S: f64 = 60.0;
const SUDDEN_JUMP_M: f64 = 1000.0;

/// Cut-points for the distribution-relative flags
///
/// Computed from a batch's own values. The engine can freeze the training
/// batch's cut-points and reuse them for scoring batches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuantileThresholds {
    /// 90th percentile of distance_from_route
    pub route_distance_p90: Option<f64>,
    /// 5th percentile of speed
    pub speed_p05: Option<f64>,
    /// 95th percentile of speed
    pub speed_p95: Option<f64>,
    /// 90th percentile of |acceleration|
    pub abs_acceleration_p90: Option<f64>,
    /// 90th percentile of speed_variance
    pub speed_variance_p90: Option<f64>,
}

impl QuantileThresholds {
    pub fn from_batch(batch: &TelemetryBatch) -> Self {
        let speed = batch.values(Field::Speed);
        let abs_acceleration: Vec<Option<f64>> = batch
            .values(Field::Acceleration)
            .into_iter()
            .map(|v| v.map(f64::abs))
            .collect();

        Self {
            route_distance_p90: quantile(&batch.values(Field::DistanceFromRoute), 0.9),
            speed_p05: quantile(&speed, 0.05),
            speed_p95: quantile(&speed, 0.95),
            abs_acceleration_p90: quantile(&abs_acceleration, 0.9),
            speed_variance_p90: quantile(&batch.values(Field::SpeedVariance), 0.9),
        }
    }
}

/// Column store of engineered features, one row per telemetry record
#[derive(Debug, Clone, Default)]
pub struct FeatureFrame {
    len: usize,
    columns: HashMap<&'static str, Vec<f64>>,
    missing: Vec<Vec<Field>>,
    thresholds: QuantileThresholds,
}

impl FeatureFrame {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Sorted column names
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.columns.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Whether a 0/1 flag column is set for a row; absent columns read as unset
    pub fn flag(&self, name: &str, row: usize) -> bool {
        self.column(name)
            .and_then(|c| c.get(row))
            .is_some_and(|v| *v != 0.0)
    }

    /// Raw fields of a row that were missing and zero-filled
    pub fn missing_fields(&self, row: usize) -> &[Field] {
        self.missing.get(row).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Cut-points the relative flags were computed with
    pub fn thresholds(&self) -> &QuantileThresholds {
        &self.thresholds
    }

    /// Project the named columns, in the given order, into a row-major matrix
    ///
    /// # Errors
    /// * `StateError` if any named column is absent from this frame
    pub fn to_matrix(&self, names: &[&str]) -> Result<Array2<f64>, AnalysisError> {
        let columns = names
            .iter()
            .map(|name| {
                self.column(name).ok_or_else(|| {
                    AnalysisError::StateError(format!(
                        "feature '{name}' from the fitted feature set is missing in this batch"
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Array2::from_shape_fn((self.len, columns.len()), |(i, j)| {
            columns[j][i]
        }))
    }

    fn insert(&mut self, name: &'static str, values: Vec<Option<f64>>) {
        self.columns.insert(name, fill_missing(values));
    }

    fn insert_flags(&mut self, name: &'static str, flags: Vec<bool>) {
        self.columns.insert(
            name,
            flags.into_iter().map(|f| f64::from(u8::from(f))).collect(),
        );
    }
}

/// Derives behavioral indicators from an ordered batch
#[derive(Debug, Clone)]
pub struct FeatureEngineer {
    window: usize,
    partition_by_subject: bool,
    thresholds: Option<QuantileThresholds>,
}

impl Default for FeatureEngineer {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureEngineer {
    /// Per-batch quantiles, 5-record window, whole batch as one sequence
    pub fn new() -> Self {
        Self {
            window: DEFAULT_ROLLING_WINDOW,
            partition_by_subject: false,
            thresholds: None,
        }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    /// Compute rolling statistics and deltas within each subject's own sequence
    pub fn partition_by_subject(mut self, enabled: bool) -> Self {
        self.partition_by_subject = enabled;
        self
    }

    /// Use fixed cut-points instead of the batch's own distribution
    pub fn with_thresholds(mut self, thresholds: QuantileThresholds) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    pub fn engineer(&self, batch: &TelemetryBatch) -> FeatureFrame {
        let thresholds = self
            .thresholds
            .clone()
            .unwrap_or_else(|| QuantileThresholds::from_batch(batch));
        debug!(?thresholds, records = batch.len(), "engineering features");

        let groups = self.sequences(batch);
        let mut frame = FeatureFrame {
            len: batch.len(),
            columns: HashMap::new(),
            missing: batch
                .records
                .iter()
                .map(|r| {
                    batch
                        .columns
                        .iter()
                        .copied()
                        .filter(|f| r.get(*f).is_none())
                        .collect()
                })
                .collect(),
            thresholds: QuantileThresholds::default(),
        };

        for field in batch.columns.iter().copied() {
            frame.insert(field.as_str(), batch.values(field));
        }

        if batch.has(Field::DistanceFromRoute) {
            let distance = batch.values(Field::DistanceFromRoute);
            let p90 = thresholds.route_distance_p90;
            frame.insert_flags(
                ROUTE_DEVIATION_SEVERE,
                flags(&distance, |v| p90.is_some_and(|t| v > t)),
            );
            frame.insert(
                DISTANCE_ROLLING_MEAN,
                per_sequence(&distance, &groups, |s| rolling_mean(s, self.window)),
            );
        }

        if batch.has(Field::RouteAdherenceRatio) {
            frame.insert_flags(
                ROUTE_ADHERENCE_POOR,
                flags(&batch.values(Field::RouteAdherenceRatio), |v| {
                    v < POOR_ADHERENCE_RATIO
                }),
            );
        }

        if batch.has(Field::Speed) {
            let speed = batch.values(Field::Speed);
            let (lo, hi) = (thresholds.speed_p05, thresholds.speed_p95);
            frame.insert_flags(
                SPEED_ANOMALY,
                flags(&speed, |v| {
                    hi.is_some_and(|t| v > t) || lo.is_some_and(|t| v < t)
                }),
            );
            frame.insert(
                SPEED_ROLLING_MEAN,
                per_sequence(&speed, &groups, |s| rolling_mean(s, self.window)),
            );
            frame.insert(
                SPEED_ROLLING_STD,
                per_sequence(&speed, &groups, |s| rolling_std(s, self.window)),
            );
            frame.insert(SPEED_CHANGE, per_sequence(&speed, &groups, abs_diff));
        }

        if batch.has(Field::Acceleration) {
            let p90 = thresholds.abs_acceleration_p90;
            frame.insert_flags(
                ACCELERATION_EXTREME,
                flags(&batch.values(Field::Acceleration), |v| {
                    p90.is_some_and(|t| v.abs() > t)
                }),
            );
        }

        if batch.has(Field::SpeedVariance) {
            let p90 = thresholds.speed_variance_p90;
            frame.insert_flags(
                SPEED_VARIANCE_HIGH,
                flags(&batch.values(Field::SpeedVariance), |v| {
                    p90.is_some_and(|t| v > t)
                }),
            );
        }

        for (field, name, limit) in [
            (Field::StationaryDuration, PROLONGED_STATIONARY, PROLONGED_STATIONARY_S),
            (Field::SilentDuration, PROLONGED_SILENT, PROLONGED_SILENT_S),
            (Field::TimeGap, LARGE_TIME_GAP, LARGE_TIME_GAP_S),
        ] {
            if batch.has(field) {
                frame.insert_flags(name, flags(&batch.values(field), |v| v > limit));
            }
        }

        if batch.has(Field::SignalDropFlag) {
            frame.insert_flags(
                SIGNAL_ISSUES,
                flags(&batch.values(Field::SignalDropFlag), |v| v == 1.0),
            );
        }

        if batch.has(Field::HourOfDay) {
            let hour = batch.values(Field::HourOfDay);
            frame.insert_flags(IS_NIGHT, flags(&hour, |h| h >= 22.0 || h <= 6.0));
            frame.insert_flags(
                IS_RUSH_HOUR,
                flags(&hour, |h| (7.0..=9.0).contains(&h) || (17.0..=19.0).contains(&h)),
            );
        }

        if batch.has(Field::Lat) && batch.has(Field::Lon) {
            let jumps = location_jumps(
                &batch.values(Field::Lat),
                &batch.values(Field::Lon),
                &groups,
            );
            frame.insert_flags(SUDDEN_LOCATION_CHANGE, flags(&jumps, |m| m > SUDDEN_JUMP_M));
            frame.insert(LOCATION_JUMP, jumps);
        }

        frame.thresholds = thresholds;
        frame
    }

    /// Row indices of each ordered sequence the window and delta features run over
    fn sequences(&self, batch: &TelemetryBatch) -> Vec<Vec<usize>> {
        if !self.partition_by_subject {
            return vec![(0..batch.len()).collect()];
        }

        let mut groups: BTreeMap<Option<&str>, Vec<usize>> = BTreeMap::new();
        for (i, record) in batch.records.iter().enumerate() {
            groups
                .entry(record.subject_id.as_deref())
                .or_default()
                .push(i);
        }
        groups.into_values().collect()
    }
}

fn flags(values: &[Option<f64>], pred: impl Fn(f64) -> bool) -> Vec<bool> {
    values.iter().map(|v| v.is_some_and(&pred)).collect()
}

fn fill_missing(values: Vec<Option<f64>>) -> Vec<f64> {
    values.into_iter().map(|v| v.unwrap_or(0.0)).collect()
}

/// Apply a sequence transform to each group and scatter results back to row order
fn per_sequence<F>(values: &[Option<f64>], groups: &[Vec<usize>], op: F) -> Vec<Option<f64>>
where
    F: Fn(&[Option<f64>]) -> Vec<Option<f64>>,
{
    let mut out = vec![None; values.len()];
    for group in groups {
        let sequence: Vec<Option<f64>> = group.iter().map(|&i| values[i]).collect();
        for (&i, value) in group.iter().zip(op(&sequence)) {
            out[i] = value;
        }
    }
    out
}

/// Planar distance in meters between consecutive fixes of each sequence
pub fn location_jumps(
    lat: &[Option<f64>],
    lon: &[Option<f64>],
    groups: &[Vec<usize>],
) -> Vec<Option<f64>> {
    let mut out = vec![None; lat.len()];
    for group in groups {
        for pair in group.windows(2) {
            let (prev, cur) = (pair[0], pair[1]);
            if let (Some(a0), Some(o0), Some(a1), Some(o1)) = (lat[prev], lon[prev], lat[cur], lon[cur]) {
                out[cur] = Some((a1 - a0).hypot(o1 - o0) * METERS_PER_DEGREE);
            }
        }
    }
    out
}
