//! Score to risk level, cause flags and the composite distress flag

use std::fmt;

use chrono::NaiveDateTime;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::insight_core::model::label_for;
use crate::insight_core::{AnomalyLabel, FeatureFrame};
use crate::record::{Field, TelemetryBatch, TelemetryRecord};
use crate::utils::AnalysisError;

const CRITICAL_BELOW: f64 = -0.2;
const HIGH_BELOW: f64 = -0.1;
const MEDIUM_BELOW: f64 = 0.0;

/// Ordered risk category, a pure function of the anomaly score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    /// Bins are closed on the left: -0.2 is High, -0.1 is Medium, 0 is Low
    pub fn from_score(score: f64) -> Self {
        if score < CRITICAL_BELOW {
            RiskLevel::Critical
        } else if score < HIGH_BELOW {
            RiskLevel::High
        } else if score < MEDIUM_BELOW {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Absolute limits for the cause flags
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CauseThresholds {
    /// Meters off the planned route
    pub route_deviation_m: f64,
    /// Seconds without movement
    pub stationary_s: f64,
    /// Seconds without communication
    pub silent_s: f64,
}

impl Default for CauseThresholds {
    fn default() -> Self {
        Self {
            route_deviation_m: 1000.0,
            stationary_s: 300.0,
            silent_s: 600.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CauseFlags {
    pub route_deviation_flag: bool,
    pub inactivity_flag: bool,
    pub communication_flag: bool,
}

impl CauseFlags {
    pub fn any(&self) -> bool {
        self.route_deviation_flag || self.inactivity_flag || self.communication_flag
    }
}

/// Per-record pipeline output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    pub index: usize,
    pub timestamp: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub distance_from_route: Option<f64>,
    pub speed: Option<f64>,
    pub silent_duration: Option<f64>,
    pub stationary_duration: Option<f64>,
    pub label: AnomalyLabel,
    pub score: f64,
    pub risk_level: RiskLevel,
    #[serde(flatten)]
    pub flags: CauseFlags,
    pub distress_flag: bool,
    /// Raw fields that were missing and zero-filled before scoring
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<Field>,
}

impl ScoredRecord {
    pub fn is_outlier(&self) -> bool {
        self.label.is_outlier()
    }
}

/// Maps scores and raw readings to risk levels and distress flags
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskClassifier {
    thresholds: CauseThresholds,
}

impl RiskClassifier {
    pub fn new(thresholds: CauseThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &CauseThresholds {
        &self.thresholds
    }

    /// Cause flags from raw readings; a missing reading never raises a flag
    pub fn cause_flags(&self, record: &TelemetryRecord) -> CauseFlags {
        let above = |field: Field, limit: f64| record.get(field).is_some_and(|v| v > limit);
        CauseFlags {
            route_deviation_flag: above(Field::DistanceFromRoute, self.thresholds.route_deviation_m),
            inactivity_flag: above(Field::StationaryDuration, self.thresholds.stationary_s)
                || above(Field::SilentDuration, self.thresholds.silent_s),
            communication_flag: record.get(Field::SignalDropFlag) == Some(1.0),
        }
    }

    pub fn classify(
        &self,
        record: &TelemetryRecord,
        score: f64,
        missing_fields: Vec<Field>,
    ) -> ScoredRecord {
        let label = label_for(score);
        let flags = self.cause_flags(record);
        ScoredRecord {
            index: record.index,
            timestamp: record.timestamp,
            subject_id: record.subject_id.clone(),
            lat: record.get(Field::Lat),
            lon: record.get(Field::Lon),
            distance_from_route: record.get(Field::DistanceFromRoute),
            speed: record.get(Field::Speed),
            silent_duration: record.get(Field::SilentDuration),
            stationary_duration: record.get(Field::StationaryDuration),
            label,
            score,
            risk_level: RiskLevel::from_score(score),
            flags,
            distress_flag: label.is_outlier() && flags.any(),
            missing_fields,
        }
    }

    /// Classify every record of a batch against its row of scores
    ///
    /// # Errors
    /// * `StateError` if the score count differs from the record count
    pub fn classify_batch(
        &self,
        batch: &TelemetryBatch,
        frame: &FeatureFrame,
        scores: &Array1<f64>,
    ) -> Result<Vec<ScoredRecord>, AnalysisError> {
        if scores.len() != batch.len() {
            return Err(AnalysisError::StateError(format!(
                "got {} scores for {} records",
                scores.len(),
                batch.len()
            )));
        }

        Ok(batch
            .records
            .iter()
            .zip(scores.iter())
            .enumerate()
            .map(|(row, (record, &score))| {
                self.classify(record, score, frame.missing_fields(row).to_vec())
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record() -> TelemetryRecord {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        TelemetryRecord::new(ts)
    }

    #[test]
    fn test_risk_level_boundaries() {
        assert_eq!(RiskLevel::from_score(-0.25), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(-0.2), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(-0.15), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(-0.1), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(-0.05), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.3), RiskLevel::Low);
    }

    #[test]
    fn test_risk_level_order() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::High < RiskLevel::Critical);
        assert_eq!(RiskLevel::ALL.iter().max(), Some(&RiskLevel::Critical));
    }

    #[test]
    fn test_cause_flags() {
        let classifier = RiskClassifier::default();

        let off_route = record().with(Field::DistanceFromRoute, 1500.0);
        assert!(classifier.cause_flags(&off_route).route_deviation_flag);

        let stationary = record().with(Field::StationaryDuration, 301.0);
        assert!(classifier.cause_flags(&stationary).inactivity_flag);

        let silent = record().with(Field::SilentDuration, 600.0);
        assert!(!classifier.cause_flags(&silent).inactivity_flag);

        let dropped = record().with(Field::SignalDropFlag, 1.0);
        let flags = classifier.cause_flags(&dropped);
        assert!(flags.communication_flag);
        assert!(!flags.route_deviation_flag);
    }

    #[test]
    fn test_missing_readings_raise_nothing() {
        let flags = RiskClassifier::default().cause_flags(&record());
        assert_eq!(flags, CauseFlags::default());
        assert!(!flags.any());
    }

    #[test]
    fn test_distress_requires_outlier_and_cause() {
        let classifier = RiskClassifier::default();
        let stationary = record().with(Field::StationaryDuration, 400.0);

        let inlier = classifier.classify(&stationary, 0.05, Vec::new());
        assert_eq!(inlier.label, AnomalyLabel::Inlier);
        assert!(inlier.flags.inactivity_flag);
        assert!(!inlier.distress_flag);

        let outlier = classifier.classify(&stationary, -0.12, Vec::new());
        assert!(outlier.distress_flag);
        assert_eq!(outlier.risk_level, RiskLevel::High);

        let quiet = record().with(Field::StationaryDuration, 10.0);
        let no_cause = classifier.classify(&quiet, -0.3, Vec::new());
        assert!(no_cause.is_outlier());
        assert!(!no_cause.distress_flag);
    }

    #[test]
    fn test_custom_thresholds() {
        let classifier = RiskClassifier::new(CauseThresholds {
            route_deviation_m: 200.0,
            ..Default::default()
        });
        let r = record().with(Field::DistanceFromRoute, 250.0);
        assert!(classifier.cause_flags(&r).route_deviation_flag);
    }

    #[test]
    fn test_scored_record_json_shape() {
        let r = RiskClassifier::default().classify(
            &record().with(Field::SignalDropFlag, 1.0),
            -0.3,
            vec![Field::Speed],
        );
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["label"], "outlier");
        assert_eq!(json["risk_level"], "critical");
        assert_eq!(json["communication_flag"], true);
        assert_eq!(json["distress_flag"], true);
        assert_eq!(json["missing_fields"][0], "speed");
    }

    #[test]
    fn test_classify_batch_length_mismatch() {
        let batch = TelemetryBatch::from_records(vec![record(), record()]);
        let frame = crate::insight_core::FeatureEngineer::new().engineer(&batch);
        let err = RiskClassifier::default()
            .classify_batch(&batch, &frame, &Array1::zeros(3))
            .unwrap_err();
        assert!(err.is_state_error());
    }
}
