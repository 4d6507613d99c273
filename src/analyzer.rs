//! Aggregation of a scored batch into counts and ranked cases

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

use crate::engine::ScoredBatch;
use crate::insight_core::feature::{SPEED_ANOMALY, SUDDEN_LOCATION_CHANGE};
use crate::risk::{CauseFlags, RiskLevel, ScoredRecord};
use crate::stats::Statistics;

pub const DEFAULT_TOP_N: usize = 5;

/// Outliers per cause category; a record may count in several
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub route_deviation: usize,
    pub inactivity: usize,
    pub communication: usize,
    pub sudden_location_change: usize,
    pub speed_anomaly: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RiskLevelCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

impl RiskLevelCounts {
    fn add(&mut self, level: RiskLevel) {
        match level {
            RiskLevel::Low => self.low += 1,
            RiskLevel::Medium => self.medium += 1,
            RiskLevel::High => self.high += 1,
            RiskLevel::Critical => self.critical += 1,
        }
    }
}

/// One of the most anomalous outliers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SevereCase {
    pub index: usize,
    pub timestamp: NaiveDateTime,
    pub score: f64,
    pub risk_level: RiskLevel,
    pub distance_from_route: Option<f64>,
    pub speed: Option<f64>,
    pub silent_duration: Option<f64>,
    pub stationary_duration: Option<f64>,
}

impl From<&ScoredRecord> for SevereCase {
    fn from(r: &ScoredRecord) -> Self {
        Self {
            index: r.index,
            timestamp: r.timestamp,
            score: r.score,
            risk_level: r.risk_level,
            distance_from_route: r.distance_from_route,
            speed: r.speed,
            silent_duration: r.silent_duration,
            stationary_duration: r.stationary_duration,
        }
    }
}

/// A record with the distress flag set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistressCase {
    pub index: usize,
    pub timestamp: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub score: f64,
    pub risk_level: RiskLevel,
    #[serde(flatten)]
    pub flags: CauseFlags,
}

impl From<&ScoredRecord> for DistressCase {
    fn from(r: &ScoredRecord) -> Self {
        Self {
            index: r.index,
            timestamp: r.timestamp,
            subject_id: r.subject_id.clone(),
            lat: r.lat,
            lon: r.lon,
            score: r.score,
            risk_level: r.risk_level,
            flags: r.flags,
        }
    }
}

/// Safety summary of one scored batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyReport {
    pub batch: String,
    pub total_records: usize,
    pub outliers: usize,
    pub outlier_rate: f64,
    pub distress_count: usize,
    pub risk_levels: RiskLevelCounts,
    pub categories: CategoryCounts,
    pub score_stats: Option<Statistics>,
    /// Lowest-scoring outliers first
    pub most_severe: Vec<SevereCase>,
    /// Earliest distress records first
    pub distress_cases: Vec<DistressCase>,
}

#[derive(Debug, Clone, Copy)]
pub struct AnomalyAnalyzer {
    top_n: usize,
}

impl Default for AnomalyAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_N)
    }
}

impl AnomalyAnalyzer {
    pub fn new(top_n: usize) -> Self {
        Self { top_n }
    }

    /// Summarize a scored batch without modifying it
    pub fn analyze(&self, scored: &ScoredBatch) -> AnomalyReport {
        let mut categories = CategoryCounts::default();
        let mut risk_levels = RiskLevelCounts::default();
        let mut outliers: Vec<&ScoredRecord> = Vec::new();

        for (row, record) in scored.records.iter().enumerate() {
            risk_levels.add(record.risk_level);
            if !record.is_outlier() {
                continue;
            }
            outliers.push(record);

            categories.route_deviation += usize::from(record.flags.route_deviation_flag);
            categories.inactivity += usize::from(record.flags.inactivity_flag);
            categories.communication += usize::from(record.flags.communication_flag);
            categories.sudden_location_change +=
                usize::from(scored.features.flag(SUDDEN_LOCATION_CHANGE, row));
            categories.speed_anomaly += usize::from(scored.features.flag(SPEED_ANOMALY, row));
        }

        let total = scored.records.len();
        let outlier_count = outliers.len();

        // stable sort keeps time order among equal scores
        outliers.sort_by(|a, b| a.score.total_cmp(&b.score));
        let most_severe = outliers
            .iter()
            .take(self.top_n)
            .map(|r| SevereCase::from(*r))
            .collect();

        let distress: Vec<&ScoredRecord> =
            scored.records.iter().filter(|r| r.distress_flag).collect();
        let distress_cases = distress
            .iter()
            .take(self.top_n)
            .map(|r| DistressCase::from(*r))
            .collect();

        debug!(batch = %scored.name, ?categories, "batch analyzed");

        AnomalyReport {
            batch: scored.name.clone(),
            total_records: total,
            outliers: outlier_count,
            outlier_rate: if total == 0 {
                0.0
            } else {
                outlier_count as f64 / total as f64
            },
            distress_count: distress.len(),
            risk_levels,
            categories,
            score_stats: Statistics::compute("score", scored.records.iter().map(|r| r.score)),
            most_severe,
            distress_cases,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insight_core::FeatureEngineer;
    use crate::record::{Field, TelemetryBatch, TelemetryRecord};
    use crate::risk::RiskClassifier;
    use chrono::{Duration, NaiveDate};
    use ndarray::Array1;

    fn scored(rows: Vec<(TelemetryRecord, f64)>) -> ScoredBatch {
        let start = NaiveDate::from_ymd_opt(2024, 8, 2)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let (records, scores): (Vec<_>, Vec<_>) = rows
            .into_iter()
            .enumerate()
            .map(|(i, (mut r, s))| {
                r.timestamp = start + Duration::minutes(i as i64);
                (r, s)
            })
            .unzip();
        let batch = TelemetryBatch::from_records(records);
        let frame = FeatureEngineer::new().engineer(&batch);
        let records = RiskClassifier::default()
            .classify_batch(&batch, &frame, &Array1::from(scores))
            .unwrap();
        ScoredBatch {
            name: "test".to_string(),
            features: frame,
            records,
            dropped: 0,
            coerced: 0,
        }
    }

    fn fix(lat: f64, speed: f64) -> TelemetryRecord {
        TelemetryRecord::new(NaiveDateTime::default())
            .with(Field::Lat, lat)
            .with(Field::Lon, 0.0)
            .with(Field::Speed, speed)
            .with(Field::DistanceFromRoute, 10.0)
            .with(Field::StationaryDuration, 0.0)
            .with(Field::SilentDuration, 0.0)
            .with(Field::SignalDropFlag, 0.0)
    }

    #[test]
    fn test_counts_and_rates() {
        let batch = scored(vec![
            (fix(0.0, 1.0), 0.1),
            (fix(0.0, 1.0).with(Field::DistanceFromRoute, 2000.0), -0.05),
            (fix(0.0, 1.0).with(Field::StationaryDuration, 400.0), -0.15),
            (fix(0.02, 1.0).with(Field::SignalDropFlag, 1.0), -0.3),
        ]);
        let report = AnomalyAnalyzer::default().analyze(&batch);

        assert_eq!(report.total_records, 4);
        assert_eq!(report.outliers, 3);
        assert_eq!(report.outlier_rate, 0.75);
        assert_eq!(report.distress_count, 3);
        assert_eq!(
            report.risk_levels,
            RiskLevelCounts {
                low: 1,
                medium: 1,
                high: 1,
                critical: 1
            }
        );
        assert_eq!(report.categories.route_deviation, 1);
        assert_eq!(report.categories.inactivity, 1);
        assert_eq!(report.categories.communication, 1);
        assert_eq!(report.categories.sudden_location_change, 1);
        assert_eq!(report.score_stats.unwrap().count, 4);
    }

    #[test]
    fn test_most_severe_ranked_by_score() {
        let batch = scored(vec![
            (fix(0.0, 1.0), -0.05),
            (fix(0.0, 2.0), -0.4),
            (fix(0.0, 3.0), 0.2),
            (fix(0.0, 4.0), -0.2),
        ]);
        let report = AnomalyAnalyzer::new(2).analyze(&batch);

        let indices: Vec<usize> = report.most_severe.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![1, 3]);
        assert_eq!(report.most_severe[0].speed, Some(2.0));
        assert_eq!(report.most_severe[1].risk_level, RiskLevel::High);
    }

    #[test]
    fn test_distress_cases_in_time_order() {
        let batch = scored(vec![
            (fix(0.0, 1.0).with(Field::SignalDropFlag, 1.0), -0.01),
            (fix(0.0, 1.0).with(Field::SignalDropFlag, 1.0), 0.05),
            (fix(0.0, 1.0).with(Field::SilentDuration, 900.0), -0.5),
        ]);
        let report = AnomalyAnalyzer::default().analyze(&batch);

        let indices: Vec<usize> = report.distress_cases.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert!(report.distress_cases[1].flags.inactivity_flag);
    }

    #[test]
    fn test_analysis_leaves_batch_untouched() {
        let batch = scored(vec![(fix(0.0, 1.0), -0.3), (fix(0.0, 1.0), 0.3)]);
        let before = batch.records.clone();
        AnomalyAnalyzer::default().analyze(&batch);
        assert_eq!(batch.records, before);
    }

    #[test]
    fn test_empty_batch() {
        let report = AnomalyAnalyzer::default().analyze(&scored(Vec::new()));
        assert_eq!(report.total_records, 0);
        assert_eq!(report.outlier_rate, 0.0);
        assert!(report.score_stats.is_none());
        assert!(report.most_severe.is_empty());
    }
}
