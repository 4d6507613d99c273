use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Numeric telemetry fields coerced during preprocessing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Lat,
    Lon,
    Speed,
    Acceleration,
    SpeedVariance,
    DistanceFromRoute,
    RouteAdherenceRatio,
    BearingDiff,
    SilentDuration,
    StationaryDuration,
    TimeGap,
    SignalDropFlag,
    HourOfDay,
}

impl Field {
    pub const COUNT: usize = 13;

    pub const ALL: [Field; Field::COUNT] = [
        Field::Lat,
        Field::Lon,
        Field::Speed,
        Field::Acceleration,
        Field::SpeedVariance,
        Field::DistanceFromRoute,
        Field::RouteAdherenceRatio,
        Field::BearingDiff,
        Field::SilentDuration,
        Field::StationaryDuration,
        Field::TimeGap,
        Field::SignalDropFlag,
        Field::HourOfDay,
    ];

    /// Column name in raw input
    pub const fn as_str(self) -> &'static str {
        match self {
            Field::Lat => "lat",
            Field::Lon => "lon",
            Field::Speed => "speed",
            Field::Acceleration => "acceleration",
            Field::SpeedVariance => "speed_variance",
            Field::DistanceFromRoute => "distance_from_route",
            Field::RouteAdherenceRatio => "route_adherence_ratio",
            Field::BearingDiff => "bearing_diff",
            Field::SilentDuration => "silent_duration",
            Field::StationaryDuration => "stationary_duration",
            Field::TimeGap => "time_gap",
            Field::SignalDropFlag => "signal_drop_flag",
            Field::HourOfDay => "hour_of_day",
        }
    }

    const fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation of one tracked subject at one instant
///
/// Every numeric field is optional: `None` is the missing marker produced for
/// absent or unparseable cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    /// Dense 0-based position after time ordering
    pub index: usize,
    pub timestamp: NaiveDateTime,
    pub subject_id: Option<String>,
    values: [Option<f64>; Field::COUNT],
}

impl TelemetryRecord {
    pub fn new(timestamp: NaiveDateTime) -> Self {
        Self {
            index: 0,
            timestamp,
            subject_id: None,
            values: [None; Field::COUNT],
        }
    }

    /// Builder-style setter, mostly for constructing batches in code
    pub fn with(mut self, field: Field, value: f64) -> Self {
        self.set(field, Some(value));
        self
    }

    pub fn with_subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    pub fn get(&self, field: Field) -> Option<f64> {
        self.values[field.slot()]
    }

    pub fn set(&mut self, field: Field, value: Option<f64>) {
        self.values[field.slot()] = value.filter(|v| v.is_finite());
    }

    /// Fields holding the missing marker
    pub fn missing_fields(&self) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|f| self.get(*f).is_none())
            .collect()
    }
}

/// A time-ordered batch of records with the set of columns it carried
#[derive(Debug, Clone, Default)]
pub struct TelemetryBatch {
    pub records: Vec<TelemetryRecord>,
    /// Numeric columns present in the source batch, whatever their cell values
    pub columns: BTreeSet<Field>,
    /// Records dropped for an unparseable timestamp
    pub dropped: usize,
    /// Numeric cells coerced to the missing marker
    pub coerced: usize,
}

impl TelemetryBatch {
    /// Build a batch from records already in time order, with every field present
    pub fn from_records(records: Vec<TelemetryRecord>) -> Self {
        let mut batch = Self {
            records,
            columns: Field::ALL.into_iter().collect(),
            dropped: 0,
            coerced: 0,
        };
        for (i, record) in batch.records.iter_mut().enumerate() {
            record.index = i;
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has(&self, field: Field) -> bool {
        self.columns.contains(&field)
    }

    /// Column view with missing markers preserved
    pub fn values(&self, field: Field) -> Vec<Option<f64>> {
        self.records.iter().map(|r| r.get(field)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_field_names_are_unique() {
        let names: BTreeSet<&str> = Field::ALL.iter().map(|f| f.as_str()).collect();
        assert_eq!(names.len(), Field::COUNT);
        assert_eq!(Field::DistanceFromRoute.to_string(), "distance_from_route");
    }

    #[test]
    fn test_record_get_set() {
        let mut record = TelemetryRecord::new(ts()).with(Field::Speed, 3.5);
        assert_eq!(record.get(Field::Speed), Some(3.5));
        assert_eq!(record.get(Field::Lat), None);

        record.set(Field::Lat, Some(f64::NAN));
        assert_eq!(record.get(Field::Lat), None);
    }

    #[test]
    fn test_missing_fields() {
        let mut record = TelemetryRecord::new(ts());
        for field in Field::ALL {
            record.set(field, Some(1.0));
        }
        record.set(Field::TimeGap, None);
        assert_eq!(record.missing_fields(), vec![Field::TimeGap]);
    }

    #[test]
    fn test_batch_from_records_reindexes() {
        let batch = TelemetryBatch::from_records(vec![
            TelemetryRecord::new(ts()),
            TelemetryRecord::new(ts()),
        ]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.records[1].index, 1);
        assert!(batch.has(Field::HourOfDay));
    }
}
