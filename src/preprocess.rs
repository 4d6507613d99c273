//! Raw rows to a time-ordered, typed telemetry batch
//!
//! Malformed input never fails the batch: an unparseable timestamp drops the
//! row, an unparseable numeric cell becomes the missing marker.

use tracing::{debug, warn};

use crate::dataset::{RawBatch, RawRecord};
use crate::record::{Field, TelemetryBatch, TelemetryRecord};
use crate::utils::{coerce_numeric, parse_timestamp, AnalysisError};

pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Accepted subject identifier columns, first match wins
pub const SUBJECT_COLUMNS: [&str; 2] = ["subject_id", "tourist_id"];

#[derive(Debug, Clone, Copy, Default)]
pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Parse, coerce, sort ascending by timestamp and reindex densely
    pub fn process(&self, raw: &RawBatch) -> TelemetryBatch {
        let columns = Field::ALL
            .into_iter()
            .filter(|f| raw.has_column(f.as_str()))
            .collect();

        let mut records = Vec::with_capacity(raw.len());
        let mut dropped = 0;
        let mut coerced = 0;

        for (row_idx, row) in raw.rows.iter().enumerate() {
            match Self::parse_row(row) {
                Ok((record, bad_cells)) => {
                    coerced += bad_cells;
                    records.push(record);
                }
                Err(e) => {
                    debug!(batch = %raw.name, row = row_idx, error = %e, "row dropped");
                    dropped += 1;
                }
            }
        }

        // stable: equal timestamps keep arrival order
        records.sort_by_key(|r| r.timestamp);
        for (i, record) in records.iter_mut().enumerate() {
            record.index = i;
        }

        if dropped > 0 {
            warn!(batch = %raw.name, dropped, "dropped rows with unparseable timestamp");
        }
        if coerced > 0 {
            warn!(batch = %raw.name, coerced, "coerced malformed numeric cells to missing");
        }
        debug!(batch = %raw.name, records = records.len(), "preprocessed batch");

        TelemetryBatch {
            records,
            columns,
            dropped,
            coerced,
        }
    }

    fn parse_row(row: &RawRecord) -> Result<(TelemetryRecord, usize), AnalysisError> {
        let cell = row.get_field(TIMESTAMP_COLUMN).ok_or_else(|| {
            AnalysisError::MalformedInput("missing timestamp".to_string())
        })?;
        let timestamp = parse_timestamp(cell).ok_or_else(|| {
            AnalysisError::MalformedInput(format!("unparseable timestamp '{cell}'"))
        })?;
        let mut record = TelemetryRecord::new(timestamp);
        let mut bad_cells = 0;

        for field in Field::ALL {
            if let Some(cell) = row.get_field(field.as_str()) {
                let value = coerce_numeric(cell);
                if value.is_none() && !cell.trim().is_empty() {
                    bad_cells += 1;
                }
                record.set(field, value);
            }
        }

        record.subject_id = SUBJECT_COLUMNS
            .iter()
            .find_map(|c| row.get_field(c))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok((record, bad_cells))
    }
}
