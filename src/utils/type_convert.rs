use chrono::{DateTime, NaiveDate, NaiveDateTime};

use super::error::AnalysisError;

/// Timestamp layouts accepted after RFC 3339 has been tried
const NAIVE_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

/// Coerce a raw cell to a number
///
/// # Returns
/// * `Some(value)` for a finite number
/// * `None` (the missing marker) for empty, unparseable, NaN or infinite cells
pub fn coerce_numeric(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a timestamp cell into a naive UTC instant
///
/// Offsets are normalized to UTC. Bare dates resolve to midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }

    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Validate the expected outlier fraction is within (0, 0.5]
pub fn validate_contamination(contamination: f64) -> Result<(), AnalysisError> {
    if !(contamination > 0.0 && contamination <= 0.5) {
        return Err(AnalysisError::ValidationError(format!(
            "contamination must be in (0, 0.5], got {contamination}"
        )));
    }
    Ok(())
}
