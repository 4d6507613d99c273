use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One raw telemetry row: column name to unparsed cell text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RawRecord {
    pub fields: HashMap<String, String>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cell to the row
    pub fn add_field(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Builder-style variant of `add_field`
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_field(key, value);
        self
    }

    pub fn get_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// A batch of raw rows in arrival order
///
/// Column order is not significant and rows may interleave subjects.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RawBatch {
    pub name: String,
    pub rows: Vec<RawRecord>,
}

impl RawBatch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    pub fn add_row(&mut self, row: RawRecord) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether any row carries the column
    pub fn has_column(&self, column: &str) -> bool {
        self.rows.iter().any(|row| row.fields.contains_key(column))
    }

    /// Sorted union of column names across rows
    pub fn column_names(&self) -> Vec<String> {
        let mut columns = std::collections::BTreeSet::new();
        for row in &self.rows {
            columns.extend(row.fields.keys().cloned());
        }
        columns.into_iter().collect()
    }

    /// Load rows from CSV text with a header line
    pub fn from_csv(name: impl Into<String>, csv_data: &str) -> crate::Result<Self> {
        let mut batch = RawBatch::new(name);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(csv_data.as_bytes());

        let headers = reader.headers()?.clone();

        for result in reader.records() {
            let record = result?;
            let mut row = RawRecord::new();
            for (header, cell) in headers.iter().zip(record.iter()) {
                row.add_field(header, cell);
            }
            batch.add_row(row);
        }

        Ok(batch)
    }

    /// Load rows from a JSON array of objects
    ///
    /// `null` cells are left out of the row; other scalars are kept as text.
    pub fn from_json(name: impl Into<String>, json_data: &str) -> crate::Result<Self> {
        let mut batch = RawBatch::new(name);
        let data: Vec<HashMap<String, serde_json::Value>> = serde_json::from_str(json_data)?;

        for item in data {
            let mut row = RawRecord::new();
            for (key, value) in item {
                let cell = match value {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Number(n) => n.to_string(),
                    serde_json::Value::Bool(b) => u8::from(b).to_string(),
                    serde_json::Value::Null => continue,
                    other => other.to_string(),
                };
                row.add_field(key, cell);
            }
            batch.add_row(row);
        }

        Ok(batch)
    }
}
