//! Distress Insight Engine - anomaly detection over tourist telemetry
//!
//! Raw telemetry rows are preprocessed, turned into behavioral features,
//! standardized and scored by an isolation forest fitted on a training batch.
//! Scores map to risk levels, raw readings to cause flags, and outliers with a
//! cause are flagged as possible distress.

pub mod analyzer;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod insight_core;
pub mod preprocess;
pub mod record;
pub mod risk;
pub mod stats;
pub mod utils;

pub use analyzer::{AnomalyAnalyzer, AnomalyReport};
pub use config::{PipelineConfig, QuantileMode};
pub use dataset::{RawBatch, RawRecord};
pub use engine::{DistressDetector, ScoredBatch, TrainingSummary};
pub use record::{Field, TelemetryBatch, TelemetryRecord};
pub use risk::{CauseFlags, RiskLevel, ScoredRecord};
pub use stats::Statistics;
pub use utils::AnalysisError;

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;
