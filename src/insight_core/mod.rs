/// Feature engineering, selection and anomaly scoring
pub mod feature;
pub mod model;
pub mod selector;

// Re-export commonly used types
pub use feature::{FeatureEngineer, FeatureFrame, QuantileThresholds};
pub use model::{AnomalyLabel, AnomalyScorer, IsolationForestParams};
pub use selector::{FeatureSelector, FEATURE_CATALOGUE};
