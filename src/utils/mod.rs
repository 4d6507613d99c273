/// Utility modules for error handling, conversions, scaling and window statistics
pub mod error;
pub mod scaling;
pub mod type_convert;
pub mod window;

// Re-export commonly used types
pub use error::AnalysisError;
pub use scaling::{validate_matrix, ConstantFeaturePolicy, Scaler};
pub use type_convert::{coerce_numeric, parse_timestamp, validate_contamination};
pub use window::{abs_diff, quantile, rolling_mean, rolling_std};
