use thiserror::Error;

/// Error type for the detection pipeline
///
/// `MalformedInput` is reported for diagnostics only: preprocessing handles
/// malformed cells and timestamps locally and never aborts a batch with it.
/// `StateError` and `ModelError` always propagate to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// Unparseable timestamp or numeric cell
    #[error("MalformedInput: {0}")]
    MalformedInput(String),
    /// Component used before fit, refit of a fitted component, or a scoring
    /// batch whose feature set diverges from the fit-time feature set
    #[error("StateError: {0}")]
    StateError(String),
    /// Degenerate input (empty batch, zero-variance feature, non-finite values)
    #[error("ModelError: {0}")]
    ModelError(String),
    /// Invalid configuration values
    #[error("ValidationError: {0}")]
    ValidationError(String),
}

impl AnalysisError {
    /// Whether the error comes from calling a component in the wrong lifecycle state
    pub fn is_state_error(&self) -> bool {
        matches!(self, Self::StateError(_))
    }

    /// Whether the error comes from degenerate model input
    pub fn is_model_error(&self) -> bool {
        matches!(self, Self::ModelError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AnalysisError::ValidationError("test error".to_string());
        assert_eq!(err.to_string(), "ValidationError: test error");

        let err = AnalysisError::StateError("scaler is not fitted".to_string());
        assert_eq!(err.to_string(), "StateError: scaler is not fitted");

        let err = AnalysisError::ModelError("empty batch".to_string());
        assert_eq!(err.to_string(), "ModelError: empty batch");

        let err = AnalysisError::MalformedInput("bad timestamp".to_string());
        assert_eq!(err.to_string(), "MalformedInput: bad timestamp");
    }

    #[test]
    fn test_error_kinds_are_distinguishable() {
        assert!(AnalysisError::StateError(String::new()).is_state_error());
        assert!(!AnalysisError::StateError(String::new()).is_model_error());
        assert!(AnalysisError::ModelError(String::new()).is_model_error());
        assert!(!AnalysisError::ValidationError(String::new()).is_state_error());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<AnalysisError>();
        assert_sync::<AnalysisError>();
    }
}
