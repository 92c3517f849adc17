use thiserror::Error;

/// Step tracking error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepSyncError {
    #[error("Session already running")]
    AlreadyRunning,

    #[error("Session not running")]
    NotRunning,

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    #[error("Sensor failed: {0}")]
    SensorFailed(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for step tracking operations
pub type SyncResult<T> = Result<T, StepSyncError>;

impl From<std::io::Error> for StepSyncError {
    fn from(err: std::io::Error) -> Self {
        StepSyncError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StepSyncError {
    fn from(err: serde_json::Error) -> Self {
        StepSyncError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            StepSyncError::InvalidSample("y is NaN".to_string()).to_string(),
            "Invalid sample: y is NaN"
        );
        assert_eq!(StepSyncError::NotRunning.to_string(), "Session not running");
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.json");
        let err: StepSyncError = io.into();
        assert!(matches!(err, StepSyncError::Storage(msg) if msg.contains("missing.json")));
    }
}
