// StepSync step detection library
// Turns a raw accelerometer stream into step events for a host step counter

pub mod config;
pub mod detector;
pub mod error;
pub mod sample;
pub mod sensor_source;
pub mod session;

// Re-export public types
pub use config::DetectorConfig;
pub use detector::{SignaturePoint, StepDetector, StepEvaluation, StepEvent, StepSignature};
pub use error::{StepSyncError, SyncResult};
pub use sample::{EnrichedSample, Sample};
pub use sensor_source::{ReplaySource, SensorAvailability, SensorSource};
pub use session::{
    InputMode, SessionMetadata, SessionState, StepOrigin, StepRecord, StepSink, TrackingSession,
};
