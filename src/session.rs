use crate::config::DetectorConfig;
use crate::detector::{StepDetector, StepEvent};
use crate::error::{StepSyncError, SyncResult};
use crate::sample::Sample;
use crate::sensor_source::{SensorAvailability, SensorSource};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Created but not tracking
    Idle,
    /// Accepting samples and manual steps
    Recording,
    /// Tracking suspended, counters kept
    Paused,
}

/// Where steps come from, decided when the session starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputMode {
    /// Sensor access granted, samples go through the detector
    Sensor,
    /// No motion sensor on the host, steps are added by hand
    Manual,
    /// Sensor access refused; only manual steps are counted
    Denied,
}

impl From<SensorAvailability> for InputMode {
    fn from(availability: SensorAvailability) -> Self {
        match availability {
            SensorAvailability::Granted => InputMode::Sensor,
            SensorAvailability::Denied => InputMode::Denied,
            SensorAvailability::Unsupported => InputMode::Manual,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StepOrigin {
    Detected(StepEvent),
    Manual,
}

/// One counted step as handed to sinks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub origin: StepOrigin,
    /// Session step count including this step
    pub total_steps: u64,
}

/// Downstream consumer of counted steps (counters, logs, displays).
pub trait StepSink {
    fn on_step(&mut self, record: &StepRecord);
}

impl<F: FnMut(&StepRecord)> StepSink for F {
    fn on_step(&mut self, record: &StepRecord) {
        self(record)
    }
}

/// Session metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub start_time: String,
    pub state: SessionState,
    pub mode: Option<InputMode>,
    pub samples_processed: u64,
    pub samples_rejected: u64,
    pub samples_dropped: u64,
    pub detected_steps: u64,
    pub manual_steps: u64,
}

impl SessionMetadata {
    fn fresh() -> Self {
        SessionMetadata {
            session_id: format!("session_{}", Utc::now().timestamp_millis()),
            start_time: Utc::now().to_rfc3339(),
            state: SessionState::Idle,
            mode: None,
            samples_processed: 0,
            samples_rejected: 0,
            samples_dropped: 0,
            detected_steps: 0,
            manual_steps: 0,
        }
    }

    pub fn total_steps(&self) -> u64 {
        self.detected_steps + self.manual_steps
    }
}

/// Step tracking session.
///
/// Owns its detector exclusively; all methods take `&mut self`, so a host
/// that shares a session across threads must wrap it in its own lock.
pub struct TrackingSession {
    metadata: SessionMetadata,
    detector: StepDetector,
    sinks: Vec<Box<dyn StepSink + Send>>,
}

impl TrackingSession {
    /// Create new session in Idle state
    pub fn new(config: DetectorConfig) -> SyncResult<Self> {
        Ok(TrackingSession {
            metadata: SessionMetadata::fresh(),
            detector: StepDetector::with_config(config)?,
            sinks: Vec::new(),
        })
    }

    /// Register a consumer that sees every counted step
    pub fn add_sink<K: StepSink + Send + 'static>(&mut self, sink: K) {
        self.sinks.push(Box::new(sink));
    }

    /// Idle → Recording after negotiating sensor access, or Paused → Recording.
    pub fn start<S: SensorSource + ?Sized>(&mut self, source: &mut S) -> SyncResult<InputMode> {
        match self.metadata.state {
            SessionState::Recording => Err(StepSyncError::AlreadyRunning),
            SessionState::Paused => {
                self.metadata.state = SessionState::Recording;
                log::info!("Session {} resumed", self.metadata.session_id);
                self.metadata
                    .mode
                    .ok_or_else(|| StepSyncError::InvalidState("Paused without input mode".to_string()))
            }
            SessionState::Idle => {
                let availability = source.request_access().map_err(|e| match e {
                    StepSyncError::SensorFailed(_) => e,
                    other => StepSyncError::SensorFailed(other.to_string()),
                })?;

                let mode = InputMode::from(availability);
                self.metadata.mode = Some(mode);
                self.metadata.state = SessionState::Recording;
                match mode {
                    InputMode::Sensor => {
                        log::info!("Session {} started: motion tracking active", self.metadata.session_id)
                    }
                    InputMode::Denied => log::warn!(
                        "Session {} started: motion permission denied",
                        self.metadata.session_id
                    ),
                    InputMode::Manual => log::warn!(
                        "Session {} started: automatic tracking unavailable, manual mode",
                        self.metadata.session_id
                    ),
                }
                Ok(mode)
            }
        }
    }

    /// Recording → Paused
    pub fn pause(&mut self) -> SyncResult<()> {
        match self.metadata.state {
            SessionState::Recording => {
                self.metadata.state = SessionState::Paused;
                log::info!("Session {} paused", self.metadata.session_id);
                Ok(())
            }
            SessionState::Paused => Err(StepSyncError::InvalidState("Already paused".to_string())),
            SessionState::Idle => Err(StepSyncError::InvalidState("Not recording".to_string())),
        }
    }

    /// Recording | Paused → Idle
    pub fn stop(&mut self) -> SyncResult<()> {
        match self.metadata.state {
            SessionState::Recording | SessionState::Paused => {
                self.metadata.state = SessionState::Idle;
                log::info!(
                    "Session {} stopped with {} steps",
                    self.metadata.session_id,
                    self.metadata.total_steps()
                );
                Ok(())
            }
            SessionState::Idle => Err(StepSyncError::NotRunning),
        }
    }

    /// Start over as a brand-new session; sinks stay registered.
    pub fn reset(&mut self) {
        self.metadata = SessionMetadata::fresh();
        self.detector.reset();
    }

    /// Feed one sensor sample through the detector.
    ///
    /// Samples arriving outside Recording or without sensor access are
    /// dropped; non-finite samples are rejected. Neither is an error.
    pub fn push_sample(&mut self, sample: Sample) -> SyncResult<Option<StepRecord>> {
        if self.metadata.state != SessionState::Recording
            || self.metadata.mode != Some(InputMode::Sensor)
        {
            self.metadata.samples_dropped += 1;
            return Ok(None);
        }

        let event = match self.detector.try_process(sample) {
            Ok(event) => event,
            Err(StepSyncError::InvalidSample(msg)) => {
                log::warn!("Rejected sample at {}: {}", sample.timestamp, msg);
                self.metadata.samples_rejected += 1;
                return Ok(None);
            }
            Err(other) => return Err(other),
        };
        self.metadata.samples_processed += 1;

        Ok(event.map(|step| {
            self.metadata.detected_steps += 1;
            self.emit(StepOrigin::Detected(step))
        }))
    }

    /// Drain every pending sample from `source`.
    pub fn pump<S: SensorSource + ?Sized>(&mut self, source: &mut S) -> SyncResult<Vec<StepRecord>> {
        let mut records = Vec::new();
        while let Some(sample) = source.next_sample() {
            if let Some(record) = self.push_sample(sample)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Count one step by hand. The detector is not involved.
    pub fn add_manual_step(&mut self) -> SyncResult<StepRecord> {
        if self.metadata.state == SessionState::Idle {
            return Err(StepSyncError::NotRunning);
        }
        self.metadata.manual_steps += 1;
        Ok(self.emit(StepOrigin::Manual))
    }

    fn emit(&mut self, origin: StepOrigin) -> StepRecord {
        let record = StepRecord {
            origin,
            total_steps: self.metadata.total_steps(),
        };
        for sink in self.sinks.iter_mut() {
            sink.on_step(&record);
        }
        record
    }

    pub fn state(&self) -> SessionState {
        self.metadata.state
    }

    pub fn mode(&self) -> Option<InputMode> {
        self.metadata.mode
    }

    pub fn is_recording(&self) -> bool {
        self.metadata.state == SessionState::Recording
    }

    pub fn step_count(&self) -> u64 {
        self.metadata.total_steps()
    }

    /// Get metadata snapshot
    pub fn metadata(&self) -> SessionMetadata {
        self.metadata.clone()
    }

    pub fn detector(&self) -> &StepDetector {
        &self.detector
    }
}

impl Default for TrackingSession {
    fn default() -> Self {
        TrackingSession {
            metadata: SessionMetadata::fresh(),
            detector: StepDetector::default(),
            sinks: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor_source::ReplaySource;
    use std::sync::{Arc, Mutex};

    struct FailingSource;

    impl SensorSource for FailingSource {
        fn request_access(&mut self) -> SyncResult<SensorAvailability> {
            Err(StepSyncError::SensorFailed("accelerometer busy".to_string()))
        }

        fn next_sample(&mut self) -> Option<Sample> {
            None
        }
    }

    fn walk() -> Vec<Sample> {
        vec![
            Sample::new(0.0, 13.0, 0.0, 0.0),
            Sample::new(0.0, -13.0, 0.0, 200.0),
            Sample::new(0.0, 13.0, 0.0, 401.0),
        ]
    }

    #[test]
    fn test_session_state_transitions() {
        let mut session = TrackingSession::default();
        let mut source = ReplaySource::new(Vec::new());

        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.is_recording());

        assert_eq!(session.start(&mut source).unwrap(), InputMode::Sensor);
        assert_eq!(session.state(), SessionState::Recording);

        session.pause().unwrap();
        assert_eq!(session.state(), SessionState::Paused);

        assert_eq!(session.start(&mut source).unwrap(), InputMode::Sensor);
        assert!(session.is_recording());

        session.stop().unwrap();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_invalid_state_transitions() {
        let mut session = TrackingSession::default();
        let mut source = ReplaySource::new(Vec::new());

        assert!(session.pause().is_err());
        assert_eq!(session.stop().unwrap_err(), StepSyncError::NotRunning);

        session.start(&mut source).unwrap();
        assert_eq!(session.start(&mut source).unwrap_err(), StepSyncError::AlreadyRunning);

        assert!(session.pause().is_ok());
        assert!(session.pause().is_err());
    }

    #[test]
    fn test_sensor_failure_keeps_session_idle() {
        let mut session = TrackingSession::default();
        let err = session.start(&mut FailingSource).unwrap_err();
        assert!(matches!(err, StepSyncError::SensorFailed(_)));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.mode(), None);
    }

    #[test]
    fn test_pump_counts_detected_steps() {
        let mut session = TrackingSession::default();
        let mut source = ReplaySource::new(walk());
        session.start(&mut source).unwrap();

        let records = session.pump(&mut source).unwrap();
        assert_eq!(records.len(), 1);
        assert!(matches!(records[0].origin, StepOrigin::Detected(e) if e.timestamp == 401.0));
        assert_eq!(records[0].total_steps, 1);

        let meta = session.metadata();
        assert_eq!(meta.samples_processed, 3);
        assert_eq!(meta.detected_steps, 1);
        assert_eq!(session.detector().history().len(), 3);
    }

    #[test]
    fn test_manual_fallback_bypasses_detector() {
        let mut session = TrackingSession::default();
        let mut source = ReplaySource::new(walk()).with_availability(SensorAvailability::Unsupported);
        assert_eq!(session.start(&mut source).unwrap(), InputMode::Manual);

        for expected in 1..=3 {
            let record = session.add_manual_step().unwrap();
            assert_eq!(record.origin, StepOrigin::Manual);
            assert_eq!(record.total_steps, expected);
        }

        // Samples are not routed to the detector in manual mode
        assert!(session.pump(&mut source).unwrap().is_empty());
        assert!(session.detector().history().is_empty());
        assert_eq!(session.detector().steps_detected(), 0);

        let meta = session.metadata();
        assert_eq!(meta.manual_steps, 3);
        assert_eq!(meta.samples_dropped, 3);
        assert_eq!(session.step_count(), 3);
    }

    #[test]
    fn test_denied_drops_samples() {
        let mut session = TrackingSession::default();
        let mut source = ReplaySource::new(walk()).with_availability(SensorAvailability::Denied);
        assert_eq!(session.start(&mut source).unwrap(), InputMode::Denied);
        assert!(session.pump(&mut source).unwrap().is_empty());
        assert_eq!(session.metadata().samples_dropped, 3);
        assert!(session.add_manual_step().is_ok());
    }

    #[test]
    fn test_samples_ignored_while_paused() {
        let mut session = TrackingSession::default();
        let mut source = ReplaySource::new(Vec::new());
        session.start(&mut source).unwrap();
        session.pause().unwrap();

        assert!(session
            .push_sample(Sample::new(0.0, 13.0, 0.0, 500.0))
            .unwrap()
            .is_none());
        assert_eq!(session.metadata().samples_dropped, 1);
        assert!(session.detector().history().is_empty());
    }

    #[test]
    fn test_manual_step_requires_running_session() {
        let mut session = TrackingSession::default();
        assert_eq!(session.add_manual_step().unwrap_err(), StepSyncError::NotRunning);
    }

    #[test]
    fn test_non_finite_samples_counted_as_rejected() {
        let mut session = TrackingSession::default();
        let mut source = ReplaySource::new(vec![Sample::new(f64::NAN, 13.0, 0.0, 500.0)]);
        session.start(&mut source).unwrap();
        assert!(session.pump(&mut source).unwrap().is_empty());

        let meta = session.metadata();
        assert_eq!(meta.samples_rejected, 1);
        assert_eq!(meta.samples_processed, 0);
    }

    #[test]
    fn test_sinks_receive_every_step() {
        let seen: Arc<Mutex<Vec<StepRecord>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);

        let mut session = TrackingSession::default();
        session.add_sink(move |record: &StepRecord| sink_seen.lock().unwrap().push(*record));

        let mut source = ReplaySource::new(walk());
        session.start(&mut source).unwrap();
        session.pump(&mut source).unwrap();
        session.add_manual_step().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[0].origin, StepOrigin::Detected(_)));
        assert_eq!(seen[1].origin, StepOrigin::Manual);
        assert_eq!(seen[1].total_steps, 2);
    }

    #[test]
    fn test_reset_starts_fresh_session() {
        let mut session = TrackingSession::default();
        let mut source = ReplaySource::new(walk());
        session.start(&mut source).unwrap();
        session.pump(&mut source).unwrap();

        session.reset();
        let meta = session.metadata();
        assert_eq!(meta.state, SessionState::Idle);
        assert_eq!(meta.mode, None);
        assert_eq!(meta.total_steps(), 0);
        assert!(session.detector().history().is_empty());
        assert_eq!(session.detector().last_step_time(), None);
    }

    #[test]
    fn test_metadata_serializes() {
        let session = TrackingSession::default();
        let json = serde_json::to_string(&session.metadata()).unwrap();
        assert!(json.contains("session_"));
        assert!(json.contains("\"Idle\""));
    }
}
