use crate::error::{StepSyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Construction-time constants for the step detector.
///
/// Fields missing from a JSON config file fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Minimum time between two accepted steps (ms).
    pub cooldown_ms: f64,
    /// y-axis reading above which a sample is recorded as a peak (m/s²).
    pub peak_threshold: f64,
    /// y-axis reading below which a sample is recorded as a valley (m/s²).
    pub valley_threshold: f64,
    /// Magnitude above which a sample counts as significant movement (m/s²).
    pub movement_threshold: f64,
    /// |y| above which a sample counts as a vertical step (m/s²).
    pub vertical_threshold: f64,
    /// Number of enriched samples kept in the rolling history.
    pub history_capacity: usize,
    /// Number of peaks (and, separately, valleys) kept.
    pub signature_capacity: usize,
    /// Number of accepted-step magnitudes kept.
    pub magnitude_capacity: usize,
    /// Cooldown reference used until the first step is accepted (ms).
    pub origin_ms: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 300.0,
            peak_threshold: 12.0,
            valley_threshold: -12.0,
            movement_threshold: 9.8, // standard gravity
            vertical_threshold: 6.0,
            history_capacity: 10,
            signature_capacity: 5,
            magnitude_capacity: 64,
            origin_ms: 0.0,
        }
    }
}

impl DetectorConfig {
    /// Load and validate a config from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> SyncResult<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> SyncResult<Self> {
        let config: DetectorConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SyncResult<()> {
        let thresholds = [
            ("cooldown_ms", self.cooldown_ms),
            ("peak_threshold", self.peak_threshold),
            ("valley_threshold", self.valley_threshold),
            ("movement_threshold", self.movement_threshold),
            ("vertical_threshold", self.vertical_threshold),
            ("origin_ms", self.origin_ms),
        ];
        if let Some((name, _)) = thresholds.iter().find(|(_, v)| !v.is_finite()) {
            return Err(StepSyncError::InvalidParameters(format!(
                "{} must be finite",
                name
            )));
        }
        if self.cooldown_ms < 0.0 {
            return Err(StepSyncError::InvalidParameters(
                "cooldown_ms must not be negative".to_string(),
            ));
        }
        if self.valley_threshold >= self.peak_threshold {
            return Err(StepSyncError::InvalidParameters(format!(
                "valley_threshold ({}) must be below peak_threshold ({})",
                self.valley_threshold, self.peak_threshold
            )));
        }

        let capacities = [
            ("history_capacity", self.history_capacity),
            ("signature_capacity", self.signature_capacity),
            ("magnitude_capacity", self.magnitude_capacity),
        ];
        if let Some((name, _)) = capacities.iter().find(|(_, c)| *c == 0) {
            return Err(StepSyncError::InvalidParameters(format!(
                "{} must be at least 1",
                name
            )));
        }

        Ok(())
    }
}
