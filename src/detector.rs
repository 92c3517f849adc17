//! Step detection over a raw accelerometer stream.
//!
//! Each sample is scored by three independent signals (overall movement,
//! vertical movement, time since the last accepted step) plus a bonus when
//! the most recent peak and valley of the y axis are a plausible half stride
//! apart. A step is accepted when the score clears 0.8 and the cooldown has
//! elapsed.
//!
//! The detector is single-writer: `process` takes `&mut self`, never blocks
//! and holds no locks. Hosts that receive samples on several threads must
//! serialize their calls.

use crate::config::DetectorConfig;
use crate::error::{StepSyncError, SyncResult};
use crate::sample::{EnrichedSample, Sample};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const MOVEMENT_WEIGHT: f64 = 0.4;
const INTERVAL_WEIGHT: f64 = 0.3;
const VERTICAL_WEIGHT: f64 = 0.3;
const PATTERN_BONUS: f64 = 0.2;

/// Peak/valley gap that earns the pattern bonus, exclusive on both ends (ms).
const PATTERN_MIN_GAP_MS: f64 = 100.0;
const PATTERN_MAX_GAP_MS: f64 = 500.0;

const DECISION_THRESHOLD: f64 = 0.8;

/// Highest confidence a sample can score (all signals plus the pattern bonus).
pub const MAX_CONFIDENCE: f64 = 1.2;

/// Emitted once per accepted step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepEvent {
    pub timestamp: f64,
    pub confidence: f64,
    pub magnitude: f64,
}

/// y-axis extremum recorded in the step signature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignaturePoint {
    pub timestamp: f64,
    pub value: f64,
}

/// Rolling walking signature: recent peaks, valleys and accepted magnitudes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepSignature {
    peaks: VecDeque<SignaturePoint>,
    valleys: VecDeque<SignaturePoint>,
    magnitudes: VecDeque<f64>,
}

impl StepSignature {
    pub fn peaks(&self) -> &VecDeque<SignaturePoint> {
        &self.peaks
    }

    pub fn valleys(&self) -> &VecDeque<SignaturePoint> {
        &self.valleys
    }

    /// Magnitudes of accepted steps, oldest first
    pub fn magnitudes(&self) -> &VecDeque<f64> {
        &self.magnitudes
    }

    fn clear(&mut self) {
        self.peaks.clear();
        self.valleys.clear();
        self.magnitudes.clear();
    }
}

/// Full breakdown of how one sample was scored
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepEvaluation {
    pub timestamp: f64,
    pub magnitude: f64,
    pub significant_movement: bool,
    pub vertical_step: bool,
    pub valid_interval: bool,
    pub is_peak: bool,
    pub is_valley: bool,
    pub pattern_bonus: bool,
    pub confidence: f64,
    /// `confidence` cleared the decision threshold
    pub confident: bool,
    /// `confident` and `valid_interval` both hold
    pub is_step: bool,
}

impl StepEvaluation {
    pub fn to_event(&self) -> Option<StepEvent> {
        self.is_step.then_some(StepEvent {
            timestamp: self.timestamp,
            confidence: self.confidence,
            magnitude: self.magnitude,
        })
    }
}

/// Streaming step classifier.
pub struct StepDetector {
    config: DetectorConfig,
    history: VecDeque<EnrichedSample>,
    signature: StepSignature,
    last_step_time: Option<f64>,
    confidence: f64,
    last_evaluation: Option<StepEvaluation>,
    steps_detected: u64,
}

impl StepDetector {
    /// Create a detector with the given configuration.
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            history: VecDeque::with_capacity(config.history_capacity),
            signature: StepSignature {
                peaks: VecDeque::with_capacity(config.signature_capacity),
                valleys: VecDeque::with_capacity(config.signature_capacity),
                magnitudes: VecDeque::with_capacity(config.magnitude_capacity),
            },
            last_step_time: None,
            confidence: 0.0,
            last_evaluation: None,
            steps_detected: 0,
            config,
        }
    }

    /// Create a detector after validating the configuration.
    pub fn with_config(config: DetectorConfig) -> SyncResult<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Process one sample. Returns a StepEvent if a step was accepted.
    ///
    /// Non-finite samples are dropped without touching any state.
    pub fn process(&mut self, sample: Sample) -> Option<StepEvent> {
        match self.try_process(sample) {
            Ok(event) => event,
            Err(err) => {
                log::warn!("Dropping sample at {}: {}", sample.timestamp, err);
                None
            }
        }
    }

    /// Like [`process`](Self::process), but reports a non-finite sample as
    /// `InvalidSample` instead of dropping it silently.
    pub fn try_process(&mut self, sample: Sample) -> SyncResult<Option<StepEvent>> {
        let evaluation = self.evaluate(&sample)?;
        let capacity = self.config.history_capacity;
        push_bounded(&mut self.history, EnrichedSample::from(sample), capacity);

        let capacity = self.config.signature_capacity;
        let point = SignaturePoint {
            timestamp: sample.timestamp,
            value: sample.y,
        };
        if evaluation.is_peak {
            push_bounded(&mut self.signature.peaks, point, capacity);
        }
        if evaluation.is_valley {
            push_bounded(&mut self.signature.valleys, point, capacity);
        }

        self.last_evaluation = Some(evaluation);

        let event = evaluation.to_event();
        if let Some(step) = event {
            self.last_step_time = Some(step.timestamp);
            self.confidence = step.confidence;
            self.steps_detected += 1;
            let capacity = self.config.magnitude_capacity;
            push_bounded(&mut self.signature.magnitudes, step.magnitude, capacity);
            log::debug!(
                "Step {} at {:.0}ms (confidence {:.2}, magnitude {:.2})",
                self.steps_detected,
                step.timestamp,
                step.confidence,
                step.magnitude
            );
        }

        Ok(event)
    }

    /// Process a batch of samples and return all accepted steps.
    pub fn process_batch(&mut self, samples: &[Sample]) -> Vec<StepEvent> {
        samples
            .iter()
            .filter_map(|sample| self.process(*sample))
            .collect()
    }

    /// Score a sample against the current state without recording it.
    ///
    /// The result is exactly what the next `process` call on the same sample
    /// would decide, including the peak or valley the sample itself adds.
    pub fn evaluate(&self, sample: &Sample) -> SyncResult<StepEvaluation> {
        if let Some(field) = sample.first_non_finite() {
            return Err(StepSyncError::InvalidSample(format!(
                "{} is not finite",
                field
            )));
        }

        let config = &self.config;
        let magnitude = sample.magnitude();

        let significant_movement = magnitude > config.movement_threshold;
        let vertical_step = sample.y.abs() > config.vertical_threshold;
        let elapsed = sample.timestamp - self.cooldown_reference();
        let valid_interval = elapsed > config.cooldown_ms;

        let is_peak = sample.y > config.peak_threshold;
        let is_valley = sample.y < config.valley_threshold;
        let point = SignaturePoint {
            timestamp: sample.timestamp,
            value: sample.y,
        };
        let peak = self.tail_after_push(&self.signature.peaks, is_peak.then_some(point));
        let valley = self.tail_after_push(&self.signature.valleys, is_valley.then_some(point));

        // Tails of two independently evicted buffers; they need not be
        // adjacent in time.
        let pattern_bonus = match (peak, valley) {
            (Some(peak), Some(valley)) => {
                let gap = (peak.timestamp - valley.timestamp).abs();
                gap > PATTERN_MIN_GAP_MS && gap < PATTERN_MAX_GAP_MS
            }
            _ => false,
        };

        let mut confidence = 0.0;
        if significant_movement {
            confidence += MOVEMENT_WEIGHT;
        }
        if valid_interval {
            confidence += INTERVAL_WEIGHT;
        }
        if vertical_step {
            confidence += VERTICAL_WEIGHT;
        }
        if pattern_bonus {
            confidence += PATTERN_BONUS;
        }

        // valid_interval already contributes to confidence; the decision
        // still requires it on its own.
        let confident = confidence > DECISION_THRESHOLD;
        let is_step = confident && valid_interval;

        Ok(StepEvaluation {
            timestamp: sample.timestamp,
            magnitude,
            significant_movement,
            vertical_step,
            valid_interval,
            is_peak,
            is_valley,
            pattern_bonus,
            confidence,
            confident,
            is_step,
        })
    }

    /// Most recent entry of `buffer` once `pushed` is appended, provided the
    /// buffer then holds at least two entries.
    fn tail_after_push(
        &self,
        buffer: &VecDeque<SignaturePoint>,
        pushed: Option<SignaturePoint>,
    ) -> Option<SignaturePoint> {
        let capacity = self.config.signature_capacity;
        let len = match pushed {
            Some(_) => (buffer.len() + 1).min(capacity),
            None => buffer.len(),
        };
        if len < 2 {
            return None;
        }
        pushed.or_else(|| buffer.back().copied())
    }

    fn cooldown_reference(&self) -> f64 {
        self.last_step_time.unwrap_or(self.config.origin_ms)
    }

    /// Reinitialize all state to construction-time defaults.
    pub fn reset(&mut self) {
        self.history.clear();
        self.signature.clear();
        self.last_step_time = None;
        self.confidence = 0.0;
        self.last_evaluation = None;
        self.steps_detected = 0;
    }

    /// Confidence of the most recently accepted step (0.0 before any).
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Scoring of the most recently processed sample.
    pub fn last_evaluation(&self) -> Option<&StepEvaluation> {
        self.last_evaluation.as_ref()
    }

    /// Timestamp of the most recently accepted step, `None` if there was none.
    pub fn last_step_time(&self) -> Option<f64> {
        self.last_step_time
    }

    pub fn history(&self) -> &VecDeque<EnrichedSample> {
        &self.history
    }

    pub fn signature(&self) -> &StepSignature {
        &self.signature
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn steps_detected(&self) -> u64 {
        self.steps_detected
    }
}

impl Default for StepDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T, capacity: usize) {
    buffer.push_back(item);
    while buffer.len() > capacity {
        buffer.pop_front();
    }
}
