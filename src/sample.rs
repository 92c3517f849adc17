use serde::{Deserialize, Serialize};

/// Accelerometer sample as delivered by the host sensor callback.
///
/// `timestamp` is in milliseconds on a monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: f64,
}

impl Sample {
    pub fn new(x: f64, y: f64, z: f64, timestamp: f64) -> Self {
        Self { x, y, z, timestamp }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// True when every axis and the timestamp are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.timestamp.is_finite()
    }

    /// Name of the first non-finite field, if any
    pub(crate) fn first_non_finite(&self) -> Option<&'static str> {
        [
            ("x", self.x),
            ("y", self.y),
            ("z", self.z),
            ("timestamp", self.timestamp),
        ]
        .into_iter()
        .find(|(_, value)| !value.is_finite())
        .map(|(name, _)| name)
    }
}

/// Sample with its precomputed magnitude, as kept in the detector history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnrichedSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub magnitude: f64,
    pub timestamp: f64,
}

impl From<Sample> for EnrichedSample {
    fn from(sample: Sample) -> Self {
        Self {
            x: sample.x,
            y: sample.y,
            z: sample.z,
            magnitude: sample.magnitude(),
            timestamp: sample.timestamp,
        }
    }
}
