use crate::error::{StepSyncError, SyncResult};
use crate::sample::Sample;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Outcome of asking the host for motion-sensor access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorAvailability {
    /// Samples will be delivered
    Granted,
    /// The user refused access
    Denied,
    /// The host has no motion sensor; only manual steps are possible
    Unsupported,
}

/// Host-side producer of acceleration samples.
///
/// `request_access` may fail outright (the sensor could not be started), which
/// is different from a `Denied` or `Unsupported` answer.
pub trait SensorSource {
    fn request_access(&mut self) -> SyncResult<SensorAvailability>;

    /// Next pending sample in arrival order, `None` when nothing is queued.
    fn next_sample(&mut self) -> Option<Sample>;
}

/// Sensor source that plays back recorded samples.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    availability: SensorAvailability,
    samples: VecDeque<Sample>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SampleLog {
    Bare(Vec<Sample>),
    Wrapped { samples: Vec<Sample> },
}

impl ReplaySource {
    pub fn new(samples: impl IntoIterator<Item = Sample>) -> Self {
        Self {
            availability: SensorAvailability::Granted,
            samples: samples.into_iter().collect(),
        }
    }

    /// Source that answers the access request with `availability`
    pub fn with_availability(mut self, availability: SensorAvailability) -> Self {
        self.availability = availability;
        self
    }

    /// Load a JSON sample log (`[...]` or `{"samples": [...]}`), gunzipping
    /// `.gz` files.
    pub fn from_log<P: AsRef<Path>>(path: P) -> SyncResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            StepSyncError::Storage(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let samples = if path.extension().map(|e| e == "gz").unwrap_or(false) {
            parse_log(BufReader::new(GzDecoder::new(file)))?
        } else {
            parse_log(BufReader::new(file))?
        };

        log::info!("Loaded {} samples from {}", samples.len(), path.display());
        Ok(Self::new(samples))
    }

    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

fn parse_log<R: Read>(reader: R) -> SyncResult<Vec<Sample>> {
    let log: SampleLog = serde_json::from_reader(reader)?;
    Ok(match log {
        SampleLog::Bare(samples) => samples,
        SampleLog::Wrapped { samples } => samples,
    })
}

impl SensorSource for ReplaySource {
    fn request_access(&mut self) -> SyncResult<SensorAvailability> {
        Ok(self.availability)
    }

    fn next_sample(&mut self) -> Option<Sample> {
        self.samples.pop_front()
    }
}
