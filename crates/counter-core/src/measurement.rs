//! Result container filled by the measurement operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quantity a measurement produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementKind {
    /// Signal frequency.
    Frequency,
    /// Signal period.
    Period,
    /// Delay between an edge on the reference channel and one on the measured channel.
    TimeInterval,
    /// Frequency of one channel divided by the reference channel.
    FrequencyRatio,
    /// Peak-to-peak voltage.
    PeakToPeak,
}

impl MeasurementKind {
    /// Unit of the sample values.
    pub fn unit(&self) -> &'static str {
        match self {
            MeasurementKind::Frequency => "Hz",
            MeasurementKind::Period | MeasurementKind::TimeInterval => "s",
            MeasurementKind::FrequencyRatio => "",
            MeasurementKind::PeakToPeak => "V",
        }
    }
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MeasurementKind::Frequency => "frequency",
            MeasurementKind::Period => "period",
            MeasurementKind::TimeInterval => "time interval",
            MeasurementKind::FrequencyRatio => "frequency ratio",
            MeasurementKind::PeakToPeak => "peak-to-peak",
        };
        write!(f, "{}", name)
    }
}

/// One reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Measured value in the unit of the enclosing [`MeasuredData`].
    pub value: f64,
    /// Instrument timestamp in seconds, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl Sample {
    /// Sample without timestamp.
    pub fn new(value: f64) -> Self {
        Self {
            value,
            timestamp: None,
        }
    }

    /// Sample with an instrument timestamp.
    pub fn with_timestamp(value: f64, timestamp: f64) -> Self {
        Self {
            value,
            timestamp: Some(timestamp),
        }
    }
}

/// Measurement result.
///
/// Callers hand an instance to a measurement operation; it is replaced as a
/// whole on success and left untouched on failure. A default instance holds
/// no kind and no samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasuredData {
    /// Quantity measured, `None` until filled.
    pub kind: Option<MeasurementKind>,
    /// Unit of the sample values.
    pub unit: String,
    /// Channels involved; reference first for two-channel measurements.
    pub channels: Vec<u8>,
    /// Readings in acquisition order.
    pub samples: Vec<Sample>,
    /// Wall-clock time the acquisition completed.
    pub acquired_at: Option<DateTime<Utc>>,
}

impl MeasuredData {
    /// Result stamped with the current time.
    pub fn new(kind: MeasurementKind, channels: Vec<u8>, samples: Vec<Sample>) -> Self {
        Self {
            kind: Some(kind),
            unit: kind.unit().to_string(),
            channels,
            samples,
            acquired_at: Some(Utc::now()),
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True if no samples are held.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample values in order.
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    /// Arithmetic mean, `None` when empty.
    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().map(|s| s.value).sum::<f64>() / self.samples.len() as f64)
    }

    /// Sample standard deviation, `None` with fewer than two samples.
    pub fn std_dev(&self) -> Option<f64> {
        if self.samples.len() < 2 {
            return None;
        }
        let mean = self.mean()?;
        let var = self
            .samples
            .iter()
            .map(|s| (s.value - mean).powi(2))
            .sum::<f64>()
            / (self.samples.len() - 1) as f64;
        Some(var.sqrt())
    }
}
