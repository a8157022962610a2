//! Biquad filter — matches WebAudio BiquadFilterNode coefficients.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::config::{MAX_FILTER_Q, MIN_FILTER_FREQUENCY, MIN_FILTER_Q};
use crate::error::{EngineError, NodeError};

use super::node::Port;

/// Filter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
}

/// Settings of the shared filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterParameters {
    #[serde(rename = "type")]
    pub filter_type: FilterType,
    /// Cutoff / center frequency in Hz.
    pub frequency: f64,
    #[serde(rename = "Q")]
    pub q: f64,
}

impl Default for FilterParameters {
    fn default() -> Self {
        FilterParameters {
            filter_type: FilterType::Lowpass,
            frequency: 5000.0,
            q: 1.0,
        }
    }
}

impl FilterParameters {
    /// Reject non-finite values, clamp the rest: frequency into
    /// [`MIN_FILTER_FREQUENCY`, Nyquist], Q into [`MIN_FILTER_Q`, `MAX_FILTER_Q`].
    pub fn sanitized(self, sample_rate: f64) -> Result<Self, EngineError> {
        if !self.frequency.is_finite() {
            return Err(EngineError::InvalidParameter {
                name: "filter.frequency",
                value: self.frequency,
            });
        }
        if !self.q.is_finite() {
            return Err(EngineError::InvalidParameter {
                name: "filter.Q",
                value: self.q,
            });
        }
        let nyquist = sample_rate / 2.0;
        Ok(FilterParameters {
            filter_type: self.filter_type,
            frequency: self.frequency.clamp(MIN_FILTER_FREQUENCY, nyquist),
            q: self.q.clamp(MIN_FILTER_Q, MAX_FILTER_Q),
        })
    }
}

/// A biquad IIR filter (2nd order).
///
/// Implements the standard Direct Form II Transposed structure.
/// Coefficient formulas from the Audio EQ Cookbook (Robert Bristow-Johnson).
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    filter_type: FilterType,
    frequency: f64,
    q: f64,

    // Coefficients
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    // State (Direct Form II Transposed)
    z1: f64,
    z2: f64,

    sample_rate: f64,
    dirty: bool,
    output: Port,
}

impl BiquadFilter {
    pub fn new(filter_type: FilterType, sample_rate: f64) -> Self {
        let mut f = BiquadFilter {
            filter_type,
            frequency: 1000.0,
            q: 0.707, // Butterworth
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
            dirty: true,
            output: Port::default(),
        };
        f.update_coefficients();
        f
    }

    /// Recompute filter coefficients from current parameters.
    pub fn update_coefficients(&mut self) {
        let w0 = 2.0 * PI * self.frequency / self.sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * self.q);

        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;
        let (b0, b1, b2) = match self.filter_type {
            FilterType::Lowpass => {
                let b1 = 1.0 - cos_w0;
                (b1 / 2.0, b1, b1 / 2.0)
            }
            FilterType::Highpass => {
                let b0 = (1.0 + cos_w0) / 2.0;
                (b0, -(1.0 + cos_w0), b0)
            }
            FilterType::Bandpass => (alpha, 0.0, -alpha),
            FilterType::Notch => (1.0, -2.0 * cos_w0, 1.0),
        };

        // Normalize by a0
        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
        self.dirty = false;
    }

    /// Process a single sample through the filter.
    pub fn process(&mut self, input: f64) -> f64 {
        if self.dirty {
            self.update_coefficients();
        }

        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    pub fn set_type(&mut self, filter_type: FilterType) {
        if filter_type != self.filter_type {
            self.filter_type = filter_type;
            self.dirty = true;
        }
    }

    /// Set frequency and mark coefficients dirty.
    pub fn set_frequency(&mut self, freq: f64) {
        if freq != self.frequency {
            self.frequency = freq;
            self.dirty = true;
        }
    }

    /// Set Q and mark coefficients dirty.
    pub fn set_q(&mut self, q: f64) {
        if q != self.q {
            self.q = q;
            self.dirty = true;
        }
    }

    pub fn connect(&mut self) {
        self.output.connect();
    }

    pub fn disconnect(&mut self) -> Result<(), NodeError> {
        self.output.disconnect()
    }

    pub fn is_connected(&self) -> bool {
        self.output.is_connected()
    }
}
