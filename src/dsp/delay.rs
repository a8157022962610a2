//! Echo — a delay line whose output feeds back into itself, plus the
//! parameters of the dry/wet echo stage.

use serde::{Deserialize, Serialize};

use crate::config::MAX_FEEDBACK;
use crate::error::{EngineError, NodeError};

use super::node::Port;

/// Settings of the shared echo stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EchoParameters {
    /// Dry/wet mix (0.0 = fully dry, 1.0 = fully wet).
    pub mix: f64,
    /// Delay time in seconds.
    pub time: f64,
    /// Feedback amount (0.0 = single echo).
    pub feedback: f64,
}

impl Default for EchoParameters {
    fn default() -> Self {
        EchoParameters {
            mix: 0.3,
            time: 0.3,
            feedback: 0.4,
        }
    }
}

impl EchoParameters {
    /// Dry gain paired with `mix`; `dry + wet` is always 1.
    pub fn dry(&self) -> f64 {
        1.0 - self.mix
    }

    pub fn wet(&self) -> f64 {
        self.mix
    }

    /// Reject non-finite values, clamp the rest: mix into [0, 1], time into
    /// [0, `max_delay`], feedback into [0, `MAX_FEEDBACK`].
    pub fn sanitized(self, max_delay: f64) -> Result<Self, EngineError> {
        for (name, value) in [
            ("echo.mix", self.mix),
            ("echo.time", self.time),
            ("echo.feedback", self.feedback),
        ] {
            if !value.is_finite() {
                return Err(EngineError::InvalidParameter { name, value });
            }
        }
        Ok(EchoParameters {
            mix: self.mix.clamp(0.0, 1.0),
            time: self.time.clamp(0.0, max_delay),
            feedback: self.feedback.clamp(0.0, MAX_FEEDBACK),
        })
    }
}

/// A mono delay line with fractional read position.
///
/// The buffer holds up to `max_delay_seconds` of audio; the delay time is
/// chosen per read so it can change while audio flows.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f64>,
    write_pos: usize,
    sample_rate: f64,
    output: Port,
}

impl DelayLine {
    pub fn new(sample_rate: f64, max_delay_seconds: f64) -> Self {
        let buffer_size = (sample_rate * max_delay_seconds) as usize + 2;
        DelayLine {
            buffer: vec![0.0; buffer_size],
            write_pos: 0,
            sample_rate,
            output: Port::default(),
        }
    }

    /// Sample written `delay_seconds` ago. At least one sample of delay
    /// always applies so the feedback loop is well defined.
    #[inline]
    pub fn read(&self, delay_seconds: f64) -> f64 {
        let len = self.buffer.len();
        let delay = (delay_seconds * self.sample_rate).clamp(1.0, (len - 1) as f64);
        let whole = delay.floor() as usize;
        let frac = delay - whole as f64;

        let newer = self.buffer[(self.write_pos + len - whole) % len];
        let older = self.buffer[(self.write_pos + len - whole - 1) % len];
        newer + (older - newer) * frac
    }

    /// Push the next input sample.
    #[inline]
    pub fn write(&mut self, sample: f64) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
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
