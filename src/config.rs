//! Engine tunables.
//!
//! Fixed literals live here as named constants; `EngineConfig` bundles the
//! ones an embedder may want to override.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Detune of the outer unison oscillators, in cents (center stays at 0).
pub const UNISON_WIDTH_CENTS: f64 = 8.0;

/// Analyser window length in samples.
pub const FFT_SIZE: usize = 2048;

/// Analyser spectrum smoothing between successive reads.
pub const SMOOTHING: f64 = 0.4;

/// Longest echo the delay line can hold.
pub const MAX_DELAY_SECONDS: f64 = 5.0;

/// Frames rendered between control-rate updates (timers, filter coefficients).
pub const RENDER_QUANTUM: usize = 128;

/// Exponential envelope stages use `duration / TIME_CONSTANT_DIVISOR` as
/// their time constant, so the curve is ~95% settled after `duration`.
pub const TIME_CONSTANT_DIVISOR: f64 = 3.0;

/// Length of the linear fade that takes a releasing voice to exactly zero
/// before its cleanup runs.
pub const RELEASE_FADE_SECONDS: f64 = 0.005;

/// Time constant of the glide applied when a shared parameter changes.
pub const PARAM_SMOOTHING_SECONDS: f64 = 0.005;

pub const MIN_FILTER_FREQUENCY: f64 = 10.0;
pub const MIN_FILTER_Q: f64 = 0.0001;
pub const MAX_FILTER_Q: f64 = 1000.0;

/// Feedback is capped below unity so the echo loop always decays.
pub const MAX_FEEDBACK: f64 = 0.99;

/// Widest unison spread accepted, one octave either side.
pub const MAX_UNISON_WIDTH_CENTS: f64 = 1200.0;

/// Analyser window bounds, in samples.
pub const MIN_FFT_SIZE: usize = 32;
pub const MAX_FFT_SIZE: usize = 32768;

/// Engine-wide tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub unison_width_cents: f64,
    pub fft_size: usize,
    pub smoothing: f64,
    pub max_delay_seconds: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            unison_width_cents: UNISON_WIDTH_CENTS,
            fft_size: FFT_SIZE,
            smoothing: SMOOTHING,
            max_delay_seconds: MAX_DELAY_SECONDS,
        }
    }
}

impl EngineConfig {
    /// Reject non-finite values, clamp the rest: unison width into
    /// [0, `MAX_UNISON_WIDTH_CENTS`], FFT size to a power of two in
    /// [`MIN_FFT_SIZE`, `MAX_FFT_SIZE`], smoothing into [0, 1] and the
    /// maximum delay to >= 0.
    pub fn sanitized(self) -> Result<Self, EngineError> {
        for (name, value) in [
            ("config.unisonWidthCents", self.unison_width_cents),
            ("config.smoothing", self.smoothing),
            ("config.maxDelaySeconds", self.max_delay_seconds),
        ] {
            if !value.is_finite() {
                return Err(EngineError::InvalidParameter { name, value });
            }
        }
        Ok(EngineConfig {
            unison_width_cents: self.unison_width_cents.clamp(0.0, MAX_UNISON_WIDTH_CENTS),
            fft_size: self.fft_size.clamp(MIN_FFT_SIZE, MAX_FFT_SIZE).next_power_of_two(),
            smoothing: self.smoothing.clamp(0.0, 1.0),
            max_delay_seconds: self.max_delay_seconds.max(0.0),
        })
    }
}
