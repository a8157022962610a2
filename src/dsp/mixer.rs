//! Mixer — the voice bus every active voice sums into before the filter.

use super::voice::Voice;

/// Accumulates voice output for one render quantum.
#[derive(Debug, Clone, Default)]
pub struct Mixer {
    buffer: Vec<f64>,
    scratch: Vec<f64>,
}

impl Mixer {
    pub fn new() -> Self {
        Mixer::default()
    }

    /// Prepare a buffer of `num_samples` filled with zeros.
    pub fn clear(&mut self, num_samples: usize) {
        self.buffer.clear();
        self.buffer.resize(num_samples, 0.0);
        if self.scratch.len() < num_samples {
            self.scratch.resize(num_samples, 0.0);
        }
    }

    /// Sum one voice into the bus for a block starting at `start_time`.
    pub fn add_voice(&mut self, voice: &mut Voice, start_time: f64, sample_rate: f64) {
        voice.render_into(start_time, sample_rate, &mut self.buffer, &mut self.scratch);
    }

    pub fn samples(&self) -> &[f64] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Soft clipper using tanh to prevent harsh digital clipping.
pub fn soft_clip(x: f64) -> f64 {
    x.tanh()
}
