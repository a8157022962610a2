//! Analyser — a passive tap keeping the most recent window of output for
//! waveform and spectrum displays.

use std::cell::RefCell;
use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::error::NodeError;

use super::node::Port;

/// Spectrum floor/ceiling mapped onto the byte range, in dB.
pub const MIN_DECIBELS: f64 = -100.0;
pub const MAX_DECIBELS: f64 = -30.0;

/// Read-only view of the signal passing through the analyser node.
///
/// Reading never touches the audio path; only the analyser's own spectrum
/// smoothing memory is updated by spectrum reads.
pub struct Analyser {
    fft_size: usize,
    smoothing: f64,
    window: Vec<f64>,
    write_pos: usize,
    fft: Arc<dyn Fft<f64>>,
    smoothed: RefCell<Vec<f64>>,
    output: Port,
}

impl Analyser {
    pub fn new(fft_size: usize, smoothing: f64) -> Self {
        let fft_size = fft_size.max(32).next_power_of_two();
        let fft = FftPlanner::new().plan_fft_forward(fft_size);
        Analyser {
            fft_size,
            smoothing: smoothing.clamp(0.0, 1.0),
            window: vec![0.0; fft_size],
            write_pos: 0,
            fft,
            smoothed: RefCell::new(vec![0.0; fft_size / 2]),
            output: Port::default(),
        }
    }

    /// Number of spectrum bins, and the length of the engine's byte snapshot.
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub(crate) fn push(&mut self, sample: f64) {
        self.window[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.fft_size;
    }

    /// The last `n` samples (at most `fft_size`), oldest first.
    fn recent(&self, n: usize) -> impl Iterator<Item = f64> + '_ {
        let n = n.min(self.fft_size);
        let start = (self.write_pos + self.fft_size - n) % self.fft_size;
        (0..n).map(move |i| self.window[(start + i) % self.fft_size])
    }

    /// Most recent samples as floats, oldest first.
    pub fn float_time_domain_data(&self, out: &mut [f32]) {
        let n = out.len();
        for (slot, s) in out.iter_mut().zip(self.recent(n)) {
            *slot = s as f32;
        }
    }

    /// Most recent samples as bytes: 128 is silence, 0 and 255 are -1 and +1.
    pub fn byte_time_domain_data(&self, out: &mut [u8]) {
        let n = out.len();
        for (slot, s) in out.iter_mut().zip(self.recent(n)) {
            *slot = (128.0 * (1.0 + s)).clamp(0.0, 255.0) as u8;
        }
    }

    /// Smoothed magnitude spectrum in dB, one value per bin.
    pub fn float_frequency_data(&self, out: &mut [f32]) {
        let magnitudes = self.smoothed_spectrum();
        for (slot, m) in out.iter_mut().zip(magnitudes.iter()) {
            *slot = to_decibels(*m) as f32;
        }
    }

    /// Smoothed spectrum mapped from [`MIN_DECIBELS`, `MAX_DECIBELS`] onto bytes.
    pub fn byte_frequency_data(&self, out: &mut [u8]) {
        let magnitudes = self.smoothed_spectrum();
        let range = MAX_DECIBELS - MIN_DECIBELS;
        for (slot, m) in out.iter_mut().zip(magnitudes.iter()) {
            let scaled = 255.0 * (to_decibels(*m) - MIN_DECIBELS) / range;
            *slot = scaled.clamp(0.0, 255.0) as u8;
        }
    }

    fn smoothed_spectrum(&self) -> Vec<f64> {
        let n = self.fft_size;
        let mut buffer: Vec<Complex<f64>> = self
            .recent(n)
            .enumerate()
            .map(|(i, s)| Complex::new(s * blackman(i, n), 0.0))
            .collect();
        self.fft.process(&mut buffer);

        let mut smoothed = self.smoothed.borrow_mut();
        for (bin, value) in smoothed.iter_mut().enumerate() {
            let magnitude = buffer[bin].norm() / n as f64;
            *value = self.smoothing * *value + (1.0 - self.smoothing) * magnitude;
        }
        smoothed.clone()
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

fn blackman(i: usize, n: usize) -> f64 {
    let x = i as f64 / n as f64;
    0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
}

fn to_decibels(magnitude: f64) -> f64 {
    if magnitude <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * magnitude.log10()
    }
}
