//! Anti-aliased oscillators using PolyBLEP, plus a harmonic-table "custom"
//! wave.

use std::f64::consts::PI;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::NodeError;

use super::node::Port;

/// Supported waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
    /// Plays the engine's current [`PeriodicWave`].
    Custom,
}

impl Waveform {
    pub fn from_name(s: &str) -> Option<Waveform> {
        match s {
            "sine" => Some(Waveform::Sine),
            "square" => Some(Waveform::Square),
            "sawtooth" | "saw" => Some(Waveform::Sawtooth),
            "triangle" => Some(Waveform::Triangle),
            "custom" => Some(Waveform::Custom),
            _ => None,
        }
    }
}

/// A waveform described by the amplitudes of its sine partials
/// (`harmonics[0]` is the fundamental).
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodicWave {
    harmonics: Vec<f64>,
}

impl PeriodicWave {
    /// Build from partial amplitudes. Amplitudes are normalized so the wave
    /// never exceeds unity; an empty or all-zero table becomes a pure sine.
    pub fn from_harmonics(harmonics: &[f64]) -> Self {
        let total: f64 = harmonics.iter().map(|a| a.abs()).sum();
        if !total.is_finite() || total <= 0.0 {
            return PeriodicWave { harmonics: vec![1.0] };
        }
        PeriodicWave {
            harmonics: harmonics.iter().map(|a| a / total).collect(),
        }
    }

    pub fn harmonics(&self) -> &[f64] {
        &self.harmonics
    }
}

impl Default for PeriodicWave {
    /// A soft organ-like tone.
    fn default() -> Self {
        PeriodicWave::from_harmonics(&[1.0, 0.5, 0.33, 0.25])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Playback {
    Idle,
    Playing,
    Stopped,
}

/// A band-limited oscillator node with anti-aliasing (PolyBLEP).
#[derive(Debug, Clone)]
pub struct Oscillator {
    pub waveform: Waveform,
    pub frequency: f64,
    pub detune: f64, // in cents
    phase: f64,
    sample_rate: f64,
    wave: Option<Arc<PeriodicWave>>,
    playback: Playback,
    output: Port,
}

impl Oscillator {
    pub fn new(waveform: Waveform, sample_rate: f64) -> Self {
        Oscillator {
            waveform,
            frequency: 440.0,
            detune: 0.0,
            phase: 0.0,
            sample_rate,
            wave: None,
            playback: Playback::Idle,
            output: Port::default(),
        }
    }

    /// Table used when `waveform` is [`Waveform::Custom`].
    pub fn with_periodic_wave(mut self, wave: Arc<PeriodicWave>) -> Self {
        self.wave = Some(wave);
        self
    }

    /// Effective frequency accounting for detune (in cents).
    fn effective_freq(&self) -> f64 {
        self.frequency * (2.0_f64).powf(self.detune / 1200.0)
    }

    /// Phase increment per sample.
    fn phase_inc(&self) -> f64 {
        self.effective_freq() / self.sample_rate
    }

    pub fn start(&mut self) {
        if self.playback == Playback::Idle {
            self.playback = Playback::Playing;
        }
    }

    pub fn stop(&mut self) -> Result<(), NodeError> {
        match self.playback {
            Playback::Idle => Err(NodeError::NotStarted),
            Playback::Stopped => Err(NodeError::AlreadyStopped),
            Playback::Playing => {
                self.playback = Playback::Stopped;
                Ok(())
            }
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

    /// Generate the next sample. Silent unless started and not yet stopped.
    pub fn next_sample(&mut self) -> f64 {
        if self.playback != Playback::Playing {
            return 0.0;
        }

        let inc = self.phase_inc();
        let sample = match self.waveform {
            Waveform::Sine => self.sine(),
            Waveform::Sawtooth => self.sawtooth(inc),
            Waveform::Square => self.square(inc),
            Waveform::Triangle => self.triangle(),
            Waveform::Custom => self.custom(inc),
        };

        self.phase += inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        sample
    }

    fn sine(&self) -> f64 {
        (2.0 * PI * self.phase).sin()
    }

    /// Naive sawtooth: rises from -1 to +1, then drops.
    /// PolyBLEP corrects the discontinuity at the wrap.
    fn sawtooth(&self, inc: f64) -> f64 {
        let naive = 2.0 * self.phase - 1.0;
        naive - poly_blep(self.phase, inc)
    }

    fn square(&self, inc: f64) -> f64 {
        let mut value = if self.phase < 0.5 { 1.0 } else { -1.0 };
        value += poly_blep(self.phase, inc);
        value -= poly_blep((self.phase + 0.5) % 1.0, inc);
        value
    }

    /// Piecewise linear, -1→+1 in [0, 0.5], +1→-1 in [0.5, 1].
    fn triangle(&self) -> f64 {
        if self.phase < 0.5 {
            4.0 * self.phase - 1.0
        } else {
            3.0 - 4.0 * self.phase
        }
    }

    /// Additive synthesis over the harmonic table; partials at or above
    /// Nyquist are skipped.
    fn custom(&self, inc: f64) -> f64 {
        let Some(wave) = &self.wave else {
            return self.sine();
        };
        let mut sum = 0.0;
        for (k, amp) in wave.harmonics().iter().enumerate() {
            let n = (k + 1) as f64;
            if n * inc >= 0.5 {
                break;
            }
            sum += amp * (2.0 * PI * n * self.phase).sin();
        }
        sum
    }
}

/// PolyBLEP (Polynomial Band-Limited Step) anti-aliasing correction.
///
/// `t` is the phase [0, 1), `dt` is the phase increment per sample.
fn poly_blep(t: f64, dt: f64) -> f64 {
    if t < dt {
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}
