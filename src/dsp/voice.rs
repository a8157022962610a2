//! Voice — one sounding note: a detuned unison ensemble shaped by an
//! envelope gain.

use std::sync::Arc;

use super::envelope::{Envelope, VoiceStage};
use super::node::GainNode;
use super::oscillator::{Oscillator, PeriodicWave, Waveform};
use super::scheduler::TimerId;

/// How a note should sound when triggered.
#[derive(Debug, Clone)]
pub struct NoteParams {
    pub frequency: f64,
    pub waveform: Waveform,
    /// Detune of the outer oscillators in cents.
    pub unison_width: f64,
    pub envelope: Envelope,
    pub periodic_wave: Arc<PeriodicWave>,
}

/// A single voice: three oscillators (center, -width, +width cents) into
/// one envelope gain.
#[derive(Debug)]
pub struct Voice {
    oscillators: Vec<Oscillator>,
    gain: GainNode,
    /// Envelope captured at trigger time.
    envelope: Envelope,
    triggered_at: f64,
    released_at: Option<f64>,
    pending_release: Option<TimerId>,
}

impl Voice {
    /// Build, wire and start a voice at audio-clock time `now`.
    pub fn trigger(params: &NoteParams, sample_rate: f64, now: f64) -> Self {
        let oscillators = [0.0, -params.unison_width, params.unison_width]
            .into_iter()
            .map(|detune| {
                let mut osc = Oscillator::new(params.waveform, sample_rate)
                    .with_periodic_wave(Arc::clone(&params.periodic_wave));
                osc.frequency = params.frequency;
                osc.detune = detune;
                osc.connect();
                osc
            })
            .collect::<Vec<_>>();

        let mut gain = GainNode::new(0.0);
        params.envelope.schedule_attack(&mut gain.gain, now);
        gain.connect();

        let mut voice = Voice {
            oscillators,
            gain,
            envelope: params.envelope,
            triggered_at: now,
            released_at: None,
            pending_release: None,
        };
        for osc in voice.oscillators.iter_mut() {
            osc.start();
        }
        voice
    }

    /// Start the release phase at `now` with the release time of `envelope`
    /// (the envelope current at note-off, not the one captured at trigger).
    pub fn release(&mut self, envelope: &Envelope, now: f64) {
        envelope.schedule_release(&mut self.gain.gain, now);
        self.released_at = Some(now);
    }

    pub fn pending_release(&self) -> Option<TimerId> {
        self.pending_release
    }

    /// Store the cleanup timer, returning the one it replaces.
    pub fn replace_pending_release(&mut self, id: TimerId) -> Option<TimerId> {
        self.pending_release.replace(id)
    }

    pub fn take_pending_release(&mut self) -> Option<TimerId> {
        self.pending_release.take()
    }

    pub fn stage(&self, now: f64) -> VoiceStage {
        VoiceStage::at(&self.envelope, self.triggered_at, self.released_at, now)
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn frequency(&self) -> f64 {
        self.oscillators.first().map_or(0.0, |o| o.frequency)
    }

    /// Detune of each ensemble member, in cents.
    pub fn detunes(&self) -> Vec<f64> {
        self.oscillators.iter().map(|o| o.detune).collect()
    }

    pub fn envelope_level(&self, t: f64) -> f64 {
        self.gain.gain.value_at(t)
    }

    /// Oscillators plus the envelope gain.
    pub fn node_count(&self) -> usize {
        self.oscillators.len() + 1
    }

    /// Whether every node is still wired into the graph.
    pub fn is_connected(&self) -> bool {
        self.gain.is_connected() && self.oscillators.iter().all(|o| o.is_connected())
    }

    /// Add this voice's output for a block starting at `start_time` into
    /// `out`. `gains` is scratch space at least as long as `out`.
    pub fn render_into(&mut self, start_time: f64, sample_rate: f64, out: &mut [f64], gains: &mut [f64]) {
        let gains = &mut gains[..out.len()];
        self.gain.gain.fill(start_time, sample_rate, gains);
        let norm = 1.0 / self.oscillators.len().max(1) as f64;
        for (slot, g) in out.iter_mut().zip(gains.iter()) {
            let mut sum = 0.0;
            for osc in self.oscillators.iter_mut() {
                sum += osc.next_sample();
            }
            *slot += sum * norm * g;
        }
    }

    /// Stop and disconnect every node, logging failures without giving up on
    /// the remaining nodes. Returns the number of nodes torn down.
    pub fn retire(mut self, note_id: &str) -> usize {
        for (index, osc) in self.oscillators.iter_mut().enumerate() {
            if let Err(e) = osc.stop() {
                log::warn!("voice {note_id}: stopping oscillator {index}: {e}");
            }
            if let Err(e) = osc.disconnect() {
                log::warn!("voice {note_id}: disconnecting oscillator {index}: {e}");
            }
        }
        if let Err(e) = self.gain.disconnect() {
            log::warn!("voice {note_id}: disconnecting envelope gain: {e}");
        }
        self.node_count()
    }
}
