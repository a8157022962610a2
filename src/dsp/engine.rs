//! Sound Engine — owns the output device, the shared signal graph and the
//! voice table, and turns note and parameter calls into rendered audio.
//!
//! The engine is pull-based: whoever drives the output calls
//! [`SoundEngine::render`], and the audio clock advances by the frames
//! rendered. Envelopes, parameter glides and release cleanups are all
//! scheduled against that clock.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::config::{EngineConfig, RENDER_QUANTUM};
use crate::error::EngineError;

use super::analyser::Analyser;
use super::delay::EchoParameters;
use super::device::{AudioBackend, AudioOutput, DeviceState};
use super::envelope::{Envelope, VoiceStage};
use super::filter::FilterParameters;
use super::graph::{SHARED_NODES, SignalGraph};
use super::mixer::Mixer;
use super::oscillator::{PeriodicWave, Waveform};
use super::scheduler::Scheduler;
use super::voice::{NoteParams, Voice};

/// Running tally of audio nodes, for leak checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeStats {
    pub created: usize,
    pub disposed: usize,
}

impl NodeStats {
    /// Nodes created and not yet torn down.
    pub fn live(&self) -> usize {
        self.created - self.disposed
    }
}

enum EngineState {
    Uninitialized,
    Running {
        output: Box<dyn AudioOutput>,
        graph: SignalGraph,
    },
    /// Device acquisition failed; the instance stays unusable.
    Failed(EngineError),
    Disposed,
}

/// The synthesizer's sound engine.
pub struct SoundEngine {
    backend: Box<dyn AudioBackend>,
    config: EngineConfig,
    state: EngineState,
    voices: HashMap<String, Voice>,
    /// Pending release cleanups, keyed by note id.
    timers: Scheduler<String>,
    envelope: Envelope,
    filter: FilterParameters,
    echo: EchoParameters,
    volume: f64,
    periodic_wave: Arc<PeriodicWave>,
    mixer: Mixer,
    frames_rendered: u64,
    stats: NodeStats,
}

impl SoundEngine {
    pub fn new(backend: impl AudioBackend + 'static) -> Self {
        SoundEngine::build(Box::new(backend), EngineConfig::default())
    }

    /// Engine with custom tunables. Non-finite values are rejected.
    pub fn with_config(backend: impl AudioBackend + 'static, config: EngineConfig) -> Result<Self, EngineError> {
        let config = config.sanitized().inspect_err(|e| log::warn!("{e}"))?;
        Ok(SoundEngine::build(Box::new(backend), config))
    }

    fn build(backend: Box<dyn AudioBackend>, config: EngineConfig) -> Self {
        SoundEngine {
            backend,
            config,
            state: EngineState::Uninitialized,
            voices: HashMap::new(),
            timers: Scheduler::new(),
            envelope: Envelope::default(),
            filter: FilterParameters::default(),
            echo: EchoParameters::default(),
            volume: 1.0,
            periodic_wave: Arc::new(PeriodicWave::default()),
            mixer: Mixer::new(),
            frames_rendered: 0,
            stats: NodeStats::default(),
        }
    }

    /// Acquire the output and build the signal graph. Idempotent.
    pub fn initialize(&mut self) -> Result<(), EngineError> {
        match &self.state {
            EngineState::Running { .. } => return Ok(()),
            EngineState::Failed(e) => return Err(e.clone()),
            EngineState::Disposed => return Err(EngineError::Disposed),
            EngineState::Uninitialized => {}
        }

        let output = match self.backend.open() {
            Ok(output) => output,
            Err(e) => {
                log::error!("sound engine initialization failed: {e}");
                self.state = EngineState::Failed(e.clone());
                return Err(e);
            }
        };
        let sample_rate = output.sample_rate();
        self.filter = self.filter.sanitized(sample_rate)?;

        let mut graph = SignalGraph::new(sample_rate, &self.config);
        graph.apply(self.volume, &self.filter, &self.echo);
        self.stats.created += SHARED_NODES;
        self.frames_rendered = 0;
        self.state = EngineState::Running { output, graph };
        log::info!("sound engine initialized at {sample_rate} Hz");
        Ok(())
    }

    /// Retire every voice, cancel every timer, tear down the graph and close
    /// the output. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if matches!(self.state, EngineState::Disposed) {
            return;
        }
        let retired = self.voices.len();
        for (note_id, voice) in std::mem::take(&mut self.voices) {
            self.stats.disposed += voice.retire(&note_id);
        }
        self.timers.cancel_all();

        if let EngineState::Running { mut output, mut graph } =
            std::mem::replace(&mut self.state, EngineState::Disposed)
        {
            self.stats.disposed += graph.disconnect_all();
            output.close();
        }
        self.state = EngineState::Disposed;
        log::info!("sound engine disposed ({retired} voices retired)");
    }

    /// Start a note. An already sounding `note_id` is cut off and replaced,
    /// restarting the envelope from zero.
    pub fn note_on(&mut self, frequency: f64, note_id: &str, waveform: Waveform) -> Result<(), EngineError> {
        if !frequency.is_finite() || frequency <= 0.0 {
            log::warn!("note {note_id}: rejecting frequency {frequency}");
            return Err(EngineError::InvalidFrequency(frequency));
        }
        self.initialize()?;
        self.resume()?;

        let Some(sample_rate) = self.sample_rate() else {
            return Err(EngineError::Disposed);
        };
        let now = self.current_time();

        if let Some(previous) = self.voices.remove(note_id) {
            log::debug!("note {note_id}: retriggered");
            self.retire_voice(note_id, previous);
        }

        let params = NoteParams {
            frequency,
            waveform,
            unison_width: self.config.unison_width_cents,
            envelope: self.envelope,
            periodic_wave: Arc::clone(&self.periodic_wave),
        };
        let voice = Voice::trigger(&params, sample_rate, now);
        self.stats.created += voice.node_count();
        self.voices.insert(note_id.to_string(), voice);
        log::debug!("note {note_id}: on at {now:.4}s, {frequency:.2} Hz {waveform:?}");
        Ok(())
    }

    /// Release a note. Unknown ids are ignored; a second release restarts
    /// the fade with the current release time.
    pub fn note_off(&mut self, note_id: &str) {
        let now = self.current_time();
        let Some(voice) = self.voices.get_mut(note_id) else {
            return;
        };
        voice.release(&self.envelope, now);
        let timer = self.timers.schedule(now + self.envelope.release, note_id.to_string());
        if let Some(previous) = voice.replace_pending_release(timer) {
            self.timers.cancel(previous);
        }
        log::debug!("note {note_id}: off at {now:.4}s, release {:.3}s", self.envelope.release);
    }

    /// Store a new envelope for notes started (and released) from now on.
    pub fn set_adsr(&mut self, envelope: Envelope) -> Result<(), EngineError> {
        self.ensure_usable()?;
        self.envelope = envelope.sanitized().inspect_err(|e| log::warn!("{e}"))?;
        Ok(())
    }

    pub fn set_volume(&mut self, volume: f64) -> Result<(), EngineError> {
        self.ensure_usable()?;
        if !volume.is_finite() {
            let e = EngineError::InvalidParameter {
                name: "volume",
                value: volume,
            };
            log::warn!("{e}");
            return Err(e);
        }
        self.volume = volume.clamp(0.0, 1.0);
        let now = self.current_time();
        if let EngineState::Running { graph, .. } = &mut self.state {
            graph.set_volume(self.volume, now);
        }
        Ok(())
    }

    pub fn set_filter(&mut self, filter: FilterParameters) -> Result<(), EngineError> {
        self.ensure_usable()?;
        let sample_rate = self.sample_rate().unwrap_or(f64::INFINITY);
        self.filter = filter.sanitized(sample_rate).inspect_err(|e| log::warn!("{e}"))?;
        let now = self.current_time();
        if let EngineState::Running { graph, .. } = &mut self.state {
            graph.set_filter(&self.filter, now);
        }
        Ok(())
    }

    pub fn set_echo(&mut self, echo: EchoParameters) -> Result<(), EngineError> {
        self.ensure_usable()?;
        self.echo = echo
            .sanitized(self.config.max_delay_seconds)
            .inspect_err(|e| log::warn!("{e}"))?;
        let now = self.current_time();
        if let EngineState::Running { graph, .. } = &mut self.state {
            graph.set_echo(&self.echo, now);
        }
        Ok(())
    }

    /// Harmonic content used by [`Waveform::Custom`] voices started from now on.
    pub fn set_periodic_wave(&mut self, wave: PeriodicWave) {
        self.periodic_wave = Arc::new(wave);
    }

    /// Read-only analysis tap, once the graph exists.
    pub fn analyser(&self) -> Option<&Analyser> {
        self.graph().map(SignalGraph::analyser)
    }

    /// Byte waveform snapshot of `frequency_bin_count` samples; 128 is silence.
    pub fn audio_data(&self) -> Option<Vec<u8>> {
        let analyser = self.analyser()?;
        let mut data = vec![128u8; analyser.frequency_bin_count()];
        analyser.byte_time_domain_data(&mut data);
        Some(data)
    }

    /// Fill `out` with the next mono samples. Silence, with the clock held,
    /// unless the output is running.
    pub fn render(&mut self, out: &mut [f32]) {
        let Some(sample_rate) = self.sample_rate() else {
            out.fill(0.0);
            return;
        };
        if self.device_state() != Some(DeviceState::Running) {
            out.fill(0.0);
            return;
        }

        // Blocks are cut short at the next due timer so cleanups land on
        // the sample they were scheduled for.
        let mut offset = 0;
        while offset < out.len() {
            let now = self.current_time();
            self.run_due_timers(now, sample_rate);

            let mut len = (out.len() - offset).min(RENDER_QUANTUM);
            if let Some(due) = self.timers.next_due() {
                let until_due = ((due - now) * sample_rate - 0.5).ceil();
                if until_due >= 1.0 && until_due < len as f64 {
                    len = until_due as usize;
                }
            }
            let block = &mut out[offset..offset + len];

            self.mixer.clear(len);
            for voice in self.voices.values_mut() {
                self.mixer.add_voice(voice, now, sample_rate);
            }
            if let EngineState::Running { graph, .. } = &mut self.state {
                graph.process(self.mixer.samples(), now, block);
            }
            self.frames_rendered += len as u64;
            offset += len;
        }
        self.run_due_timers(self.current_time(), sample_rate);
    }

    /// Audio clock in seconds.
    pub fn current_time(&self) -> f64 {
        match self.sample_rate() {
            Some(sr) => self.frames_rendered as f64 / sr,
            None => 0.0,
        }
    }

    pub fn sample_rate(&self) -> Option<f64> {
        match &self.state {
            EngineState::Running { output, .. } => Some(output.sample_rate()),
            _ => None,
        }
    }

    pub fn device_state(&self) -> Option<DeviceState> {
        match &self.state {
            EngineState::Running { output, .. } => Some(output.state()),
            _ => None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, EngineState::Running { .. })
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self.state, EngineState::Disposed)
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn contains_voice(&self, note_id: &str) -> bool {
        self.voices.contains_key(note_id)
    }

    pub fn voice_stage(&self, note_id: &str) -> Option<VoiceStage> {
        let now = self.current_time();
        self.voices.get(note_id).map(|v| v.stage(now))
    }

    /// Envelope a sounding voice was triggered with.
    pub fn voice_envelope(&self, note_id: &str) -> Option<Envelope> {
        self.voices.get(note_id).map(|v| *v.envelope())
    }

    /// Ids of every sounding voice, sorted.
    pub fn active_notes(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.voices.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn node_stats(&self) -> NodeStats {
        self.stats
    }

    pub fn envelope(&self) -> Envelope {
        self.envelope
    }

    pub fn filter(&self) -> FilterParameters {
        self.filter
    }

    pub fn echo(&self) -> EchoParameters {
        self.echo
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn graph(&self) -> Option<&SignalGraph> {
        match &self.state {
            EngineState::Running { graph, .. } => Some(graph),
            _ => None,
        }
    }

    fn ensure_usable(&self) -> Result<(), EngineError> {
        match &self.state {
            EngineState::Disposed => Err(EngineError::Disposed),
            _ => Ok(()),
        }
    }

    fn resume(&mut self) -> Result<(), EngineError> {
        if let EngineState::Running { output, .. } = &mut self.state {
            if output.state() != DeviceState::Running {
                output.resume().inspect_err(|e| log::warn!("{e}"))?;
                log::debug!("audio output resumed");
            }
        }
        Ok(())
    }

    /// Fire every timer due within half a sample of `now`.
    fn run_due_timers(&mut self, now: f64, sample_rate: f64) {
        for (timer, note_id) in self.timers.take_due(now + 0.5 / sample_rate) {
            let owned = self
                .voices
                .get(&note_id)
                .is_some_and(|v| v.pending_release() == Some(timer));
            if !owned {
                continue;
            }
            if let Some(voice) = self.voices.remove(&note_id) {
                self.stats.disposed += voice.retire(&note_id);
                log::debug!("note {note_id}: released and retired at {now:.4}s");
            }
        }
    }

    fn retire_voice(&mut self, note_id: &str, mut voice: Voice) {
        if let Some(timer) = voice.take_pending_release() {
            self.timers.cancel(timer);
        }
        self.stats.disposed += voice.retire(note_id);
    }
}

impl Drop for SoundEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::device::OfflineBackend;
    use crate::dsp::device::testing::{BlockedBackend, StuckBackend};
    use crate::dsp::filter::FilterType;

    const SR: f64 = 44100.0;

    fn engine() -> SoundEngine {
        let mut e = SoundEngine::new(OfflineBackend::new(SR));
        e.initialize().unwrap();
        e
    }

    /// Advance the audio clock by `seconds`, returning what was rendered.
    fn run(e: &mut SoundEngine, seconds: f64) -> Vec<f32> {
        let mut out = vec![0.0f32; (seconds * SR).ceil() as usize];
        e.render(&mut out);
        out
    }

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    fn quick_envelope() -> Envelope {
        Envelope {
            attack: 0.01,
            decay: 0.01,
            sustain: 0.5,
            release: 0.1,
        }
    }

    #[test]
    fn note_off_then_release_retires_voice() {
        let mut e = engine();
        e.set_adsr(quick_envelope()).unwrap();
        e.note_on(440.0, "A4", Waveform::Sine).unwrap();
        run(&mut e, 0.05);
        e.note_off("A4");
        assert_eq!(e.voice_stage("A4"), Some(VoiceStage::Releasing));

        run(&mut e, 0.1);
        assert!(!e.contains_voice("A4"));
        assert_eq!(e.voice_count(), 0);
        assert_eq!(e.pending_timers(), 0);
        let stats = e.node_stats();
        assert_eq!(stats.created, SHARED_NODES + 4);
        assert_eq!(stats.live(), SHARED_NODES, "only the shared graph remains");
    }

    #[test]
    fn voice_is_gone_exactly_when_release_elapses() {
        let mut e = engine();
        e.set_adsr(quick_envelope()).unwrap();
        e.note_on(440.0, "A4", Waveform::Sine).unwrap();
        let mut block = [0.0f32; RENDER_QUANTUM];
        e.render(&mut block);
        e.note_off("A4");

        let release_frames = (0.1 * SR).round() as usize;
        let mut almost = vec![0.0f32; release_frames - 2];
        e.render(&mut almost);
        assert!(e.contains_voice("A4"), "two samples short of the release");

        let mut rest = [0.0f32; 2];
        e.render(&mut rest);
        assert!(!e.contains_voice("A4"));
        assert_eq!(e.pending_timers(), 0);
        assert_eq!(e.node_stats().live(), SHARED_NODES);
    }

    #[test]
    fn cleanup_inside_a_long_render_keeps_the_clock() {
        let mut e = engine();
        e.set_adsr(Envelope {
            release: 0.0123,
            ..quick_envelope()
        })
        .unwrap();
        e.note_on(440.0, "A4", Waveform::Sine).unwrap();
        e.note_off("A4");

        let mut out = vec![0.0f32; 1000];
        e.render(&mut out);
        assert!(!e.contains_voice("A4"));
        assert!((e.current_time() - 1000.0 / SR).abs() < 1e-12);
        assert!(out.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn voice_survives_until_release_elapses() {
        let mut e = engine();
        e.set_adsr(quick_envelope()).unwrap();
        e.note_on(440.0, "A4", Waveform::Sine).unwrap();
        e.note_off("A4");
        run(&mut e, 0.05);
        assert!(e.contains_voice("A4"));
    }

    #[test]
    fn double_note_on_keeps_one_voice() {
        let mut e = engine();
        e.note_on(440.0, "A4", Waveform::Sine).unwrap();
        e.note_on(440.0, "A4", Waveform::Sine).unwrap();
        assert_eq!(e.active_notes(), vec!["A4".to_string()]);

        let stats = e.node_stats();
        assert_eq!(stats.created, SHARED_NODES + 8);
        assert_eq!(stats.disposed, 4, "previous ensemble torn down");
        assert_eq!(stats.live(), SHARED_NODES + 4);
    }

    #[test]
    fn retrigger_cancels_pending_release() {
        let mut e = engine();
        e.set_adsr(quick_envelope()).unwrap();
        e.note_on(440.0, "A4", Waveform::Sine).unwrap();
        e.note_off("A4");
        assert_eq!(e.pending_timers(), 1);

        e.note_on(440.0, "A4", Waveform::Sine).unwrap();
        assert_eq!(e.pending_timers(), 0);
        assert_eq!(e.voice_stage("A4"), Some(VoiceStage::Attacking));
        run(&mut e, 0.5);
        assert!(e.contains_voice("A4"), "new voice must not be cleaned up by the old timer");
    }

    #[test]
    fn repeated_note_off_restarts_release() {
        let mut e = engine();
        e.set_adsr(quick_envelope()).unwrap();
        e.note_on(440.0, "A4", Waveform::Sine).unwrap();
        e.note_off("A4");
        run(&mut e, 0.05);
        e.note_off("A4");
        assert_eq!(e.pending_timers(), 1);
        run(&mut e, 0.07);
        assert!(e.contains_voice("A4"), "release restarted at the second note-off");
        run(&mut e, 0.05);
        assert!(!e.contains_voice("A4"));
    }

    #[test]
    fn unknown_note_off_is_noop() {
        let mut e = engine();
        e.note_on(440.0, "A4", Waveform::Sine).unwrap();
        let before = e.node_stats();
        e.note_off("C9");
        assert_eq!(e.voice_count(), 1);
        assert_eq!(e.pending_timers(), 0);
        assert_eq!(e.node_stats(), before);

        let mut fresh = SoundEngine::new(OfflineBackend::new(SR));
        fresh.note_off("A4");
        assert!(!fresh.is_initialized());
    }

    #[test]
    fn zero_volume_silences_without_touching_other_state() {
        let mut e = engine();
        let envelope = quick_envelope();
        let filter = FilterParameters {
            filter_type: FilterType::Highpass,
            frequency: 200.0,
            q: 2.0,
        };
        let echo = EchoParameters {
            mix: 0.0,
            time: 0.2,
            feedback: 0.5,
        };
        e.set_adsr(envelope).unwrap();
        e.set_filter(filter).unwrap();
        e.set_echo(echo).unwrap();
        e.note_on(440.0, "A4", Waveform::Sawtooth).unwrap();
        assert!(peak(&run(&mut e, 0.1)) > 0.01);

        e.set_volume(0.0).unwrap();
        run(&mut e, 0.2);
        e.note_on(660.0, "E5", Waveform::Square).unwrap();
        assert!(peak(&run(&mut e, 0.1)) < 1e-6);

        assert_eq!(e.volume(), 0.0);
        assert_eq!(e.envelope(), envelope);
        assert_eq!(e.filter(), filter);
        assert_eq!(e.echo(), echo);
    }

    #[test]
    fn volume_set_before_initialize_applies() {
        let mut e = SoundEngine::new(OfflineBackend::new(SR));
        e.set_volume(0.0).unwrap();
        e.note_on(440.0, "A4", Waveform::Sine).unwrap();
        assert!(run(&mut e, 0.1).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn echo_dry_wet_always_sum_to_one() {
        let mut e = engine();
        run(&mut e, 0.01);
        for mix in [0.0, 0.25, 1.0, 0.6] {
            e.set_echo(EchoParameters {
                mix,
                ..EchoParameters::default()
            })
            .unwrap();
            let graph = e.graph().unwrap();
            let now = e.current_time();
            for i in 0..50 {
                let (dry, wet) = graph.echo_gains_at(now + i as f64 * 0.0005);
                assert!((dry + wet - 1.0).abs() < 1e-9, "mix {mix}: dry + wet = {}", dry + wet);
            }
            run(&mut e, 0.003);
        }
    }

    #[test]
    fn adsr_change_mid_sustain_only_affects_release() {
        let mut e = engine();
        e.set_adsr(quick_envelope()).unwrap();
        e.note_on(440.0, "A4", Waveform::Sine).unwrap();
        run(&mut e, 0.2);
        let level = |e: &SoundEngine| e.voices["A4"].envelope_level(e.current_time());
        assert!((level(&e) - 0.5).abs() < 1e-3);

        e.set_adsr(Envelope {
            attack: 1.0,
            decay: 1.0,
            sustain: 0.9,
            release: 1.0,
        })
        .unwrap();
        run(&mut e, 0.1);
        assert!((level(&e) - 0.5).abs() < 1e-3, "sustain unchanged, got {}", level(&e));

        e.note_off("A4");
        run(&mut e, 0.3);
        assert!(e.contains_voice("A4"), "release uses the new 1s duration");
        assert!(level(&e) > 0.1);
        run(&mut e, 0.8);
        assert!(!e.contains_voice("A4"));
    }

    #[test]
    fn a4_is_visible_in_audio_data_within_50ms() {
        let mut e = SoundEngine::new(OfflineBackend::new(SR));
        assert!(e.audio_data().is_none());
        e.note_on(440.0, "A4", Waveform::Sine).unwrap();
        assert_eq!(e.active_notes(), vec!["A4".to_string()]);
        run(&mut e, 0.05);

        let data = e.audio_data().unwrap();
        assert_eq!(data.len(), 1024);
        assert!(data.iter().any(|&b| b != 128), "waveform should leave the midpoint");
    }

    #[test]
    fn dispose_twice_is_fine() {
        let mut e = engine();
        e.note_on(440.0, "A4", Waveform::Sine).unwrap();
        e.dispose();
        e.dispose();
        assert!(e.is_disposed());
        assert!(e.analyser().is_none());
        assert!(e.audio_data().is_none());
        assert_eq!(e.note_on(440.0, "A4", Waveform::Sine), Err(EngineError::Disposed));
        assert_eq!(e.set_volume(0.5), Err(EngineError::Disposed));
        assert_eq!(e.initialize(), Err(EngineError::Disposed));
    }

    #[test]
    fn dispose_cancels_timers_and_frees_every_node() {
        let mut e = engine();
        e.note_on(440.0, "A4", Waveform::Sine).unwrap();
        e.note_on(523.25, "C5", Waveform::Triangle).unwrap();
        e.note_off("A4");
        assert_eq!(e.pending_timers(), 1);

        e.dispose();
        assert_eq!(e.pending_timers(), 0);
        assert_eq!(e.voice_count(), 0);
        assert_eq!(e.node_stats().live(), 0);

        let mut out = vec![1.0f32; 1024];
        e.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn negative_filter_frequency_clamps() {
        let mut e = engine();
        e.set_filter(FilterParameters {
            filter_type: FilterType::Lowpass,
            frequency: -100.0,
            q: 1.0,
        })
        .unwrap();
        let f = e.filter();
        assert_eq!(f.frequency, 10.0);
        assert_eq!(f.q, 1.0);
        assert_eq!(f.filter_type, FilterType::Lowpass);
    }

    #[test]
    fn non_finite_parameters_are_rejected() {
        let mut e = engine();
        assert!(matches!(
            e.set_volume(f64::NAN),
            Err(EngineError::InvalidParameter { name: "volume", .. })
        ));
        assert_eq!(e.volume(), 1.0);
        assert!(
            e.set_adsr(Envelope {
                release: f64::INFINITY,
                ..Envelope::default()
            })
            .is_err()
        );
        assert_eq!(e.envelope(), Envelope::default());
        e.set_volume(3.0).unwrap();
        assert_eq!(e.volume(), 1.0, "finite values clamp");
    }

    #[test]
    fn custom_config_is_sanitized() {
        let config = EngineConfig {
            unison_width_cents: f64::NAN,
            ..EngineConfig::default()
        };
        assert!(matches!(
            SoundEngine::with_config(OfflineBackend::new(SR), config),
            Err(EngineError::InvalidParameter { .. })
        ));

        let wide = EngineConfig {
            unison_width_cents: 5000.0,
            smoothing: -1.0,
            ..EngineConfig::default()
        };
        let mut e = SoundEngine::with_config(OfflineBackend::new(SR), wide).unwrap();
        assert_eq!(e.config().unison_width_cents, 1200.0);
        assert_eq!(e.config().smoothing, 0.0);
        e.note_on(440.0, "A4", Waveform::Sine).unwrap();
        assert_eq!(e.voices["A4"].detunes(), vec![0.0, -1200.0, 1200.0]);
    }

    #[test]
    fn invalid_frequency_schedules_nothing() {
        let mut e = SoundEngine::new(OfflineBackend::new(SR));
        assert_eq!(e.note_on(0.0, "X", Waveform::Sine), Err(EngineError::InvalidFrequency(0.0)));
        assert!(matches!(
            e.note_on(f64::NAN, "X", Waveform::Sine),
            Err(EngineError::InvalidFrequency(_))
        ));
        assert!(e.note_on(-440.0, "X", Waveform::Sine).is_err());
        assert_eq!(e.voice_count(), 0);
        assert_eq!(e.node_stats(), NodeStats::default());
    }

    #[test]
    fn blocked_device_fails_permanently() {
        let mut e = SoundEngine::new(BlockedBackend);
        let err = e.initialize().unwrap_err();
        assert!(matches!(err, EngineError::DeviceUnavailable(_)));
        assert!(err.is_fatal());
        assert_eq!(e.initialize(), Err(err.clone()));
        assert_eq!(e.note_on(440.0, "A4", Waveform::Sine), Err(err));
        assert!(e.analyser().is_none());
    }

    #[test]
    fn suspended_device_resumes_on_note_on() {
        let mut e = SoundEngine::new(OfflineBackend::new(SR).suspended());
        e.initialize().unwrap();
        assert_eq!(e.device_state(), Some(DeviceState::Suspended));
        assert!(run(&mut e, 0.01).iter().all(|&s| s == 0.0));
        assert_eq!(e.current_time(), 0.0, "clock frozen while suspended");

        e.note_on(440.0, "A4", Waveform::Sine).unwrap();
        assert_eq!(e.device_state(), Some(DeviceState::Running));
        assert!(peak(&run(&mut e, 0.1)) > 0.01);
        assert!(e.current_time() > 0.09);
    }

    #[test]
    fn stuck_device_reports_resume_failure() {
        let mut e = SoundEngine::new(StuckBackend);
        let err = e.note_on(440.0, "A4", Waveform::Sine).unwrap_err();
        assert!(matches!(err, EngineError::ResumeFailed(_)));
        assert!(!err.is_fatal());
        assert_eq!(e.voice_count(), 0);
    }

    #[test]
    fn render_before_initialize_is_silent() {
        let mut e = SoundEngine::new(OfflineBackend::new(SR));
        let mut out = vec![0.5f32; 256];
        e.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(e.current_time(), 0.0);
    }

    #[test]
    fn clock_counts_rendered_frames() {
        let mut e = engine();
        let mut out = vec![0.0f32; 300];
        e.render(&mut out);
        assert!((e.current_time() - 300.0 / SR).abs() < 1e-12);
    }

    #[test]
    fn custom_waveform_uses_periodic_wave() {
        let mut e = engine();
        e.set_periodic_wave(PeriodicWave::from_harmonics(&[0.0, 1.0]));
        e.note_on(220.0, "A3", Waveform::Custom).unwrap();
        assert!(peak(&run(&mut e, 0.3)) > 0.01);
    }

    #[test]
    fn polyphony_sums_voices() {
        let mut e = engine();
        for (id, f) in [("C4", 261.63), ("E4", 329.63), ("G4", 392.0)] {
            e.note_on(f, id, Waveform::Triangle).unwrap();
        }
        assert_eq!(e.voice_count(), 3);
        let out = run(&mut e, 0.5);
        assert!(out.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
    }
}
