//! Control surface — persisted user settings, preset selection, echo
//! toggling and key presses, translated into sound engine calls.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::dsp::delay::EchoParameters;
use crate::dsp::device::AudioBackend;
use crate::dsp::engine::SoundEngine;
use crate::dsp::envelope::Envelope;
use crate::dsp::filter::FilterParameters;
use crate::error::EngineError;
use crate::keyboard::{lookup_key, note_to_frequency};
use crate::preset::{InstrumentPreset, default_preset, find_preset};

/// Lowest and highest selectable keyboard octave.
pub const MIN_OCTAVE: i32 = 0;
pub const MAX_OCTAVE: i32 = 8;

/// Echo on, or muted with the mix to restore when it comes back on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum EchoState {
    Enabled(EchoParameters),
    #[serde(rename_all = "camelCase")]
    Disabled {
        /// Parameters as applied to the engine; `mix` is always 0.
        params: EchoParameters,
        previous_mix: f64,
    },
}

impl Default for EchoState {
    fn default() -> Self {
        EchoState::disabled(EchoParameters {
            mix: 0.2,
            time: 0.3,
            feedback: 0.4,
        })
    }
}

impl EchoState {
    /// Muted state remembering `settings.mix`.
    pub fn disabled(settings: EchoParameters) -> Self {
        EchoState::Disabled {
            params: EchoParameters { mix: 0.0, ..settings },
            previous_mix: settings.mix,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, EchoState::Enabled(_))
    }

    /// What the engine should be running.
    pub fn effective(&self) -> EchoParameters {
        match *self {
            EchoState::Enabled(params) | EchoState::Disabled { params, .. } => params,
        }
    }

    /// The user's settings, with the remembered mix when muted.
    pub fn settings(&self) -> EchoParameters {
        match *self {
            EchoState::Enabled(params) => params,
            EchoState::Disabled { params, previous_mix } => EchoParameters {
                mix: previous_mix,
                ..params
            },
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            EchoState::Enabled(params) => EchoState::disabled(params),
            EchoState::Disabled { .. } => EchoState::Enabled(self.settings()),
        }
    }

    /// Same on/off state with new settings.
    pub fn with_settings(self, settings: EchoParameters) -> Self {
        match self {
            EchoState::Enabled(_) => EchoState::Enabled(settings),
            EchoState::Disabled { .. } => EchoState::disabled(settings),
        }
    }
}

/// Settings persisted between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SynthSettings {
    /// Name of the selected preset.
    pub preset: String,
    pub octave: i32,
    pub envelope: Envelope,
    pub filter: FilterParameters,
    pub master_volume: f64,
    pub echo: EchoState,
    pub show_visualizer: bool,
}

impl Default for SynthSettings {
    fn default() -> Self {
        let preset = default_preset();
        SynthSettings {
            preset: preset.name,
            octave: 4,
            envelope: preset.envelope,
            filter: preset.filter,
            master_volume: 0.5,
            echo: EchoState::default(),
            show_visualizer: false,
        }
    }
}

impl SynthSettings {
    /// Missing fields fall back to their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Whether the control surface can make sound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum AudioStatus {
    /// Not initialized yet; the first note initializes lazily.
    Pending,
    Ready,
    /// The engine failed for good; a new control surface is needed.
    Unavailable(String),
}

/// Owns a sound engine and the settings that drive it.
pub struct SynthControls {
    engine: SoundEngine,
    settings: SynthSettings,
    status: AudioStatus,
    /// Notes started by keys that are still held, by key.
    held: HashMap<char, String>,
}

impl SynthControls {
    pub fn new(backend: impl AudioBackend + 'static, settings: SynthSettings) -> Self {
        let mut controls = SynthControls {
            engine: SoundEngine::new(backend),
            settings,
            status: AudioStatus::Pending,
            held: HashMap::new(),
        };
        controls.settings.octave = controls.settings.octave.clamp(MIN_OCTAVE, MAX_OCTAVE);
        controls.push_settings();
        controls
    }

    /// Bring the engine up, reporting whether audio is available.
    pub fn initialize(&mut self) -> AudioStatus {
        self.status = match self.engine.initialize() {
            Ok(()) => AudioStatus::Ready,
            Err(e) => AudioStatus::Unavailable(e.to_string()),
        };
        self.status.clone()
    }

    pub fn status(&self) -> &AudioStatus {
        &self.status
    }

    pub fn settings(&self) -> &SynthSettings {
        &self.settings
    }

    pub fn engine(&self) -> &SoundEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SoundEngine {
        &mut self.engine
    }

    pub fn current_preset(&self) -> InstrumentPreset {
        find_preset(&self.settings.preset).unwrap_or_else(default_preset)
    }

    /// Play the note mapped to `key` in the current octave. Returns the note
    /// id, or `None` for unmapped keys, key repeat, or a failed note.
    pub fn key_down(&mut self, key: char) -> Option<String> {
        let key = key.to_ascii_lowercase();
        if self.held.contains_key(&key) {
            return None;
        }
        let mapping = lookup_key(self.settings.octave, key)?;
        self.start_note(mapping.frequency, &mapping.note)?;
        self.held.insert(key, mapping.note.clone());
        Some(mapping.note)
    }

    /// Release whatever `key` started, even if the octave changed since.
    pub fn key_up(&mut self, key: char) -> Option<String> {
        let note = self.held.remove(&key.to_ascii_lowercase())?;
        self.engine.note_off(&note);
        Some(note)
    }

    /// Play a note by name, as mouse and touch input do.
    pub fn press_note(&mut self, note: &str) -> bool {
        match note_to_frequency(note) {
            Some(frequency) => self.start_note(frequency, note).is_some(),
            None => {
                log::warn!("unknown note {note:?}");
                false
            }
        }
    }

    pub fn release_note(&mut self, note: &str) {
        self.engine.note_off(note);
    }

    /// Copy a preset's envelope and filter into the working settings.
    /// Sounding voices keep the envelope they started with.
    pub fn select_preset(&mut self, name: &str) -> bool {
        let Some(preset) = find_preset(name) else {
            log::warn!("unknown preset {name:?}");
            return false;
        };
        log::debug!("preset {}", preset.name);
        self.settings.preset = preset.name;
        self.set_envelope(preset.envelope);
        self.set_filter(preset.filter);
        true
    }

    pub fn set_octave(&mut self, octave: i32) {
        self.settings.octave = octave.clamp(MIN_OCTAVE, MAX_OCTAVE);
    }

    pub fn set_envelope(&mut self, envelope: Envelope) {
        if let Err(e) = self.engine.set_adsr(envelope) {
            self.absorb(e);
        }
        self.settings.envelope = self.engine.envelope();
    }

    pub fn set_filter(&mut self, filter: FilterParameters) {
        if let Err(e) = self.engine.set_filter(filter) {
            self.absorb(e);
        }
        self.settings.filter = self.engine.filter();
    }

    pub fn set_volume(&mut self, volume: f64) {
        if let Err(e) = self.engine.set_volume(volume) {
            self.absorb(e);
        }
        self.settings.master_volume = self.engine.volume();
    }

    /// Update the echo settings, keeping the on/off state.
    pub fn set_echo(&mut self, settings: EchoParameters) {
        let next = self.settings.echo.with_settings(settings);
        self.apply_echo(next);
    }

    /// Switch echo on or off, restoring the previous mix when it comes back.
    /// Returns whether echo is now enabled.
    pub fn toggle_echo(&mut self) -> bool {
        let next = self.settings.echo.toggled();
        self.apply_echo(next);
        self.settings.echo.is_enabled()
    }

    pub fn set_show_visualizer(&mut self, show: bool) {
        self.settings.show_visualizer = show;
    }

    /// Pull the next block of audio from the engine.
    pub fn render(&mut self, out: &mut [f32]) {
        self.engine.render(out);
    }

    pub fn dispose(&mut self) {
        self.held.clear();
        self.engine.dispose();
    }

    fn start_note(&mut self, frequency: f64, note: &str) -> Option<()> {
        if matches!(self.status, AudioStatus::Unavailable(_)) {
            return None;
        }
        let waveform = self.current_preset().oscillator;
        match self.engine.note_on(frequency, note, waveform) {
            Ok(()) => {
                self.status = AudioStatus::Ready;
                Some(())
            }
            Err(e) => {
                self.absorb(e);
                None
            }
        }
    }

    fn apply_echo(&mut self, next: EchoState) {
        match self.engine.set_echo(next.effective()) {
            Ok(()) => {
                let applied = self.engine.echo();
                self.settings.echo = match next {
                    EchoState::Enabled(_) => EchoState::Enabled(applied),
                    EchoState::Disabled { previous_mix, .. } => EchoState::Disabled {
                        params: applied,
                        previous_mix: previous_mix.clamp(0.0, 1.0),
                    },
                };
            }
            Err(e) => self.absorb(e),
        }
    }

    /// Push every stored setting into a fresh engine, keeping whatever the
    /// engine ends up with.
    fn push_settings(&mut self) {
        let s = self.settings.clone();
        self.set_envelope(s.envelope);
        self.set_filter(s.filter);
        self.set_volume(s.master_volume);
        self.apply_echo(s.echo);
    }

    fn absorb(&mut self, e: EngineError) {
        if e.is_fatal() {
            log::error!("audio unavailable: {e}");
            self.status = AudioStatus::Unavailable(e.to_string());
        } else {
            log::warn!("{e}");
        }
    }
}
