pub mod config;
pub mod controls;
pub mod dsp;
pub mod error;
pub mod keyboard;
pub mod preset;

pub use crate::config::EngineConfig;
pub use crate::controls::{AudioStatus, EchoState, SynthControls, SynthSettings};
pub use crate::dsp::delay::EchoParameters;
pub use crate::dsp::device::{AudioBackend, AudioOutput, DeviceState, OfflineBackend};
pub use crate::dsp::engine::{NodeStats, SoundEngine};
pub use crate::dsp::envelope::{Envelope, VoiceStage};
pub use crate::dsp::filter::{FilterParameters, FilterType};
pub use crate::dsp::oscillator::{PeriodicWave, Waveform};
pub use crate::error::EngineError;

use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the keysynth-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: route `log` output and panics to the browser console.
#[cfg(feature = "console")]
#[wasm_bindgen(js_name = initLogging)]
pub fn init_logging() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).ok();
}

/// WASM-exposed: the built-in preset catalog as an array of objects.
#[wasm_bindgen]
pub fn presets() -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(&preset::builtin_presets()).map_err(|e| JsValue::from_str(&format!("{e}")))
}

fn to_js(e: EngineError) -> JsValue {
    JsValue::from_str(&format!("{e}"))
}

/// WASM-exposed sound engine, driven from an AudioWorklet: the worklet calls
/// `process` for every block and posts note and parameter messages in
/// between.
#[wasm_bindgen]
pub struct WebSynth {
    engine: SoundEngine,
}

#[wasm_bindgen]
impl WebSynth {
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f64) -> Result<WebSynth, JsValue> {
        let mut engine = SoundEngine::new(OfflineBackend::new(sample_rate));
        engine.initialize().map_err(to_js)?;
        Ok(WebSynth { engine })
    }

    #[wasm_bindgen(js_name = noteOn)]
    pub fn note_on(&mut self, frequency: f64, note_id: &str, waveform: &str) -> Result<(), JsValue> {
        let waveform = Waveform::from_name(waveform)
            .ok_or_else(|| JsValue::from_str(&format!("unknown waveform `{waveform}`")))?;
        self.engine.note_on(frequency, note_id, waveform).map_err(to_js)
    }

    #[wasm_bindgen(js_name = noteOff)]
    pub fn note_off(&mut self, note_id: &str) {
        self.engine.note_off(note_id);
    }

    #[wasm_bindgen(js_name = setVolume)]
    pub fn set_volume(&mut self, volume: f64) -> Result<(), JsValue> {
        self.engine.set_volume(volume).map_err(to_js)
    }

    /// Takes `{ type, frequency, Q }`.
    #[wasm_bindgen(js_name = setFilter)]
    pub fn set_filter(&mut self, filter: JsValue) -> Result<(), JsValue> {
        let filter: FilterParameters = serde_wasm_bindgen::from_value(filter)?;
        self.engine.set_filter(filter).map_err(to_js)
    }

    /// Takes `{ mix, time, feedback }`.
    #[wasm_bindgen(js_name = setEcho)]
    pub fn set_echo(&mut self, echo: JsValue) -> Result<(), JsValue> {
        let echo: EchoParameters = serde_wasm_bindgen::from_value(echo)?;
        self.engine.set_echo(echo).map_err(to_js)
    }

    /// Takes `{ attack, decay, sustain, release }`.
    #[wasm_bindgen(js_name = setAdsr)]
    pub fn set_adsr(&mut self, envelope: JsValue) -> Result<(), JsValue> {
        let envelope: Envelope = serde_wasm_bindgen::from_value(envelope)?;
        self.engine.set_adsr(envelope).map_err(to_js)
    }

    /// Partial amplitudes for the `custom` waveform.
    #[wasm_bindgen(js_name = setPeriodicWave)]
    pub fn set_periodic_wave(&mut self, harmonics: Vec<f64>) {
        self.engine.set_periodic_wave(PeriodicWave::from_harmonics(&harmonics));
    }

    /// Render the next `frames` mono samples.
    pub fn process(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames];
        self.engine.render(&mut out);
        out
    }

    /// Byte waveform snapshot for the visualizer; 128 is silence.
    #[wasm_bindgen(js_name = audioData)]
    pub fn audio_data(&self) -> Option<Vec<u8>> {
        self.engine.audio_data()
    }

    /// Byte spectrum snapshot for the visualizer.
    #[wasm_bindgen(js_name = frequencyData)]
    pub fn frequency_data(&self) -> Option<Vec<u8>> {
        let analyser = self.engine.analyser()?;
        let mut data = vec![0u8; analyser.frequency_bin_count()];
        analyser.byte_frequency_data(&mut data);
        Some(data)
    }

    #[wasm_bindgen(js_name = activeVoices)]
    pub fn active_voices(&self) -> usize {
        self.engine.voice_count()
    }

    #[wasm_bindgen(js_name = currentTime)]
    pub fn current_time(&self) -> f64 {
        self.engine.current_time()
    }

    pub fn dispose(&mut self) {
        self.engine.dispose();
    }
}
