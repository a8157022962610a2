//! Built-in instrument presets.
//!
//! A preset is a template for the working settings: selecting one copies
//! its envelope and filter into the control surface, and its waveform is
//! used for notes played from then on.

use serde::{Deserialize, Serialize};

use crate::dsp::envelope::Envelope;
use crate::dsp::filter::{FilterParameters, FilterType};
use crate::dsp::oscillator::Waveform;

/// An immutable instrument template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentPreset {
    pub name: String,
    pub oscillator: Waveform,
    pub envelope: Envelope,
    pub filter: FilterParameters,
}

fn preset(
    name: &str,
    oscillator: Waveform,
    (attack, decay, sustain, release): (f64, f64, f64, f64),
    (filter_type, frequency, q): (FilterType, f64, f64),
) -> InstrumentPreset {
    InstrumentPreset {
        name: name.to_string(),
        oscillator,
        envelope: Envelope {
            attack,
            decay,
            sustain,
            release,
        },
        filter: FilterParameters {
            filter_type,
            frequency,
            q,
        },
    }
}

/// The preset catalog, in display order. The first entry is the default.
pub fn builtin_presets() -> Vec<InstrumentPreset> {
    use FilterType::*;
    use Waveform::*;
    vec![
        preset("Grand Piano", Sine, (0.005, 0.1, 0.7, 0.3), (Lowpass, 5000.0, 1.0)),
        preset("Electric Piano", Triangle, (0.02, 0.15, 0.6, 0.4), (Lowpass, 3000.0, 2.0)),
        preset("Synth Lead", Sawtooth, (0.05, 0.2, 0.6, 0.5), (Lowpass, 1500.0, 8.0)),
        preset("Bass", Sawtooth, (0.01, 0.2, 0.8, 0.3), (Lowpass, 800.0, 4.0)),
        preset("Pluck", Square, (0.005, 0.1, 0.5, 0.2), (Bandpass, 1200.0, 6.0)),
        preset("Strings", Sine, (0.07, 0.2, 0.8, 0.4), (Lowpass, 2500.0, 2.0)),
        preset("Brass", Sawtooth, (0.05, 0.15, 0.7, 0.3), (Lowpass, 1800.0, 5.0)),
    ]
}

/// Look a preset up by name, ignoring case.
pub fn find_preset(name: &str) -> Option<InstrumentPreset> {
    builtin_presets()
        .into_iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
}

/// The preset used when nothing else is selected.
pub fn default_preset() -> InstrumentPreset {
    let mut presets = builtin_presets();
    presets.swap_remove(0)
}
