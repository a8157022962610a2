//! Keyboard mapping — note names, MIDI numbers, frequencies, and the
//! computer-keyboard layout that plays one octave.

use serde::Serialize;

/// Lowest playable note (A0).
pub const LOWEST_MIDI: i32 = 21;
/// Highest playable note (C8).
pub const HIGHEST_MIDI: i32 = 108;

/// Computer keys for C..B of the selected octave, white keys on the home
/// row and black keys above them.
pub const KEY_LAYOUT: [char; 12] = ['a', 'w', 's', 'e', 'd', 'f', 't', 'g', 'y', 'h', 'u', 'j'];

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// One playable key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyMapping {
    pub key: char,
    /// Note id used as the voice key, e.g. `"C#4"`.
    pub note: String,
    pub frequency: f64,
}

/// Parse a note name (e.g. "C4", "F#3", "Bb5") into a MIDI note number.
pub fn note_to_midi(note: &str) -> Option<i32> {
    let mut chars = note.chars();
    let base_semitone = match chars.next()? {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let rest = chars.as_str();
    let (semitone, octave_str) = match rest.chars().next() {
        Some('#') => (base_semitone + 1, &rest[1..]),
        Some('b') => (base_semitone - 1, &rest[1..]),
        _ => (base_semitone, rest),
    };
    let octave: i32 = octave_str.parse().ok()?;

    // MIDI note number: C4 = 60
    Some((octave + 1) * 12 + semitone)
}

/// Note name with sharps for a MIDI number, e.g. 61 -> "C#4".
pub fn midi_to_note(midi: i32) -> String {
    let octave = midi.div_euclid(12) - 1;
    let name = NOTE_NAMES[midi.rem_euclid(12) as usize];
    format!("{name}{octave}")
}

/// Convert a MIDI note number to frequency using the given tuning pitch.
///
/// `tuning_pitch` is the frequency of A4 (MIDI 69).
/// Formula: `tuning_pitch * 2^((midi - 69) / 12)`
pub fn midi_to_frequency(midi: i32, tuning_pitch: f64) -> f64 {
    tuning_pitch * (2.0_f64).powf((midi as f64 - 69.0) / 12.0)
}

/// Equal-tempered frequency of a note name at A4 = 440 Hz.
pub fn note_to_frequency(note: &str) -> Option<f64> {
    note_to_midi(note).map(|midi| midi_to_frequency(midi, 440.0))
}

/// Whether a MIDI number falls on the 88-key piano.
pub fn in_piano_range(midi: i32) -> bool {
    (LOWEST_MIDI..=HIGHEST_MIDI).contains(&midi)
}

/// The twelve chromatic notes of `octave` on [`KEY_LAYOUT`], skipping any
/// that fall off the piano.
pub fn keyboard_mapping(octave: i32) -> Vec<KeyMapping> {
    let base = (octave + 1) * 12;
    KEY_LAYOUT
        .iter()
        .enumerate()
        .filter_map(|(offset, &key)| {
            let midi = base + offset as i32;
            in_piano_range(midi).then(|| KeyMapping {
                key,
                note: midi_to_note(midi),
                frequency: midi_to_frequency(midi, 440.0),
            })
        })
        .collect()
}

/// Find the mapping for a pressed key, case-insensitively.
pub fn lookup_key(octave: i32, key: char) -> Option<KeyMapping> {
    let key = key.to_ascii_lowercase();
    keyboard_mapping(octave).into_iter().find(|m| m.key == key)
}
