//! ADSR envelope, expressed as automation scheduled on a voice's gain.
//!
//! Attack is a linear ramp to full level, decay and release are exponential
//! approaches with time constant `duration / TIME_CONSTANT_DIVISOR`. The last
//! `RELEASE_FADE_SECONDS` of a release are a linear ramp, so the gain is
//! exactly zero when the release time is up.

use serde::{Deserialize, Serialize};

use crate::config::{RELEASE_FADE_SECONDS, TIME_CONSTANT_DIVISOR};
use crate::error::EngineError;

use super::param::AudioParam;

/// ADSR settings shared by every voice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Attack time in seconds.
    pub attack: f64,
    /// Decay time in seconds.
    pub decay: f64,
    /// Sustain level [0, 1].
    pub sustain: f64,
    /// Release time in seconds.
    pub release: f64,
}

impl Default for Envelope {
    fn default() -> Self {
        Envelope {
            attack: 0.2,
            decay: 0.0,
            sustain: 1.0,
            release: 0.3,
        }
    }
}

impl Envelope {
    /// Reject non-finite values, clamp the rest: times to >= 0, sustain into [0, 1].
    pub fn sanitized(self) -> Result<Self, EngineError> {
        for (name, value) in [
            ("envelope.attack", self.attack),
            ("envelope.decay", self.decay),
            ("envelope.sustain", self.sustain),
            ("envelope.release", self.release),
        ] {
            if !value.is_finite() {
                return Err(EngineError::InvalidParameter { name, value });
            }
        }
        Ok(Envelope {
            attack: self.attack.max(0.0),
            decay: self.decay.max(0.0),
            sustain: self.sustain.clamp(0.0, 1.0),
            release: self.release.max(0.0),
        })
    }

    /// Schedule attack, decay and sustain on `gain` for a note triggered at `now`.
    pub fn schedule_attack(&self, gain: &mut AudioParam, now: f64) {
        let attack_end = now + self.attack;
        gain.set_value_at_time(0.0, now);
        gain.linear_ramp_to_value_at_time(1.0, attack_end);

        if self.decay > 0.0 {
            gain.set_target_at_time(self.sustain, attack_end, self.decay / TIME_CONSTANT_DIVISOR);
        } else if self.sustain < 1.0 {
            gain.set_value_at_time(self.sustain, attack_end);
        }
    }

    /// Fade `gain` out from wherever it is at `now`, using this envelope's
    /// release time.
    pub fn schedule_release(&self, gain: &mut AudioParam, now: f64) {
        gain.cancel_and_hold_at_time(now);
        let end = now + self.release;
        if self.release > RELEASE_FADE_SECONDS {
            let fade_start = end - RELEASE_FADE_SECONDS;
            gain.set_target_at_time(0.0, now, self.release / TIME_CONSTANT_DIVISOR);
            let level = gain.value_at(fade_start);
            gain.set_value_at_time(level, fade_start);
        }
        gain.linear_ramp_to_value_at_time(0.0, end);
    }
}

/// Where a voice is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceStage {
    Attacking,
    Decaying,
    Sustaining,
    Releasing,
}

impl VoiceStage {
    /// Stage at `now` for a voice triggered at `triggered_at` with `envelope`
    /// and released at `released_at` (if released).
    pub fn at(envelope: &Envelope, triggered_at: f64, released_at: Option<f64>, now: f64) -> VoiceStage {
        if released_at.is_some_and(|r| now >= r) {
            return VoiceStage::Releasing;
        }
        let attack_end = triggered_at + envelope.attack;
        if now < attack_end {
            VoiceStage::Attacking
        } else if envelope.decay > 0.0 && now < attack_end + envelope.decay {
            VoiceStage::Decaying
        } else {
            VoiceStage::Sustaining
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adsr(attack: f64, decay: f64, sustain: f64, release: f64) -> Envelope {
        Envelope {
            attack,
            decay,
            sustain,
            release,
        }
    }

    #[test]
    fn attack_reaches_one() {
        let env = adsr(0.25, 0.0, 1.0, 0.3);
        let mut gain = AudioParam::new(1.0);
        env.schedule_attack(&mut gain, 0.5);

        assert_eq!(gain.value_at(0.5), 0.0);
        assert!((gain.value_at(0.625) - 0.5).abs() < 1e-9);
        assert_eq!(gain.value_at(0.75), 1.0);
        assert_eq!(gain.value_at(5.0), 1.0, "sustain 1 holds full level");
    }

    #[test]
    fn decay_settles_on_sustain() {
        let env = adsr(0.001, 0.03, 0.6, 0.3);
        let mut gain = AudioParam::new(0.0);
        env.schedule_attack(&mut gain, 0.0);

        let after_decay = gain.value_at(0.031);
        assert!((after_decay - 0.6).abs() < 0.4 * 0.06, "~95% settled, got {after_decay}");
        let s = gain.value_at(1.0);
        assert!((s - 0.6).abs() < 1e-6, "Should sustain at 0.6, got {s}");
    }

    #[test]
    fn zero_decay_snaps_to_sustain() {
        let env = adsr(0.01, 0.0, 0.4, 0.3);
        let mut gain = AudioParam::new(0.0);
        env.schedule_attack(&mut gain, 0.0);
        assert_eq!(gain.value_at(0.01), 0.4);
        assert_eq!(gain.value_at(2.0), 0.4);
    }

    #[test]
    fn release_to_zero() {
        let env = adsr(0.001, 0.001, 0.7, 0.03);
        let mut gain = AudioParam::new(0.0);
        env.schedule_attack(&mut gain, 0.0);
        env.schedule_release(&mut gain, 1.0);

        assert!((gain.value_at(1.0) - 0.7).abs() < 1e-6);
        assert!(gain.value_at(1.03) < 0.7 * 0.06);
        assert!(gain.value_at(2.0) < 1e-9);
    }

    #[test]
    fn release_is_silent_when_time_is_up() {
        let env = adsr(0.001, 0.001, 0.8, 0.1);
        let mut gain = AudioParam::new(0.0);
        env.schedule_attack(&mut gain, 0.0);
        env.schedule_release(&mut gain, 1.0);

        assert_eq!(gain.value_at(1.1), 0.0);
        let mut previous = gain.value_at(1.0);
        for i in 1..=4410 {
            let level = gain.value_at(1.0 + i as f64 / 44100.0);
            assert!(level <= previous + 1e-12, "release must not rise");
            assert!(previous - level < 0.01, "step of {} at sample {i}", previous - level);
            previous = level;
        }
    }

    #[test]
    fn release_shorter_than_fade_ramps_linearly() {
        let env = adsr(0.0, 0.0, 1.0, 0.002);
        let mut gain = AudioParam::new(0.0);
        env.schedule_attack(&mut gain, 0.0);
        env.schedule_release(&mut gain, 0.5);
        assert!((gain.value_at(0.501) - 0.5).abs() < 1e-9);
        assert_eq!(gain.value_at(0.5025), 0.0);

        let instant = adsr(0.0, 0.0, 1.0, 0.0);
        instant.schedule_release(&mut gain, 1.0);
        assert_eq!(gain.value_at(1.0), 0.0);
    }

    #[test]
    fn release_during_attack_has_no_jump() {
        let env = adsr(1.0, 0.0, 1.0, 0.3);
        let mut gain = AudioParam::new(0.0);
        env.schedule_attack(&mut gain, 0.0);
        env.schedule_release(&mut gain, 0.4);
        assert!((gain.value_at(0.4) - 0.4).abs() < 1e-9);
        assert!(gain.value_at(0.45) < 0.4);
    }

    #[test]
    fn full_cycle_range() {
        let env = adsr(0.01, 0.05, 0.5, 0.1);
        let mut gain = AudioParam::new(0.0);
        env.schedule_attack(&mut gain, 0.0);
        env.schedule_release(&mut gain, 0.2);
        for i in 0..20000 {
            let s = gain.value_at(i as f64 / 44100.0);
            assert!((0.0..=1.0).contains(&s), "Envelope out of range: {s}");
        }
    }

    #[test]
    fn stage_follows_clock() {
        let env = adsr(0.1, 0.2, 0.5, 0.3);
        assert_eq!(VoiceStage::at(&env, 1.0, None, 1.05), VoiceStage::Attacking);
        assert_eq!(VoiceStage::at(&env, 1.0, None, 1.2), VoiceStage::Decaying);
        assert_eq!(VoiceStage::at(&env, 1.0, None, 2.0), VoiceStage::Sustaining);
        assert_eq!(VoiceStage::at(&env, 1.0, Some(1.5), 1.6), VoiceStage::Releasing);
    }

    #[test]
    fn sanitize_clamps_and_rejects() {
        let env = adsr(-1.0, 0.1, 1.5, -0.2).sanitized().unwrap();
        assert_eq!(env, adsr(0.0, 0.1, 1.0, 0.0));
        assert!(adsr(f64::NAN, 0.0, 1.0, 0.3).sanitized().is_err());
    }
}
