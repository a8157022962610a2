//! Automatable parameter — a value plus a timeline of scheduled changes on
//! the audio clock, evaluated the way WebAudio `AudioParam` curves are.

use crate::config::PARAM_SMOOTHING_SECONDS;

/// A scheduled change. Each event takes effect at its `time`.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Automation {
    /// Jump to `value`.
    SetValue { time: f64, value: f64 },
    /// Straight line from the previous event, arriving at `value` at `time`.
    LinearRamp { time: f64, value: f64 },
    /// Exponential approach towards `target` starting at `time`.
    SetTarget {
        time: f64,
        target: f64,
        time_constant: f64,
    },
}

impl Automation {
    fn time(&self) -> f64 {
        match *self {
            Automation::SetValue { time, .. }
            | Automation::LinearRamp { time, .. }
            | Automation::SetTarget { time, .. } => time,
        }
    }
}

/// Where the curve stands after the last applied event.
#[derive(Debug, Clone, Copy)]
struct Anchor {
    time: f64,
    value: f64,
    /// Active exponential approach: (target, time constant).
    target: Option<(f64, f64)>,
}

impl Anchor {
    fn hold(value: f64) -> Self {
        Anchor {
            time: f64::NEG_INFINITY,
            value,
            target: None,
        }
    }

    fn at(&self, t: f64) -> f64 {
        match self.target {
            Some((target, tc)) if t > self.time => {
                if tc <= 0.0 {
                    target
                } else {
                    target + (self.value - target) * (-(t - self.time) / tc).exp()
                }
            }
            _ => self.value,
        }
    }

    /// Value at `t` while a linear ramp to (`end_time`, `end_value`) is in progress.
    fn ramp_towards(&self, end_time: f64, end_value: f64, t: f64) -> f64 {
        let span = end_time - self.time;
        if !span.is_finite() || span <= 0.0 {
            return self.value;
        }
        self.value + (end_value - self.value) * (t - self.time) / span
    }

    fn apply(self, event: &Automation) -> Anchor {
        match *event {
            Automation::SetValue { time, value } | Automation::LinearRamp { time, value } => Anchor {
                time,
                value,
                target: None,
            },
            Automation::SetTarget {
                time,
                target,
                time_constant,
            } => Anchor {
                time,
                value: self.at(time),
                target: Some((target, time_constant)),
            },
        }
    }
}

/// A parameter whose value may follow a scheduled curve.
#[derive(Debug, Clone)]
pub struct AudioParam {
    /// Value used before the first scheduled event.
    value: f64,
    /// Events sorted by time.
    events: Vec<Automation>,
}

impl AudioParam {
    pub fn new(value: f64) -> Self {
        AudioParam {
            value,
            events: Vec::new(),
        }
    }

    /// Overwrite the value immediately, dropping every scheduled event.
    pub fn set_value(&mut self, value: f64) {
        self.value = value;
        self.events.clear();
    }

    pub fn set_value_at_time(&mut self, value: f64, time: f64) {
        self.insert(Automation::SetValue { time, value });
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f64, time: f64) {
        self.insert(Automation::LinearRamp { time, value });
    }

    pub fn set_target_at_time(&mut self, target: f64, start_time: f64, time_constant: f64) {
        self.insert(Automation::SetTarget {
            time: start_time,
            target,
            time_constant,
        });
    }

    /// Drop every event at or after `time` and hold the value the curve had
    /// reached at `time`, so nothing jumps.
    pub fn cancel_and_hold_at_time(&mut self, time: f64) {
        let held = self.value_at(time);
        self.events.retain(|e| e.time() < time);
        self.events.push(Automation::SetValue { time, value: held });
    }

    /// Glide from wherever the curve is at `now` towards `value`.
    pub fn glide_to(&mut self, value: f64, now: f64) {
        self.cancel_and_hold_at_time(now);
        self.set_target_at_time(value, now, PARAM_SMOOTHING_SECONDS);
        self.discard_before(now);
    }

    /// Evaluate the curve at audio-clock time `t`.
    pub fn value_at(&self, t: f64) -> f64 {
        let mut anchor = Anchor::hold(self.value);
        for event in &self.events {
            if event.time() > t {
                return match *event {
                    Automation::LinearRamp { time, value } => anchor.ramp_towards(time, value, t),
                    _ => anchor.at(t),
                };
            }
            anchor = anchor.apply(event);
        }
        anchor.at(t)
    }

    /// Fill `out` with the curve sampled from `start_time` at `sample_rate`.
    pub fn fill(&self, start_time: f64, sample_rate: f64, out: &mut [f64]) {
        if self.events.is_empty() {
            out.fill(self.value);
            return;
        }
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.value_at(start_time + i as f64 / sample_rate);
        }
    }

    /// Collapse events that are entirely in the past into an equivalent
    /// anchor, keeping the event list short for long-lived parameters.
    pub fn discard_before(&mut self, time: f64) {
        let split = self
            .events
            .iter()
            .position(|e| e.time() > time)
            .unwrap_or(self.events.len());
        if split < 2 {
            return;
        }
        let anchor = self.events[..split]
            .iter()
            .fold(Anchor::hold(self.value), |a, e| a.apply(e));
        let mut collapsed = vec![Automation::SetValue {
            time: anchor.time,
            value: anchor.value,
        }];
        if let Some((target, time_constant)) = anchor.target {
            collapsed.push(Automation::SetTarget {
                time: anchor.time,
                target,
                time_constant,
            });
        }
        self.events.splice(..split, collapsed);
    }

    pub fn scheduled_events(&self) -> usize {
        self.events.len()
    }

    fn insert(&mut self, event: Automation) {
        let at = self
            .events
            .iter()
            .position(|e| e.time() > event.time())
            .unwrap_or(self.events.len());
        self.events.insert(at, event);
    }
}
