//! Signal graph — the shared nodes every voice feeds, created once per
//! engine and wired in a fixed topology:
//!
//! ```text
//! voices ─▶ filter ─▶ master ─┬─▶ dry ───────────────┬─▶ analyser ─▶ output
//!                             └─▶ delay ─┬─▶ wet ─────┘
//!                                  ▲     │
//!                                  └─ feedback
//! ```

use crate::config::EngineConfig;

use super::analyser::Analyser;
use super::delay::{DelayLine, EchoParameters};
use super::filter::{BiquadFilter, FilterParameters};
use super::mixer::soft_clip;
use super::node::GainNode;
use super::param::AudioParam;

/// Number of shared nodes owned by the graph.
pub const SHARED_NODES: usize = 7;

/// The shared processing chain.
pub struct SignalGraph {
    sample_rate: f64,
    master: GainNode,
    filter: BiquadFilter,
    /// Filter frequency and Q are automatable but applied once per block.
    filter_frequency: AudioParam,
    filter_q: AudioParam,
    analyser: Analyser,
    delay: DelayLine,
    delay_time: AudioParam,
    feedback: GainNode,
    dry: GainNode,
    wet: GainNode,
    // Per-block automation curves.
    master_curve: Vec<f64>,
    time_curve: Vec<f64>,
    feedback_curve: Vec<f64>,
    dry_curve: Vec<f64>,
    wet_curve: Vec<f64>,
}

impl SignalGraph {
    /// Create and wire the shared nodes. Everything starts at neutral values
    /// until [`SignalGraph::apply`] sets the engine's working state.
    pub fn new(sample_rate: f64, config: &EngineConfig) -> Self {
        let master = GainNode::new(1.0);
        let filter = BiquadFilter::new(FilterParameters::default().filter_type, sample_rate);
        let analyser = Analyser::new(config.fft_size, config.smoothing);
        let delay = DelayLine::new(sample_rate, config.max_delay_seconds);
        let feedback = GainNode::new(0.0);
        let dry = GainNode::new(1.0);
        let wet = GainNode::new(0.0);

        let mut graph = SignalGraph {
            sample_rate,
            master,
            filter,
            filter_frequency: AudioParam::new(FilterParameters::default().frequency),
            filter_q: AudioParam::new(FilterParameters::default().q),
            analyser,
            delay,
            delay_time: AudioParam::new(0.0),
            feedback,
            dry,
            wet,
            master_curve: Vec::new(),
            time_curve: Vec::new(),
            feedback_curve: Vec::new(),
            dry_curve: Vec::new(),
            wet_curve: Vec::new(),
        };
        graph.filter.connect();
        graph.master.connect();
        graph.delay.connect();
        graph.feedback.connect();
        graph.dry.connect();
        graph.wet.connect();
        graph.analyser.connect();
        log::debug!("signal graph wired at {} Hz", sample_rate);
        graph
    }

    /// Jump every shared parameter to the given values without gliding.
    pub fn apply(&mut self, volume: f64, filter: &FilterParameters, echo: &EchoParameters) {
        self.master.gain.set_value(volume);
        self.filter.set_type(filter.filter_type);
        self.filter_frequency.set_value(filter.frequency);
        self.filter_q.set_value(filter.q);
        self.delay_time.set_value(echo.time);
        self.feedback.gain.set_value(echo.feedback);
        self.dry.gain.set_value(echo.dry());
        self.wet.gain.set_value(echo.wet());
    }

    pub fn set_volume(&mut self, volume: f64, now: f64) {
        self.master.gain.glide_to(volume, now);
    }

    /// The filter type switches at once; frequency and Q glide.
    pub fn set_filter(&mut self, filter: &FilterParameters, now: f64) {
        self.filter.set_type(filter.filter_type);
        self.filter_frequency.glide_to(filter.frequency, now);
        self.filter_q.glide_to(filter.q, now);
    }

    /// Dry and wet glide together so `dry + wet` stays 1 throughout.
    pub fn set_echo(&mut self, echo: &EchoParameters, now: f64) {
        self.delay_time.glide_to(echo.time, now);
        self.feedback.gain.glide_to(echo.feedback, now);
        self.dry.gain.glide_to(echo.dry(), now);
        self.wet.gain.glide_to(echo.wet(), now);
    }

    pub fn analyser(&self) -> &Analyser {
        &self.analyser
    }

    pub fn master_gain_at(&self, t: f64) -> f64 {
        self.master.gain.value_at(t)
    }

    /// (dry, wet) gains at `t`.
    pub fn echo_gains_at(&self, t: f64) -> (f64, f64) {
        (self.dry.gain.value_at(t), self.wet.gain.value_at(t))
    }

    pub fn filter_frequency_at(&self, t: f64) -> f64 {
        self.filter_frequency.value_at(t)
    }

    /// Run one block of the voice bus through the graph into `out`.
    pub fn process(&mut self, bus: &[f64], start_time: f64, out: &mut [f32]) {
        let n = bus.len().min(out.len());
        let sr = self.sample_rate;

        self.filter.set_frequency(self.filter_frequency.value_at(start_time));
        self.filter.set_q(self.filter_q.value_at(start_time));

        for curve in [
            &mut self.master_curve,
            &mut self.time_curve,
            &mut self.feedback_curve,
            &mut self.dry_curve,
            &mut self.wet_curve,
        ] {
            curve.resize(n, 0.0);
        }
        self.master.gain.fill(start_time, sr, &mut self.master_curve);
        self.delay_time.fill(start_time, sr, &mut self.time_curve);
        self.feedback.gain.fill(start_time, sr, &mut self.feedback_curve);
        self.dry.gain.fill(start_time, sr, &mut self.dry_curve);
        self.wet.gain.fill(start_time, sr, &mut self.wet_curve);

        for i in 0..n {
            let filtered = self.filter.process(bus[i]);
            let mastered = filtered * self.master_curve[i];
            let delayed = self.delay.read(self.time_curve[i]);
            self.delay.write(mastered + delayed * self.feedback_curve[i]);
            let mixed = mastered * self.dry_curve[i] + delayed * self.wet_curve[i];
            self.analyser.push(mixed);
            out[i] = soft_clip(mixed) as f32;
        }

        self.master.gain.discard_before(start_time);
        self.filter_frequency.discard_before(start_time);
        self.filter_q.discard_before(start_time);
        self.delay_time.discard_before(start_time);
        self.feedback.gain.discard_before(start_time);
        self.dry.gain.discard_before(start_time);
        self.wet.gain.discard_before(start_time);
    }

    /// Disconnect every shared node, logging failures and carrying on.
    /// Returns the number of nodes torn down.
    pub fn disconnect_all(&mut self) -> usize {
        let results = [
            ("master", self.master.disconnect()),
            ("filter", self.filter.disconnect()),
            ("analyser", self.analyser.disconnect()),
            ("delay", self.delay.disconnect()),
            ("feedback", self.feedback.disconnect()),
            ("dry", self.dry.disconnect()),
            ("wet", self.wet.disconnect()),
        ];
        for (node, result) in results {
            if let Err(e) = result {
                log::warn!("disconnecting {node}: {e}");
            }
        }
        SHARED_NODES
    }

    pub fn is_connected(&self) -> bool {
        self.master.is_connected()
            && self.filter.is_connected()
            && self.analyser.is_connected()
            && self.delay.is_connected()
            && self.feedback.is_connected()
            && self.dry.is_connected()
            && self.wet.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::filter::FilterType;

    fn graph() -> SignalGraph {
        let mut g = SignalGraph::new(44100.0, &EngineConfig::default());
        g.apply(1.0, &FilterParameters::default(), &EchoParameters::default());
        g
    }

    fn run(g: &mut SignalGraph, bus: &[f64], start: f64) -> Vec<f32> {
        let mut out = vec![0.0f32; bus.len()];
        g.process(bus, start, &mut out);
        out
    }

    #[test]
    fn new_graph_is_fully_wired() {
        assert!(graph().is_connected());
    }

    #[test]
    fn silence_in_silence_out() {
        let mut g = graph();
        let out = run(&mut g, &[0.0; 256], 0.0);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn zero_volume_mutes_output() {
        let mut g = graph();
        g.apply(0.0, &FilterParameters::default(), &EchoParameters::default());
        let out = run(&mut g, &[0.5; 512], 0.0);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn echo_gains_sum_to_one_while_gliding() {
        let mut g = graph();
        let echo = EchoParameters {
            mix: 0.9,
            ..EchoParameters::default()
        };
        g.set_echo(&echo, 1.0);
        // Change again mid-glide.
        g.set_echo(&EchoParameters { mix: 0.1, ..echo }, 1.002);
        for i in 0..200 {
            let t = 0.99 + i as f64 * 0.0002;
            let (dry, wet) = g.echo_gains_at(t);
            assert!((dry + wet - 1.0).abs() < 1e-9, "dry + wet = {} at {t}", dry + wet);
        }
        let (dry, wet) = g.echo_gains_at(2.0);
        assert!((dry - 0.9).abs() < 1e-6 && (wet - 0.1).abs() < 1e-6);
    }

    #[test]
    fn volume_glides_without_jump() {
        let mut g = graph();
        g.set_volume(0.0, 1.0);
        assert_eq!(g.master_gain_at(1.0), 1.0);
        let shortly = g.master_gain_at(1.001);
        assert!(shortly < 1.0 && shortly > 0.5, "got {shortly}");
        assert!(g.master_gain_at(1.5) < 1e-6);
    }

    #[test]
    fn fully_wet_echo_delays_an_impulse() {
        let mut g = SignalGraph::new(1000.0, &EngineConfig::default());
        let filter = FilterParameters {
            filter_type: FilterType::Lowpass,
            frequency: 200.0,
            q: 0.7071,
        };
        let echo = EchoParameters {
            mix: 1.0,
            time: 0.05,
            feedback: 0.0,
        };
        g.apply(1.0, &filter, &echo);
        let mut bus = vec![0.0; 200];
        bus[0] = 1.0;
        let out = run(&mut g, &bus, 0.0);
        assert!(out[..50].iter().all(|&s| s == 0.0), "nothing before the echo");
        assert!(out[50..].iter().any(|&s| s.abs() > 0.01), "echo arrives after 50 samples");
    }

    #[test]
    fn analyser_sees_output() {
        let mut g = graph();
        let bus: Vec<f64> = (0..2048)
            .map(|i| (2.0 * std::f64::consts::PI * 440.0 * i as f64 / 44100.0).sin() * 0.5)
            .collect();
        run(&mut g, &bus, 0.0);
        let mut bytes = vec![0u8; 1024];
        g.analyser().byte_time_domain_data(&mut bytes);
        assert!(bytes.iter().any(|&b| b != 128));
    }

    #[test]
    fn filter_glides_towards_new_cutoff() {
        let mut g = graph();
        let target = FilterParameters {
            frequency: 500.0,
            ..FilterParameters::default()
        };
        g.set_filter(&target, 0.0);
        assert!((g.filter_frequency_at(1.0) - 500.0).abs() < 1e-6);
    }

    #[test]
    fn disconnect_all_is_best_effort() {
        let mut g = graph();
        assert_eq!(g.disconnect_all(), SHARED_NODES);
        assert!(!g.is_connected());
        // Second pass logs every failure but still completes.
        assert_eq!(g.disconnect_all(), SHARED_NODES);
    }
}
