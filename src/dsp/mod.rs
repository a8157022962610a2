//! DSP Engine — Pure Rust audio synthesis and processing.
//!
//! All DSP runs in Rust for deterministic, cross-platform audio output.
//! The same code is driven by an AudioWorklet (via WASM) in the browser and
//! by plain sample pulls in tests.

pub mod analyser;
pub mod delay;
pub mod device;
pub mod engine;
pub mod envelope;
pub mod filter;
pub mod graph;
pub mod mixer;
pub mod node;
pub mod oscillator;
pub mod param;
pub mod scheduler;
pub mod voice;
