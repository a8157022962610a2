//! Audio output acquisition.
//!
//! The engine never talks to a platform API directly: an [`AudioBackend`]
//! hands it an [`AudioOutput`], and whoever drives the output (an
//! AudioWorklet, a test) pulls samples through `SoundEngine::render`.

use crate::error::EngineError;

/// Lifecycle of an acquired output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Acquired but not producing audio; the clock is frozen.
    Suspended,
    Running,
    Closed,
}

/// An acquired audio output.
pub trait AudioOutput {
    fn sample_rate(&self) -> f64;

    fn state(&self) -> DeviceState;

    /// Leave the suspended state. Must be a no-op when already running.
    fn resume(&mut self) -> Result<(), EngineError>;

    /// Release the output. Must be safe to call more than once.
    fn close(&mut self);
}

/// Source of audio outputs.
pub trait AudioBackend {
    /// Acquire an output, or fail with [`EngineError::DeviceUnavailable`].
    fn open(&mut self) -> Result<Box<dyn AudioOutput>, EngineError>;
}

/// Backend whose output is pulled by the host at a fixed sample rate.
#[derive(Debug, Clone, Copy)]
pub struct OfflineBackend {
    sample_rate: f64,
    start_suspended: bool,
}

impl OfflineBackend {
    pub fn new(sample_rate: f64) -> Self {
        OfflineBackend {
            sample_rate,
            start_suspended: false,
        }
    }

    /// Outputs start suspended until the first note resumes them, as
    /// browsers do before a user gesture.
    pub fn suspended(mut self) -> Self {
        self.start_suspended = true;
        self
    }
}

impl AudioBackend for OfflineBackend {
    fn open(&mut self) -> Result<Box<dyn AudioOutput>, EngineError> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(EngineError::DeviceUnavailable(format!(
                "unsupported sample rate {}",
                self.sample_rate
            )));
        }
        let state = if self.start_suspended {
            DeviceState::Suspended
        } else {
            DeviceState::Running
        };
        Ok(Box::new(OfflineOutput {
            sample_rate: self.sample_rate,
            state,
        }))
    }
}

#[derive(Debug)]
struct OfflineOutput {
    sample_rate: f64,
    state: DeviceState,
}

impl AudioOutput for OfflineOutput {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn state(&self) -> DeviceState {
        self.state
    }

    fn resume(&mut self) -> Result<(), EngineError> {
        match self.state {
            DeviceState::Closed => Err(EngineError::ResumeFailed("output is closed".into())),
            _ => {
                self.state = DeviceState::Running;
                Ok(())
            }
        }
    }

    fn close(&mut self) {
        self.state = DeviceState::Closed;
    }
}
