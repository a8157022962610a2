use thiserror::Error;

/// Errors surfaced by the sound engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The audio output could not be acquired. Fatal for the engine instance.
    #[error("audio output unavailable: {0}")]
    DeviceUnavailable(String),
    /// The output exists but refused to leave the suspended state.
    #[error("audio output could not be resumed: {0}")]
    ResumeFailed(String),
    #[error("sound engine has been disposed")]
    Disposed,
    #[error("invalid note frequency {0} Hz")]
    InvalidFrequency(f64),
    #[error("invalid value {value} for parameter `{name}`")]
    InvalidParameter { name: &'static str, value: f64 },
}

impl EngineError {
    /// Fatal errors mean the engine instance must be replaced.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::DeviceUnavailable(_) | EngineError::Disposed)
    }
}

/// Errors from tearing down an individual graph node.
///
/// These only ever reach the log: cleanup carries on past them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NodeError {
    #[error("node was never started")]
    NotStarted,
    #[error("node already stopped")]
    AlreadyStopped,
    #[error("node is not connected")]
    NotConnected,
}
