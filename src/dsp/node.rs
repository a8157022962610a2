//! Connection bookkeeping and the gain node.

use crate::error::NodeError;

use super::param::AudioParam;

/// Output connection state of a node.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Port {
    connected: bool,
}

impl Port {
    pub fn connect(&mut self) {
        self.connected = true;
    }

    pub fn disconnect(&mut self) -> Result<(), NodeError> {
        if !self.connected {
            return Err(NodeError::NotConnected);
        }
        self.connected = false;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Multiplies its input by an automatable gain.
#[derive(Debug, Clone)]
pub struct GainNode {
    pub gain: AudioParam,
    output: Port,
}

impl GainNode {
    pub fn new(gain: f64) -> Self {
        GainNode {
            gain: AudioParam::new(gain),
            output: Port::default(),
        }
    }

    pub fn connect(&mut self) {
        self.output.connect();
    }

    pub fn disconnect(&mut self) -> Result<(), NodeError> {
        self.output.disconnect()
    }

    pub fn is_connected(&self) -> bool {
        self.output.is_connected()
    }
}
