use std::time::Duration;

use procbridge_frame::{Fault, FrameError};
use procbridge_transport::TransportError;

/// Errors surfaced by a bridge and its dispatchers.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The peer did not connect in time, or the transport failed to open.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A call was issued before the outbound half was open.
    #[error("bridge is not connected")]
    NotConnected,

    /// The peer sent a reply for this call that could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Frame(FrameError),

    /// Arguments or a return value could not be converted to or from JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The remote handler failed. Only ever produced from an exception frame.
    #[error("remote fault: {0}")]
    Remote(Fault),

    #[error("call cancelled")]
    Cancelled,

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The inbound stream ended while the call was pending.
    #[error("peer disconnected")]
    Disconnected,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("duplicate method {0}")]
    DuplicateMethod(String),

    #[error("invalid method name {0:?}")]
    InvalidMethodName(String),

    /// Bridges spawn tasks and must be created inside a Tokio runtime.
    #[error("no tokio runtime: {0}")]
    NoRuntime(String),
}

impl BridgeError {
    /// The remote fault, if this error came from the peer's handler.
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            BridgeError::Remote(fault) => Some(fault),
            _ => None,
        }
    }
}

impl From<FrameError> for BridgeError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::ConnectionClosed => BridgeError::Disconnected,
            other => BridgeError::Frame(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
