use crate::id::CorrelationId;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A line started with a byte that is not a frame marker.
    #[error("unexpected marker byte 0x{0:02x}")]
    UnexpectedMarker(u8),

    /// The fixed-width correlation id could not be parsed.
    #[error("invalid correlation id {0:?}")]
    InvalidId(String),

    /// A method name is empty or contains line or marker bytes.
    #[error("invalid method name {0:?}")]
    InvalidMethodName(String),

    /// A call frame was readable up to its id but its body was not.
    #[error("malformed call {id} to {method}: {reason}")]
    MalformedCall {
        id: CorrelationId,
        method: String,
        reason: String,
    },

    /// A result frame was readable up to its id but its value was not.
    #[error("malformed result for {id}: {reason}")]
    MalformedReply { id: CorrelationId, reason: String },

    /// An exception frame named a fault that cannot be reconstructed locally.
    #[error("undecodable fault for {id}: {reason}")]
    UndecodableFault { id: CorrelationId, reason: String },

    /// A line exceeded the configured maximum length.
    #[error("line too long ({len} bytes, max {max})")]
    LineTooLong { len: usize, max: usize },

    /// A value could not be serialized for sending.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended (cleanly or mid-frame).
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// Id of the reply frame this error belongs to, if it can be routed to a caller.
    pub fn reply_id(&self) -> Option<CorrelationId> {
        match self {
            FrameError::MalformedReply { id, .. } | FrameError::UndecodableFault { id, .. } => {
                Some(*id)
            }
            _ => None,
        }
    }

    /// Whether the stream can keep being read after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, FrameError::Io(_) | FrameError::ConnectionClosed)
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
