//! Remote failures carried by exception frames.

use std::any::Any;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fault kind for a handler that panicked.
pub const KIND_PANIC: &str = "Panic";
/// Fault kind for arguments that could not be decoded into the handler's types.
pub const KIND_ARGUMENT: &str = "ArgumentError";
/// Fault kind for a call frame whose parameters were not valid JSON.
pub const KIND_SERIALIZATION: &str = "SerializationError";
/// Kind used when a requested kind is not representable on the wire.
pub const KIND_GENERIC: &str = "Fault";

const MAX_KIND_LEN: usize = 256;

/// A failure raised by a remote handler.
///
/// The kind is a short identifier (no whitespace, no control bytes) that
/// survives the wire verbatim, as do the message and the optional structured
/// data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Fault {
    kind: String,
    message: String,
    data: Option<Value>,
}

/// JSON payload of an exception frame.
#[derive(Serialize, Deserialize)]
struct FaultState {
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl Fault {
    /// Create a fault. A kind that cannot travel on the wire is replaced by
    /// [`KIND_GENERIC`].
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        let kind = kind.into();
        let kind = if is_valid_kind(&kind) {
            kind
        } else {
            KIND_GENERIC.to_string()
        };
        Self {
            kind,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured data.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Build a fault from a caught panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "handler panicked".to_string()
        };
        Self::new(KIND_PANIC, message)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// JSON text of the fault state (message and data).
    pub(crate) fn encode_state(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&FaultState {
            message: self.message.clone(),
            data: self.data.clone(),
        })
    }

    /// Rebuild a fault from its wire kind and JSON state.
    pub(crate) fn decode(kind: &[u8], state: &[u8]) -> std::result::Result<Self, String> {
        let kind = std::str::from_utf8(kind).map_err(|_| "fault kind is not UTF-8".to_string())?;
        if !is_valid_kind(kind) {
            return Err(format!("invalid fault kind {kind:?}"));
        }
        let state: FaultState =
            serde_json::from_slice(state).map_err(|e| format!("invalid fault state: {e}"))?;
        Ok(Self {
            kind: kind.to_string(),
            message: state.message,
            data: state.data,
        })
    }
}

/// Whether `kind` can be written verbatim into an exception frame.
pub fn is_valid_kind(kind: &str) -> bool {
    !kind.is_empty()
        && kind.len() <= MAX_KIND_LEN
        && kind
            .chars()
            .all(|c| !c.is_whitespace() && !c.is_control())
}
