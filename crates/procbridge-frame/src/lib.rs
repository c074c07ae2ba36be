//! Call/result/exception framing for procbridge.
//!
//! Every frame is one or more newline-terminated lines. The first byte of a
//! frame is a marker naming its variant, followed by a fixed-width 13 digit
//! hex correlation id:
//! - `Call`: marker, id, method name; then one `ParamStart` line per argument
//! - `Result`: marker, id, spacer, JSON value (empty for void replies)
//! - `Exception`: marker, id, spacer, fault kind, spacer, JSON fault state
//!
//! Values are JSON, so `null` and `""` stay distinct and no value ever
//! contains a raw newline or spacer byte.

pub mod codec;
pub mod error;
pub mod fault;
pub mod id;
pub mod marker;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_call, encode_exception, encode_frame, encode_result,
    validate_method_name, Frame, FrameConfig, DEFAULT_MAX_LINE_LENGTH,
};
pub use error::{FrameError, Result};
pub use fault::Fault;
pub use id::{CorrelationId, IdGenerator, ID_LEN};
pub use reader::FrameReader;
pub use writer::FrameWriter;
