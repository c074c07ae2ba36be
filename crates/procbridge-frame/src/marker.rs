//! Marker bytes.
//!
//! A marker opens every frame line except the terminating newline. Markers
//! are ASCII control bytes, which JSON text always escapes, so they never
//! appear inside a serialized value.

/// Separates fields inside a line; also tolerated as padding between frames.
pub const SPACER: u8 = 0x00;

/// Opens a call frame.
pub const CALL: u8 = 0x01;

/// Opens one argument line of a call frame.
pub const PARAM_START: u8 = 0x02;

/// Opens a result frame.
pub const RESULT: u8 = 0x03;

/// Opens an exception frame.
pub const EXCEPTION: u8 = 0x04;

/// Terminates every line.
pub const LINE_END: u8 = b'\n';
