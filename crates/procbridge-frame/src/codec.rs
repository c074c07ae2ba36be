use bytes::{Buf, BufMut, BytesMut};
use serde_json::Value;
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::fault::Fault;
use crate::id::{CorrelationId, ID_LEN};
use crate::marker::{CALL, EXCEPTION, LINE_END, PARAM_START, RESULT, SPACER};

/// Default upper bound on a single buffered line (16 MiB).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// Frame codec configuration.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum bytes a line may occupy before its terminator.
    pub max_line_length: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

/// One decoded protocol frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A request to run `method` with JSON `args`.
    Call {
        id: CorrelationId,
        method: String,
        args: Vec<Value>,
    },
    /// Successful completion. `value` is `None` for a void result.
    Result {
        id: CorrelationId,
        value: Option<Value>,
    },
    /// The handler failed.
    Exception { id: CorrelationId, fault: Fault },
}

impl Frame {
    pub fn id(&self) -> CorrelationId {
        match self {
            Frame::Call { id, .. } | Frame::Result { id, .. } | Frame::Exception { id, .. } => *id,
        }
    }

    /// Variant name for logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Frame::Call { .. } => "call",
            Frame::Result { .. } => "result",
            Frame::Exception { .. } => "exception",
        }
    }
}

/// Check that a method name fits on a call header line.
pub fn validate_method_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name
            .bytes()
            .any(|b| matches!(b, LINE_END | b'\r' | SPACER..=EXCEPTION));
    if valid {
        Ok(())
    } else {
        Err(FrameError::InvalidMethodName(name.to_string()))
    }
}

fn put_id(id: CorrelationId, dst: &mut BytesMut) {
    dst.put_slice(id.to_string().as_bytes());
}

fn put_json(value: &Value, dst: &mut BytesMut) -> Result<()> {
    serde_json::to_writer(dst.writer(), value)?;
    Ok(())
}

/// Encode a call frame: the header line, then one parameter line per argument.
pub fn encode_call(
    id: CorrelationId,
    method: &str,
    args: &[Value],
    dst: &mut BytesMut,
) -> Result<()> {
    validate_method_name(method)?;
    dst.put_u8(CALL);
    put_id(id, dst);
    dst.put_slice(method.as_bytes());
    dst.put_u8(LINE_END);
    for arg in args {
        dst.put_u8(PARAM_START);
        put_json(arg, dst)?;
        dst.put_u8(LINE_END);
    }
    Ok(())
}

/// Encode a result frame. `None` encodes a void result (empty value field).
pub fn encode_result(id: CorrelationId, value: Option<&Value>, dst: &mut BytesMut) -> Result<()> {
    dst.put_u8(RESULT);
    put_id(id, dst);
    dst.put_u8(SPACER);
    if let Some(value) = value {
        put_json(value, dst)?;
    }
    dst.put_u8(LINE_END);
    Ok(())
}

/// Encode an exception frame carrying `fault`.
pub fn encode_exception(id: CorrelationId, fault: &Fault, dst: &mut BytesMut) -> Result<()> {
    let state = fault.encode_state()?;
    dst.put_u8(EXCEPTION);
    put_id(id, dst);
    dst.put_u8(SPACER);
    dst.put_slice(fault.kind().as_bytes());
    dst.put_u8(SPACER);
    dst.put_slice(&state);
    dst.put_u8(LINE_END);
    Ok(())
}

/// Encode any frame into `dst`.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    match frame {
        Frame::Call { id, method, args } => encode_call(*id, method, args, dst),
        Frame::Result { id, value } => encode_result(*id, value.as_ref(), dst),
        Frame::Exception { id, fault } => encode_exception(*id, fault, dst),
    }
}

/// Try to decode one frame from the front of `src`.
///
/// Returns `Ok(None)` without consuming anything if the frame is not complete
/// yet. `arity` maps a method name to the number of parameter lines its call
/// frames carry; `None` marks an unknown method, whose call is returned with
/// no arguments after consuming only its header line.
///
/// Spacer bytes between frames and parameter lines outside a call are
/// skipped. [`FrameError::LineTooLong`] consumes nothing; the caller drops
/// bytes up to the next line terminator. Any other error consumes the
/// offending frame so decoding can resume at the next one.
pub fn decode_frame<A>(src: &mut BytesMut, arity: A, max_line_length: usize) -> Result<Option<Frame>>
where
    A: Fn(&str) -> Option<usize>,
{
    loop {
        let padding = src.iter().take_while(|&&b| b == SPACER).count();
        src.advance(padding);

        let Some(&marker) = src.first() else {
            return Ok(None);
        };
        let Some(line_end) = find_line_end(src, 0, max_line_length)? else {
            return Ok(None);
        };

        match marker {
            PARAM_START => {
                trace!(len = line_end, "skipping parameter line outside a call");
                src.advance(line_end + 1);
            }
            CALL => return decode_call(src, line_end, &arity, max_line_length),
            RESULT => {
                let line = src.split_to(line_end + 1);
                return decode_result(&line[1..line_end]).map(Some);
            }
            EXCEPTION => {
                let line = src.split_to(line_end + 1);
                return decode_exception(&line[1..line_end]).map(Some);
            }
            other => {
                src.advance(line_end + 1);
                return Err(FrameError::UnexpectedMarker(other));
            }
        }
    }
}

/// Index of the next line terminator at or after `from`.
fn find_line_end(src: &[u8], from: usize, max_line_length: usize) -> Result<Option<usize>> {
    let pending = &src[from..];
    match pending.iter().position(|&b| b == LINE_END) {
        Some(offset) if offset <= max_line_length => Ok(Some(from + offset)),
        Some(offset) => Err(FrameError::LineTooLong {
            len: offset,
            max: max_line_length,
        }),
        None if pending.len() > max_line_length => Err(FrameError::LineTooLong {
            len: pending.len(),
            max: max_line_length,
        }),
        None => Ok(None),
    }
}

fn parse_id(field: &[u8]) -> Result<CorrelationId> {
    let digits = &field[..field.len().min(ID_LEN)];
    CorrelationId::parse(digits)
        .ok_or_else(|| FrameError::InvalidId(String::from_utf8_lossy(digits).into_owned()))
}

fn decode_call<A>(
    src: &mut BytesMut,
    header_end: usize,
    arity: &A,
    max_line_length: usize,
) -> Result<Option<Frame>>
where
    A: Fn(&str) -> Option<usize>,
{
    let header = &src[1..header_end];
    let id = match parse_id(header) {
        Ok(id) => id,
        Err(err) => {
            src.advance(header_end + 1);
            return Err(err);
        }
    };
    let method = match std::str::from_utf8(&header[ID_LEN..]) {
        Ok(name) if !name.is_empty() => name.to_string(),
        _ => {
            let method = String::from_utf8_lossy(&header[ID_LEN..]).into_owned();
            src.advance(header_end + 1);
            return Err(FrameError::MalformedCall {
                id,
                method,
                reason: "method name is empty or not UTF-8".to_string(),
            });
        }
    };

    let Some(expected) = arity(&method) else {
        src.advance(header_end + 1);
        return Ok(Some(Frame::Call {
            id,
            method,
            args: Vec::new(),
        }));
    };

    let mut spans = Vec::with_capacity(expected);
    let mut pos = header_end + 1;
    for found in 0..expected {
        let Some(&next) = src.get(pos) else {
            return Ok(None);
        };
        if next != PARAM_START {
            src.advance(pos);
            return Err(FrameError::MalformedCall {
                id,
                method,
                reason: format!("expected {expected} parameters, found {found}"),
            });
        }
        let Some(end) = find_line_end(src, pos, max_line_length)? else {
            return Ok(None);
        };
        spans.push(pos + 1..end);
        pos = end + 1;
    }

    let frame = src.split_to(pos);
    let mut args = Vec::with_capacity(expected);
    for (index, span) in spans.into_iter().enumerate() {
        let value = serde_json::from_slice(&frame[span]).map_err(|e| FrameError::MalformedCall {
            id,
            method: method.clone(),
            reason: format!("parameter {index}: {e}"),
        })?;
        args.push(value);
    }
    Ok(Some(Frame::Call { id, method, args }))
}

fn decode_result(body: &[u8]) -> Result<Frame> {
    let id = parse_id(body)?;
    let rest = &body[ID_LEN..];
    if rest.first() != Some(&SPACER) {
        return Err(FrameError::MalformedReply {
            id,
            reason: "missing spacer after id".to_string(),
        });
    }
    let text = &rest[1..];
    if text.is_empty() {
        return Ok(Frame::Result { id, value: None });
    }
    let value = serde_json::from_slice(text).map_err(|e| FrameError::MalformedReply {
        id,
        reason: e.to_string(),
    })?;
    Ok(Frame::Result {
        id,
        value: Some(value),
    })
}

fn decode_exception(body: &[u8]) -> Result<Frame> {
    let id = parse_id(body)?;
    let rest = &body[ID_LEN..];
    let undecodable = |reason: &str| FrameError::UndecodableFault {
        id,
        reason: reason.to_string(),
    };
    if rest.first() != Some(&SPACER) {
        return Err(undecodable("missing spacer after id"));
    }
    let rest = &rest[1..];
    let split = rest
        .iter()
        .position(|&b| b == SPACER)
        .ok_or_else(|| undecodable("missing spacer after kind"))?;
    let fault = Fault::decode(&rest[..split], &rest[split + 1..])
        .map_err(|reason| undecodable(&reason))?;
    Ok(Frame::Exception { id, fault })
}
