use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{trace, warn};

use crate::codec::{decode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::marker::LINE_END;

const READ_CHUNK: usize = 8 * 1024;

/// Reads frames from an async byte stream.
///
/// `read_frame` is cancellation safe: bytes already read stay buffered for
/// the next call.
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    config: FrameConfig,
    /// Set after an oversized line; bytes are dropped up to the next newline.
    discarding: bool,
    /// Prefix of `buf` already searched for a line terminator.
    scanned: usize,
    /// Start of the unterminated line at the end of `buf`.
    tail_start: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: R, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK),
            config,
            discarding: false,
            scanned: 0,
            tail_start: 0,
        }
    }

    /// Read the next frame.
    ///
    /// `arity` resolves a method name to its parameter count (see
    /// [`decode_frame`]). Decode errors are returned after the bad frame was
    /// consumed, so the caller may keep reading. End of stream yields
    /// [`FrameError::ConnectionClosed`].
    pub async fn read_frame<A>(&mut self, arity: A) -> Result<Frame>
    where
        A: Fn(&str) -> Option<usize>,
    {
        loop {
            if self.discarding {
                self.skip_to_line_end();
            }
            if !self.discarding && self.has_new_line() {
                let before = self.buf.len();
                let decoded = decode_frame(&mut self.buf, &arity, self.config.max_line_length);
                if self.buf.len() != before {
                    self.reset_scan();
                }
                match decoded {
                    Ok(Some(frame)) => {
                        trace!(kind = frame.kind_name(), id = %frame.id(), "read frame");
                        return Ok(frame);
                    }
                    Ok(None) => {}
                    Err(err @ FrameError::LineTooLong { .. }) => {
                        warn!(error = %err, "dropping oversized line");
                        self.discarding = true;
                        return Err(err);
                    }
                    Err(err) => return Err(err),
                }
            }

            self.buf.reserve(READ_CHUNK);
            match self.inner.read_buf(&mut self.buf).await {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(_) => {}
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Whether bytes read since the last decode attempt can change its
    /// outcome: they complete a line, or the unterminated tail outgrew the
    /// line limit. Only unsearched bytes are scanned.
    fn has_new_line(&mut self) -> bool {
        let from = self.scanned.min(self.buf.len());
        let terminator = self.buf[from..].iter().rposition(|&b| b == LINE_END);
        self.scanned = self.buf.len();
        match terminator {
            Some(offset) => {
                self.tail_start = from + offset + 1;
                true
            }
            None => {
                let tail = self.buf.len() - self.tail_start.min(self.buf.len());
                tail > self.config.max_line_length
            }
        }
    }

    fn reset_scan(&mut self) {
        self.scanned = 0;
        self.tail_start = 0;
    }

    fn skip_to_line_end(&mut self) {
        self.reset_scan();
        match self.buf.iter().position(|&b| b == LINE_END) {
            Some(pos) => {
                self.buf.advance(pos + 1);
                self.discarding = false;
            }
            None => self.buf.clear(),
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use serde_json::json;
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::codec::{encode_call, encode_result};
    use crate::id::CorrelationId;

    fn no_methods(_: &str) -> Option<usize> {
        None
    }

    #[tokio::test]
    async fn reads_frames_split_across_writes() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(client);

        let mut bytes = BytesMut::new();
        encode_call(
            CorrelationId::new(1),
            "Example.add",
            &[json!(1), json!(2)],
            &mut bytes,
        )
        .unwrap();
        let writer = tokio::spawn(async move {
            for chunk in bytes.chunks(3) {
                server.write_all(chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
            server
        });

        let frame = reader
            .read_frame(|m: &str| (m == "Example.add").then_some(2))
            .await
            .unwrap();
        assert_eq!(
            frame,
            Frame::Call {
                id: CorrelationId::new(1),
                method: "Example.add".into(),
                args: vec![json!(1), json!(2)],
            }
        );
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn decodes_only_when_a_line_completes() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(client);

        let mut bytes = BytesMut::new();
        let long = "x".repeat(4096);
        encode_call(CorrelationId::new(4), "Example.echo", &[json!(long)], &mut bytes).unwrap();
        let writer = tokio::spawn(async move {
            for chunk in bytes.chunks(7) {
                server.write_all(chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
            server
        });

        let resolved = std::cell::Cell::new(0usize);
        let frame = reader
            .read_frame(|m: &str| {
                resolved.set(resolved.get() + 1);
                (m == "Example.echo").then_some(1)
            })
            .await
            .unwrap();
        assert_eq!(frame.id(), CorrelationId::new(4));
        // Once for the header line, once more when the parameter line ends.
        assert!(resolved.get() <= 2, "decoded {} times", resolved.get());
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn eof_is_connection_closed() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let mut reader = FrameReader::new(client);
        let err = reader.read_frame(no_methods).await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn recovers_after_bad_frame() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut reader = FrameReader::new(client);

        let mut bytes = BytesMut::from(&b"\x09garbage\n"[..]);
        encode_result(CorrelationId::new(2), Some(&json!("ok")), &mut bytes).unwrap();
        server.write_all(&bytes).await.unwrap();

        let err = reader.read_frame(no_methods).await.unwrap_err();
        assert!(err.is_recoverable());
        let frame = reader.read_frame(no_methods).await.unwrap();
        assert_eq!(frame.id(), CorrelationId::new(2));
    }

    #[tokio::test]
    async fn oversized_line_is_skipped() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut reader = FrameReader::with_config(
            client,
            FrameConfig {
                max_line_length: 16,
            },
        );

        let mut bytes = BytesMut::new();
        bytes.extend_from_slice(b"\x030000000000001\x00\"");
        bytes.extend_from_slice(&[b'a'; 64]);
        bytes.extend_from_slice(b"\"\n");
        encode_result(CorrelationId::new(3), None, &mut bytes).unwrap();
        server.write_all(&bytes).await.unwrap();

        let err = reader.read_frame(no_methods).await.unwrap_err();
        assert!(matches!(err, FrameError::LineTooLong { .. }));
        let frame = reader.read_frame(no_methods).await.unwrap();
        assert_eq!(
            frame,
            Frame::Result {
                id: CorrelationId::new(3),
                value: None
            }
        );
    }
}
