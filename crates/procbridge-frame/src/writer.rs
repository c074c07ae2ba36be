use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::codec::{encode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::marker::LINE_END;

/// Writes frames to an async byte stream.
///
/// Each frame is encoded completely and handed to the stream in a single
/// `write_all`, so frames from one writer never interleave. Callers sharing a
/// writer serialize access to it (the bridge holds it behind a mutex).
pub struct FrameWriter<W> {
    inner: W,
    buf: BytesMut,
    config: FrameConfig,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: W, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::new(),
            config,
        }
    }

    /// Encode and send one frame, then flush.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.buf.clear();
        encode_frame(frame, &mut self.buf)?;

        let max = self.config.max_line_length;
        if let Some(len) = self.buf[..]
            .split(|&b| b == LINE_END)
            .map(<[u8]>::len)
            .find(|&len| len > max)
        {
            return Err(FrameError::LineTooLong { len, max });
        }

        self.inner.write_all(&self.buf).await.map_err(map_io)?;
        self.inner.flush().await.map_err(map_io)?;
        trace!(kind = frame.kind_name(), id = %frame.id(), len = self.buf.len(), "wrote frame");
        Ok(())
    }

    /// Shut down the underlying stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await.map_err(map_io)
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

fn map_io(err: std::io::Error) -> FrameError {
    match err.kind() {
        std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::WriteZero => FrameError::ConnectionClosed,
        _ => FrameError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::codec::FrameConfig;
    use crate::fault::Fault;
    use crate::id::CorrelationId;
    use crate::reader::FrameReader;

    #[tokio::test]
    async fn writer_and_reader_agree() {
        let (a, b) = tokio::io::duplex(4096);
        let mut writer = FrameWriter::new(a);
        let mut reader = FrameReader::new(b);

        let frames = vec![
            Frame::Call {
                id: CorrelationId::new(10),
                method: "Example.append_guid".into(),
                args: vec![json!("This is a test")],
            },
            Frame::Result {
                id: CorrelationId::new(11),
                value: Some(json!({"n": 420})),
            },
            Frame::Exception {
                id: CorrelationId::new(12),
                fault: Fault::new("AccessViolation", "This is a test"),
            },
        ];
        for frame in &frames {
            writer.write_frame(frame).await.unwrap();
        }
        for expected in &frames {
            let frame = reader
                .read_frame(|m: &str| (m == "Example.append_guid").then_some(1))
                .await
                .unwrap();
            assert_eq!(&frame, expected);
        }
    }

    #[tokio::test]
    async fn rejects_line_over_limit() {
        let (a, _b) = tokio::io::duplex(4096);
        let mut writer = FrameWriter::with_config(
            a,
            FrameConfig {
                max_line_length: 8,
            },
        );
        let err = writer
            .write_frame(&Frame::Result {
                id: CorrelationId::new(1),
                value: Some(json!("far too long for the limit")),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::LineTooLong { max: 8, .. }));
    }

    #[tokio::test]
    async fn closed_peer_is_connection_closed() {
        let (a, b) = tokio::io::duplex(16);
        drop(b);
        let mut writer = FrameWriter::new(a);
        let err = writer
            .write_frame(&Frame::Result {
                id: CorrelationId::new(1),
                value: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }
}
