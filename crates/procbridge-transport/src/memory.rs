//! In-process transport built on `tokio::io::duplex`.

use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

use crate::error::{Result, TransportError};
use crate::traits::DuplexTransport;

/// Default buffer capacity of each in-memory direction.
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

/// One side of an in-memory transport pair.
#[derive(Debug)]
pub struct MemoryTransport {
    inbound: Option<ReadHalf<DuplexStream>>,
    outbound: Option<WriteHalf<DuplexStream>>,
    connected: bool,
}

/// Create two connected in-memory transports; what one side writes the other reads.
pub fn memory_pair(capacity: usize) -> (MemoryTransport, MemoryTransport) {
    let (left, right) = tokio::io::duplex(capacity);
    let (left_read, left_write) = tokio::io::split(left);
    let (right_read, right_write) = tokio::io::split(right);
    (
        MemoryTransport {
            inbound: Some(left_read),
            outbound: Some(left_write),
            connected: true,
        },
        MemoryTransport {
            inbound: Some(right_read),
            outbound: Some(right_write),
            connected: true,
        },
    )
}

impl MemoryTransport {
    /// A transport whose peer never shows up: opening either half waits forever.
    pub fn unconnected() -> Self {
        Self {
            inbound: None,
            outbound: None,
            connected: false,
        }
    }
}

impl DuplexTransport for MemoryTransport {
    type Inbound = ReadHalf<DuplexStream>;
    type Outbound = WriteHalf<DuplexStream>;

    async fn open_inbound(&mut self) -> Result<Self::Inbound> {
        if !self.connected {
            return std::future::pending().await;
        }
        self.inbound
            .take()
            .ok_or(TransportError::AlreadyOpened("inbound"))
    }

    async fn open_outbound(&mut self) -> Result<Self::Outbound> {
        if !self.connected {
            return std::future::pending().await;
        }
        self.outbound
            .take()
            .ok_or(TransportError::AlreadyOpened("outbound"))
    }

    fn transport_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn pair_is_crossed() {
        let (mut left, mut right) = memory_pair(DEFAULT_CAPACITY);

        let mut left_out = left.open_outbound().await.unwrap();
        let mut right_in = right.open_inbound().await.unwrap();
        left_out.write_all(b"abc").await.unwrap();

        let mut buf = [0u8; 3];
        right_in.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"abc");
    }

    #[tokio::test]
    async fn halves_open_once() {
        let (mut left, _right) = memory_pair(DEFAULT_CAPACITY);
        left.open_inbound().await.unwrap();
        let again = left.open_inbound().await;
        assert!(matches!(again, Err(TransportError::AlreadyOpened("inbound"))));
    }

    #[tokio::test]
    async fn unconnected_never_opens() {
        let mut transport = MemoryTransport::unconnected();
        let open = tokio::time::timeout(Duration::from_millis(20), transport.open_outbound()).await;
        assert!(open.is_err(), "opening an unconnected transport must not complete");
    }
}
