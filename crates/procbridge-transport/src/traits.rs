use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// Two independent, ordered, one-directional byte streams.
///
/// A bridge opens the outbound half (the stream it writes frames to) and the
/// inbound half (the stream it reads frames from) exactly once each. Opening
/// may wait for the peer, e.g. a server half waits for the peer process to
/// connect; callers race these futures against their own cancellation.
///
/// Closing a half is dropping it.
pub trait DuplexTransport: Send + 'static {
    /// Stream this side reads frames from.
    type Inbound: AsyncRead + Send + Unpin + 'static;
    /// Stream this side writes frames to.
    type Outbound: AsyncWrite + Send + Unpin + 'static;

    /// Open the inbound half, waiting for the peer if needed.
    fn open_inbound(&mut self) -> impl Future<Output = Result<Self::Inbound>> + Send + '_;

    /// Open the outbound half, waiting for the peer if needed.
    fn open_outbound(&mut self) -> impl Future<Output = Result<Self::Outbound>> + Send + '_;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}
