//! Caller side: turns method invocations into call frames and waits for replies.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use procbridge_frame::{Frame, FrameWriter};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::AsyncWrite;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::args::ArgList;
use crate::correlation::{CorrelationTable, Reply, SlotGuard};
use crate::error::{BridgeError, Result};
use crate::registry::{method_key, CallingConvention};
use crate::stats::StatsCounters;

pub(crate) type BoxedWriter = FrameWriter<Box<dyn AsyncWrite + Send + Unpin>>;

/// Connectivity of the two transport halves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct LinkStatus {
    pub(crate) inbound: bool,
    pub(crate) outbound: bool,
    /// The connection task has ended; the link will not (re)connect.
    pub(crate) closed: bool,
}

impl LinkStatus {
    pub(crate) fn is_connected(&self) -> bool {
        self.inbound && self.outbound
    }
}

/// State shared by a bridge, its dispatchers and its receive loop.
pub(crate) struct Shared {
    pub(crate) writer: Mutex<Option<BoxedWriter>>,
    pub(crate) table: CorrelationTable,
    pub(crate) cancel: CancellationToken,
    /// Child of `cancel`, also fired by teardown when the link closes on its own.
    pub(crate) link_closed: CancellationToken,
    pub(crate) runtime: Handle,
    pub(crate) call_timeout: Option<Duration>,
    pub(crate) stats: StatsCounters,
    pub(crate) status: watch::Sender<LinkStatus>,
}

impl Shared {
    /// Write one frame under the outbound lock.
    ///
    /// Both taking the lock and the write itself give way to cancellation
    /// and to the link closing. A frame cut short this way is never
    /// followed by another one on the same link.
    pub(crate) async fn send(&self, frame: &Frame) -> Result<()> {
        let mut writer = tokio::select! {
            biased;
            _ = self.link_closed.cancelled() => return Err(self.interrupted()),
            writer = self.writer.lock() => writer,
        };
        let Some(writer) = writer.as_mut() else {
            return Err(self.unavailable());
        };
        tokio::select! {
            biased;
            _ = self.link_closed.cancelled() => Err(self.interrupted()),
            written = writer.write_frame(frame) => Ok(written?),
        }
    }

    /// Error for a send abandoned because the link is going away.
    fn interrupted(&self) -> BridgeError {
        if self.cancel.is_cancelled() {
            BridgeError::Cancelled
        } else {
            BridgeError::Disconnected
        }
    }

    /// Error for a frame that cannot be written: the link either has not
    /// opened yet or has already closed.
    pub(crate) fn unavailable(&self) -> BridgeError {
        if self.status.borrow().closed {
            BridgeError::Disconnected
        } else {
            BridgeError::NotConnected
        }
    }
}

/// Issues calls to one interface of the peer.
///
/// Cheap to clone. `call` and `notify` block the calling thread and must not
/// be used from async code (use a plain thread or `spawn_blocking`); the
/// deferred variants are async.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
    interface: Arc<str>,
}

impl Dispatcher {
    pub(crate) fn new(shared: Arc<Shared>, interface: &str) -> Self {
        Self {
            shared,
            interface: Arc::from(interface),
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Call a synchronous method and block until its value arrives.
    pub fn call<A, R>(&self, method: &str, args: A) -> Result<R>
    where
        A: ArgList,
        R: DeserializeOwned,
    {
        let value = self
            .shared
            .runtime
            .block_on(self.invoke(method, CallingConvention::Value, args))?;
        decode_value(value)
    }

    /// Send a fire-and-forget call. Returns once the frame is written.
    pub fn notify<A: ArgList>(&self, method: &str, args: A) -> Result<()> {
        self.shared
            .runtime
            .block_on(self.invoke(method, CallingConvention::Void, args))
            .map(|_| ())
    }

    /// Call an async method and await its value.
    pub async fn call_deferred<A, R>(&self, method: &str, args: A) -> Result<R>
    where
        A: ArgList,
        R: DeserializeOwned,
    {
        let value = self
            .invoke(method, CallingConvention::DeferredValue, args)
            .await?;
        decode_value(value)
    }

    /// Call an async method and await its completion.
    pub async fn call_deferred_void<A: ArgList>(&self, method: &str, args: A) -> Result<()> {
        self.invoke(method, CallingConvention::DeferredVoid, args)
            .await
            .map(|_| ())
    }

    async fn invoke<A: ArgList>(
        &self,
        method: &str,
        convention: CallingConvention,
        args: A,
    ) -> Result<Option<Value>> {
        let args = args.into_values()?;
        self.perform_call(method, convention, args).await
    }

    /// Write a call frame for `method` and, unless the convention is
    /// [`CallingConvention::Void`], wait for the matching reply.
    ///
    /// The pending slot is released on every exit path, including the
    /// returned future being dropped.
    pub async fn perform_call(
        &self,
        method: &str,
        convention: CallingConvention,
        args: Vec<Value>,
    ) -> Result<Option<Value>> {
        if self.shared.cancel.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }

        let key = method_key(&self.interface, method);
        let (id, reply) = self.shared.table.register();
        let _slot = SlotGuard::new(&self.shared.table, id);
        // Teardown marks the link closed before failing pending slots.
        if self.shared.status.borrow().closed {
            return Err(BridgeError::Disconnected);
        }

        trace!(%id, method = %key, ?convention, "dispatching call");
        self.shared
            .send(&Frame::Call {
                id,
                method: key,
                args,
            })
            .await?;

        if !convention.expects_reply() {
            return Ok(None);
        }

        let reply = tokio::select! {
            biased;
            _ = self.shared.cancel.cancelled() => return Err(BridgeError::Cancelled),
            reply = wait_reply(reply, self.shared.call_timeout) => reply?,
        };
        match reply {
            Reply::Value(value) => Ok(value),
            Reply::Fault(fault) => Err(BridgeError::Remote(fault)),
            Reply::Protocol(reason) => Err(BridgeError::Protocol(reason)),
            Reply::Closed => Err(BridgeError::Disconnected),
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("interface", &self.interface)
            .finish()
    }
}

async fn wait_reply(reply: oneshot::Receiver<Reply>, timeout: Option<Duration>) -> Result<Reply> {
    let received = match timeout {
        Some(limit) => tokio::time::timeout(limit, reply)
            .await
            .map_err(|_| BridgeError::Timeout(limit))?,
        None => reply.await,
    };
    received.map_err(|_| BridgeError::Disconnected)
}

fn decode_value<R: DeserializeOwned>(value: Option<Value>) -> Result<R> {
    Ok(serde_json::from_value(value.unwrap_or(Value::Null))?)
}
