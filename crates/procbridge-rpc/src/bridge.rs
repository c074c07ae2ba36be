//! Bridge lifecycle: opening the transport, connection waits and teardown.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use procbridge_frame::{FrameConfig, FrameReader, FrameWriter};
use procbridge_transport::{ConnectionDescriptor, DuplexTransport};
#[cfg(unix)]
use procbridge_transport::{PipeClient, PipeServer};
use tokio::io::AsyncWrite;
use tokio::runtime::Handle;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::config::BridgeConfig;
use crate::correlation::{CorrelationTable, Reply};
use crate::dispatcher::{Dispatcher, LinkStatus, Shared};
use crate::error::{BridgeError, Result};
use crate::receiver::ReceiveLoop;
use crate::registry::Registry;
use crate::service::{Proxy, Service};
use crate::stats::{BridgeStats, StatsCounters};

/// One end of a bridge.
///
/// Owns the transport halves (inside its connection task), the correlation
/// table, the registry served to the peer and the cancellation token every
/// wait observes. Dropping a bridge cancels it; [`Bridge::dispose`]
/// additionally waits for its tasks to finish.
pub struct Bridge {
    shared: Arc<Shared>,
    tracker: TaskTracker,
    config: BridgeConfig,
    transport: &'static str,
}

impl Bridge {
    /// Start a bridge over `transport`, serving `registry` to the peer.
    ///
    /// Returns immediately; the transport halves open in the background. Must
    /// be called within a Tokio runtime, whose handle is also used by the
    /// blocking dispatcher calls.
    pub fn start<T: DuplexTransport>(
        transport: T,
        registry: Registry,
        config: BridgeConfig,
    ) -> Result<Self> {
        let runtime = current_runtime()?;
        let cancel = config
            .parent
            .as_ref()
            .map(CancellationToken::child_token)
            .unwrap_or_default();
        let shared = Arc::new(Shared {
            writer: Mutex::new(None),
            table: CorrelationTable::new(),
            link_closed: cancel.child_token(),
            cancel,
            runtime: runtime.clone(),
            call_timeout: config.call_timeout,
            stats: StatsCounters::default(),
            status: watch::Sender::new(LinkStatus::default()),
        });

        let name = transport.transport_name();
        debug!(transport = name, methods = registry.len(), "starting bridge");

        let tracker = TaskTracker::new();
        tracker.spawn_on(
            run_link(
                transport,
                registry,
                Arc::clone(&shared),
                tracker.clone(),
                config.frame.clone(),
            ),
            &runtime,
        );

        Ok(Self {
            shared,
            tracker,
            config,
            transport: name,
        })
    }

    /// Wait until both halves are open.
    ///
    /// Waits `timeout`, or the configured connect timeout when `None`. On
    /// timeout returns `Err(ConnectionFailed)` if `throw_on_timeout`,
    /// otherwise `Ok(false)`.
    pub async fn wait_for_connection(
        &self,
        timeout: Option<Duration>,
        throw_on_timeout: bool,
    ) -> Result<bool> {
        let limit = timeout.unwrap_or(self.config.connect_timeout);
        let mut status = self.shared.status.subscribe();
        let settled = async move {
            status
                .wait_for(|status| status.is_connected() || status.closed)
                .await
                .map(|status| *status)
        };

        let waited = tokio::select! {
            biased;
            _ = self.shared.cancel.cancelled() => return Err(BridgeError::Cancelled),
            waited = tokio::time::timeout(limit, settled) => waited,
        };
        match waited {
            Ok(Ok(status)) if status.is_connected() => Ok(true),
            Ok(_) => Err(BridgeError::ConnectionFailed(
                "link closed before connecting".to_string(),
            )),
            Err(_) if throw_on_timeout => Err(BridgeError::ConnectionFailed(format!(
                "peer did not connect within {limit:?}"
            ))),
            Err(_) => Ok(false),
        }
    }

    /// Wait until the link has closed: the peer went away, the stream
    /// failed, or the bridge was cancelled.
    pub async fn closed(&self) {
        let mut status = self.shared.status.subscribe();
        let _ = status.wait_for(|status| status.closed).await;
    }

    /// Whether both halves are currently open.
    pub fn connection_successful(&self) -> bool {
        self.shared.status.borrow().is_connected()
    }

    pub fn ensure_connected(&self) -> Result<()> {
        if self.connection_successful() {
            Ok(())
        } else {
            Err(self.shared.unavailable())
        }
    }

    /// Dispatcher for calls to `interface` on the peer.
    pub fn dispatcher(&self, interface: &str) -> Dispatcher {
        Dispatcher::new(Arc::clone(&self.shared), interface)
    }

    /// Typed proxy for the peer's `P::INTERFACE`.
    pub fn proxy<P: Proxy>(&self) -> P {
        P::bind(self.dispatcher(P::INTERFACE))
    }

    pub fn stats(&self) -> BridgeStats {
        self.shared.stats.snapshot(self.shared.table.len())
    }

    /// Token cancelled when the bridge is disposed or dropped. Cancelling it
    /// tears the bridge down.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport
    }

    /// Cancel every wait, then wait for the connection task and all running
    /// handlers to finish. The transport halves are closed on return.
    /// Calling it again is a no-op.
    pub async fn dispose(&self) {
        self.shared.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        debug!(transport = self.transport, "bridge disposed");
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("transport", &self.transport)
            .field("status", &*self.shared.status.borrow())
            .finish()
    }
}

fn current_runtime() -> Result<Handle> {
    Handle::try_current().map_err(|e| BridgeError::NoRuntime(e.to_string()))
}

async fn run_link<T: DuplexTransport>(
    mut transport: T,
    registry: Registry,
    shared: Arc<Shared>,
    tracker: TaskTracker,
    frame: FrameConfig,
) {
    let name = transport.transport_name();
    let inbound = tokio::select! {
        biased;
        _ = shared.cancel.cancelled() => {
            debug!(transport = name, "cancelled while connecting");
            None
        }
        opened = open_link(&mut transport, &shared, &frame) => match opened {
            Ok(inbound) => Some(inbound),
            Err(err) => {
                error!(transport = name, error = %err, "failed to open transport");
                None
            }
        },
    };

    if let Some(inbound) = inbound {
        info!(transport = name, "bridge connected");
        ReceiveLoop {
            reader: FrameReader::with_config(inbound, frame),
            registry,
            shared: Arc::clone(&shared),
            tracker,
        }
        .run()
        .await;
    }

    shared.status.send_replace(LinkStatus {
        inbound: false,
        outbound: false,
        closed: true,
    });
    // Releases the outbound lock if a send is stuck on a peer that stopped reading.
    shared.link_closed.cancel();
    if let Some(mut writer) = shared.writer.lock().await.take() {
        let _ = writer.shutdown().await;
    }
    let failed = shared.table.fail_all(|| Reply::Closed);
    debug!(transport = name, failed, "bridge link closed");
}

/// Open the outbound half, then the inbound half, publishing each as it opens.
async fn open_link<T: DuplexTransport>(
    transport: &mut T,
    shared: &Shared,
    frame: &FrameConfig,
) -> Result<T::Inbound> {
    let outbound: Box<dyn AsyncWrite + Send + Unpin> = Box::new(transport.open_outbound().await?);
    *shared.writer.lock().await = Some(FrameWriter::with_config(outbound, frame.clone()));
    shared.status.send_modify(|status| status.outbound = true);
    debug!("outbound half open");

    let inbound = transport.open_inbound().await?;
    shared.status.send_modify(|status| status.inbound = true);
    debug!("inbound half open");
    Ok(inbound)
}

/// The serving end of a bridge, created by [`create_server`].
#[derive(Debug)]
pub struct Server {
    bridge: Bridge,
    descriptor: ConnectionDescriptor,
}

impl Server {
    /// Descriptor the peer connects with.
    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }
}

impl Deref for Server {
    type Target = Bridge;

    fn deref(&self) -> &Bridge {
        &self.bridge
    }
}

/// The calling end of a bridge.
#[derive(Debug)]
pub struct Client<P> {
    bridge: Bridge,
    proxy: P,
}

impl<P: Proxy> Client<P> {
    /// Wrap a started bridge, binding `P` to it.
    pub fn new(bridge: Bridge) -> Self {
        let proxy = bridge.proxy::<P>();
        Self { bridge, proxy }
    }

    /// The typed proxy for the peer's service.
    pub fn dispatch(&self) -> &P {
        &self.proxy
    }
}

impl<P> Deref for Client<P> {
    type Target = Bridge;

    fn deref(&self) -> &Bridge {
        &self.bridge
    }
}

/// Serve `handler` on a fresh socket pair with the default configuration.
///
/// Returns the server and the single-use descriptor to hand to the peer
/// process.
#[cfg(unix)]
pub fn create_server<S: Service>(handler: Arc<S>) -> Result<(Server, ConnectionDescriptor)> {
    create_server_with_config(handler, BridgeConfig::default())
}

#[cfg(unix)]
pub fn create_server_with_config<S: Service>(
    handler: Arc<S>,
    config: BridgeConfig,
) -> Result<(Server, ConnectionDescriptor)> {
    current_runtime()?;
    let registry = Registry::for_service(handler)?;
    let transport = match &config.socket_dir {
        Some(dir) => PipeServer::bind_under(dir)?,
        None => PipeServer::bind()?,
    };
    let descriptor = transport.descriptor().clone();
    let bridge = Bridge::start(transport, registry, config)?;
    info!(%descriptor, interface = S::INTERFACE, "bridge server listening");

    let server = Server {
        bridge,
        descriptor: descriptor.clone(),
    };
    Ok((server, descriptor))
}

/// Connect to the server behind `descriptor` with the default configuration.
#[cfg(unix)]
pub fn create_client<P: Proxy>(descriptor: &ConnectionDescriptor) -> Result<Client<P>> {
    create_client_with_config(descriptor, BridgeConfig::default())
}

#[cfg(unix)]
pub fn create_client_with_config<P: Proxy>(
    descriptor: &ConnectionDescriptor,
    config: BridgeConfig,
) -> Result<Client<P>> {
    let transport =
        PipeClient::new(descriptor.clone()).with_retry_interval(config.connect_retry_interval);
    let bridge = Bridge::start(transport, Registry::empty(), config)?;
    Ok(Client::new(bridge))
}
