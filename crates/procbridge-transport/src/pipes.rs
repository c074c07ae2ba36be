use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::net::UnixStream;
use tracing::debug;

use crate::descriptor::ConnectionDescriptor;
use crate::error::{Result, TransportError};
use crate::traits::DuplexTransport;
use crate::uds::UnixDomainSocket;

const INBOUND_SOCKET: &str = "in.sock";
const OUTBOUND_SOCKET: &str = "out.sock";

static NEXT_DIR: AtomicU64 = AtomicU64::new(0);

/// Default delay between connection attempts of a [`PipeClient`].
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Server side of a socket pair: one listener per direction.
///
/// Each listener accepts exactly one peer and is removed afterwards, which
/// makes the descriptor single-use.
pub struct PipeServer {
    inbound: Option<UnixDomainSocket>,
    outbound: Option<UnixDomainSocket>,
    descriptor: ConnectionDescriptor,
    /// Directory created for the sockets, removed on drop.
    owned_dir: Option<PathBuf>,
}

impl PipeServer {
    /// Bind both listeners in a fresh private directory under the system temp dir.
    pub fn bind() -> Result<Self> {
        Self::bind_under(std::env::temp_dir())
    }

    /// Bind both listeners in a fresh private directory created under `parent`.
    pub fn bind_under(parent: impl AsRef<Path>) -> Result<Self> {
        let dir = parent.as_ref().join(format!(
            "procbridge-{}-{}-{}",
            std::process::id(),
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or_default(),
            NEXT_DIR.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&dir).map_err(|e| TransportError::Bind {
            path: dir.clone(),
            source: e,
        })?;
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700)).map_err(|e| {
            TransportError::Bind {
                path: dir.clone(),
                source: e,
            }
        })?;

        let mut server = Self::bind_in(&dir).inspect_err(|_| {
            let _ = std::fs::remove_dir(&dir);
        })?;
        server.owned_dir = Some(dir);
        Ok(server)
    }

    /// Bind both listeners inside an existing directory.
    pub fn bind_in(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let descriptor =
            ConnectionDescriptor::new(dir.join(INBOUND_SOCKET), dir.join(OUTBOUND_SOCKET))?;
        let inbound = UnixDomainSocket::bind(descriptor.inbound())?;
        let outbound = UnixDomainSocket::bind(descriptor.outbound())?;

        Ok(Self {
            inbound: Some(inbound),
            outbound: Some(outbound),
            descriptor,
            owned_dir: None,
        })
    }

    /// Descriptor to hand to the peer process.
    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }
}

impl DuplexTransport for PipeServer {
    type Inbound = UnixStream;
    type Outbound = UnixStream;

    async fn open_inbound(&mut self) -> Result<UnixStream> {
        let listener = self
            .inbound
            .take()
            .ok_or(TransportError::AlreadyOpened("inbound"))?;
        listener.accept().await
    }

    async fn open_outbound(&mut self) -> Result<UnixStream> {
        let listener = self
            .outbound
            .take()
            .ok_or(TransportError::AlreadyOpened("outbound"))?;
        listener.accept().await
    }

    fn transport_name(&self) -> &'static str {
        "unix-socket-pair"
    }
}

impl Drop for PipeServer {
    fn drop(&mut self) {
        // Listeners remove their socket files; the directory must be empty first.
        self.inbound.take();
        self.outbound.take();
        if let Some(dir) = self.owned_dir.take() {
            debug!(?dir, "removing socket directory");
            let _ = std::fs::remove_dir(&dir);
        }
    }
}

/// Client side of a socket pair, built from a server's descriptor.
///
/// Connecting retries while the server's sockets are missing or refusing, so
/// a client may be created before the server has finished binding.
#[derive(Debug, Clone)]
pub struct PipeClient {
    descriptor: ConnectionDescriptor,
    retry_interval: Duration,
}

impl PipeClient {
    /// Create a client for `descriptor` with the default retry interval.
    pub fn new(descriptor: ConnectionDescriptor) -> Self {
        Self {
            descriptor,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    /// Override the delay between connection attempts.
    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    /// Descriptor this client connects to.
    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    async fn connect_with_retry(&self, path: &Path) -> Result<UnixStream> {
        let mut attempts = 0u32;
        loop {
            match UnixDomainSocket::connect(path).await {
                Ok(stream) => return Ok(stream),
                Err(TransportError::Connect { source, .. })
                    if matches!(
                        source.kind(),
                        ErrorKind::NotFound | ErrorKind::ConnectionRefused
                    ) =>
                {
                    attempts = attempts.saturating_add(1);
                    if attempts == 1 {
                        debug!(?path, error = %source, "peer not listening yet; retrying");
                    }
                    tokio::time::sleep(self.retry_interval).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl DuplexTransport for PipeClient {
    type Inbound = UnixStream;
    type Outbound = UnixStream;

    async fn open_inbound(&mut self) -> Result<UnixStream> {
        let path = self.descriptor.outbound().to_path_buf();
        self.connect_with_retry(&path).await
    }

    async fn open_outbound(&mut self) -> Result<UnixStream> {
        let path = self.descriptor.inbound().to_path_buf();
        self.connect_with_retry(&path).await
    }

    fn transport_name(&self) -> &'static str {
        "unix-socket-pair"
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    use super::*;

    #[tokio::test]
    async fn server_and_client_exchange_lines_in_both_directions() {
        let mut server = PipeServer::bind().unwrap();
        let mut client = PipeClient::new(server.descriptor().clone());

        let server_task = tokio::spawn(async move {
            let inbound = server.open_inbound().await.unwrap();
            let mut outbound = server.open_outbound().await.unwrap();
            let mut lines = BufReader::new(inbound).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            outbound
                .write_all(format!("echo:{line}\n").as_bytes())
                .await
                .unwrap();
            server
        });

        let mut outbound = client.open_outbound().await.unwrap();
        let inbound = client.open_inbound().await.unwrap();
        outbound.write_all(b"ping\n").await.unwrap();

        let mut lines = BufReader::new(inbound).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "echo:ping");

        let server = server_task.await.unwrap();
        let dir = server
            .descriptor()
            .inbound()
            .parent()
            .unwrap()
            .to_path_buf();
        drop(server);
        assert!(!dir.exists(), "socket directory should be removed on drop");
    }

    #[tokio::test]
    async fn descriptor_is_single_use() {
        let mut server = PipeServer::bind().unwrap();
        let descriptor = server.descriptor().clone();

        let accept = tokio::spawn(async move {
            server.open_inbound().await.unwrap();
            server
        });
        let _first = UnixDomainSocket::connect(descriptor.inbound()).await.unwrap();
        let mut server = accept.await.unwrap();

        assert!(!descriptor.inbound().exists());
        let again = server.open_inbound().await;
        assert!(matches!(again, Err(TransportError::AlreadyOpened("inbound"))));
    }

    #[tokio::test]
    async fn servers_in_same_parent_do_not_collide() {
        let first = PipeServer::bind().unwrap();
        let second = PipeServer::bind().unwrap();
        assert_ne!(first.descriptor(), second.descriptor());
    }

    #[tokio::test]
    async fn client_retries_until_server_binds() {
        let dir = std::env::temp_dir().join(format!(
            "procbridge-retry-{}-{}",
            std::process::id(),
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let descriptor =
            ConnectionDescriptor::new(dir.join(INBOUND_SOCKET), dir.join(OUTBOUND_SOCKET))
                .unwrap();

        let mut client =
            PipeClient::new(descriptor).with_retry_interval(Duration::from_millis(5));
        let connect = tokio::spawn(async move { client.open_outbound().await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        let mut server = PipeServer::bind_in(&dir).unwrap();
        let _accepted = server.open_inbound().await.unwrap();

        assert!(connect.await.unwrap().is_ok());
        drop(server);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
