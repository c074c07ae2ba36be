use std::path::PathBuf;
use std::time::Duration;

use procbridge_frame::FrameConfig;
use tokio_util::sync::CancellationToken;

/// Default time `wait_for_connection` waits when no timeout is given.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default delay between a client's connection attempts.
pub const DEFAULT_CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Wait used by `wait_for_connection(None, ..)`.
    pub connect_timeout: Duration,
    /// Per-call reply timeout; `None` waits until the reply, cancellation or disconnect.
    pub call_timeout: Option<Duration>,
    /// Delay between a client's connection attempts while the server is not listening.
    pub connect_retry_interval: Duration,
    pub frame: FrameConfig,
    /// Parent directory for server sockets; the system temp dir when `None`.
    pub socket_dir: Option<PathBuf>,
    /// Caller token; the bridge's own token is a child of it.
    pub parent: Option<CancellationToken>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: None,
            connect_retry_interval: DEFAULT_CONNECT_RETRY_INTERVAL,
            frame: FrameConfig::default(),
            socket_dir: None,
            parent: None,
        }
    }
}
