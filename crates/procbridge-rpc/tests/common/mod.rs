#![allow(dead_code)]

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use procbridge_rpc::{
    Bridge, BridgeConfig, Client, Dispatcher, Fault, Proxy, Registry, RegistryBuilder, Result,
    Service,
};
use procbridge_transport::memory::DEFAULT_CAPACITY;
use procbridge_transport::{memory_pair, DuplexTransport, MemoryTransport};
use tokio::io::{AsyncWrite, DuplexStream, ReadHalf, WriteHalf};

pub const GUID: &str = "acf70d64-60c9-4e8c-a716-99e831d26e78";

#[derive(Default)]
pub struct ExampleService {
    pub log: Mutex<Vec<String>>,
}

impl ExampleService {
    pub fn logged(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl Service for ExampleService {
    const INTERFACE: &'static str = "Example";

    fn register(self: Arc<Self>, methods: &mut RegistryBuilder) {
        let service = Arc::clone(&self);
        methods
            .value("append_guid", |(prefix, postfix): (String, String)| {
                Ok::<_, Fault>(format!("{prefix} {GUID} {postfix}"))
            })
            .value("throw_exception", |()| -> std::result::Result<String, Fault> {
                Err(Fault::new("AccessViolation", "This is a test"))
            })
            .value("sleep", |(delay_ms,): (u64,)| {
                std::thread::sleep(Duration::from_millis(delay_ms));
                Ok::<_, Fault>(delay_ms)
            })
            .deferred_value("delayed_echo", |(value, delay_ms): (u64, u64)| async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok::<_, Fault>(value)
            })
            .deferred_value("value_task", |(n,): (i64,)| async move {
                Ok::<_, Fault>(n.to_string())
            })
            .deferred_void("async_throw", |()| async {
                Err::<(), _>(Fault::new("InvalidOperation", "This is a test"))
            })
            .deferred_void("never", |()| std::future::pending::<std::result::Result<(), Fault>>())
            .void("log_message", move |(line,): (String,)| {
                service.log.lock().unwrap().push(line);
                Ok(())
            });
    }
}

#[derive(Clone)]
pub struct ExampleProxy(Dispatcher);

impl Proxy for ExampleProxy {
    const INTERFACE: &'static str = "Example";

    fn bind(dispatcher: Dispatcher) -> Self {
        Self(dispatcher)
    }
}

impl ExampleProxy {
    pub fn append_guid(&self, prefix: &str, postfix: &str) -> Result<String> {
        self.0
            .call("append_guid", (prefix.to_string(), postfix.to_string()))
    }

    pub fn throw_exception(&self) -> Result<String> {
        self.0.call("throw_exception", ())
    }

    /// Blocks the serving thread for `delay_ms`.
    pub fn sleep(&self, delay_ms: u64) -> Result<u64> {
        self.0.call("sleep", (delay_ms,))
    }

    pub async fn delayed_echo(&self, value: u64, delay_ms: u64) -> Result<u64> {
        self.0.call_deferred("delayed_echo", (value, delay_ms)).await
    }

    pub async fn value_task(&self, n: i64) -> Result<String> {
        self.0.call_deferred("value_task", (n,)).await
    }

    pub async fn async_throw(&self) -> Result<()> {
        self.0.call_deferred_void("async_throw", ()).await
    }

    pub async fn never(&self) -> Result<()> {
        self.0.call_deferred_void("never", ()).await
    }

    pub fn log_message(&self, line: &str) -> Result<()> {
        self.0.notify("log_message", (line.to_string(),))
    }
}

/// A serving bridge and a calling client joined by an in-memory pair.
pub fn memory_bridges(
    service: Arc<ExampleService>,
    client_config: BridgeConfig,
) -> (Bridge, Client<ExampleProxy>) {
    let (server_side, client_side) = memory_pair(DEFAULT_CAPACITY);
    bridges_over(server_side, client_side, service, client_config)
}

pub fn bridges_over<S, C>(
    server_side: S,
    client_side: C,
    service: Arc<ExampleService>,
    client_config: BridgeConfig,
) -> (Bridge, Client<ExampleProxy>)
where
    S: DuplexTransport,
    C: DuplexTransport,
{
    let registry = Registry::for_service(service).unwrap();
    let server = Bridge::start(server_side, registry, BridgeConfig::default()).unwrap();
    let client = Client::new(Bridge::start(client_side, Registry::empty(), client_config).unwrap());
    (server, client)
}

/// Poll `condition` until it holds or a second passes.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

/// Forwards writes to `inner`, recording each accepted chunk.
pub struct RecordingWriter<W> {
    inner: W,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl<W: AsyncWrite + Unpin> AsyncWrite for RecordingWriter<W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(written)) = &poll {
            this.writes.lock().unwrap().push(buf[..*written].to_vec());
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// In-memory transport that records every write its outbound half accepts.
pub struct RecordingTransport {
    inner: MemoryTransport,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl RecordingTransport {
    pub fn new(inner: MemoryTransport) -> (Self, Arc<Mutex<Vec<Vec<u8>>>>) {
        let writes = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                inner,
                writes: Arc::clone(&writes),
            },
            writes,
        )
    }
}

impl DuplexTransport for RecordingTransport {
    type Inbound = ReadHalf<DuplexStream>;
    type Outbound = RecordingWriter<WriteHalf<DuplexStream>>;

    async fn open_inbound(&mut self) -> procbridge_transport::Result<Self::Inbound> {
        self.inner.open_inbound().await
    }

    async fn open_outbound(&mut self) -> procbridge_transport::Result<Self::Outbound> {
        Ok(RecordingWriter {
            inner: self.inner.open_outbound().await?,
            writes: Arc::clone(&self.writes),
        })
    }

    fn transport_name(&self) -> &'static str {
        "recording"
    }
}
