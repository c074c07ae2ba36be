//! The `Example` service the `parent` command serves and the `child`
//! command calls.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use procbridge_rpc::{Dispatcher, Fault, Proxy, RegistryBuilder, Result, Service};
use rand::Rng;
use tracing::info;

pub const INTERFACE: &str = "Example";
pub const GUID: &str = "acf70d64-60c9-4e8c-a716-99e831d26e78";
pub const FAULT_KIND: &str = "AccessViolation";
pub const FAULT_MESSAGE: &str = "This is a test";
const RANDOM_DELAY_MAX_MS: u64 = 100;

fn test_fault() -> Fault {
    Fault::new(FAULT_KIND, FAULT_MESSAGE)
}

#[derive(Debug, Default)]
pub struct ExampleService {
    notifications: Mutex<Vec<String>>,
}

impl ExampleService {
    /// Messages received through `log_message`, in arrival order.
    pub fn notifications(&self) -> Vec<String> {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Service for ExampleService {
    const INTERFACE: &'static str = INTERFACE;

    fn register(self: Arc<Self>, methods: &mut RegistryBuilder) {
        let service = Arc::clone(&self);
        methods
            .value("append_guid", |(prefix, postfix): (String, String)| {
                Ok::<_, Fault>(format!("{prefix} {GUID} {postfix}"))
            })
            .value("throw_exception", |()| Err::<(), _>(test_fault()))
            .deferred_value("async_test", |()| async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, Fault>("Async rules!")
            })
            .deferred_void("async_throw", |()| async { Err::<(), _>(test_fault()) })
            .deferred_value("value_task", |(number,): (i32,)| async move {
                Ok::<_, Fault>(number.to_string())
            })
            .deferred_void("empty_value_task", |()| async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, Fault>(())
            })
            .deferred_void("throwing_value_task", |()| async { Err::<(), _>(test_fault()) })
            .deferred_void("random_delay", |()| {
                let delay = rand::thread_rng().gen_range(0..RANDOM_DELAY_MAX_MS);
                async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    Ok::<_, Fault>(())
                }
            })
            .void("log_message", move |(message,): (String,)| {
                info!(%message, "child says");
                service
                    .notifications
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(message);
                Ok(())
            });
    }
}

/// Typed calls to a peer's `Example` service.
#[derive(Debug, Clone)]
pub struct ExampleProxy(Dispatcher);

impl Proxy for ExampleProxy {
    const INTERFACE: &'static str = INTERFACE;

    fn bind(dispatcher: Dispatcher) -> Self {
        Self(dispatcher)
    }
}

impl ExampleProxy {
    pub fn append_guid(&self, prefix: &str, postfix: &str) -> Result<String> {
        self.0
            .call("append_guid", (prefix.to_string(), postfix.to_string()))
    }

    pub fn throw_exception(&self) -> Result<()> {
        self.0.call("throw_exception", ())
    }

    pub async fn async_test(&self) -> Result<String> {
        self.0.call_deferred("async_test", ()).await
    }

    pub async fn async_throw(&self) -> Result<()> {
        self.0.call_deferred_void("async_throw", ()).await
    }

    pub async fn value_task(&self, number: i32) -> Result<String> {
        self.0.call_deferred("value_task", (number,)).await
    }

    pub async fn empty_value_task(&self) -> Result<()> {
        self.0.call_deferred_void("empty_value_task", ()).await
    }

    pub async fn throwing_value_task(&self) -> Result<()> {
        self.0.call_deferred_void("throwing_value_task", ()).await
    }

    pub async fn random_delay(&self) -> Result<()> {
        self.0.call_deferred_void("random_delay", ()).await
    }

    pub fn log_message(&self, message: &str) -> Result<()> {
        self.0.notify("log_message", (message.to_string(),))
    }
}
