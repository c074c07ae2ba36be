//! Typed method calls between two processes.
//!
//! A [`Bridge`] joins two processes over a duplex transport. Each side may
//! serve a [`Service`] (a registry of named handlers) and call the other
//! side's service through a [`Proxy`] built on a [`Dispatcher`]. Every method
//! has one of four [`CallingConvention`]s:
//! - `Void`: fire and forget; no reply is written
//! - `Value`: the caller blocks until the value arrives
//! - `DeferredValue`: async handler, the caller awaits the value
//! - `DeferredVoid`: async handler, the caller awaits completion
//!
//! Handler failures cross the boundary as a [`Fault`] and surface as
//! [`BridgeError::Remote`] with the same kind and message.
//!
//! ```no_run
//! # async fn demo() -> procbridge_rpc::Result<()> {
//! # use std::sync::Arc;
//! # use procbridge_rpc::*;
//! # struct Greeter;
//! # impl Service for Greeter {
//! #     const INTERFACE: &'static str = "Greeter";
//! #     fn register(self: Arc<Self>, _: &mut RegistryBuilder) {}
//! # }
//! let (server, descriptor) = create_server(Arc::new(Greeter))?;
//! // hand `descriptor.to_string()` to the peer process, then:
//! server.wait_for_connection(None, true).await?;
//! # Ok(())
//! # }
//! ```

pub mod args;
pub mod bridge;
pub mod config;
mod correlation;
pub mod dispatcher;
pub mod error;
mod receiver;
pub mod registry;
pub mod service;
pub mod stats;

pub use args::ArgList;
#[cfg(unix)]
pub use bridge::{create_client, create_client_with_config, create_server, create_server_with_config};
pub use bridge::{Bridge, Client, Server};
pub use config::{BridgeConfig, DEFAULT_CONNECT_RETRY_INTERVAL, DEFAULT_CONNECT_TIMEOUT};
pub use dispatcher::Dispatcher;
pub use error::{BridgeError, Result};
pub use procbridge_frame::Fault;
pub use registry::{CallingConvention, Entry, Invocation, Outcome, Registry, RegistryBuilder};
pub use service::{Proxy, Service};
pub use stats::BridgeStats;
