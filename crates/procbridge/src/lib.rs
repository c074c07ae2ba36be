//! Typed method calls between a parent and a child process.
//!
//! One process creates a server bridge for a service and hands the textual
//! connection descriptor to its peer, which connects a client bridge and
//! calls the service through a typed proxy. Calls, results and remote
//! failures travel as newline-terminated frames over a pair of
//! one-directional byte streams.
//!
//! # Crate Structure
//!
//! - [`transport`]: duplex transports (Unix socket pairs, in-memory pairs)
//! - [`frame`]: the line-oriented frame codec and async frame reader/writer
//! - [`rpc`]: method registry, dispatcher, receive loop and bridge lifecycle

/// Re-export transport types.
pub mod transport {
    pub use procbridge_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use procbridge_frame::*;
}

/// Re-export bridge types.
pub mod rpc {
    pub use procbridge_rpc::*;
}

pub use procbridge_rpc::{
    Bridge, BridgeConfig, BridgeError, Client, Dispatcher, Fault, Proxy, RegistryBuilder, Server,
    Service,
};
#[cfg(unix)]
pub use procbridge_rpc::{create_client, create_server};
