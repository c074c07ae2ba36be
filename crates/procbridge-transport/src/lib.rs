//! Duplex byte transports for procbridge.
//!
//! A bridge talks over two independent one-directional byte streams: an
//! inbound half it reads from and an outbound half it writes to. This crate
//! provides the [`DuplexTransport`] abstraction over those halves and the
//! transports shipped with procbridge:
//! - [`PipeServer`] / [`PipeClient`]: a pair of Unix domain sockets, handed
//!   to the peer process as a [`ConnectionDescriptor`]
//! - [`MemoryTransport`]: in-process halves for tests and embedding
//!
//! This is the lowest layer of procbridge. Everything else builds on top of
//! the halves opened here.

pub mod descriptor;
pub mod error;
pub mod memory;
pub mod traits;

#[cfg(unix)]
pub mod pipes;
#[cfg(unix)]
pub mod uds;

pub use descriptor::ConnectionDescriptor;
pub use error::{Result, TransportError};
pub use memory::{memory_pair, MemoryTransport};
pub use traits::DuplexTransport;

#[cfg(unix)]
pub use pipes::{PipeClient, PipeServer};
#[cfg(unix)]
pub use uds::UnixDomainSocket;
