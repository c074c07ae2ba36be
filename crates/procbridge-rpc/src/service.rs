use std::sync::Arc;

use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::registry::{Registry, RegistryBuilder};

/// A handler object served to the peer.
///
/// Implementations list their methods explicitly:
///
/// ```
/// use std::sync::Arc;
/// use procbridge_frame::Fault;
/// use procbridge_rpc::{RegistryBuilder, Service};
///
/// struct Greeter;
///
/// impl Service for Greeter {
///     const INTERFACE: &'static str = "Greeter";
///
///     fn register(self: Arc<Self>, methods: &mut RegistryBuilder) {
///         methods.value("greet", |(name,): (String,)| {
///             Ok::<_, Fault>(format!("hello {name}"))
///         });
///     }
/// }
/// ```
pub trait Service: Send + Sync + 'static {
    /// Prefix of every method key of this service.
    const INTERFACE: &'static str;

    fn register(self: Arc<Self>, methods: &mut RegistryBuilder);
}

/// Typed caller-side view of a peer's [`Service`].
///
/// A proxy wraps a [`Dispatcher`] and exposes one method per remote method,
/// choosing the dispatcher call that matches its calling convention.
pub trait Proxy: Clone + Send + Sync + 'static {
    /// Must equal the `INTERFACE` of the service it talks to.
    const INTERFACE: &'static str;

    fn bind(dispatcher: Dispatcher) -> Self;
}

impl Registry {
    /// Build the registry for `service`.
    pub fn for_service<S: Service>(service: Arc<S>) -> Result<Self> {
        let mut methods = RegistryBuilder::new(S::INTERFACE);
        service.register(&mut methods);
        methods.build()
    }
}
