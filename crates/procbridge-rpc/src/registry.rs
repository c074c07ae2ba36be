//! Method registry: method key to invoker, calling convention and arity.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};

use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use procbridge_frame::fault::{KIND_ARGUMENT, KIND_SERIALIZATION};
use procbridge_frame::{validate_method_name, Fault};
use serde::Serialize;
use serde_json::Value;

use crate::args::ArgList;
use crate::error::{BridgeError, Result};

/// How a method is called and answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallingConvention {
    /// Fire and forget: no reply frame, the caller does not wait.
    Void,
    /// Synchronous handler with a value reply; the caller blocks.
    Value,
    /// Async handler with a value reply; the caller awaits.
    DeferredValue,
    /// Async handler with an empty reply once it completes; the caller awaits.
    DeferredVoid,
}

impl CallingConvention {
    /// Whether the callee writes a result or exception frame.
    pub fn expects_reply(self) -> bool {
        !matches!(self, CallingConvention::Void)
    }

    /// Whether the handler completes asynchronously.
    pub fn is_deferred(self) -> bool {
        matches!(
            self,
            CallingConvention::DeferredValue | CallingConvention::DeferredVoid
        )
    }
}

/// Result of running a handler: the reply value (`None` for void) or a fault.
pub type Outcome = std::result::Result<Option<Value>, Fault>;

/// What invoking an entry produced.
pub enum Invocation {
    /// A synchronous handler already ran.
    Ready(Outcome),
    /// An async handler; the reply waits for this future.
    Pending(BoxFuture<'static, Outcome>),
}

type SyncInvoker = Box<dyn Fn(Vec<Value>) -> Outcome + Send + Sync>;
type DeferredInvoker = Box<dyn Fn(Vec<Value>) -> BoxFuture<'static, Outcome> + Send + Sync>;

enum Invoker {
    Sync(SyncInvoker),
    Deferred(DeferredInvoker),
}

/// One registered method.
pub struct Entry {
    key: String,
    convention: CallingConvention,
    arity: usize,
    invoker: Invoker,
}

impl Entry {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn convention(&self) -> CallingConvention {
        self.convention
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Run the handler. Panics are captured as [`KIND_PANIC`] faults.
    ///
    /// [`KIND_PANIC`]: procbridge_frame::fault::KIND_PANIC
    pub fn invoke(&self, args: Vec<Value>) -> Invocation {
        match &self.invoker {
            Invoker::Sync(invoke) => Invocation::Ready(run_sync(invoke, args)),
            Invoker::Deferred(invoke) => match catch_unwind(AssertUnwindSafe(|| invoke(args))) {
                Ok(pending) => Invocation::Pending(
                    AssertUnwindSafe(pending)
                        .catch_unwind()
                        .map(|result| result.unwrap_or_else(|panic| Err(Fault::from_panic(panic))))
                        .boxed(),
                ),
                Err(panic) => Invocation::Ready(Err(Fault::from_panic(panic))),
            },
        }
    }

    /// Run a synchronous handler on the current thread. `None` for deferred
    /// entries, which must go through [`Entry::invoke`].
    pub(crate) fn invoke_sync(&self, args: Vec<Value>) -> Option<Outcome> {
        match &self.invoker {
            Invoker::Sync(invoke) => Some(run_sync(invoke, args)),
            Invoker::Deferred(_) => None,
        }
    }
}

fn run_sync(invoke: &SyncInvoker, args: Vec<Value>) -> Outcome {
    catch_unwind(AssertUnwindSafe(|| invoke(args)))
        .unwrap_or_else(|panic| Err(Fault::from_panic(panic)))
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("convention", &self.convention)
            .field("arity", &self.arity)
            .finish()
    }
}

fn decode_args<A: ArgList>(key: &str, args: Vec<Value>) -> std::result::Result<A, Fault> {
    A::from_values(args)
        .map_err(|e| Fault::new(KIND_ARGUMENT, format!("invalid arguments for {key}: {e}")))
}

fn encode_value<R: Serialize>(value: R) -> Outcome {
    serde_json::to_value(value)
        .map(Some)
        .map_err(|e| Fault::new(KIND_SERIALIZATION, e.to_string()))
}

/// Collects the methods of one interface.
///
/// Keys are `"<interface>.<method>"`. Problems with names are reported by
/// [`RegistryBuilder::build`].
pub struct RegistryBuilder {
    interface: String,
    entries: Vec<Entry>,
}

impl RegistryBuilder {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            entries: Vec::new(),
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn key(&self, method: &str) -> String {
        method_key(&self.interface, method)
    }

    fn push(
        &mut self,
        key: String,
        convention: CallingConvention,
        arity: usize,
        invoker: Invoker,
    ) -> &mut Self {
        self.entries.push(Entry {
            key,
            convention,
            arity,
            invoker,
        });
        self
    }

    /// Register a fire-and-forget method. Its failures are logged by the
    /// receiving side and never reach the caller.
    pub fn void<A, F>(&mut self, method: &str, handler: F) -> &mut Self
    where
        A: ArgList,
        F: Fn(A) -> std::result::Result<(), Fault> + Send + Sync + 'static,
    {
        let key = self.key(method);
        let name = key.clone();
        let invoker = Invoker::Sync(Box::new(move |args: Vec<Value>| {
            handler(decode_args(&name, args)?).map(|()| None)
        }));
        self.push(key, CallingConvention::Void, A::ARITY, invoker)
    }

    /// Register a synchronous method returning a value.
    pub fn value<A, R, F>(&mut self, method: &str, handler: F) -> &mut Self
    where
        A: ArgList,
        R: Serialize + 'static,
        F: Fn(A) -> std::result::Result<R, Fault> + Send + Sync + 'static,
    {
        let key = self.key(method);
        let name = key.clone();
        let invoker = Invoker::Sync(Box::new(move |args: Vec<Value>| {
            encode_value(handler(decode_args(&name, args)?)?)
        }));
        self.push(key, CallingConvention::Value, A::ARITY, invoker)
    }

    /// Register an async method returning a value.
    pub fn deferred_value<A, R, F, Fut>(&mut self, method: &str, handler: F) -> &mut Self
    where
        A: ArgList,
        R: Serialize + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, Fault>> + Send + 'static,
    {
        let key = self.key(method);
        let name = key.clone();
        let invoker = Invoker::Deferred(Box::new(move |args: Vec<Value>| {
            match decode_args(&name, args) {
                Ok(args) => handler(args)
                    .map(|result| result.and_then(encode_value))
                    .boxed(),
                Err(fault) => future::ready(Err(fault)).boxed(),
            }
        }));
        self.push(key, CallingConvention::DeferredValue, A::ARITY, invoker)
    }

    /// Register an async method whose caller waits for completion only.
    pub fn deferred_void<A, F, Fut>(&mut self, method: &str, handler: F) -> &mut Self
    where
        A: ArgList,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), Fault>> + Send + 'static,
    {
        let key = self.key(method);
        let name = key.clone();
        let invoker = Invoker::Deferred(Box::new(move |args: Vec<Value>| {
            match decode_args(&name, args) {
                Ok(args) => handler(args).map(|result| result.map(|()| None)).boxed(),
                Err(fault) => future::ready(Err(fault)).boxed(),
            }
        }));
        self.push(key, CallingConvention::DeferredVoid, A::ARITY, invoker)
    }

    /// Validate names and freeze the registry.
    pub fn build(self) -> Result<Registry> {
        let mut entries = HashMap::with_capacity(self.entries.len());
        for entry in self.entries {
            if validate_method_name(&entry.key).is_err() {
                return Err(BridgeError::InvalidMethodName(entry.key));
            }
            if entries.contains_key(&entry.key) {
                return Err(BridgeError::DuplicateMethod(entry.key));
            }
            entries.insert(entry.key.clone(), entry);
        }
        Ok(Registry { entries })
    }
}

pub(crate) fn method_key(interface: &str, method: &str) -> String {
    if interface.is_empty() {
        method.to_string()
    } else {
        format!("{interface}.{method}")
    }
}

/// Immutable lookup table used by the receive loop.
#[derive(Default)]
pub struct Registry {
    entries: HashMap<String, Entry>,
}

impl Registry {
    /// A registry that serves nothing (pure callers).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn resolve(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    /// Parameter count of `key`, used to decode call frames.
    pub fn arity(&self, key: &str) -> Option<usize> {
        self.resolve(key).map(Entry::arity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("methods", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use procbridge_frame::fault::KIND_PANIC;
    use serde_json::json;

    use super::*;

    fn ready(invocation: Invocation) -> Outcome {
        match invocation {
            Invocation::Ready(outcome) => outcome,
            Invocation::Pending(_) => panic!("expected a synchronous outcome"),
        }
    }

    async fn settle(invocation: Invocation) -> Outcome {
        match invocation {
            Invocation::Ready(outcome) => outcome,
            Invocation::Pending(pending) => pending.await,
        }
    }

    fn sample() -> Registry {
        let mut methods = RegistryBuilder::new("Example");
        methods
            .value("concat", |(a, b): (String, String)| Ok(format!("{a}{b}")))
            .value("fail", |()| -> std::result::Result<(), Fault> {
                Err(Fault::new("AccessViolation", "This is a test"))
            })
            .value("explode", |()| -> std::result::Result<i32, Fault> {
                panic!("handler blew up")
            })
            .void("log", |(_line,): (String,)| Ok(()))
            .deferred_value("double", |(n,): (u64,)| async move { Ok::<_, Fault>(n * 2) })
            .deferred_void("tick", |()| async { Ok::<_, Fault>(()) });
        methods.build().unwrap()
    }

    #[test]
    fn resolves_keys_with_interface_prefix() {
        let registry = sample();
        let entry = registry.resolve("Example.concat").unwrap();
        assert_eq!(entry.convention(), CallingConvention::Value);
        assert_eq!(entry.arity(), 2);
        assert_eq!(registry.arity("Example.log"), Some(1));
        assert_eq!(registry.arity("Example.tick"), Some(0));
        assert!(registry.resolve("concat").is_none());
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn sync_outcomes() {
        let registry = sample();
        let concat = registry.resolve("Example.concat").unwrap();
        assert_eq!(
            ready(concat.invoke(vec![json!("AAA"), json!("BBB")])),
            Ok(Some(json!("AAABBB")))
        );

        let fail = registry.resolve("Example.fail").unwrap();
        let fault = ready(fail.invoke(vec![])).unwrap_err();
        assert_eq!(fault.kind(), "AccessViolation");

        let log = registry.resolve("Example.log").unwrap();
        assert_eq!(ready(log.invoke(vec![json!("hi")])), Ok(None));
    }

    #[test]
    fn panics_become_faults() {
        let registry = sample();
        let explode = registry.resolve("Example.explode").unwrap();
        let fault = ready(explode.invoke(vec![])).unwrap_err();
        assert_eq!(fault.kind(), KIND_PANIC);
        assert_eq!(fault.message(), "handler blew up");
    }

    #[test]
    fn bad_arguments_become_faults() {
        let registry = sample();
        let concat = registry.resolve("Example.concat").unwrap();
        let fault = ready(concat.invoke(vec![json!(1), json!(2)])).unwrap_err();
        assert_eq!(fault.kind(), KIND_ARGUMENT);
    }

    #[tokio::test]
    async fn deferred_outcomes() {
        let registry = sample();
        let double = registry.resolve("Example.double").unwrap();
        assert!(double.convention().is_deferred());
        assert_eq!(settle(double.invoke(vec![json!(21)])).await, Ok(Some(json!(42))));

        let tick = registry.resolve("Example.tick").unwrap();
        assert_eq!(settle(tick.invoke(vec![])).await, Ok(None));

        let fault = settle(double.invoke(vec![json!("x")])).await.unwrap_err();
        assert_eq!(fault.kind(), KIND_ARGUMENT);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut methods = RegistryBuilder::new("Example");
        methods
            .value("same", |()| Ok(1))
            .void("same", |()| Ok(()));
        let err = methods.build().unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateMethod(key) if key == "Example.same"));
    }

    #[test]
    fn newline_names_are_rejected() {
        let mut methods = RegistryBuilder::new("Example");
        methods.void("bad\nname", |()| Ok(()));
        let err = methods.build().unwrap_err();
        assert!(matches!(err, BridgeError::InvalidMethodName(_)));
    }

    #[test]
    fn conventions() {
        assert!(!CallingConvention::Void.expects_reply());
        assert!(CallingConvention::Value.expects_reply());
        assert!(CallingConvention::DeferredVoid.expects_reply());
        assert!(!CallingConvention::Value.is_deferred());
    }
}
