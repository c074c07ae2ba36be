//! Callee side: reads frames, serves calls and routes replies.

use std::sync::Arc;

use procbridge_frame::fault::{KIND_PANIC, KIND_SERIALIZATION};
use procbridge_frame::{CorrelationId, Fault, Frame, FrameError, FrameReader};
use serde_json::Value;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::correlation::Reply;
use crate::dispatcher::Shared;
use crate::error::BridgeError;
use crate::registry::{Invocation, Outcome, Registry};

pub(crate) struct ReceiveLoop<R> {
    pub(crate) reader: FrameReader<R>,
    pub(crate) registry: Registry,
    pub(crate) shared: Arc<Shared>,
    pub(crate) tracker: TaskTracker,
}

impl<R: AsyncRead + Unpin> ReceiveLoop<R> {
    /// Serve until cancellation or end of stream. Tearing down the link is
    /// left to the caller.
    pub(crate) async fn run(self) {
        let ReceiveLoop {
            mut reader,
            registry,
            shared,
            tracker,
        } = self;
        let registry = Arc::new(registry);
        let (sync_calls, queue) = mpsc::unbounded_channel();
        let worker = tracker.spawn(run_sync_worker(
            Arc::clone(&registry),
            Arc::clone(&shared),
            queue,
        ));

        loop {
            let frame = tokio::select! {
                biased;
                _ = shared.cancel.cancelled() => {
                    debug!("receive loop cancelled");
                    break;
                }
                frame = reader.read_frame(|method| registry.arity(method)) => frame,
            };

            match frame {
                Ok(Frame::Call { id, method, args }) => {
                    serve_call(&registry, &shared, &tracker, &sync_calls, id, method, args);
                }
                Ok(Frame::Result { id, value }) => deliver(&shared, id, Reply::Value(value)),
                Ok(Frame::Exception { id, fault }) => deliver(&shared, id, Reply::Fault(fault)),
                Err(FrameError::ConnectionClosed) => {
                    info!("peer closed the inbound stream");
                    break;
                }
                Err(err) if !err.is_recoverable() => {
                    error!(error = %err, "inbound stream failed");
                    break;
                }
                Err(err) => on_decode_error(&registry, &shared, err).await,
            }
        }

        // Calls already read are still served before the link is torn down.
        drop(sync_calls);
        let _ = worker.await;
    }
}

/// A synchronous call waiting for the blocking worker.
struct SyncCall {
    id: CorrelationId,
    method: String,
    args: Vec<Value>,
    expects_reply: bool,
}

/// Dispatch one inbound call. Synchronous handlers are queued for the
/// blocking worker, deferred ones run as tracked tasks.
fn serve_call(
    registry: &Registry,
    shared: &Arc<Shared>,
    tracker: &TaskTracker,
    sync_calls: &mpsc::UnboundedSender<SyncCall>,
    id: CorrelationId,
    method: String,
    args: Vec<Value>,
) {
    let Some(entry) = registry.resolve(&method) else {
        warn!(%id, method = %method, "dropping call to unknown method");
        shared.stats.unknown_method();
        return;
    };
    shared.stats.call_served();
    let convention = entry.convention();

    if !convention.is_deferred() {
        let call = SyncCall {
            id,
            method,
            args,
            expects_reply: convention.expects_reply(),
        };
        if sync_calls.send(call).is_err() {
            debug!(%id, "blocking worker gone; dropping call");
        }
        return;
    }

    match entry.invoke(args) {
        Invocation::Ready(outcome) => {
            let shared = Arc::clone(shared);
            tracker.spawn(async move { reply(&shared, id, outcome).await });
        }
        Invocation::Pending(pending) => {
            let shared = Arc::clone(shared);
            tracker.spawn(async move {
                let outcome = tokio::select! {
                    biased;
                    _ = shared.cancel.cancelled() => return,
                    outcome = pending => outcome,
                };
                reply(&shared, id, outcome).await;
            });
        }
    }
}

/// Run queued synchronous handlers one at a time on the blocking pool, so
/// they never stall the receive loop and their replies keep issue order.
async fn run_sync_worker(
    registry: Arc<Registry>,
    shared: Arc<Shared>,
    mut queue: mpsc::UnboundedReceiver<SyncCall>,
) {
    while let Some(call) = queue.recv().await {
        let SyncCall {
            id,
            method,
            args,
            expects_reply,
        } = call;
        let handler = {
            let registry = Arc::clone(&registry);
            let method = method.clone();
            tokio::task::spawn_blocking(move || {
                registry
                    .resolve(&method)
                    .and_then(|entry| entry.invoke_sync(args))
            })
        };

        let outcome = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => return,
            joined = handler => match joined {
                Ok(Some(outcome)) => outcome,
                Ok(None) => continue,
                Err(err) => Err(Fault::new(KIND_PANIC, err.to_string())),
            },
        };

        if expects_reply {
            reply(&shared, id, outcome).await;
        } else if let Err(fault) = outcome {
            warn!(%id, method = %method, %fault, "void handler failed");
        }
    }
}

/// Write the reply for `id`. A value that cannot be sent as a result is
/// reported to the caller as a serialization fault instead.
async fn reply(shared: &Shared, id: CorrelationId, outcome: Outcome) {
    let frame = match outcome {
        Ok(value) => Frame::Result { id, value },
        Err(fault) => Frame::Exception { id, fault },
    };
    let err = match shared.send(&frame).await {
        Ok(()) => return,
        Err(err) => err,
    };

    match (&frame, &err) {
        (
            Frame::Result { .. },
            BridgeError::Frame(FrameError::LineTooLong { .. } | FrameError::Serialization(_)),
        ) => {
            warn!(%id, error = %err, "result could not be sent; replying with a fault");
            let fallback = Frame::Exception {
                id,
                fault: Fault::new(KIND_SERIALIZATION, err.to_string()),
            };
            if let Err(err) = shared.send(&fallback).await {
                warn!(%id, error = %err, "failed to write reply");
            }
        }
        _ => warn!(%id, error = %err, "failed to write reply"),
    }
}

fn deliver(shared: &Shared, id: CorrelationId, reply: Reply) {
    if !shared.table.complete(id, reply) {
        warn!(%id, "discarding reply for unknown or expired call");
        shared.stats.stale_reply();
    }
}

async fn on_decode_error(registry: &Registry, shared: &Shared, err: FrameError) {
    shared.stats.malformed_frame();

    if let Some(id) = err.reply_id() {
        warn!(%id, error = %err, "undecodable reply");
        deliver(shared, id, Reply::Protocol(err.to_string()));
        return;
    }

    match err {
        FrameError::MalformedCall { id, method, reason } => {
            warn!(%id, method = %method, reason = %reason, "malformed call");
            let expects_reply = registry
                .resolve(&method)
                .is_some_and(|entry| entry.convention().expects_reply());
            if expects_reply {
                let fault = Fault::new(KIND_SERIALIZATION, reason);
                reply(shared, id, Err(fault)).await;
            }
        }
        other => warn!(error = %other, "skipping malformed frame"),
    }
}
