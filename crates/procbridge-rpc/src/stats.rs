use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time counters of a bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    /// Incoming calls that were resolved and invoked.
    pub calls_served: u64,
    /// Incoming calls to methods the registry does not know.
    pub unknown_methods: u64,
    /// Replies whose id matched no pending call.
    pub stale_replies: u64,
    /// Frames that could not be decoded.
    pub malformed_frames: u64,
    /// Outgoing calls currently waiting for a reply.
    pub pending_calls: usize,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    calls_served: AtomicU64,
    unknown_methods: AtomicU64,
    stale_replies: AtomicU64,
    malformed_frames: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn call_served(&self) {
        self.calls_served.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unknown_method(&self) {
        self.unknown_methods.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stale_reply(&self) {
        self.stale_replies.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn malformed_frame(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, pending_calls: usize) -> BridgeStats {
        BridgeStats {
            calls_served: self.calls_served.load(Ordering::Relaxed),
            unknown_methods: self.unknown_methods.load(Ordering::Relaxed),
            stale_replies: self.stale_replies.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            pending_calls,
        }
    }
}
