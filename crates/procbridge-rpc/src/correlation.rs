use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use procbridge_frame::{CorrelationId, Fault, IdGenerator};
use serde_json::Value;
use tokio::sync::oneshot;

/// What a pending call is completed with.
#[derive(Debug)]
pub(crate) enum Reply {
    Value(Option<Value>),
    Fault(Fault),
    /// The reply frame for this id could not be decoded.
    Protocol(String),
    /// The inbound stream ended.
    Closed,
}

/// Outstanding calls awaiting a reply, keyed by correlation id.
pub(crate) struct CorrelationTable {
    pending: DashMap<CorrelationId, oneshot::Sender<Reply>>,
    ids: IdGenerator,
}

impl CorrelationTable {
    pub(crate) fn new() -> Self {
        Self::with_ids(IdGenerator::new())
    }

    pub(crate) fn with_ids(ids: IdGenerator) -> Self {
        Self {
            pending: DashMap::new(),
            ids,
        }
    }

    /// Allocate an id not currently pending and register a slot for it.
    pub(crate) fn register(&self) -> (CorrelationId, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        loop {
            let id = self.ids.next_id();
            if let Entry::Vacant(slot) = self.pending.entry(id) {
                slot.insert(tx);
                return (id, rx);
            }
        }
    }

    /// Hand `reply` to the call waiting on `id`. Returns `false` for ids
    /// nobody is waiting on.
    pub(crate) fn complete(&self, id: CorrelationId, reply: Reply) -> bool {
        match self.pending.remove(&id) {
            Some((_, waiter)) => {
                // The caller may have given up between removal and send.
                let _ = waiter.send(reply);
                true
            }
            None => false,
        }
    }

    pub(crate) fn release(&self, id: CorrelationId) {
        self.pending.remove(&id);
    }

    /// Complete every pending call with a reply built by `reply`.
    pub(crate) fn fail_all(&self, reply: impl Fn() -> Reply) -> usize {
        let ids: Vec<CorrelationId> = self.pending.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter(|id| self.complete(*id, reply()))
            .count()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

/// Releases a pending slot when the call stops waiting, however it stops.
pub(crate) struct SlotGuard<'a> {
    table: &'a CorrelationTable,
    id: CorrelationId,
}

impl<'a> SlotGuard<'a> {
    pub(crate) fn new(table: &'a CorrelationTable, id: CorrelationId) -> Self {
        Self { table, id }
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.table.release(self.id);
    }
}
