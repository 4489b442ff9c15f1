use tokio::sync::broadcast;

use crate::core::job::JobRecord;

const BUS_CAPACITY: usize = 128;

/// Notification sent to views after a mutation has been persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    Created(JobRecord),
    Updated(JobRecord),
    Removed(String),
    Cleared,
}

/// Fan-out of store mutations. Sending never blocks and never fails the
/// mutation; slow subscribers see `Lagged` and can re-read the store.
#[derive(Clone)]
pub struct ChangeBus {
    tx: broadcast::Sender<StoreChange>,
}

impl ChangeBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.tx.subscribe()
    }

    pub fn publish(&self, change: StoreChange) {
        let _ = self.tx.send(change); // Ignored if no subscribers
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}
