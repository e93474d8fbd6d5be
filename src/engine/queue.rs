// src/engine/queue.rs

//! Events waiting for their ref's active run to finish.

use std::collections::HashMap;

use tracing::debug;

use crate::types::Event;

/// Queue of events that arrived while a run on the same ref was active
/// (only used with `superseded_run_behaviour = "queue"`).
///
/// Semantics:
/// - At most one waiting event per ref. A newer event replaces the older
///   one, because only the latest commit on a ref is worth building.
/// - When a ref's active run finishes, the runtime calls `take()` for that
///   ref and starts a run for the waiting event, if any.
#[derive(Debug, Default)]
pub struct RunQueue {
    pending: HashMap<String, Event>,
}

impl RunQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `event` as the next run of its ref.
    pub fn record(&mut self, event: Event) {
        let key = event.concurrency_key();
        if let Some(previous) = self.pending.insert(key.clone(), event) {
            debug!(
                concurrency_key = %key,
                dropped = %previous,
                "replaced queued event with a newer one"
            );
        } else {
            debug!(concurrency_key = %key, "queued event until the active run finishes");
        }
    }

    /// Remove and return the waiting event of `key`.
    pub fn take(&mut self, key: &str) -> Option<Event> {
        self.pending.remove(key)
    }

    /// Drop every waiting event (shutdown).
    pub fn clear(&mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
