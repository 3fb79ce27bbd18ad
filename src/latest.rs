// Best-effort "most recent match" for the activity display.
//
// Not authoritative and not persisted. The recorder sets it after a 1v1
// submission commits and the replayer clears it, since the ratings it
// shows go stale once history is rewritten.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::db::MatchRecord;

#[derive(Clone, Default)]
pub struct LatestMatch {
    inner: Arc<Mutex<Option<MatchRecord>>>,
}

impl LatestMatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, record: MatchRecord) {
        *self.lock() = Some(record);
    }

    pub fn get(&self) -> Option<MatchRecord> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    // A panic while holding the lock cannot leave the option half-written.
    fn lock(&self) -> MutexGuard<'_, Option<MatchRecord>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
