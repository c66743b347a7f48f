//! Per-conversation async locks.
//!
//! A turn reads history, awaits the provider, then appends the answer. Two
//! turns of the same chat must not interleave those steps, while different
//! chats should never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// Number of idle entries tolerated before `lock` sweeps them.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Default)]
pub struct ConversationLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one conversation. The guard releases it
    /// when dropped.
    pub async fn lock(&self, conversation_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if locks.len() > PRUNE_THRESHOLD {
                Self::retain_busy(&mut locks);
            }
            locks
                .entry(conversation_id.to_string())
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }

    /// Drop entries nobody holds or waits on.
    pub fn prune(&self) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Self::retain_busy(&mut locks);
    }

    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn retain_busy(locks: &mut HashMap<String, Arc<tokio::sync::Mutex<()>>>) {
        // the map's own reference is the only one left on an idle entry
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}
