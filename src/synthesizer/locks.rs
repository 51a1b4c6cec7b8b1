//! Per-resource execution locks
//!
//! Guards are always acquired in sorted resource order, so two actions with
//! overlapping resources serialize and can never deadlock.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct ResourceLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held locks; released on drop
pub struct ResourceGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, resource: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(resource.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Lock every resource in `resources` (sorted, deduplicated)
    pub async fn acquire(&self, resources: &[String]) -> ResourceGuard {
        let mut sorted: Vec<&String> = resources.iter().collect();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for resource in sorted {
            let lock = self.lock_for(resource);
            guards.push(lock.lock_owned().await);
        }
        ResourceGuard { _guards: guards }
    }
}
