use crate::worker::{BindingKind, WorkerId, WorkerShared, WorkerState};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, Weak};
use tracing::{debug, info};

static GLOBAL_REGISTRY: LazyLock<Arc<WorkerRegistry>> =
    LazyLock::new(|| Arc::new(WorkerRegistry::new()));

/// Snapshot of one live worker as seen by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerDescriptor {
    pub id: WorkerId,
    pub state: WorkerState,
    pub label: String,
    pub binding: BindingKind,
    pub interrupt_pending: bool,
    pub started_at: DateTime<Utc>,
}

/// Process-wide enumeration of live workers.
///
/// Entries are weak: the registry never keeps a worker or anything it captured
/// alive. Liveness is checked when an entry is read, not trusted from the map.
pub struct WorkerRegistry {
    entries: RwLock<HashMap<WorkerId, Weak<WorkerShared>>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The registry every worker joins unless told otherwise
    pub fn global() -> Arc<WorkerRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    pub(crate) fn register(&self, shared: &Arc<WorkerShared>) {
        let mut entries = self.entries.write();
        entries.retain(|_, entry| entry.strong_count() > 0);
        entries.insert(shared.id, Arc::downgrade(shared));
        debug!(
            "Registered worker {} ({} tracked)",
            shared.id,
            entries.len()
        );
    }

    pub(crate) fn deregister(&self, id: WorkerId) {
        if self.entries.write().remove(&id).is_some() {
            debug!("Deregistered worker {}", id);
        }
    }

    fn snapshot(&self) -> Vec<Weak<WorkerShared>> {
        self.entries.read().values().cloned().collect()
    }

    /// Lazily enumerate live workers whose label starts with `prefix`.
    ///
    /// Each call takes a fresh snapshot; each element is re-checked for
    /// liveness as the iterator reaches it.
    pub fn list_active(&self, prefix: &str) -> ActiveWorkers {
        ActiveWorkers {
            entries: self.snapshot().into_iter(),
            prefix: prefix.to_string(),
        }
    }

    pub fn active_count(&self, prefix: &str) -> usize {
        self.list_active(prefix).count()
    }

    /// Interrupt every live worker whose label starts with `prefix`,
    /// whatever its binding. Returns how many were signalled.
    pub fn interrupt_all(&self, prefix: &str) -> usize {
        let mut interrupted = 0;
        for shared in self.live_matching(prefix) {
            shared.interrupt();
            interrupted += 1;
        }
        info!("Interrupted {} worker(s) matching '{}'", interrupted, prefix);
        interrupted
    }

    fn live_matching(&self, prefix: &str) -> Vec<Arc<WorkerShared>> {
        self.snapshot()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|shared| shared.state().is_alive() && shared.describe().starts_with(prefix))
            .collect()
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("tracked", &self.entries.read().len())
            .finish()
    }
}

/// Iterator returned by [`WorkerRegistry::list_active`]
pub struct ActiveWorkers {
    entries: std::vec::IntoIter<Weak<WorkerShared>>,
    prefix: String,
}

impl Iterator for ActiveWorkers {
    type Item = WorkerDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        for entry in self.entries.by_ref() {
            let Some(shared) = entry.upgrade() else {
                continue;
            };
            let descriptor = shared.descriptor();
            if descriptor.state.is_alive() && descriptor.label.starts_with(&self.prefix) {
                return Some(descriptor);
            }
        }
        None
    }
}
