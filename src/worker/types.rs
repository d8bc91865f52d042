use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique worker identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(u64);

impl WorkerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Worker lifecycle states. Stopped is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Running,
    Stopping,
    Stopped,
}

impl WorkerState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            WorkerState::Running => 0,
            WorkerState::Stopping => 1,
            WorkerState::Stopped => 2,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => WorkerState::Running,
            1 => WorkerState::Stopping,
            _ => WorkerState::Stopped,
        }
    }

    pub fn is_alive(&self) -> bool {
        !matches!(self, WorkerState::Stopped)
    }
}

/// Ownership relationship between a worker and the host that created it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    /// Worker holds a strong reference to its host
    Captured,
    /// Worker holds nothing, host holds nothing
    Detached,
    /// Worker holds nothing, host retains the handle and stops it on teardown
    DetachedCancelable,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BindingKind::Captured => "captured",
            BindingKind::Detached => "detached",
            BindingKind::DetachedCancelable => "detached+cancelable",
        };
        f.write_str(name)
    }
}

/// Anything a captured worker can keep alive
pub trait HostContext: Send + Sync {
    fn instance_id(&self) -> Uuid;
}

/// Link between a worker and its host, fixed when the worker is built.
///
/// The `Captured` payload moves into the worker thread and is released only when
/// the run loop exits.
#[derive(Clone)]
pub enum LifecycleBinding {
    Captured(Arc<dyn HostContext>),
    Detached,
    DetachedCancelable,
}

impl LifecycleBinding {
    pub fn kind(&self) -> BindingKind {
        match self {
            LifecycleBinding::Captured(_) => BindingKind::Captured,
            LifecycleBinding::Detached => BindingKind::Detached,
            LifecycleBinding::DetachedCancelable => BindingKind::DetachedCancelable,
        }
    }

    pub(crate) fn default_loop_kind(&self) -> LoopKind {
        match self {
            LifecycleBinding::Captured(_) => LoopKind::Unconditional,
            LifecycleBinding::Detached | LifecycleBinding::DetachedCancelable => {
                LoopKind::Cooperative
            }
        }
    }

    pub(crate) fn default_interrupt_policy(&self) -> InterruptPolicy {
        match self {
            LifecycleBinding::Captured(_) | LifecycleBinding::Detached => InterruptPolicy::Ignore,
            LifecycleBinding::DetachedCancelable => InterruptPolicy::Stop,
        }
    }
}

impl fmt::Debug for LifecycleBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleBinding::Captured(host) => f
                .debug_tuple("Captured")
                .field(&host.instance_id())
                .finish(),
            LifecycleBinding::Detached => f.write_str("Detached"),
            LifecycleBinding::DetachedCancelable => f.write_str("DetachedCancelable"),
        }
    }
}

/// Shape of the run loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopKind {
    /// Never checks a cancellation flag
    Unconditional,
    /// Checks the cancellation flag before every quantum
    Cooperative,
}

/// What an interruption delivered during sleep does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptPolicy {
    /// Sleep is not interruptible; the signal stays pending and is never observed
    Ignore,
    /// Sleep wakes and the loop exits as if stopped
    Stop,
}
