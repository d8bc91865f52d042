use super::label::WorkerLabel;
use super::shared::WorkerShared;
use super::types::{BindingKind, InterruptPolicy, LoopKind, WorkerId, WorkerState};
use crate::error::{LeakyError, Result};
use crate::registry::WorkerDescriptor;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Owning reference to a started worker.
///
/// Holding a handle is the only way to call [`WorkerHandle::stop`]. Dropping it
/// detaches the worker, which keeps running.
pub struct WorkerHandle {
    shared: Arc<WorkerShared>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub(crate) fn new(shared: Arc<WorkerShared>, thread: JoinHandle<()>) -> Self {
        Self {
            shared,
            thread: Some(thread),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.shared.id
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    pub fn binding(&self) -> BindingKind {
        self.shared.binding
    }

    pub fn loop_kind(&self) -> LoopKind {
        self.shared.loop_kind
    }

    pub fn interrupt_policy(&self) -> InterruptPolicy {
        self.shared.interrupt_policy
    }

    pub fn poll_interval(&self) -> Duration {
        self.shared.poll_interval
    }

    /// Display label, e.g. `Background Thread #3 (running...)`
    pub fn describe(&self) -> String {
        self.shared.describe()
    }

    pub fn label(&self) -> WorkerLabel {
        self.shared.label()
    }

    pub fn descriptor(&self) -> WorkerDescriptor {
        self.shared.descriptor()
    }

    /// Request cooperative termination, observed within one poll interval.
    ///
    /// Safe to call from any thread and any number of times; only the first
    /// call on a running cooperative worker returns true.
    pub fn stop(&self) -> bool {
        self.shared.request_stop()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.shared.is_cancel_requested()
    }

    pub fn is_interrupt_pending(&self) -> bool {
        self.shared.is_interrupt_pending()
    }

    pub fn is_finished(&self) -> bool {
        match &self.thread {
            Some(thread) => thread.is_finished(),
            None => true,
        }
    }

    /// Wait up to `timeout` for the worker to reach Stopped
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        self.shared.wait_stopped(timeout)
    }

    /// Join the worker thread. Never returns for a worker that cannot be stopped.
    pub fn join(mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| LeakyError::system(format!("worker {} panicked", self.shared.id))),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("label", &self.describe())
            .field("binding", &self.binding())
            .finish()
    }
}
