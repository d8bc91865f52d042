use super::label::WorkerLabel;
use super::types::{BindingKind, InterruptPolicy, LifecycleBinding, LoopKind, WorkerId, WorkerState};
use crate::events::{EventBus, LifecycleEvent};
use crate::registry::{WorkerDescriptor, WorkerRegistry};
use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// State shared between a worker thread, its handle and the registry
pub(crate) struct WorkerShared {
    pub(crate) id: WorkerId,
    pub(crate) prefix: String,
    pub(crate) binding: BindingKind,
    pub(crate) loop_kind: LoopKind,
    pub(crate) interrupt_policy: InterruptPolicy,
    pub(crate) poll_interval: Duration,
    pub(crate) started_at: DateTime<Utc>,
    state: AtomicU8,
    cancel_requested: AtomicBool,
    interrupt_pending: AtomicBool,
    interrupt_tx: Sender<()>,
    interrupt_rx: Receiver<()>,
    stopped_lock: Mutex<()>,
    stopped: Condvar,
    events: Option<Arc<EventBus>>,
}

enum Wake {
    Elapsed,
    Interrupted,
}

impl WorkerShared {
    pub(crate) fn new(
        id: WorkerId,
        prefix: String,
        binding: BindingKind,
        loop_kind: LoopKind,
        interrupt_policy: InterruptPolicy,
        poll_interval: Duration,
        events: Option<Arc<EventBus>>,
    ) -> Self {
        let (interrupt_tx, interrupt_rx) = channel::bounded(1);
        Self {
            id,
            prefix,
            binding,
            loop_kind,
            interrupt_policy,
            poll_interval,
            started_at: Utc::now(),
            state: AtomicU8::new(WorkerState::Running.as_u8()),
            cancel_requested: AtomicBool::new(false),
            interrupt_pending: AtomicBool::new(false),
            interrupt_tx,
            interrupt_rx,
            stopped_lock: Mutex::new(()),
            stopped: Condvar::new(),
            events,
        }
    }

    pub(crate) fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn label(&self) -> WorkerLabel {
        WorkerLabel::new(self.prefix.clone(), self.id, self.state())
    }

    pub(crate) fn describe(&self) -> String {
        self.label().to_string()
    }

    pub(crate) fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    pub(crate) fn is_interrupt_pending(&self) -> bool {
        self.interrupt_pending.load(Ordering::Acquire)
    }

    pub(crate) fn descriptor(&self) -> WorkerDescriptor {
        let state = self.state();
        WorkerDescriptor {
            id: self.id,
            state,
            label: WorkerLabel::new(self.prefix.clone(), self.id, state).to_string(),
            binding: self.binding,
            interrupt_pending: self.is_interrupt_pending(),
            started_at: self.started_at,
        }
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Request cooperative termination. Returns true only for the call that
    /// actually moved the worker out of Running.
    pub(crate) fn request_stop(&self) -> bool {
        if self.loop_kind == LoopKind::Unconditional {
            warn!(
                "Worker {} has no cancellation flag; stop request has no effect",
                self.id
            );
            return false;
        }

        if !self.transition(WorkerState::Running, WorkerState::Stopping) {
            debug!(
                "Worker {} already {:?}; stop request ignored",
                self.id,
                self.state()
            );
            return false;
        }

        self.cancel_requested.store(true, Ordering::Release);
        info!("Stop requested for {}", self.describe());
        self.publish(LifecycleEvent::StopRequested {
            worker_id: self.id,
            timestamp: Utc::now(),
        });
        true
    }

    /// Deliver an interruption signal. Whether it is ever observed depends on
    /// the worker's interrupt policy.
    pub(crate) fn interrupt(&self) {
        if !self.state().is_alive() {
            return;
        }

        self.interrupt_pending.store(true, Ordering::Release);
        // A full slot already carries a pending wake-up
        let _ = self.interrupt_tx.try_send(());

        let observed = self.interrupt_policy == InterruptPolicy::Stop;
        if observed {
            debug!("Interrupted {}", self.describe());
        } else {
            warn!(
                "Interrupted {} but its loop never observes interruption",
                self.describe()
            );
        }

        self.publish(LifecycleEvent::WorkerInterrupted {
            worker_id: self.id,
            observed,
            timestamp: Utc::now(),
        });
    }

    /// Block until the worker reaches Stopped or the timeout elapses
    pub(crate) fn wait_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.stopped_lock.lock();
        while self.state().is_alive() {
            if self.stopped.wait_until(&mut guard, deadline).timed_out() {
                return !self.state().is_alive();
            }
        }
        true
    }

    pub(crate) fn mark_stopped(&self) {
        let _guard = self.stopped_lock.lock();
        self.state
            .store(WorkerState::Stopped.as_u8(), Ordering::Release);
        self.stopped.notify_all();
    }

    fn sleep_quantum(&self) -> Wake {
        match self.interrupt_policy {
            InterruptPolicy::Ignore => {
                thread::sleep(self.poll_interval);
                Wake::Elapsed
            }
            InterruptPolicy::Stop => match self.interrupt_rx.recv_timeout(self.poll_interval) {
                Ok(()) => Wake::Interrupted,
                Err(RecvTimeoutError::Timeout) => Wake::Elapsed,
                // The sender lives in self, so this cannot happen while we run
                Err(RecvTimeoutError::Disconnected) => Wake::Interrupted,
            },
        }
    }

    pub(crate) fn publish(&self, event: LifecycleEvent) {
        if let Some(events) = &self.events {
            if let Err(e) = events.publish(event) {
                debug!("Failed to publish lifecycle event: {}", e);
            }
        }
    }
}

/// Body of every worker thread
pub(crate) fn run_loop(
    shared: Arc<WorkerShared>,
    binding: LifecycleBinding,
    registry: Arc<WorkerRegistry>,
) {
    debug!(
        "{} entering {:?} loop ({:?} interrupts, {:?} quantum)",
        shared.describe(),
        shared.loop_kind,
        shared.interrupt_policy,
        shared.poll_interval
    );

    loop {
        if shared.loop_kind == LoopKind::Cooperative && shared.is_cancel_requested() {
            debug!("Worker {} observed cancellation flag", shared.id);
            break;
        }

        match shared.sleep_quantum() {
            Wake::Elapsed => trace!("Worker {} quantum elapsed", shared.id),
            Wake::Interrupted => {
                shared.interrupt_pending.store(false, Ordering::Release);
                shared.transition(WorkerState::Running, WorkerState::Stopping);
                debug!("Worker {} treating interruption as stop", shared.id);
                break;
            }
        }
    }

    // A captured host stays reachable until here
    drop(binding);

    shared.mark_stopped();
    registry.deregister(shared.id);
    info!("Worker {} stopped", shared.id);
    shared.publish(LifecycleEvent::WorkerStopped {
        worker_id: shared.id,
        timestamp: Utc::now(),
    });
}
