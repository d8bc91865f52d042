use super::handle::WorkerHandle;
use super::label::WorkerLabel;
use super::shared::{run_loop, WorkerShared};
use super::types::{InterruptPolicy, LifecycleBinding, LoopKind, WorkerId, WorkerState};
use crate::config::WorkerConfig;
use crate::error::{LeakyError, Result};
use crate::events::{EventBus, LifecycleEvent};
use crate::registry::WorkerRegistry;
use chrono::Utc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info};

/// Builder for background workers
pub struct WorkerBuilder {
    label_prefix: String,
    poll_interval: Duration,
    binding: Option<LifecycleBinding>,
    loop_kind: Option<LoopKind>,
    interrupt_policy: Option<InterruptPolicy>,
    registry: Option<Arc<WorkerRegistry>>,
    events: Option<Arc<EventBus>>,
}

impl WorkerBuilder {
    pub fn new() -> Self {
        Self::from_config(&WorkerConfig::default())
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            label_prefix: config.label_prefix.clone(),
            poll_interval: config.poll_interval(),
            binding: None,
            loop_kind: None,
            interrupt_policy: None,
            registry: None,
            events: None,
        }
    }

    pub fn label_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.label_prefix = prefix.into();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn binding(mut self, binding: LifecycleBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    /// Override the loop shape derived from the binding
    pub fn loop_kind(mut self, loop_kind: LoopKind) -> Self {
        self.loop_kind = Some(loop_kind);
        self
    }

    /// Override the interruption handling derived from the binding
    pub fn interrupt_policy(mut self, policy: InterruptPolicy) -> Self {
        self.interrupt_policy = Some(policy);
        self
    }

    /// Registry the worker announces itself to. Defaults to the process-wide one.
    pub fn registry(mut self, registry: Arc<WorkerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<Worker> {
        let binding = self
            .binding
            .ok_or_else(|| LeakyError::system("Worker binding must be specified"))?;

        if self.label_prefix.trim().is_empty() {
            return Err(LeakyError::system("Worker label prefix must not be empty"));
        }

        if self.label_prefix.contains('#') {
            return Err(LeakyError::system("Worker label prefix must not contain '#'"));
        }

        if self.poll_interval.is_zero() {
            return Err(LeakyError::system("Worker poll interval must be greater than 0"));
        }

        let loop_kind = self.loop_kind.unwrap_or_else(|| binding.default_loop_kind());
        let interrupt_policy = self
            .interrupt_policy
            .unwrap_or_else(|| binding.default_interrupt_policy());

        Ok(Worker {
            id: WorkerId::next(),
            label_prefix: self.label_prefix,
            poll_interval: self.poll_interval,
            binding,
            loop_kind,
            interrupt_policy,
            registry: self.registry.unwrap_or_else(WorkerRegistry::global),
            events: self.events,
        })
    }
}

impl Default for WorkerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A worker that has been built but not started
#[derive(Debug)]
pub struct Worker {
    id: WorkerId,
    label_prefix: String,
    poll_interval: Duration,
    binding: LifecycleBinding,
    loop_kind: LoopKind,
    interrupt_policy: InterruptPolicy,
    registry: Arc<WorkerRegistry>,
    events: Option<Arc<EventBus>>,
}

impl Worker {
    pub fn builder() -> WorkerBuilder {
        WorkerBuilder::new()
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn loop_kind(&self) -> LoopKind {
        self.loop_kind
    }

    pub fn interrupt_policy(&self) -> InterruptPolicy {
        self.interrupt_policy
    }

    pub fn binding(&self) -> &LifecycleBinding {
        &self.binding
    }

    /// Start the run loop on its own thread and return immediately.
    ///
    /// Consumes the worker, so a worker can only ever be started once.
    pub fn start(self) -> Result<WorkerHandle> {
        let label = WorkerLabel::new(self.label_prefix.clone(), self.id, WorkerState::Running);
        let shared = Arc::new(WorkerShared::new(
            self.id,
            self.label_prefix,
            self.binding.kind(),
            self.loop_kind,
            self.interrupt_policy,
            self.poll_interval,
            self.events,
        ));

        self.registry.register(&shared);

        let thread_shared = Arc::clone(&shared);
        let registry = Arc::clone(&self.registry);
        let binding = self.binding;

        let spawned = thread::Builder::new()
            .name(format!("leaky-worker-{}", self.id))
            .spawn(move || run_loop(thread_shared, binding, registry));

        let thread = match spawned {
            Ok(thread) => thread,
            Err(source) => {
                error!("Failed to spawn {}: {}", label, source);
                shared.mark_stopped();
                self.registry.deregister(self.id);
                return Err(LeakyError::Spawn {
                    label: label.to_string(),
                    source,
                });
            }
        };

        info!("Started {} [{}]", label, shared.binding);
        shared.publish(LifecycleEvent::WorkerStarted {
            worker_id: shared.id,
            label: label.to_string(),
            binding: shared.binding,
            timestamp: Utc::now(),
        });

        Ok(WorkerHandle::new(shared, thread))
    }
}
