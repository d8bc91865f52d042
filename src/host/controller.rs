use super::types::{DestroyReason, Pattern, SavedState};
use crate::config::{LeakyConfig, WorkerConfig};
use crate::error::Result;
use crate::events::{EventBus, LifecycleEvent};
use crate::registry::{WorkerDescriptor, WorkerRegistry};
use crate::worker::{HostContext, LifecycleBinding, WorkerBuilder, WorkerHandle, WorkerId};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Weak};
use tracing::{debug, info};
use uuid::Uuid;

/// Everything a host needs to start workers
#[derive(Debug, Clone)]
pub struct HostEnvironment {
    pub registry: Arc<WorkerRegistry>,
    pub worker: WorkerConfig,
    pub default_pattern: Pattern,
    pub events: Option<Arc<EventBus>>,
}

impl HostEnvironment {
    pub fn from_config(config: &LeakyConfig) -> Self {
        Self {
            registry: WorkerRegistry::global(),
            worker: config.worker.clone(),
            default_pattern: config.host.default_pattern,
            events: None,
        }
    }

    pub fn with_registry(mut self, registry: Arc<WorkerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Prefix that isolates this deployment's workers in the registry
    pub fn label_filter(&self) -> String {
        format!("{} #", self.worker.label_prefix)
    }
}

/// Identity of one host instance. This is what a captured worker keeps alive.
#[derive(Debug)]
pub struct HostState {
    instance_id: Uuid,
    created_at: DateTime<Utc>,
}

impl HostState {
    fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl HostContext for HostState {
    fn instance_id(&self) -> Uuid {
        self.instance_id
    }
}

/// A transient host that starts one worker per activation.
///
/// Recreation builds a brand new controller from [`SavedState`]; the old one
/// runs its teardown hook and is gone. Workers it discarded are never told.
pub struct HostController {
    state: Arc<HostState>,
    env: HostEnvironment,
    pattern: Pattern,
    worker: Option<WorkerHandle>,
    last_worker: Option<WorkerId>,
    torn_down: bool,
}

impl HostController {
    /// Bring a host up, restoring the selected pattern if there is saved state,
    /// and activate its worker.
    pub fn create(env: HostEnvironment, saved: Option<SavedState>) -> Result<Self> {
        let restored = saved.is_some();
        let pattern = saved.map_or(env.default_pattern, |s| s.pattern);

        let mut host = Self {
            state: Arc::new(HostState::new()),
            env,
            pattern,
            worker: None,
            last_worker: None,
            torn_down: false,
        };

        info!(
            "Host {} created with pattern {} ({})",
            host.instance_id(),
            pattern,
            if restored { "restored" } else { "fresh" }
        );
        host.publish(LifecycleEvent::HostCreated {
            host_id: host.instance_id(),
            pattern,
            restored,
            timestamp: Utc::now(),
        });

        host.activate()?;
        Ok(host)
    }

    pub fn instance_id(&self) -> Uuid {
        self.state.instance_id()
    }

    pub fn pattern(&self) -> Pattern {
        self.pattern
    }

    pub fn environment(&self) -> &HostEnvironment {
        &self.env
    }

    /// Weak view of this host, to observe whether anything still holds it
    pub fn downgrade(&self) -> Weak<HostState> {
        Arc::downgrade(&self.state)
    }

    /// The handle this host retained, if its pattern keeps one
    pub fn worker_handle(&self) -> Option<&WorkerHandle> {
        self.worker.as_ref()
    }

    /// Id of the most recently started worker, handle or not
    pub fn last_worker(&self) -> Option<WorkerId> {
        self.last_worker
    }

    fn binding(&self) -> LifecycleBinding {
        match self.pattern {
            Pattern::Captured => LifecycleBinding::Captured(Arc::clone(&self.state) as _),
            Pattern::Detached => LifecycleBinding::Detached,
            Pattern::Cancelable => LifecycleBinding::DetachedCancelable,
        }
    }

    /// Start exactly one worker for the selected pattern
    pub fn activate(&mut self) -> Result<WorkerId> {
        let mut builder = WorkerBuilder::from_config(&self.env.worker)
            .binding(self.binding())
            .registry(Arc::clone(&self.env.registry));
        if let Some(events) = &self.env.events {
            builder = builder.event_bus(Arc::clone(events));
        }

        let handle = builder.build()?.start()?;
        let id = handle.id();
        self.last_worker = Some(id);

        match self.pattern {
            Pattern::Cancelable => {
                if let Some(previous) = self.worker.replace(handle) {
                    debug!(
                        "Host {} replaced handle to worker {}",
                        self.instance_id(),
                        previous.id()
                    );
                }
            }
            Pattern::Captured | Pattern::Detached => {
                debug!(
                    "Host {} discards handle to worker {} ({})",
                    self.instance_id(),
                    id,
                    self.pattern
                );
            }
        }

        Ok(id)
    }

    /// Switch patterns. Interrupts every worker of this deployment first,
    /// then activates the new pattern. Returns false if nothing changed.
    pub fn select(&mut self, pattern: Pattern) -> Result<bool> {
        if pattern == self.pattern {
            return Ok(false);
        }

        let previous = self.pattern;
        let interrupted = self.reset_workers();
        self.worker = None;
        self.pattern = pattern;

        info!(
            "Host {} switched {} -> {}",
            self.instance_id(),
            previous,
            pattern
        );
        self.publish(LifecycleEvent::PatternSelected {
            host_id: self.instance_id(),
            previous,
            pattern,
            interrupted,
            timestamp: Utc::now(),
        });

        self.activate()?;
        Ok(true)
    }

    pub fn save_state(&self) -> SavedState {
        SavedState {
            pattern: self.pattern,
        }
    }

    /// Tear this host down and build its replacement from saved state
    pub fn recreate(self) -> Result<HostController> {
        let saved = self.save_state();
        let env = self.env.clone();
        let previous = self.instance_id();

        self.destroy(DestroyReason::Recreation);

        let host = HostController::create(env, Some(saved))?;
        info!("Host {} recreated as {}", previous, host.instance_id());
        Ok(host)
    }

    pub fn destroy(mut self, reason: DestroyReason) {
        self.teardown(reason);
    }

    /// Teardown hook: stop the retained worker if there is one, nothing else
    fn teardown(&mut self, reason: DestroyReason) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Some(handle) = self.worker.take() {
            info!(
                "Host {} stopping retained worker {}",
                self.instance_id(),
                handle.id()
            );
            handle.stop();
        }

        info!("Host {} destroyed ({})", self.instance_id(), reason);
        self.publish(LifecycleEvent::HostDestroyed {
            host_id: self.instance_id(),
            reason,
            timestamp: Utc::now(),
        });
    }

    /// Every live worker of this deployment
    pub fn active_workers(&self) -> Vec<WorkerDescriptor> {
        self.env
            .registry
            .list_active(&self.env.label_filter())
            .collect()
    }

    /// Labels for display: live workers of this deployment that have not
    /// been interrupted
    pub fn status_lines(&self) -> Vec<String> {
        self.env
            .registry
            .list_active(&self.env.label_filter())
            .filter(|worker| !worker.interrupt_pending)
            .map(|worker| worker.label)
            .collect()
    }

    /// Interrupt every worker of this deployment
    pub fn reset_workers(&self) -> usize {
        self.env.registry.interrupt_all(&self.env.label_filter())
    }

    fn publish(&self, event: LifecycleEvent) {
        if let Some(events) = &self.env.events {
            if let Err(e) = events.publish(event) {
                debug!("Failed to publish host event: {}", e);
            }
        }
    }
}

impl Drop for HostController {
    fn drop(&mut self) {
        self.teardown(DestroyReason::Final);
    }
}

impl std::fmt::Debug for HostController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostController")
            .field("instance_id", &self.instance_id())
            .field("pattern", &self.pattern)
            .field("worker", &self.worker)
            .finish()
    }
}
