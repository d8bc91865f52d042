use crate::error::EventBusError;
use crate::host::{DestroyReason, Pattern};
use crate::worker::{BindingKind, WorkerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle events emitted by workers and hosts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A worker thread was spawned
    WorkerStarted {
        worker_id: WorkerId,
        label: String,
        binding: BindingKind,
        timestamp: DateTime<Utc>,
    },
    /// A handle holder asked a worker to stop
    StopRequested {
        worker_id: WorkerId,
        timestamp: DateTime<Utc>,
    },
    /// A worker was sent an interruption signal
    WorkerInterrupted {
        worker_id: WorkerId,
        observed: bool,
        timestamp: DateTime<Utc>,
    },
    /// A worker's run loop exited
    WorkerStopped {
        worker_id: WorkerId,
        timestamp: DateTime<Utc>,
    },
    /// A host came up, fresh or from saved state
    HostCreated {
        host_id: Uuid,
        pattern: Pattern,
        restored: bool,
        timestamp: DateTime<Utc>,
    },
    /// A host was torn down
    HostDestroyed {
        host_id: Uuid,
        reason: DestroyReason,
        timestamp: DateTime<Utc>,
    },
    /// The host switched to a different pattern
    PatternSelected {
        host_id: Uuid,
        previous: Pattern,
        pattern: Pattern,
        interrupted: usize,
        timestamp: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            LifecycleEvent::WorkerStarted { timestamp, .. }
            | LifecycleEvent::StopRequested { timestamp, .. }
            | LifecycleEvent::WorkerInterrupted { timestamp, .. }
            | LifecycleEvent::WorkerStopped { timestamp, .. }
            | LifecycleEvent::HostCreated { timestamp, .. }
            | LifecycleEvent::HostDestroyed { timestamp, .. }
            | LifecycleEvent::PatternSelected { timestamp, .. } => *timestamp,
        }
    }

    /// Worker the event is about, if any
    pub fn worker_id(&self) -> Option<WorkerId> {
        match self {
            LifecycleEvent::WorkerStarted { worker_id, .. }
            | LifecycleEvent::StopRequested { worker_id, .. }
            | LifecycleEvent::WorkerInterrupted { worker_id, .. }
            | LifecycleEvent::WorkerStopped { worker_id, .. } => Some(*worker_id),
            _ => None,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            LifecycleEvent::WorkerStarted { label, binding, .. } => {
                format!("Started {} [{}]", label, binding)
            }
            LifecycleEvent::StopRequested { worker_id, .. } => {
                format!("Stop requested for worker {}", worker_id)
            }
            LifecycleEvent::WorkerInterrupted {
                worker_id,
                observed,
                ..
            } => {
                if *observed {
                    format!("Worker {} interrupted", worker_id)
                } else {
                    format!("Worker {} interrupted (ignored)", worker_id)
                }
            }
            LifecycleEvent::WorkerStopped { worker_id, .. } => {
                format!("Worker {} stopped", worker_id)
            }
            LifecycleEvent::HostCreated {
                host_id,
                pattern,
                restored,
                ..
            } => {
                let origin = if *restored { "restored" } else { "fresh" };
                format!("Host {} created ({}, {})", host_id, pattern, origin)
            }
            LifecycleEvent::HostDestroyed {
                host_id, reason, ..
            } => {
                format!("Host {} destroyed ({})", host_id, reason)
            }
            LifecycleEvent::PatternSelected {
                previous,
                pattern,
                interrupted,
                ..
            } => {
                format!(
                    "Pattern changed {} -> {} ({} worker(s) interrupted)",
                    previous, pattern, interrupted
                )
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            LifecycleEvent::WorkerStarted { .. } => "worker_started",
            LifecycleEvent::StopRequested { .. } => "stop_requested",
            LifecycleEvent::WorkerInterrupted { .. } => "worker_interrupted",
            LifecycleEvent::WorkerStopped { .. } => "worker_stopped",
            LifecycleEvent::HostCreated { .. } => "host_created",
            LifecycleEvent::HostDestroyed { .. } => "host_destroyed",
            LifecycleEvent::PatternSelected { .. } => "pattern_selected",
        }
    }
}

/// Broadcast bus for lifecycle events.
///
/// Publishing is synchronous so worker threads can emit without a runtime.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter
    pub fn subscribe_filtered(
        &self,
        filter: EventFilter,
        name: impl Into<String>,
    ) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.into())
    }

    /// Publish an event to all subscribers. Returns how many received it.
    pub fn publish(&self, event: LifecycleEvent) -> Result<usize, EventBusError> {
        if self.debug_logging {
            debug!("Publishing event: {}", event.description());
        }

        if self.sender.receiver_count() == 0 {
            return Ok(0);
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Accept only events about one worker
    Worker(WorkerId),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &LifecycleEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Worker(id) => event.worker_id() == Some(*id),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<LifecycleEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    /// Create a new event receiver with a filter
    pub fn new(
        receiver: broadcast::Receiver<LifecycleEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<LifecycleEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged(n));
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::Closed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<LifecycleEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => {
                    return Ok(None);
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged(n));
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::Closed);
                }
            }
        }
    }
}

/// Log every event on the bus until it closes
pub async fn log_events(mut receiver: EventReceiver) {
    loop {
        match receiver.recv().await {
            Ok(event) => info!(event = event.event_type(), "{}", event.description()),
            Err(EventBusError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    fn stopped(id: u64) -> LifecycleEvent {
        LifecycleEvent::WorkerStopped {
            worker_id: WorkerId::from_raw(id),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let subscriber_count = event_bus.publish(stopped(3)).unwrap();
        assert_eq!(subscriber_count, 1);

        match receiver.recv().await.unwrap() {
            LifecycleEvent::WorkerStopped { worker_id, .. } => {
                assert_eq!(worker_id, WorkerId::from_raw(3));
            }
            _ => panic!("Unexpected event type"),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let event_bus = EventBus::new(10);
        assert!(!event_bus.has_subscribers());
        assert_eq!(event_bus.publish(stopped(1)).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();

        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish(stopped(1)).unwrap();

        let _ = timeout(Duration::from_millis(100), receiver1.recv())
            .await
            .unwrap()
            .unwrap();
        let _ = timeout(Duration::from_millis(100), receiver2.recv())
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_event_filter() {
        let by_type = EventFilter::EventTypes(vec!["worker_stopped"]);
        let by_worker = EventFilter::Worker(WorkerId::from_raw(7));

        let host_event = LifecycleEvent::HostDestroyed {
            host_id: Uuid::new_v4(),
            reason: DestroyReason::Final,
            timestamp: Utc::now(),
        };

        assert!(by_type.matches(&stopped(1)));
        assert!(!by_type.matches(&host_event));
        assert!(by_worker.matches(&stopped(7)));
        assert!(!by_worker.matches(&stopped(8)));
        assert!(!by_worker.matches(&host_event));
        assert!(EventFilter::All.matches(&host_event));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let mut filtered =
            event_bus.subscribe_filtered(EventFilter::Worker(WorkerId::from_raw(2)), "test");

        event_bus.publish(stopped(1)).unwrap();
        event_bus.publish(stopped(2)).unwrap();

        let received = timeout(Duration::from_millis(100), filtered.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.worker_id(), Some(WorkerId::from_raw(2)));
        assert!(filtered.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_event_properties() {
        let event = LifecycleEvent::PatternSelected {
            host_id: Uuid::new_v4(),
            previous: Pattern::Captured,
            pattern: Pattern::Cancelable,
            interrupted: 2,
            timestamp: Utc::now(),
        };

        assert_eq!(event.event_type(), "pattern_selected");
        assert_eq!(event.worker_id(), None);
        assert!(event.description().contains("captured -> cancelable"));
        assert!(event.description().contains("2 worker(s)"));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "pattern_selected");
        assert_eq!(json["pattern"], "cancelable");
    }
}
