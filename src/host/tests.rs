use super::*;
use crate::config::WorkerConfig;
use crate::events::{EventBus, EventFilter, LifecycleEvent};
use crate::registry::WorkerRegistry;
use crate::worker::{BindingKind, WorkerState};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const QUANTUM_MS: u64 = 50;
const STOP_BOUND: Duration = Duration::from_millis(250);

fn create_test_env(default_pattern: Pattern) -> HostEnvironment {
    HostEnvironment {
        registry: Arc::new(WorkerRegistry::new()),
        worker: WorkerConfig {
            poll_interval_ms: QUANTUM_MS,
            label_prefix: "Background Thread".to_string(),
        },
        default_pattern,
        events: None,
    }
}

fn wait_until_listed_count(env: &HostEnvironment, expected: usize) -> usize {
    let deadline = Instant::now() + STOP_BOUND;
    loop {
        let count = env.registry.active_count(&env.label_filter());
        if count == expected || Instant::now() >= deadline {
            return count;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

fn is_listed(env: &HostEnvironment, id: crate::worker::WorkerId) -> bool {
    env.registry
        .list_active(&env.label_filter())
        .any(|worker| worker.id == id)
}

#[test]
fn test_create_uses_default_pattern() {
    let env = create_test_env(Pattern::Detached);
    let host = HostController::create(env.clone(), None).unwrap();

    assert_eq!(host.pattern(), Pattern::Detached);
    assert!(host.worker_handle().is_none());

    let workers = host.active_workers();
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0].binding, BindingKind::Detached);
    assert_eq!(Some(workers[0].id), host.last_worker());
}

#[test]
fn test_captured_worker_survives_recreation() {
    let env = create_test_env(Pattern::Captured);
    let host = HostController::create(env.clone(), None).unwrap();
    let first_worker = host.last_worker().unwrap();
    let first_host = host.downgrade();

    let host = host.recreate().unwrap();
    thread::sleep(Duration::from_millis(QUANTUM_MS * 2));

    // Old worker still running, and it is still holding the old host
    assert!(is_listed(&env, first_worker));
    assert!(first_host.upgrade().is_some());
    assert_ne!(host.last_worker(), Some(first_worker));
    assert_eq!(host.active_workers().len(), 2);
}

#[test]
fn test_detached_worker_survives_recreation_without_leaking_host() {
    let env = create_test_env(Pattern::Detached);
    let host = HostController::create(env.clone(), None).unwrap();
    let first_worker = host.last_worker().unwrap();
    let first_host = host.downgrade();

    let host = host.recreate().unwrap();
    thread::sleep(Duration::from_millis(QUANTUM_MS * 2));

    assert!(is_listed(&env, first_worker));
    assert!(first_host.upgrade().is_none());
    assert_eq!(host.active_workers().len(), 2);
}

#[test]
fn test_leaks_accumulate_across_recreations() {
    let env = create_test_env(Pattern::Captured);
    let mut host = HostController::create(env.clone(), None).unwrap();

    for _ in 0..3 {
        host = host.recreate().unwrap();
    }

    assert_eq!(env.registry.active_count(&env.label_filter()), 4);
    assert_eq!(host.status_lines().len(), 4);
}

#[test]
fn test_cancelable_worker_stopped_on_recreation() {
    let env = create_test_env(Pattern::Cancelable);
    let host = HostController::create(env.clone(), None).unwrap();
    let first_worker = host.last_worker().unwrap();
    assert!(host.worker_handle().is_some());

    let host = host.recreate().unwrap();

    assert_eq!(wait_until_listed_count(&env, 1), 1);
    assert!(!is_listed(&env, first_worker));
    assert_eq!(host.pattern(), Pattern::Cancelable);
    assert_eq!(
        host.worker_handle().map(|h| h.state()),
        Some(WorkerState::Running)
    );
}

#[test]
fn test_final_teardown_stops_cancelable_worker() {
    let env = create_test_env(Pattern::Cancelable);
    let host = HostController::create(env.clone(), None).unwrap();

    host.destroy(DestroyReason::Final);
    assert_eq!(wait_until_listed_count(&env, 0), 0);
}

#[test]
fn test_drop_runs_teardown() {
    let env = create_test_env(Pattern::Cancelable);
    {
        let _host = HostController::create(env.clone(), None).unwrap();
        assert_eq!(env.registry.active_count(&env.label_filter()), 1);
    }
    assert_eq!(wait_until_listed_count(&env, 0), 0);
}

#[test]
fn test_final_teardown_leaves_discarded_workers_running() {
    let env = create_test_env(Pattern::Detached);
    let host = HostController::create(env.clone(), None).unwrap();

    host.destroy(DestroyReason::Final);
    thread::sleep(Duration::from_millis(QUANTUM_MS * 2));
    assert_eq!(env.registry.active_count(&env.label_filter()), 1);
}

#[test]
fn test_saved_state_survives_recreation() {
    let env = create_test_env(Pattern::Captured);
    let mut host = HostController::create(env.clone(), None).unwrap();
    host.select(Pattern::Cancelable).unwrap();

    let saved = host.save_state();
    assert_eq!(saved.pattern, Pattern::Cancelable);

    let host = host.recreate().unwrap();
    assert_eq!(host.pattern(), Pattern::Cancelable);
    assert!(host.worker_handle().is_some());
}

#[test]
fn test_select_same_pattern_is_a_no_op() {
    let env = create_test_env(Pattern::Detached);
    let mut host = HostController::create(env.clone(), None).unwrap();
    let worker = host.last_worker();

    assert!(!host.select(Pattern::Detached).unwrap());
    assert_eq!(host.last_worker(), worker);
    assert_eq!(env.registry.active_count(&env.label_filter()), 1);
}

#[test]
fn test_select_resets_cancelable_worker() {
    let env = create_test_env(Pattern::Cancelable);
    let mut host = HostController::create(env.clone(), None).unwrap();
    let first_worker = host.last_worker().unwrap();

    assert!(host.select(Pattern::Detached).unwrap());
    assert!(host.worker_handle().is_none());

    assert_eq!(wait_until_listed_count(&env, 1), 1);
    assert!(!is_listed(&env, first_worker));
}

#[test]
fn test_select_cannot_reset_captured_worker() {
    let env = create_test_env(Pattern::Captured);
    let mut host = HostController::create(env.clone(), None).unwrap();
    let leaked = host.last_worker().unwrap();

    assert!(host.select(Pattern::Cancelable).unwrap());
    thread::sleep(Duration::from_millis(QUANTUM_MS * 2));

    // Still executing, so the registry lists it...
    assert!(is_listed(&env, leaked));
    // ...but the host hides interrupted workers from its status
    let lines = host.status_lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("Background Thread #"));
    assert!(lines[0].ends_with("(running...)"));
    assert!(!lines[0].contains(&format!("#{} ", leaked)));
}

#[test]
fn test_status_lines_only_show_this_deployment() {
    let env = create_test_env(Pattern::Detached);
    let host = HostController::create(env.clone(), None).unwrap();

    // A worker from something else in the same process
    let foreign = crate::worker::Worker::builder()
        .label_prefix("Background Threadpool")
        .poll_interval(Duration::from_millis(QUANTUM_MS))
        .binding(crate::worker::LifecycleBinding::DetachedCancelable)
        .registry(Arc::clone(&env.registry))
        .build()
        .unwrap()
        .start()
        .unwrap();

    assert_eq!(host.status_lines().len(), 1);
    assert_eq!(env.registry.active_count("Background Thread"), 2);

    foreign.stop();
    assert!(foreign.wait_stopped(STOP_BOUND));
}

#[tokio::test]
async fn test_host_events() {
    let events = Arc::new(EventBus::new(32));
    let mut receiver = events.subscribe_filtered(
        EventFilter::EventTypes(vec!["host_created", "host_destroyed"]),
        "host-test",
    );
    let env = create_test_env(Pattern::Detached).with_event_bus(Arc::clone(&events));

    let host = HostController::create(env, None).unwrap();
    let first_id = host.instance_id();
    let host = host.recreate().unwrap();
    let second_id = host.instance_id();

    let mut seen = Vec::new();
    while let Some(event) = receiver.try_recv().unwrap() {
        seen.push(event);
    }

    assert_eq!(seen.len(), 3);
    assert!(matches!(
        seen[0],
        LifecycleEvent::HostCreated { host_id, restored: false, .. } if host_id == first_id
    ));
    assert!(matches!(
        seen[1],
        LifecycleEvent::HostDestroyed { host_id, reason: DestroyReason::Recreation, .. }
            if host_id == first_id
    ));
    assert!(matches!(
        seen[2],
        LifecycleEvent::HostCreated { host_id, restored: true, .. } if host_id == second_id
    ));
}
