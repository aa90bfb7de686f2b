//! Dispatcher lifecycle scenarios.

use canary_operator::controller::dispatcher::Dispatcher;
use canary_operator::controller::error::Error;
use canary_operator::controller::registry::VersionCache;
use canary_operator::controller::watch::CanaryEvent;
use canary_operator::crd::Canary;

use crate::fixtures::canary;
use crate::mock_reconciler::{MockReconciler, ReconcilerLog};

type MockDispatcher = Dispatcher<MockReconciler, Box<dyn FnMut(&Canary) -> MockReconciler>>;

fn dispatcher(log: &ReconcilerLog) -> MockDispatcher {
    let log = log.clone();
    Dispatcher::new(
        VersionCache::default(),
        Box::new(move |c: &Canary| MockReconciler::new(c, log.clone())),
        None,
    )
}

#[test]
fn test_added_then_modified_updates_version() {
    // Watch delivers Added{a, v1} then Modified{a, v2}; the final registry
    // version for "a" must be "2"
    let log = ReconcilerLog::default();
    let mut dispatcher = dispatcher(&log);

    dispatcher.handle(CanaryEvent::Added(canary("a", "1"))).unwrap();
    dispatcher.handle(CanaryEvent::Modified(canary("a", "2"))).unwrap();

    assert!(dispatcher.registry().contains("a"));
    assert_eq!(dispatcher.registry().version_of("a"), Some("2".into()));
    assert_eq!(log.entries(), vec!["create a", "update a @2"]);
}

#[test]
fn test_full_lifecycle_removes_entry() {
    let log = ReconcilerLog::default();
    let mut dispatcher = dispatcher(&log);

    dispatcher.handle(CanaryEvent::Added(canary("a", "1"))).unwrap();
    assert!(dispatcher.registry().contains("a"));

    dispatcher.handle(CanaryEvent::Modified(canary("a", "2"))).unwrap();
    assert!(dispatcher.registry().contains("a"));

    dispatcher.handle(CanaryEvent::Deleted(canary("a", "3"))).unwrap();
    assert!(!dispatcher.registry().contains("a"));
    assert!(dispatcher.registry().version_of("a").is_none());

    // The reconciler was told to stop before the entry disappeared
    assert_eq!(log.entries(), vec!["create a", "update a @2", "shutdown a"]);
}

#[test]
fn test_modified_without_added_is_unsafe_state() {
    let log = ReconcilerLog::default();
    let mut dispatcher = dispatcher(&log);

    let err = dispatcher
        .handle(CanaryEvent::Modified(canary("ghost", "5")))
        .unwrap_err();

    assert!(matches!(
        err,
        Error::UnsafeState { ref name, event: "Modified" } if name == "ghost"
    ));
    assert!(err.is_protocol_violation());
    // Registry unchanged, no reconciler ever constructed
    assert!(dispatcher.registry().is_empty());
    assert!(log.entries().is_empty());
}

#[test]
fn test_deleted_without_added_is_unsafe_state() {
    let log = ReconcilerLog::default();
    let mut dispatcher = dispatcher(&log);

    let err = dispatcher
        .handle(CanaryEvent::Deleted(canary("ghost", "5")))
        .unwrap_err();

    assert!(matches!(
        err,
        Error::UnsafeState { ref name, event: "Deleted" } if name == "ghost"
    ));
    assert!(dispatcher.registry().is_empty());
    assert!(log.entries().is_empty());
}

#[test]
fn test_duplicate_added_replaces_and_halts_old_reconciler() {
    let log = ReconcilerLog::default();
    let mut dispatcher = dispatcher(&log);

    dispatcher.handle(CanaryEvent::Added(canary("a", "1"))).unwrap();
    dispatcher.handle(CanaryEvent::Added(canary("a", "4"))).unwrap();

    assert_eq!(dispatcher.registry().len(), 1);
    assert_eq!(dispatcher.registry().version_of("a"), Some("4".into()));
    // The replaced reconciler is not left running
    assert_eq!(log.entries(), vec!["create a", "create a", "shutdown a"]);
}

#[test]
fn test_independent_canaries_do_not_interfere() {
    let log = ReconcilerLog::default();
    let mut dispatcher = dispatcher(&log);

    dispatcher.handle(CanaryEvent::Added(canary("a", "1"))).unwrap();
    dispatcher.handle(CanaryEvent::Added(canary("b", "2"))).unwrap();
    dispatcher.handle(CanaryEvent::Deleted(canary("a", "3"))).unwrap();

    assert!(!dispatcher.registry().contains("a"));
    assert!(dispatcher.registry().contains("b"));
    assert_eq!(dispatcher.registry().version_of("b"), Some("2".into()));
}

#[test]
fn test_shutdown_all_halts_everything() {
    let log = ReconcilerLog::default();
    let mut dispatcher = dispatcher(&log);

    dispatcher.handle(CanaryEvent::Added(canary("a", "1"))).unwrap();
    dispatcher.handle(CanaryEvent::Added(canary("b", "2"))).unwrap();

    dispatcher.shutdown_all();

    assert!(dispatcher.registry().is_empty());
    let entries = log.entries();
    assert!(entries.contains(&"shutdown a".to_string()));
    assert!(entries.contains(&"shutdown b".to_string()));
}

#[test]
fn test_recovery_seed_matches_list_contents() {
    // "Already exists" bootstrap: list returns {rv 42, items [{a, v10}]};
    // seeding the registry through Added events must leave {"a": "10"}
    let log = ReconcilerLog::default();
    let mut dispatcher = dispatcher(&log);

    let existing = vec![canary("a", "10")];
    for item in existing {
        dispatcher.handle(CanaryEvent::Added(item)).unwrap();
    }

    assert_eq!(dispatcher.registry().len(), 1);
    assert_eq!(dispatcher.registry().version_of("a"), Some("10".into()));
}
