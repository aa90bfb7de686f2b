// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Property-based tests for canary-operator.
//!
//! Uses proptest to generate random inputs and verify invariants of the
//! staleness check and the dispatcher lifecycle.

use std::collections::HashMap;

use proptest::prelude::*;

use canary_operator::canary::Reconciler;
use canary_operator::controller::dispatcher::Dispatcher;
use canary_operator::controller::registry::VersionCache;
use canary_operator::controller::watch::CanaryEvent;
use canary_operator::crd::{Canary, CanarySpec};

fn make_canary(name: &str, version: u64) -> Canary {
    let mut c = Canary::new(name, CanarySpec::default());
    c.metadata.resource_version = Some(version.to_string());
    c
}

/// Strategy for a set of distinct canary names with versions.
fn cached_state() -> impl Strategy<Value = HashMap<String, u64>> {
    proptest::collection::hash_map("[a-f]{1,6}", 1..10_000u64, 0..8)
}

fn cache_from(state: &HashMap<String, u64>) -> VersionCache {
    let cache = VersionCache::default();
    for (name, version) in state {
        cache.record(name, version.to_string().into());
    }
    cache
}

fn list_from(state: &HashMap<String, u64>) -> Vec<Canary> {
    state
        .iter()
        .map(|(name, version)| make_canary(name, *version))
        .collect()
}

proptest! {
    /// Shuffling the relisted items never changes the staleness verdict.
    #[test]
    fn staleness_is_order_independent(
        state in cached_state(),
        shuffle in any::<u64>(),
    ) {
        let cache = cache_from(&state);
        let mut relisted = list_from(&state);
        // Deterministic pseudo-shuffle driven by the generated seed
        let len = relisted.len();
        if len > 1 {
            for i in 0..len {
                let j = ((shuffle as usize).wrapping_mul(31).wrapping_add(i * 7)) % len;
                relisted.swap(i, j);
            }
        }
        let forward = cache.is_stale(&list_from(&state));
        let shuffled = cache.is_stale(&relisted);
        prop_assert_eq!(forward, shuffled);
    }

    /// A relist that exactly mirrors the cache is never stale.
    #[test]
    fn exact_mirror_is_never_stale(state in cached_state()) {
        let cache = cache_from(&state);
        prop_assert!(!cache.is_stale(&list_from(&state)));
    }

    /// Bumping any single version makes the relist stale.
    #[test]
    fn version_drift_is_always_stale(
        state in cached_state().prop_filter("needs at least one entry", |s| !s.is_empty()),
        pick in any::<proptest::sample::Index>(),
    ) {
        let cache = cache_from(&state);
        let mut drifted = state.clone();
        let name = {
            let names: Vec<&String> = drifted.keys().collect();
            pick.get(&names).to_string()
        };
        if let Some(version) = drifted.get_mut(&name) {
            *version += 1;
        }
        prop_assert!(cache.is_stale(&list_from(&drifted)));
    }

    /// Removing any single entry makes the relist stale.
    #[test]
    fn missing_entry_is_always_stale(
        state in cached_state().prop_filter("needs at least one entry", |s| !s.is_empty()),
        pick in any::<proptest::sample::Index>(),
    ) {
        let cache = cache_from(&state);
        let mut truncated = state.clone();
        let name = {
            let names: Vec<&String> = truncated.keys().collect();
            pick.get(&names).to_string()
        };
        truncated.remove(&name);
        prop_assert!(cache.is_stale(&list_from(&truncated)));
    }
}

/// Reconciler stub for lifecycle properties; the dispatcher only needs the
/// calls to be accepted, not observed.
struct NoopReconciler;

impl Reconciler for NoopReconciler {
    fn update(&self, _canary: &Canary) {}
    fn shutdown(self) {}
}

proptest! {
    /// For any Added -> Modified* -> Deleted sequence, the entry exists after
    /// Added, carries the latest version through Modified, and is gone after
    /// Deleted.
    #[test]
    fn lifecycle_tracks_latest_version(
        name in "[a-z]{1,8}",
        versions in proptest::collection::vec(1..10_000u64, 1..10),
    ) {
        let mut dispatcher = Dispatcher::new(
            VersionCache::default(),
            |_: &Canary| NoopReconciler,
            None,
        );

        let first = versions[0];
        dispatcher.handle(CanaryEvent::Added(make_canary(&name, first))).unwrap();
        prop_assert!(dispatcher.registry().contains(&name));
        prop_assert_eq!(
            dispatcher.registry().version_of(&name),
            Some(first.to_string().as_str().into())
        );

        for version in &versions[1..] {
            dispatcher.handle(CanaryEvent::Modified(make_canary(&name, *version))).unwrap();
            prop_assert!(dispatcher.registry().contains(&name));
            prop_assert_eq!(
                dispatcher.registry().version_of(&name),
                Some(version.to_string().as_str().into())
            );
        }

        dispatcher.handle(CanaryEvent::Deleted(make_canary(&name, *versions.last().unwrap()))).unwrap();
        prop_assert!(!dispatcher.registry().contains(&name));
        prop_assert!(dispatcher.registry().version_of(&name).is_none());
    }
}
