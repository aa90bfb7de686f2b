//! Staleness-check scenarios for 410 Gone recovery.
//!
//! After a watch cursor expires, the engine relists and compares the result
//! against the cached `name -> version` map. Only an exact match allows the
//! watch to resume without rebuilding state.

use canary_operator::controller::registry::VersionCache;

use crate::fixtures::canary;

fn cache(entries: &[(&str, &str)]) -> VersionCache {
    let cache = VersionCache::default();
    for (name, version) in entries {
        cache.record(name, (*version).into());
    }
    cache
}

#[test]
fn test_matching_relist_is_not_stale() {
    // Relist returns exactly the cached set: the engine may resume watching
    let cache = cache(&[("a", "10"), ("b", "11")]);
    let relisted = vec![canary("a", "10"), canary("b", "11")];

    assert!(!cache.is_stale(&relisted));
    // The check itself never mutates the cache
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get("a"), Some("10".into()));
}

#[test]
fn test_missing_cached_name_is_stale() {
    // Relist is missing a cached name: state must be rebuilt
    let cache = cache(&[("a", "10"), ("b", "11")]);
    let relisted = vec![canary("a", "10")];

    assert!(cache.is_stale(&relisted));
}

#[test]
fn test_extra_relisted_name_is_stale() {
    let cache = cache(&[("a", "10")]);
    let relisted = vec![canary("a", "10"), canary("new", "12")];

    assert!(cache.is_stale(&relisted));
}

#[test]
fn test_version_drift_is_stale() {
    let cache = cache(&[("a", "10"), ("b", "11")]);
    let relisted = vec![canary("a", "10"), canary("b", "99")];

    assert!(cache.is_stale(&relisted));
}

#[test]
fn test_renamed_entry_is_stale_despite_equal_size() {
    let cache = cache(&[("a", "10"), ("b", "11")]);
    let relisted = vec![canary("a", "10"), canary("c", "11")];

    assert!(cache.is_stale(&relisted));
}

#[test]
fn test_result_is_order_independent() {
    let cache = cache(&[("a", "10"), ("b", "11"), ("c", "12")]);

    let orders = [
        vec![canary("a", "10"), canary("b", "11"), canary("c", "12")],
        vec![canary("c", "12"), canary("a", "10"), canary("b", "11")],
        vec![canary("b", "11"), canary("c", "12"), canary("a", "10")],
    ];
    for relisted in &orders {
        assert!(!cache.is_stale(relisted));
    }
}
