//! In-memory registry of running canary reconcilers.
//!
//! The registry maps canary names to their reconciler handles and last-seen
//! resource versions. It is mutated only by the dispatch loop; the watch
//! engine shares the version side through [`VersionCache`] so it can run the
//! staleness check after a `410 Gone` without touching the handles.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use kube::ResourceExt;

use crate::crd::Canary;

/// Opaque resource-version cursor assigned by the API server.
///
/// Never parsed or incremented locally; only compared for equality and
/// carried forward into watch/list requests.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceVersion(String);

impl ResourceVersion {
    /// The "from the beginning" cursor used after a fresh CRD registration.
    pub fn initial() -> Self {
        Self("0".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ResourceVersion {
    fn from(v: String) -> Self {
        Self(v)
    }
}

impl From<&str> for ResourceVersion {
    fn from(v: &str) -> Self {
        Self(v.to_string())
    }
}

impl std::fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shared `name -> version` map backing the staleness check.
///
/// Written by the dispatch loop (via [`Registry`]), read by the watch engine.
/// The lock is only held for map operations, never across an await point.
#[derive(Clone, Default)]
pub struct VersionCache {
    inner: Arc<RwLock<HashMap<String, ResourceVersion>>>,
}

impl VersionCache {
    pub fn record(&self, name: &str, version: ResourceVersion) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), version);
    }

    pub fn forget(&self, name: &str) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    pub fn clear(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn get(&self, name: &str) -> Option<ResourceVersion> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decide whether the cached state can still be trusted after a relist.
    ///
    /// Stale iff the sizes differ, a relisted name is missing from the cache,
    /// or any version differs. Order of `relisted` never affects the result.
    pub fn is_stale(&self, relisted: &[Canary]) -> bool {
        let cache = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        if cache.len() != relisted.len() {
            return true;
        }
        relisted.iter().any(|canary| {
            let name = canary.name_any();
            match (cache.get(&name), canary.resource_version()) {
                (Some(cached), Some(current)) => cached.as_str() != current,
                _ => true,
            }
        })
    }
}

/// Registry entry: a reconciler handle plus the canary's last-seen version.
///
/// `R` is the reconciler handle type; production code uses
/// [`crate::canary::CanaryWorker`], tests substitute a recording mock.
pub struct Registry<R> {
    workers: HashMap<String, R>,
    versions: VersionCache,
}

impl<R> Registry<R> {
    pub fn new(versions: VersionCache) -> Self {
        Self {
            workers: HashMap::new(),
            versions,
        }
    }

    /// Insert a reconciler for `name`, returning the previous handle if one
    /// existed (duplicate Added events overwrite).
    pub fn insert(&mut self, name: String, worker: R, version: ResourceVersion) -> Option<R> {
        self.versions.record(&name, version);
        self.workers.insert(name, worker)
    }

    pub fn get(&self, name: &str) -> Option<&R> {
        self.workers.get(name)
    }

    pub fn record_version(&mut self, name: &str, version: ResourceVersion) {
        self.versions.record(name, version);
    }

    pub fn remove(&mut self, name: &str) -> Option<R> {
        let worker = self.workers.remove(name);
        if worker.is_some() {
            self.versions.forget(name);
        }
        worker
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn version_of(&self, name: &str) -> Option<ResourceVersion> {
        self.versions.get(name)
    }

    /// Remove every entry, handing the reconcilers back so the caller can
    /// halt them. Used when the pipeline restarts from bootstrap.
    pub fn drain(&mut self) -> Vec<R> {
        self.versions.clear();
        self.workers.drain().map(|(_, worker)| worker).collect()
    }
}
