//! Event dispatcher: routes watch events into the reconciler registry.
//!
//! The dispatcher is the single consumer of the event channel and the only
//! writer to the registry, so events for a given canary are applied strictly
//! in arrival order. An update or delete for a canary this process never saw
//! created signals a missed Added event and fails hard rather than being
//! silently absorbed.

use std::sync::Arc;

use kube::ResourceExt;
use tracing::{info, warn};

use crate::canary::Reconciler;
use crate::controller::error::{Error, Result};
use crate::controller::registry::{Registry, ResourceVersion, VersionCache};
use crate::controller::watch::CanaryEvent;
use crate::crd::Canary;
use crate::health::HealthState;

/// Routes decoded canary events into per-canary reconcilers.
///
/// `F` constructs a reconciler handle for a newly observed canary;
/// production wires in [`crate::canary::CanaryWorker::spawn`].
pub struct Dispatcher<R, F>
where
    R: Reconciler,
    F: FnMut(&Canary) -> R,
{
    registry: Registry<R>,
    spawn: F,
    health_state: Option<Arc<HealthState>>,
}

impl<R, F> Dispatcher<R, F>
where
    R: Reconciler,
    F: FnMut(&Canary) -> R,
{
    pub fn new(versions: VersionCache, spawn: F, health_state: Option<Arc<HealthState>>) -> Self {
        Self {
            registry: Registry::new(versions),
            spawn,
            health_state,
        }
    }

    /// Apply one event to the registry.
    ///
    /// Errors from here are protocol violations and must stop the dispatch
    /// loop; they indicate a state bug, not a transient condition.
    pub fn handle(&mut self, event: CanaryEvent) -> Result<()> {
        if let Some(state) = &self.health_state {
            state.metrics.record_event(event.kind());
        }

        match event {
            CanaryEvent::Added(canary) => {
                let name = canary.name_any();
                let version = version_of(&canary)?;
                info!(name = %name, version = %version, "canary added");

                let worker = (self.spawn)(&canary);
                if let Some(replaced) = self.registry.insert(name.clone(), worker, version) {
                    // Duplicate Added events overwrite; halt the old task so
                    // it is not left running unattended
                    warn!(name = %name, "duplicate Added event, replacing reconciler");
                    replaced.shutdown();
                }
            }
            CanaryEvent::Modified(canary) => {
                let name = canary.name_any();
                let version = version_of(&canary)?;
                let worker = self
                    .registry
                    .get(&name)
                    .ok_or_else(|| Error::UnsafeState {
                        name: name.clone(),
                        event: "Modified",
                    })?;
                info!(name = %name, version = %version, "canary modified");
                worker.update(&canary);
                self.registry.record_version(&name, version);
            }
            CanaryEvent::Deleted(canary) => {
                let name = canary.name_any();
                let worker = self.registry.remove(&name).ok_or_else(|| Error::UnsafeState {
                    name: name.clone(),
                    event: "Deleted",
                })?;
                info!(name = %name, "canary deleted");
                worker.shutdown();
            }
        }

        if let Some(state) = &self.health_state {
            state.metrics.set_active_canaries(self.registry.len() as i64);
        }
        Ok(())
    }

    /// Halt every reconciler and clear the registry. Called when the
    /// pipeline restarts from bootstrap so state is rebuilt from scratch.
    pub fn shutdown_all(&mut self) {
        let workers = self.registry.drain();
        if !workers.is_empty() {
            info!(count = workers.len(), "halting all canary reconcilers");
        }
        for worker in workers {
            worker.shutdown();
        }
        if let Some(state) = &self.health_state {
            state.metrics.set_active_canaries(0);
        }
    }

    pub fn registry(&self) -> &Registry<R> {
        &self.registry
    }
}

fn version_of(canary: &Canary) -> Result<ResourceVersion> {
    canary
        .resource_version()
        .map(ResourceVersion::from)
        .ok_or_else(|| Error::MissingVersion {
            name: canary.name_any(),
        })
}
