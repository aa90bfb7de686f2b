//! Per-canary reconciler tasks.
//!
//! Each tracked Canary gets one independent tokio task driven by a periodic
//! tick and a halt signal. The dispatcher talks to the task only through the
//! non-blocking [`Reconciler`] operations, so a slow rollout step can never
//! stall event processing.

use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use kube::{Api, Client, ResourceExt};
use tokio::sync::{oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::crd::Canary;

/// Interval between reconcile ticks for each canary.
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(10);

/// Handle contract for a per-canary reconciler.
///
/// The dispatcher drives the lifecycle through this trait: `update` forwards
/// a new desired spec without blocking, and `shutdown` signals the backing
/// task to stop before the registry entry is removed.
pub trait Reconciler: Send + 'static {
    /// Forward a new desired spec to the reconciler. Must not block.
    fn update(&self, canary: &Canary);

    /// Signal the reconciler task to stop. The task observes the signal and
    /// exits; it is never left running unattended.
    fn shutdown(self);
}

/// Handle to a running canary reconciler task.
pub struct CanaryWorker {
    spec_tx: watch::Sender<Canary>,
    halt_tx: oneshot::Sender<()>,
}

impl CanaryWorker {
    /// Spawn the reconciler task for `canary`.
    pub fn spawn(client: Client, canary: Canary) -> Self {
        let name = canary.name_any();
        let (spec_tx, spec_rx) = watch::channel(canary);
        let (halt_tx, halt_rx) = oneshot::channel();
        tokio::spawn(run(client, name, spec_rx, halt_rx));
        Self { spec_tx, halt_tx }
    }
}

impl Reconciler for CanaryWorker {
    fn update(&self, canary: &Canary) {
        self.spec_tx.send_replace(canary.clone());
    }

    fn shutdown(self) {
        // An already-exited task just means the receiver is gone
        let _ = self.halt_tx.send(());
    }
}

async fn run(
    client: Client,
    name: String,
    mut spec_rx: watch::Receiver<Canary>,
    mut halt_rx: oneshot::Receiver<()>,
) {
    let mut tick = tokio::time::interval(RECONCILE_INTERVAL);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first interval tick completes immediately
    tick.tick().await;

    info!(name = %name, "canary reconciler started");
    loop {
        tokio::select! {
            // Resolves on halt or if the handle was dropped; stop either way
            _ = &mut halt_rx => {
                info!(name = %name, "canary reconciler stopped");
                return;
            }
            changed = spec_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                debug!(name = %name, "canary spec updated");
            }
            _ = tick.tick() => {
                let canary = spec_rx.borrow().clone();
                if let Err(e) = rollout_step(&client, &canary).await {
                    warn!(name = %name, error = %e, "rollout step failed");
                }
            }
        }
    }
}

/// One step of the progressive rollout.
///
/// TODO: implement the rollout itself: scale the canary Deployment by
/// `increaseRate`, evaluate `monitorProbe`, and delete the old Deployment
/// when the rollout completes (if `deleteDeployment` is set).
async fn rollout_step(client: &Client, canary: &Canary) -> kube::Result<()> {
    let namespace = canary.namespace().unwrap_or_else(|| "default".to_string());
    let deployments: Api<Deployment> = Api::namespaced(client.clone(), &namespace);

    // Surface misconfigured canaries in the operator log
    match deployments.get_opt(&canary.spec.deployment_name).await? {
        Some(_) => {
            debug!(
                name = %canary.name_any(),
                deployment = %canary.spec.deployment_name,
                image = %canary.spec.canary_image,
                "target deployment present"
            );
        }
        None => {
            warn!(
                name = %canary.name_any(),
                deployment = %canary.spec.deployment_name,
                "target deployment not found"
            );
        }
    }
    Ok(())
}
