//! Cluster-wide leader election.
//!
//! Ensures at most one process instance runs the control loop at a time.
//! Candidates poll for the lease at `retry_period`; the holder renews it
//! every `renew_deadline`. Losing the lease while running is fatal: the
//! process exits rather than risk two concurrent control loops, and the
//! supervising deployment restarts it into re-election.

use std::time::Duration;

use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Name of the Lease object coordinating leadership
const LEASE_NAME: &str = "canary-operator-leader";

/// Leadership timing configuration
#[derive(Clone, Copy, Debug)]
pub struct LeadershipConfig {
    /// How long a held lease is valid without renewal
    pub lease_duration: Duration,
    /// How often the holder refreshes the lease
    pub renew_deadline: Duration,
    /// How often non-holders poll to attempt acquisition
    pub retry_period: Duration,
}

impl Default for LeadershipConfig {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(15),
            renew_deadline: Duration::from_secs(5),
            retry_period: Duration::from_secs(3),
        }
    }
}

/// Mutual-exclusion gate in front of the control loop.
pub struct LeadershipGate {
    client: Client,
    namespace: String,
    identity: String,
    config: LeadershipConfig,
}

impl LeadershipGate {
    pub fn new(
        client: Client,
        namespace: &str,
        identity: &str,
        config: LeadershipConfig,
    ) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            identity: identity.to_string(),
            config,
        }
    }

    fn lease_lock(&self) -> LeaseLock {
        LeaseLock::new(
            self.client.clone(),
            &self.namespace,
            LeaseLockParams {
                holder_id: self.identity.clone(),
                lease_name: LEASE_NAME.to_string(),
                lease_ttl: self.config.lease_duration,
            },
        )
    }

    /// Block until this instance holds the lease.
    pub async fn acquire(&self) {
        let lock = self.lease_lock();
        info!(
            holder_id = %self.identity,
            namespace = %self.namespace,
            lease_name = LEASE_NAME,
            "Waiting to acquire leadership"
        );
        loop {
            match lock.try_acquire_or_renew().await {
                Ok(result) if result.acquired_lease => {
                    info!("Acquired leadership");
                    return;
                }
                Ok(_) => {
                    debug!("Another instance is leader, waiting");
                }
                Err(e) => {
                    warn!(error = %e, "Failed to acquire lease, retrying");
                }
            }
            tokio::time::sleep(self.config.retry_period).await;
        }
    }

    /// Renew the lease in the background for as long as the process lives.
    ///
    /// Loss of leadership (or an error while renewing) exits the process so
    /// Kubernetes restarts it and it re-enters election.
    pub fn spawn_renewal(&self) -> JoinHandle<()> {
        let lock = self.lease_lock();
        let renew_deadline = self.config.renew_deadline;

        #[allow(clippy::exit)]
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(renew_deadline).await;

                match lock.try_acquire_or_renew().await {
                    Ok(result) => {
                        if !result.acquired_lease {
                            error!("Lost leadership! Shutting down...");
                            std::process::exit(1);
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to renew lease. Shutting down...");
                        std::process::exit(1);
                    }
                }
            }
        })
    }
}
