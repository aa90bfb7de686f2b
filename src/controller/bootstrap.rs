//! Idempotent registration of the Canary CRD.
//!
//! A fresh registration polls the Canary collection until the apiserver
//! starts serving it and hands back the "from the beginning" cursor. If the
//! CRD already exists (a prior run or another replica registered it), the
//! current state is recovered by listing all canaries, and the list's
//! resourceVersion becomes the resume cursor.

use std::future::Future;
use std::time::Duration;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{ListParams, PostParams};
use kube::{Api, Client, CustomResourceExt};
use tracing::{debug, info};

use crate::controller::error::{Error, Result};
use crate::controller::registry::ResourceVersion;
use crate::crd::Canary;

/// Interval between readiness polls after creating the CRD.
const READY_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Number of readiness polls before giving up.
const READY_POLL_ATTEMPTS: usize = 10;

/// Outcome of a successful bootstrap.
pub struct Bootstrapped {
    /// Cursor to start the watch from.
    pub cursor: ResourceVersion,
    /// Canaries that already existed (recovery path only); the control loop
    /// seeds the registry from these before watching.
    pub existing: Vec<Canary>,
}

/// Registers the Canary CRD and establishes the initial watch cursor.
pub struct Bootstrap {
    client: Client,
    namespace: String,
}

impl Bootstrap {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
        }
    }

    fn canaries(&self) -> Api<Canary> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    /// Register the CRD, or recover state when it is already registered.
    ///
    /// Readiness-poll exhaustion surfaces as
    /// [`Error::RetriesExhausted`] so callers can tell it apart from a
    /// genuine apiserver failure.
    pub async fn ensure(&self) -> Result<Bootstrapped> {
        let crds: Api<CustomResourceDefinition> = Api::all(self.client.clone());

        match crds.create(&PostParams::default(), &Canary::crd()).await {
            Ok(_) => {
                info!("Canary CRD created, waiting for it to be served");
                self.wait_served().await?;
                Ok(Bootstrapped {
                    cursor: ResourceVersion::initial(),
                    existing: Vec::new(),
                })
            }
            Err(kube::Error::Api(e)) if e.code == 409 => {
                // Registered by a prior run; recover existing canaries
                self.recover().await
            }
            Err(e) => Err(Error::CrdRegistration(e)),
        }
    }

    /// Poll the Canary collection until it stops returning 404.
    async fn wait_served(&self) -> Result<()> {
        let api = self.canaries();
        retry(READY_POLL_INTERVAL, READY_POLL_ATTEMPTS, || {
            let api = api.clone();
            async move {
                match api.list(&ListParams::default().limit(1)).await {
                    Ok(_) => Ok(true),
                    Err(kube::Error::Api(e)) if e.code == 404 => {
                        debug!("Canary collection not served yet");
                        Ok(false)
                    }
                    Err(e) => Err(Error::Kube(e)),
                }
            }
        })
        .await
    }

    /// List all existing canaries and adopt the list's version as the cursor.
    async fn recover(&self) -> Result<Bootstrapped> {
        info!("Canary CRD already registered, recovering existing canaries");
        let list = self.canaries().list(&ListParams::default()).await?;
        let cursor = list
            .metadata
            .resource_version
            .clone()
            .ok_or(Error::MissingListVersion)?
            .into();
        info!(cursor = %cursor, count = list.items.len(), "recovered existing canaries");
        Ok(Bootstrapped {
            cursor,
            existing: list.items,
        })
    }
}

/// Run `condition` up to `max_retries` times, `interval` apart, until it
/// reports success. Errors from the condition abort immediately; running out
/// of attempts yields [`Error::RetriesExhausted`].
pub(crate) async fn retry<F, Fut>(
    interval: Duration,
    max_retries: usize,
    mut condition: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    for attempt in 1..=max_retries {
        if condition().await? {
            return Ok(());
        }
        if attempt < max_retries {
            tokio::time::sleep(interval).await;
        }
    }
    Err(Error::RetriesExhausted {
        attempts: max_retries,
    })
}
