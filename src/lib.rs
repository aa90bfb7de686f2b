//! canary-operator library crate
//!
//! This module exports the CRD, the watch-resume controller pipeline and the
//! per-canary reconcilers, plus the control loop that ties them together.

pub mod canary;
pub mod controller;
pub mod crd;
pub mod health;
pub mod leadership;

pub use health::HealthState;

use std::sync::Arc;
use std::time::Duration;

use kube::{Api, Client};
use tracing::{error, info};

use canary::CanaryWorker;
use controller::bootstrap::Bootstrap;
use controller::dispatcher::Dispatcher;
use controller::error::Error;
use controller::registry::VersionCache;
use controller::watch::{CanaryEvent, WatchEngine};
use crd::Canary;

/// Backoff before retrying a failed bootstrap.
const INIT_RETRY_WAIT: Duration = Duration::from_secs(30);

/// Run the operator control loop for one namespace.
///
/// Orchestrates Bootstrap -> WatchEngine -> Dispatcher. A fatal watch error
/// tears down every reconciler and restarts the sequence from bootstrap;
/// this function only returns on a protocol violation, which is fatal to
/// the whole process.
///
/// Must only be called while holding leadership (see
/// [`leadership::LeadershipGate`]).
pub async fn run_operator(
    client: Client,
    namespace: &str,
    health_state: Option<Arc<HealthState>>,
) -> Error {
    info!(namespace = %namespace, "Starting controller for Canary resources");

    if let Some(state) = &health_state {
        state.set_ready(true).await;
    }

    let versions = VersionCache::default();
    let worker_client = client.clone();
    let mut dispatcher = Dispatcher::new(
        versions.clone(),
        move |canary: &Canary| CanaryWorker::spawn(worker_client.clone(), canary.clone()),
        health_state.clone(),
    );
    let bootstrap = Bootstrap::new(client.clone(), namespace);

    loop {
        // Establish (or recover) the CRD and the initial cursor; everything
        // here is retried at a long interval because nothing works until the
        // resource type is servable
        let booted = loop {
            match bootstrap.ensure().await {
                Ok(booted) => break booted,
                Err(e) => {
                    error!(error = %e, "initialization failed, retrying in {:?}", INIT_RETRY_WAIT);
                    tokio::time::sleep(INIT_RETRY_WAIT).await;
                }
            }
        };

        info!(cursor = %booted.cursor, "starts running from watch version");

        // Seed the registry with canaries that predate this run
        for canary in booted.existing {
            if let Err(e) = dispatcher.handle(CanaryEvent::Added(canary)) {
                return e;
            }
        }

        let engine = WatchEngine::new(
            Api::namespaced(client.clone(), namespace),
            versions.clone(),
            booted.cursor,
            health_state.clone(),
        );
        let (mut events, mut errors) = engine.spawn();

        let fatal = loop {
            tokio::select! {
                maybe_event = events.recv() => match maybe_event {
                    Some(event) => {
                        if let Err(e) = dispatcher.handle(event) {
                            // Protocol violation: state bug, not recoverable
                            return e;
                        }
                    }
                    // Engine stopped; its fatal error follows on the error
                    // channel
                    None => break errors.recv().await,
                },
                maybe_error = errors.recv() => break maybe_error,
            }
        };

        match fatal {
            Some(err) => {
                error!(error = %err, "watch pipeline failed, restarting from bootstrap")
            }
            None => error!("watch pipeline ended without an error, restarting from bootstrap"),
        }

        // Rebuild state from scratch on the next iteration
        dispatcher.shutdown_all();
        if let Some(state) = &health_state {
            state.metrics.record_pipeline_restart();
        }
    }
}
