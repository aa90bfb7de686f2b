//! canary-operator - A Kubernetes operator for managing Canary custom resources.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Creates the Kubernetes client
//! - Runs leader election (exactly one active control loop cluster-wide)
//! - Starts the control loop and the health server

use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use tokio::signal;
use tracing::{error, info, warn};

use canary_operator::health::{HealthState, run_health_server};
use canary_operator::leadership::{LeadershipConfig, LeadershipGate};
use canary_operator::run_operator;

/// Grace period for in-flight work to complete during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

#[allow(clippy::exit)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("canary_operator=info".parse()?)
                .add_directive("kube=info".parse()?)
                .add_directive("kube_leader_election=info".parse()?),
        )
        .json()
        .init();

    info!("Starting canary-operator");

    // The target namespace is the one piece of required configuration
    let namespace = match std::env::var("NAMESPACE") {
        Ok(ns) if !ns.is_empty() => ns,
        _ => {
            error!("NAMESPACE is a required env var");
            std::process::exit(1);
        }
    };

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    // Get pod identity for leader election
    let pod_name = std::env::var("POD_NAME").unwrap_or_else(|_| {
        warn!("POD_NAME not set, using hostname");
        hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    });

    // Create shared health state
    let health_state = Arc::new(HealthState::new());

    // Start health server immediately (probes should work even as non-leader)
    let health_handle = {
        let health_state = health_state.clone();
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state).await {
                error!("Health server error: {}", e);
            }
        })
    };

    // Acquire leadership before starting the control loop
    let gate = LeadershipGate::new(
        client.clone(),
        &namespace,
        &pod_name,
        LeadershipConfig::default(),
    );
    gate.acquire().await;

    // Keep renewing in the background; loss of leadership exits the process
    let lease_renewal_handle = gate.spawn_renewal();

    // Start the control loop (only runs as leader)
    let controller_handle = {
        let health_state = health_state.clone();
        let controller_client = client.clone();
        let controller_namespace = namespace.clone();
        tokio::spawn(async move {
            run_operator(controller_client, &controller_namespace, Some(health_state)).await
        })
    };

    // Wait for any task to fail, or a shutdown signal
    tokio::select! {
        result = controller_handle => {
            match result {
                // run_operator only returns on a protocol violation
                Ok(err) => {
                    error!(error = %err, "Controller failed with unrecoverable error");
                    std::process::exit(1);
                }
                Err(e) => {
                    error!("Controller task panicked: {}", e);
                    std::process::exit(1);
                }
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        // Lease renewal task only exits via process::exit() or panic
        // so this branch is only reached on panic
        Err(e) = lease_renewal_handle => {
            error!("Lease renewal task panicked: {}", e);
        }
        // Handle graceful shutdown on SIGTERM or SIGINT
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            // Mark as not ready to stop receiving new work
            health_state.set_ready(false).await;
            info!("Marked operator as not ready");

            // Give in-flight reconcile ticks time to complete
            info!(
                "Waiting {}s for in-flight work to complete...",
                SHUTDOWN_GRACE_PERIOD_SECS
            );
            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;

            info!("Grace period complete, shutting down");
        }
    }

    info!("Operator stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the operator cannot shut down
/// gracefully without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
