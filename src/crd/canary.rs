//! Canary Custom Resource Definition.
//!
//! Defines the Canary CRD for rolling out a new image next to an existing
//! Deployment, progressively shifting replicas while a monitor probe watches
//! the new pods.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Canary is a custom resource describing a progressive rollout.
///
/// Example:
/// ```yaml
/// apiVersion: canaryoperator.jh.io/v1beta1
/// kind: Canary
/// metadata:
///   name: api-canary
/// spec:
///   deploymentName: api
///   canaryImage: registry.example.com/api:v2
///   rolloutTimespan: 600
///   increaseRate: "10%"
///   initialCanaryCount: 1
///   deleteDeployment: true
///   monitorProbe:
///     path: /healthz
///     port: 8080
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "canaryoperator.jh.io",
    version = "v1beta1",
    kind = "Canary",
    plural = "canaries",
    shortname = "cn",
    namespaced,
    // Print columns for kubectl get
    printcolumn = r#"{"name":"Deployment", "type":"string", "jsonPath":".spec.deploymentName"}"#,
    printcolumn = r#"{"name":"Image", "type":"string", "jsonPath":".spec.canaryImage"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CanarySpec {
    /// Name of the Deployment being canaried.
    pub deployment_name: String,

    /// Image to roll out as the canary.
    pub canary_image: String,

    /// Total time budget for the rollout, in seconds (default 600).
    #[serde(default = "default_rollout_timespan")]
    pub rollout_timespan: i64,

    /// How much traffic/replica share to shift per step (default "10%").
    #[serde(default = "default_increase_rate")]
    pub increase_rate: String,

    /// Number of canary replicas to start with (default 1).
    #[serde(default = "default_initial_canary_count")]
    pub initial_canary_count: i64,

    /// Delete the old Deployment once the rollout completes (default true).
    #[serde(default = "default_delete_deployment")]
    pub delete_deployment: bool,

    /// HTTP probe used to judge canary health during the rollout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor_probe: Option<MonitorProbeSpec>,
}

impl Default for CanarySpec {
    fn default() -> Self {
        Self {
            deployment_name: String::new(),
            canary_image: String::new(),
            rollout_timespan: default_rollout_timespan(),
            increase_rate: default_increase_rate(),
            initial_canary_count: default_initial_canary_count(),
            delete_deployment: default_delete_deployment(),
            monitor_probe: None,
        }
    }
}

fn default_rollout_timespan() -> i64 {
    600
}

fn default_increase_rate() -> String {
    "10%".to_string()
}

fn default_initial_canary_count() -> i64 {
    1
}

fn default_delete_deployment() -> bool {
    true
}

/// HTTP probe configuration for monitoring canary pods.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitorProbeSpec {
    /// HTTP path to probe (default: /healthz).
    #[serde(default = "default_probe_path")]
    pub path: String,

    /// Port to probe.
    pub port: i32,

    /// Seconds between probes (default 10).
    #[serde(default = "default_probe_period")]
    pub period_seconds: i32,

    /// Consecutive failures before the canary is considered unhealthy (default 3).
    #[serde(default = "default_probe_failure_threshold")]
    pub failure_threshold: i32,
}

fn default_probe_path() -> String {
    "/healthz".to_string()
}

fn default_probe_period() -> i32 {
    10
}

fn default_probe_failure_threshold() -> i32 {
    3
}
