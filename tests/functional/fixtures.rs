//! Shared fixtures for functional tests.

use canary_operator::crd::{Canary, CanarySpec};

/// Build a Canary with the given name and resource version.
pub fn canary(name: &str, version: &str) -> Canary {
    let mut c = Canary::new(
        name,
        CanarySpec {
            deployment_name: format!("{name}-deployment"),
            canary_image: format!("registry.example.com/{name}:canary"),
            ..Default::default()
        },
    );
    c.metadata.namespace = Some("default".to_string());
    c.metadata.resource_version = Some(version.to_string());
    c
}
