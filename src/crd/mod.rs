//! Custom Resource Definitions (CRDs) for canary-operator.
//!
//! - `Canary`: describes a progressive canary rollout for an existing Deployment

mod canary;

pub use canary::*;
