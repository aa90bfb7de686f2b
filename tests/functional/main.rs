// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Functional tests for the canary-operator event pipeline.
//!
//! These tests drive the dispatcher and staleness check with synthetic
//! event sequences, WITHOUT requiring a live Kubernetes cluster. The
//! per-canary reconciler is replaced by a recording mock.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run with verbose output
//! cargo test --test functional -- --nocapture
//! ```

mod dispatch_tests;
mod fixtures;
mod staleness_tests;
