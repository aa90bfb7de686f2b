//! Controller module for canary-operator.
//!
//! Contains the watch-resume pipeline: CRD bootstrap, the watch engine that
//! owns the resume cursor, the event dispatcher that owns the reconciler
//! registry, and the error taxonomy shared between them.

pub mod bootstrap;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod watch;
