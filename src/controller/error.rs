//! Error types for the controller.
//!
//! A closed enumeration covering everything the bootstrap, watch, and
//! dispatch layers can surface, with classification helpers for the
//! control loop.

use thiserror::Error;

/// Error type for controller operations
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The Canary CRD could not be registered
    #[error("failed to register Canary CRD: {0}")]
    CrdRegistration(#[source] kube::Error),

    /// A readiness poll exhausted its retry budget
    #[error("still failing after {attempts} retries")]
    RetriesExhausted { attempts: usize },

    /// The watch cursor expired and the relisted state no longer matches the
    /// cached state; everything must be rebuilt from bootstrap
    #[error("canary history outdated in apiserver, state must be rebuilt")]
    HistoryOutdated,

    /// An update or delete was observed for a canary this process never saw
    /// created; indicates a missed Added event
    #[error("unsafe state: canary {name} was never created but received a {event} event")]
    UnsafeState { name: String, event: &'static str },

    /// A watch event or list item carried no resourceVersion
    #[error("canary {name} carried no resourceVersion")]
    MissingVersion { name: String },

    /// A list response carried no resourceVersion to resume from
    #[error("list response carried no resourceVersion")]
    MissingListVersion,

    /// The event channel consumer went away while the watch was still running
    #[error("event channel closed while watch stream was active")]
    ChannelClosed,
}

impl Error {
    /// Protocol violations indicate a logic/state bug rather than a transient
    /// condition; they are fatal to the process, not just to the current
    /// bootstrap-watch-dispatch iteration.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Error::UnsafeState { .. })
    }
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;
