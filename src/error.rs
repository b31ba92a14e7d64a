//! Crate-wide error types.
//!
//! Config-fatal failures (§7 of the design doc) use [`SimplomonError`] and are
//! surfaced once at startup. Everything below the runner is modelled as data
//! (`ProbeOutcome::reasons`) rather than propagated exceptions; see
//! `probes::ProbeError` for the probe-local error type that gets converted at
//! the probe/runner boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimplomonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid probe '{kind}': {reason}")]
    InvalidProbe { kind: String, reason: String },

    #[error("invalid notifier '{kind}': {reason}")]
    InvalidNotifier { kind: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to fetch configuration from {url}: {source}")]
    ConfigFetch {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type Result<T> = std::result::Result<T, SimplomonError>;
