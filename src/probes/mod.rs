//! Probe contract and concrete probe kinds (§6).
//!
//! Probes are external collaborators with a uniform capability set, modeled
//! as an `async_trait` object the same way `notifiers::Notifier` is, so the
//! registry can hold a homogeneous `Vec<Arc<dyn Probe>>`.

pub mod dailychime;
pub mod dns;
pub mod dnssoa;
pub mod external;
pub mod https;
pub mod httpredir;
pub mod imap;
pub mod ping;
pub mod prometheus;
pub mod rrsig;
pub mod smtp;
pub mod tcpport;
mod tls;

use crate::core::model::{AttributeMap, ProbeOutcome};
use async_trait::async_trait;
use thiserror::Error;

/// Raised by probe constructors when kind-specific parameters are invalid;
/// surfaced to `config::validate` as a config-fatal error (§7).
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid parameter '{field}': {reason}")]
    InvalidParameter { field: String, reason: String },
}

impl ProbeError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait Probe: Send + Sync {
    /// Short lowercase tag, e.g. `"dns"`, `"https"`.
    fn kind(&self) -> &'static str;

    /// Human-readable description, e.g. "resolve example.com A record".
    fn description(&self) -> &str;

    /// Identifying labels copied onto every measurement row this probe emits.
    fn attributes(&self) -> AttributeMap;

    /// Execute one observation. Never panics across probe implementations
    /// that honor the contract; the runner catches panics as a backstop
    /// (§7) and converts them to the same `ProbeOutcome` shape a probe
    /// would have returned for a protocol-level failure.
    async fn run(&self) -> ProbeOutcome;
}
