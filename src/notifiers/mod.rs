//! Notifier contract and concrete transports.
//!
//! `Notifier` is the uniform `BulkAlert`/`BulkDone` capability every delivery
//! channel implements, modelled as an `async_trait` object in the same
//! dependency-injection style as `HttpTransport`/`MailSender` for mock-based
//! testing.

pub mod email;
pub mod ntfy;
pub mod pushover;
pub mod sink;
pub mod telegram;
pub mod transport;
pub mod webstatus;

use async_trait::async_trait;

/// A single alert delivery channel.
///
/// `bulk_alert` is called once per currently-active display-string the
/// dispatcher routes to this notifier, for every probe's alerts in the
/// cycle; `bulk_done` is called exactly once after the cycle's alerts have
/// all been streamed, and is where the minimum-age gate (§4.4) actually
/// decides what (if anything) gets delivered to the external transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short identity used in config binding and log lines.
    fn name(&self) -> &str;

    /// Record one active display-string for this cycle.
    async fn bulk_alert(&self, text: &str);

    /// Finalize the cycle: advance the gate state and emit `Alert`/resolution
    /// events to the underlying transport.
    async fn bulk_done(&self);
}
