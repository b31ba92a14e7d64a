//! Email notifier — SMTP submission via `lettre` (§6).

use crate::core::dispatch::{GateEvent, NotifierGate};
use crate::diagnostics::Diagnostics;
use crate::notifiers::Notifier;
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;

/// Seam for the actual SMTP send, so tests never open a socket.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, to: &str, from: &str, subject: &str, body: &str) -> Result<(), String>;
}

pub struct LettreMailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl LettreMailSender {
    pub fn new(server: &str, credentials: Option<(String, String)>) -> Result<Self, String> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(server).map_err(|e| e.to_string())?;
        if let Some((user, pass)) = credentials {
            builder = builder.credentials(Credentials::new(user, pass));
        }
        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl MailSender for LettreMailSender {
    async fn send(&self, to: &str, from: &str, subject: &str, body: &str) -> Result<(), String> {
        let to: Mailbox = to.parse().map_err(|e| format!("invalid recipient: {e}"))?;
        let from: Mailbox = from.parse().map_err(|e| format!("invalid sender: {e}"))?;
        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| e.to_string())?;
        self.transport.send(message).await.map_err(|e| e.to_string())?;
        Ok(())
    }
}

pub struct EmailNotifier {
    name: String,
    from: String,
    to: String,
    gate: NotifierGate,
    sender: Arc<dyn MailSender>,
    clock: Arc<dyn Fn() -> i64 + Send + Sync>,
    diagnostics: Arc<Diagnostics>,
}

impl EmailNotifier {
    pub fn new(
        name: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        min_minutes: u32,
        sender: Arc<dyn MailSender>,
        clock: Arc<dyn Fn() -> i64 + Send + Sync>,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            name: name.into(),
            from: from.into(),
            to: to.into(),
            gate: NotifierGate::new(min_minutes),
            sender,
            clock,
            diagnostics,
        }
    }

    async fn deliver(&self, subject: &str, body: &str) {
        if let Err(err) = self.sender.send(&self.to, &self.from, subject, body).await {
            self.diagnostics.warn(&self.name, &format!("email delivery failed: {err}"));
        }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn bulk_alert(&self, text: &str) {
        self.gate.bulk_alert(text).await;
    }

    async fn bulk_done(&self) {
        let now = (self.clock)();
        for event in self.gate.bulk_done(now).await {
            match event {
                GateEvent::Alert(text) => self.deliver("simplomon alert", &text).await,
                GateEvent::Resolved(text) => {
                    self.deliver("simplomon alert resolved", &text).await
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl MailSender for RecordingSender {
        async fn send(&self, _to: &str, _from: &str, subject: &str, body: &str) -> Result<(), String> {
            self.sent.lock().await.push((subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn diagnostics() -> Arc<Diagnostics> {
        Arc::new(Diagnostics::new(PathBuf::from("/tmp/simplomon-test-email.jsonl")))
    }

    #[tokio::test]
    async fn sends_one_email_per_alert() {
        let sender = Arc::new(RecordingSender::default());
        let notifier = EmailNotifier::new(
            "email",
            "alerts@example.com",
            "oncall@example.com",
            0,
            sender.clone(),
            Arc::new(|| 0),
            diagnostics(),
        );
        notifier.bulk_alert("smtp: [] connection refused").await;
        notifier.bulk_done().await;
        let sent = sender.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("connection refused"));
    }
}
