//! ntfy notifier — HTTPS POST to a ntfy topic URL (§6).

use crate::core::dispatch::{GateEvent, NotifierGate};
use crate::diagnostics::Diagnostics;
use crate::notifiers::transport::HttpTransport;
use crate::notifiers::Notifier;
use async_trait::async_trait;
use std::sync::Arc;

pub struct NtfyNotifier {
    name: String,
    topic_url: String,
    auth_token: Option<String>,
    gate: NotifierGate,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Fn() -> i64 + Send + Sync>,
    diagnostics: Arc<Diagnostics>,
}

impl NtfyNotifier {
    pub fn new(
        name: impl Into<String>,
        topic_url: impl Into<String>,
        auth_token: Option<String>,
        min_minutes: u32,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Fn() -> i64 + Send + Sync>,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            name: name.into(),
            topic_url: topic_url.into(),
            auth_token,
            gate: NotifierGate::new(min_minutes),
            transport,
            clock,
            diagnostics,
        }
    }

    async fn deliver(&self, message: &str) {
        let auth_header = self.auth_token.as_ref().map(|t| format!("Bearer {t}"));
        let headers: &[(&str, &str)] = match &auth_header {
            Some(h) => &[("authorization", h.as_str())],
            None => &[],
        };
        match self
            .transport
            .post(&self.topic_url, "text/plain; charset=utf-8", headers, message.as_bytes().to_vec())
            .await
        {
            Ok(status) if (200..300).contains(&status) => {}
            Ok(status) => self
                .diagnostics
                .warn(&self.name, &format!("ntfy rejected notification, status {status}")),
            Err(err) => self.diagnostics.warn(&self.name, &format!("ntfy delivery failed: {err}")),
        }
    }
}

#[async_trait]
impl Notifier for NtfyNotifier {
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
                GateEvent::Alert(text) => self.deliver(&text).await,
                GateEvent::Resolved(text) => self.deliver(&text).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifiers::transport::test_support::RecordingTransport;
    use std::path::PathBuf;

    fn diagnostics() -> Arc<Diagnostics> {
        Arc::new(Diagnostics::new(PathBuf::from("/tmp/simplomon-test-ntfy.jsonl")))
    }

    #[tokio::test]
    async fn posts_plain_text_body() {
        let transport = Arc::new(RecordingTransport::new(200));
        let notifier = NtfyNotifier::new(
            "ntfy",
            "https://ntfy.sh/my-topic",
            None,
            0,
            transport.clone(),
            Arc::new(|| 0),
            diagnostics(),
        );
        notifier.bulk_alert("ping: [] unreachable").await;
        notifier.bulk_done().await;
        let requests = transport.requests.lock().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].body, "ping: [] unreachable");
        assert_eq!(requests[0].url, "https://ntfy.sh/my-topic");
    }
}
