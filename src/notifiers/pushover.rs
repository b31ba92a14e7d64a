//! Pushover notifier — HTTPS POST to `api.pushover.net` (§6).

use crate::core::dispatch::{GateEvent, NotifierGate};
use crate::diagnostics::Diagnostics;
use crate::notifiers::transport::HttpTransport;
use crate::notifiers::Notifier;
use async_trait::async_trait;
use std::sync::Arc;

const ENDPOINT: &str = "https://api.pushover.net/1/messages.json";

pub struct PushoverNotifier {
    name: String,
    token: String,
    user_key: String,
    gate: NotifierGate,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Fn() -> i64 + Send + Sync>,
    diagnostics: Arc<Diagnostics>,
}

impl PushoverNotifier {
    pub fn new(
        name: impl Into<String>,
        token: impl Into<String>,
        user_key: impl Into<String>,
        min_minutes: u32,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Fn() -> i64 + Send + Sync>,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            name: name.into(),
            token: token.into(),
            user_key: user_key.into(),
            gate: NotifierGate::new(min_minutes),
            transport,
            clock,
            diagnostics,
        }
    }

    async fn deliver(&self, message: &str) {
        let body = format!(
            "token={}&user={}&message={}",
            urlencode(&self.token),
            urlencode(&self.user_key),
            urlencode(message)
        );
        match self
            .transport
            .post(ENDPOINT, "application/x-www-form-urlencoded", &[], body.into_bytes())
            .await
        {
            Ok(status) if (200..300).contains(&status) => {}
            Ok(status) => self
                .diagnostics
                .warn(&self.name, &format!("pushover rejected notification, status {status}")),
            Err(err) => self
                .diagnostics
                .warn(&self.name, &format!("pushover delivery failed: {err}")),
        }
    }
}

#[async_trait]
impl Notifier for PushoverNotifier {
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

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifiers::transport::test_support::RecordingTransport;
    use std::path::PathBuf;

    fn diagnostics() -> Arc<Diagnostics> {
        Arc::new(Diagnostics::new(PathBuf::from("/tmp/simplomon-test-pushover.jsonl")))
    }

    #[tokio::test]
    async fn delivers_on_first_cycle_at_min_minutes_zero() {
        let transport = Arc::new(RecordingTransport::new(200));
        let notifier = PushoverNotifier::new(
            "pushover",
            "tok",
            "user",
            0,
            transport.clone(),
            Arc::new(|| 0),
            diagnostics(),
        );
        notifier.bulk_alert("dns: [] timeout").await;
        notifier.bulk_done().await;
        let requests = transport.requests.lock().await;
        assert_eq!(requests.len(), 1);
        assert!(requests[0].body.contains("dns%3A"));
    }

    #[tokio::test]
    async fn silent_when_nothing_reported() {
        let transport = Arc::new(RecordingTransport::new(200));
        let notifier = PushoverNotifier::new(
            "pushover",
            "tok",
            "user",
            0,
            transport.clone(),
            Arc::new(|| 0),
            diagnostics(),
        );
        notifier.bulk_done().await;
        assert!(transport.requests.lock().await.is_empty());
    }
}
