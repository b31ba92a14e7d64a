//! Telegram notifier — `sendMessage` via the Bot API (§6).

use crate::core::dispatch::{GateEvent, NotifierGate};
use crate::diagnostics::Diagnostics;
use crate::notifiers::transport::HttpTransport;
use crate::notifiers::Notifier;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

pub struct TelegramNotifier {
    name: String,
    bot_token: String,
    chat_id: String,
    gate: NotifierGate,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Fn() -> i64 + Send + Sync>,
    diagnostics: Arc<Diagnostics>,
}

impl TelegramNotifier {
    pub fn new(
        name: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
        min_minutes: u32,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Fn() -> i64 + Send + Sync>,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            name: name.into(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            gate: NotifierGate::new(min_minutes),
            transport,
            clock,
            diagnostics,
        }
    }

    async fn deliver(&self, message: &str) {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text: message,
        };
        let body = match serde_json::to_vec(&payload) {
            Ok(b) => b,
            Err(err) => {
                self.diagnostics.error(&self.name, &format!("failed to encode message: {err}"));
                return;
            }
        };
        match self.transport.post(&url, "application/json", &[], body).await {
            Ok(status) if (200..300).contains(&status) => {}
            Ok(status) => self
                .diagnostics
                .warn(&self.name, &format!("telegram rejected notification, status {status}")),
            Err(err) => self.diagnostics.warn(&self.name, &format!("telegram delivery failed: {err}")),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
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
