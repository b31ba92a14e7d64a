//! Implicit web-status notifier — feeds the `/state` notification log.

use crate::core::dispatch::{GateEvent, NotifierGate};
use crate::core::status::StatusSnapshot;
use crate::notifiers::Notifier;
use async_trait::async_trait;
use std::sync::Arc;

pub struct WebStatusNotifier {
    gate: NotifierGate,
    status: StatusSnapshot,
    clock: Arc<dyn Fn() -> i64 + Send + Sync>,
}

impl WebStatusNotifier {
    pub fn new(status: StatusSnapshot, clock: Arc<dyn Fn() -> i64 + Send + Sync>) -> Self {
        Self {
            gate: NotifierGate::new(0),
            status,
            clock,
        }
    }
}

#[async_trait]
impl Notifier for WebStatusNotifier {
    fn name(&self) -> &str {
        "webstatus"
    }

    async fn bulk_alert(&self, text: &str) {
        self.gate.bulk_alert(text).await;
    }

    async fn bulk_done(&self) {
        let now = (self.clock)();
        for event in self.gate.bulk_done(now).await {
            let text = match event {
                GateEvent::Alert(text) => text,
                GateEvent::Resolved(text) => text,
            };
            self.status.append_notification(now, text).await;
        }
    }
}
