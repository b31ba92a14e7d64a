//! Implicit measurement-sink notifier — feeds `notifications.jsonl`.

use crate::core::dispatch::{GateEvent, NotifierGate};
use crate::core::sink::MeasurementSink;
use crate::notifiers::Notifier;
use async_trait::async_trait;
use std::sync::Arc;

pub struct SinkNotifier {
    gate: NotifierGate,
    sink: MeasurementSink,
    clock: Arc<dyn Fn() -> i64 + Send + Sync>,
}

impl SinkNotifier {
    pub fn new(sink: MeasurementSink, clock: Arc<dyn Fn() -> i64 + Send + Sync>) -> Self {
        Self {
            gate: NotifierGate::new(0),
            sink,
            clock,
        }
    }
}

#[async_trait]
impl Notifier for SinkNotifier {
    fn name(&self) -> &str {
        "sink"
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
            self.sink.record_notification("sink", now, text).await;
        }
    }
}
