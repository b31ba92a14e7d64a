//! Shared integration-test helpers: a settable clock and a notifier double
//! that records every `Alert`/`Resolved` text it is handed.

use simplomon::core::dispatch::{GateEvent, NotifierGate};
use simplomon::notifiers::Notifier;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// An `i64` clock the test drives by hand, shared between the probes and
/// notifiers under test.
#[derive(Clone)]
pub struct FakeClock(Arc<AtomicI64>);

impl FakeClock {
    pub fn new(start: i64) -> Self {
        Self(Arc::new(AtomicI64::new(start)))
    }

    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn as_fn(&self) -> Arc<dyn Fn() -> i64 + Send + Sync> {
        let inner = Arc::clone(&self.0);
        Arc::new(move || inner.load(Ordering::SeqCst))
    }
}

/// A notifier that runs the real minimum-age gate but records emitted events
/// instead of calling out to a transport.
pub struct RecordingNotifier {
    name: String,
    gate: NotifierGate,
    clock: FakeClock,
    pub events: Mutex<Vec<GateEvent>>,
}

impl RecordingNotifier {
    pub fn new(name: impl Into<String>, min_minutes: u32, clock: FakeClock) -> Self {
        Self {
            name: name.into(),
            gate: NotifierGate::new(min_minutes),
            clock,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| match e {
                GateEvent::Alert(t) => t.clone(),
                GateEvent::Resolved(t) => t.clone(),
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn bulk_alert(&self, text: &str) {
        self.gate.bulk_alert(text).await;
    }

    async fn bulk_done(&self) {
        let now = self.clock.now();
        let mut events = self.gate.bulk_done(now).await;
        self.events.lock().unwrap().append(&mut events);
    }
}
