//! Status surface state (§4.5).
//!
//! `StatusSnapshot` is written once per runner cycle by the coordinator and
//! read concurrently by `httpapi` handlers; `tokio::sync::RwLock` gives many
//! readers without blocking the next cycle's single writer.

use crate::core::model::{AttributeMap, MeasurementRow, ProbeId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const MAX_NOTIFICATION_LOG: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct CheckerState {
    pub kind: String,
    pub description: String,
    pub last_run_unix: i64,
    pub healthy: bool,
    pub active_alerts: Vec<String>,
    pub attributes: AttributeMap,
    pub results: BTreeMap<String, MeasurementRow>,
    pub reasons: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationLogEntry {
    pub at_unix: i64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct Snapshot {
    pub generated_at_unix: i64,
    pub checkers: BTreeMap<u64, CheckerState>,
    pub notification_log: Vec<NotificationLogEntry>,
    /// Every currently active alert, flattened across checkers and rendered
    /// as `"<age>: <display-string>"`.
    pub alerts: Vec<String>,
}

#[derive(Clone)]
pub struct StatusSnapshot {
    inner: Arc<RwLock<Snapshot>>,
}

impl StatusSnapshot {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Snapshot::default())),
        }
    }

    /// Overwrite the per-checker half of the snapshot and the flattened,
    /// age-prefixed alert list; called once per cycle by the coordinator.
    pub async fn publish_checkers(
        &self,
        generated_at_unix: i64,
        checkers: BTreeMap<ProbeId, CheckerState>,
        alerts: Vec<String>,
    ) {
        let mut snapshot = self.inner.write().await;
        snapshot.generated_at_unix = generated_at_unix;
        snapshot.checkers = checkers.into_iter().map(|(id, state)| (id.0, state)).collect();
        snapshot.alerts = alerts;
    }

    /// Append an entry to the bounded notification log; called by the
    /// implicit web-status notifier once per gate event.
    pub async fn append_notification(&self, at_unix: i64, text: String) {
        let mut snapshot = self.inner.write().await;
        snapshot.notification_log.push(NotificationLogEntry { at_unix, text });
        let overflow = snapshot.notification_log.len().saturating_sub(MAX_NOTIFICATION_LOG);
        if overflow > 0 {
            snapshot.notification_log.drain(0..overflow);
        }
    }

    pub async fn read(&self) -> Snapshot {
        self.inner.read().await.clone()
    }
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_read_round_trips() {
        let status = StatusSnapshot::new();
        let mut checkers = BTreeMap::new();
        checkers.insert(
            ProbeId(1),
            CheckerState {
                kind: "dns".to_string(),
                description: "resolve example.com".to_string(),
                last_run_unix: 100,
                healthy: true,
                active_alerts: vec![],
                attributes: AttributeMap::new(),
                results: BTreeMap::new(),
                reasons: BTreeMap::new(),
            },
        );
        status.publish_checkers(100, checkers, vec![]).await;
        let snapshot = status.read().await;
        assert_eq!(snapshot.generated_at_unix, 100);
        assert_eq!(snapshot.checkers.len(), 1);
    }

    #[tokio::test]
    async fn notification_log_is_bounded() {
        let status = StatusSnapshot::new();
        for i in 0..(MAX_NOTIFICATION_LOG + 10) {
            status.append_notification(i as i64, format!("entry {i}")).await;
        }
        let snapshot = status.read().await;
        assert_eq!(snapshot.notification_log.len(), MAX_NOTIFICATION_LOG);
        assert_eq!(snapshot.notification_log[0].text, "entry 10");
    }
}
