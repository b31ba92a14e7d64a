//! Per-notifier minimum-age gate (§4.4).
//!
//! `NotifierGate` implements the seven-step `BulkDone()` algorithm of §4.4;
//! each concrete `notifiers::Notifier` impl owns one gate and turns the
//! `GateEvent`s it yields into an actual transport call, logging and
//! swallowing transport failures per §4.4's failure semantics (the gate
//! state always advances, regardless of delivery success — at-most-once
//! delivery).

use crate::core::model::{render_age_phrase, render_aged_prefix, render_aged_resolution};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

/// What `bulk_done()` decided to emit this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEvent {
    /// A display-string just passed the minimum-age gate.
    Alert(String),
    /// A display-string that had passed the gate is now resolved.
    Resolved(String),
}

struct State {
    reported: HashSet<String>,
    prev_reported: HashSet<String>,
    first_seen: HashMap<String, i64>,
    prev_old_enough: HashSet<String>,
}

pub struct NotifierGate {
    min_minutes: u32,
    state: Mutex<State>,
}

impl NotifierGate {
    pub fn new(min_minutes: u32) -> Self {
        Self {
            min_minutes,
            state: Mutex::new(State {
                reported: HashSet::new(),
                prev_reported: HashSet::new(),
                first_seen: HashMap::new(),
                prev_old_enough: HashSet::new(),
            }),
        }
    }

    /// Step 1: record one currently-active display-string.
    pub async fn bulk_alert(&self, text: &str) {
        let mut state = self.state.lock().await;
        state.reported.insert(text.to_string());
    }

    /// Steps a-g of §4.4, run once after all of this cycle's alerts have
    /// been streamed via `bulk_alert`.
    pub async fn bulk_done(&self, now: i64) -> Vec<GateEvent> {
        let mut state = self.state.lock().await;

        // a. newly reported strings start their age clock.
        let newly_seen: Vec<String> = state
            .reported
            .difference(&state.prev_reported)
            .cloned()
            .collect();
        for text in &newly_seen {
            state.first_seen.insert(text.clone(), now);
        }

        // b. strings that dropped out remember when they were first seen
        // (so the resolution event can report an age), then forget them.
        let dropped: Vec<(String, i64)> = state
            .prev_reported
            .difference(&state.reported)
            .map(|text| {
                let started = state.first_seen.get(text).copied().unwrap_or(now);
                (text.clone(), started)
            })
            .collect();
        for (text, _) in &dropped {
            state.first_seen.remove(text);
        }

        // c. advance reported -> prev_reported, clear reported.
        state.prev_reported = std::mem::take(&mut state.reported);

        // d. recompute which prev_reported strings are old enough.
        let threshold = now - (self.min_minutes as i64) * 60;
        let old_enough: HashSet<String> = state
            .prev_reported
            .iter()
            .filter(|text| {
                state
                    .first_seen
                    .get(*text)
                    .map(|seen| *seen <= threshold)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        let mut events = Vec::new();

        // e. newly-ripe strings fire an Alert, age-prefixed when min_minutes>0.
        for text in old_enough.difference(&state.prev_old_enough) {
            if self.min_minutes > 0 {
                let started = state.first_seen.get(text).copied().unwrap_or(now);
                let age = render_age_phrase(now - started);
                events.push(GateEvent::Alert(format!("{}{}", render_aged_prefix(&age), text)));
            } else {
                events.push(GateEvent::Alert(text.clone()));
            }
        }

        // f. strings that leave old_enough (because they resolved) fire a
        // resolution event. `dropped` is exactly "left prev_reported this
        // cycle"; intersect with the set that had ripened (prev_old_enough)
        // to honor "resolved-before-ripe must be silent".
        let dropped_set: HashSet<String> = dropped.iter().map(|(t, _)| t.clone()).collect();
        let started_at: HashMap<String, i64> = dropped.into_iter().collect();
        for text in state.prev_old_enough.intersection(&dropped_set) {
            let started = started_at.get(text).copied().unwrap_or(now);
            let age = render_age_phrase(now - started);
            events.push(GateEvent::Resolved(render_aged_resolution(text, &age)));
        }

        // g. advance the ripened set.
        state.prev_old_enough = old_enough;

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn min_minutes_zero_delivers_same_cycle() {
        let gate = NotifierGate::new(0);
        gate.bulk_alert("P: [] r").await;
        let events = gate.bulk_done(0).await;
        assert_eq!(events, vec![GateEvent::Alert("P: [] r".to_string())]);
    }

    #[tokio::test]
    async fn min_minutes_zero_resolves_next_cycle() {
        let gate = NotifierGate::new(0);
        gate.bulk_alert("P: [] r").await;
        gate.bulk_done(0).await;
        // Cycle 2: no longer reported.
        let events = gate.bulk_done(30).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], GateEvent::Resolved(s) if s.contains("P: [] r")));
    }

    #[tokio::test]
    async fn short_flap_under_min_minutes_is_silent() {
        let gate = NotifierGate::new(10); // 600s
        gate.bulk_alert("P: [] r").await;
        gate.bulk_done(0).await; // first_seen = 0
        gate.bulk_alert("P: [] r").await;
        gate.bulk_done(60).await; // still active, not ripe
        gate.bulk_alert("P: [] r").await;
        let still_active_events = gate.bulk_done(120).await;
        assert!(still_active_events.is_empty());
        // Resolved at t=180, never ripened -> silent.
        let resolved_events = gate.bulk_done(180).await;
        assert!(resolved_events.is_empty());
    }

    #[tokio::test]
    async fn emits_once_after_ten_minutes_then_resolves_with_age() {
        let gate = NotifierGate::new(10);
        gate.bulk_alert("P: [] r").await;
        gate.bulk_done(0).await; // first_seen = 0

        // Stays active every cycle up to t=600.
        for t in [60, 120, 180, 240, 300, 360, 420, 480, 540] {
            gate.bulk_alert("P: [] r").await;
            let events = gate.bulk_done(t).await;
            assert!(events.is_empty(), "unexpected emission at t={t}");
        }

        gate.bulk_alert("P: [] r").await;
        let events = gate.bulk_done(600).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            GateEvent::Alert(s) => assert!(s.starts_with("(10 minutes already) ")),
            other => panic!("expected Alert, got {other:?}"),
        }

        // Stays active until resolved at t=900 (15 minutes after first_seen).
        for t in [660, 720, 780, 840] {
            gate.bulk_alert("P: [] r").await;
            let events = gate.bulk_done(t).await;
            assert!(events.is_empty());
        }
        let resolved = gate.bulk_done(900).await;
        assert_eq!(resolved.len(), 1);
        match &resolved[0] {
            GateEvent::Resolved(s) => assert!(s.contains("15 minutes")),
            other => panic!("expected Resolved, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn at_most_one_alert_event_per_ripening() {
        let gate = NotifierGate::new(1); // 60s
        gate.bulk_alert("x").await;
        gate.bulk_done(0).await;
        gate.bulk_alert("x").await;
        let first = gate.bulk_done(60).await;
        assert_eq!(first.len(), 1);
        // Still active and still ripe: no repeat Alert event.
        gate.bulk_alert("x").await;
        let second = gate.bulk_done(120).await;
        assert!(second.is_empty());
    }
}
