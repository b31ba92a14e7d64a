//! Sliding-window failure filter (§4.2).
//!
//! Keyed sliding-window counter with garbage collection: bounded,
//! timestamp-ordered, periodically pruned, keyed by `(probe, subject,
//! reason)` instead of a flat recent-error queue, and answering a threshold
//! question instead of a raw count.

use crate::core::model::{render_display_string, ActiveAlert, AlertKey, ProbeId};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::Mutex;

/// Per-probe sensitivity knobs the filter needs at `active_alerts()` time.
#[derive(Debug, Clone, Copy)]
pub struct Sensitivity {
    pub min_failures: u32,
    pub failure_window_secs: i64,
}

struct Record {
    timestamps: BTreeSet<i64>,
}

/// Sliding-window de-flapper. `Report` may be called concurrently from
/// worker tasks; `active_alerts` is only called from the runner's
/// coordinator step between cycles (§4.2 Concurrency).
pub struct FailureFilter {
    records: Mutex<HashMap<AlertKey, Record>>,
    retention_secs: i64,
}

impl FailureFilter {
    pub fn new(retention_secs: i64) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            retention_secs,
        }
    }

    /// Insert a timestamp for `(probe, subject, reason)`. Duplicate inserts
    /// at the same second collapse (`BTreeSet` semantics).
    pub async fn report(&self, probe: ProbeId, subject: &str, reason: &str, now: i64) {
        let key = AlertKey::new(probe, subject, reason);
        let mut records = self.records.lock().await;
        records
            .entry(key)
            .or_insert_with(|| Record {
                timestamps: BTreeSet::new(),
            })
            .timestamps
            .insert(now);
    }

    /// Evaluate every known key against its probe's sensitivity and return
    /// the keys whose in-window timestamp count meets `min_failures`,
    /// rendered as `ActiveAlert`s via `kind_of` (probe identity -> kind tag
    /// used in the rendered display string). Runs garbage collection
    /// afterward.
    pub async fn active_alerts(
        &self,
        now: i64,
        sensitivity: impl Fn(ProbeId) -> Option<Sensitivity>,
        kind_of: impl Fn(ProbeId) -> String,
    ) -> Vec<ActiveAlert> {
        let mut records = self.records.lock().await;
        let mut alerts = Vec::new();

        for (key, record) in records.iter() {
            let Some(sens) = sensitivity(key.probe) else {
                continue;
            };
            let lower_bound = now - sens.failure_window_secs;
            let count = record.timestamps.range(lower_bound..=now).count();
            if count as u32 >= sens.min_failures {
                alerts.push(ActiveAlert {
                    probe: key.probe,
                    display: render_display_string(&kind_of(key.probe), &key.subject, &key.reason),
                });
            }
        }

        self.gc_locked(&mut records, now);
        alerts
    }

    /// Earliest in-window timestamp for a key, used by the status surface to
    /// render an alert's age (§4.5).
    pub async fn earliest_in_window(
        &self,
        probe: ProbeId,
        subject: &str,
        reason: &str,
        now: i64,
        window_secs: i64,
    ) -> Option<i64> {
        let records = self.records.lock().await;
        let key = AlertKey::new(probe, subject, reason);
        records
            .get(&key)
            .and_then(|r| r.timestamps.range(now - window_secs..=now).next().copied())
    }

    fn gc_locked(&self, records: &mut HashMap<AlertKey, Record>, now: i64) {
        let floor = now - self.retention_secs;
        records.retain(|_, record| {
            record.timestamps.retain(|t| *t >= floor);
            !record.timestamps.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sens(min_failures: u32, window: i64) -> impl Fn(ProbeId) -> Option<Sensitivity> {
        move |_| {
            Some(Sensitivity {
                min_failures,
                failure_window_secs: window,
            })
        }
    }

    fn kind(_: ProbeId) -> String {
        "probe".to_string()
    }

    #[tokio::test]
    async fn below_threshold_is_not_reported() {
        let filter = FailureFilter::new(300);
        let p = ProbeId(1);
        filter.report(p, "", "r", 0).await;
        let alerts = filter.active_alerts(0, sens(2, 60), kind).await;
        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn min_failures_one_alerts_immediately() {
        let filter = FailureFilter::new(300);
        let p = ProbeId(1);
        filter.report(p, "", "r", 0).await;
        let alerts = filter.active_alerts(0, sens(1, 60), kind).await;
        assert_eq!(alerts.len(), 1);
    }

    #[tokio::test]
    async fn confirmed_after_two_reports_in_window() {
        let filter = FailureFilter::new(300);
        let p = ProbeId(1);
        filter.report(p, "", "r", 0).await;
        filter.report(p, "", "r", 15).await;
        let alerts = filter.active_alerts(15, sens(2, 60), kind).await;
        assert_eq!(alerts.len(), 1);
    }

    #[tokio::test]
    async fn idempotent_without_new_reports() {
        let filter = FailureFilter::new(300);
        let p = ProbeId(1);
        filter.report(p, "", "r", 0).await;
        filter.report(p, "", "r", 1).await;
        let a = filter.active_alerts(1, sens(2, 60), kind).await;
        let b = filter.active_alerts(1, sens(2, 60), kind).await;
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn distinct_subjects_are_independent() {
        let filter = FailureFilter::new(300);
        let p = ProbeId(1);
        filter.report(p, "ipv4", "down", 0).await;
        let alerts = filter.active_alerts(0, sens(1, 60), kind).await;
        assert_eq!(alerts.len(), 1);
        let more = filter.active_alerts(0, sens(1, 60), kind).await;
        assert_eq!(more[0].display, alerts[0].display);
    }

    #[tokio::test]
    async fn gc_removes_timestamps_past_retention() {
        let filter = FailureFilter::new(10);
        let p = ProbeId(1);
        filter.report(p, "", "r", 0).await;
        let _ = filter.active_alerts(100, sens(1, 5), kind).await;
        let records = filter.records.lock().await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn shrinking_window_drops_old_support() {
        let filter = FailureFilter::new(300);
        let p = ProbeId(1);
        filter.report(p, "", "r", 0).await;
        filter.report(p, "", "r", 100).await;
        // Wide window: both count.
        let wide = filter.active_alerts(100, sens(2, 200), kind).await;
        assert_eq!(wide.len(), 1);
        // Narrowed window excludes t=0.
        let narrow = filter.active_alerts(100, sens(2, 50), kind).await;
        assert!(narrow.is_empty());
    }

    #[tokio::test]
    async fn mute_means_never_reported() {
        // Mute is enforced by the runner choosing not to call report(); the
        // filter itself has no notion of mute. This test documents that
        // contract: an un-reported reason never appears.
        let filter = FailureFilter::new(300);
        let alerts = filter.active_alerts(0, sens(1, 60), kind).await;
        assert!(alerts.is_empty());
    }
}
