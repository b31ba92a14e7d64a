//! Worker-pool cycle runner (§4.1).
//!
//! One `run_cycle()` call is one full measurement cycle: every enabled probe
//! runs at most once, bounded by a `Semaphore` permit pool sized to the
//! current worker count; each probe is spawned on its own task, with its
//! future wrapped in `std::panic::AssertUnwindSafe` +
//! `futures::FutureExt::catch_unwind` so a panicking probe turns into a
//! `"Exception caught: ..."` failure reason instead of taking the whole
//! daemon down (the release profile runs with `panic = "unwind"` precisely
//! so this works). After every worker has joined, the coordinator step runs
//! single-threaded: feed the failure filter, correlate against the previous
//! cycle, dispatch to notifiers through their gates, then publish the status
//! snapshot.

use crate::core::correlator::Correlator;
use crate::core::filter::Sensitivity;
use crate::core::model::{render_age_phrase, ActiveAlert, ProbeId, ProbeOutcome};
use crate::core::registry::World;
use crate::core::status::CheckerState;
use crate::diagnostics::Level;
use futures::FutureExt;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;

/// One probe's raw result, before it is folded into the filter/sink.
struct Outcome {
    id: ProbeId,
    kind: String,
    description: String,
    mute: bool,
    outcome: crate::core::model::ProbeOutcome,
}

/// Drives repeated cycles with adaptive worker-count growth (§4.1 Concurrency).
pub struct Runner {
    world: Arc<World>,
    correlator: tokio::sync::Mutex<Correlator>,
    alert_ages: tokio::sync::Mutex<HashMap<String, i64>>,
    workers: AtomicU32,
    max_workers: u32,
    cycle_interval: Duration,
    probe_timeout: Duration,
}

impl Runner {
    pub fn new(world: Arc<World>, initial_workers: u32, max_workers: u32, cycle_interval: Duration, probe_timeout: Duration) -> Self {
        Self {
            world,
            correlator: tokio::sync::Mutex::new(Correlator::new()),
            alert_ages: tokio::sync::Mutex::new(HashMap::new()),
            workers: AtomicU32::new(initial_workers.max(1)),
            max_workers: max_workers.max(initial_workers.max(1)),
            cycle_interval,
            probe_timeout,
        }
    }

    /// Run cycles forever, sleeping `cycle_interval` between them, until
    /// `shutdown` resolves.
    pub async fn run_forever(&self, mut shutdown: tokio::sync::oneshot::Receiver<()>) {
        loop {
            let cycle_started = std::time::Instant::now();
            self.run_cycle(now_unix()).await;

            let elapsed = cycle_started.elapsed();
            if elapsed > self.cycle_interval {
                self.grow_worker_pool();
            }
            let remaining = self.cycle_interval.saturating_sub(elapsed);

            tokio::select! {
                _ = tokio::time::sleep(remaining) => {}
                _ = &mut shutdown => {
                    self.world.diagnostics.log(Level::Info, "runner", "shutdown signal received, exiting after in-flight cycle");
                    return;
                }
            }
        }
    }

    fn grow_worker_pool(&self) {
        let current = self.workers.load(Ordering::Relaxed);
        if current < self.max_workers {
            self.workers.store(current + 1, Ordering::Relaxed);
            self.world.diagnostics.log(
                Level::Warn,
                "runner",
                &format!("cycle exceeded its interval, growing worker pool to {}", current + 1),
            );
        }
    }

    /// Run exactly one cycle: probe, filter, correlate, dispatch, publish.
    pub async fn run_cycle(&self, now: i64) {
        let outcomes = self.run_probes().await;

        for result in &outcomes {
            if !result.mute {
                for (subject, reason) in result.outcome.failing_reasons() {
                    self.world.filter.report(result.id, subject, reason, now).await;
                }
            }

            let mut subjects: std::collections::BTreeSet<&str> =
                result.outcome.reasons.keys().map(String::as_str).collect();
            subjects.extend(result.outcome.measurements.keys().map(String::as_str));
            if subjects.is_empty() {
                subjects.insert("");
            }
            for subject in subjects {
                let reasons: Vec<String> = result
                    .outcome
                    .reasons
                    .get(subject)
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|r| !r.is_empty())
                    .collect();
                let healthy = reasons.is_empty();
                self.world.sink.record_report(&result.kind, subject, now, healthy, reasons).await;
            }

            for (subject, row) in &result.outcome.measurements {
                self.world
                    .sink
                    .record_measurement(&result.kind, subject, now, row, &result.outcome.attributes)
                    .await;
            }
        }

        let kinds: BTreeMap<ProbeId, (String, u32, i64)> = self
            .world
            .probes
            .iter()
            .map(|r| (r.id, (r.config.kind.clone(), r.config.min_failures, r.config.failure_window_secs)))
            .collect();
        let kinds_for_sensitivity = kinds.clone();

        let active = self
            .world
            .filter
            .active_alerts(
                now,
                move |id| {
                    kinds_for_sensitivity.get(&id).map(|(_, min_failures, window)| Sensitivity {
                        min_failures: *min_failures,
                        failure_window_secs: *window,
                    })
                },
                move |id| kinds.get(&id).map(|(kind, _, _)| kind.clone()).unwrap_or_default(),
            )
            .await;

        let transition = {
            let mut correlator = self.correlator.lock().await;
            correlator.correlate(active.clone())
        };

        self.dispatch(&transition.new, &transition.resolved).await;

        self.publish_status(&outcomes, &active, now).await;
    }

    async fn run_probes(&self) -> Vec<Outcome> {
        let permits = self.workers.load(Ordering::Relaxed).max(1);
        let semaphore = Arc::new(Semaphore::new(permits as usize));
        let mut handles = Vec::with_capacity(self.world.probes.len());

        for registered in &self.world.probes {
            let semaphore = Arc::clone(&semaphore);
            let probe = Arc::clone(&registered.probe);
            let id = registered.id;
            let kind = registered.config.kind.clone();
            let description = registered.config.description.clone();
            let mute = registered.config.mute;
            let probe_timeout = self.probe_timeout;

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
                let guarded = AssertUnwindSafe(timeout(probe_timeout, probe.run())).catch_unwind();
                let outcome = match guarded.await {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(_)) => ProbeOutcome::from_exception(format!("probe '{kind}' exceeded its timeout")),
                    Err(payload) => ProbeOutcome::from_exception(panic_message(payload)),
                };
                Outcome { id, kind, description, mute, outcome }
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => outcomes.push(result),
                Err(join_err) => {
                    self.world
                        .diagnostics
                        .log(Level::Error, "runner", &format!("probe task failed to join: {join_err}"));
                }
            }
        }
        outcomes
    }

    async fn dispatch(&self, new: &std::collections::HashSet<ActiveAlert>, resolved: &std::collections::HashSet<ActiveAlert>) {
        let probe_notifiers: BTreeMap<ProbeId, Vec<String>> = self
            .world
            .probes
            .iter()
            .map(|r| (r.id, r.config.notifiers.clone()))
            .collect();

        let mut per_notifier_texts: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for alert in new.iter().chain(resolved.iter()) {
            if let Some(names) = probe_notifiers.get(&alert.probe) {
                for name in names {
                    per_notifier_texts.entry(name.clone()).or_default().push(alert.display.clone());
                }
            }
        }

        for (name, notifier) in &self.world.notifiers {
            if let Some(texts) = per_notifier_texts.get(name) {
                for text in texts {
                    notifier.bulk_alert(text).await;
                }
            }
            notifier.bulk_done().await;
        }
    }

    async fn publish_status(&self, outcomes: &[Outcome], active: &[ActiveAlert], now: i64) {
        let mut active_by_probe: BTreeMap<ProbeId, Vec<String>> = BTreeMap::new();
        for alert in active {
            active_by_probe.entry(alert.probe).or_default().push(alert.display.clone());
        }

        let attributes_by_probe: HashMap<ProbeId, crate::core::model::AttributeMap> = self
            .world
            .probes
            .iter()
            .map(|r| (r.id, r.config.attributes.clone()))
            .collect();

        let checkers: BTreeMap<ProbeId, CheckerState> = outcomes
            .iter()
            .map(|o| {
                (
                    o.id,
                    CheckerState {
                        kind: o.kind.clone(),
                        description: o.description.clone(),
                        last_run_unix: now,
                        healthy: o.outcome.is_success(),
                        active_alerts: active_by_probe.get(&o.id).cloned().unwrap_or_default(),
                        attributes: attributes_by_probe.get(&o.id).cloned().unwrap_or_default(),
                        results: o.outcome.measurements.clone(),
                        reasons: o.outcome.reasons.clone(),
                    },
                )
            })
            .collect();

        let alerts = self.render_aged_alert_list(active, now).await;

        self.world.status.publish_checkers(now, checkers, alerts).await;
    }

    /// Flatten the active-alert set into age-prefixed display strings,
    /// tracking each display string's first-seen time across cycles the
    /// same way `NotifierGate` does for its own age prefixing.
    async fn render_aged_alert_list(&self, active: &[ActiveAlert], now: i64) -> Vec<String> {
        let current: HashSet<String> = active.iter().map(|a| a.display.clone()).collect();
        let mut ages = self.alert_ages.lock().await;
        for display in &current {
            ages.entry(display.clone()).or_insert(now);
        }
        ages.retain(|display, _| current.contains(display));

        let mut alerts: Vec<String> = active
            .iter()
            .map(|a| {
                let started = ages.get(&a.display).copied().unwrap_or(now);
                format!("{}: {}", render_age_phrase(now - started), a.display)
            })
            .collect();
        alerts.sort();
        alerts
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::WorldBuilder;
    use crate::core::sink::MeasurementSink;
    use crate::core::status::StatusSnapshot;
    use crate::diagnostics::Diagnostics;
    use crate::notifiers::sink::SinkNotifier;
    use crate::notifiers::webstatus::WebStatusNotifier;
    use crate::probes::external::ExternalProbe;
    use std::path::PathBuf;

    fn diagnostics() -> Arc<Diagnostics> {
        Arc::new(Diagnostics::new(PathBuf::from(format!(
            "/tmp/simplomon-test-runner-{}.jsonl",
            std::process::id()
        ))))
    }

    async fn build_world(cmd: Vec<&str>, expected_rc: i32) -> Arc<World> {
        let mut builder = WorldBuilder::new();
        let probe = Arc::new(
            ExternalProbe::new(cmd.into_iter().map(String::from).collect(), None, Some(expected_rc)).unwrap(),
        );
        let mut config = crate::core::model::ProbeConfig::new("external", "test probe");
        config.min_failures = 1;
        config.failure_window_secs = 60;
        builder.register_probe(probe, config);

        let status = StatusSnapshot::new();
        let sink = MeasurementSink::spawn(std::env::temp_dir().join(format!("simplomon-runner-test-{}", std::process::id())));
        let diag = diagnostics();

        let clock: Arc<dyn Fn() -> i64 + Send + Sync> = Arc::new(|| 0);
        builder.register_notifier("sink", Arc::new(SinkNotifier::new(sink.clone(), Arc::clone(&clock))));
        builder.register_notifier("webstatus", Arc::new(WebStatusNotifier::new(status.clone(), clock)));

        Arc::new(builder.build(300, status, sink, diag))
    }

    #[tokio::test]
    async fn healthy_probe_publishes_no_active_alerts() {
        let world = build_world(vec!["true"], 0).await;
        let runner = Runner::new(world.clone(), 2, 4, Duration::from_secs(60), Duration::from_secs(5));
        runner.run_cycle(0).await;
        let snapshot = world.status.read().await;
        assert!(snapshot.checkers.values().all(|c| c.healthy));
    }

    #[tokio::test]
    async fn failing_probe_surfaces_as_active_alert() {
        let world = build_world(vec!["false"], 0).await;
        let runner = Runner::new(world.clone(), 2, 4, Duration::from_secs(60), Duration::from_secs(5));
        runner.run_cycle(0).await;
        let snapshot = world.status.read().await;
        assert!(snapshot.checkers.values().any(|c| !c.healthy));
    }
}
