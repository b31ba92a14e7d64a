//! End-to-end coverage of the failure filter, correlator and minimum-age
//! gate wired together the way the runner's coordinator step wires them.

use crate::common::{FakeClock, RecordingNotifier};
use simplomon::core::correlator::Correlator;
use simplomon::core::filter::{FailureFilter, Sensitivity};
use simplomon::core::model::ProbeId;
use simplomon::notifiers::Notifier;

const PROBE: ProbeId = ProbeId(1);

fn kind_of(_: ProbeId) -> String {
    "probe".to_string()
}

#[tokio::test]
async fn below_threshold_failure_never_notifies() {
    let filter = FailureFilter::new(300);
    let mut correlator = Correlator::new();
    let clock = FakeClock::new(0);
    let notifier = RecordingNotifier::new("n", 0, clock.clone());
    let sens = |_| Some(Sensitivity { min_failures: 2, failure_window_secs: 60 });

    // Cycle 1 at t=0: one failure.
    filter.report(PROBE, "", "r", 0).await;
    let active = filter.active_alerts(0, sens, kind_of).await;
    let transition = correlator.correlate(active);
    for a in &transition.new {
        notifier.bulk_alert(&a.display).await;
    }
    notifier.bulk_done().await;

    // Cycle 2 at t=30: success, nothing reported.
    let active = filter.active_alerts(30, sens, kind_of).await;
    let transition = correlator.correlate(active);
    for a in &transition.resolved {
        notifier.bulk_alert(&a.display).await;
    }
    clock.set(30);
    notifier.bulk_done().await;

    assert!(notifier.texts().is_empty());
}

#[tokio::test]
async fn confirmed_alert_ripens_and_resolves() {
    let filter = FailureFilter::new(300);
    let mut correlator = Correlator::new();
    let clock = FakeClock::new(0);
    let notifier = RecordingNotifier::new("n", 0, clock.clone());
    let sens = |_| Some(Sensitivity { min_failures: 2, failure_window_secs: 60 });

    filter.report(PROBE, "", "r", 0).await;
    let active = filter.active_alerts(0, sens, kind_of).await;
    assert!(active.is_empty()); // only one report so far, below min_failures

    filter.report(PROBE, "", "r", 15).await;
    let active = filter.active_alerts(15, sens, kind_of).await;
    assert_eq!(active[0].display, "probe: [] r");
    let transition = correlator.correlate(active);
    assert!(transition.new.iter().any(|a| a.display == "probe: [] r"));
    for a in &transition.new {
        notifier.bulk_alert(&a.display).await;
    }
    clock.set(15);
    notifier.bulk_done().await;
    assert_eq!(notifier.texts(), vec!["probe: [] r".to_string()]);

    // Cycle at t=30: success, resolution fires.
    let active = filter.active_alerts(30, sens, kind_of).await;
    let transition = correlator.correlate(active);
    for a in &transition.resolved {
        notifier.bulk_alert(&a.display).await;
    }
    clock.set(30);
    notifier.bulk_done().await;

    let texts = notifier.texts();
    assert_eq!(texts.len(), 2);
    assert!(texts[1].contains("the following alert is over: probe: [] r"));
}

#[tokio::test]
async fn short_lived_alert_under_minimum_age_is_silent() {
    let clock = FakeClock::new(0);
    let notifier = RecordingNotifier::new("n", 10, clock.clone()); // 600s gate

    for t in [0, 60, 120] {
        notifier.bulk_alert("probe: [] r").await;
        clock.set(t);
        notifier.bulk_done().await;
    }
    // Resolved at t=180, never ripened.
    clock.set(180);
    notifier.bulk_done().await;

    assert!(notifier.texts().is_empty());
}

#[tokio::test]
async fn alert_past_minimum_age_emits_with_age_prefix_and_resolves_with_duration() {
    let clock = FakeClock::new(0);
    let notifier = RecordingNotifier::new("n", 10, clock.clone());

    for t in (0..=540).step_by(60) {
        notifier.bulk_alert("probe: [] r").await;
        clock.set(t);
        notifier.bulk_done().await;
    }
    assert!(notifier.texts().is_empty());

    notifier.bulk_alert("probe: [] r").await;
    clock.set(600);
    notifier.bulk_done().await;
    let texts = notifier.texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].starts_with("(10 minutes already) "));

    for t in (660..=840).step_by(60) {
        notifier.bulk_alert("probe: [] r").await;
        clock.set(t);
        notifier.bulk_done().await;
    }
    clock.set(900);
    notifier.bulk_done().await; // no longer reported -> resolves

    let texts = notifier.texts();
    assert_eq!(texts.len(), 2);
    assert!(texts[1].contains("15 minutes"));
}

#[tokio::test]
async fn independent_subjects_resolve_independently() {
    let filter = FailureFilter::new(300);
    let mut correlator = Correlator::new();
    let clock = FakeClock::new(0);
    let notifier = RecordingNotifier::new("n", 0, clock.clone());
    let sens = |_| Some(Sensitivity { min_failures: 1, failure_window_secs: 60 });
    let kind_of = |_| "https".to_string();

    filter.report(PROBE, "ipv4", "timeout", 0).await;
    filter.report(PROBE, "ipv6", "connection refused", 0).await;
    let active = filter.active_alerts(0, sens, kind_of).await;
    assert_eq!(active.len(), 2);
    let displays: Vec<_> = active.iter().map(|a| a.display.clone()).collect();
    assert!(displays.contains(&"https: [ipv4] timeout".to_string()));
    assert!(displays.contains(&"https: [ipv6] connection refused".to_string()));

    let transition = correlator.correlate(active);
    for a in &transition.new {
        notifier.bulk_alert(&a.display).await;
    }
    notifier.bulk_done().await;
    assert_eq!(notifier.texts().len(), 2);

    // ipv4 recovers, ipv6 still failing.
    filter.report(PROBE, "ipv6", "connection refused", 30).await;
    let active = filter.active_alerts(30, sens, kind_of).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].display, "https: [ipv6] connection refused");
    let transition = correlator.correlate(active);
    assert!(transition.resolved.iter().any(|a| a.display == "https: [ipv4] timeout"));
    assert!(transition.new.is_empty());
}
