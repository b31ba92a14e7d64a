//! Full-stack tests that build a `World` from TOML and drive it through the
//! `Runner`, exercising the config loader, registry, filter, correlator and
//! status surface together.

use simplomon::config;
use simplomon::core::runner::Runner;
use simplomon::diagnostics::Diagnostics;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn diagnostics(tag: &str) -> (Arc<Diagnostics>, PathBuf) {
    let path = std::env::temp_dir().join(format!("simplomon-it-{tag}-{}.jsonl", std::process::id()));
    let _ = std::fs::remove_file(&path);
    (Arc::new(Diagnostics::new(path.clone())), path)
}

#[tokio::test]
async fn failing_external_probe_reaches_the_status_surface() {
    let (diag, _path) = diagnostics("runner-fail");
    let toml_text = r#"
        [daemon]
        interval_secs = 60
        data_dir = "/tmp/simplomon-it-data"

        [[probes]]
        kind = "external"
        cmd = ["false"]
        minFailures = 1
        notifiers = ["sink"]
    "#;
    let (world, _daemon, _http) = config::build(toml_text, diag).unwrap();
    let world = Arc::new(world);
    let runner = Runner::new(world.clone(), 2, 4, Duration::from_secs(60), Duration::from_secs(5));

    runner.run_cycle(0).await;
    let snapshot = world.status.read().await;
    assert!(snapshot.checkers.values().any(|c| !c.healthy && !c.active_alerts.is_empty()));
}

#[tokio::test]
async fn cycle_overrun_grows_the_worker_pool() {
    let (diag, path) = diagnostics("runner-overrun");
    let toml_text = r#"
        [daemon]
        interval_secs = 1
        data_dir = "/tmp/simplomon-it-overrun"

        [[probes]]
        kind = "external"
        cmd = ["sleep", "0.05"]

        [[probes]]
        kind = "external"
        cmd = ["sleep", "0.05"]

        [[probes]]
        kind = "external"
        cmd = ["sleep", "0.05"]

        [[probes]]
        kind = "external"
        cmd = ["sleep", "0.05"]
    "#;
    let (world, _daemon, _http) = config::build(toml_text, diag).unwrap();
    let world = Arc::new(world);
    let runner = Arc::new(Runner::new(world, 1, 4, Duration::from_millis(60), Duration::from_secs(2)));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn({
        let runner = Arc::clone(&runner);
        async move { runner.run_forever(shutdown_rx).await }
    });

    tokio::time::sleep(Duration::from_millis(350)).await;
    let _ = shutdown_tx.send(());
    let _ = handle.await;

    let log = std::fs::read_to_string(&path).unwrap_or_default();
    assert!(log.contains("growing worker pool"), "log did not record pool growth:\n{log}");
    let _ = std::fs::remove_file(&path);
}
