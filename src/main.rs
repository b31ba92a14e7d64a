use simplomon::cli::Cli;
use simplomon::config;
use simplomon::core::runner::Runner;
use simplomon::diagnostics::{Diagnostics, Level};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    let toml_text = match config::resolve_source(cli.config.as_deref()).await {
        Ok(text) => text,
        Err(err) => {
            eprintln!("simplomon: failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    let log_path = config::peek_log_path(&toml_text).unwrap_or_else(|_| std::path::PathBuf::from("./simplomon-data/diagnostics.jsonl"));
    let diagnostics = Arc::new(Diagnostics::new(log_path));

    let (world, daemon, http) = match config::build(&toml_text, diagnostics) {
        Ok(built) => built,
        Err(err) => {
            eprintln!("simplomon: invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    world
        .diagnostics
        .log(Level::Info, "main", &format!("loaded {} probe(s), {} notifier(s)", world.probes.len(), world.notifiers.len()));

    let status = world.status.clone();
    let world = Arc::new(world);
    let runner = Runner::new(
        Arc::clone(&world),
        daemon.initial_workers,
        daemon.max_workers,
        daemon.cycle_interval,
        daemon.probe_timeout,
    );

    if cli.once {
        runner.run_cycle(now_unix()).await;
        return ExitCode::SUCCESS;
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let http_task = http.map(|settings| {
        tokio::spawn(async move {
            if let Err(err) = simplomon::httpapi::serve(settings.bind, status, settings.static_dir, settings.basic_auth).await {
                eprintln!("simplomon: status http server failed: {err}");
            }
        })
    });

    let runner_task = tokio::spawn(async move {
        runner.run_forever(shutdown_rx).await;
    });

    wait_for_shutdown_signal().await;
    world.diagnostics.log(Level::Info, "main", "shutdown requested, waiting for in-flight cycle");
    let _ = shutdown_tx.send(());

    let _ = runner_task.await;
    if let Some(task) = http_task {
        task.abort();
    }

    ExitCode::SUCCESS
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
