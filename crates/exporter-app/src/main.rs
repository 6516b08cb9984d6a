use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{info, warn};

use exporter_app::ExporterConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = parse_config_arg();
    let config = ExporterConfig::load_with_path(config_path).context("load config failed")?;
    config.validate().context("config validation failed")?;

    tracing_subscriber::fmt()
        .with_max_level(config.level_filter()?)
        .init();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (poller, exporter) = exporter_app::build(&config, shutdown_rx.clone());

    let listener = prometheus_sink::bind(config.listen_addr())
        .await
        .with_context(|| format!("bind metrics port {}", config.listen_addr()))?;
    info!(
        port = config.prometheus_port,
        prefix = %exporter.prefix(),
        device = %format!("{}:{}", config.modbus.host, config.modbus.port),
        framing = %config.modbus.framing,
        "start prometheus exporter"
    );

    let server_handle = tokio::spawn(prometheus_sink::serve(
        listener,
        exporter,
        shutdown_rx.clone(),
    ));
    let poller_handle = tokio::spawn(poller.run());

    notify_ready();
    let watchdog_handle = start_watchdog(shutdown_rx.clone());

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl-c handler failed");
    }
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    if let Err(err) = poller_handle.await {
        warn!(error = %err, "poller task join failed");
    }
    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "metrics server failed"),
        Err(err) => warn!(error = %err, "metrics server task join failed"),
    }
    if let Some(handle) = watchdog_handle {
        let _ = handle.await;
    }
    Ok(())
}

fn parse_config_arg() -> Option<String> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

#[cfg(target_os = "linux")]
fn notify_ready() {
    if let Err(err) = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]) {
        warn!(error = %err, "systemd ready notify failed");
    }
}

#[cfg(not(target_os = "linux"))]
fn notify_ready() {}

#[cfg(target_os = "linux")]
fn start_watchdog(
    mut shutdown: watch::Receiver<bool>,
) -> Option<tokio::task::JoinHandle<()>> {
    let interval = watchdog_interval()?;
    Some(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sleep(interval) => {
                    if let Err(err) = sd_notify::notify(false, &[sd_notify::NotifyState::Watchdog]) {
                        warn!(error = %err, "systemd watchdog notify failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }))
}

#[cfg(not(target_os = "linux"))]
fn start_watchdog(_shutdown: watch::Receiver<bool>) -> Option<tokio::task::JoinHandle<()>> {
    None
}

#[cfg(target_os = "linux")]
fn watchdog_interval() -> Option<Duration> {
    let watchdog_usec = env::var("WATCHDOG_USEC").ok()?.parse::<u64>().ok()?;
    if let Some(pid) = env::var("WATCHDOG_PID")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
    {
        if pid != std::process::id() {
            return None;
        }
    }

    let interval = watchdog_usec.saturating_div(2).max(100_000);
    Some(Duration::from_micros(interval))
}
