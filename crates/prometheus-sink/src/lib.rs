//! Prometheus exposition of the latest inverter snapshot.
//!
//! Every scrape renders the snapshot through a freshly built recorder, so
//! the output never contains series from earlier cycles (an info metric whose
//! labels changed shows only its current label set) and no process-global
//! recorder is installed.

mod http;

use metrics::{counter, describe_counter, describe_gauge, gauge, Label};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::watch;

use types::Snapshot;

pub use http::{bind, router, serve};

pub const TIMESTAMP_INFO: &str = "timestamp_info";
pub const ERROR_INFO: &str = "error_info";
pub const POLL_CYCLES: &str = "poll_cycles_total";
pub const POLL_FAILURES: &str = "poll_failures_total";
pub const LAST_SUCCESS: &str = "last_success_timestamp_seconds";

/// Serves the snapshot published by the poller.
#[derive(Debug, Clone)]
pub struct PrometheusExporter {
    prefix: String,
    snapshot: watch::Receiver<Snapshot>,
}

impl PrometheusExporter {
    pub fn new(prefix: impl Into<String>, snapshot: watch::Receiver<Snapshot>) -> Self {
        Self {
            prefix: prefix.into(),
            snapshot,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Text exposition of the current snapshot.
    pub fn scrape(&self) -> String {
        let snapshot = self.snapshot.borrow().clone();
        render(&self.prefix, &snapshot)
    }
}

/// `<prefix>_<name>`, or just `name` when the prefix is empty.
pub fn metric_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}_{name}")
    }
}

pub fn render(prefix: &str, snapshot: &Snapshot) -> String {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::with_local_recorder(&recorder, || publish(prefix, snapshot));
    handle.render()
}

fn publish(prefix: &str, snapshot: &Snapshot) {
    for (measurement, value) in snapshot.gauges() {
        let name = metric_name(prefix, measurement.name());
        describe_gauge!(name.clone(), measurement.help());
        gauge!(name).set(value);
    }

    if let Some(timestamp) = snapshot.timestamp {
        let labels: Vec<Label> = timestamp
            .labels()
            .into_iter()
            .map(|(key, value)| Label::new(key, value))
            .collect();
        info(prefix, TIMESTAMP_INFO, "Inverter clock", labels);
    }

    if let Some(code) = snapshot.error_code {
        info(
            prefix,
            ERROR_INFO,
            "Inverter error code",
            vec![Label::new("error", code.to_string())],
        );
    }

    let cycles = metric_name(prefix, POLL_CYCLES);
    describe_counter!(cycles.clone(), "Poll cycles attempted");
    counter!(cycles).absolute(snapshot.cycles);

    let failures = metric_name(prefix, POLL_FAILURES);
    describe_counter!(failures.clone(), "Poll cycles aborted by a device error");
    counter!(failures).absolute(snapshot.failed_cycles);

    if let Some(last_success_ms) = snapshot.last_success_ms {
        let name = metric_name(prefix, LAST_SUCCESS);
        describe_gauge!(name.clone(), "Unix time of the last complete poll cycle");
        gauge!(name).set(last_success_ms as f64 / 1_000.0);
    }
}

fn info(prefix: &str, name: &str, help: &'static str, labels: Vec<Label>) {
    let name = metric_name(prefix, name);
    describe_gauge!(name.clone(), help);
    gauge!(name, labels).set(1.0);
}
