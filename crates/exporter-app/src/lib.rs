pub mod config;

use std::sync::Arc;

use tokio::sync::watch;

use modbus_client::ModbusConnector;
use poller_actor::PollerActor;
use prometheus_sink::PrometheusExporter;
use types::Snapshot;

pub use config::ExporterConfig;

/// Builds the poller and the exporter around one shared snapshot.
pub fn build(
    config: &ExporterConfig,
    shutdown: watch::Receiver<bool>,
) -> (PollerActor<ModbusConnector>, Arc<PrometheusExporter>) {
    let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::default());
    let exporter = Arc::new(PrometheusExporter::new(
        config.prometheus_prefix.clone(),
        snapshot_rx,
    ));
    let poller = PollerActor::new(
        config.modbus.identity(),
        ModbusConnector::new(config.modbus.clone()),
        snapshot_tx,
        shutdown,
        config.poller.clone(),
    );
    (poller, exporter)
}
