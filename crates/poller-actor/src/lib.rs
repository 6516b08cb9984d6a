use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use modbus_client::{ClientError, Connector, RegisterSource};
use register_map::{decode, DecodeError, Entry, Value, REGISTER_MAP};
use types::{DeviceIdentity, Snapshot};

#[derive(Debug, Clone)]
pub struct ActorConfig {
    pub poll_interval: Duration,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Error)]
pub enum PollerError {
    #[error("failed to connect to modbus device: {0}")]
    Connect(#[source] ClientError),
    #[error("read of {entry} at {address} failed: {source}")]
    Read {
        entry: &'static str,
        address: u16,
        source: ClientError,
    },
    #[error("decode of {entry} at {address} failed: {source}")]
    Decode {
        entry: &'static str,
        address: u16,
        source: DecodeError,
    },
}

impl PollerError {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            PollerError::Connect(ClientError::ConnectTimeout { .. })
                | PollerError::Read {
                    source: ClientError::Timeout { .. },
                    ..
                }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub reads: usize,
    pub elapsed: Duration,
}

/// Reads and decodes a single register map entry.
pub async fn read_entry<S: RegisterSource>(source: &mut S, entry: &Entry) -> Result<Value, PollerError> {
    let registers = source
        .read_registers(entry.function_code(), entry.address(), entry.register_count())
        .await
        .map_err(|err| PollerError::Read {
            entry: entry.name(),
            address: entry.address(),
            source: err,
        })?;

    decode(entry, &registers).map_err(|err| PollerError::Decode {
        entry: entry.name(),
        address: entry.address(),
        source: err,
    })
}

pub fn apply(snapshot: &mut Snapshot, value: Value) {
    match value {
        Value::Gauge(measurement, reading) => snapshot.set(measurement, reading),
        Value::Timestamp(timestamp) => snapshot.timestamp = Some(timestamp),
        Value::ErrorCode(code) => snapshot.error_code = Some(code),
    }
}

/// Drives the poll loop for the one configured inverter.
pub struct PollerActor<C> {
    identity: DeviceIdentity,
    connector: C,
    snapshot: watch::Sender<Snapshot>,
    shutdown: watch::Receiver<bool>,
    config: ActorConfig,
}

impl<C: Connector> PollerActor<C> {
    pub fn new(
        identity: DeviceIdentity,
        connector: C,
        snapshot: watch::Sender<Snapshot>,
        shutdown: watch::Receiver<bool>,
        config: ActorConfig,
    ) -> Self {
        Self {
            identity,
            connector,
            snapshot,
            shutdown,
            config,
        }
    }

    /// Runs one cycle. Every decoded value lands in the shared snapshot
    /// before the next register is requested; a failure leaves everything
    /// not yet read at its previous value.
    pub async fn poll_once(&self) -> Result<CycleReport, PollerError> {
        let cycle_start = Instant::now();
        let outcome = self.fetch().await;
        let succeeded = outcome.is_ok();

        self.snapshot.send_modify(|snapshot| {
            snapshot.cycles = snapshot.cycles.wrapping_add(1);
            if succeeded {
                snapshot.last_success_ms = Some(unix_ms());
            } else {
                snapshot.failed_cycles = snapshot.failed_cycles.wrapping_add(1);
            }
        });

        outcome.map(|reads| CycleReport {
            reads,
            elapsed: cycle_start.elapsed(),
        })
    }

    async fn fetch(&self) -> Result<usize, PollerError> {
        let mut source = self.connector.connect().await.map_err(PollerError::Connect)?;
        let mut reads = 0usize;

        for entry in REGISTER_MAP.iter() {
            let value = read_entry(&mut source, entry).await?;
            debug!(entry = entry.name(), address = entry.address(), ?value, "register decoded");
            self.snapshot.send_modify(|snapshot| apply(snapshot, value));
            reads += 1;
        }

        Ok(reads)
    }

    /// Polls on a fixed period until shutdown. Device failures are logged
    /// and the loop moves on to the next tick.
    pub async fn run(mut self) {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            host = %self.identity.host,
            port = self.identity.port,
            unit_id = self.identity.unit_id,
            interval_ms = self.config.poll_interval.as_millis(),
            "poller started"
        );

        loop {
            if *self.shutdown.borrow() {
                info!(host = %self.identity.host, "poller shutdown requested");
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {},
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!(host = %self.identity.host, "poller shutdown requested");
                        break;
                    }
                    continue;
                }
            }

            match self.poll_once().await {
                Ok(report) => {
                    info!(
                        host = %self.identity.host,
                        unit_id = self.identity.unit_id,
                        reads = report.reads,
                        elapsed_ms = report.elapsed.as_millis(),
                        "poll cycle complete"
                    );
                }
                Err(err) => {
                    let failed_cycles = self.snapshot.borrow().failed_cycles;
                    warn!(
                        host = %self.identity.host,
                        unit_id = self.identity.unit_id,
                        timeout = err.is_timeout(),
                        failed_cycles,
                        error = %err,
                        "poll cycle aborted"
                    );
                }
            }
        }
    }
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
