use std::env;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;

use modbus_client::{ClientConfig, Framing};
use poller_actor::ActorConfig;

const DEFAULT_LOG_LEVEL: &str = "WARN";
const DEFAULT_PROMETHEUS_PREFIX: &str = "solarrs485exporter";
const DEFAULT_PROMETHEUS_PORT: u16 = 9003;
const DEFAULT_PROMETHEUS_BIND: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
const CONFIG_ENV: &str = "SOLAR_EXPORTER_CONFIG";

#[derive(Clone, Debug)]
pub struct ExporterConfig {
    pub log_level: String,
    pub prometheus_prefix: String,
    pub prometheus_bind: IpAddr,
    pub prometheus_port: u16,
    pub modbus: ClientConfig,
    pub poller: ActorConfig,
}

impl ExporterConfig {
    pub fn load() -> Result<Self> {
        Self::load_with_path(None)
    }

    pub fn load_with_path(config_path: Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(file_config) = load_file_config(config_path.as_deref())? {
            apply_file_config(&mut config, file_config)?;
        }

        apply_env_overrides(&mut config)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        parse_log_level(&self.log_level)?;
        validate_prefix(&self.prometheus_prefix)?;
        if self.prometheus_port == 0 {
            anyhow::bail!("prometheus.port must be between 1 and 65535");
        }
        if self.modbus.host.trim().is_empty() {
            anyhow::bail!("rs485.address must be non-empty");
        }
        if self.modbus.port == 0 {
            anyhow::bail!("rs485.port must be between 1 and 65535");
        }
        if !(1..=247).contains(&self.modbus.unit_id) {
            anyhow::bail!("rs485.unit_id must be between 1 and 247");
        }
        if self.modbus.timeout_ms == 0 {
            anyhow::bail!("rs485.timeout_ms must be >= 1");
        }
        if self.modbus.connect_timeout_ms == 0 {
            anyhow::bail!("rs485.connect_timeout_ms must be >= 1");
        }
        if self.poller.poll_interval.is_zero() {
            anyhow::bail!("poller.interval_seconds must be >= 1");
        }

        Ok(())
    }

    pub fn level_filter(&self) -> Result<LevelFilter> {
        parse_log_level(&self.log_level)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.prometheus_bind, self.prometheus_port)
    }
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            prometheus_prefix: DEFAULT_PROMETHEUS_PREFIX.to_string(),
            prometheus_bind: DEFAULT_PROMETHEUS_BIND,
            prometheus_port: DEFAULT_PROMETHEUS_PORT,
            modbus: ClientConfig::default(),
            poller: ActorConfig::default(),
        }
    }
}

/// Accepts tracing level names plus the `WARNING`/`CRITICAL` spellings
/// operators carry over from other daemons.
pub fn parse_log_level(value: &str) -> Result<LevelFilter> {
    let normalized = value.trim().to_ascii_lowercase();
    let name = match normalized.as_str() {
        "warning" => "warn",
        "critical" | "fatal" => "error",
        other => other,
    };
    LevelFilter::from_str(name).map_err(|_| anyhow::anyhow!("unknown log level '{value}'"))
}

fn apply_env_overrides(config: &mut ExporterConfig) -> Result<()> {
    if let Ok(value) = env::var("LOG_LEVEL") {
        config.log_level = value;
    }

    if let Ok(value) = env::var("PROMETHEUS_PREFIX") {
        config.prometheus_prefix = value;
    }

    if let Some(port) = parse_env::<u16>("PROMETHEUS_PORT")? {
        config.prometheus_port = port;
    }

    if let Some(bind) = parse_env::<IpAddr>("PROMETHEUS_BIND")? {
        config.prometheus_bind = bind;
    }

    if let Ok(value) = env::var("RS485_ADDRESS") {
        config.modbus.host = value;
    }

    if let Some(port) = parse_env::<u16>("RS485_PORT")? {
        config.modbus.port = port;
    }

    if let Some(unit_id) = parse_env::<u8>("RS485_UNIT_ID")? {
        config.modbus.unit_id = unit_id;
    }

    if let Some(framing) = parse_env::<Framing>("RS485_FRAMING")? {
        config.modbus.framing = framing;
    }

    if let Some(timeout_ms) = parse_env::<u64>("RS485_TIMEOUT_MS")? {
        config.modbus.timeout_ms = timeout_ms;
    }

    if let Some(timeout_ms) = parse_env::<u64>("RS485_CONNECT_TIMEOUT_MS")? {
        config.modbus.connect_timeout_ms = timeout_ms;
    }

    if let Some(seconds) = parse_env::<u64>("POLLING_INTERVAL_SECONDS")? {
        config.poller.poll_interval = Duration::from_secs(seconds);
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    logging: Option<FileLoggingConfig>,
    prometheus: Option<FilePrometheusConfig>,
    rs485: Option<FileRs485Config>,
    poller: Option<FilePollerConfig>,
}

#[derive(Debug, Deserialize)]
struct FileLoggingConfig {
    level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FilePrometheusConfig {
    prefix: Option<String>,
    port: Option<u16>,
    bind: Option<IpAddr>,
}

#[derive(Debug, Deserialize)]
struct FileRs485Config {
    address: Option<String>,
    port: Option<u16>,
    unit_id: Option<u8>,
    framing: Option<String>,
    timeout_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FilePollerConfig {
    interval_seconds: Option<u64>,
}

fn load_file_config(config_path: Option<&str>) -> Result<Option<FileConfig>> {
    let path = match config_path {
        Some(path) => path.to_string(),
        None => match env::var(CONFIG_ENV) {
            Ok(value) => value,
            Err(_) => return Ok(None),
        },
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("read config file {path}"))?;
    let ext = Path::new(&path).extension().and_then(|value| value.to_str());

    let config = match ext {
        Some("json") => serde_json::from_str(&content).context("parse json config")?,
        _ => toml::from_str(&content).context("parse toml config")?,
    };

    Ok(Some(config))
}

fn apply_file_config(config: &mut ExporterConfig, file: FileConfig) -> Result<()> {
    if let Some(logging) = file.logging {
        if let Some(level) = logging.level {
            config.log_level = level;
        }
    }

    if let Some(prometheus) = file.prometheus {
        if let Some(prefix) = prometheus.prefix {
            config.prometheus_prefix = prefix;
        }
        if let Some(port) = prometheus.port {
            config.prometheus_port = port;
        }
        if let Some(bind) = prometheus.bind {
            config.prometheus_bind = bind;
        }
    }

    if let Some(rs485) = file.rs485 {
        if let Some(address) = rs485.address {
            config.modbus.host = address;
        }
        if let Some(port) = rs485.port {
            config.modbus.port = port;
        }
        if let Some(unit_id) = rs485.unit_id {
            config.modbus.unit_id = unit_id;
        }
        if let Some(framing) = rs485.framing {
            config.modbus.framing = framing
                .parse()
                .map_err(|err: String| anyhow::anyhow!("rs485.framing: {err}"))?;
        }
        if let Some(timeout_ms) = rs485.timeout_ms {
            config.modbus.timeout_ms = timeout_ms;
        }
        if let Some(timeout_ms) = rs485.connect_timeout_ms {
            config.modbus.connect_timeout_ms = timeout_ms;
        }
    }

    if let Some(poller) = file.poller {
        if let Some(seconds) = poller.interval_seconds {
            config.poller.poll_interval = Duration::from_secs(seconds);
        }
    }

    Ok(())
}

fn parse_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|err| anyhow::anyhow!("invalid value for {key}: {err}")),
        Err(_) => Ok(None),
    }
}

fn validate_prefix(prefix: &str) -> Result<()> {
    let mut chars = prefix.chars();
    let Some(first) = chars.next() else {
        return Ok(());
    };
    if !(first.is_ascii_alphabetic() || first == '_' || first == ':') {
        anyhow::bail!("prometheus.prefix must start with a letter, '_' or ':'");
    }
    if chars.any(|ch| !(ch.is_ascii_alphanumeric() || ch == '_' || ch == ':')) {
        anyhow::bail!("prometheus.prefix may only contain letters, digits, '_' and ':'");
    }
    Ok(())
}
