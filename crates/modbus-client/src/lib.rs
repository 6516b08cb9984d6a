use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tokio_modbus::client::{rtu, tcp, Context};
use tokio_modbus::prelude::{Reader, Slave};
use tracing::{debug, warn};

pub use types::function_code::{READ_HOLDING_REGISTERS, READ_INPUT_REGISTERS};
use types::DeviceIdentity;

/// How Modbus frames travel over the TCP socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Modbus TCP with MBAP headers.
    #[default]
    Tcp,
    /// Raw RTU frames (with CRC) tunnelled through a transparent RS485 bridge.
    Rtu,
}

impl FromStr for Framing {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Framing::Tcp),
            "rtu" | "rtu-over-tcp" => Ok(Framing::Rtu),
            other => Err(format!("unknown modbus framing '{other}' (expected tcp or rtu)")),
        }
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framing::Tcp => f.write_str("tcp"),
            Framing::Rtu => f.write_str("rtu"),
        }
    }
}

/// Connection settings for the RS485-to-Ethernet bridge.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    pub framing: Framing,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl ClientConfig {
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            host: self.host.clone(),
            port: self.port,
            unit_id: self.unit_id,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8899,
            unit_id: 1,
            framing: Framing::Tcp,
            timeout_ms: 1_000,
            connect_timeout_ms: 3_000,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not resolve {0}:{1}")]
    InvalidAddress(String, u16),
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("connect timed out after {timeout_ms}ms")]
    ConnectTimeout { timeout_ms: u64 },
    #[error("modbus transport error: {0}")]
    Modbus(std::io::Error),
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("unsupported function code {0}")]
    UnsupportedFunction(u8),
}

/// Something that can answer register reads for one device.
pub trait RegisterSource {
    fn read_registers(
        &mut self,
        function_code: u8,
        address: u16,
        count: u16,
    ) -> impl Future<Output = Result<Vec<u16>, ClientError>> + Send;
}

/// Opens a fresh [`RegisterSource`] for each poll cycle.
pub trait Connector {
    type Source: RegisterSource + Send;

    fn connect(&self) -> impl Future<Output = Result<Self::Source, ClientError>> + Send;
}

#[derive(Debug)]
pub struct ModbusClient {
    config: ClientConfig,
    context: Context,
}

impl ModbusClient {
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);

        let attempt = async {
            let addr = resolve(&config.host, config.port).await?;
            let context = open(addr, Slave(config.unit_id), config.framing)
                .await
                .map_err(|source| ClientError::Connect { addr, source })?;
            Ok::<_, ClientError>((addr, context))
        };

        let (addr, context) = match timeout(connect_timeout, attempt).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ClientError::ConnectTimeout {
                    timeout_ms: config.connect_timeout_ms,
                })
            }
        };
        debug!(%addr, unit_id = config.unit_id, framing = %config.framing, "modbus connected");

        Ok(Self { config, context })
    }
}

async fn open(addr: SocketAddr, slave: Slave, framing: Framing) -> std::io::Result<Context> {
    match framing {
        Framing::Tcp => tcp::connect_slave(addr, slave).await,
        Framing::Rtu => {
            let stream = TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            Ok(rtu::attach_slave(stream, slave))
        }
    }
}

impl RegisterSource for ModbusClient {
    async fn read_registers(
        &mut self,
        function_code: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ClientError> {
        let unit_id = self.config.unit_id;
        let timeout_ms = self.config.timeout_ms;
        let request = async {
            match function_code {
                READ_INPUT_REGISTERS => Ok(self.context.read_input_registers(address, count).await),
                READ_HOLDING_REGISTERS => {
                    Ok(self.context.read_holding_registers(address, count).await)
                }
                other => Err(ClientError::UnsupportedFunction(other)),
            }
        };

        // tokio-modbus rejects replies whose register count differs from the request.
        match timeout(Duration::from_millis(timeout_ms), request).await {
            Ok(Ok(Ok(values))) => {
                debug!(unit_id, function_code, address, count, "modbus read ok");
                Ok(values)
            }
            Ok(Ok(Err(err))) => {
                warn!(unit_id, function_code, address, count, error = %err, "modbus read error");
                Err(ClientError::Modbus(err))
            }
            Ok(Err(err)) => Err(err),
            Err(_) => {
                warn!(unit_id, function_code, address, count, "modbus read timeout");
                Err(ClientError::Timeout { timeout_ms })
            }
        }
    }
}

/// Connects a [`ModbusClient`] with a fixed configuration.
#[derive(Debug, Clone)]
pub struct ModbusConnector {
    config: ClientConfig,
}

impl ModbusConnector {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

impl Connector for ModbusConnector {
    type Source = ModbusClient;

    async fn connect(&self) -> Result<ModbusClient, ClientError> {
        ModbusClient::connect(self.config.clone()).await
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, ClientError> {
    let mut addrs = lookup_host((host, port))
        .await
        .map_err(|_| ClientError::InvalidAddress(host.to_string(), port))?;
    addrs
        .next()
        .ok_or_else(|| ClientError::InvalidAddress(host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_parses_case_insensitively() {
        assert_eq!("TCP".parse::<Framing>(), Ok(Framing::Tcp));
        assert_eq!(" rtu ".parse::<Framing>(), Ok(Framing::Rtu));
        assert_eq!("rtu-over-tcp".parse::<Framing>(), Ok(Framing::Rtu));
        assert!("ascii".parse::<Framing>().is_err());
    }

    #[test]
    fn defaults_match_bridge_conventions() {
        let config = ClientConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 8899);
        assert_eq!(config.unit_id, 1);
        assert_eq!(config.framing, Framing::Tcp);
    }

    #[tokio::test]
    async fn unresolvable_host_is_reported() {
        let config = ClientConfig {
            host: "host.invalid".to_string(),
            ..ClientConfig::default()
        };
        let err = ModbusClient::connect(config).await.expect_err("should fail");
        assert!(matches!(err, ClientError::InvalidAddress(_, 8899)));
    }
}
