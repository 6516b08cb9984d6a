use modbus_client::{ClientConfig, Framing, ModbusClient, RegisterSource, READ_INPUT_REGISTERS};

#[tokio::test]
async fn live_inverter_read() {
    let host = match std::env::var("MODBUS_TEST_HOST") {
        Ok(value) => value,
        Err(_) => return,
    };

    let config = ClientConfig {
        host,
        port: env_parse("MODBUS_TEST_PORT").unwrap_or(8899),
        unit_id: env_parse("MODBUS_TEST_UNIT_ID").unwrap_or(1),
        framing: env_parse::<Framing>("MODBUS_TEST_FRAMING").unwrap_or_default(),
        timeout_ms: env_parse("MODBUS_TEST_TIMEOUT_MS").unwrap_or(1_000),
        connect_timeout_ms: 3_000,
    };
    let start = env_parse("MODBUS_TEST_START").unwrap_or(3004);
    let count = env_parse("MODBUS_TEST_COUNT").unwrap_or(2);

    let mut client = ModbusClient::connect(config).await.expect("connect");
    let values = client
        .read_registers(READ_INPUT_REGISTERS, start, count)
        .await
        .expect("read");

    assert_eq!(values.len() as u16, count);
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}
