use thiserror::Error;
pub use types::function_code::READ_INPUT_REGISTERS;
use types::{BlockSpec, Encoding, InverterTimestamp, Measurement, MeasurementSpec};

pub const TIMESTAMP: BlockSpec = BlockSpec {
    name: "timestamp",
    address: 3072,
    count: 6,
    function_code: READ_INPUT_REGISTERS,
};

pub const ERROR_CODE: BlockSpec = BlockSpec {
    name: "error",
    address: 3043,
    count: 1,
    function_code: READ_INPUT_REGISTERS,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected {expected} registers, got {actual}")]
    RegisterCount { expected: u16, actual: usize },
}

/// One step of a poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Gauge(MeasurementSpec),
    Timestamp(BlockSpec),
    ErrorCode(BlockSpec),
}

impl Entry {
    pub fn name(&self) -> &'static str {
        match self {
            Entry::Gauge(spec) => spec.measurement.name(),
            Entry::Timestamp(block) | Entry::ErrorCode(block) => block.name,
        }
    }

    pub fn address(&self) -> u16 {
        match self {
            Entry::Gauge(spec) => spec.address,
            Entry::Timestamp(block) | Entry::ErrorCode(block) => block.address,
        }
    }

    pub fn register_count(&self) -> u16 {
        match self {
            Entry::Gauge(spec) => spec.encoding.register_count(),
            Entry::Timestamp(block) | Entry::ErrorCode(block) => block.count,
        }
    }

    pub fn function_code(&self) -> u8 {
        match self {
            Entry::Gauge(spec) => spec.function_code,
            Entry::Timestamp(block) | Entry::ErrorCode(block) => block.function_code,
        }
    }
}

/// A decoded register value ready to be stored in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Gauge(Measurement, f64),
    Timestamp(InverterTimestamp),
    ErrorCode(u16),
}

const fn long(measurement: Measurement, address: u16) -> Entry {
    Entry::Gauge(MeasurementSpec {
        measurement,
        address,
        encoding: Encoding::Long32,
        decimals: 0,
        signed: false,
        function_code: READ_INPUT_REGISTERS,
    })
}

const fn register(measurement: Measurement, address: u16, decimals: u8, signed: bool) -> Entry {
    Entry::Gauge(MeasurementSpec {
        measurement,
        address,
        encoding: Encoding::Register16,
        decimals,
        signed,
        function_code: READ_INPUT_REGISTERS,
    })
}

/// Everything read from the inverter, in poll order.
pub static REGISTER_MAP: [Entry; 25] = [
    long(Measurement::GeneratedAllTime, 3008),
    register(Measurement::GeneratedToday, 3014, 1, false),
    register(Measurement::GeneratedYesterday, 3015, 1, false),
    long(Measurement::AcWatts, 3004),
    register(Measurement::DcVoltage1, 3021, 1, false),
    register(Measurement::DcCurrent1, 3022, 1, false),
    register(Measurement::DcVoltage2, 3023, 1, false),
    register(Measurement::DcCurrent2, 3024, 1, false),
    register(Measurement::AcVoltage1, 3033, 1, false),
    register(Measurement::AcVoltage2, 3034, 1, false),
    register(Measurement::AcVoltage3, 3035, 1, false),
    register(Measurement::AcCurrent1, 3036, 1, false),
    register(Measurement::AcCurrent2, 3037, 1, false),
    register(Measurement::AcCurrent3, 3038, 1, false),
    register(Measurement::Frequency, 3042, 2, false),
    register(Measurement::Temperature, 3041, 1, true),
    Entry::Timestamp(TIMESTAMP),
    register(Measurement::AcPower, 3005, 0, false),
    register(Measurement::PvPower, 3007, 0, false),
    register(Measurement::TotalEnergy, 3009, 0, false),
    register(Measurement::MonthEnergy, 3011, 0, false),
    register(Measurement::LastMonth, 3013, 0, false),
    register(Measurement::YearEnergy, 3017, 0, false),
    register(Measurement::LastYear, 3019, 0, false),
    Entry::ErrorCode(ERROR_CODE),
];

pub fn find(measurement: Measurement) -> Option<&'static MeasurementSpec> {
    REGISTER_MAP.iter().find_map(|entry| match entry {
        Entry::Gauge(spec) if spec.measurement == measurement => Some(spec),
        _ => None,
    })
}

pub fn decode(entry: &Entry, registers: &[u16]) -> Result<Value, DecodeError> {
    match entry {
        Entry::Gauge(spec) => {
            decode_measurement(spec, registers).map(|value| Value::Gauge(spec.measurement, value))
        }
        Entry::Timestamp(_) => decode_timestamp(registers).map(Value::Timestamp),
        Entry::ErrorCode(_) => decode_error_code(registers).map(Value::ErrorCode),
    }
}

pub fn decode_measurement(spec: &MeasurementSpec, registers: &[u16]) -> Result<f64, DecodeError> {
    expect_len(spec.encoding.register_count(), registers)?;

    let raw = match (spec.encoding, spec.signed) {
        (Encoding::Long32, false) => f64::from(join_words(registers[0], registers[1])),
        (Encoding::Long32, true) => f64::from(join_words(registers[0], registers[1]) as i32),
        (Encoding::Register16, false) => f64::from(registers[0]),
        (Encoding::Register16, true) => f64::from(registers[0] as i16),
    };

    Ok(scale(raw, spec.decimals))
}

pub fn decode_timestamp(registers: &[u16]) -> Result<InverterTimestamp, DecodeError> {
    expect_len(TIMESTAMP.count, registers)?;
    Ok(InverterTimestamp {
        year: registers[0],
        month: registers[1],
        day: registers[2],
        hour: registers[3],
        minute: registers[4],
        second: registers[5],
    })
}

pub fn decode_error_code(registers: &[u16]) -> Result<u16, DecodeError> {
    expect_len(ERROR_CODE.count, registers)?;
    Ok(registers[0])
}

fn scale(raw: f64, decimals: u8) -> f64 {
    if decimals == 0 {
        return raw;
    }
    raw / 10f64.powi(i32::from(decimals))
}

fn join_words(high: u16, low: u16) -> u32 {
    (u32::from(high) << 16) | u32::from(low)
}

fn expect_len(expected: u16, registers: &[u16]) -> Result<(), DecodeError> {
    if registers.len() != usize::from(expected) {
        return Err(DecodeError::RegisterCount {
            expected,
            actual: registers.len(),
        });
    }
    Ok(())
}
