
/// Modbus function codes used for register reads.
pub mod function_code {
    pub const READ_HOLDING_REGISTERS: u8 = 3;
    pub const READ_INPUT_REGISTERS: u8 = 4;
}

/// How a measurement is laid out in the device's register space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Two consecutive registers, high word first.
    Long32,
    Register16,
}

impl Encoding {
    pub fn register_count(self) -> u16 {
        match self {
            Encoding::Long32 => 2,
            Encoding::Register16 => 1,
        }
    }
}

/// Every numeric quantity the inverter publishes as a gauge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measurement {
    GeneratedAllTime,
    GeneratedToday,
    GeneratedYesterday,
    AcWatts,
    DcVoltage1,
    DcCurrent1,
    DcVoltage2,
    DcCurrent2,
    AcVoltage1,
    AcVoltage2,
    AcVoltage3,
    AcCurrent1,
    AcCurrent2,
    AcCurrent3,
    Frequency,
    Temperature,
    AcPower,
    PvPower,
    TotalEnergy,
    MonthEnergy,
    LastMonth,
    YearEnergy,
    LastYear,
}

impl Measurement {
    pub const COUNT: usize = 23;

    pub const ALL: [Measurement; Measurement::COUNT] = [
        Measurement::GeneratedAllTime,
        Measurement::GeneratedToday,
        Measurement::GeneratedYesterday,
        Measurement::AcWatts,
        Measurement::DcVoltage1,
        Measurement::DcCurrent1,
        Measurement::DcVoltage2,
        Measurement::DcCurrent2,
        Measurement::AcVoltage1,
        Measurement::AcVoltage2,
        Measurement::AcVoltage3,
        Measurement::AcCurrent1,
        Measurement::AcCurrent2,
        Measurement::AcCurrent3,
        Measurement::Frequency,
        Measurement::Temperature,
        Measurement::AcPower,
        Measurement::PvPower,
        Measurement::TotalEnergy,
        Measurement::MonthEnergy,
        Measurement::LastMonth,
        Measurement::YearEnergy,
        Measurement::LastYear,
    ];

    /// Metric name as existing scrape configs know it. Spellings such as
    /// `accurent1` and `temprature` are load-bearing.
    pub fn name(self) -> &'static str {
        match self {
            Measurement::GeneratedAllTime => "generatedalltime",
            Measurement::GeneratedToday => "generatedtoday",
            Measurement::GeneratedYesterday => "generatedyesterday",
            Measurement::AcWatts => "acwatts",
            Measurement::DcVoltage1 => "dcvoltage1",
            Measurement::DcCurrent1 => "dccurrent1",
            Measurement::DcVoltage2 => "dcvoltage2",
            Measurement::DcCurrent2 => "dccurrent2",
            Measurement::AcVoltage1 => "acvoltage1",
            Measurement::AcVoltage2 => "acvoltage2",
            Measurement::AcVoltage3 => "acvoltage3",
            Measurement::AcCurrent1 => "accurent1",
            Measurement::AcCurrent2 => "accurent2",
            Measurement::AcCurrent3 => "accurent3",
            Measurement::Frequency => "frequency",
            Measurement::Temperature => "temprature",
            Measurement::AcPower => "acpower",
            Measurement::PvPower => "pvpower",
            Measurement::TotalEnergy => "totalenergy",
            Measurement::MonthEnergy => "monthenergy",
            Measurement::LastMonth => "lastmonth",
            Measurement::YearEnergy => "yearenergy",
            Measurement::LastYear => "lastyear",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            Measurement::GeneratedAllTime => "Generated energy, all time (kWh)",
            Measurement::GeneratedToday => "Generated energy, today (kWh)",
            Measurement::GeneratedYesterday => "Generated energy, yesterday (kWh)",
            Measurement::AcWatts => "AC output power (W)",
            Measurement::DcVoltage1 => "DC voltage, string 1 (V)",
            Measurement::DcCurrent1 => "DC current, string 1 (A)",
            Measurement::DcVoltage2 => "DC voltage, string 2 (V)",
            Measurement::DcCurrent2 => "DC current, string 2 (A)",
            Measurement::AcVoltage1 => "AC voltage, phase 1 (V)",
            Measurement::AcVoltage2 => "AC voltage, phase 2 (V)",
            Measurement::AcVoltage3 => "AC voltage, phase 3 (V)",
            Measurement::AcCurrent1 => "AC current, phase 1 (A)",
            Measurement::AcCurrent2 => "AC current, phase 2 (A)",
            Measurement::AcCurrent3 => "AC current, phase 3 (A)",
            Measurement::Frequency => "AC frequency (Hz)",
            Measurement::Temperature => "Inverter temperature (C)",
            Measurement::AcPower => "AC power",
            Measurement::PvPower => "PV power",
            Measurement::TotalEnergy => "Total energy",
            Measurement::MonthEnergy => "Energy this month",
            Measurement::LastMonth => "Energy last month",
            Measurement::YearEnergy => "Energy this year",
            Measurement::LastYear => "Energy last year",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Decoding parameters for one gauge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementSpec {
    pub measurement: Measurement,
    pub address: u16,
    pub encoding: Encoding,
    /// Published value is `raw / 10^decimals`.
    pub decimals: u8,
    pub signed: bool,
    pub function_code: u8,
}

/// A run of consecutive registers read in one request and reported as an
/// info metric rather than a gauge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpec {
    pub name: &'static str,
    pub address: u16,
    pub count: u16,
    pub function_code: u8,
}

/// Wall-clock time as reported by the inverter's own clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InverterTimestamp {
    pub year: u16,
    pub month: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
}

impl InverterTimestamp {
    /// Info labels in exposition order.
    pub fn labels(&self) -> [(&'static str, String); 6] {
        [
            ("yy", self.year.to_string()),
            ("mm", self.month.to_string()),
            ("dd", self.day.to_string()),
            ("hh", self.hour.to_string()),
            ("mi", self.minute.to_string()),
            ("ss", self.second.to_string()),
        ]
    }
}

/// Latest decoded values. Slots start empty and, once read, keep their
/// last-known value until the next successful read overwrites them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    gauges: [Option<f64>; Measurement::COUNT],
    pub timestamp: Option<InverterTimestamp>,
    pub error_code: Option<u16>,
    pub cycles: u64,
    pub failed_cycles: u64,
    pub last_success_ms: Option<u64>,
}

impl Snapshot {
    pub fn get(&self, measurement: Measurement) -> Option<f64> {
        self.gauges[measurement.index()]
    }

    pub fn set(&mut self, measurement: Measurement, value: f64) {
        self.gauges[measurement.index()] = Some(value);
    }

    /// Populated gauges in declaration order.
    pub fn gauges(&self) -> impl Iterator<Item = (Measurement, f64)> + '_ {
        Measurement::ALL
            .into_iter()
            .filter_map(move |measurement| self.get(measurement).map(|value| (measurement, value)))
    }
}

/// Address of the Modbus device being polled.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceIdentity {
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
}
