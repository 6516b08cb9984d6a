use std::collections::HashSet;

use register_map::{
    decode, decode_error_code, decode_measurement, decode_timestamp, find, DecodeError, Entry,
    Value, ERROR_CODE, READ_INPUT_REGISTERS, REGISTER_MAP, TIMESTAMP,
};
use types::{Encoding, InverterTimestamp, Measurement};

fn spec(measurement: Measurement) -> &'static types::MeasurementSpec {
    find(measurement).expect("measurement in register map")
}

#[test]
fn one_decimal_registers_divide_by_ten() {
    for entry in REGISTER_MAP.iter() {
        if let Entry::Gauge(spec) = entry {
            if spec.encoding == Encoding::Register16 && spec.decimals == 1 && !spec.signed {
                let value = decode_measurement(spec, &[2345]).expect("decode");
                assert_eq!(value, 234.5, "{}", spec.measurement.name());
            }
        }
    }
}

#[test]
fn frequency_divides_by_hundred() {
    let value = decode_measurement(spec(Measurement::Frequency), &[5000]).expect("decode");
    assert_eq!(value, 50.0);
}

#[test]
fn temperature_is_signed() {
    let raw = (-123i16) as u16;
    assert_eq!(raw, 0xFF85);
    let value = decode_measurement(spec(Measurement::Temperature), &[raw]).expect("decode");
    assert_eq!(value, -12.3);
}

#[test]
fn long_reads_are_unscaled_and_high_word_first() {
    // 123456 = 0x0001_E240
    let registers = [0x0001, 0xE240];
    let alltime = decode_measurement(spec(Measurement::GeneratedAllTime), &registers).expect("decode");
    let watts = decode_measurement(spec(Measurement::AcWatts), &registers).expect("decode");
    assert_eq!(alltime, 123_456.0);
    assert_eq!(watts, 123_456.0);

    let max = decode_measurement(spec(Measurement::AcWatts), &[0xFFFF, 0xFFFF]).expect("decode");
    assert_eq!(max, f64::from(u32::MAX));
}

#[test]
fn zero_decimal_counters_are_never_divided() {
    let counters = [
        Measurement::AcPower,
        Measurement::PvPower,
        Measurement::TotalEnergy,
        Measurement::MonthEnergy,
        Measurement::LastMonth,
        Measurement::YearEnergy,
        Measurement::LastYear,
    ];
    for measurement in counters {
        let spec = spec(measurement);
        assert_eq!(spec.decimals, 0);
        assert_eq!(decode_measurement(spec, &[65_535]).expect("decode"), 65_535.0);
        assert_eq!(decode_measurement(spec, &[7]).expect("decode"), 7.0);
    }
}

#[test]
fn repeated_decoding_does_not_drift() {
    let spec = spec(Measurement::AcVoltage1);
    let first = decode_measurement(spec, &[2301]).expect("decode");
    let second = decode_measurement(spec, &[2301]).expect("decode");
    assert_eq!(first.to_bits(), second.to_bits());
}

#[test]
fn timestamp_carries_six_fields() {
    let ts = decode_timestamp(&[2024, 6, 21, 13, 45, 9]).expect("decode");
    assert_eq!(
        ts,
        InverterTimestamp {
            year: 2024,
            month: 6,
            day: 21,
            hour: 13,
            minute: 45,
            second: 9,
        }
    );

    let labels = ts.labels();
    let keys: Vec<&str> = labels.iter().map(|(key, _)| *key).collect();
    assert_eq!(keys, vec!["yy", "mm", "dd", "hh", "mi", "ss"]);
    assert_eq!(labels[0].1, "2024");
    assert_eq!(labels[5].1, "9");
}

#[test]
fn error_code_is_one_unscaled_register() {
    assert_eq!(ERROR_CODE.count, 1);
    assert_eq!(decode_error_code(&[417]).expect("decode"), 417);
}

#[test]
fn short_responses_are_rejected() {
    assert_eq!(
        decode_measurement(spec(Measurement::AcWatts), &[1]),
        Err(DecodeError::RegisterCount {
            expected: 2,
            actual: 1
        })
    );
    assert!(decode_timestamp(&[2024, 6, 21]).is_err());
    assert!(decode_error_code(&[]).is_err());
}

#[test]
fn map_covers_every_measurement_once() {
    let mut seen = HashSet::new();
    for entry in REGISTER_MAP.iter() {
        assert_eq!(entry.function_code(), READ_INPUT_REGISTERS);
        if let Entry::Gauge(spec) = entry {
            assert!(seen.insert(spec.measurement), "duplicate {}", spec.measurement.name());
        }
    }
    assert_eq!(seen.len(), Measurement::COUNT);

    let infos: Vec<&Entry> = REGISTER_MAP
        .iter()
        .filter(|entry| !matches!(entry, Entry::Gauge(_)))
        .collect();
    assert_eq!(infos, vec![&Entry::Timestamp(TIMESTAMP), &Entry::ErrorCode(ERROR_CODE)]);
}

#[test]
fn documented_addresses() {
    let expected = [
        (Measurement::GeneratedAllTime, 3008),
        (Measurement::AcWatts, 3004),
        (Measurement::GeneratedToday, 3014),
        (Measurement::Frequency, 3042),
        (Measurement::Temperature, 3041),
        (Measurement::LastYear, 3019),
    ];
    for (measurement, address) in expected {
        assert_eq!(spec(measurement).address, address);
    }
    assert_eq!(TIMESTAMP.address, 3072);
    assert_eq!(ERROR_CODE.address, 3043);
}

#[test]
fn decode_dispatches_on_entry_kind() {
    let value = decode(&Entry::ErrorCode(ERROR_CODE), &[3]).expect("decode");
    assert_eq!(value, Value::ErrorCode(3));

    let entry = REGISTER_MAP
        .iter()
        .find(|entry| entry.name() == "pvpower")
        .expect("pvpower entry");
    assert_eq!(
        decode(entry, &[1200]).expect("decode"),
        Value::Gauge(Measurement::PvPower, 1200.0)
    );
}
