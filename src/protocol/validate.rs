//! Field validation rules shared by the classifier and UI boundaries

/// Measurement interval bounds on the wire, milliseconds
pub const MIN_INTERVAL_MS: u64 = 1_000;
pub const MAX_INTERVAL_MS: u64 = 3_600_000;

/// DS18B20 power-on / failed-read sentinel temperatures
const SENTINEL_TEMPS: [f64; 2] = [-127.0, 85.0];

/// Round to one decimal place
///
/// Numeric threshold/config values are compared and displayed at one-decimal
/// precision throughout.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Valid sensor label: "01".."08", or "00" for unconfigured
pub fn is_valid_sensor_label(label: &str) -> bool {
    matches!(
        label,
        "00" | "01" | "02" | "03" | "04" | "05" | "06" | "07" | "08"
    )
}

/// Valid numeric sensor ID for commands: 1..=8
pub fn is_valid_sensor_id(id: u8) -> bool {
    (1..=8).contains(&id)
}

/// Valid hardware address: exactly 16 hex characters
pub fn is_valid_address(addr: &str) -> bool {
    addr.len() == 16 && addr.chars().all(|c| c.is_ascii_hexdigit())
}

/// TH must be strictly greater than TL (compared at one-decimal precision)
pub fn thresholds_ordered(th: f64, tl: f64) -> bool {
    round1(th) > round1(tl)
}

/// Measurement interval inside the device's accepted range
pub fn is_valid_interval(interval_ms: u64) -> bool {
    (MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(&interval_ms)
}

/// A reading the sensor actually took, as opposed to a bus-error sentinel
pub fn is_valid_reading(temperature: f64) -> bool {
    !SENTINEL_TEMPS.contains(&temperature) && (-55.0..=125.0).contains(&temperature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round1() {
        assert_eq!(round1(24.649), 24.6);
        assert_eq!(round1(24.65), 24.7);
        assert_eq!(round1(-0.04), -0.0);
    }

    #[test]
    fn test_sensor_label_set() {
        for ok in ["00", "01", "08"] {
            assert!(is_valid_sensor_label(ok), "{}", ok);
        }
        for bad in ["09", "1", "001", "0a", ""] {
            assert!(!is_valid_sensor_label(bad), "{}", bad);
        }
    }

    #[test]
    fn test_address_format() {
        assert!(is_valid_address("28FF123456789ABC"));
        assert!(is_valid_address("28ff123456789abc"));
        // Wrong length
        assert!(!is_valid_address("28FF123456789AB"));
        assert!(!is_valid_address("28FF123456789ABCD"));
        // 'G' is not hex
        assert!(!is_valid_address("28FF123456789ABG"));
    }

    #[test]
    fn test_threshold_ordering() {
        assert!(thresholds_ordered(30.0, 20.0));
        assert!(!thresholds_ordered(20.0, 25.0));
        assert!(!thresholds_ordered(20.0, 20.0));
        // Differences below display precision do not count as ordered
        assert!(!thresholds_ordered(20.01, 20.0));
    }

    #[test]
    fn test_interval_range() {
        assert!(is_valid_interval(1_000));
        assert!(is_valid_interval(3_600_000));
        assert!(!is_valid_interval(999));
        assert!(!is_valid_interval(3_600_001));
    }

    #[test]
    fn test_sentinel_readings_rejected() {
        assert!(is_valid_reading(24.6));
        assert!(is_valid_reading(-55.0));
        assert!(is_valid_reading(125.0));
        assert!(!is_valid_reading(-127.0));
        assert!(!is_valid_reading(85.0));
        assert!(!is_valid_reading(130.0));
    }
}
