use std::time::Duration;

/// Written in place of NaN or infinity; JSON has no literal for either.
pub const NAN_SENTINEL: f64 = -1.0;

pub fn wrap_nan(value: f64) -> f64 {
    if value.is_finite() { value } else { NAN_SENTINEL }
}

/// `(current - previous) / took`, or the sentinel when `took` is zero.
pub fn calculate_rate(current: u64, previous: u64, took: Duration) -> f64 {
    let delta = current as f64 - previous as f64;
    wrap_nan(delta / took.as_secs_f64())
}

/// `part / whole`, or the sentinel when nothing was measured.
pub fn ratio(part: u64, whole: u64) -> f64 {
    wrap_nan(part as f64 / whole as f64)
}

/// Human readable byte count: `512B`, `1.5K`, `20M`.
pub fn format_bytes(bytes: f64) -> String {
    const UNITS: [&str; 6] = ["B", "K", "M", "G", "T", "P"];
    if !bytes.is_finite() || bytes < 0.0 {
        return "-".to_string();
    }

    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let text = format!("{:.1}", value);
    let text = text.strip_suffix(".0").unwrap_or(&text);
    format!("{}{}", text, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instant_rate() {
        assert_eq!(calculate_rate(150, 100, Duration::from_secs(5)), 10.0);
    }

    #[test]
    fn test_zero_elapsed_uses_sentinel() {
        assert_eq!(calculate_rate(0, 0, Duration::ZERO), NAN_SENTINEL);
        assert_eq!(calculate_rate(5, 0, Duration::ZERO), NAN_SENTINEL);
        assert_eq!(ratio(0, 0), NAN_SENTINEL);
        assert_eq!(ratio(1, 4), 0.25);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512.0), "512B");
        assert_eq!(format_bytes(1536.0), "1.5K");
        assert_eq!(format_bytes(20.0 * 1024.0 * 1024.0), "20M");
        assert_eq!(format_bytes(NAN_SENTINEL), "-");
    }
}
