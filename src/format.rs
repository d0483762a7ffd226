//! Human-readable formatting and small numeric helpers.

const BYTE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// `1536` becomes `"1.5 KB"`. Negative input formats as `"0 B"`.
pub fn format_bytes(bytes: f64) -> String {
    if bytes < 0.0 || !bytes.is_finite() {
        return "0 B".to_string();
    }
    let mut value = bytes;
    for unit in BYTE_UNITS {
        if value < 1024.0 {
            return format!("{:.1} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.1} PB", value)
}

/// Throughput such as `"12.3 MB/s"`.
pub fn format_bytes_per_sec(bytes_per_sec: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec))
}

/// `"2d 5h 30m"`; zero or negative uptime renders as `"-"`.
pub fn format_uptime(seconds: f64) -> String {
    if seconds <= 0.0 || !seconds.is_finite() {
        return "-".to_string();
    }
    let total = seconds as u64;
    let days = total / 86_400;
    let hours = total % 86_400 / 3_600;
    let minutes = total % 3_600 / 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if hours > 0 || !parts.is_empty() {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 || !parts.is_empty() {
        parts.push(format!("{}m", minutes));
    }
    if parts.is_empty() {
        "0m".to_string()
    } else {
        parts.join(" ")
    }
}

pub fn format_percent(value: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, value)
}

pub fn format_temperature(celsius: f64) -> String {
    format!("{:.1}°C", celsius)
}

pub fn format_rpm(rpm: u32) -> String {
    format!("{} RPM", rpm)
}

pub fn format_watts(watts: f64) -> String {
    format!("{:.2} W", watts)
}

/// `used / total * 100` clamped to [0, 100]; 0 when `total` is not positive.
pub fn safe_percent(used: f64, total: f64) -> f64 {
    if total <= 0.0 || !total.is_finite() || !used.is_finite() {
        return 0.0;
    }
    clamp(used / total * 100.0, 0.0, 100.0)
}

pub fn clamp(value: f64, low: f64, high: f64) -> f64 {
    low.max(high.min(value))
}

/// Per-second rate between two readings of a cumulative counter.
///
/// A counter that went backwards (reboot, interface reset) yields 0.
pub fn counter_rate(previous: u64, current: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        return 0.0;
    }
    current.saturating_sub(previous) as f64 / elapsed_secs
}
