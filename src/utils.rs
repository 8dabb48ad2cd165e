use std::time::{SystemTime, UNIX_EPOCH};

const UNITS: [&str; 6] = ["octets", "KiB", "MiB", "GiB", "TiB", "PiB"];

/// Formats a byte count in the largest binary unit that keeps it above 1024,
/// rounded to `precision` decimals, e.g. `1.5 KiB`.
pub fn format_size(size: u64, precision: usize) -> String {
    let mut value = size as f64;
    let mut unit = 0;
    while value > 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = format!("{:.*}", precision, value);
    // drop insignificant zeros, "2.50" -> "2.5", "3.00" -> "3"
    let trimmed = if rounded.contains('.') {
        rounded.trim_end_matches('0').trim_end_matches('.')
    } else {
        rounded.as_str()
    };
    format!("{} {}", trimmed, UNITS[unit])
}

/// Seconds since the unix epoch.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
