//! Human-readable size values for the config file.
//!
//! Units are binary: `1KB == 1024` bytes.

const UNITS: &[(&str, u64)] = &[
    ("GIB", 1024 * 1024 * 1024),
    ("GB", 1024 * 1024 * 1024),
    ("G", 1024 * 1024 * 1024),
    ("MIB", 1024 * 1024),
    ("MB", 1024 * 1024),
    ("M", 1024 * 1024),
    ("KIB", 1024),
    ("KB", 1024),
    ("K", 1024),
    ("B", 1),
];

/// Parse a size such as `20MB`, `512 KiB`, `1.5G` or `4096`.
pub fn parse_size(value: &str) -> Result<u64, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("empty size".to_string());
    }

    let upper = trimmed.to_ascii_uppercase();
    let (number, multiplier) = UNITS
        .iter()
        .find_map(|(unit, mult)| upper.strip_suffix(unit).map(|n| (n.trim(), *mult)))
        .unwrap_or((upper.as_str(), 1));

    if let Ok(whole) = number.parse::<u64>() {
        return whole
            .checked_mul(multiplier)
            .ok_or_else(|| format!("size '{}' is too large", trimmed));
    }

    let fractional: f64 = number
        .parse()
        .map_err(|_| format!("invalid size '{}'", trimmed))?;
    if !fractional.is_finite() || fractional < 0.0 {
        return Err(format!("invalid size '{}'", trimmed));
    }
    let bytes = (fractional * multiplier as f64).round();
    if bytes >= u64::MAX as f64 {
        return Err(format!("size '{}' is too large", trimmed));
    }
    Ok(bytes as u64)
}

/// Format a size using the largest unit that divides it exactly.
pub fn format_size(bytes: u64) -> String {
    const SHORT: &[(&str, u64)] = &[
        ("GB", 1024 * 1024 * 1024),
        ("MB", 1024 * 1024),
        ("KB", 1024),
    ];

    SHORT
        .iter()
        .find(|(_, mult)| bytes >= *mult && bytes % mult == 0)
        .map(|(unit, mult)| format!("{}{}", bytes / mult, unit))
        .unwrap_or_else(|| bytes.to_string())
}
