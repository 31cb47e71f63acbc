//! Shared formatting utilities for size display and console output

use console::Emoji;

/// Scissors emoji for elimination
pub const SCISSORS: Emoji = Emoji("✂️ ", "x");

/// Rocket emoji for launch/start operations
pub const ROCKET: Emoji = Emoji("🚀", ">");

/// Checkmark emoji for success
pub const CHECKMARK: Emoji = Emoji("✅", "[OK]");

/// Crossmark emoji for failure
pub const CROSSMARK: Emoji = Emoji("❌", "[FAIL]");

/// Info emoji for informational messages
pub const INFO: Emoji = Emoji("ℹ️ ", "i");

/// Chart emoji for metrics/statistics
pub const CHART: Emoji = Emoji("📊", "~");

/// Microscope emoji for analysis/inspection
pub const MICROSCOPE: Emoji = Emoji("🔍", ">>");

/// Warning emoji for caution/alerts
pub const WARNING: Emoji = Emoji("⚠️ ", "!");

/// Rewind emoji for restore operations
pub const REWIND: Emoji = Emoji("⏪", "<<");

/// Format bytes as human-readable size string
///
/// # Examples
///
/// ```
/// use bundle_slim::fmt::format_bytes;
///
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1024), "1.00 KB");
/// assert_eq!(format_bytes(1_048_576), "1.00 MB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a signed byte delta, e.g. `-12.00 KB` or `+512 B`.
pub fn format_delta(delta: i64) -> String {
    let sign = if delta < 0 { "-" } else { "+" };
    format!("{}{}", sign, format_bytes(delta.unsigned_abs()))
}

/// Join identities for one-line display, eliding after `limit` entries.
pub fn format_identities(ids: &[String], limit: usize) -> String {
    if ids.is_empty() {
        return "(none)".to_string();
    }
    if ids.len() <= limit {
        return ids.join(", ");
    }
    format!(
        "{}, … (+{} more)",
        ids[..limit].join(", "),
        ids.len() - limit
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes_various_sizes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1_048_576), "1.00 MB");
        assert_eq!(format_bytes(2_621_440), "2.50 MB");
    }

    #[test]
    fn test_format_delta_carries_sign() {
        assert_eq!(format_delta(-2048), "-2.00 KB");
        assert_eq!(format_delta(100), "+100 B");
        assert_eq!(format_delta(0), "+0 B");
    }

    #[test]
    fn test_format_identities_elides_long_lists() {
        let ids: Vec<String> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
        assert_eq!(format_identities(&ids, 4), "A, B, C, D");
        assert_eq!(format_identities(&ids, 2), "A, B, … (+2 more)");
        assert_eq!(format_identities(&[], 2), "(none)");
    }
}
