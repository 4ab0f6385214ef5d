//! CLI subcommand implementations

pub mod conflicts;
pub mod drain;
pub mod queue;

use chrono::Utc;

/// Render a unix-ms timestamp relative to now, for table output
pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else {
        format!("{}d ago", diff / day)
    }
}

/// Shortened client ID for table output
pub fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_relative_time_units() {
        let now = 10_000_000_000;
        assert_eq!(format_relative_time(now - 30_000, now), "just now");
        assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
        assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
        assert_eq!(format_relative_time(now - 3 * 24 * 60 * 60_000, now), "3d ago");
    }

    #[test]
    fn short_id_truncates() {
        assert_eq!(
            short_id("11111111-1111-7111-8111-111111111111"),
            "11111111-1111"
        );
    }
}
