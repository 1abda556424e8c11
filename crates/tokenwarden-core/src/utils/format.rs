use chrono::{DateTime, Duration, Local, Utc};

/// Format a remaining lifetime for display: "45s", "42m", "1h 5m", "2d 3h".
/// Zero or negative durations render as "expired".
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.num_seconds();
    if secs <= 0 {
        return "expired".to_string();
    }
    if secs < 60 {
        return format!("{}s", secs);
    }

    let minutes = secs / 60;
    if minutes < 60 {
        format!("{}m", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        let mins = minutes % 60;
        if mins == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h {}m", hours, mins)
        }
    } else {
        let days = minutes / 1440;
        let hours = (minutes % 1440) / 60;
        if hours == 0 {
            format!("{}d", days)
        } else {
            format!("{}d {}h", days, hours)
        }
    }
}

/// Format an instant in local time, e.g. "Oct 19, 14:05:09".
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.with_timezone(&Local).format("%b %d, %H:%M:%S").to_string()
}

/// Mask a bearer token for logs and display, keeping only its last four characters.
pub fn mask_token(token: &str) -> String {
    let count = token.chars().count();
    if count <= 4 {
        return "*".repeat(count);
    }
    let tail: String = token.chars().skip(count - 4).collect();
    format!("{}{}", "*".repeat(count.min(12) - 4), tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(Duration::zero()), "expired");
        assert_eq!(format_remaining(Duration::seconds(-30)), "expired");
        assert_eq!(format_remaining(Duration::seconds(45)), "45s");
        assert_eq!(format_remaining(Duration::seconds(42 * 60 + 59)), "42m");
        assert_eq!(format_remaining(Duration::minutes(60)), "1h");
        assert_eq!(format_remaining(Duration::minutes(65)), "1h 5m");
        assert_eq!(format_remaining(Duration::hours(48)), "2d");
        assert_eq!(format_remaining(Duration::hours(51)), "2d 3h");
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token(""), "");
        assert_eq!(mask_token("abc"), "***");
        assert_eq!(mask_token("ya29.abcdef"), "*******cdef");
        assert_eq!(mask_token("ya29.a0AfH6SMBx-long-token-value"), "********alue");
    }
}
