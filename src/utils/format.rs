use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Escapes text for Telegram's HTML parse mode
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Human-readable size in base 1024. Zero renders as an empty string.
pub fn format_bytes(size: u64) -> String {
    if size == 0 {
        return String::new();
    }

    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut index = 0;
    let mut value = size as f64;

    while value >= 1024.0 && index < UNITS.len() - 1 {
        value /= 1024.0;
        index += 1;
    }

    if index == 0 {
        format!("{} {}", size, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[index])
    }
}

/// Ledger timestamp, e.g. `19/10/2026, 3:04:05 pm`
pub fn format_timestamp(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz)
        .format("%d/%m/%Y, %-I:%M:%S %P")
        .to_string()
}
