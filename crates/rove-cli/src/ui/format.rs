//! Formatting utilities for sizes, durations, and the startup banner.

use console::Term;
use owo_colors::OwoColorize;
use std::time::Duration;

/// Format file size in human-readable format.
///
/// # Examples
///
/// ```
/// use rove_cli::ui::format_size;
///
/// assert_eq!(format_size(0), "0 B");
/// assert_eq!(format_size(1024), "1.00 KB");
/// ```
pub fn format_size(bytes: u64) -> String {
    const SCALED: [&str; 3] = ["KB", "MB", "GB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = SCALED[0];
    for next in &SCALED[1..] {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }

    format!("{:.2} {}", value, unit)
}

/// Format duration in human-readable format (ms, s, m:s).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use rove_cli::ui::format_duration;
///
/// assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    match duration.as_millis() {
        ms @ 0..=999 => format!("{}ms", ms),
        1_000..=59_999 => format!("{:.2}s", duration.as_secs_f64()),
        _ => {
            let secs = duration.as_secs();
            format!("{}m {}s", secs / 60, secs % 60)
        }
    }
}

/// Print the startup banner: server URL followed by labelled detail rows.
///
/// ```no_run
/// use rove_cli::ui::print_serve_banner;
///
/// print_serve_banner(
///     "http://localhost:4200",
///     &[("proxy".to_string(), "/api -> http://localhost:9000".to_string())],
/// );
/// ```
pub fn print_serve_banner(url: &str, details: &[(String, String)]) {
    let term = Term::stderr();
    let width = term.size().1 as usize;

    eprintln!();
    eprintln!("  {} {}", "Local:".bold(), url.cyan().underline());
    for (label, value) in details {
        eprintln!("  {} {}", format!("{}:", label).dimmed(), value);
    }
    eprintln!("{}", "─".repeat(width.clamp(20, 80)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size_bytes() {
        assert_eq!(format_size(1), "1 B");
        assert_eq!(format_size(1023), "1023 B");
    }

    #[test]
    fn test_format_size_units() {
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1_048_576), "1.00 MB");
        assert_eq!(format_size(2_147_483_648), "2.00 GB");
    }

    #[test]
    fn test_format_duration_milliseconds() {
        assert_eq!(format_duration(Duration::from_millis(0)), "0ms");
        assert_eq!(format_duration(Duration::from_millis(999)), "999ms");
    }

    #[test]
    fn test_format_duration_seconds_and_minutes() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    }

    #[test]
    fn test_print_serve_banner() {
        print_serve_banner("http://localhost:4200", &[]);
        print_serve_banner(
            "https://localhost:4200",
            &[("live reload".to_string(), "on".to_string())],
        );
    }
}
