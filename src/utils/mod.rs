//! Utilities module: error types, logging and formatting helpers

pub mod error;
pub mod logging;

pub use error::{ClassifierError, Result, ResultExt};
pub use logging::{init_logging, LogConfig, LogLevel, TrainingLogger};

/// Human-readable duration: `12.3s`, `4m 05s` or `2h 07m`
pub fn format_duration(seconds: f64) -> String {
    let whole = seconds.max(0.0).round() as u64;
    match whole {
        _ if seconds < 60.0 => format!("{:.1}s", seconds),
        0..=3599 => format!("{}m {:02}s", whole / 60, whole % 60),
        _ => format!("{}h {:02}m", whole / 3600, (whole % 3600) / 60),
    }
}

/// Integer with `,` between groups of three digits
pub fn format_number(n: usize) -> String {
    let digits = n.to_string();
    let groups: Vec<&str> = digits
        .as_bytes()
        .rchunks(3)
        .rev()
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();
    groups.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.5), "30.5s");
        assert_eq!(format_duration(65.0), "1m 05s");
        assert_eq!(format_duration(3661.0), "1h 01m");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(8189), "8,189");
        assert_eq!(format_number(1_000_000), "1,000,000");
        assert_eq!(format_number(102), "102");
        assert_eq!(format_number(0), "0");
    }
}
