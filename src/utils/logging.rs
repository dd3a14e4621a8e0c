//! Logging Module
//!
//! Structured logging built on `tracing`, plus a small logger that reports
//! epoch timing during training.

use std::time::Instant;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::utils::error::{ClassifierError, Result};
use crate::utils::format_duration;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Verbose config for debugging (shows pooled accuracy, batch timings)
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `EnvFilter`
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Level named on the command line, falling back to `Info`
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Initialize logging with the given configuration.
///
/// `RUST_LOG` takes precedence over `config.level` when it is set.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_directive()));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_ansi(config.ansi_colors)
                .with_target(config.include_target)
                .with_thread_ids(config.include_thread_ids),
        )
        .with(filter)
        .try_init()
        .map_err(|e| ClassifierError::Config(format!("Failed to initialize logger: {e}")))
}

/// Training progress logger
pub struct TrainingLogger {
    /// Current epoch (1-based)
    epoch: usize,
    /// Total epochs
    total_epochs: usize,
    /// Step counter value when the current epoch began
    epoch_first_step: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl TrainingLogger {
    /// Create a new training logger
    pub fn new(total_epochs: usize) -> Self {
        Self {
            epoch: 0,
            total_epochs,
            epoch_first_step: 0,
            epoch_start: Instant::now(),
            training_start: Instant::now(),
        }
    }

    /// Log start of an epoch
    pub fn start_epoch(&mut self, epoch: usize, step: usize) {
        self.epoch = epoch;
        self.epoch_first_step = step;
        self.epoch_start = Instant::now();

        tracing::info!("Epoch {}/{} started", epoch, self.total_epochs);
    }

    /// Log end of an epoch
    pub fn end_epoch(&self, step: usize) {
        let epoch_time = self.epoch_start.elapsed().as_secs_f64();
        let total_time = self.training_start.elapsed().as_secs_f64();

        let epochs_remaining = self.total_epochs.saturating_sub(self.epoch);
        let avg_epoch_time = total_time / self.epoch.max(1) as f64;

        tracing::info!(
            "Epoch {}/{} completed in {} | steps: {} (global {}) | ETA: {}",
            self.epoch,
            self.total_epochs,
            format_duration(epoch_time),
            step - self.epoch_first_step,
            step,
            format_duration(epochs_remaining as f64 * avg_epoch_time)
        );
    }

    /// Log training completion
    pub fn log_complete(&self, steps: usize, reports: usize) {
        tracing::info!(
            "Training complete! {} epochs, {} steps, {} validation reports in {}",
            self.total_epochs,
            steps,
            reports,
            format_duration(self.training_start.elapsed().as_secs_f64())
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::parse("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::parse("Warning"), LogLevel::Warn);
        assert_eq!(LogLevel::parse("unknown"), LogLevel::Info);
    }

    #[test]
    fn test_log_config_presets() {
        assert_eq!(LogConfig::default().level, LogLevel::Info);
        assert_eq!(LogConfig::verbose().level, LogLevel::Debug);
        assert!(LogConfig::verbose().include_target);
    }

    #[test]
    fn test_training_logger_tracks_epoch() {
        let mut logger = TrainingLogger::new(3);
        logger.start_epoch(2, 10);
        assert_eq!(logger.epoch, 2);
        assert_eq!(logger.epoch_first_step, 10);
        logger.end_epoch(15);
        assert!(logger.epoch_start >= logger.training_start);
    }
}
