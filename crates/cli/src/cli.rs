//! CLI argument definitions using clap.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use contracts::NotifierSettings;

use crate::error::CliError;

/// Notifier - forward stdin lines as HTTP notifications
#[derive(Parser, Debug)]
#[command(
    name = "notifier",
    author,
    version,
    about = "Batch stdin lines and POST each one to a notification endpoint",
    long_about = "Reads lines from stdin, batches them over a fixed interval and sends \n\
                  every line as its own HTTP POST request, under a request rate limit \n\
                  and a bounded number of concurrent requests."
)]
pub struct Cli {
    /// Destination URL for notifications
    #[arg(short, long, env = "NOTIFIER_URL")]
    pub url: Option<String>,

    /// Notification interval in seconds
    #[arg(short, long, env = "NOTIFIER_INTERVAL")]
    pub interval: Option<u64>,

    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, env = "NOTIFIER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        env = "NOTIFIER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    /// Max messages buffered between sends [default: 1000]
    #[arg(long, env = "NOTIFIER_MAX_BUFFER_SIZE")]
    pub max_buffer_size: Option<usize>,

    /// Max requests per second [default: 100]
    #[arg(long, env = "NOTIFIER_MAX_RPS")]
    pub max_rps: Option<u64>,

    /// Max concurrent requests [default: 100]
    #[arg(long, env = "NOTIFIER_MAX_CONCURRENCY")]
    pub max_concurrency: Option<usize>,

    /// Grace period for shutdown in seconds [default: 3]
    #[arg(long, env = "NOTIFIER_SHUTDOWN_GRACE")]
    pub shutdown_grace: Option<u64>,

    /// Path to configuration file (TOML or JSON); flags override its values
    #[arg(short, long, env = "NOTIFIER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "NOTIFIER_METRICS_PORT")]
    pub metrics_port: u16,
}

impl Cli {
    /// Resolve settings from the optional config file and the flags
    pub fn settings(&self) -> Result<NotifierSettings, CliError> {
        let mut settings = match (&self.config, &self.url) {
            (Some(path), _) => config_loader::ConfigLoader::load_from_path(path)?,
            (None, Some(url)) => NotifierSettings::new(url.clone()),
            (None, None) => return Err(CliError::MissingUrl),
        };

        if let Some(url) = &self.url {
            settings.url = url.clone();
        }
        if let Some(interval) = self.interval {
            settings.interval_ms = interval.saturating_mul(1000);
        }
        if let Some(size) = self.max_buffer_size {
            settings.max_buffer_size = size;
        }
        if let Some(rps) = self.max_rps {
            settings.max_rps = rps;
        }
        if let Some(workers) = self.max_concurrency {
            settings.max_concurrency = workers;
        }
        if let Some(grace) = self.shutdown_grace {
            settings.shutdown_grace_ms = grace.saturating_mul(1000);
        }

        config_loader::validate(&settings)?;
        Ok(settings)
    }

    /// Default log level derived from -v / -q
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
