//! The CLI for the data feed updater

use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// The default port of the observation API
const DEFAULT_HTTP_PORT: u16 = 3000;

/// Data feed updater
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    // --- Application Config --- //
    /// The path of the JSON configuration file
    #[arg(long, env = "CONFIG_PATH")]
    pub config_path: PathBuf,

    // --- Server --- //
    /// Port to serve the observation API on
    #[arg(long, env = "HTTP_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    pub http_port: u16,
    /// Whether to run without the observation API
    #[arg(long, env = "DISABLE_HTTP")]
    pub disable_http: bool,

    // --- Telemetry --- //
    /// Whether to emit logs as JSON
    #[arg(long, env = "JSON_LOGS")]
    pub json_logs: bool,
}

impl Cli {
    /// Set up the global tracing subscriber
    ///
    /// Logs at `INFO` unless overridden by `RUST_LOG`.
    pub fn setup_logging(&self) {
        let filter =
            EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy();
        let fmt_layer = if self.json_logs {
            fmt::layer().with_file(true).with_line_number(true).json().flatten_event(true).boxed()
        } else {
            fmt::layer().with_target(true).boxed()
        };

        tracing_subscriber::registry().with(filter).with(fmt_layer).init();
    }
}
