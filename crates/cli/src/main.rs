//! # Notifier CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载与验证
//! - stdin 读取、定时批量发送
//! - 优雅关闭处理

mod cli;
mod error;
mod notifier;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use cli::Cli;
use dispatcher::{Dispatcher, DispatcherConfig, HttpSender};
use notifier::Notifier;
use observability::{ObservabilityConfig, PrometheusMetrics};
use timed_buffer::TimedBuffer;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    observability::init_with_config(ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port: (cli.metrics_port != 0).then_some(cli.metrics_port),
        default_log_level: cli.log_level().to_string(),
        ignore_env: cli.quiet || cli.verbose > 0,
    })?;

    info!(version = env!("CARGO_PKG_VERSION"), "Notifier starting");

    let result = run(&cli).await;
    if let Err(ref e) = result {
        tracing::error!(error = %e, "Notifier failed");
    }
    result
}

async fn run(cli: &Cli) -> Result<()> {
    let settings = cli.settings().context("Failed to resolve settings")?;

    info!(
        url = %settings.url,
        interval_ms = settings.interval_ms,
        max_buffer_size = settings.max_buffer_size,
        max_rps = settings.max_rps,
        max_concurrency = settings.max_concurrency,
        "Configuration loaded"
    );

    let mut sender = HttpSender::new();
    if let Some(timeout) = settings.request_timeout() {
        sender = sender.with_timeout(timeout);
    }

    let metrics = Arc::new(PrometheusMetrics::new());
    let dispatcher = Dispatcher::builder(settings.url.clone())
        .with_sender(sender)
        .with_config(DispatcherConfig::from(&settings))
        .with_metrics(metrics.clone())
        .with_logger(tracing::dispatcher::get_default(|d| d.clone()))
        .build();
    let buffer = TimedBuffer::new(settings.interval(), settings.max_buffer_size);

    let stdin = notifier::spawn_stdin_reader().context("Failed to start stdin reader")?;
    let stats = Notifier::new(dispatcher, buffer)
        .run(stdin, shutdown_signal())
        .await
        .map_err(error::CliError::from)?;

    info!(
        enqueued = stats.enqueued,
        delivered = stats.delivered,
        failed = stats.failed,
        rate_limited = stats.rate_limited,
        "Notifier finished"
    );
    println!("\n{stats}");
    println!("{}", metrics.latency_summary());

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
