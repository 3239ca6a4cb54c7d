// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing::{info, warn};

use epd::bus::{handshake, BusConnection, SignalEmitter};
use epd::config::EpConfig;
use epd::EpContext;

#[derive(Parser)]
#[command(
    name = "epd",
    about = "Policy enforcement-point host — receives manager decisions and acknowledges them",
    version
)]
struct Args {
    /// WebSocket endpoint of the policy manager
    #[arg(long, env = "EPD_MANAGER_URL")]
    manager_url: Option<String>,

    /// Enforcement-point name announced at registration
    #[arg(long, env = "EPD_NAME")]
    name: Option<String>,

    /// Capability to announce (repeatable); overrides the config file list
    #[arg(long = "capability", env = "EPD_CAPABILITIES", value_delimiter = ',')]
    capabilities: Vec<String>,

    /// Path to config.toml
    #[arg(long, env = "EPD_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "EPD_LOG")]
    log: Option<String>,

    /// Log format: compact or json
    #[arg(long, env = "EPD_LOG_FORMAT")]
    log_format: Option<String>,

    /// Write logs to this file path (rotated daily)
    #[arg(long, env = "EPD_LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = EpConfig::load(args.config.as_deref())?;
    if let Some(url) = args.manager_url {
        config.manager_url = url;
    }
    if let Some(name) = args.name {
        config.name = name;
    }
    if !args.capabilities.is_empty() {
        config.capabilities = args.capabilities;
    }
    if let Some(level) = args.log {
        config.log_level = level;
    }
    if let Some(format) = args.log_format {
        config.log_format = format;
    }
    if let Some(path) = args.log_file {
        config.log_file = Some(path);
    }

    let _log_guard = setup_logging(&config.log_level, config.log_file.as_deref(), &config.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        manager = %config.manager_url,
        name = %config.name,
        "epd starting"
    );

    run(config).await
}

async fn run(config: EpConfig) -> Result<()> {
    let (emitter, status_rx) = SignalEmitter::channel();
    let ctx = EpContext::new(config, Arc::new(emitter));

    // Audit subscription: watch every decision set on every announced
    // capability signal, log it, and acknowledge success. Concrete policy
    // actions live in embedding plugins; this keeps a bare epd useful as a
    // decision monitor.
    let counter = Arc::new(AtomicU64::new(0));
    for signal in &ctx.config.capabilities {
        let counter = counter.clone();
        ctx.registry.subscribe(signal, &[], move |set, completion| {
            counter.fetch_add(1, Ordering::Relaxed);
            info!(
                set = set.name(),
                decisions = set.len(),
                txid = completion.token(),
                "decision set received"
            );
            completion.complete(true);
        });
    }

    let mut bus = BusConnection::connect(&ctx.config.manager_url)
        .await
        .context("failed to connect to policy manager")?;
    handshake::register(&mut bus, &ctx.config.name, &ctx.config.capabilities)
        .await
        .context("registration with policy manager failed")?;

    let served = bus.serve(ctx.dispatcher.clone(), status_rx).await;

    match served {
        Ok(()) => {
            // Clean shutdown — tell the manager we are leaving.
            if let Err(e) = handshake::unregister(&mut bus).await {
                warn!(err = %e, "unregister failed — manager will notice the drop");
            }
        }
        Err(e) => warn!(err = %e, "decision loop ended on transport error"),
    }

    info!(
        decision_sets = counter.load(Ordering::Relaxed),
        uptime_secs = ctx.started_at.elapsed().as_secs(),
        "epd stopped"
    );
    Ok(())
}

/// Initialize tracing. Returns the appender guard when logging to a file —
/// dropping it flushes buffered log lines.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("epd.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}
