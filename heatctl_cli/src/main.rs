#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod cli;
mod commands;
mod error_fmt;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::Result;
use heatctl_core::CalibrationRequest;
use heatctl_core::error::ControlError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    if let Err(e) = try_main() {
        if JSON_MODE.get().copied().unwrap_or(false) {
            // Results and errors share stdout in JSON mode; logs stay on stderr.
            println!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn try_main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    let cfg = heatctl_config::load_file(&cli.config)
        .map_err(|e| eyre::Report::new(ControlError::Config(format!("{e:#}"))))?;
    init_tracing(&cli, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), heaters = cfg.heaters.len(), "config loaded");

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
            tracing::warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    match cli.cmd {
        Commands::Run {
            heater,
            target,
            seconds,
            tick_ms,
            trace,
            realtime,
        } => commands::run(
            &cfg,
            &commands::RunRequest {
                heater: &heater,
                target,
                seconds,
                tick_ms,
                trace: trace.as_deref(),
                realtime,
            },
            cli.json,
            &shutdown,
        ),
        Commands::Calibrate {
            heater,
            target,
            write_file,
        } => {
            let request = CalibrationRequest {
                heater,
                target,
                write_file,
            };
            commands::run_calibration(&cfg, &request, cli.json, &shutdown)
        }
        Commands::SelfCheck => commands::self_check(&cfg, cli.json),
    }
}

/// Console layer on stderr (pretty or JSON) plus an optional JSON file layer.
///
/// `--log-level` sets the console filter unless `RUST_LOG` is present; the file
/// layer uses `logging.level` from the config.
fn init_tracing(cli: &Cli, logging: &heatctl_config::Logging) -> Result<()> {
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .map_err(|e| {
            eyre::Report::new(ControlError::Config(format!(
                "invalid --log-level '{}': {e}",
                cli.log_level
            )))
        })?;
    let console = if cli.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    };

    let file = match logging.file.as_deref() {
        Some(path) => {
            let path = std::path::Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let name = path
                .file_name()
                .map_or_else(|| "heatctl.log".into(), |n| n.to_string_lossy().into_owned());
            let appender = match logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            let level = logging.level.as_deref().unwrap_or("info");
            let file_filter = EnvFilter::try_new(level).map_err(|e| {
                eyre::Report::new(ControlError::Config(format!(
                    "invalid logging.level '{level}': {e}"
                )))
            })?;
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(file_filter)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| eyre::eyre!("init tracing: {e}"))?;
    Ok(())
}
