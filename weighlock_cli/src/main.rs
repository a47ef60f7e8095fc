#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `weighlock` binary: loads the config, wires a backend and runs a session.

mod cli;
mod error_fmt;
mod session;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{EXIT_REJECTED, exit_code_for_error, format_error_json, humanize};
use crate::session::{BACKEND, RunParams, SimPlan};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    match real_main(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            if JSON_MODE.get().copied().unwrap_or(false) {
                println!("{}", format_error_json(&e));
            } else {
                eprintln!("{}", humanize(&e));
            }
            std::process::exit(exit_code_for_error(&e));
        }
    }
}

fn real_main(cli: Cli) -> eyre::Result<i32> {
    color_eyre::install()?;

    let mut cfg = load_config(&cli.config)?;
    init_tracing(cli.json, &cli.log_level, &cfg.logging)?;

    if let Some(path) = &cli.calibration {
        let cal = weighlock_config::load_calibration_csv(path)
            .wrap_err_with(|| format!("loading calibration {}", path.display()))?;
        tracing::info!(
            scale_factor = cal.scale_factor,
            zero_counts = cal.zero_counts,
            "scale calibration loaded"
        );
        cfg.scale.scale_factor = cal.scale_factor;
    }

    match cli.cmd {
        Commands::Run {
            retry_policy,
            wait_timeout_ms,
            rereleases,
            sim_target,
            sim_weights,
        } => {
            if let Some(p) = retry_policy {
                cfg.session.retry_policy = p.into();
            }
            if wait_timeout_ms.is_some() {
                cfg.session.wait_timeout_ms = wait_timeout_ms;
            }
            cfg.validate().wrap_err("invalid configuration")?;

            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = shutdown.clone();
            ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                .wrap_err("installing Ctrl-C handler")?;

            let params = RunParams {
                rereleases,
                sim: SimPlan::new(sim_target, sim_weights),
            };
            let report = session::run_session(&cfg, &params, shutdown)?;
            if cli.json {
                println!("{}", report.to_json());
            } else {
                println!("{}", report.to_human());
            }
            Ok(if report.is_rejected() { EXIT_REJECTED } else { 0 })
        }
        Commands::SelfCheck => {
            cfg.validate().wrap_err("invalid configuration")?;
            let raw = session::self_check(&cfg)?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "self_check": "ok", "backend": BACKEND, "raw": raw })
                );
            } else {
                println!("self-check ok ({BACKEND} backend, load cell raw {raw})");
            }
            Ok(0)
        }
        Commands::Health => {
            cfg.validate().wrap_err("invalid configuration")?;
            let status = serde_json::json!({
                "status": "ok",
                "backend": BACKEND,
                "config": cli.config.display().to_string(),
                "retry_policy": format!("{:?}", cfg.session.retry_policy).to_lowercase(),
                "wait_timeout_ms": cfg.session.wait_timeout_ms,
            });
            println!("{status}");
            Ok(0)
        }
    }
}

fn load_config(path: &Path) -> eyre::Result<weighlock_config::Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading config {}", path.display()))?;
    weighlock_config::load_toml(&text)
        .wrap_err_with(|| format!("parsing config {}", path.display()))
}

/// Console logs go to stderr so stdout carries only results. `RUST_LOG` wins over
/// `--log-level`; the optional file sink always writes JSON lines.
fn init_tracing(
    json: bool,
    level: &str,
    logging: &weighlock_config::Logging,
) -> eyre::Result<()> {
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;
    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(console_filter)
            .boxed()
    };

    let file = match logging.file.as_deref() {
        Some(file) => {
            let path = Path::new(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name: {file}"))?;
            let appender = match logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            let file_level = logging.level.as_deref().unwrap_or("info");
            let file_filter = EnvFilter::try_new(file_level)
                .wrap_err_with(|| format!("invalid logging.level {file_level:?}"))?;
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
        .wrap_err("installing tracing subscriber")
}
