//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "weighlock", version, about = "Weight-keyed puzzle box controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/weighlock.toml")]
    pub config: PathBuf,

    /// Optional scale calibration CSV (strict `weight,raw` header)
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Log as JSON lines instead of pretty; results and errors are printed as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// What happens after a wrong weight.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RetryArg {
    /// Wait for the object to be lifted, then accept another attempt
    Rearm,
    /// End the session with a rejection
    Terminate,
}

impl From<RetryArg> for weighlock_config::RetryPolicy {
    fn from(r: RetryArg) -> Self {
        match r {
            RetryArg::Rearm => Self::Rearm,
            RetryArg::Terminate => Self::Terminate,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one session: tare, learn the target, then guard the latch
    Run {
        /// Override session.retry_policy from the config
        #[arg(long, value_enum, value_name = "POLICY")]
        retry_policy: Option<RetryArg>,
        /// Override session.wait_timeout_ms: bound every wait to this many ms
        #[arg(long, value_name = "MS")]
        wait_timeout_ms: Option<u64>,
        /// After unlocking, serve this many re-release button gestures
        #[arg(long, value_name = "N", default_value_t = 0)]
        rereleases: u32,
        /// Simulator: weight placed on the scale while the target is learned
        #[arg(long, value_name = "WEIGHT", default_value_t = 100.0)]
        sim_target: f64,
        /// Simulator: weight placed for each verification attempt (repeatable);
        /// defaults to one attempt with the target weight
        #[arg(long = "sim-weight", value_name = "WEIGHT")]
        sim_weights: Vec<f64>,
    },
    /// Quick health check (hardware presence / sim ok)
    SelfCheck,
    /// Health check for operational monitoring
    Health,
}
