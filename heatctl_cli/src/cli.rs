//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "heatctl", version, about = "Heater control and relay calibration")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/heatctl.toml")]
    pub config: PathBuf,

    /// Print results and errors as JSON, and log as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive a simulated heater to a setpoint for a fixed time
    Run {
        /// Heater name as configured in [[heater]]
        #[arg(long)]
        heater: String,
        /// Setpoint in degrees
        #[arg(long)]
        target: f64,
        /// Simulated seconds to run
        #[arg(long, default_value_t = 600.0)]
        seconds: f64,
        /// Control period in ms (defaults to autotune.tick_ms)
        #[arg(long, value_name = "MS")]
        tick_ms: Option<u64>,
        /// Write every tick (time, temperature, target, power, state) here
        #[arg(long, value_name = "FILE")]
        trace: Option<PathBuf>,
        /// Pace ticks against the wall clock instead of virtual time
        #[arg(long, action = ArgAction::SetTrue)]
        realtime: bool,
    },
    /// Run a relay experiment and print tuned parameters
    Calibrate {
        /// Heater name as configured in [[heater]]
        #[arg(long)]
        heater: String,
        /// Calibration setpoint in degrees
        #[arg(long)]
        target: f64,
        /// Dump the raw relay samples and peaks to this file
        #[arg(long, value_name = "FILE")]
        write_file: Option<PathBuf>,
    },
    /// Bind every configured heater and read it once
    SelfCheck,
}
