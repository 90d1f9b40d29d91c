//! CLI argument definitions and shared statics.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "lockstep", version, about = "Two-axis synchronized motor control loop")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/lockstep.toml")]
    pub config: PathBuf,

    /// Print samples and errors as JSON lines instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); defaults to logging.level, then info
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

impl RtLock {
    #[inline]
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    pub fn os_default() -> Self {
        #[cfg(target_os = "linux")]
        {
            return RtLock::Current;
        }
        #[allow(unreachable_code)]
        RtLock::None
    }
}

#[derive(Args, Debug, Clone, Copy, Default)]
pub struct RtArgs {
    /// Enable real-time mode (SCHED_FIFO, affinity, mlockall)
    #[arg(
        long,
        action = ArgAction::SetTrue,
        long_help = "Enable real-time mode on Linux.\n\nAttempts SCHED_FIFO priority, pins the process to one CPU, and locks memory with mlockall. Tick handling then runs with less jitter, but elevated privileges or ulimits (memlock) may be required. Ignored on other platforms."
    )]
    pub rt: bool,
    /// Real-time priority for SCHED_FIFO (1..=max)
    #[arg(long, value_name = "PRIO")]
    pub rt_prio: Option<i32>,
    /// Select memory locking mode for --rt: none, current, or all
    #[arg(long, value_enum, value_name = "MODE")]
    pub rt_lock: Option<RtLock>,
    /// CPU index to pin the process to when --rt is enabled; defaults to 0
    #[arg(long, value_name = "CPU")]
    pub rt_cpu: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the control loop until shutdown (Ctrl-C, `shutdown` on stdin, or --ticks)
    Run {
        /// Stop after this many ticks
        #[arg(long, value_name = "N")]
        ticks: Option<u64>,
        /// Use the simulated peer, motor driver and tick line even when built with hardware support
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
        /// Arm the handshake and start the setpoint before the first tick
        #[arg(long, action = ArgAction::SetTrue)]
        start: bool,
        /// Do not read commands from stdin
        #[arg(long = "no-stdin", action = ArgAction::SetTrue)]
        no_stdin: bool,
        #[command(flatten)]
        rt: RtArgs,
    },
    /// One INITIAL exchange with the peer to confirm wiring and protocol
    SelfCheck {
        /// Check the simulated peer instead of the bus
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
    },
}
