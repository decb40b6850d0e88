//! CLI argument parsing.
//!
//! Uses clap derive macros; global options may also come from `MTAIL_*`
//! environment variables.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use missiontail_core::config::{Config, LogFormat};

/// Watch a growing application log for missions and report how far an
/// external counter moved during each one.
#[derive(Parser, Debug)]
#[command(name = "mtail")]
#[command(version)]
#[command(about = "Watch an application log for missions and report counter deltas")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    /// Defaults to `watch`.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Options available to every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalOptions {
    /// Config file (default: `<config dir>/missiontail/missiontail.toml`).
    #[arg(long, env = "MTAIL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Monitored application log.
    #[arg(long = "log", env = "MTAIL_LOG", global = true)]
    pub log_path: Option<PathBuf>,

    /// Diagnostic log level (trace, debug, info, warn, error).
    #[arg(long, env = "MTAIL_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Diagnostic log format.
    #[arg(long, env = "MTAIL_LOG_FORMAT", global = true)]
    pub log_format: Option<LogFormat>,

    /// Report skipped missions and missing start markers.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Account identifier; skips resolution from the log.
    #[arg(long, env = "MTAIL_IDENTIFIER", global = true)]
    pub identifier: Option<String>,
}

impl GlobalOptions {
    /// Apply command-line overrides on top of the loaded config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.log_path {
            config.general.log_path.clone_from(path);
        }
        if self.debug {
            config.general.debug = true;
        }
        if let Some(level) = &self.log_level {
            config.logging.level.clone_from(level);
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Watch the log and report counter changes after each mission.
    Watch,

    /// Print the last start marker before an offset.
    Scan {
        /// Byte offset to scan back from (default: end of file).
        #[arg(long)]
        before: Option<u64>,

        /// Emit JSON.
        #[arg(long)]
        json: bool,
    },

    /// Count event lines starting in `[from, to)`.
    Count {
        #[arg(long)]
        from: u64,

        /// Default: end of file.
        #[arg(long)]
        to: Option<u64>,

        /// Event substring (default: `markers.event_pattern`).
        #[arg(long)]
        pattern: Option<String>,

        /// Emit JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the account identifier found in the log.
    ResolveId,

    /// Inspect configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML.
    Show,
    /// Validate the configuration and exit.
    Check,
}
