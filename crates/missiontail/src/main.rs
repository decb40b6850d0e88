//! mtail - watch an application log for missions and report counter deltas.

#![forbid(unsafe_code)]

mod cli;
mod http;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tokio::sync::watch;

use missiontail_core::config::Config;
use missiontail_core::convergence::CounterSource;
use missiontail_core::error::{ConfigError, Error};
use missiontail_core::identity::resolve_identifier;
use missiontail_core::interval::count_between;
use missiontail_core::logging::init_logging;
use missiontail_core::report::{ConsoleFileSink, format_thousands};
use missiontail_core::scanner::BackwardMarkerScanner;
use missiontail_core::tailer::file_size;
use missiontail_core::watcher::MissionWatcher;

use crate::cli::{Cli, Command, ConfigCommand, GlobalOptions};
use crate::http::HttpCounterSource;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "Fatal error");
            eprintln!("Error: {err:#}");
            if let Some(remediation) = remediation_for(&err) {
                eprint!("{}", remediation.render_plain());
            }
            ExitCode::from(1)
        }
    }
}

fn remediation_for(err: &anyhow::Error) -> Option<missiontail_core::error::Remediation> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<Error>() {
            e.remediation()
        } else {
            cause.downcast_ref::<ConfigError>().map(ConfigError::remediation)
        }
    })
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.global)?;

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("warning: logging disabled: {e}");
    }

    match cli.command.unwrap_or(Command::Watch) {
        Command::Watch => run_watch(&config, cli.global.identifier).await,
        Command::Scan { before, json } => scan(&config, before, json),
        Command::Count {
            from,
            to,
            pattern,
            json,
        } => count(&config, from, to, pattern, json),
        Command::ResolveId => {
            println!("{}", identifier(&config, None)?);
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Command::Config(ConfigCommand::Check) => {
            println!("Config OK");
            Ok(())
        }
    }
}

fn load_config(global: &GlobalOptions) -> Result<Config> {
    let mut config = match &global.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    global.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// Explicit identifier, or the last one logged.
fn identifier(config: &Config, explicit: Option<String>) -> Result<String> {
    if let Some(id) = explicit {
        return Ok(id);
    }
    let log_path = &config.general.log_path;
    resolve_identifier(log_path, &config.identity.pattern)?
        .ok_or_else(|| ConfigError::IdentifierUnresolved(log_path.display().to_string()).into())
}

fn require_log(path: &Path) -> Result<()> {
    std::fs::File::open(path)
        .map(drop)
        .map_err(|e| ConfigError::LogUnavailable(format!("{}: {e}", path.display())).into())
}

async fn run_watch(config: &Config, explicit_id: Option<String>) -> Result<()> {
    let log_path = &config.general.log_path;
    require_log(log_path)?;

    let id = identifier(config, explicit_id)?;
    println!("Detected identifier: {id}");

    let source = HttpCounterSource::new(&config.counter, &id)?;
    let baseline = source
        .fetch()
        .await
        .map_err(Error::from)
        .context("Failed initial counter query")?;
    println!("Baseline: counter = {}", format_thousands(baseline));

    let sink = ConsoleFileSink::new(config.general.report_file.clone());
    let mut watcher = MissionWatcher::new(config, source, sink, baseline);
    watcher.prime()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    println!(
        "Watching {} (size-change driven). Press Ctrl+C to stop.",
        log_path.display()
    );
    watcher.run(shutdown_rx).await;
    println!("\nStopped.");
    Ok(())
}

#[derive(Serialize)]
struct ScanOutput {
    end_offset: u64,
    found: bool,
    offset: Option<u64>,
    timestamp: Option<f64>,
}

fn scan(config: &Config, before: Option<u64>, json: bool) -> Result<()> {
    let log_path = &config.general.log_path;
    require_log(log_path)?;
    let end_offset = match before {
        Some(offset) => offset,
        None => file_size(log_path)?,
    };

    let scanner = BackwardMarkerScanner::new(log_path, &config.markers.start, config.scan);
    let found = scanner
        .find_last_marker_before(end_offset)
        .map_err(Error::from)?;

    if json {
        let output = ScanOutput {
            end_offset,
            found: found.is_some(),
            offset: found.map(|m| m.offset),
            timestamp: found.map(|m| m.timestamp),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match found {
        Some(m) => println!(
            "Start marker at offset {} (timestamp {:.3})",
            m.offset, m.timestamp
        ),
        None => println!(
            "No start marker within {} bytes before offset {end_offset}",
            format_thousands(i64::try_from(config.scan.max_scan_bytes).unwrap_or(i64::MAX))
        ),
    }
    Ok(())
}

#[derive(Serialize)]
struct CountOutput<'a> {
    from: u64,
    to: u64,
    pattern: &'a str,
    count: u64,
}

fn count(
    config: &Config,
    from: u64,
    to: Option<u64>,
    pattern: Option<String>,
    json: bool,
) -> Result<()> {
    let log_path = &config.general.log_path;
    require_log(log_path)?;
    let pattern = pattern
        .or_else(|| config.markers.event_pattern.clone())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            ConfigError::ValidationError(
                "no event pattern: pass --pattern or set markers.event_pattern".to_string(),
            )
        })?;
    let to = match to {
        Some(offset) => offset,
        None => file_size(log_path)?,
    };

    let count = count_between(log_path, from, to, &pattern).map_err(Error::from)?;
    if json {
        let output = CountOutput {
            from,
            to,
            pattern: &pattern,
            count,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{count}");
    }
    Ok(())
}
