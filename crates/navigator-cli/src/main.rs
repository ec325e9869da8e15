//! `navigator-cli` – safety filter process.
//!
//! This binary runs one vehicle's safety node over stdio.  It:
//!
//! 1. Resolves the configuration from `~/.navigator/config.toml` (or
//!    `--config`), applying `NAVIGATOR_*` overrides.
//! 2. Starts a [`SafetyNode`] fed by one ordered input channel.
//! 3. Sends each JSON line read from stdin to the node in file order and,
//!    for every nominal command, writes the filtered command to stdout.
//! 4. Exits immediately on **Ctrl-C**, abandoning any in-flight solve.

mod args;
mod config;
mod feed;

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use clap::Parser;

use navigator_middleware::{EventBus, Topic, TopicReceiver, input_channel};
use navigator_runtime::{ControlCycle, SafetyNode, init_tracing};
use navigator_types::{Event, EventPayload, NavError, StampedWrench};

use crate::args::Cli;
use crate::config::Config;

/// `source` of every event read from stdin.
const FEED_SOURCE: &str = "navigator::stdin";

fn main() -> ExitCode {
    let args = Cli::parse();

    // Logs go to stderr; stdout carries the filtered command stream.
    let _telemetry = init_tracing("navigator");

    let path = args.config.clone().unwrap_or_else(config::config_path);
    let cfg = match config::resolve(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red());
            return ExitCode::FAILURE;
        }
    };

    if args.exports_config() {
        return export_config(&cfg, &path, &args);
    }

    print_banner(&path);

    if let Err(e) = ctrlc::set_handler(|| {
        eprintln!();
        eprintln!("{}", "⚠  Ctrl-C received – stopping navigator".yellow().bold());
        std::process::exit(130);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg)) {
        Ok(commands) => {
            info!(commands, "input stream closed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "navigator stopped");
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stdio loop
// ─────────────────────────────────────────────────────────────────────────────

/// Feed stdin through the safety node until EOF.  Returns the number of
/// filtered commands written.
///
/// The input channel keeps the node in file order.  Each command still
/// waits for its filtered output before the next line is read, which bounds
/// how far stdin can run ahead of the filter.
async fn run(cfg: Config) -> Result<usize, NavError> {
    let bus = EventBus::new(cfg.bus_capacity);
    let (feed, feed_rx) = input_channel(cfg.bus_capacity);
    let cycle = ControlCycle::new(cfg.control_cycle())?;
    let mut filtered = bus.subscribe_to(Topic::FilteredCommand);
    let node_task = tokio::spawn(SafetyNode::new(cycle, feed_rx, &bus).run());
    // The node now holds the only publisher, so its exit closes `filtered`.
    drop(bus);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    let mut commands = 0usize;

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| NavError::Parsing(format!("failed to read stdin: {e}")))?
    {
        line_no += 1;
        let message = match feed::parse_line(&line) {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(e) => {
                warn!(line = line_no, error = %e, "skipping malformed feed line");
                continue;
            }
        };

        let awaits_output = message.is_command();
        feed.send(Event::new(FEED_SOURCE, message.into_payload())).await?;

        if awaits_output {
            let wrench = next_filtered(&mut filtered).await?;
            write_wrench(&wrench)?;
            commands += 1;
        }
    }

    // Closing the feed lets the node drain and return.
    drop(feed);
    node_task
        .await
        .map_err(|e| NavError::Channel(format!("safety node task failed: {e}")))?;
    Ok(commands)
}

async fn next_filtered(rx: &mut TopicReceiver) -> Result<StampedWrench, NavError> {
    loop {
        match rx.recv().await {
            Ok(Event {
                payload: EventPayload::FilteredCommand(wrench),
                ..
            }) => return Ok(wrench),
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "filtered command output lagging");
            }
            Err(RecvError::Closed) => {
                return Err(NavError::Channel("safety node stopped before answering".into()));
            }
        }
    }
}

fn write_wrench(wrench: &StampedWrench) -> Result<(), NavError> {
    let line = serde_json::to_string(wrench)
        .map_err(|e| NavError::Parsing(format!("failed to encode filtered command: {e}")))?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}")
        .and_then(|_| stdout.flush())
        .map_err(|e| NavError::Channel(format!("failed to write stdout: {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Config export
// ─────────────────────────────────────────────────────────────────────────────

fn export_config(cfg: &Config, path: &Path, args: &Cli) -> ExitCode {
    if args.print_config {
        match config::to_toml(cfg) {
            Ok(raw) => print!("{raw}"),
            Err(e) => {
                eprintln!("{}: {e}", "Config error".red());
                return ExitCode::FAILURE;
            }
        }
    }
    if args.write_config {
        match config::save_to(cfg, path) {
            Ok(()) => eprintln!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            ),
            Err(e) => {
                eprintln!("{}: {e}", "Error saving config".red());
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner(config_path: &Path) {
    eprintln!();
    eprintln!(
        "  {} {}",
        "Navigator".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    eprintln!("  CBF safety filter");
    eprintln!("  Config: {}", config_path.display().to_string().dimmed());
    eprintln!();
}
