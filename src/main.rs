//! xcmon - Xcode build diagnostics and device logs from the command line
//!
//! This is the binary entry point. All logic lives in the workspace crates;
//! every subcommand prints JSON so output can be piped into other tools.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;

use xcmon_core::prelude::*;
use xcmon_engine::{Engine, Settings};

/// Queryable engine for Xcode build diagnostics and device logs
#[derive(Parser, Debug)]
#[command(name = "xcmon")]
#[command(about = "Xcode build diagnostics and device logs", long_about = None)]
struct Args {
    /// Path to a TOML config file (default: ~/.config/xcmon/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List discovered projects, newest first
    Projects,

    /// Diagnostics from a project's newest static build log
    BuildErrors {
        /// Project name; defaults to the most recently built project
        project: Option<String>,
    },

    /// Run a foreground build and report its diagnostics
    LiveBuild {
        project: String,

        /// Scheme to build; defaults to the first declared scheme
        #[arg(long)]
        scheme: Option<String>,

        /// Wall-clock limit in seconds; defaults to the configured timeout
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Recent host console logs from build-relevant processes
    Console {
        /// How far back to look, in minutes
        #[arg(long, default_value_t = 10)]
        since: u32,

        /// Only lines containing this text (case-insensitive)
        #[arg(long)]
        filter: Option<String>,
    },

    /// List known simulators and physical devices
    Devices,

    /// Recent logs from one device
    DeviceLogs {
        udid: String,

        #[arg(long, default_value_t = 100)]
        count: usize,

        #[arg(long, default_value_t = 10)]
        since: u32,
    },

    /// Short debug-level capture from one device
    DeviceDebug {
        udid: String,

        /// Restrict output to one app's subsystem/sender
        #[arg(long, value_name = "BUNDLE_ID")]
        bundle_id: Option<String>,

        #[arg(long, default_value_t = 100)]
        count: usize,
    },

    /// Monitor the console for a bounded window, then report what was seen
    Monitor {
        /// How long to monitor, in seconds
        #[arg(long, default_value_t = 30)]
        duration: u64,

        /// Maximum lines to report
        #[arg(long, default_value_t = 200)]
        count: usize,
    },

    /// Analyze a project's latest build log
    Analyze { project: String },
}

/// Lines plus the diagnostics extracted from them, as one JSON document
#[derive(Serialize)]
struct MonitorReport {
    lines: Vec<xcmon_core::LogLine>,
    diagnostics: Vec<xcmon_core::Diagnostic>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = xcmon_core::logging::init() {
        eprintln!("warning: file logging disabled: {e}");
    }

    if let Err(e) = run(args).await {
        error!("command failed: {}", e);
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let settings = Settings::load(args.config.as_deref())?;
    let engine = Engine::new(settings);

    match args.command {
        Command::Projects => {
            let report = engine.list_projects();
            for warning in &report.warnings {
                eprintln!("warning: {warning}");
            }
            print_json(&report.projects)?;
        }
        Command::BuildErrors { project } => {
            let diagnostics = engine.build_errors(project.as_deref()).await?;
            print_json(&diagnostics)?;
        }
        Command::LiveBuild {
            project,
            scheme,
            timeout,
        } => {
            let report = engine
                .run_live_build(
                    &project,
                    scheme.as_deref(),
                    timeout.map(Duration::from_secs),
                )
                .await?;
            print_json(&report)?;
        }
        Command::Console { since, filter } => {
            let lines = engine.console_logs(since, filter.as_deref()).await?;
            print_json(&lines)?;
        }
        Command::Devices => {
            let inventory = engine.devices().await?;
            for warning in &inventory.warnings {
                eprintln!("warning: {warning}");
            }
            print_json(&inventory)?;
        }
        Command::DeviceLogs { udid, count, since } => {
            let lines = engine.device_logs(&udid, count, since).await?;
            print_json(&lines)?;
        }
        Command::DeviceDebug {
            udid,
            bundle_id,
            count,
        } => {
            let lines = engine
                .device_debug_logs(&udid, bundle_id.as_deref(), count)
                .await?;
            print_json(&lines)?;
        }
        Command::Monitor { duration, count } => {
            let id = engine.start_console_monitoring().await?;
            eprintln!("monitoring console for {duration}s (session {id})...");
            tokio::time::sleep(Duration::from_secs(duration)).await;

            let lines = engine.monitor_recent(id, None, count).await?;
            let diagnostics = engine.registry_diagnostics(count).await;
            engine.stop_monitoring(id).await?;
            engine.shutdown().await;

            print_json(&MonitorReport { lines, diagnostics })?;
        }
        Command::Analyze { project } => {
            let report = engine.analyze_project(&project).await?;
            print_json(&report)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}
