//! sdnctld entry point.
//!
//! Loads the topology, then either serves transport events (`run`), replays
//! a recorded event file (`replay`), or inspects the compiled policies
//! (`compile`, `check`).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sdnctld::commands;
use sdnctld::{ConnectionReport, JsonLinesInstaller, SdnctlConfig, DEFAULT_CONFIG_PATH};

/// SDN policy controller
#[derive(Parser, Debug)]
#[command(name = "sdnctld")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve JSON-lines transport events until EOF or Ctrl-C
    Run {
        /// Event source; "-" reads standard input
        #[arg(short = 'e', long, default_value = "-")]
        events: String,
    },
    /// Print the compiled policy of one switch
    Compile {
        /// Datapath id of the switch
        #[arg(short = 'd', long)]
        dpid: u64,

        /// Emit JSON instead of one rule per line
        #[arg(long)]
        json: bool,
    },
    /// Validate the configuration and compile every configured switch
    Check,
    /// Replay a recorded event file and print the resulting directives
    Replay {
        /// JSON-lines event file
        file: PathBuf,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn print_reports(reports: &[ConnectionReport]) {
    for report in reports {
        match (&report.role, &report.error) {
            (Some(role), None) => info!(
                conn = report.conn,
                dpid = report.dpid,
                %role,
                rules = report.rules_installed,
                packets_in = report.packets_in,
                replies = report.replies,
                "Connection summary"
            ),
            (_, Some(e)) => warn!(
                conn = report.conn,
                dpid = report.dpid,
                error = %e,
                "Connection summary"
            ),
            (None, None) => {}
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let config = SdnctlConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    match args.command {
        Command::Run { events } => {
            info!("--- Starting sdnctld ---");
            let installer = Arc::new(JsonLinesInstaller::new(std::io::stdout()));
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            };

            let reports = if events == "-" {
                let reader = BufReader::new(tokio::io::stdin());
                commands::serve(&config, reader, installer, shutdown).await?
            } else {
                let file = tokio::fs::File::open(&events)
                    .await
                    .with_context(|| format!("opening {}", events))?;
                commands::serve(&config, BufReader::new(file), installer, shutdown).await?
            };

            print_reports(&reports);
            info!("sdnctld exiting normally");
            Ok(ExitCode::SUCCESS)
        }
        Command::Compile { dpid, json } => {
            let (role, rules) = commands::compile(&config, dpid)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rules)?);
            } else {
                println!("# dpid {} ({}), {} rules", dpid, role, rules.len());
                for rule in &rules {
                    println!("{}", rule);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Check => {
            let results = commands::check(&config)?;
            let mut failed = 0;
            for result in &results {
                match &result.error {
                    None => println!(
                        "ok    dpid {:<4} {:<18} {} rules",
                        result.dpid,
                        result.role.to_string(),
                        result.rules
                    ),
                    Some(e) => {
                        failed += 1;
                        println!(
                            "FAIL  dpid {:<4} {:<18} {}",
                            result.dpid,
                            result.role.to_string(),
                            e
                        );
                    }
                }
            }
            if failed > 0 {
                println!("{} of {} switches failed", failed, results.len());
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Command::Replay { file } => {
            let handle = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("opening {}", file.display()))?;
            let installer = Arc::new(JsonLinesInstaller::new(std::io::stdout()));
            let reports = commands::replay(&config, BufReader::new(handle), installer).await?;
            print_reports(&reports);
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("sdnctld error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
