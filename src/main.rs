use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scanwatch::core::EngineVerdict;
use scanwatch::{Config, Orchestrator, QuarantineOutcome, ScanReport};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "scanwatch",
    version,
    about = "Multi-engine malware scanning with folder watching and quarantine"
)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan files in place
    Scan {
        /// Files to scan
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Watch folders and scan every new file until interrupted
    Watch {
        /// Folders to watch
        #[arg(required = true)]
        folders: Vec<PathBuf>,
    },
    /// Show recent scans
    History {
        /// Number of records to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
    /// Show scan statistics
    Stats,
    /// List quarantined files
    Quarantine,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_report(report: &ScanReport) {
    let record = &report.record;
    println!("{}: {}", record.file_name, record.aggregate_verdict);
    for result in &record.per_engine {
        let marker = match result.verdict {
            EngineVerdict::Clean => "ok",
            EngineVerdict::Infected => "THREAT",
            EngineVerdict::Error => "error",
        };
        println!(
            "  {:<16} {:<7} {} ({} ms)",
            result.engine_id,
            marker,
            result.detail,
            result.latency.as_millis()
        );
    }
    match &report.quarantine {
        QuarantineOutcome::NotRequired => {}
        QuarantineOutcome::Quarantined(entry) => {
            println!("  quarantined to {}", entry.quarantine_path.display())
        }
        QuarantineOutcome::Failed(e) => println!("  quarantine FAILED: {}", e),
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let orchestrator = Orchestrator::from_config(&config).context("starting scanwatch")?;

    match cli.command {
        Command::Scan { files } => {
            let mut threats = false;
            for file in files {
                let report = orchestrator
                    .scan_path(&file)
                    .await
                    .with_context(|| format!("scanning {}", file.display()))?;
                threats |= report.record.is_infected();
                print_report(&report);
            }
            return Ok(if threats {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            });
        }
        Command::Watch { folders } => {
            for folder in &folders {
                let session = orchestrator
                    .start_watch(folder)
                    .with_context(|| format!("watching {}", folder.display()))?;
                println!("watching {}", session.folder_path.display());
            }
            println!("quarantine: {}", orchestrator.quarantine_location().display());

            tokio::signal::ctrl_c()
                .await
                .context("waiting for Ctrl-C")?;
            for session in orchestrator.shutdown() {
                println!("stopped {}", session.folder_path.display());
            }
        }
        Command::History { limit } => {
            for record in orchestrator.recent_scans(limit) {
                println!(
                    "{}  {:<13} {:<11} {}",
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    record.aggregate_verdict,
                    record.action,
                    record.file_name
                );
            }
        }
        Command::Stats => {
            let stats = orchestrator.stats();
            println!("files scanned:    {}", stats.files_scanned);
            println!("threats detected: {}", stats.threats_detected);
            println!("protection rate:  {}%", stats.protection_rate);
            println!("engines:          {}", orchestrator.engine_names().join(", "));
        }
        Command::Quarantine => {
            println!("location: {}", orchestrator.quarantine_location().display());
            for entry in orchestrator
                .quarantine_entries()
                .await
                .context("listing quarantine")?
            {
                println!(
                    "{}  {}  {}  {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.id,
                    entry.file_name,
                    entry.original_path.display()
                );
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_scan() {
        let cli = Cli::try_parse_from(["scanwatch", "scan", "a.exe", "b.pdf"]).unwrap();
        match cli.command {
            Command::Scan { files } => assert_eq!(files.len(), 2),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["scanwatch", "history", "-n", "5", "--log-json", "-c", "x.toml"])
                .unwrap();
        assert!(cli.log_json);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Command::History { limit: 5 }));
    }

    #[test]
    fn test_watch_requires_folder() {
        assert!(Cli::try_parse_from(["scanwatch", "watch"]).is_err());
    }
}
