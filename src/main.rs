use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;

use pagewatch::detect::{ChangeDetector, ReportFile};
use pagewatch::logging::{self, LogFormat};
use pagewatch::snapshot::SnapshotArchive;
use pagewatch::{config, run, ScrapeError};

#[derive(Parser)]
#[command(name = "pagewatch")]
#[command(about = "Acquire a challenge-protected page through a real browser and report content changes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// TOML file layered under the environment
    #[arg(short, long, global = true, env = "PAGEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire the page, archive it and compare with the previous snapshot (default)
    Run,

    /// Compare two saved snapshots and write a change report
    Compare {
        previous: PathBuf,
        current: PathBuf,

        /// Report path (default: COMPARISON_OUTPUT)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete snapshots older than the given number of days
    Prune {
        #[arg(short, long, default_value = "30")]
        days: u64,

        /// Snapshot directory (default: <REPO_PATH>/scraped_pages)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_format);

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode, ScrapeError> {
    let (run_config, credentials) = config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let summary = run::execute(&run_config, &credentials).await?;
            match &summary.snapshot {
                Some(path) => println!(
                    "{} Snapshot saved: {} ({})",
                    "✓".green(),
                    path.display(),
                    summary.backend
                ),
                None => println!(
                    "{} Page acquired via {} but the snapshot could not be saved",
                    "!".yellow().bold(),
                    summary.backend
                ),
            }
            match &summary.report {
                None => println!("  {} No previous snapshot, comparison skipped", "-".dimmed()),
                Some(report) => print_report(report, &run_config.comparison_output),
            }
            if summary.pruned > 0 {
                println!("  {} Removed {} old snapshots", "✓".green(), summary.pruned);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Compare {
            previous,
            current,
            output,
        } => {
            let output = output.unwrap_or(run_config.comparison_output);
            let report = ChangeDetector::new(&output).compare_and_persist(&previous, &current);
            print_report(&report, &output);
            Ok(match report {
                ReportFile::Change(_) => ExitCode::SUCCESS,
                ReportFile::Failure(_) => ExitCode::FAILURE,
            })
        }
        Commands::Prune { days, dir } => {
            let archive = SnapshotArchive::new(dir.unwrap_or_else(|| run_config.snapshot_dir()));
            let removed = archive.prune_older_than(days)?;
            println!(
                "{} Removed {} snapshots older than {} days from {}",
                "✓".green(),
                removed,
                days,
                archive.dir().display()
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_report(report: &ReportFile, output: &std::path::Path) {
    match report {
        ReportFile::Change(r) if r.has_changes => println!(
            "{} Changes detected: {} additions, {} deletions",
            "!".yellow().bold(),
            r.additions.to_string().green(),
            r.deletions.to_string().red()
        ),
        ReportFile::Change(_) => println!("{} No changes detected", "✓".green()),
        ReportFile::Failure(f) => println!("{} Comparison failed: {}", "✗".red(), f.error),
    }
    println!("  Report: {}", output.display().to_string().dimmed());
}
