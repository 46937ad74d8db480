//! gtfsval: validate GTFS transit feeds.
//!
//! Reads a feed from a directory or zip archive, runs every built-in rule
//! and prints the notices. Exits with status 1 when any ERROR notice was
//! reported.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use time::Date;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use gtfsval::feed::{open_feed, parse_date};
use gtfsval::validation::{
    default_workers, Severity, ValidationConfig, ValidationEngine, ValidationReport,
};

#[derive(Parser)]
#[command(name = "gtfsval")]
#[command(about = "Validate GTFS transit feeds")]
#[command(version)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a feed directory or zip archive
    Validate {
        /// Path to the feed
        path: PathBuf,

        /// Worker threads for per-entity checks (default: available parallelism)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Date to validate against, as YYYYMMDD (default: today, UTC)
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<Date>,

        /// ISO 3166-1 alpha-2 country code of the feed
        #[arg(long, default_value = "")]
        country_code: String,

        /// Soft memory budget in bytes
        #[arg(long)]
        max_memory: Option<u64>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_date_arg(value: &str) -> std::result::Result<Date, String> {
    parse_date(value).ok_or_else(|| format!("invalid date '{value}', expected YYYYMMDD"))
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}

/// Run the validate command. Returns whether any ERROR notice was reported.
fn run_validate(path: &Path, config: ValidationConfig, format: OutputFormat) -> Result<bool> {
    let source =
        open_feed(path).with_context(|| format!("Failed to open feed {}", path.display()))?;

    let cancel = config.cancel.clone();
    ctrlc::set_handler(move || cancel.cancel()).context("Error setting Ctrl-C handler")?;

    let report = ValidationEngine::with_default_rules()
        .run(source, config)
        .with_context(|| format!("Failed to validate {}", path.display()))?;
    if report.cancelled {
        warn!("validation cancelled, report is incomplete");
    }

    let mut out = io::stdout().lock();
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, &report)?;
            writeln!(out)?;
        }
        OutputFormat::Text => print_text(&mut out, &report)?,
    }
    Ok(report.has_errors())
}

/// Most severe notices first; order within a severity is kept.
fn print_text(out: &mut impl Write, report: &ValidationReport) -> io::Result<()> {
    let mut notices: Vec<_> = report.notices.iter().collect();
    notices.sort_by_key(|n| std::cmp::Reverse(n.severity));
    for notice in notices {
        writeln!(out, "{notice}")?;
    }
    writeln!(
        out,
        "{} error(s), {} warning(s), {} info notice(s)",
        report.count(Severity::Error),
        report.count(Severity::Warning),
        report.count(Severity::Info),
    )
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Validate {
            path,
            workers,
            date,
            country_code,
            max_memory,
            format,
        } => {
            let mut config = ValidationConfig::default()
                .with_workers(workers.unwrap_or_else(default_workers))
                .with_country_code(country_code);
            if let Some(date) = date {
                config = config.with_current_date(date);
            }
            config.max_memory = max_memory;

            let has_errors = run_validate(&path, config, format)?;
            Ok(if has_errors {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}
