//! DLT Log Reader CLI Application
//!
//! This is the command-line interface for the DLT log decoder.
//! It uses the dlt-log-decoder library and adds:
//! - TOML configuration with command-line overrides
//! - Search filtering (substring or regex)
//! - Report output (TXT rows or JSON lines)

use anyhow::{Context, Result};
use clap::Parser;
use dlt_log_decoder::{LogIngestor, MessageFilter, SearchPattern, StringEncoding};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

mod config;
mod report;

use config::{AppConfig, OutputFormat};
use report::Report;

/// DLT Log Reader - Decode and search DLT log files
#[derive(Parser, Debug)]
#[command(name = "dlt-log-cli")]
#[command(about = "Decode and search DLT (Diagnostic Log and Trace) capture files", long_about = None)]
#[command(version)]
struct Args {
    /// DLT capture file(s), plain or gzip compressed
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Encoding of ASCII-coded strings: latin1, ascii or utf8
    #[arg(long, value_name = "ENCODING")]
    encoding: Option<StringEncoding>,

    /// Reject frames without a storage header
    #[arg(long)]
    require_storage_header: bool,

    /// Decode files in parallel
    #[arg(long)]
    parallel: bool,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Only show messages matching this pattern (can be repeated)
    #[arg(short, long, value_name = "PATTERN")]
    search: Vec<String>,

    /// Treat --search patterns as regular expressions
    #[arg(long)]
    regex: bool,

    /// Maximum number of messages to write
    #[arg(long, value_name = "COUNT")]
    limit: Option<usize>,

    /// Abandon a file after this many frames
    #[arg(long, value_name = "COUNT")]
    max_frames: Option<usize>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("DLT Log Reader CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using decoder library v{}", dlt_log_decoder::VERSION);

    let config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    let config = apply_overrides(config, &args);

    if config.input.files.is_empty() {
        println!("DLT Log Reader - No input specified");
        println!("\nQuick Start:");
        println!("  dlt-log-cli trace.dlt");
        println!("  dlt-log-cli log_1.dlt log_2.dlt --search engine");
        println!("\nWith a configuration file:");
        println!("  dlt-log-cli --config config.toml");
        println!("\nUse --help for more options");
        return Ok(());
    }

    run(&config)
}

/// Command-line flags win over the configuration file
fn apply_overrides(mut config: AppConfig, args: &Args) -> AppConfig {
    if !args.files.is_empty() {
        config.input.files = args.files.clone();
    }
    if args.parallel {
        config.input.parallel = true;
    }
    if let Some(encoding) = args.encoding {
        config.decoder.encoding = encoding;
    }
    if args.require_storage_header {
        config.decoder.require_storage_header = true;
    }
    if let Some(max_frames) = args.max_frames {
        config.decoder.max_frames_per_file = Some(max_frames);
    }
    if let Some(format) = args.format {
        config.output.format = format;
    }
    if let Some(output) = &args.output {
        config.output.path = Some(output.clone());
    }
    if let Some(limit) = args.limit {
        config.output.limit = Some(limit);
    }
    if !args.search.is_empty() {
        config.search.patterns = args
            .search
            .iter()
            .map(|pattern| SearchPattern {
                pattern: pattern.clone(),
                is_regex: args.regex,
            })
            .collect();
    }
    config
}

fn run(config: &AppConfig) -> Result<()> {
    let filter = MessageFilter::new(&config.search.patterns).context("Invalid search pattern")?;
    let ingestor = LogIngestor::new(config.decoder.clone());

    let outcome = if config.input.parallel {
        ingestor.ingest_files_parallel(&config.input.files)
    } else {
        ingestor.ingest_files(&config.input.files)
    };

    let limit = config.output.limit.unwrap_or(usize::MAX);
    let messages: Vec<_> = outcome
        .messages
        .iter()
        .filter(|m| filter.is_empty() || filter.matches(m))
        .take(limit)
        .collect();
    log::info!(
        "{} of {} message(s) selected",
        messages.len(),
        outcome.messages.len()
    );

    let report = Report {
        messages,
        diagnostics: &outcome.diagnostics,
        files: &outcome.files,
        include_diagnostics: config.output.include_diagnostics,
    };

    match &config.output.path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {:?}", path))?;
            let mut out = BufWriter::new(file);
            report::write_report(&mut out, &report, config.output.format)?;
            out.flush()?;
            log::info!("Report written to {:?}", path);
        }
        None => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            report::write_report(&mut out, &report, config.output.format)?;
            out.flush()?;
        }
    }

    if outcome.cancelled {
        log::warn!("Ingestion was cancelled; output is partial");
    }
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
