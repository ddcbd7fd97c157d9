//! Standalone DLT log decoder tool
//!
//! Decodes one or more DLT capture files and prints the assembled messages
//! followed by a summary of diagnostics.
//!
//! Usage:
//!   decode_dlt <file.dlt>... [--limit <count>] [--parallel] [--verbose]
//!
//! Example:
//!   decode_dlt trace_1.dlt trace_2.dlt.gz --limit 100

use dlt_log_decoder::{DecoderConfig, DiagnosticKind, LogIngestor, Message};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

struct IngestStats {
    verbose_messages: usize,
    non_verbose_messages: usize,
    per_app: HashMap<String, usize>,
    per_diagnostic: HashMap<DiagnosticKind, usize>,
}

impl IngestStats {
    fn new() -> Self {
        Self {
            verbose_messages: 0,
            non_verbose_messages: 0,
            per_app: HashMap::new(),
            per_diagnostic: HashMap::new(),
        }
    }

    fn print_summary(&self) {
        println!("\n=== DECODING SUMMARY ===");
        println!("Verbose messages: {}", self.verbose_messages);
        println!("Non-verbose messages: {}", self.non_verbose_messages);
        println!("Unique application IDs: {}", self.per_app.len());

        if !self.per_app.is_empty() {
            println!("\nTop 10 Applications:");
            let mut sorted: Vec<_> = self.per_app.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (app, count) in sorted.iter().take(10) {
                println!("  {}: {} messages", app, count);
            }
        }

        if !self.per_diagnostic.is_empty() {
            println!("\nDiagnostics:");
            for (kind, count) in &self.per_diagnostic {
                println!("  {:?}: {}", kind, count);
            }
        }
    }
}

fn print_message(message: &Message) {
    let kind = message
        .message_type()
        .map(|t| t.to_string())
        .unwrap_or_default();
    println!(
        "{:>6} {} {:<4} {:<4} {:<4} {:<14} {}",
        message.index(),
        message.timestamp(),
        message.ecu_id(),
        message.app_id(),
        message.context_id(),
        kind,
        message.payload_text()
    );
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <file.dlt>... [--limit <count>] [--parallel] [--verbose]", args[0]);
        eprintln!("\nExample:");
        eprintln!("  {} trace_1.dlt trace_2.dlt.gz --limit 100", args[0]);
        std::process::exit(1);
    }

    let mut files = Vec::new();
    let mut limit: Option<usize> = None;
    let mut parallel = false;
    let mut verbose = false;

    // Parse arguments
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--limit" => {
                i += 1;
                if i < args.len() {
                    limit = Some(args[i].parse()?);
                }
            }
            "--parallel" => parallel = true,
            "--verbose" | "-v" => verbose = true,
            other => files.push(PathBuf::from(other)),
        }
        i += 1;
    }

    env_logger::Builder::new()
        .filter_level(if verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .init();

    println!("=== DLT Log Decoder ===");
    println!("Files: {}", files.len());
    if let Some(n) = limit {
        println!("Limit: {} messages", n);
    }
    println!();

    let ingestor = LogIngestor::new(DecoderConfig::new());
    let outcome = if parallel {
        ingestor.ingest_files_parallel(&files)
    } else {
        ingestor.ingest_files(&files)
    };

    let mut stats = IngestStats::new();
    for (shown, message) in outcome.messages.iter().enumerate() {
        if message.is_verbose() {
            stats.verbose_messages += 1;
        } else {
            stats.non_verbose_messages += 1;
        }
        *stats.per_app.entry(message.app_id().to_string()).or_insert(0) += 1;

        match limit {
            Some(max) if shown == max => println!("\n... (limit of {} messages reached)", max),
            Some(max) if shown > max => {}
            _ => print_message(message),
        }
    }

    for diagnostic in &outcome.diagnostics {
        *stats.per_diagnostic.entry(diagnostic.kind).or_insert(0) += 1;
        if verbose {
            eprintln!("{}", diagnostic);
        }
    }

    println!("\n=== FILES ===");
    for report in &outcome.files {
        println!(
            "{:?}: {} messages, {} skipped frames, {:?}",
            report.path, report.messages, report.skipped_frames, report.status
        );
    }

    stats.print_summary();

    Ok(())
}
