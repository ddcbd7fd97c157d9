//! Report output
//!
//! Writes ingested messages as aligned text rows or as JSON lines, optionally
//! followed by the diagnostics and per-file summary.

use crate::config::OutputFormat;
use anyhow::Result;
use dlt_log_decoder::{Diagnostic, FileReport, Message};
use serde::Serialize;
use std::io::Write;

/// Everything a report shows
pub struct Report<'a> {
    pub messages: Vec<&'a Message>,
    pub diagnostics: &'a [Diagnostic],
    pub files: &'a [FileReport],
    pub include_diagnostics: bool,
}

/// One JSON line; the tag tells message lines from diagnostic lines
#[derive(Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum JsonRecord<'a> {
    Message(&'a Message),
    Diagnostic(&'a Diagnostic),
    File(&'a FileReport),
}

pub fn write_report<W: Write>(out: &mut W, report: &Report<'_>, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Txt => write_text(out, report),
        OutputFormat::Json => write_json(out, report),
    }
}

fn write_text<W: Write>(out: &mut W, report: &Report<'_>) -> Result<()> {
    writeln!(
        out,
        "{:>8}  {:<23}  {:<4}  {:<4}  {:<4}  {:<18}  {}  [{}]",
        "Index", "Timestamp", "ECU", "App", "Ctx", "Type", "Payload", "Source"
    )?;
    for message in &report.messages {
        let kind = message
            .message_type()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "{:>8}  {:<23}  {:<4}  {:<4}  {:<4}  {:<18}  {}  [{}]",
            message.index(),
            message.timestamp(),
            message.ecu_id(),
            message.app_id(),
            message.context_id(),
            kind,
            message.payload_text(),
            message.source_file()
        )?;
    }

    if report.include_diagnostics {
        if !report.diagnostics.is_empty() {
            writeln!(out, "\nDiagnostics ({}):", report.diagnostics.len())?;
            for diagnostic in report.diagnostics {
                writeln!(out, "  {}", diagnostic)?;
            }
        }
        writeln!(out, "\nFiles:")?;
        for file in report.files {
            writeln!(
                out,
                "  {:?}: {} messages, {} skipped frames, {:?}",
                file.path, file.messages, file.skipped_frames, file.status
            )?;
        }
    }
    Ok(())
}

fn write_json<W: Write>(out: &mut W, report: &Report<'_>) -> Result<()> {
    for message in &report.messages {
        serde_json::to_writer(&mut *out, &JsonRecord::Message(message))?;
        writeln!(out)?;
    }
    if report.include_diagnostics {
        for diagnostic in report.diagnostics {
            serde_json::to_writer(&mut *out, &JsonRecord::Diagnostic(diagnostic))?;
            writeln!(out)?;
        }
        for file in report.files {
            serde_json::to_writer(&mut *out, &JsonRecord::File(file))?;
            writeln!(out)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlt_log_decoder::{
        Argument, ArgumentValue, DecoderConfig, FrameBuilder, LogIngestor, LogLevel, MessageType,
    };
    use std::io::Cursor;

    fn ingest() -> dlt_log_decoder::FileOutcome {
        let mut bytes = FrameBuilder::new()
            .storage_header(1_700_000_000, 0, "ECU1")
            .extended_header(MessageType::Log(LogLevel::Error), "APP", "CTX")
            .verbose(&[
                Argument::new(ArgumentValue::String("temp".to_string())),
                Argument::new(ArgumentValue::Unsigned { bits: 8, value: 90 }),
            ])
            .build()
            .unwrap();
        // truncated trailing frame for a diagnostic
        bytes.extend_from_slice(b"DLT\x01");
        bytes.extend_from_slice(&[0u8; 12]);
        bytes.extend_from_slice(&[0x20, 0x00, 0x00, 0xFF]);
        LogIngestor::new(DecoderConfig::new()).ingest_reader(Cursor::new(bytes), "trace.dlt", 0)
    }

    fn render(outcome: &dlt_log_decoder::FileOutcome, format: OutputFormat, include_diagnostics: bool) -> String {
        let report = Report {
            messages: outcome.messages.iter().collect(),
            diagnostics: &outcome.diagnostics,
            files: std::slice::from_ref(&outcome.report),
            include_diagnostics,
        };
        let mut out = Vec::new();
        write_report(&mut out, &report, format).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_text_report() {
        let outcome = ingest();
        let text = render(&outcome, OutputFormat::Txt, true);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].contains("Timestamp"));
        assert!(lines[1].contains("2023-11-14 22:13:20.000"));
        assert!(lines[1].contains("LOG ERROR"));
        assert!(lines[1].ends_with("temp 90  [trace.dlt]"));
        assert!(text.contains("Diagnostics (1):"));
        assert!(text.contains("SkippedFrame"));

        let quiet = render(&outcome, OutputFormat::Txt, false);
        assert_eq!(quiet.lines().count(), 2);
    }

    #[test]
    fn test_json_lines() {
        let outcome = ingest();
        let text = render(&outcome, OutputFormat::Json, true);
        let records: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["record"], "message");
        assert_eq!(records[0]["payload_text"], "temp 90");
        assert_eq!(records[0]["app_id"], "APP");
        assert_eq!(records[1]["record"], "diagnostic");
        assert_eq!(records[2]["record"], "file");
    }
}
