//! Log ingestion
//!
//! Drives frame source, header decoder, payload decoder and assembler across
//! an ordered set of capture files, producing one contiguously indexed message
//! sequence plus diagnostics.
//!
//! Frame-level failures never abort a file: the frame is dropped, a
//! [`Diagnostic`] is recorded, and decoding continues (after resynchronizing
//! when the frame boundary itself is in doubt). A file that cannot be opened
//! is reported and skipped. Only a run-wide cancellation stops ingestion early.

use crate::assembler::MessageAssembler;
use crate::config::DecoderConfig;
use crate::file_order::order_files;
use crate::formats::{Frame, FrameHeaders, FrameSource, HeaderDecoder, ResyncOutcome};
use crate::payload::{MessageIdResolver, PayloadDecoder};
use crate::types::{fallback_text, Diagnostic, DiagnosticKind, DltError, HeaderError, Message, Payload};
use rayon::prelude::*;
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-file limit for skipped-frame warnings in the log; diagnostics are always kept
const MAX_WARNINGS: usize = 5;

/// Cloneable handle for cancelling ingestion from another thread
///
/// `cancel` stops the whole run after the current frame. `skip_current_file`
/// abandons the remaining frames of the file being decoded and moves on to the
/// next one. With parallel ingestion the skip applies to whichever file
/// observes it first.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    skip_file: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn skip_current_file(&self) {
        self.skip_file.store(true, Ordering::SeqCst);
    }

    /// Consume a pending skip request
    pub fn take_skip_request(&self) -> bool {
        self.skip_file.swap(false, Ordering::SeqCst)
    }
}

/// How decoding of one file ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FileStatus {
    /// Decoded to the end of the stream (individual frames may have been skipped)
    Complete,
    /// Stopped early by a read failure or unrecoverable corruption
    Partial,
    /// Remaining frames abandoned by the frame limit or a skip request
    Abandoned,
    /// Stopped by run-wide cancellation
    Cancelled,
    /// Could not be opened; no frames decoded
    Unreadable { reason: String },
}

/// Per-file summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    /// Messages emitted from this file
    pub messages: usize,
    /// Frames dropped from this file
    pub skipped_frames: usize,
    pub status: FileStatus,
}

/// Result of ingesting a single file
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub messages: Vec<Message>,
    pub diagnostics: Vec<Diagnostic>,
    pub report: FileReport,
}

/// Result of ingesting a file set
#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    /// Messages in file order, indexed contiguously from zero
    pub messages: Vec<Message>,
    pub diagnostics: Vec<Diagnostic>,
    /// One report per file that was started, in ingestion order
    pub files: Vec<FileReport>,
    /// True if the run was cancelled before all files were ingested
    pub cancelled: bool,
}

impl IngestOutcome {
    /// Append a file's results; returns false if ingestion must stop
    fn absorb(&mut self, file: FileOutcome) -> bool {
        let cancelled = file.report.status == FileStatus::Cancelled;
        self.messages.extend(file.messages);
        self.diagnostics.extend(file.diagnostics);
        self.files.push(file.report);
        if cancelled {
            self.cancelled = true;
        }
        !cancelled
    }
}

/// Headers and payload of one frame, before an index is assigned
struct DecodedFrame {
    headers: FrameHeaders,
    payload: Payload,
}

/// Index-free decode result of one file (parallel ingestion)
struct DecodedFile {
    file_id: String,
    frames: Vec<DecodedFrame>,
    diagnostics: Vec<Diagnostic>,
    report: FileReport,
}

enum DecodeState {
    NextFrame,
    Decode(Frame),
    Resync,
    Done(FileStatus),
}

/// Per-file bookkeeping while decoding a stream
struct StreamProgress<'a> {
    file_id: &'a str,
    diagnostics: Vec<Diagnostic>,
    frames_read: usize,
    emitted: usize,
    skipped_frames: usize,
    warnings: usize,
}

impl<'a> StreamProgress<'a> {
    fn new(file_id: &'a str) -> Self {
        Self {
            file_id,
            diagnostics: Vec::new(),
            frames_read: 0,
            emitted: 0,
            skipped_frames: 0,
            warnings: 0,
        }
    }

    fn record(&mut self, kind: DiagnosticKind, offset: Option<u64>, detail: String) {
        self.diagnostics.push(Diagnostic {
            file: self.file_id.to_string(),
            kind,
            offset,
            detail,
        });
    }

    /// Drop a frame: record it and warn, suppressing warnings past the per-file limit
    fn skip(&mut self, kind: DiagnosticKind, offset: u64, detail: String) {
        self.skipped_frames += 1;
        self.warnings += 1;
        if self.warnings <= MAX_WARNINGS {
            log::warn!(
                "{}: skipping frame at offset {}: {} (warning {}/{})",
                self.file_id,
                offset,
                detail,
                self.warnings,
                MAX_WARNINGS
            );
        } else if self.warnings == MAX_WARNINGS + 1 {
            log::warn!("{}: ... suppressing further frame warnings for this file", self.file_id);
        }
        self.record(kind, Some(offset), detail);
    }

    fn finish(self, path: PathBuf, status: FileStatus) -> (Vec<Diagnostic>, FileReport) {
        let report = FileReport {
            path,
            messages: self.emitted,
            skipped_frames: self.skipped_frames,
            status,
        };
        (self.diagnostics, report)
    }
}

/// Orchestrates decoding of one or many capture files
#[derive(Debug, Clone)]
pub struct LogIngestor {
    config: DecoderConfig,
    header_decoder: HeaderDecoder,
    payload_decoder: PayloadDecoder,
    cancel: CancelToken,
}

impl LogIngestor {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            header_decoder: HeaderDecoder::new(config.require_storage_header),
            payload_decoder: PayloadDecoder::new(config.encoding, None),
            cancel: CancelToken::new(),
            config,
        }
    }

    /// Attach a resolver for non-verbose message IDs
    pub fn with_resolver(mut self, resolver: Arc<dyn MessageIdResolver>) -> Self {
        self.payload_decoder = PayloadDecoder::new(self.config.encoding, Some(resolver));
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Handle for cancelling this ingestor's runs
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Ingest a file set sequentially in [`order_files`] order
    ///
    /// Each file's first index is the number of messages emitted by the files
    /// before it.
    pub fn ingest_files<I, P>(&self, paths: I) -> IngestOutcome
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let ordered = order_files(paths);
        log::info!("Ingesting {} file(s)", ordered.len());

        let mut outcome = IngestOutcome::default();
        for path in &ordered {
            if self.cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            let file = self.ingest_file(path, outcome.messages.len() as u64);
            if !outcome.absorb(file) {
                break;
            }
        }

        log::info!(
            "Ingested {} message(s) from {} file(s), {} diagnostic(s)",
            outcome.messages.len(),
            outcome.files.len(),
            outcome.diagnostics.len()
        );
        outcome
    }

    /// Ingest a file set, decoding files on the rayon pool
    ///
    /// Files are decoded independently without indices; indices are assigned
    /// afterwards in one sequential pass in [`order_files`] order, so the
    /// result equals that of [`ingest_files`](Self::ingest_files).
    pub fn ingest_files_parallel<I, P>(&self, paths: I) -> IngestOutcome
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let ordered = order_files(paths);
        log::info!("Ingesting {} file(s) in parallel", ordered.len());

        let mut outcome = IngestOutcome::default();
        if self.cancel.is_cancelled() {
            outcome.cancelled = true;
            return outcome;
        }

        let decoded: Vec<DecodedFile> = ordered
            .par_iter()
            .map(|path| self.decode_file(path))
            .collect();

        // Stops after the first cancelled file, as the sequential loop does
        for file in decoded {
            let mut assembler = MessageAssembler::new(outcome.messages.len() as u64, &self.config);
            let messages = file
                .frames
                .into_iter()
                .map(|frame| assembler.assemble(&frame.headers, frame.payload, &file.file_id))
                .collect();
            let keep_going = outcome.absorb(FileOutcome {
                messages,
                diagnostics: file.diagnostics,
                report: file.report,
            });
            if !keep_going {
                break;
            }
        }

        log::info!(
            "Ingested {} message(s) from {} file(s), {} diagnostic(s)",
            outcome.messages.len(),
            outcome.files.len(),
            outcome.diagnostics.len()
        );
        outcome
    }

    /// Ingest one file, numbering its messages from `index_base`
    pub fn ingest_file(&self, path: &Path, index_base: u64) -> FileOutcome {
        let file_id = file_id(path);
        let mut assembler = MessageAssembler::new(index_base, &self.config);
        let mut messages = Vec::new();

        let (diagnostics, report) = self.run_file(path, &file_id, |headers, payload| {
            messages.push(assembler.assemble(&headers, payload, &file_id));
        });

        FileOutcome {
            messages,
            diagnostics,
            report,
        }
    }

    /// Ingest an already opened byte stream (no gzip detection)
    pub fn ingest_reader<R: Read>(&self, reader: R, file_id: &str, index_base: u64) -> FileOutcome {
        let mut assembler = MessageAssembler::new(index_base, &self.config);
        let mut messages = Vec::new();
        let mut source = FrameSource::new(reader, &self.config);

        let (diagnostics, report) =
            self.decode_stream(&mut source, file_id, PathBuf::from(file_id), |headers, payload| {
                messages.push(assembler.assemble(&headers, payload, file_id));
            });

        FileOutcome {
            messages,
            diagnostics,
            report,
        }
    }

    fn decode_file(&self, path: &Path) -> DecodedFile {
        let file_id = file_id(path);
        let mut frames = Vec::new();
        let (diagnostics, report) = self.run_file(path, &file_id, |headers, payload| {
            frames.push(DecodedFrame { headers, payload });
        });
        DecodedFile {
            file_id,
            frames,
            diagnostics,
            report,
        }
    }

    /// Open `path` and decode it into `sink`
    fn run_file<F>(&self, path: &Path, file_id: &str, sink: F) -> (Vec<Diagnostic>, FileReport)
    where
        F: FnMut(FrameHeaders, Payload),
    {
        log::info!("Decoding DLT file: {:?}", path);

        match FrameSource::open(path, &self.config) {
            Ok(mut source) => self.decode_stream(&mut source, file_id, path.to_path_buf(), sink),
            Err(e) => {
                log::warn!("Skipping unreadable file {:?}: {}", path, e);
                let mut progress = StreamProgress::new(file_id);
                progress.record(DiagnosticKind::UnreadableFile, None, e.to_string());
                progress.finish(
                    path.to_path_buf(),
                    FileStatus::Unreadable {
                        reason: e.to_string(),
                    },
                )
            }
        }
    }

    /// Frame loop of one stream
    fn decode_stream<R, F>(
        &self,
        source: &mut FrameSource<R>,
        file_id: &str,
        path: PathBuf,
        mut sink: F,
    ) -> (Vec<Diagnostic>, FileReport)
    where
        R: Read,
        F: FnMut(FrameHeaders, Payload),
    {
        let mut progress = StreamProgress::new(file_id);
        let mut state = DecodeState::NextFrame;

        let status = loop {
            state = match state {
                DecodeState::Done(status) => break status,

                DecodeState::NextFrame => self.next_frame(source, &mut progress),

                DecodeState::Decode(frame) => self.decode_frame(frame, &mut progress, &mut sink),

                DecodeState::Resync => match source.resync() {
                    Ok(ResyncOutcome::Found { skipped }) => {
                        log::debug!(
                            "{}: resynchronized after {} byte(s) at offset {}",
                            file_id,
                            skipped,
                            source.offset()
                        );
                        DecodeState::NextFrame
                    }
                    Ok(ResyncOutcome::EndOfStream { skipped }) => {
                        log::debug!("{}: no frame marker in the last {} byte(s)", file_id, skipped);
                        DecodeState::Done(FileStatus::Complete)
                    }
                    Ok(ResyncOutcome::Exhausted { skipped }) => {
                        log::warn!(
                            "{}: no frame marker within {} byte(s), abandoning rest of file",
                            file_id,
                            skipped
                        );
                        progress.record(
                            DiagnosticKind::ResyncExhausted,
                            Some(source.offset()),
                            format!("no frame marker within {} bytes", skipped),
                        );
                        DecodeState::Done(FileStatus::Partial)
                    }
                    Err(e) => read_failed(&mut progress, source.offset(), e),
                },
            };
        };

        log::info!(
            "Finished {}: {} message(s), {} skipped frame(s), {:?}",
            file_id,
            progress.emitted,
            progress.skipped_frames,
            status
        );
        progress.finish(path, status)
    }

    fn next_frame<R: Read>(&self, source: &mut FrameSource<R>, progress: &mut StreamProgress<'_>) -> DecodeState {
        if self.cancel.is_cancelled() {
            progress.record(
                DiagnosticKind::Cancelled,
                Some(source.offset()),
                "ingestion cancelled".to_string(),
            );
            return DecodeState::Done(FileStatus::Cancelled);
        }
        if self.cancel.take_skip_request() {
            log::info!("{}: skipping rest of file on request", progress.file_id);
            progress.record(
                DiagnosticKind::Cancelled,
                Some(source.offset()),
                "rest of file skipped on request".to_string(),
            );
            return DecodeState::Done(FileStatus::Abandoned);
        }

        match source.next_frame() {
            Ok(None) => DecodeState::Done(FileStatus::Complete),
            Ok(Some(frame)) => {
                if let Some(limit) = self.config.max_frames_per_file {
                    if progress.frames_read >= limit {
                        log::warn!("{}: frame limit of {} reached", progress.file_id, limit);
                        progress.record(
                            DiagnosticKind::FrameLimitReached,
                            Some(frame.offset),
                            format!("frame limit of {} reached", limit),
                        );
                        return DecodeState::Done(FileStatus::Abandoned);
                    }
                }
                progress.frames_read += 1;
                DecodeState::Decode(frame)
            }
            Err(DltError::Header(e)) => {
                progress.skip(DiagnosticKind::SkippedFrame, source.offset(), e.to_string());
                DecodeState::Resync
            }
            Err(e) => read_failed(progress, source.offset(), e),
        }
    }

    fn decode_frame<F>(&self, frame: Frame, progress: &mut StreamProgress<'_>, sink: &mut F) -> DecodeState
    where
        F: FnMut(FrameHeaders, Payload),
    {
        let headers = match self.header_decoder.decode(&frame.bytes) {
            Ok(headers) => headers,
            // the declared length was usable, so the next frame boundary is trusted
            Err(e @ HeaderError::InvalidVersion(_)) => {
                progress.skip(DiagnosticKind::SkippedFrame, frame.offset, e.to_string());
                return DecodeState::NextFrame;
            }
            Err(e) => {
                progress.skip(DiagnosticKind::SkippedFrame, frame.offset, e.to_string());
                return DecodeState::Resync;
            }
        };

        match self.payload_decoder.decode(&headers, &frame.bytes) {
            Ok(payload) => {
                log::trace!("{}: frame at offset {} decoded", progress.file_id, frame.offset);
                check_capture_time(&headers, frame.offset, progress);
                sink(headers, payload);
                progress.emitted += 1;
            }
            Err(e) => {
                let data = headers.payload(&frame.bytes).to_vec();
                let reason = e.to_string();
                let fallback = fallback_text(&data, &reason);
                if self.config.emit_undecodable_frames {
                    progress.record(DiagnosticKind::UndecodablePayload, Some(frame.offset), fallback);
                    check_capture_time(&headers, frame.offset, progress);
                    sink(headers, Payload::Undecodable { data, reason });
                    progress.emitted += 1;
                } else {
                    progress.skip(DiagnosticKind::UndecodablePayload, frame.offset, fallback);
                }
            }
        }
        DecodeState::NextFrame
    }
}

/// Record a storage header whose time cannot be represented
fn check_capture_time(headers: &FrameHeaders, offset: u64, progress: &mut StreamProgress<'_>) {
    if let Some(storage) = headers.storage.filter(|s| s.timestamp().is_none()) {
        log::debug!("{}: invalid capture time at offset {}", progress.file_id, offset);
        progress.record(
            DiagnosticKind::InvalidCaptureTime,
            Some(offset),
            format!(
                "storage header time {}s {}us is out of range",
                storage.seconds, storage.microseconds
            ),
        );
    }
}

fn read_failed(progress: &mut StreamProgress<'_>, offset: u64, error: DltError) -> DecodeState {
    log::warn!("{}: read failed at offset {}: {}", progress.file_id, offset, error);
    progress.record(DiagnosticKind::ReadFailed, Some(offset), error.to_string());
    DecodeState::Done(FileStatus::Partial)
}

/// Identifier recorded on messages and diagnostics: the file name
fn file_id(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
