//! DLT Log Decoder Library
//!
//! A stateless, reusable library for decoding DLT (Diagnostic Log and Trace)
//! capture files into structured, indexed messages.
//!
//! # Architecture
//!
//! The decoding pipeline, leaves first:
//! - [`FrameSource`] splits a (possibly gzip compressed) byte stream into frames
//!   and resynchronizes after corruption
//! - [`HeaderDecoder`] parses the storage, standard and extended headers
//! - [`VerboseDecoder`] / [`NonVerboseDecoder`] interpret the payload
//! - [`MessageAssembler`] builds immutable [`Message`]s with a running index
//! - [`order_files`] puts rotated captures in numeric order
//! - [`LogIngestor`] drives the pipeline over a file set
//!
//! The library does NOT:
//! - Render tables or highlight messages
//! - Resolve non-verbose message IDs from FIBEX databases (plug in a
//!   [`MessageIdResolver`] instead)
//!
//! Output formatting and configuration files are in the application layer
//! (dlt-log-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use dlt_log_decoder::{DecoderConfig, LogIngestor, StringEncoding};
//!
//! let config = DecoderConfig::new()
//!     .with_encoding(StringEncoding::Latin1)
//!     .with_storage_header_required(false);
//! let ingestor = LogIngestor::new(config);
//!
//! let outcome = ingestor.ingest_files(["trace_2.dlt", "trace_10.dlt", "trace_1.dlt"]);
//! for message in &outcome.messages {
//!     println!("{} {} {} {}", message.index(), message.timestamp(), message.app_id(), message.payload_text());
//! }
//! for diagnostic in &outcome.diagnostics {
//!     eprintln!("{}", diagnostic);
//! }
//! ```

// Public modules
pub mod assembler;
pub mod config;
pub mod file_order;
pub mod filter;
pub mod formats;
pub mod ingestor;
pub mod payload;
pub mod types;
pub mod writer;

// Re-export main types for convenience
pub use assembler::MessageAssembler;
pub use config::{DecoderConfig, HeaderPrecedence, StringEncoding};
pub use file_order::{order_files, FileOrderKey};
pub use filter::{MessageFilter, SearchPattern};
pub use formats::{Frame, FrameHeaders, FrameSource, HeaderDecoder, ResyncOutcome};
pub use ingestor::{CancelToken, FileOutcome, FileReport, FileStatus, IngestOutcome, LogIngestor};
pub use payload::{MessageIdResolver, NonVerboseDecoder, PayloadDecoder, VerboseDecoder};
pub use types::{
    Argument, ArgumentValue, ControlType, Diagnostic, DiagnosticKind, DltError, Endianness,
    HeaderError, Id4, LogLevel, Message, MessageType, NetworkTraceType, Payload, PayloadError,
    Result, Timestamp, TraceType,
};
pub use writer::{encode_arguments, FrameBuilder};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: an empty file set yields nothing
        let ingestor = LogIngestor::new(DecoderConfig::new());
        let outcome = ingestor.ingest_files(Vec::<std::path::PathBuf>::new());
        assert!(outcome.messages.is_empty());
        assert!(outcome.diagnostics.is_empty());
        assert!(!outcome.cancelled);
    }
}
