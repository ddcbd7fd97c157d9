//! Core types for the DLT log decoder library
//!
//! This module defines the fundamental types the decoder emits when processing
//! log captures: assembled messages, decoded verbose arguments, message type
//! classification, diagnostics, and the error taxonomy shared by every stage.

use crate::config::StringEncoding;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;

/// Timestamp type used throughout the decoder
pub type Timestamp = DateTime<Utc>;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DltError>;

/// Byte order of multi-byte payload fields (selected per frame by the MSBF header bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Endianness {
    Little,
    Big,
}

/// Four-byte fixed-width text identifier (ECU, application or context ID)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Id4(pub [u8; 4]);

impl Id4 {
    /// Build an identifier from the first four bytes of `buf` (missing bytes are NUL)
    pub fn from_slice(buf: &[u8]) -> Self {
        let mut bytes = [0u8; 4];
        for (dst, src) in bytes.iter_mut().zip(buf) {
            *dst = *src;
        }
        Self(bytes)
    }

    /// Build an identifier from text, truncated or NUL padded to four bytes
    pub fn from_text(text: &str) -> Self {
        Self::from_slice(text.as_bytes())
    }

    /// True if every byte is NUL
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Decode up to the first NUL with the given encoding, trimming padding
    pub fn to_text(&self, encoding: StringEncoding) -> String {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(4);
        encoding.decode(&self.0[..end]).trim().to_string()
    }
}

impl fmt::Display for Id4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text(StringEncoding::Latin1))
    }
}

impl fmt::Debug for Id4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id4({:?})", self.to_string())
    }
}

impl Serialize for Id4 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Log level carried in the MTIN field of LOG messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LogLevel {
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Verbose,
    Other(u8),
}

/// Trace category carried in the MTIN field of APP_TRACE messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TraceType {
    Variable,
    FunctionIn,
    FunctionOut,
    State,
    Vfb,
    Other(u8),
}

/// Bus category carried in the MTIN field of NW_TRACE messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NetworkTraceType {
    Ipc,
    Can,
    FlexRay,
    Most,
    Ethernet,
    SomeIp,
    /// User defined bus types (7..=15)
    Other(u8),
}

/// Control message direction carried in the MTIN field of CONTROL messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ControlType {
    Request,
    Response,
    Time,
    Other(u8),
}

/// Message classification from the extended header MSIN bit-field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MessageType {
    Log(LogLevel),
    AppTrace(TraceType),
    NetworkTrace(NetworkTraceType),
    Control(ControlType),
    /// Reserved MSTP values are preserved rather than rejected
    Unknown { mstp: u8, mtin: u8 },
}

impl MessageType {
    /// Build from the MSTP (bits 1-3) and MTIN (bits 4-7) fields of an MSIN byte
    pub fn from_message_info(message_info: u8) -> Self {
        let mstp = (message_info >> 1) & 0x07;
        let mtin = (message_info >> 4) & 0x0F;
        match mstp {
            0 => MessageType::Log(match mtin {
                1 => LogLevel::Fatal,
                2 => LogLevel::Error,
                3 => LogLevel::Warn,
                4 => LogLevel::Info,
                5 => LogLevel::Debug,
                6 => LogLevel::Verbose,
                other => LogLevel::Other(other),
            }),
            1 => MessageType::AppTrace(match mtin {
                1 => TraceType::Variable,
                2 => TraceType::FunctionIn,
                3 => TraceType::FunctionOut,
                4 => TraceType::State,
                5 => TraceType::Vfb,
                other => TraceType::Other(other),
            }),
            2 => MessageType::NetworkTrace(match mtin {
                1 => NetworkTraceType::Ipc,
                2 => NetworkTraceType::Can,
                3 => NetworkTraceType::FlexRay,
                4 => NetworkTraceType::Most,
                5 => NetworkTraceType::Ethernet,
                6 => NetworkTraceType::SomeIp,
                other => NetworkTraceType::Other(other),
            }),
            3 => MessageType::Control(match mtin {
                1 => ControlType::Request,
                2 => ControlType::Response,
                3 => ControlType::Time,
                other => ControlType::Other(other),
            }),
            _ => MessageType::Unknown { mstp, mtin },
        }
    }

    /// Encode back into (MSTP, MTIN) field values
    pub fn to_fields(&self) -> (u8, u8) {
        match *self {
            MessageType::Log(level) => (
                0,
                match level {
                    LogLevel::Fatal => 1,
                    LogLevel::Error => 2,
                    LogLevel::Warn => 3,
                    LogLevel::Info => 4,
                    LogLevel::Debug => 5,
                    LogLevel::Verbose => 6,
                    LogLevel::Other(v) => v,
                },
            ),
            MessageType::AppTrace(trace) => (
                1,
                match trace {
                    TraceType::Variable => 1,
                    TraceType::FunctionIn => 2,
                    TraceType::FunctionOut => 3,
                    TraceType::State => 4,
                    TraceType::Vfb => 5,
                    TraceType::Other(v) => v,
                },
            ),
            MessageType::NetworkTrace(bus) => (
                2,
                match bus {
                    NetworkTraceType::Ipc => 1,
                    NetworkTraceType::Can => 2,
                    NetworkTraceType::FlexRay => 3,
                    NetworkTraceType::Most => 4,
                    NetworkTraceType::Ethernet => 5,
                    NetworkTraceType::SomeIp => 6,
                    NetworkTraceType::Other(v) => v,
                },
            ),
            MessageType::Control(control) => (
                3,
                match control {
                    ControlType::Request => 1,
                    ControlType::Response => 2,
                    ControlType::Time => 3,
                    ControlType::Other(v) => v,
                },
            ),
            MessageType::Unknown { mstp, mtin } => (mstp, mtin),
        }
    }

    /// Category name as shown in viewer columns
    pub fn kind_name(&self) -> &'static str {
        match self {
            MessageType::Log(_) => "LOG",
            MessageType::AppTrace(_) => "APP_TRACE",
            MessageType::NetworkTrace(_) => "NW_TRACE",
            MessageType::Control(_) => "CONTROL",
            MessageType::Unknown { .. } => "UNKNOWN",
        }
    }

    /// Subtype name (log level, trace kind, bus or control direction)
    pub fn info_name(&self) -> String {
        let name = match self {
            MessageType::Log(level) => match level {
                LogLevel::Fatal => "FATAL",
                LogLevel::Error => "ERROR",
                LogLevel::Warn => "WARN",
                LogLevel::Info => "INFO",
                LogLevel::Debug => "DEBUG",
                LogLevel::Verbose => "VERBOSE",
                LogLevel::Other(v) => return v.to_string(),
            },
            MessageType::AppTrace(trace) => match trace {
                TraceType::Variable => "VARIABLE",
                TraceType::FunctionIn => "FUNCTION_IN",
                TraceType::FunctionOut => "FUNCTION_OUT",
                TraceType::State => "STATE",
                TraceType::Vfb => "VFB",
                TraceType::Other(v) => return v.to_string(),
            },
            MessageType::NetworkTrace(bus) => match bus {
                NetworkTraceType::Ipc => "IPC",
                NetworkTraceType::Can => "CAN",
                NetworkTraceType::FlexRay => "FLEXRAY",
                NetworkTraceType::Most => "MOST",
                NetworkTraceType::Ethernet => "ETHERNET",
                NetworkTraceType::SomeIp => "SOMEIP",
                NetworkTraceType::Other(v) => return v.to_string(),
            },
            MessageType::Control(control) => match control {
                ControlType::Request => "REQUEST",
                ControlType::Response => "RESPONSE",
                ControlType::Time => "TIME",
                ControlType::Other(v) => return v.to_string(),
            },
            MessageType::Unknown { mtin, .. } => return mtin.to_string(),
        };
        name.to_string()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind_name(), self.info_name())
    }
}

/// One decoded verbose-mode argument
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Argument {
    /// Variable name (present when the VARI type-info flag is set)
    pub name: Option<String>,
    /// Engineering unit (numeric and array arguments only)
    pub unit: Option<String>,
    pub value: ArgumentValue,
}

impl Argument {
    /// Create an unnamed argument
    pub fn new(value: ArgumentValue) -> Self {
        Self {
            name: None,
            unit: None,
            value,
        }
    }

    /// Builder method: attach a variable name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder method: attach a unit
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Value of a verbose argument, selected by its type-info word
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ArgumentValue {
    Bool(bool),
    Signed { bits: u8, value: i128 },
    Unsigned { bits: u8, value: u128 },
    Float32(f32),
    Float64(f64),
    /// Physical value of a fixed-point argument (`raw * quantization + offset`)
    FixedPoint(f64),
    String(String),
    Raw(Vec<u8>),
    TraceInfo(String),
    Array {
        dimensions: Vec<u16>,
        elements: Vec<ArgumentValue>,
    },
}

impl fmt::Display for ArgumentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentValue::Bool(v) => write!(f, "{}", if *v { "true" } else { "false" }),
            ArgumentValue::Signed { value, .. } => write!(f, "{}", value),
            ArgumentValue::Unsigned { value, .. } => write!(f, "{}", value),
            ArgumentValue::Float32(v) => write!(f, "{}", v),
            ArgumentValue::Float64(v) | ArgumentValue::FixedPoint(v) => write!(f, "{}", v),
            ArgumentValue::String(s) | ArgumentValue::TraceInfo(s) => write!(f, "{}", s),
            ArgumentValue::Raw(data) => write!(f, "{}", hex::encode(data)),
            ArgumentValue::Array { elements, .. } => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Decoded payload of one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Payload {
    /// Self-describing typed arguments
    Verbose { arguments: Vec<Argument> },
    /// Message ID plus opaque bytes, optionally resolved to text by an external resolver
    NonVerbose {
        message_id: u32,
        #[serde(serialize_with = "serialize_hex")]
        data: Vec<u8>,
        resolved: Option<String>,
    },
    /// Payload that failed to decode, kept only when configured to emit such frames
    Undecodable {
        #[serde(serialize_with = "serialize_hex")]
        data: Vec<u8>,
        reason: String,
    },
}

impl Payload {
    /// Render the payload as a display string
    pub fn render(&self) -> String {
        match self {
            Payload::Verbose { arguments } => arguments
                .iter()
                .map(|arg| arg.to_string())
                .collect::<Vec<_>>()
                .join(" "),
            Payload::NonVerbose {
                resolved: Some(text),
                ..
            } => text.clone(),
            Payload::NonVerbose {
                message_id, data, ..
            } => format!("MsgId={} [{}]", message_id, hex::encode(data)),
            Payload::Undecodable { data, reason } => fallback_text(data, reason),
        }
    }
}

/// Hex fallback rendering for a payload that could not be decoded
pub(crate) fn fallback_text(data: &[u8], reason: &str) -> String {
    format!("[{}] {}", reason, hex::encode(data))
}

fn serialize_hex<S: Serializer>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(data))
}

/// An assembled, immutable log message - the primary output of the decoder
///
/// Messages are only created by [`crate::assembler::MessageAssembler`]; all
/// fields are read through accessors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub(crate) index: u64,
    pub(crate) timestamp: String,
    pub(crate) reception_time: Option<Timestamp>,
    pub(crate) uptime: Option<u32>,
    pub(crate) ecu_id: String,
    pub(crate) app_id: String,
    pub(crate) context_id: String,
    pub(crate) session_id: Option<u32>,
    pub(crate) message_counter: u8,
    pub(crate) message_type: Option<MessageType>,
    pub(crate) payload: Payload,
    pub(crate) payload_text: String,
    pub(crate) source_file: String,
}

impl Message {
    /// Global index, strictly increasing across the ingested file set
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Display timestamp with millisecond precision
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Capture time from the storage header (if present)
    pub fn reception_time(&self) -> Option<Timestamp> {
        self.reception_time
    }

    /// Standard header timestamp in 0.1 ms units (if present)
    pub fn uptime(&self) -> Option<u32> {
        self.uptime
    }

    pub fn ecu_id(&self) -> &str {
        &self.ecu_id
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn session_id(&self) -> Option<u32> {
        self.session_id
    }

    pub fn message_counter(&self) -> u8 {
        self.message_counter
    }

    /// Classification from the extended header (None without one)
    pub fn message_type(&self) -> Option<MessageType> {
        self.message_type
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Rendered payload display string
    pub fn payload_text(&self) -> &str {
        &self.payload_text
    }

    /// File name of the capture this message came from
    pub fn source_file(&self) -> &str {
        &self.source_file
    }

    pub fn is_verbose(&self) -> bool {
        matches!(self.payload, Payload::Verbose { .. })
    }
}

/// Kinds of non-fatal problems recorded during ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosticKind {
    /// File could not be opened or decompressed; skipped entirely
    UnreadableFile,
    /// Read failed mid-file; frames decoded so far are kept
    ReadFailed,
    /// Frame dropped because its headers were invalid or truncated
    SkippedFrame,
    /// Frame dropped (or emitted as hex) because its payload failed to decode
    UndecodablePayload,
    /// Storage header capture time out of range; message kept with a fallback timestamp
    InvalidCaptureTime,
    /// No frame marker found within the resynchronization bound
    ResyncExhausted,
    /// Per-file frame limit reached; remaining frames abandoned
    FrameLimitReached,
    /// File abandoned or run cancelled on request
    Cancelled,
}

/// A per-file or per-frame ingestion diagnostic
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    /// File name the diagnostic refers to
    pub file: String,
    pub kind: DiagnosticKind,
    /// Byte offset of the offending frame within the (decompressed) stream
    pub offset: Option<u64>,
    pub detail: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{} @{}: {:?}: {}", self.file, offset, self.kind, self.detail),
            None => write!(f, "{}: {:?}: {}", self.file, self.kind, self.detail),
        }
    }
}

/// Errors that can occur during decoding
#[derive(Debug, thiserror::Error)]
pub enum DltError {
    #[error("Invalid frame header: {0}")]
    Header(#[from] HeaderError),

    #[error("Invalid payload: {0}")]
    Payload(#[from] PayloadError),

    #[error("Unreadable file {path:?}: {source}")]
    UnreadableFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid search pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid configuration value: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Frame-level header failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    #[error("truncated frame: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("unsupported protocol version {0}")]
    InvalidVersion(u8),

    #[error("declared length {0} is shorter than the standard header")]
    InvalidLength(u16),

    #[error("storage header marker missing")]
    MissingStorageHeader,
}

/// Payload-level decode failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("argument count mismatch: expected {expected}, decoded {decoded}, {trailing} trailing bytes")]
    ArgumentCountMismatch {
        expected: usize,
        decoded: usize,
        trailing: usize,
    },

    #[error("unsupported argument type info 0x{0:08X}")]
    UnsupportedType(u32),

    #[error("payload too short: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("{field} of {length} exceeds the encodable maximum {max}")]
    FieldTooLong {
        field: &'static str,
        length: usize,
        max: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id4_text() {
        let id = Id4::from_slice(b"EC\0\0");
        assert_eq!(id.to_string(), "EC");
        assert!(!id.is_empty());
        assert!(Id4::default().is_empty());
        assert_eq!(Id4::from_text("APPLICATION").to_string(), "APPL");
    }

    #[test]
    fn test_message_type_fields() {
        // MSIN 0x41: verbose, LOG, INFO
        let mt = MessageType::from_message_info(0x41);
        assert_eq!(mt, MessageType::Log(LogLevel::Info));
        assert_eq!(mt.to_fields(), (0, 4));
        assert_eq!(mt.to_string(), "LOG INFO");

        let control = MessageType::from_message_info(0x26);
        assert_eq!(control, MessageType::Control(ControlType::Response));
        assert_eq!(control.kind_name(), "CONTROL");

        let reserved = MessageType::from_message_info(0x1E);
        assert_eq!(reserved, MessageType::Unknown { mstp: 7, mtin: 1 });
    }

    #[test]
    fn test_argument_display() {
        assert_eq!(ArgumentValue::Bool(true).to_string(), "true");
        assert_eq!(ArgumentValue::Signed { bits: 32, value: -7 }.to_string(), "-7");
        assert_eq!(ArgumentValue::Raw(vec![0xde, 0xad]).to_string(), "dead");
        let array = ArgumentValue::Array {
            dimensions: vec![3],
            elements: vec![
                ArgumentValue::Unsigned { bits: 8, value: 1 },
                ArgumentValue::Unsigned { bits: 8, value: 2 },
                ArgumentValue::Unsigned { bits: 8, value: 3 },
            ],
        };
        assert_eq!(array.to_string(), "[1, 2, 3]");
    }

    #[test]
    fn test_payload_render() {
        let verbose = Payload::Verbose {
            arguments: vec![
                Argument::new(ArgumentValue::Bool(true)),
                Argument::new(ArgumentValue::Signed { bits: 32, value: -7 }),
            ],
        };
        assert_eq!(verbose.render(), "true -7");

        let non_verbose = Payload::NonVerbose {
            message_id: 0x1234,
            data: vec![0x01, 0xab],
            resolved: None,
        };
        assert_eq!(non_verbose.render(), "MsgId=4660 [01ab]");
    }
}
