//! Decoder configuration types
//!
//! This module defines the configuration needed by the decoder library:
//! string encoding, storage header policy, header precedence rules and the
//! bounds that keep work on corrupt captures finite.

use crate::types::DltError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Default refill size of the frame source buffer
pub const DEFAULT_READ_CHUNK_SIZE: usize = 64 * 1024;

/// Default bound on bytes scanned while resynchronizing after a corrupt frame
pub const DEFAULT_MAX_RESYNC_BYTES: usize = 1024 * 1024;

/// Character encoding for ASCII-coded string arguments and ID fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StringEncoding {
    /// ISO-8859-1: every byte maps to the code point of the same value
    #[default]
    Latin1,
    /// 7-bit ASCII; bytes above 0x7F become `?`
    Ascii,
    /// UTF-8 with U+FFFD substitution for invalid sequences
    Utf8,
}

impl StringEncoding {
    /// Decode bytes to text; never fails, substituting unrepresentable bytes
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            StringEncoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
            StringEncoding::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { '?' })
                .collect(),
            StringEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

impl FromStr for StringEncoding {
    type Err = DltError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "latin1" | "iso88591" => Ok(StringEncoding::Latin1),
            "ascii" => Ok(StringEncoding::Ascii),
            "utf8" => Ok(StringEncoding::Utf8),
            _ => Err(DltError::InvalidConfig(format!("unknown encoding: {}", s))),
        }
    }
}

/// Which header wins when both the storage header and the standard header carry a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderPrecedence {
    /// Prefer capture-time metadata from the storage header
    #[default]
    StorageHeader,
    /// Prefer fields the ECU put in the standard header
    StandardHeader,
}

/// Configuration for the decoder library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Encoding for ASCII-coded strings and ID fields
    #[serde(default)]
    pub encoding: StringEncoding,

    /// Reject frames that do not start with a storage header marker
    #[serde(default)]
    pub require_storage_header: bool,

    /// Source of the message timestamp when both headers carry one
    #[serde(default)]
    pub timestamp_precedence: HeaderPrecedence,

    /// Source of the ECU ID when both headers carry one
    #[serde(default)]
    pub ecu_precedence: HeaderPrecedence,

    /// Maximum bytes scanned for the next frame marker after a corrupt frame
    #[serde(default = "default_max_resync_bytes")]
    pub max_resync_bytes: usize,

    /// Buffered read size for the underlying stream
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,

    /// Emit frames with undecodable payloads as messages with a hex fallback
    #[serde(default)]
    pub emit_undecodable_frames: bool,

    /// Optional: abandon a file after this many frames
    #[serde(default)]
    pub max_frames_per_file: Option<usize>,

    /// Transparently decompress gzip captures
    #[serde(default = "default_true")]
    pub decompress_gzip: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_resync_bytes() -> usize {
    DEFAULT_MAX_RESYNC_BYTES
}

fn default_read_chunk_size() -> usize {
    DEFAULT_READ_CHUNK_SIZE
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            encoding: StringEncoding::default(),
            require_storage_header: false,
            timestamp_precedence: HeaderPrecedence::default(),
            ecu_precedence: HeaderPrecedence::default(),
            max_resync_bytes: DEFAULT_MAX_RESYNC_BYTES,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            emit_undecodable_frames: false,
            max_frames_per_file: None,
            decompress_gzip: true,
        }
    }
}

impl DecoderConfig {
    /// Create a new decoder configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the string encoding
    pub fn with_encoding(mut self, encoding: StringEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Builder method: require a storage header on every frame
    pub fn with_storage_header_required(mut self, required: bool) -> Self {
        self.require_storage_header = required;
        self
    }

    /// Builder method: set timestamp precedence
    pub fn with_timestamp_precedence(mut self, precedence: HeaderPrecedence) -> Self {
        self.timestamp_precedence = precedence;
        self
    }

    /// Builder method: set ECU ID precedence
    pub fn with_ecu_precedence(mut self, precedence: HeaderPrecedence) -> Self {
        self.ecu_precedence = precedence;
        self
    }

    /// Builder method: set the resynchronization scan bound
    pub fn with_max_resync_bytes(mut self, bytes: usize) -> Self {
        self.max_resync_bytes = bytes;
        self
    }

    /// Builder method: set the buffered read size
    pub fn with_read_chunk_size(mut self, bytes: usize) -> Self {
        self.read_chunk_size = bytes.max(1);
        self
    }

    /// Builder method: emit undecodable frames with a hex fallback payload
    pub fn with_undecodable_frames(mut self, enabled: bool) -> Self {
        self.emit_undecodable_frames = enabled;
        self
    }

    /// Builder method: bound the number of frames read per file
    pub fn with_max_frames_per_file(mut self, limit: usize) -> Self {
        self.max_frames_per_file = Some(limit);
        self
    }

    /// Builder method: enable or disable gzip detection
    pub fn with_gzip(mut self, enabled: bool) -> Self {
        self.decompress_gzip = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_config_builder() {
        let config = DecoderConfig::new()
            .with_encoding(StringEncoding::Ascii)
            .with_storage_header_required(true)
            .with_timestamp_precedence(HeaderPrecedence::StandardHeader)
            .with_max_resync_bytes(4096)
            .with_max_frames_per_file(10);

        assert_eq!(config.encoding, StringEncoding::Ascii);
        assert!(config.require_storage_header);
        assert_eq!(config.timestamp_precedence, HeaderPrecedence::StandardHeader);
        assert_eq!(config.ecu_precedence, HeaderPrecedence::StorageHeader);
        assert_eq!(config.max_resync_bytes, 4096);
        assert_eq!(config.max_frames_per_file, Some(10));
        assert!(config.decompress_gzip);
    }

    #[test]
    fn test_encoding_never_fails() {
        let bytes = [0x41, 0xE9, 0xFF, 0x00];
        assert_eq!(StringEncoding::Latin1.decode(&bytes), "A\u{e9}\u{ff}\0");
        assert_eq!(StringEncoding::Ascii.decode(&bytes), "A??\0");
        assert_eq!(StringEncoding::Utf8.decode(&bytes), "A\u{fffd}\u{fffd}\0");
    }

    #[test]
    fn test_encoding_from_str() {
        assert_eq!("latin-1".parse::<StringEncoding>().unwrap(), StringEncoding::Latin1);
        assert_eq!("UTF8".parse::<StringEncoding>().unwrap(), StringEncoding::Utf8);
        assert!("ebcdic".parse::<StringEncoding>().is_err());
    }
}
