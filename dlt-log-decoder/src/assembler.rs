//! Message assembly
//!
//! Combines decoded headers and payload into an immutable [`Message`] and
//! assigns the running index. Indices start at an externally supplied base so
//! that several files share one contiguous index space.

use crate::config::{DecoderConfig, HeaderPrecedence, StringEncoding};
use crate::formats::FrameHeaders;
use crate::types::{Id4, Message, Payload};

/// Assembles messages and hands out strictly sequential indices
#[derive(Debug, Clone)]
pub struct MessageAssembler {
    next_index: u64,
    encoding: StringEncoding,
    timestamp_precedence: HeaderPrecedence,
    ecu_precedence: HeaderPrecedence,
}

impl MessageAssembler {
    /// Create an assembler whose first message gets `index_base`
    pub fn new(index_base: u64, config: &DecoderConfig) -> Self {
        Self {
            next_index: index_base,
            encoding: config.encoding,
            timestamp_precedence: config.timestamp_precedence,
            ecu_precedence: config.ecu_precedence,
        }
    }

    /// Index the next assembled message will receive
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Build one message; the index is consumed and never handed out again
    pub fn assemble(&mut self, headers: &FrameHeaders, payload: Payload, file_id: &str) -> Message {
        let index = self.next_index;
        self.next_index += 1;

        let storage_ecu = headers
            .storage
            .map(|s| s.ecu_id)
            .filter(|id| !id.is_empty());
        let standard_ecu = headers.standard.ecu_id.filter(|id| !id.is_empty());
        let ecu = pick(self.ecu_precedence, storage_ecu, standard_ecu);

        let storage_time = headers
            .storage
            .and_then(|s| s.timestamp())
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string());
        let uptime = headers.standard.timestamp.map(format_uptime);
        let timestamp = pick(self.timestamp_precedence, storage_time, uptime)
            .unwrap_or_else(|| "0.000".to_string());

        let text = |id: Option<Id4>| id.map(|id| id.to_text(self.encoding)).unwrap_or_default();
        let payload_text = payload.render();

        Message {
            index,
            timestamp,
            reception_time: headers.storage.and_then(|s| s.timestamp()),
            uptime: headers.standard.timestamp,
            ecu_id: text(ecu),
            app_id: text(headers.extended.map(|e| e.application_id)),
            context_id: text(headers.extended.map(|e| e.context_id)),
            session_id: headers.standard.session_id,
            message_counter: headers.standard.message_counter,
            message_type: headers.extended.map(|e| e.message_type()),
            payload,
            payload_text,
            source_file: file_id.to_string(),
        }
    }
}

fn pick<T>(precedence: HeaderPrecedence, storage: Option<T>, standard: Option<T>) -> Option<T> {
    match precedence {
        HeaderPrecedence::StorageHeader => storage.or(standard),
        HeaderPrecedence::StandardHeader => standard.or(storage),
    }
}

/// Format a 0.1 ms uptime counter as seconds with millisecond precision
pub fn format_uptime(deci_millis: u32) -> String {
    format!("{}.{:03}", deci_millis / 10_000, (deci_millis % 10_000) / 10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{ExtendedHeader, StandardHeader, StorageHeader};
    use crate::types::{LogLevel, MessageType};

    fn headers(storage: bool, std_ecu: Option<&str>, uptime: Option<u32>) -> FrameHeaders {
        FrameHeaders {
            storage: storage.then(|| StorageHeader {
                seconds: 1_700_000_000,
                microseconds: 123_456,
                ecu_id: Id4::from_text("STOR"),
            }),
            standard: StandardHeader {
                header_type: 0x21,
                message_counter: 3,
                length: 14,
                ecu_id: std_ecu.map(Id4::from_text),
                session_id: None,
                timestamp: uptime,
            },
            extended: Some(ExtendedHeader {
                message_info: 0x31,
                argument_count: 0,
                application_id: Id4::from_text("APP"),
                context_id: Id4::from_text("CTX"),
            }),
            payload_offset: 14,
            payload_end: 14,
        }
    }

    fn empty_payload() -> Payload {
        Payload::Verbose {
            arguments: Vec::new(),
        }
    }

    #[test]
    fn test_sequential_indices_from_base() {
        let config = DecoderConfig::new();
        let mut assembler = MessageAssembler::new(40, &config);
        let h = headers(true, None, None);
        let first = assembler.assemble(&h, empty_payload(), "a.dlt");
        let second = assembler.assemble(&h, empty_payload(), "a.dlt");
        assert_eq!(first.index(), 40);
        assert_eq!(second.index(), 41);
        assert_eq!(assembler.next_index(), 42);
    }

    #[test]
    fn test_storage_timestamp_precedence() {
        let config = DecoderConfig::new();
        let mut assembler = MessageAssembler::new(0, &config);
        let msg = assembler.assemble(&headers(true, Some("STD"), Some(123_456)), empty_payload(), "a.dlt");
        assert_eq!(msg.timestamp(), "2023-11-14 22:13:20.123");
        assert_eq!(msg.ecu_id(), "STOR");
        assert_eq!(msg.app_id(), "APP");
        assert_eq!(msg.context_id(), "CTX");
        assert_eq!(msg.message_type(), Some(MessageType::Log(LogLevel::Warn)));
        assert_eq!(msg.uptime(), Some(123_456));
        assert_eq!(msg.source_file(), "a.dlt");
    }

    #[test]
    fn test_standard_header_precedence() {
        let config = DecoderConfig::new()
            .with_timestamp_precedence(HeaderPrecedence::StandardHeader)
            .with_ecu_precedence(HeaderPrecedence::StandardHeader);
        let mut assembler = MessageAssembler::new(0, &config);
        let msg = assembler.assemble(&headers(true, Some("STD"), Some(123_456)), empty_payload(), "a.dlt");
        assert_eq!(msg.timestamp(), "12.345");
        assert_eq!(msg.ecu_id(), "STD");
    }

    #[test]
    fn test_fallback_timestamp() {
        let config = DecoderConfig::new();
        let mut assembler = MessageAssembler::new(0, &config);
        let msg = assembler.assemble(&headers(false, Some("STD"), Some(98_765)), empty_payload(), "a.dlt");
        assert_eq!(msg.timestamp(), "9.876");
        assert_eq!(msg.ecu_id(), "STD");

        let msg = assembler.assemble(&headers(false, None, None), empty_payload(), "a.dlt");
        assert_eq!(msg.timestamp(), "0.000");
        assert_eq!(msg.ecu_id(), "");
    }
}
