//! Non-verbose payload decoder
//!
//! A non-verbose payload is a 32-bit message ID followed by opaque bytes.
//! Turning those bytes into text needs an external definition (e.g. a FIBEX
//! database); that capability is injected as a [`MessageIdResolver`].

use super::PayloadReader;
use crate::types::{Endianness, PayloadError};

/// External capability resolving a non-verbose message to display text
///
/// Returning `None` falls back to the `MsgId=<id> [<hex>]` rendering.
pub trait MessageIdResolver: Send + Sync {
    fn resolve(&self, message_id: u32, payload: &[u8]) -> Option<String>;
}

impl<F> MessageIdResolver for F
where
    F: Fn(u32, &[u8]) -> Option<String> + Send + Sync,
{
    fn resolve(&self, message_id: u32, payload: &[u8]) -> Option<String> {
        self(message_id, payload)
    }
}

/// Message ID and raw bytes of a non-verbose frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonVerbosePayload {
    pub message_id: u32,
    pub data: Vec<u8>,
}

/// Non-verbose decoder - splits off the message ID
pub struct NonVerboseDecoder;

impl NonVerboseDecoder {
    pub fn decode(payload: &[u8], endianness: Endianness) -> Result<NonVerbosePayload, PayloadError> {
        let mut reader = PayloadReader::new(payload, endianness);
        let message_id = reader.read_u32()?;
        Ok(NonVerbosePayload {
            message_id,
            data: reader.rest().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_message_id() {
        let payload = [0x00, 0x00, 0x12, 0x34, 0x01, 0x02];
        let decoded = NonVerboseDecoder::decode(&payload, Endianness::Big).unwrap();
        assert_eq!(decoded.message_id, 0x1234);
        assert_eq!(decoded.data, vec![0x01, 0x02]);

        let decoded = NonVerboseDecoder::decode(&payload[..4], Endianness::Little).unwrap();
        assert_eq!(decoded.message_id, 0x3412_0000);
        assert!(decoded.data.is_empty());
    }

    #[test]
    fn test_payload_too_short() {
        let err = NonVerboseDecoder::decode(&[1, 2], Endianness::Little).unwrap_err();
        assert_eq!(
            err,
            PayloadError::Truncated {
                needed: 4,
                available: 2
            }
        );
    }
}
