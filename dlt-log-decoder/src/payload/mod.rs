//! Payload decoding
//!
//! Selects the verbose or non-verbose decoder from the frame headers and
//! produces a [`Payload`]. Verbose payloads are self-describing argument
//! streams; non-verbose payloads are a message ID plus opaque bytes that an
//! optional [`MessageIdResolver`] may turn into text.

pub mod non_verbose;
pub mod verbose;

pub use non_verbose::{MessageIdResolver, NonVerboseDecoder, NonVerbosePayload};
pub use verbose::VerboseDecoder;

use crate::config::StringEncoding;
use crate::formats::FrameHeaders;
use crate::types::{Endianness, Payload, PayloadError};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::sync::Arc;

/// Decodes the payload region of a frame, branching on the verbose flag
#[derive(Clone)]
pub struct PayloadDecoder {
    verbose: VerboseDecoder,
    resolver: Option<Arc<dyn MessageIdResolver>>,
}

impl PayloadDecoder {
    pub fn new(encoding: StringEncoding, resolver: Option<Arc<dyn MessageIdResolver>>) -> Self {
        Self {
            verbose: VerboseDecoder::new(encoding),
            resolver,
        }
    }

    /// Decode the payload of `frame` as described by `headers`
    pub fn decode(&self, headers: &FrameHeaders, frame: &[u8]) -> Result<Payload, PayloadError> {
        let bytes = headers.payload(frame);
        let endianness = headers.payload_endianness();

        match headers.extended {
            Some(ext) if ext.is_verbose() => {
                let arguments =
                    self.verbose
                        .decode(bytes, ext.argument_count as usize, endianness)?;
                Ok(Payload::Verbose { arguments })
            }
            _ => {
                let decoded = NonVerboseDecoder::decode(bytes, endianness)?;
                let resolved = self
                    .resolver
                    .as_ref()
                    .and_then(|r| r.resolve(decoded.message_id, &decoded.data));
                Ok(Payload::NonVerbose {
                    message_id: decoded.message_id,
                    data: decoded.data,
                    resolved,
                })
            }
        }
    }
}

impl std::fmt::Debug for PayloadDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadDecoder")
            .field("verbose", &self.verbose)
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

/// Bounds-checked, endian-aware cursor over payload bytes
pub(crate) struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
    endianness: Endianness,
}

impl<'a> PayloadReader<'a> {
    pub(crate) fn new(data: &'a [u8], endianness: Endianness) -> Self {
        Self {
            data,
            pos: 0,
            endianness,
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], PayloadError> {
        if n > self.remaining() {
            return Err(PayloadError::Truncated {
                needed: self.pos + n,
                available: self.data.len(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let bytes = &self.data[self.pos..];
        self.pos = self.data.len();
        bytes
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, PayloadError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, PayloadError> {
        let bytes = self.take(2)?;
        Ok(match self.endianness {
            Endianness::Little => LittleEndian::read_u16(bytes),
            Endianness::Big => BigEndian::read_u16(bytes),
        })
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, PayloadError> {
        let bytes = self.take(4)?;
        Ok(match self.endianness {
            Endianness::Little => LittleEndian::read_u32(bytes),
            Endianness::Big => BigEndian::read_u32(bytes),
        })
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, PayloadError> {
        let bytes = self.take(8)?;
        Ok(match self.endianness {
            Endianness::Little => LittleEndian::read_u64(bytes),
            Endianness::Big => BigEndian::read_u64(bytes),
        })
    }

    pub(crate) fn read_u128(&mut self) -> Result<u128, PayloadError> {
        let bytes = self.take(16)?;
        Ok(match self.endianness {
            Endianness::Little => LittleEndian::read_u128(bytes),
            Endianness::Big => BigEndian::read_u128(bytes),
        })
    }

    pub(crate) fn read_f32(&mut self) -> Result<f32, PayloadError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64, PayloadError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Read an unsigned integer of the given bit width
    pub(crate) fn read_unsigned(&mut self, bits: u8) -> Result<u128, PayloadError> {
        Ok(match bits {
            8 => self.read_u8()? as u128,
            16 => self.read_u16()? as u128,
            32 => self.read_u32()? as u128,
            64 => self.read_u64()? as u128,
            _ => self.read_u128()?,
        })
    }

    /// Read a two's complement integer of the given bit width
    pub(crate) fn read_signed(&mut self, bits: u8) -> Result<i128, PayloadError> {
        Ok(match bits {
            8 => self.read_u8()? as i8 as i128,
            16 => self.read_u16()? as i16 as i128,
            32 => self.read_u32()? as i32 as i128,
            64 => self.read_u64()? as i64 as i128,
            _ => self.read_u128()? as i128,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::HeaderDecoder;

    #[test]
    fn test_reader_endianness() {
        let data = [0x12, 0x34, 0xFF, 0xFE];
        let mut le = PayloadReader::new(&data, Endianness::Little);
        assert_eq!(le.read_u16().unwrap(), 0x3412);
        assert_eq!(le.read_signed(16).unwrap(), -257);

        let mut be = PayloadReader::new(&data, Endianness::Big);
        assert_eq!(be.read_u32().unwrap(), 0x1234_FFFE);
        assert!(matches!(be.read_u8(), Err(PayloadError::Truncated { .. })));
    }

    #[test]
    fn test_non_verbose_branch_uses_resolver() {
        // standard header only (no extended header), payload: id 0x1234 LE + 2 bytes
        let frame = [0x20, 0, 0x00, 0x0A, 0x34, 0x12, 0x00, 0x00, 0xAA, 0xBB];
        let headers = HeaderDecoder::new(false).decode(&frame).unwrap();

        let plain = PayloadDecoder::new(StringEncoding::Latin1, None);
        let payload = plain.decode(&headers, &frame).unwrap();
        assert_eq!(payload.render(), "MsgId=4660 [aabb]");

        let resolver: Arc<dyn MessageIdResolver> = Arc::new(|id: u32, _: &[u8]| {
            (id == 0x1234).then(|| "EngineTempUpdate".to_string())
        });
        let resolving = PayloadDecoder::new(StringEncoding::Latin1, Some(resolver));
        let payload = resolving.decode(&headers, &frame).unwrap();
        assert_eq!(payload.render(), "EngineTempUpdate");
    }
}
