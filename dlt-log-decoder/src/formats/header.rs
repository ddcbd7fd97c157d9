//! DLT header decoding
//!
//! Parses the storage header, the standard header with its optional fields,
//! and the extended header from the bytes of one frame.
//!
//! ## Layout
//! - Storage header (16 bytes, little-endian): `DLT\x01`, seconds, microseconds, ECU ID
//! - Standard header (4 bytes, big-endian): HTYP, MCNT, LEN
//!   followed by optional ECU ID, session ID and timestamp selected by HTYP bits
//! - Extended header (10 bytes): MSIN, NOAR, APID, CTID
//!
//! Multi-byte header fields always use network byte order. The MSBF bit only
//! selects the byte order of the payload.

use crate::types::{Endianness, HeaderError, Id4, MessageType, Timestamp};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use chrono::DateTime;

/// Storage header marker ("DLT" followed by 0x01)
pub const STORAGE_HEADER_MARKER: [u8; 4] = *b"DLT\x01";
pub const STORAGE_HEADER_SIZE: usize = 16;
pub const STANDARD_HEADER_SIZE: usize = 4;
pub const EXTENDED_HEADER_SIZE: usize = 10;

/// The only protocol version this decoder understands
pub const SUPPORTED_VERSION: u8 = 1;

// HTYP bit-field
pub(crate) const HTYP_UEH: u8 = 0x01;
pub(crate) const HTYP_MSBF: u8 = 0x02;
pub(crate) const HTYP_WEID: u8 = 0x04;
pub(crate) const HTYP_WSID: u8 = 0x08;
pub(crate) const HTYP_WTMS: u8 = 0x10;
pub(crate) const HTYP_VERSION_SHIFT: u8 = 5;

// MSIN bit-field
pub(crate) const MSIN_VERB: u8 = 0x01;

/// Capture-time metadata prepended by the logging tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageHeader {
    pub seconds: u32,
    pub microseconds: u32,
    pub ecu_id: Id4,
}

impl StorageHeader {
    /// Parse a storage header; None if the marker does not match or bytes are missing
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < STORAGE_HEADER_SIZE || buf[..4] != STORAGE_HEADER_MARKER {
            return None;
        }
        Some(Self {
            seconds: LittleEndian::read_u32(&buf[4..8]),
            microseconds: LittleEndian::read_u32(&buf[8..12]),
            ecu_id: Id4::from_slice(&buf[12..16]),
        })
    }

    /// Capture time as UTC; None if the microsecond field is out of range
    pub fn timestamp(&self) -> Option<Timestamp> {
        if self.microseconds >= 1_000_000 {
            return None;
        }
        DateTime::from_timestamp(self.seconds as i64, self.microseconds * 1000)
    }
}

/// Standard header with its optional fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardHeader {
    /// Raw HTYP byte
    pub header_type: u8,
    pub message_counter: u8,
    /// Declared length of standard header + extended header + payload
    pub length: u16,
    pub ecu_id: Option<Id4>,
    pub session_id: Option<u32>,
    /// ECU uptime in 0.1 ms units
    pub timestamp: Option<u32>,
}

impl StandardHeader {
    pub fn version(&self) -> u8 {
        self.header_type >> HTYP_VERSION_SHIFT
    }

    pub fn has_extended_header(&self) -> bool {
        self.header_type & HTYP_UEH != 0
    }

    /// Byte order of payload fields
    pub fn payload_endianness(&self) -> Endianness {
        if self.header_type & HTYP_MSBF != 0 {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }
}

/// Extended header: message classification, argument count, application and context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedHeader {
    /// Raw MSIN byte
    pub message_info: u8,
    pub argument_count: u8,
    pub application_id: Id4,
    pub context_id: Id4,
}

impl ExtendedHeader {
    pub fn is_verbose(&self) -> bool {
        self.message_info & MSIN_VERB != 0
    }

    pub fn message_type(&self) -> MessageType {
        MessageType::from_message_info(self.message_info)
    }
}

/// All headers of one frame plus the payload location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeaders {
    pub storage: Option<StorageHeader>,
    pub standard: StandardHeader,
    pub extended: Option<ExtendedHeader>,
    /// Offset within the frame where payload bytes begin
    pub payload_offset: usize,
    /// Offset within the frame where the declared length ends
    pub payload_end: usize,
}

impl FrameHeaders {
    /// Payload is verbose only with an extended header whose VERB bit is set
    pub fn is_verbose(&self) -> bool {
        self.extended.map(|ext| ext.is_verbose()).unwrap_or(false)
    }

    pub fn payload_endianness(&self) -> Endianness {
        self.standard.payload_endianness()
    }

    /// Slice the payload region out of the frame these headers were decoded from
    pub fn payload<'a>(&self, frame: &'a [u8]) -> &'a [u8] {
        &frame[self.payload_offset..self.payload_end]
    }
}

/// Header decoder for one frame
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderDecoder {
    require_storage_header: bool,
}

impl HeaderDecoder {
    pub fn new(require_storage_header: bool) -> Self {
        Self {
            require_storage_header,
        }
    }

    /// Decode the headers of one frame
    ///
    /// Reads never go past the length declared in the standard header.
    pub fn decode(&self, frame: &[u8]) -> Result<FrameHeaders, HeaderError> {
        let storage = StorageHeader::parse(frame);
        if storage.is_none() && self.require_storage_header {
            return Err(HeaderError::MissingStorageHeader);
        }
        let base = if storage.is_some() {
            STORAGE_HEADER_SIZE
        } else {
            0
        };

        let std_bytes = &frame[base.min(frame.len())..];
        if std_bytes.len() < STANDARD_HEADER_SIZE {
            return Err(HeaderError::Truncated {
                needed: base + STANDARD_HEADER_SIZE,
                available: frame.len(),
            });
        }

        let header_type = std_bytes[0];
        let version = header_type >> HTYP_VERSION_SHIFT;
        if version != SUPPORTED_VERSION {
            return Err(HeaderError::InvalidVersion(version));
        }

        let length = BigEndian::read_u16(&std_bytes[2..4]);
        if (length as usize) < STANDARD_HEADER_SIZE {
            return Err(HeaderError::InvalidLength(length));
        }
        if length as usize > std_bytes.len() {
            return Err(HeaderError::Truncated {
                needed: base + length as usize,
                available: frame.len(),
            });
        }

        let mut fields = FieldCursor {
            region: &std_bytes[..length as usize],
            pos: STANDARD_HEADER_SIZE,
            base,
        };

        let ecu_id = if header_type & HTYP_WEID != 0 {
            Some(Id4::from_slice(fields.take(4)?))
        } else {
            None
        };
        let session_id = if header_type & HTYP_WSID != 0 {
            Some(BigEndian::read_u32(fields.take(4)?))
        } else {
            None
        };
        let timestamp = if header_type & HTYP_WTMS != 0 {
            Some(BigEndian::read_u32(fields.take(4)?))
        } else {
            None
        };

        let extended = if header_type & HTYP_UEH != 0 {
            let ext = fields.take(EXTENDED_HEADER_SIZE)?;
            Some(ExtendedHeader {
                message_info: ext[0],
                argument_count: ext[1],
                application_id: Id4::from_slice(&ext[2..6]),
                context_id: Id4::from_slice(&ext[6..10]),
            })
        } else {
            None
        };

        Ok(FrameHeaders {
            storage,
            standard: StandardHeader {
                header_type,
                message_counter: std_bytes[1],
                length,
                ecu_id,
                session_id,
                timestamp,
            },
            extended,
            payload_offset: base + fields.pos,
            payload_end: base + length as usize,
        })
    }
}

/// Bounded cursor over the declared standard-header region
struct FieldCursor<'a> {
    region: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> FieldCursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], HeaderError> {
        if self.pos + n > self.region.len() {
            return Err(HeaderError::Truncated {
                needed: self.base + self.pos + n,
                available: self.base + self.region.len(),
            });
        }
        let bytes = &self.region[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }
}
