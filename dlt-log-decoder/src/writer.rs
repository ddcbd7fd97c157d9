//! Frame writer
//!
//! Produces bit-exact DLT frames. Used to build capture fixtures and to check
//! that decoding reconstructs what was written.
//!
//! ```
//! use dlt_log_decoder::{Argument, ArgumentValue, FrameBuilder, LogLevel, MessageType};
//!
//! let frame = FrameBuilder::new()
//!     .storage_header(1_700_000_000, 0, "ECU1")
//!     .extended_header(MessageType::Log(LogLevel::Info), "APP", "CTX")
//!     .verbose(&[Argument::new(ArgumentValue::Bool(true))])
//!     .build()
//!     .unwrap();
//! assert_eq!(&frame[..4], b"DLT\x01");
//! ```

use crate::formats::header::{
    EXTENDED_HEADER_SIZE, HTYP_MSBF, HTYP_UEH, HTYP_VERSION_SHIFT, HTYP_WEID, HTYP_WSID,
    HTYP_WTMS, MSIN_VERB, STANDARD_HEADER_SIZE, STORAGE_HEADER_MARKER, SUPPORTED_VERSION,
};
use crate::payload::verbose::{
    type_length_code, SCOD_SHIFT, SCOD_UTF8, TYPE_ARAY, TYPE_BOOL, TYPE_FIXP, TYPE_FLOA,
    TYPE_RAWD, TYPE_SINT, TYPE_STRG, TYPE_TRAI, TYPE_UINT, TYPE_VARI,
};
use crate::types::{Argument, ArgumentValue, Endianness, Id4, LogLevel, MessageType, PayloadError};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

#[derive(Debug, Clone)]
enum PayloadSpec {
    Verbose(Vec<Argument>),
    NonVerbose { message_id: u32, data: Vec<u8> },
    Raw { verbose: bool, argument_count: u8, bytes: Vec<u8> },
}

/// Builder for a single frame
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    storage: Option<(u32, u32, Id4)>,
    message_counter: u8,
    endianness: Endianness,
    version: u8,
    ecu_id: Option<Id4>,
    session_id: Option<u32>,
    timestamp: Option<u32>,
    extended: Option<(MessageType, Id4, Id4)>,
    declared_length: Option<u16>,
    payload: PayloadSpec,
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self {
            storage: None,
            message_counter: 0,
            endianness: Endianness::Little,
            version: SUPPORTED_VERSION,
            ecu_id: None,
            session_id: None,
            timestamp: None,
            extended: None,
            declared_length: None,
            payload: PayloadSpec::Raw {
                verbose: false,
                argument_count: 0,
                bytes: Vec::new(),
            },
        }
    }

    pub fn storage_header(mut self, seconds: u32, microseconds: u32, ecu: &str) -> Self {
        self.storage = Some((seconds, microseconds, Id4::from_text(ecu)));
        self
    }

    pub fn message_counter(mut self, counter: u8) -> Self {
        self.message_counter = counter;
        self
    }

    /// Write the payload in big-endian order (sets MSBF)
    pub fn big_endian(mut self, big: bool) -> Self {
        self.endianness = if big {
            Endianness::Big
        } else {
            Endianness::Little
        };
        self
    }

    pub fn version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    pub fn ecu_id(mut self, ecu: &str) -> Self {
        self.ecu_id = Some(Id4::from_text(ecu));
        self
    }

    pub fn session_id(mut self, session: u32) -> Self {
        self.session_id = Some(session);
        self
    }

    /// Standard header timestamp in 0.1 ms units
    pub fn timestamp(mut self, deci_millis: u32) -> Self {
        self.timestamp = Some(deci_millis);
        self
    }

    pub fn extended_header(mut self, message_type: MessageType, app: &str, ctx: &str) -> Self {
        self.extended = Some((message_type, Id4::from_text(app), Id4::from_text(ctx)));
        self
    }

    /// Override LEN, e.g. to produce a frame that claims more bytes than it has
    pub fn declared_length(mut self, length: u16) -> Self {
        self.declared_length = Some(length);
        self
    }

    /// Verbose payload; adds a default extended header if none was set
    pub fn verbose(mut self, arguments: &[Argument]) -> Self {
        self.payload = PayloadSpec::Verbose(arguments.to_vec());
        self
    }

    pub fn non_verbose(mut self, message_id: u32, data: &[u8]) -> Self {
        self.payload = PayloadSpec::NonVerbose {
            message_id,
            data: data.to_vec(),
        };
        self
    }

    /// Arbitrary payload bytes with an explicit VERB flag and argument count
    pub fn raw_payload(mut self, verbose: bool, argument_count: u8, bytes: &[u8]) -> Self {
        self.payload = PayloadSpec::Raw {
            verbose,
            argument_count,
            bytes: bytes.to_vec(),
        };
        self
    }

    /// Serialize the frame
    ///
    /// Fails with [`PayloadError::FieldTooLong`] if a length or count does not
    /// fit its wire field. An explicit [`declared_length`](Self::declared_length)
    /// is written as given.
    pub fn build(&self) -> Result<Vec<u8>, PayloadError> {
        let (verbose, argument_count, payload) = match &self.payload {
            PayloadSpec::Verbose(arguments) => (
                true,
                u8::try_from(arguments.len())
                    .map_err(|_| too_long("argument count", arguments.len(), u8::MAX))?,
                encode_arguments(arguments, self.endianness)?,
            ),
            PayloadSpec::NonVerbose { message_id, data } => {
                let mut out = PayloadWriter::new(self.endianness);
                out.put_u32(*message_id);
                out.buf.extend_from_slice(data);
                (false, 0, out.buf)
            }
            PayloadSpec::Raw {
                verbose,
                argument_count,
                bytes,
            } => (*verbose, *argument_count, bytes.clone()),
        };

        let extended = match self.extended {
            Some(ext) => Some(ext),
            None if verbose => Some((
                MessageType::Log(LogLevel::Info),
                Id4::default(),
                Id4::default(),
            )),
            None => None,
        };

        let mut header_type = (self.version & 0x07) << HTYP_VERSION_SHIFT;
        if extended.is_some() {
            header_type |= HTYP_UEH;
        }
        if self.endianness == Endianness::Big {
            header_type |= HTYP_MSBF;
        }
        if self.ecu_id.is_some() {
            header_type |= HTYP_WEID;
        }
        if self.session_id.is_some() {
            header_type |= HTYP_WSID;
        }
        if self.timestamp.is_some() {
            header_type |= HTYP_WTMS;
        }

        let optional_len = 4 * [
            self.ecu_id.is_some(),
            self.session_id.is_some(),
            self.timestamp.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();
        let extended_len = if extended.is_some() {
            EXTENDED_HEADER_SIZE
        } else {
            0
        };
        let length = STANDARD_HEADER_SIZE + optional_len + extended_len + payload.len();
        let length = match self.declared_length {
            Some(declared) => declared,
            None => u16::try_from(length).map_err(|_| too_long("frame length", length, u16::MAX))?,
        };

        let mut frame = Vec::with_capacity(16 + length as usize);
        if let Some((seconds, microseconds, ecu)) = self.storage {
            let mut storage = [0u8; 16];
            storage[..4].copy_from_slice(&STORAGE_HEADER_MARKER);
            LittleEndian::write_u32(&mut storage[4..8], seconds);
            LittleEndian::write_u32(&mut storage[8..12], microseconds);
            storage[12..].copy_from_slice(&ecu.0);
            frame.extend_from_slice(&storage);
        }

        let mut field = [0u8; 4];
        frame.push(header_type);
        frame.push(self.message_counter);
        BigEndian::write_u16(&mut field[..2], length);
        frame.extend_from_slice(&field[..2]);
        if let Some(ecu) = self.ecu_id {
            frame.extend_from_slice(&ecu.0);
        }
        if let Some(session) = self.session_id {
            BigEndian::write_u32(&mut field, session);
            frame.extend_from_slice(&field);
        }
        if let Some(timestamp) = self.timestamp {
            BigEndian::write_u32(&mut field, timestamp);
            frame.extend_from_slice(&field);
        }
        if let Some((message_type, app, ctx)) = extended {
            let (mstp, mtin) = message_type.to_fields();
            let mut message_info = ((mstp & 0x07) << 1) | ((mtin & 0x0F) << 4);
            if verbose {
                message_info |= MSIN_VERB;
            }
            frame.push(message_info);
            frame.push(argument_count);
            frame.extend_from_slice(&app.0);
            frame.extend_from_slice(&ctx.0);
        }
        frame.extend_from_slice(&payload);
        Ok(frame)
    }
}

/// Encode verbose arguments in the given byte order
///
/// Array elements must all be scalars of the same type. Fixed point values are
/// written as 64-bit signed integers with unit quantization, so only their
/// rounded value survives.
pub fn encode_arguments(arguments: &[Argument], endianness: Endianness) -> Result<Vec<u8>, PayloadError> {
    let mut out = PayloadWriter::new(endianness);
    for argument in arguments {
        out.put_argument(argument)?;
    }
    Ok(out.buf)
}

struct PayloadWriter {
    buf: Vec<u8>,
    endianness: Endianness,
}

impl PayloadWriter {
    fn new(endianness: Endianness) -> Self {
        Self {
            buf: Vec::new(),
            endianness,
        }
    }

    fn put_u16(&mut self, value: u16) {
        let mut bytes = [0u8; 2];
        match self.endianness {
            Endianness::Little => LittleEndian::write_u16(&mut bytes, value),
            Endianness::Big => BigEndian::write_u16(&mut bytes, value),
        }
        self.buf.extend_from_slice(&bytes);
    }

    fn put_u32(&mut self, value: u32) {
        let mut bytes = [0u8; 4];
        match self.endianness {
            Endianness::Little => LittleEndian::write_u32(&mut bytes, value),
            Endianness::Big => BigEndian::write_u32(&mut bytes, value),
        }
        self.buf.extend_from_slice(&bytes);
    }

    fn put_u64(&mut self, value: u64) {
        let mut bytes = [0u8; 8];
        match self.endianness {
            Endianness::Little => LittleEndian::write_u64(&mut bytes, value),
            Endianness::Big => BigEndian::write_u64(&mut bytes, value),
        }
        self.buf.extend_from_slice(&bytes);
    }

    fn put_u128(&mut self, value: u128) {
        let mut bytes = [0u8; 16];
        match self.endianness {
            Endianness::Little => LittleEndian::write_u128(&mut bytes, value),
            Endianness::Big => BigEndian::write_u128(&mut bytes, value),
        }
        self.buf.extend_from_slice(&bytes);
    }

    fn put_unsigned(&mut self, bits: u8, value: u128) {
        match bits {
            8 => self.buf.push(value as u8),
            16 => self.put_u16(value as u16),
            32 => self.put_u32(value as u32),
            64 => self.put_u64(value as u64),
            _ => self.put_u128(value),
        }
    }

    /// u16 length prefix; lengths past the field width are rejected
    fn put_length(&mut self, field: &'static str, length: usize) -> Result<(), PayloadError> {
        let length = u16::try_from(length).map_err(|_| too_long(field, length, u16::MAX))?;
        self.put_u16(length);
        Ok(())
    }

    /// Length-prefixed text block (length counts the terminating NUL)
    fn put_len(&mut self, field: &'static str, text: &Option<String>) -> Result<(), PayloadError> {
        let len = text.as_ref().map_or(0, |t| latin1_bytes(t).len() + 1);
        self.put_length(field, len)
    }

    fn put_text(&mut self, text: &Option<String>) {
        if let Some(text) = text {
            self.buf.extend_from_slice(&latin1_bytes(text));
            self.buf.push(0);
        }
    }

    fn put_argument(&mut self, argument: &Argument) -> Result<(), PayloadError> {
        let named = argument.name.is_some() || argument.unit.is_some();
        let vari = if named { TYPE_VARI } else { 0 };

        match &argument.value {
            ArgumentValue::String(text) => {
                let (bytes, scod) = if text.chars().all(|c| (c as u32) <= 0xFF) {
                    (latin1_bytes(text), 0)
                } else {
                    (text.as_bytes().to_vec(), SCOD_UTF8 << SCOD_SHIFT)
                };
                self.put_u32(TYPE_STRG | vari | scod);
                self.put_length("string length", bytes.len() + 1)?;
                if named {
                    self.put_len("name length", &argument.name)?;
                    self.put_text(&argument.name);
                }
                self.buf.extend_from_slice(&bytes);
                self.buf.push(0);
            }
            ArgumentValue::Raw(data) => {
                self.put_u32(TYPE_RAWD | vari);
                self.put_length("raw length", data.len())?;
                if named {
                    self.put_len("name length", &argument.name)?;
                    self.put_text(&argument.name);
                }
                self.buf.extend_from_slice(data);
            }
            ArgumentValue::TraceInfo(text) => {
                let bytes = latin1_bytes(text);
                self.put_u32(TYPE_TRAI);
                self.put_length("trace info length", bytes.len())?;
                self.buf.extend_from_slice(&bytes);
            }
            ArgumentValue::Array {
                dimensions,
                elements,
            } => {
                let element_type = match elements.first() {
                    Some(first) => scalar_type(first).ok_or(PayloadError::UnsupportedType(TYPE_ARAY))?,
                    None => TYPE_UINT | type_length_code(8),
                };
                if elements.iter().any(|e| scalar_type(e) != Some(element_type)) {
                    return Err(PayloadError::UnsupportedType(TYPE_ARAY | element_type));
                }
                self.put_u32(TYPE_ARAY | element_type | vari);
                self.put_length("dimension count", dimensions.len())?;
                for dimension in dimensions {
                    self.put_u16(*dimension);
                }
                self.put_name_and_unit(argument, element_type)?;
                if element_type & TYPE_FIXP != 0 {
                    self.put_fixed_point_header();
                }
                for element in elements {
                    self.put_scalar(element);
                }
            }
            scalar => {
                let type_info = scalar_type(scalar).ok_or(PayloadError::UnsupportedType(0))?;
                self.put_u32(type_info | vari);
                self.put_name_and_unit(argument, type_info)?;
                if type_info & TYPE_FIXP != 0 {
                    self.put_fixed_point_header();
                }
                self.put_scalar(scalar);
            }
        }
        Ok(())
    }

    fn put_name_and_unit(&mut self, argument: &Argument, type_info: u32) -> Result<(), PayloadError> {
        if argument.name.is_none() && argument.unit.is_none() {
            return Ok(());
        }
        self.put_len("name length", &argument.name)?;
        if type_info & TYPE_BOOL != 0 {
            self.put_text(&argument.name);
            return Ok(());
        }
        self.put_len("unit length", &argument.unit)?;
        self.put_text(&argument.name);
        self.put_text(&argument.unit);
        Ok(())
    }

    fn put_fixed_point_header(&mut self) {
        self.put_u32(1.0f32.to_bits());
        self.put_u64(0);
    }

    fn put_scalar(&mut self, value: &ArgumentValue) {
        match *value {
            ArgumentValue::Bool(b) => self.buf.push(b as u8),
            ArgumentValue::Signed { bits, value } => self.put_unsigned(bits, value as u128),
            ArgumentValue::Unsigned { bits, value } => self.put_unsigned(bits, value),
            ArgumentValue::Float32(f) => self.put_u32(f.to_bits()),
            ArgumentValue::Float64(f) => self.put_u64(f.to_bits()),
            ArgumentValue::FixedPoint(f) => self.put_u64(f.round() as i64 as u64),
            _ => {}
        }
    }
}

/// Type-info bits of a scalar value, None for non-scalars
fn scalar_type(value: &ArgumentValue) -> Option<u32> {
    match *value {
        ArgumentValue::Bool(_) => Some(TYPE_BOOL | type_length_code(8)),
        ArgumentValue::Signed { bits, .. } => Some(TYPE_SINT | type_length_code(bits)),
        ArgumentValue::Unsigned { bits, .. } => Some(TYPE_UINT | type_length_code(bits)),
        ArgumentValue::Float32(_) => Some(TYPE_FLOA | type_length_code(32)),
        ArgumentValue::Float64(_) => Some(TYPE_FLOA | type_length_code(64)),
        ArgumentValue::FixedPoint(_) => Some(TYPE_SINT | TYPE_FIXP | type_length_code(64)),
        _ => None,
    }
}

fn too_long(field: &'static str, length: usize, max: impl Into<usize>) -> PayloadError {
    PayloadError::FieldTooLong {
        field,
        length,
        max: max.into(),
    }
}

/// Latin-1 bytes of `text`; characters outside the range become `?`
fn latin1_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(c as u32).unwrap_or(b'?'))
        .collect()
}
