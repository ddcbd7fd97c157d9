//! Verbose payload decoder
//!
//! A verbose payload is a sequence of arguments, each introduced by a 32-bit
//! type-info word that selects the value type, its width, and whether a
//! name/unit block precedes the value.
//!
//! ## Type-info word
//! - bits 0-3: TYLE (1=8, 2=16, 3=32, 4=64, 5=128 bit)
//! - bit 4 BOOL, 5 SINT, 6 UINT, 7 FLOA, 8 ARAY, 9 STRG, 10 RAWD
//! - bit 11 VARI (name/unit present), 12 FIXP, 13 TRAI, 14 STRU
//! - bits 15-17: SCOD string coding (0 ASCII, 1 UTF-8)

use super::PayloadReader;
use crate::config::StringEncoding;
use crate::types::{Argument, ArgumentValue, Endianness, PayloadError};

pub(crate) const TYPE_LENGTH_MASK: u32 = 0x0F;
pub(crate) const TYPE_BOOL: u32 = 0x10;
pub(crate) const TYPE_SINT: u32 = 0x20;
pub(crate) const TYPE_UINT: u32 = 0x40;
pub(crate) const TYPE_FLOA: u32 = 0x80;
pub(crate) const TYPE_ARAY: u32 = 0x100;
pub(crate) const TYPE_STRG: u32 = 0x200;
pub(crate) const TYPE_RAWD: u32 = 0x400;
pub(crate) const TYPE_VARI: u32 = 0x800;
pub(crate) const TYPE_FIXP: u32 = 0x1000;
pub(crate) const TYPE_TRAI: u32 = 0x2000;
pub(crate) const TYPE_STRU: u32 = 0x4000;
pub(crate) const SCOD_SHIFT: u32 = 15;
pub(crate) const SCOD_MASK: u32 = 0x07;
pub(crate) const SCOD_UTF8: u32 = 1;

const SCALAR_TYPES: u32 = TYPE_BOOL | TYPE_SINT | TYPE_UINT | TYPE_FLOA;

/// Bit width selected by the TYLE field
pub(crate) fn type_length_bits(type_info: u32) -> Option<u8> {
    match type_info & TYPE_LENGTH_MASK {
        1 => Some(8),
        2 => Some(16),
        3 => Some(32),
        4 => Some(64),
        5 => Some(128),
        _ => None,
    }
}

/// TYLE field value for a bit width
pub(crate) fn type_length_code(bits: u8) -> u32 {
    match bits {
        8 => 1,
        16 => 2,
        32 => 3,
        64 => 4,
        _ => 5,
    }
}

/// Decoder for verbose argument streams
#[derive(Debug, Clone, Copy, Default)]
pub struct VerboseDecoder {
    encoding: StringEncoding,
}

impl VerboseDecoder {
    pub fn new(encoding: StringEncoding) -> Self {
        Self { encoding }
    }

    /// Decode exactly `argument_count` arguments
    ///
    /// Fails with [`PayloadError::ArgumentCountMismatch`] if the bytes run out
    /// early or bytes remain after the last argument.
    pub fn decode(
        &self,
        payload: &[u8],
        argument_count: usize,
        endianness: Endianness,
    ) -> Result<Vec<Argument>, PayloadError> {
        let mut reader = PayloadReader::new(payload, endianness);
        let mut arguments = Vec::with_capacity(argument_count);

        for _ in 0..argument_count {
            match self.decode_argument(&mut reader) {
                Ok(argument) => arguments.push(argument),
                Err(PayloadError::Truncated { .. }) => {
                    return Err(PayloadError::ArgumentCountMismatch {
                        expected: argument_count,
                        decoded: arguments.len(),
                        trailing: 0,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        if reader.remaining() > 0 {
            return Err(PayloadError::ArgumentCountMismatch {
                expected: argument_count,
                decoded: arguments.len(),
                trailing: reader.remaining(),
            });
        }

        Ok(arguments)
    }

    fn decode_argument(&self, reader: &mut PayloadReader<'_>) -> Result<Argument, PayloadError> {
        let type_info = reader.read_u32()?;

        if type_info & TYPE_STRU != 0 {
            return Err(PayloadError::UnsupportedType(type_info));
        }
        if type_info & TYPE_ARAY != 0 {
            return self.decode_array(reader, type_info);
        }
        if type_info & TYPE_STRG != 0 {
            return self.decode_string(reader, type_info);
        }
        if type_info & TYPE_RAWD != 0 {
            return self.decode_raw(reader, type_info);
        }
        if type_info & TYPE_TRAI != 0 {
            let len = reader.read_u16()? as usize;
            let text = self.encoding.decode(reader.take(len)?);
            return Ok(Argument::new(ArgumentValue::TraceInfo(strip_nul(text))));
        }
        if type_info & SCALAR_TYPES != 0 {
            return self.decode_scalar(reader, type_info);
        }

        Err(PayloadError::UnsupportedType(type_info))
    }

    fn decode_scalar(
        &self,
        reader: &mut PayloadReader<'_>,
        type_info: u32,
    ) -> Result<Argument, PayloadError> {
        let (name, unit) = self.read_name_and_unit(reader, type_info)?;
        let fixed_point = self.read_fixed_point(reader, type_info)?;
        let value = read_scalar_value(reader, type_info, fixed_point)?;
        Ok(Argument { name, unit, value })
    }

    fn decode_string(
        &self,
        reader: &mut PayloadReader<'_>,
        type_info: u32,
    ) -> Result<Argument, PayloadError> {
        let len = reader.read_u16()? as usize;
        let name = self.read_name_only(reader, type_info)?;
        let bytes = reader.take(len)?;
        let text = if (type_info >> SCOD_SHIFT) & SCOD_MASK == SCOD_UTF8 {
            String::from_utf8_lossy(bytes).into_owned()
        } else {
            self.encoding.decode(bytes)
        };
        Ok(Argument {
            name,
            unit: None,
            value: ArgumentValue::String(strip_nul(text)),
        })
    }

    fn decode_raw(
        &self,
        reader: &mut PayloadReader<'_>,
        type_info: u32,
    ) -> Result<Argument, PayloadError> {
        let len = reader.read_u16()? as usize;
        let name = self.read_name_only(reader, type_info)?;
        let data = reader.take(len)?.to_vec();
        Ok(Argument {
            name,
            unit: None,
            value: ArgumentValue::Raw(data),
        })
    }

    fn decode_array(
        &self,
        reader: &mut PayloadReader<'_>,
        type_info: u32,
    ) -> Result<Argument, PayloadError> {
        if type_info & SCALAR_TYPES == 0 {
            return Err(PayloadError::UnsupportedType(type_info));
        }
        let element_bits = element_bits(type_info)?;

        let dimension_count = reader.read_u16()? as usize;
        let mut dimensions = Vec::with_capacity(dimension_count.min(reader.remaining() / 2));
        for _ in 0..dimension_count {
            dimensions.push(reader.read_u16()?);
        }
        let (name, unit) = self.read_name_and_unit(reader, type_info)?;
        let fixed_point = self.read_fixed_point(reader, type_info)?;

        let count = if dimensions.is_empty() {
            Some(0)
        } else {
            dimensions
                .iter()
                .try_fold(1usize, |acc, &d| acc.checked_mul(usize::from(d)))
        };
        let needed = count.and_then(|count| count.checked_mul(usize::from(element_bits / 8)));
        let count = match (count, needed) {
            (Some(count), Some(needed)) if needed <= reader.remaining() => count,
            (_, needed) => {
                return Err(PayloadError::Truncated {
                    needed: needed.unwrap_or(usize::MAX),
                    available: reader.remaining(),
                });
            }
        };

        let mut elements = Vec::with_capacity(count);
        for _ in 0..count {
            elements.push(read_scalar_value(reader, type_info, fixed_point)?);
        }

        Ok(Argument {
            name,
            unit,
            value: ArgumentValue::Array {
                dimensions,
                elements,
            },
        })
    }

    /// Name and unit block of numeric arguments (bools carry a name only)
    fn read_name_and_unit(
        &self,
        reader: &mut PayloadReader<'_>,
        type_info: u32,
    ) -> Result<(Option<String>, Option<String>), PayloadError> {
        if type_info & TYPE_VARI == 0 {
            return Ok((None, None));
        }
        if type_info & TYPE_BOOL != 0 {
            return Ok((self.read_name_only(reader, type_info)?, None));
        }
        let name_len = reader.read_u16()? as usize;
        let unit_len = reader.read_u16()? as usize;
        let name = self.read_text(reader, name_len)?;
        let unit = self.read_text(reader, unit_len)?;
        Ok((Some(name), Some(unit)))
    }

    fn read_name_only(
        &self,
        reader: &mut PayloadReader<'_>,
        type_info: u32,
    ) -> Result<Option<String>, PayloadError> {
        if type_info & TYPE_VARI == 0 {
            return Ok(None);
        }
        let name_len = reader.read_u16()? as usize;
        Ok(Some(self.read_text(reader, name_len)?))
    }

    fn read_text(&self, reader: &mut PayloadReader<'_>, len: usize) -> Result<String, PayloadError> {
        Ok(strip_nul(self.encoding.decode(reader.take(len)?)))
    }

    /// Quantization and offset of a fixed-point integer
    fn read_fixed_point(
        &self,
        reader: &mut PayloadReader<'_>,
        type_info: u32,
    ) -> Result<Option<(f64, f64)>, PayloadError> {
        if type_info & TYPE_FIXP == 0 || type_info & (TYPE_SINT | TYPE_UINT) == 0 {
            return Ok(None);
        }
        let bits = type_length_bits(type_info).ok_or(PayloadError::UnsupportedType(type_info))?;
        let quantization = reader.read_f32()? as f64;
        let offset = match bits {
            64 => reader.read_u64()? as i64 as f64,
            128 => reader.read_u128()? as i128 as f64,
            _ => reader.read_u32()? as i32 as f64,
        };
        Ok(Some((quantization, offset)))
    }
}

/// Width of one scalar value; BOOL without TYLE is one byte
fn element_bits(type_info: u32) -> Result<u8, PayloadError> {
    match type_length_bits(type_info) {
        Some(bits) => Ok(bits),
        None if type_info & TYPE_BOOL != 0 => Ok(8),
        None => Err(PayloadError::UnsupportedType(type_info)),
    }
}

fn read_scalar_value(
    reader: &mut PayloadReader<'_>,
    type_info: u32,
    fixed_point: Option<(f64, f64)>,
) -> Result<ArgumentValue, PayloadError> {
    let bits = element_bits(type_info)?;

    if type_info & TYPE_BOOL != 0 {
        return Ok(ArgumentValue::Bool(reader.read_unsigned(bits)? != 0));
    }
    if type_info & TYPE_FLOA != 0 {
        return match bits {
            32 => Ok(ArgumentValue::Float32(reader.read_f32()?)),
            64 => Ok(ArgumentValue::Float64(reader.read_f64()?)),
            _ => Err(PayloadError::UnsupportedType(type_info)),
        };
    }

    let value = if type_info & TYPE_SINT != 0 {
        let raw = reader.read_signed(bits)?;
        match fixed_point {
            Some((quantization, offset)) => {
                ArgumentValue::FixedPoint(raw as f64 * quantization + offset)
            }
            None => ArgumentValue::Signed { bits, value: raw },
        }
    } else {
        let raw = reader.read_unsigned(bits)?;
        match fixed_point {
            Some((quantization, offset)) => {
                ArgumentValue::FixedPoint(raw as f64 * quantization + offset)
            }
            None => ArgumentValue::Unsigned { bits, value: raw },
        }
    };
    Ok(value)
}

fn strip_nul(mut text: String) -> String {
    while text.ends_with('\0') {
        text.pop();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> VerboseDecoder {
        VerboseDecoder::new(StringEncoding::Latin1)
    }

    fn render(arguments: &[Argument]) -> String {
        arguments
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_bool_and_int32() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(TYPE_BOOL | 1).to_le_bytes());
        payload.push(1);
        payload.extend_from_slice(&(TYPE_SINT | 3).to_le_bytes());
        payload.extend_from_slice(&(-7i32).to_le_bytes());

        let args = decoder().decode(&payload, 2, Endianness::Little).unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].value, ArgumentValue::Bool(true));
        assert_eq!(args[1].value, ArgumentValue::Signed { bits: 32, value: -7 });
        assert_eq!(render(&args), "true -7");
    }

    #[test]
    fn test_bool_int_string_big_endian() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(TYPE_BOOL | 1).to_be_bytes());
        payload.push(0);
        payload.extend_from_slice(&(TYPE_SINT | 3).to_be_bytes());
        payload.extend_from_slice(&1234i32.to_be_bytes());
        payload.extend_from_slice(&TYPE_STRG.to_be_bytes());
        payload.extend_from_slice(&6u16.to_be_bytes());
        payload.extend_from_slice(b"hello\0");

        let args = decoder().decode(&payload, 3, Endianness::Big).unwrap();
        assert_eq!(args.len(), 3);
        assert_eq!(render(&args), "false 1234 hello");
    }

    #[test]
    fn test_named_numeric_with_unit() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(TYPE_UINT | TYPE_VARI | 2).to_le_bytes());
        payload.extend_from_slice(&5u16.to_le_bytes());
        payload.extend_from_slice(&4u16.to_le_bytes());
        payload.extend_from_slice(b"temp\0rpm\0");
        payload.extend_from_slice(&3000u16.to_le_bytes());

        let args = decoder().decode(&payload, 1, Endianness::Little).unwrap();
        assert_eq!(args[0].name.as_deref(), Some("temp"));
        assert_eq!(args[0].unit.as_deref(), Some("rpm"));
        assert_eq!(args[0].value, ArgumentValue::Unsigned { bits: 16, value: 3000 });
    }

    #[test]
    fn test_float_raw_and_array() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(TYPE_FLOA | 4).to_le_bytes());
        payload.extend_from_slice(&2.5f64.to_le_bytes());
        payload.extend_from_slice(&TYPE_RAWD.to_le_bytes());
        payload.extend_from_slice(&2u16.to_le_bytes());
        payload.extend_from_slice(&[0xCA, 0xFE]);
        payload.extend_from_slice(&(TYPE_ARAY | TYPE_UINT | 1).to_le_bytes());
        payload.extend_from_slice(&1u16.to_le_bytes());
        payload.extend_from_slice(&3u16.to_le_bytes());
        payload.extend_from_slice(&[7, 8, 9]);

        let args = decoder().decode(&payload, 3, Endianness::Little).unwrap();
        assert_eq!(render(&args), "2.5 cafe [7, 8, 9]");
    }

    #[test]
    fn test_fixed_point() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(TYPE_SINT | TYPE_FIXP | 2).to_le_bytes());
        payload.extend_from_slice(&0.5f32.to_le_bytes());
        payload.extend_from_slice(&10i32.to_le_bytes());
        payload.extend_from_slice(&(-4i16).to_le_bytes());

        let args = decoder().decode(&payload, 1, Endianness::Little).unwrap();
        assert_eq!(args[0].value, ArgumentValue::FixedPoint(8.0));
    }

    #[test]
    fn test_latin1_and_utf8_strings() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&TYPE_STRG.to_le_bytes());
        payload.extend_from_slice(&3u16.to_le_bytes());
        payload.extend_from_slice(&[0x43, 0xE9, 0x00]);
        payload.extend_from_slice(&(TYPE_STRG | (SCOD_UTF8 << SCOD_SHIFT)).to_le_bytes());
        payload.extend_from_slice(&3u16.to_le_bytes());
        payload.extend_from_slice("\u{e9}\0".as_bytes());

        let args = decoder().decode(&payload, 2, Endianness::Little).unwrap();
        assert_eq!(args[0].value, ArgumentValue::String("C\u{e9}".to_string()));
        assert_eq!(args[1].value, ArgumentValue::String("\u{e9}".to_string()));
    }

    #[test]
    fn test_count_mismatch_early_end() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(TYPE_UINT | 3).to_le_bytes());
        payload.extend_from_slice(&[1, 0]);

        let err = decoder().decode(&payload, 1, Endianness::Little).unwrap_err();
        assert_eq!(
            err,
            PayloadError::ArgumentCountMismatch {
                expected: 1,
                decoded: 0,
                trailing: 0
            }
        );
    }

    #[test]
    fn test_count_mismatch_trailing_bytes() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(TYPE_UINT | 1).to_le_bytes());
        payload.push(5);
        payload.extend_from_slice(&[0xEE, 0xEE]);

        let err = decoder().decode(&payload, 1, Endianness::Little).unwrap_err();
        assert_eq!(
            err,
            PayloadError::ArgumentCountMismatch {
                expected: 1,
                decoded: 1,
                trailing: 2
            }
        );
    }

    #[test]
    fn test_unsupported_types() {
        let payload = (TYPE_STRU).to_le_bytes();
        assert!(matches!(
            decoder().decode(&payload, 1, Endianness::Little),
            Err(PayloadError::UnsupportedType(_))
        ));

        let mut half_float = (TYPE_FLOA | 2).to_le_bytes().to_vec();
        half_float.extend_from_slice(&[0, 0]);
        assert!(matches!(
            decoder().decode(&half_float, 1, Endianness::Little),
            Err(PayloadError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_oversized_array_dimensions() {
        let mismatch = PayloadError::ArgumentCountMismatch {
            expected: 1,
            decoded: 0,
            trailing: 0,
        };

        // element count overflows usize
        let mut payload = Vec::new();
        payload.extend_from_slice(&(TYPE_ARAY | TYPE_UINT | 1).to_le_bytes());
        payload.extend_from_slice(&5u16.to_le_bytes());
        for _ in 0..5 {
            payload.extend_from_slice(&0xFFFFu16.to_le_bytes());
        }
        assert_eq!(payload.len(), 16);
        assert_eq!(
            decoder().decode(&payload, 1, Endianness::Little).unwrap_err(),
            mismatch
        );

        // fits in usize but not in the payload
        let mut payload = Vec::new();
        payload.extend_from_slice(&(TYPE_ARAY | TYPE_UINT | 4).to_le_bytes());
        payload.extend_from_slice(&2u16.to_le_bytes());
        payload.extend_from_slice(&0xFFFFu16.to_le_bytes());
        payload.extend_from_slice(&0xFFFFu16.to_le_bytes());
        payload.extend_from_slice(&[0; 8]);
        assert_eq!(
            decoder().decode(&payload, 1, Endianness::Little).unwrap_err(),
            mismatch
        );
    }
}
