//! Encoding of [`PrimitiveMap`] and its values.
//!
//! A map is an `i32` entry count (`-1` for an absent map) followed by
//! `(utf key, tag, value)` triples. Lists are an `i32` count of tagged values.

use super::data_stream::{DataInput, DataOutput};
use crate::commands::{PrimitiveMap, PrimitiveValue};
use crate::error::Error;

pub const NULL_TYPE: u8 = 0;
pub const BOOLEAN_TYPE: u8 = 1;
pub const BYTE_TYPE: u8 = 2;
pub const CHAR_TYPE: u8 = 3;
pub const SHORT_TYPE: u8 = 4;
pub const INTEGER_TYPE: u8 = 5;
pub const LONG_TYPE: u8 = 6;
pub const DOUBLE_TYPE: u8 = 7;
pub const FLOAT_TYPE: u8 = 8;
pub const STRING_TYPE: u8 = 9;
pub const BYTE_ARRAY_TYPE: u8 = 10;
pub const MAP_TYPE: u8 = 11;
pub const LIST_TYPE: u8 = 12;
pub const BIG_STRING_TYPE: u8 = 13;

// Strings whose UTF-8 form exceeds this many bytes use BIG_STRING_TYPE.
const MAX_SHORT_STRING: usize = (i16::MAX / 4) as usize;

// Guards against hostile counts driving allocation before data is read.
const MAX_PREALLOCATION: usize = 1024;

/// Marshals a map, or an absent map as `-1`.
pub fn marshal_map(map: Option<&PrimitiveMap>, out: &mut DataOutput) -> Result<(), Error> {
    let Some(map) = map else {
        out.write_i32(-1);
        return Ok(());
    };
    out.write_i32(checked_len(map.len())?);
    for (key, value) in map {
        out.write_utf(key)?;
        marshal_value(value, out)?;
    }
    Ok(())
}

pub fn unmarshal_map(input: &mut DataInput<'_>) -> Result<Option<PrimitiveMap>, Error> {
    let count = input.read_i32()?;
    if count < 0 {
        return Ok(None);
    }
    let mut map = PrimitiveMap::new();
    for _ in 0..count {
        let key = input.read_utf()?;
        let value = unmarshal_value(input)?;
        map.insert(key, value);
    }
    Ok(Some(map))
}

/// Encodes a map into a standalone byte buffer, as carried by
/// `WireFormatInfo`.
pub fn marshal_map_to_bytes(map: &PrimitiveMap) -> Result<Vec<u8>, Error> {
    let mut out = DataOutput::new();
    marshal_map(Some(map), &mut out)?;
    Ok(out.into_inner().to_vec())
}

pub fn unmarshal_map_from_bytes(bytes: &[u8]) -> Result<PrimitiveMap, Error> {
    if bytes.is_empty() {
        return Ok(PrimitiveMap::new());
    }
    let mut input = DataInput::new(bytes);
    Ok(unmarshal_map(&mut input)?.unwrap_or_default())
}

fn marshal_value(value: &PrimitiveValue, out: &mut DataOutput) -> Result<(), Error> {
    match value {
        PrimitiveValue::Null => out.write_u8(NULL_TYPE),
        PrimitiveValue::Boolean(v) => {
            out.write_u8(BOOLEAN_TYPE);
            out.write_bool(*v);
        }
        PrimitiveValue::Byte(v) => {
            out.write_u8(BYTE_TYPE);
            out.write_i8(*v);
        }
        PrimitiveValue::Char(v) => {
            out.write_u8(CHAR_TYPE);
            out.write_u16(*v);
        }
        PrimitiveValue::Short(v) => {
            out.write_u8(SHORT_TYPE);
            out.write_i16(*v);
        }
        PrimitiveValue::Integer(v) => {
            out.write_u8(INTEGER_TYPE);
            out.write_i32(*v);
        }
        PrimitiveValue::Long(v) => {
            out.write_u8(LONG_TYPE);
            out.write_i64(*v);
        }
        PrimitiveValue::Double(v) => {
            out.write_u8(DOUBLE_TYPE);
            out.write_f64(*v);
        }
        PrimitiveValue::Float(v) => {
            out.write_u8(FLOAT_TYPE);
            out.write_f32(*v);
        }
        PrimitiveValue::String(v) if v.len() > MAX_SHORT_STRING => {
            out.write_u8(BIG_STRING_TYPE);
            out.write_i32(checked_len(v.len())?);
            out.write_bytes(v.as_bytes());
        }
        PrimitiveValue::String(v) => {
            out.write_u8(STRING_TYPE);
            out.write_utf(v)?;
        }
        PrimitiveValue::ByteArray(v) => {
            out.write_u8(BYTE_ARRAY_TYPE);
            out.write_i32(checked_len(v.len())?);
            out.write_bytes(v);
        }
        PrimitiveValue::Map(v) => {
            out.write_u8(MAP_TYPE);
            marshal_map(Some(v), out)?;
        }
        PrimitiveValue::List(v) => {
            out.write_u8(LIST_TYPE);
            out.write_i32(checked_len(v.len())?);
            for item in v {
                marshal_value(item, out)?;
            }
        }
    }
    Ok(())
}

fn unmarshal_value(input: &mut DataInput<'_>) -> Result<PrimitiveValue, Error> {
    let tag = input.read_u8()?;
    let value = match tag {
        NULL_TYPE => PrimitiveValue::Null,
        BOOLEAN_TYPE => PrimitiveValue::Boolean(input.read_bool()?),
        BYTE_TYPE => PrimitiveValue::Byte(input.read_i8()?),
        CHAR_TYPE => PrimitiveValue::Char(input.read_u16()?),
        SHORT_TYPE => PrimitiveValue::Short(input.read_i16()?),
        INTEGER_TYPE => PrimitiveValue::Integer(input.read_i32()?),
        LONG_TYPE => PrimitiveValue::Long(input.read_i64()?),
        DOUBLE_TYPE => PrimitiveValue::Double(input.read_f64()?),
        FLOAT_TYPE => PrimitiveValue::Float(input.read_f32()?),
        STRING_TYPE => PrimitiveValue::String(input.read_utf()?),
        BIG_STRING_TYPE => {
            let len = read_len(input)?;
            let bytes = input.read_bytes(len)?;
            let text = std::str::from_utf8(bytes)
                .map_err(|_| Error::malformed("big string is not valid UTF-8"))?;
            PrimitiveValue::String(text.to_string())
        }
        BYTE_ARRAY_TYPE => {
            let len = read_len(input)?;
            PrimitiveValue::ByteArray(input.read_bytes(len)?.to_vec())
        }
        MAP_TYPE => {
            PrimitiveValue::Map(input.nested(unmarshal_map)?.unwrap_or_default())
        }
        LIST_TYPE => input.nested(|input| {
            let count = read_len(input)?;
            let mut items = Vec::with_capacity(count.min(MAX_PREALLOCATION));
            for _ in 0..count {
                items.push(unmarshal_value(input)?);
            }
            Ok(PrimitiveValue::List(items))
        })?,
        other => return Err(Error::malformed(format!("unknown primitive type {other}"))),
    };
    Ok(value)
}

fn checked_len(len: usize) -> Result<i32, Error> {
    i32::try_from(len).map_err(|_| Error::InvalidArgument(format!("length {len} exceeds i32")))
}

fn read_len(input: &mut DataInput<'_>) -> Result<usize, Error> {
    let len = input.read_i32()?;
    usize::try_from(len).map_err(|_| Error::malformed(format!("negative length {len}")))
}
