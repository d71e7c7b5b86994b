//! Big-endian primitive streams used by the marshallers.
//!
//! [`DataOutput`] appends to a growable buffer. [`DataInput`] reads from a
//! complete frame and refuses to read past its end, so a truncated payload
//! surfaces as [`Error::MalformedData`] instead of a partial structure.
//! Strings use Java's modified UTF-8 with a `u16` byte length.

use crate::error::Error;
use bytes::{Buf, BufMut, BytesMut};

const MAX_UTF_LENGTH: usize = u16::MAX as usize;

/// How deep nested structures, error causes and map or list values may go
/// before a frame is rejected.
pub const MAX_NESTING_DEPTH: usize = 100;

#[derive(Debug, Default)]
pub struct DataOutput {
    buf: BytesMut,
}

impl DataOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> BytesMut {
        self.buf
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buf.put_i8(value);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.put_i16(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.put_u16(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.put_i64(value);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.put_f32(value);
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.put_f64(value);
    }

    pub fn write_bytes(&mut self, value: &[u8]) {
        self.buf.put_slice(value);
    }

    /// Overwrites four bytes at `pos` with `value`; used to patch frame sizes.
    pub(crate) fn patch_i32(&mut self, pos: usize, value: i32) {
        self.buf[pos..pos + 4].copy_from_slice(&value.to_be_bytes());
    }

    /// Writes a `u16` length followed by the modified UTF-8 encoding of `value`.
    pub fn write_utf(&mut self, value: &str) -> Result<(), Error> {
        let encoded = encode_modified_utf8(value);
        if encoded.len() > MAX_UTF_LENGTH {
            return Err(Error::InvalidArgument(format!(
                "encoded string of {} bytes exceeds {MAX_UTF_LENGTH}",
                encoded.len()
            )));
        }
        self.write_u16(encoded.len() as u16);
        self.write_bytes(&encoded);
        Ok(())
    }
}

#[derive(Debug)]
pub struct DataInput<'a> {
    buf: &'a [u8],
    depth: usize,
}

impl<'a> DataInput<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, depth: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Runs `f` one nesting level deeper, failing once the frame nests past
    /// [`MAX_NESTING_DEPTH`].
    pub(crate) fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(Error::malformed(format!(
                "structure nested deeper than {MAX_NESTING_DEPTH} levels"
            )));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn ensure(&self, needed: usize) -> Result<(), Error> {
        if self.buf.len() < needed {
            return Err(Error::malformed(format!(
                "unexpected end of data: needed {needed} bytes, {} left",
                self.buf.len()
            )));
        }
        Ok(())
    }

    pub fn read_bool(&mut self) -> Result<bool, Error> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_i8(&mut self) -> Result<i8, Error> {
        self.ensure(1)?;
        Ok(self.buf.get_i8())
    }

    pub fn read_i16(&mut self) -> Result<i16, Error> {
        self.ensure(2)?;
        Ok(self.buf.get_i16())
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn read_i32(&mut self) -> Result<i32, Error> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    pub fn read_i64(&mut self) -> Result<i64, Error> {
        self.ensure(8)?;
        Ok(self.buf.get_i64())
    }

    pub fn read_f32(&mut self) -> Result<f32, Error> {
        self.ensure(4)?;
        Ok(self.buf.get_f32())
    }

    pub fn read_f64(&mut self) -> Result<f64, Error> {
        self.ensure(8)?;
        Ok(self.buf.get_f64())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], Error> {
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    pub fn read_utf(&mut self) -> Result<String, Error> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        decode_modified_utf8(bytes)
    }
}

// NUL and supplementary characters take the multi-byte forms: NUL as two
// bytes, surrogates as three bytes each.
pub(crate) fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

pub(crate) fn decode_modified_utf8(bytes: &[u8]) -> Result<String, Error> {
    let malformed = || Error::malformed("invalid modified UTF-8 sequence");
    let continuation = |byte: Option<&u8>| match byte {
        Some(b) if b & 0xC0 == 0x80 => Ok(u16::from(b & 0x3F)),
        _ => Err(malformed()),
    };

    let mut units = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter();
    while let Some(&byte) = iter.next() {
        let unit = if byte & 0x80 == 0 {
            u16::from(byte)
        } else if byte & 0xE0 == 0xC0 {
            (u16::from(byte & 0x1F) << 6) | continuation(iter.next())?
        } else if byte & 0xF0 == 0xE0 {
            let high = continuation(iter.next())?;
            let low = continuation(iter.next())?;
            (u16::from(byte & 0x0F) << 12) | (high << 6) | low
        } else {
            return Err(malformed());
        };
        units.push(unit);
    }
    String::from_utf16(&units).map_err(|_| malformed())
}
