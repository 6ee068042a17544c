//! Primitive wire types.
//!
//! - short string: `u8` length, then that many bytes
//! - long string: `i32` length, then that many bytes
//! - hash: `i32` count, then `count` pairs of (short string, long string)
//!
//! An absent value is written with a zero length. On read, a zero length
//! yields `None`.

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Maximum encoded length of a short string.
pub const MAX_SHORT_STRING: usize = u8::MAX as usize;

/// Maximum encoded length of a long string.
pub const MAX_LONG_STRING: usize = i32::MAX as usize;

/// Smallest encoded size of one hash entry (1-byte name length + 4-byte value length).
const MIN_HASH_ENTRY_SIZE: usize = 5;

/// Big-endian frame writer.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: BytesMut,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.put_u16(value);
    }

    pub fn put_i16(&mut self, value: i16) {
        self.buf.put_i16(value);
    }

    pub fn put_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    pub fn put_i64(&mut self, value: i64) {
        self.buf.put_i64(value);
    }

    /// Writes a short string. Fails if the UTF-8 encoding exceeds 255 bytes.
    pub fn put_short_str(&mut self, value: Option<&str>) -> Result<(), ProtocolError> {
        self.put_short_bytes(value.map(str::as_bytes))
    }

    /// Writes raw bytes in short-string form.
    pub fn put_short_bytes(&mut self, value: Option<&[u8]>) -> Result<(), ProtocolError> {
        let bytes = value.unwrap_or_default();
        if bytes.len() > MAX_SHORT_STRING {
            return Err(ProtocolError::StringTooLong {
                len: bytes.len(),
                max: MAX_SHORT_STRING,
            });
        }
        self.buf.put_u8(bytes.len() as u8);
        self.buf.put_slice(bytes);
        Ok(())
    }

    /// Writes raw bytes in long-string form.
    pub fn put_long_bytes(&mut self, value: Option<&[u8]>) -> Result<(), ProtocolError> {
        let bytes = value.unwrap_or_default();
        if bytes.len() > MAX_LONG_STRING {
            return Err(ProtocolError::StringTooLong {
                len: bytes.len(),
                max: MAX_LONG_STRING,
            });
        }
        self.buf.put_i32(bytes.len() as i32);
        self.buf.put_slice(bytes);
        Ok(())
    }

    /// Writes a hash from ordered `(name, value)` entries.
    pub fn put_hash<'a, I>(&mut self, entries: I) -> Result<(), ProtocolError>
    where
        I: ExactSizeIterator<Item = (&'a str, &'a [u8])>,
    {
        let count = entries.len();
        if count > MAX_LONG_STRING {
            return Err(ProtocolError::StringTooLong {
                len: count,
                max: MAX_LONG_STRING,
            });
        }
        self.buf.put_i32(count as i32);
        for (name, value) in entries {
            self.put_short_str(Some(name))?;
            self.put_long_bytes(Some(value))?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consumes the writer, returning the encoded bytes.
    pub fn finish(self) -> BytesMut {
        self.buf
    }
}

/// Big-endian frame reader.
///
/// Every read checks the remaining length first and fails with
/// [`ProtocolError::MalformedFrame`] instead of reading past the end.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Returns the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn ensure(&self, needed: usize) -> Result<(), ProtocolError> {
        if self.buf.len() < needed {
            return Err(ProtocolError::MalformedFrame {
                needed,
                remaining: self.buf.len(),
            });
        }
        Ok(())
    }

    pub fn get_u8(&mut self) -> Result<u8, ProtocolError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn get_u16(&mut self) -> Result<u16, ProtocolError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn get_i16(&mut self) -> Result<i16, ProtocolError> {
        self.ensure(2)?;
        Ok(self.buf.get_i16())
    }

    pub fn get_i32(&mut self) -> Result<i32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    pub fn get_i64(&mut self) -> Result<i64, ProtocolError> {
        self.ensure(8)?;
        Ok(self.buf.get_i64())
    }

    /// Reads a short string. A zero length yields `None`.
    pub fn get_short_string(&mut self) -> Result<Option<String>, ProtocolError> {
        let len = self.get_u8()? as usize;
        if len == 0 {
            return Ok(None);
        }
        self.ensure(len)?;
        let value = std::str::from_utf8(&self.buf[..len])
            .map_err(|_| ProtocolError::InvalidUtf8)?
            .to_string();
        self.buf.advance(len);
        Ok(Some(value))
    }

    /// Reads a long string as raw bytes. A zero length yields `None`.
    pub fn get_long_bytes(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        let len = self.get_i32()?;
        if len < 0 {
            return Err(ProtocolError::NegativeLength(len));
        }
        let len = len as usize;
        if len == 0 {
            return Ok(None);
        }
        self.ensure(len)?;
        Ok(Some(self.buf.copy_to_bytes(len)))
    }

    /// Reads a hash. Entry order is preserved and duplicates are kept.
    pub fn get_hash(&mut self) -> Result<Vec<(String, Bytes)>, ProtocolError> {
        let count = self.get_i32()?;
        if count < 0 {
            return Err(ProtocolError::NegativeLength(count));
        }
        let count = count as usize;
        self.ensure(count.saturating_mul(MIN_HASH_ENTRY_SIZE))?;

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let name = self.get_short_string()?.unwrap_or_default();
            let value = self.get_long_bytes()?.unwrap_or_default();
            entries.push((name, value));
        }
        Ok(entries)
    }
}
