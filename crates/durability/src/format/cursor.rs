//! Bounds-checked cursors over byte slices.
//!
//! The writer never writes past the end of its slice; the reader never reads
//! past the end of its slice. Both report the position they stopped at so
//! callers can compare against a precomputed length.

use crate::codec::CodecError;

/// Sequential writer into a fixed-size slice.
#[derive(Debug)]
pub struct SliceWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> SliceWriter<'a> {
    /// Start writing at the beginning of `buf`.
    pub fn new(buf: &'a mut [u8]) -> Self {
        SliceWriter { buf, pos: 0 }
    }

    /// Bytes written so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left before the end of the slice.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Copy `bytes` at the current position.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        if bytes.len() > self.remaining() {
            return Err(CodecError::Overrun {
                needed: bytes.len(),
                remaining: self.remaining(),
            });
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    /// Write one byte.
    pub fn put_u8(&mut self, value: u8) -> Result<(), CodecError> {
        self.put_bytes(&[value])
    }

    /// Write a native-endian u32.
    pub fn put_u32(&mut self, value: u32) -> Result<(), CodecError> {
        self.put_bytes(&value.to_ne_bytes())
    }

    /// Write a native-endian i32.
    pub fn put_i32(&mut self, value: i32) -> Result<(), CodecError> {
        self.put_bytes(&value.to_ne_bytes())
    }

    /// Write a native-endian u64.
    pub fn put_u64(&mut self, value: u64) -> Result<(), CodecError> {
        self.put_bytes(&value.to_ne_bytes())
    }

    /// Write a native-endian i64.
    pub fn put_i64(&mut self, value: i64) -> Result<(), CodecError> {
        self.put_bytes(&value.to_ne_bytes())
    }

    /// Write a string followed by a NUL terminator.
    pub fn put_cstr(&mut self, s: &str) -> Result<(), CodecError> {
        if s.len() + 1 > self.remaining() {
            return Err(CodecError::Overrun {
                needed: s.len() + 1,
                remaining: self.remaining(),
            });
        }
        self.put_bytes(s.as_bytes())?;
        self.put_u8(0)
    }
}

/// Sequential reader over a slice.
#[derive(Debug, Clone)]
pub struct SliceReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    /// Start reading at the beginning of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        SliceReader { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Take the next `len` bytes.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if len > self.remaining() {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read one byte.
    pub fn get_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take_array::<1>()?[0])
    }

    /// Read a native-endian u32.
    pub fn get_u32(&mut self) -> Result<u32, CodecError> {
        self.take_array().map(u32::from_ne_bytes)
    }

    /// Read a native-endian i32.
    pub fn get_i32(&mut self) -> Result<i32, CodecError> {
        self.take_array().map(i32::from_ne_bytes)
    }

    /// Read a native-endian u64.
    pub fn get_u64(&mut self) -> Result<u64, CodecError> {
        self.take_array().map(u64::from_ne_bytes)
    }

    /// Read a native-endian i64.
    pub fn get_i64(&mut self) -> Result<i64, CodecError> {
        self.take_array().map(i64::from_ne_bytes)
    }

    /// Read 16 raw bytes.
    pub fn get_16(&mut self) -> Result<[u8; 16], CodecError> {
        self.take_array()
    }

    /// Read a NUL-terminated UTF-8 string, consuming the terminator.
    pub fn get_cstr(&mut self) -> Result<&'a str, CodecError> {
        let rest = &self.buf[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| {
                CodecError::Format(format!("unterminated string at offset {}", self.pos))
            })?;
        let bytes = self.take(end + 1)?;
        std::str::from_utf8(&bytes[..end])
            .map_err(|e| CodecError::Format(format!("invalid UTF-8 in string: {}", e)))
    }
}
