//! Byte-level encoding and decoding for the module format
//!
//! All multi-byte integers in the wire format are big-endian.

use thiserror::Error;

/// Errors that can occur while reading a binary module stream
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Unexpected end of stream
    #[error("unexpected end of module stream at offset {0}")]
    UnexpectedEnd(usize),

    /// Invalid UTF-8 in a name field
    #[error("invalid UTF-8 string at offset {0}")]
    InvalidUtf8(usize),
}

/// Writer for the binary module format
#[derive(Debug, Default)]
pub struct BytecodeWriter {
    buffer: Vec<u8>,
}

impl BytecodeWriter {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Current offset (length of the stream so far)
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    /// Consume the writer and return the byte stream
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn emit_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Emit a length-prefixed name
    pub fn emit_string(&mut self, s: &str) {
        self.emit_u32(s.len() as u32);
        self.emit_bytes(s.as_bytes());
    }
}

/// Reader over a binary module stream
#[derive(Debug)]
pub struct BytecodeReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BytecodeReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Current byte position in the stream
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let byte = *self
            .data
            .get(self.position)
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;
        self.position += 1;
        Ok(byte)
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes(bytes.try_into().expect("4 bytes")))
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.read_bytes(8)?;
        Ok(u64::from_be_bytes(bytes.try_into().expect("8 bytes")))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .position
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;
        let slice = &self.data[self.position..end];
        self.position = end;
        Ok(slice)
    }

    /// Read a length-prefixed name
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u32()? as usize;
        let start = self.position;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8(start))
    }
}
