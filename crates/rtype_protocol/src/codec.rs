//! # Wire Codec
//!
//! Big-endian field readers and writers shared by the header and every
//! payload record.
//!
//! ## Design
//!
//! - Every multi-byte field is written in network byte order, never by
//!   reinterpreting memory
//! - Strings are fixed-capacity NUL-padded buffers so record sizes stay constant
//! - Reads are bounds-checked and fail with a frame error instead of panicking

use std::fmt;

use crate::error::{FrameError, ProtocolError, ProtocolResult};

/// Fixed-capacity, NUL-padded string field.
///
/// The content may fill all `N` bytes; in that case there is no terminator.
/// Decoding stops at the first NUL.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedString<const N: usize>([u8; N]);

impl<const N: usize> FixedString<N> {
    /// Capacity in bytes.
    pub const CAPACITY: usize = N;

    /// Empty (all-zero) string.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self([0u8; N])
    }

    /// Builds from text, truncating on a character boundary to fit `N` bytes.
    #[must_use]
    pub fn new(text: &str) -> Self {
        let mut end = text.len().min(N);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let mut bytes = [0u8; N];
        bytes[..end].copy_from_slice(&text.as_bytes()[..end]);
        Self(bytes)
    }

    /// Wraps raw wire bytes.
    #[inline]
    #[must_use]
    pub const fn from_raw(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    /// Raw wire bytes including padding.
    #[inline]
    #[must_use]
    pub const fn as_raw(&self) -> &[u8; N] {
        &self.0
    }

    /// Content length up to the first NUL.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.iter().position(|&b| b == 0).unwrap_or(N)
    }

    /// True when the first byte is NUL.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        N == 0 || self.0[0] == 0
    }

    /// Text content. Invalid UTF-8 from a peer is cut at the last valid byte.
    #[must_use]
    pub fn as_str(&self) -> &str {
        let content = &self.0[..self.len()];
        match std::str::from_utf8(content) {
            Ok(text) => text,
            Err(err) => std::str::from_utf8(&content[..err.valid_up_to()]).unwrap_or_default(),
        }
    }
}

impl<const N: usize> Default for FixedString<N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const N: usize> fmt::Debug for FixedString<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl<const N: usize> fmt::Display for FixedString<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<const N: usize> From<&str> for FixedString<N> {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// Growable big-endian writer.
#[derive(Debug, Default)]
pub struct WireWriter {
    buffer: Vec<u8>,
}

impl WireWriter {
    /// Creates a writer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True if nothing has been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Written bytes.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the writer.
    #[inline]
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Writes a u16 in big-endian format.
    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Writes a u32 in big-endian format.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Writes an i16 in big-endian format.
    #[inline]
    pub fn write_i16(&mut self, value: i16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Writes an i32 in big-endian format.
    #[inline]
    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Writes an f32 as its IEEE-754 bits in big-endian format.
    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    /// Writes a fixed-capacity string including its padding.
    #[inline]
    pub fn write_fixed<const N: usize>(&mut self, value: &FixedString<N>) {
        self.buffer.extend_from_slice(value.as_raw());
    }

    /// Writes raw bytes.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }
}

/// Bounds-checked big-endian reader over a borrowed buffer.
pub struct WireReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> WireReader<'a> {
    /// Creates a reader positioned at the start of `buffer`.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Bytes not yet consumed.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Current offset.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    fn take<const N: usize>(&mut self) -> ProtocolResult<[u8; N]> {
        let end = self.position + N;
        let slice = self.buffer.get(self.position..end).ok_or(ProtocolError::Frame(
            FrameError::BufferTooShort {
                needed: end,
                available: self.buffer.len(),
            },
        ))?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.position = end;
        Ok(out)
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> ProtocolResult<u8> {
        Ok(self.take::<1>()?[0])
    }

    /// Reads a big-endian u16.
    #[inline]
    pub fn read_u16(&mut self) -> ProtocolResult<u16> {
        self.take().map(u16::from_be_bytes)
    }

    /// Reads a big-endian u32.
    #[inline]
    pub fn read_u32(&mut self) -> ProtocolResult<u32> {
        self.take().map(u32::from_be_bytes)
    }

    /// Reads a big-endian i16.
    #[inline]
    pub fn read_i16(&mut self) -> ProtocolResult<i16> {
        self.take().map(i16::from_be_bytes)
    }

    /// Reads a big-endian i32.
    #[inline]
    pub fn read_i32(&mut self) -> ProtocolResult<i32> {
        self.take().map(i32::from_be_bytes)
    }

    /// Reads a big-endian IEEE-754 f32.
    #[inline]
    pub fn read_f32(&mut self) -> ProtocolResult<f32> {
        self.read_u32().map(f32::from_bits)
    }

    /// Reads a fixed-capacity string.
    #[inline]
    pub fn read_fixed<const N: usize>(&mut self) -> ProtocolResult<FixedString<N>> {
        self.take().map(FixedString::from_raw)
    }

    /// Reads a one-byte enumerated field.
    #[inline]
    pub fn read_enum<T: TryFrom<u8>>(&mut self, field: &'static str) -> ProtocolResult<T> {
        let raw = self.read_u8()?;
        T::try_from(raw).map_err(|_| ProtocolError::InvalidField {
            field,
            value: u32::from(raw),
        })
    }
}
