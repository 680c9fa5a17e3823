// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::DecodeError;

/// Reads values written by [LebWriter] from a borrowed byte slice.
///
/// Reading past the end fails with [DecodeError::UnexpectedEof] and leaves
/// the position unchanged.
#[derive(Clone, Debug)]
pub struct LebReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> LebReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Moves the position back to the start of the data.
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) -> Result<(), DecodeError> {
        if pos > self.data.len() {
            return Err(DecodeError::UnexpectedEof {
                needed: pos,
                remaining: self.data.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// The total number of bytes, read or not.
    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[inline]
    pub fn has_more(&self) -> bool {
        self.pos < self.data.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(DecodeError::UnexpectedEof {
                needed: n,
                remaining,
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    /// Reads a packed value of at most `max_len` bytes. On failure the
    /// position is restored.
    fn read_packed(&mut self, max_len: usize) -> Result<u64, DecodeError> {
        let start = self.pos;
        let mut value = 0u64;
        for i in 0..max_len {
            let byte = match self.take(1) {
                Ok(bytes) => bytes[0],
                Err(err) => {
                    self.pos = start;
                    return Err(err);
                }
            };
            let bits = (byte & !EXT_BIT) as u64;
            let shift = 7 * i as u32;
            // The tenth byte of a u64 only has room for a single bit.
            if shift == 63 && bits > 1 {
                self.pos = start;
                return Err(DecodeError::VarintOverflow);
            }
            value |= bits << shift;
            if byte & EXT_BIT == 0 {
                return Ok(value);
            }
        }
        self.pos = start;
        Err(DecodeError::VarintOverflow)
    }

    fn read_packed_bounded(&mut self, max_len: usize, max: u64) -> Result<u64, DecodeError> {
        let start = self.pos;
        let value = self.read_packed(max_len)?;
        if value > max {
            self.pos = start;
            return Err(DecodeError::VarintOverflow);
        }
        Ok(value)
    }

    pub fn read_byte(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        self.take(len)
    }

    pub fn read_boolean(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_byte()? != 0)
    }

    pub fn read_char(&mut self) -> Result<char, DecodeError> {
        let start = self.pos;
        let scalar = self.read_packed_bounded(MAX_PACKED_INT_LEN, u32::MAX as u64)? as u32;
        char::from_u32(scalar).ok_or_else(|| {
            self.pos = start;
            DecodeError::InvalidUtf8
        })
    }

    pub fn read_short(&mut self) -> Result<i16, DecodeError> {
        Ok(self.read_packed_bounded(MAX_PACKED_SHORT_LEN, u16::MAX as u64)? as u16 as i16)
    }

    pub fn read_int(&mut self) -> Result<i32, DecodeError> {
        Ok(self.read_packed_bounded(MAX_PACKED_INT_LEN, u32::MAX as u64)? as u32 as i32)
    }

    pub fn read_long(&mut self) -> Result<i64, DecodeError> {
        Ok(self.read_packed(MAX_PACKED_LONG_LEN)? as i64)
    }

    pub fn read_short_raw(&mut self) -> Result<i16, DecodeError> {
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    pub fn read_int_raw(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn read_long_raw(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub fn read_float(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_be_bytes(self.take_array()?))
    }

    pub fn read_double(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_be_bytes(self.take_array()?))
    }

    /// Reads a packed int that must be a valid, non-negative length or count.
    pub fn read_len(&mut self) -> Result<usize, DecodeError> {
        let start = self.pos;
        let len = self.read_int()?;
        usize::try_from(len).map_err(|_| {
            self.pos = start;
            DecodeError::InvalidLength(len as i64)
        })
    }

    /// Reads a length-prefixed UTF-8 string without copying it.
    pub fn read_utf(&mut self) -> Result<&'a str, DecodeError> {
        let start = self.pos;
        let result = self
            .read_len()
            .and_then(|len| self.take(len))
            .and_then(|bytes| std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8));
        if result.is_err() {
            self.pos = start;
        }
        result
    }

    /// Mirrors [LebWriter::write_compact_utf].
    pub fn read_compact_utf(&mut self) -> Result<Option<&'a str>, DecodeError> {
        let start = self.pos;
        let result = match self.read_byte()? {
            COMPACT_UTF_NULL => Ok(None),
            COMPACT_UTF_EMPTY => Ok(Some("")),
            COMPACT_UTF_UTF8 => self.read_utf().map(Some),
            marker => Err(DecodeError::InvalidMarker(marker)),
        };
        if result.is_err() {
            self.pos = start;
        }
        result
    }
}
