// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::MltError;
use bytes::{BufMut, BytesMut};

/// Appends LEB128-packed and raw values to a growable buffer.
///
/// Every append method returns the writer for chaining. The `*_at` variants
/// write at a given offset, overwriting what is there, and return the
/// position right after the written data. They exist so fields can be
/// patched once their value is known; they may append at [`position`] but
/// cannot write past it.
///
/// [`position`]: LebWriter::position
#[derive(Debug, Default)]
pub struct LebWriter {
    buf: BytesMut,
}

impl LebWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Wraps an existing buffer, discarding its contents but keeping its
    /// allocation.
    pub fn from_buffer(mut buf: BytesMut) -> Self {
        buf.clear();
        Self { buf }
    }

    /// Gives back the underlying buffer, including the written data.
    pub fn into_buffer(self) -> BytesMut {
        self.buf
    }

    /// Discards any written data and sets the position to 0.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// The current writer position, which is also the number of bytes
    /// written.
    #[inline]
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    /// The number of bytes written adjusted by the number of bytes necessary
    /// to encode that count as a packed length prefix.
    pub fn length(&self) -> usize {
        adjust_length(self.position())
    }

    /// The number of bytes the writer can hold before reallocating.
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Copies the written data out.
    pub fn export(&self) -> Vec<u8> {
        self.buf.to_vec()
    }

    /// Lends the written data to `consumer`. The slice is only valid for the
    /// duration of the call.
    pub fn export_with<R>(&self, consumer: impl FnOnce(&[u8]) -> R) -> R {
        consumer(&self.buf)
    }

    #[inline]
    fn put_packed(&mut self, value: u64) -> &mut Self {
        let mut out = [0u8; MAX_PACKED_LONG_LEN];
        let n = encode_packed(value, &mut out);
        self.buf.put_slice(&out[..n]);
        self
    }

    fn put_at(&mut self, offset: usize, bytes: &[u8]) -> Result<usize, MltError> {
        let len = self.buf.len();
        if offset > len {
            return Err(MltError::InvalidArgument(
                format!("offset {offset} is past the writer position {len}").into(),
            ));
        }
        let end = offset + bytes.len();
        if end > len {
            self.buf.resize(end, 0);
        }
        self.buf[offset..end].copy_from_slice(bytes);
        Ok(end)
    }

    fn put_packed_at(&mut self, offset: usize, value: u64) -> Result<usize, MltError> {
        let mut out = [0u8; MAX_PACKED_LONG_LEN];
        let n = encode_packed(value, &mut out);
        self.put_at(offset, &out[..n])
    }

    pub fn write_byte(&mut self, data: u8) -> &mut Self {
        self.buf.put_u8(data);
        self
    }

    pub fn write_byte_at(&mut self, offset: usize, data: u8) -> Result<usize, MltError> {
        self.put_at(offset, &[data])
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buf.put_slice(data);
        self
    }

    pub fn write_bytes_at(&mut self, offset: usize, data: &[u8]) -> Result<usize, MltError> {
        self.put_at(offset, data)
    }

    pub fn write_boolean(&mut self, data: bool) -> &mut Self {
        self.write_byte(data as u8)
    }

    pub fn write_boolean_at(&mut self, offset: usize, data: bool) -> Result<usize, MltError> {
        self.put_at(offset, &[data as u8])
    }

    /// Writes the unicode scalar value of `data`, packed.
    pub fn write_char(&mut self, data: char) -> &mut Self {
        self.put_packed(data as u32 as u64)
    }

    pub fn write_char_at(&mut self, offset: usize, data: char) -> Result<usize, MltError> {
        self.put_packed_at(offset, data as u32 as u64)
    }

    pub fn write_short(&mut self, data: i16) -> &mut Self {
        self.put_packed(data as u16 as u64)
    }

    pub fn write_short_at(&mut self, offset: usize, data: i16) -> Result<usize, MltError> {
        self.put_packed_at(offset, data as u16 as u64)
    }

    pub fn write_int(&mut self, data: i32) -> &mut Self {
        self.put_packed(data as u32 as u64)
    }

    pub fn write_int_at(&mut self, offset: usize, data: i32) -> Result<usize, MltError> {
        self.put_packed_at(offset, data as u32 as u64)
    }

    pub fn write_long(&mut self, data: i64) -> &mut Self {
        self.put_packed(data as u64)
    }

    pub fn write_long_at(&mut self, offset: usize, data: i64) -> Result<usize, MltError> {
        self.put_packed_at(offset, data as u64)
    }

    pub fn write_short_raw(&mut self, data: i16) -> &mut Self {
        self.buf.put_i16(data);
        self
    }

    pub fn write_short_raw_at(&mut self, offset: usize, data: i16) -> Result<usize, MltError> {
        self.put_at(offset, &data.to_be_bytes())
    }

    pub fn write_int_raw(&mut self, data: i32) -> &mut Self {
        self.buf.put_i32(data);
        self
    }

    pub fn write_int_raw_at(&mut self, offset: usize, data: i32) -> Result<usize, MltError> {
        self.put_at(offset, &data.to_be_bytes())
    }

    pub fn write_long_raw(&mut self, data: i64) -> &mut Self {
        self.buf.put_i64(data);
        self
    }

    pub fn write_long_raw_at(&mut self, offset: usize, data: i64) -> Result<usize, MltError> {
        self.put_at(offset, &data.to_be_bytes())
    }

    pub fn write_float(&mut self, data: f32) -> &mut Self {
        self.buf.put_f32(data);
        self
    }

    pub fn write_float_at(&mut self, offset: usize, data: f32) -> Result<usize, MltError> {
        self.put_at(offset, &data.to_be_bytes())
    }

    pub fn write_double(&mut self, data: f64) -> &mut Self {
        self.buf.put_f64(data);
        self
    }

    pub fn write_double_at(&mut self, offset: usize, data: f64) -> Result<usize, MltError> {
        self.put_at(offset, &data.to_be_bytes())
    }

    /// Writes `data` as its UTF-8 bytes preceded by their packed length.
    pub fn write_utf(&mut self, data: &str) -> &mut Self {
        self.write_utf_bytes(data.as_bytes())
    }

    /// Like [LebWriter::write_utf] for already-encoded UTF-8.
    pub fn write_utf_bytes(&mut self, utf8: &[u8]) -> &mut Self {
        self.put_packed(utf8.len() as u64).write_bytes(utf8)
    }

    pub fn write_utf_at(&mut self, offset: usize, data: &str) -> Result<usize, MltError> {
        let offset = self.put_packed_at(offset, data.len() as u64)?;
        self.put_at(offset, data.as_bytes())
    }

    /// Writes a string with a leading marker byte: [COMPACT_UTF_NULL] for
    /// `None`, [COMPACT_UTF_EMPTY] for `""`, otherwise [COMPACT_UTF_UTF8]
    /// followed by the length-prefixed UTF-8 bytes.
    pub fn write_compact_utf(&mut self, data: Option<&str>) -> &mut Self {
        match data {
            None => self.write_byte(COMPACT_UTF_NULL),
            Some("") => self.write_byte(COMPACT_UTF_EMPTY),
            Some(s) => self.write_byte(COMPACT_UTF_UTF8).write_utf(s),
        }
    }

    pub fn write_compact_utf_at(
        &mut self,
        offset: usize,
        data: Option<&str>,
    ) -> Result<usize, MltError> {
        match data {
            None => self.put_at(offset, &[COMPACT_UTF_NULL]),
            Some("") => self.put_at(offset, &[COMPACT_UTF_EMPTY]),
            Some(s) => {
                let offset = self.put_at(offset, &[COMPACT_UTF_UTF8])?;
                self.write_utf_at(offset, s)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_int_bytes() {
        let mut writer = LebWriter::new();
        writer.write_int(0).write_int(127).write_int(128).write_int(300);
        assert_eq!(writer.as_slice(), &[0x00, 0x7F, 0x80, 0x01, 0xAC, 0x02]);

        writer.reset();
        writer.write_int(-1);
        assert_eq!(writer.as_slice(), &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
    }

    #[test]
    fn raw_values_are_big_endian() {
        let mut writer = LebWriter::new();
        writer
            .write_short_raw(0x0102)
            .write_int_raw(0x03040506)
            .write_long_raw(-2);
        assert_eq!(
            writer.as_slice(),
            &[1, 2, 3, 4, 5, 6, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE]
        );
    }

    #[test]
    fn patch_raw_prefix() {
        let mut writer = LebWriter::new();
        writer.write_int_raw(0);
        writer.write_utf("datadog");
        let len = writer.position() - 4;
        let pos = writer.write_int_raw_at(0, len as i32).unwrap();
        assert_eq!(pos, 4);
        assert_eq!(&writer.as_slice()[..4], &(len as i32).to_be_bytes());
        assert_eq!(writer.position(), 4 + 1 + 7);
    }

    #[test]
    fn offset_writes_append_at_position() {
        let mut writer = LebWriter::new();
        let pos = writer.write_long_at(0, 300).unwrap();
        assert_eq!(pos, 2);
        let pos = writer.write_compact_utf_at(pos, Some("a")).unwrap();
        assert_eq!(pos, 5);
        assert_eq!(writer.as_slice(), &[0xAC, 0x02, COMPACT_UTF_UTF8, 1, b'a']);
    }

    #[test]
    fn offset_writes_past_position_fail() {
        let mut writer = LebWriter::new();
        writer.write_byte(1);
        assert!(matches!(
            writer.write_int_raw_at(2, 5),
            Err(MltError::InvalidArgument(_))
        ));
        assert_eq!(writer.position(), 1);
    }

    #[test]
    fn compact_utf_markers() {
        let mut writer = LebWriter::new();
        writer
            .write_compact_utf(None)
            .write_compact_utf(Some(""))
            .write_compact_utf(Some("ab"));
        assert_eq!(
            writer.as_slice(),
            &[COMPACT_UTF_NULL, COMPACT_UTF_EMPTY, COMPACT_UTF_UTF8, 2, b'a', b'b']
        );
    }

    #[test]
    fn length_accounts_for_prefix() {
        let mut writer = LebWriter::new();
        assert_eq!(writer.length(), 1);
        writer.write_bytes(&[0u8; 200]);
        assert_eq!(writer.position(), 200);
        assert_eq!(writer.length(), 202);
    }

    #[test]
    fn from_buffer_discards_contents() {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_slice(b"stale");
        let writer = LebWriter::from_buffer(buf);
        assert_eq!(writer.position(), 0);
        assert!(writer.capacity() >= 64);
        assert_eq!(writer.export_with(|bytes| bytes.len()), 0);
    }
}
