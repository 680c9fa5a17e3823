// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::compression;
use crate::constant_pool::ConstantPool;
use crate::frame::FrameElement;
use crate::frame_sequence::FrameSequence;
use crate::leb128::LebReader;
use crate::writer::{MAGIC, VERSION};
use crate::{DecodeError, MltChunk, MltError};
use std::borrow::Cow;
use std::iter::FusedIterator;
use std::sync::Arc;
use tracing::debug;

/// Decodes back-to-back chunk records, as written by [crate::MltWriter].
///
/// The reader is an iterator of chunks. It stops cleanly at the end of the
/// input and stops for good after the first error; a corrupt record is
/// never partially returned.
#[derive(Clone, Debug)]
pub struct MltReader<'a> {
    reader: LebReader<'a>,
    failed: bool,
}

impl<'a> MltReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            reader: LebReader::new(data),
            failed: false,
        }
    }

    /// Creates a reader over a buffer handed over as a pointer and length.
    ///
    /// # Errors
    /// Fails with [MltError::InvalidArgument] if `data` is null.
    ///
    /// # Safety
    /// Unless null, `data` must point to `len` initialized bytes that stay
    /// valid and unmodified for `'a`.
    pub unsafe fn from_raw_parts(data: *const u8, len: usize) -> Result<Self, MltError> {
        if data.is_null() {
            return Err(MltError::invalid_argument("null chunk buffer"));
        }
        // SAFETY: non-null, and the caller upholds the rest.
        let data = unsafe { std::slice::from_raw_parts(data, len) };
        Ok(Self::new(data))
    }

    /// Decodes every chunk of a buffer handed over as a pointer and length.
    ///
    /// # Errors
    /// Fails with [MltError::InvalidArgument] if `data` is null, or with
    /// [MltError::Decode] on corrupt input.
    ///
    /// # Safety
    /// Same as [MltReader::from_raw_parts].
    pub unsafe fn read_chunks_raw(data: *const u8, len: usize) -> Result<Vec<MltChunk>, MltError> {
        // SAFETY: forwarded to the caller.
        unsafe { Self::from_raw_parts(data, len) }?.read_chunks()
    }

    /// Decodes every chunk. Empty input yields no chunks.
    pub fn read_chunks(self) -> Result<Vec<MltChunk>, MltError> {
        self.collect()
    }
}

impl Iterator for MltReader<'_> {
    type Item = Result<MltChunk, MltError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || !self.reader.has_more() {
            return None;
        }
        let offset = self.reader.position();
        match read_chunk(&mut self.reader) {
            Ok(chunk) => Some(Ok(chunk)),
            Err(err) => {
                debug!(offset, error = %err, "Rejected MLT chunk");
                self.failed = true;
                Some(Err(err.into()))
            }
        }
    }
}

impl FusedIterator for MltReader<'_> {}

/// Decodes every chunk in `data`. Empty input yields no chunks.
pub fn read_mlt_chunks(data: &[u8]) -> Result<Vec<MltChunk>, MltError> {
    MltReader::new(data).read_chunks()
}

/// Reads a packed count of entries that take at least one byte each, so a
/// count larger than the remaining input is corrupt.
fn read_count(reader: &mut LebReader) -> Result<usize, DecodeError> {
    let count = reader.read_len()?;
    if count > reader.remaining() {
        return Err(DecodeError::InvalidLength(count as i64));
    }
    Ok(count)
}

/// Pool indices on the wire are positions; the first entry is 0.
fn wire_index(offset: usize) -> i32 {
    // Counts come from a packed i32, so every offset fits.
    offset as i32
}

/// Reads one chunk record. On success the reader is positioned right after
/// the record.
pub fn read_chunk(reader: &mut LebReader) -> Result<MltChunk, DecodeError> {
    if reader.read_bytes(MAGIC.len())? != MAGIC {
        return Err(DecodeError::InvalidMagic);
    }
    let version = reader.read_byte()?;
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let size = reader.read_int_raw()?;
    let size = usize::try_from(size).map_err(|_| DecodeError::InvalidLength(size as i64))?;
    let mut body = LebReader::new(reader.read_bytes(size)?);

    let start_time = body.read_long_raw()?;
    let duration = body.read_long_raw()?;
    let thread_id = body.read_long_raw()?;
    let thread_name_ptr = body.read_int()?;

    let count = read_count(&mut body)?;
    let mut string_pool = ConstantPool::<Arc<str>>::new();
    for offset in 0..count {
        let string = body.read_compact_utf()?.ok_or(DecodeError::InvalidReference(
            Cow::Borrowed("string pool entry is null"),
        ))?;
        string_pool
            .insert(wire_index(offset), Some(Arc::from(string)))
            .map_err(DecodeError::from_argument)?;
    }
    if !string_pool.contains_index(thread_name_ptr) {
        return Err(DecodeError::InvalidReference(
            format!("thread name index {thread_name_ptr} is not in the string pool").into(),
        ));
    }

    let count = read_count(&mut body)?;
    let mut frame_pool = ConstantPool::<FrameElement>::new();
    for offset in 0..count {
        let owner_ptr = body.read_int()?;
        let method_ptr = body.read_int()?;
        let line = body.read_int()?;
        let frame = FrameElement::from_indices(owner_ptr, method_ptr, line, &string_pool)
            .map_err(DecodeError::from_argument)?;
        frame_pool
            .insert(wire_index(offset), Some(frame))
            .map_err(DecodeError::from_argument)?;
    }

    let count = read_count(&mut body)?;
    let mut stack_pool = ConstantPool::<FrameSequence>::new();
    let mut frame_ptrs = Vec::new();
    for offset in 0..count {
        let len = read_count(&mut body)?;
        frame_ptrs.clear();
        for _ in 0..len {
            frame_ptrs.push(body.read_int()?);
        }
        let subsequence = body.read_int()?.checked_sub(1).ok_or(
            DecodeError::InvalidReference(Cow::Borrowed("subsequence index out of range")),
        )?;
        let sequence =
            FrameSequence::from_indices(&frame_ptrs, subsequence, &frame_pool, &stack_pool)
                .map_err(DecodeError::from_argument)?;
        stack_pool
            .insert(wire_index(offset), Some(sequence))
            .map_err(DecodeError::from_argument)?;
    }

    let count = read_count(&mut body)?;
    let mut stack_ptrs = Vec::with_capacity(count);
    for _ in 0..count {
        stack_ptrs.push(body.read_int()?);
    }
    let sample_count =
        compression::validate(&stack_ptrs, |index| stack_pool.contains_index(index))?;

    if body.has_more() {
        return Err(DecodeError::LengthMismatch {
            declared: size,
            actual: body.position(),
        });
    }

    Ok(MltChunk::from_parts(
        start_time,
        duration,
        thread_id,
        thread_name_ptr,
        string_pool,
        frame_pool,
        stack_pool,
        stack_ptrs,
        sample_count,
    ))
}
