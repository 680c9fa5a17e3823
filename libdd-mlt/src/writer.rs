// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::leb128::{BufferPool, LebWriter};
use crate::{MltChunk, MltConfig, MltError};
use tracing::trace;

/// Leading bytes of every chunk record.
pub const MAGIC: [u8; 3] = *b"MLT";

/// Version of the chunk record layout written by [MltWriter].
pub const VERSION: u8 = 1;

/// Serializes [MltChunk]s.
///
/// A chunk record is laid out as:
///
/// | Field | Encoding |
/// |---|---|
/// | magic `MLT`, version | 3 + 1 bytes |
/// | record size, counted after this field | raw i32 |
/// | start time (epoch ms), duration (ns), thread id | raw i64 each |
/// | thread name string index | packed |
/// | string pool: count, then compact UTF strings | packed |
/// | frame pool: count, then owner index, method index, line | packed |
/// | stack pool: count, then frame count, frame indices, subsequence + 1 | packed |
/// | samples: count, then compressed stack indices | packed |
///
/// Raw values are big-endian. The record size is written as a placeholder
/// and patched once the record is complete. A subsequence of 0 means the
/// sequence has none.
pub struct MltWriter {
    buffers: BufferPool,
}

impl Default for MltWriter {
    fn default() -> Self {
        Self::new(&MltConfig::default())
    }
}

impl MltWriter {
    pub fn new(config: &MltConfig) -> Self {
        Self {
            buffers: BufferPool::new(config.initial_buffer_capacity, config.max_pooled_buffers),
        }
    }

    /// Encodes the chunk into a new byte vector.
    pub fn write_chunk(&mut self, chunk: &MltChunk) -> Result<Vec<u8>, MltError> {
        self.write_chunk_with(chunk, <[u8]>::to_vec)
    }

    /// Encodes the chunk into a pooled buffer and lends the bytes to
    /// `consumer`. The slice is only valid during the call; copy it to keep
    /// it. The buffer goes back to the pool afterward, even on error.
    pub fn write_chunk_with<R>(
        &mut self,
        chunk: &MltChunk,
        consumer: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, MltError> {
        let mut writer = self.buffers.writer();
        encode_chunk(chunk, &mut writer)?;
        Ok(writer.export_with(consumer))
    }

    /// Encodes the chunks back to back into a new byte vector.
    pub fn write_chunks<'a>(
        &mut self,
        chunks: impl IntoIterator<Item = &'a MltChunk>,
    ) -> Result<Vec<u8>, MltError> {
        let mut writer = self.buffers.writer();
        for chunk in chunks {
            encode_chunk(chunk, &mut writer)?;
        }
        Ok(writer.export())
    }

    /// Releases the pooled buffers. The borrow checker keeps this from
    /// happening while a write is in flight.
    pub fn discard_buffers(&mut self) {
        self.buffers.discard();
    }
}

fn count(len: usize, what: &'static str) -> Result<i32, MltError> {
    i32::try_from(len).map_err(|_| {
        MltError::InvalidArgument(format!("{what} count {len} does not fit the format").into())
    })
}

/// Appends one chunk record to `writer`.
pub fn encode_chunk(chunk: &MltChunk, writer: &mut LebWriter) -> Result<(), MltError> {
    let record_start = writer.position();
    writer.write_bytes(&MAGIC).write_byte(VERSION);
    let size_offset = writer.position();
    writer.write_int_raw(0);
    let body_start = writer.position();

    writer
        .write_long_raw(chunk.start_time())
        .write_long_raw(chunk.duration())
        .write_long_raw(chunk.thread_id())
        .write_int(chunk.thread_name_ptr());

    let strings = chunk.string_pool();
    writer.write_int(count(strings.len(), "string")?);
    for (_, string) in strings.iter() {
        writer.write_compact_utf(Some(string));
    }

    let frames = chunk.frame_pool();
    writer.write_int(count(frames.len(), "frame")?);
    for (_, frame) in frames.iter() {
        writer
            .write_int(frame.owner_ptr())
            .write_int(frame.method_ptr())
            .write_int(frame.line());
    }

    let stacks = chunk.stack_pool();
    writer.write_int(count(stacks.len(), "stack")?);
    for (_, sequence) in stacks.iter() {
        let ptrs = sequence.frame_ptrs();
        writer.write_int(count(ptrs.len(), "sequence frame")?);
        for ptr in ptrs {
            writer.write_int(*ptr);
        }
        // Indices are never negative, so the shifted value can't overflow.
        writer.write_int(sequence.subsequence().map_or(0, |index| index + 1));
    }

    let samples = chunk.compressed_stack_ptrs();
    writer.write_int(count(samples.len(), "sample")?);
    for ptr in samples {
        writer.write_int(*ptr);
    }

    let size = writer.position() - body_start;
    let size = i32::try_from(size).map_err(|_| {
        MltError::InvalidArgument(format!("chunk of {size} bytes is too large").into())
    })?;
    writer.write_int_raw_at(size_offset, size)?;

    trace!(
        thread_id = chunk.thread_id(),
        samples = chunk.sample_count(),
        strings = strings.len(),
        frames = frames.len(),
        stacks = stacks.len(),
        bytes = writer.position() - record_start,
        "Encoded MLT chunk"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leb128::LebReader;
    use crate::MltChunkBuilder;

    #[test]
    fn header_layout() {
        let mut builder = MltChunkBuilder::new(0x0102, 7, "t").unwrap();
        builder.add_stack([("A", "main", 1)]).unwrap();
        let chunk = builder.build(3);

        let bytes = MltWriter::default().write_chunk(&chunk).unwrap();
        assert_eq!(&bytes[..4], b"MLT\x01");

        let mut reader = LebReader::new(&bytes[4..]);
        let size = reader.read_int_raw().unwrap();
        assert_eq!(size as usize, bytes.len() - 8);
        assert_eq!(reader.read_long_raw().unwrap(), 0x0102);
        assert_eq!(reader.read_long_raw().unwrap(), 3);
        assert_eq!(reader.read_long_raw().unwrap(), 7);
        assert_eq!(reader.read_int().unwrap(), 0);
        // "t", "A", "main"
        assert_eq!(reader.read_int().unwrap(), 3);
        assert_eq!(reader.read_compact_utf().unwrap(), Some("t"));
        assert_eq!(reader.read_compact_utf().unwrap(), Some("A"));
        assert_eq!(reader.read_compact_utf().unwrap(), Some("main"));
        // One frame: A.main:1
        assert_eq!(reader.read_int().unwrap(), 1);
        assert_eq!(reader.read_int().unwrap(), 1);
        assert_eq!(reader.read_int().unwrap(), 2);
        assert_eq!(reader.read_int().unwrap(), 1);
        // One stack of one frame without a subsequence.
        assert_eq!(reader.read_int().unwrap(), 1);
        assert_eq!(reader.read_int().unwrap(), 1);
        assert_eq!(reader.read_int().unwrap(), 0);
        assert_eq!(reader.read_int().unwrap(), 0);
        // One sample.
        assert_eq!(reader.read_int().unwrap(), 1);
        assert_eq!(reader.read_int().unwrap(), 0);
        assert!(!reader.has_more());
    }

    #[test]
    fn writing_is_reproducible() {
        let build = || {
            let mut builder = MltChunkBuilder::new(1, 2, "t").unwrap();
            builder.add_stack([("A", "main", 1), ("A", "m1", 2)]).unwrap();
            builder.add_stack([("B", "main", 1)]).unwrap();
            builder.build(3)
        };
        let mut writer = MltWriter::default();
        let first = writer.write_chunk(&build()).unwrap();
        let second = writer.write_chunk(&build()).unwrap();
        assert_eq!(first, second);

        let len = writer
            .write_chunk_with(&build(), |bytes| bytes.len())
            .unwrap();
        assert_eq!(len, first.len());

        let both = writer.write_chunks([&build(), &build()]).unwrap();
        assert_eq!(both.len(), 2 * first.len());
        writer.discard_buffers();
    }
}
