// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pool for reusing writer buffers to avoid an allocation per chunk.

use super::LebWriter;
use bytes::BytesMut;
use std::ops::{Deref, DerefMut};
use tracing::debug;

/// A bounded pool of writer buffers.
///
/// A buffer is either taken from the pool or freshly allocated with the
/// configured initial capacity. When returned, it is cleared and kept if
/// there is room, otherwise dropped.
#[derive(Debug)]
pub struct BufferPool {
    /// Capacity given to freshly allocated buffers.
    initial_capacity: usize,
    /// Maximum number of buffers to keep in the pool.
    max_buffers: usize,
    buffers: Vec<BytesMut>,
}

impl BufferPool {
    pub fn new(initial_capacity: usize, max_buffers: usize) -> Self {
        Self {
            initial_capacity,
            max_buffers,
            buffers: Vec::with_capacity(max_buffers),
        }
    }

    /// Gets a cleared buffer from the pool, or allocates a new one.
    pub fn get(&mut self) -> BytesMut {
        self.buffers
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.initial_capacity))
    }

    /// Returns a buffer to the pool for reuse.
    pub fn put(&mut self, mut buffer: BytesMut) {
        if self.buffers.len() < self.max_buffers {
            buffer.clear();
            self.buffers.push(buffer);
        } else {
            debug!(
                capacity = buffer.capacity(),
                "Buffer pool is full, dropping buffer"
            );
        }
    }

    /// Borrows a writer backed by a pooled buffer. The buffer goes back to
    /// the pool when the returned guard is dropped.
    pub fn writer(&mut self) -> PooledWriter<'_> {
        let writer = LebWriter::from_buffer(self.get());
        PooledWriter {
            pool: self,
            writer,
        }
    }

    /// Runs `code` against a pooled writer. The buffer is returned to the
    /// pool afterward, whatever `code` returns.
    pub fn with_writer<R>(&mut self, code: impl FnOnce(&mut LebWriter) -> R) -> R {
        let mut writer = self.writer();
        code(&mut *writer)
    }

    /// Drops every pooled buffer, releasing their memory.
    pub fn discard(&mut self) {
        if !self.buffers.is_empty() {
            debug!(count = self.buffers.len(), "Discarding pooled buffers");
        }
        self.buffers = Vec::new();
    }

    /// Returns the current number of buffers in the pool.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Returns the maximum number of buffers the pool keeps.
    pub fn max_buffers(&self) -> usize {
        self.max_buffers
    }
}

/// A [LebWriter] on loan from a [BufferPool].
pub struct PooledWriter<'a> {
    pool: &'a mut BufferPool,
    writer: LebWriter,
}

impl PooledWriter<'_> {
    /// Returns the buffer to the pool right away. Equivalent to dropping the
    /// guard.
    pub fn discard(self) {}
}

impl Deref for PooledWriter<'_> {
    type Target = LebWriter;

    fn deref(&self) -> &Self::Target {
        &self.writer
    }
}

impl DerefMut for PooledWriter<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.writer
    }
}

impl Drop for PooledWriter<'_> {
    fn drop(&mut self) {
        let writer = std::mem::take(&mut self.writer);
        self.pool.put(writer.into_buffer());
    }
}
