// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::compression::{self, Expand};
use crate::constant_pool::{ConstantPool, FxIndexMap, NO_INDEX};
use crate::frame::{FrameElement, StackFrame};
use crate::frame_sequence::{FrameSequence, FramesFromLeaves};
use crate::{MltConfig, MltError};
use std::sync::Arc;

/// One thread's sampling window: a header, the constant pools, and the
/// run-length compressed stack pool index of every sample.
///
/// Chunks are immutable. Build one with [MltChunkBuilder] or read them with
/// [crate::MltReader].
#[derive(Clone, Debug)]
pub struct MltChunk {
    start_time: i64,
    duration: i64,
    thread_id: i64,
    thread_name_ptr: i32,
    string_pool: ConstantPool<Arc<str>>,
    frame_pool: ConstantPool<FrameElement>,
    stack_pool: ConstantPool<FrameSequence>,
    stack_ptrs: Vec<i32>,
    sample_count: u64,
}

impl MltChunk {
    /// Assembles a chunk from decoded parts. The caller has already checked
    /// that `thread_name_ptr` and every entry of `stack_ptrs` resolve.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        start_time: i64,
        duration: i64,
        thread_id: i64,
        thread_name_ptr: i32,
        string_pool: ConstantPool<Arc<str>>,
        frame_pool: ConstantPool<FrameElement>,
        stack_pool: ConstantPool<FrameSequence>,
        stack_ptrs: Vec<i32>,
        sample_count: u64,
    ) -> Self {
        Self {
            start_time,
            duration,
            thread_id,
            thread_name_ptr,
            string_pool,
            frame_pool,
            stack_pool,
            stack_ptrs,
            sample_count,
        }
    }

    /// Start of the sampling window, in epoch milliseconds.
    #[inline]
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// Length of the sampling window, in nanoseconds.
    #[inline]
    pub fn duration(&self) -> i64 {
        self.duration
    }

    #[inline]
    pub fn thread_id(&self) -> i64 {
        self.thread_id
    }

    pub fn thread_name(&self) -> &str {
        self.string_pool
            .get(self.thread_name_ptr)
            .map(|name| &**name)
            .unwrap_or_default()
    }

    #[inline]
    pub fn thread_name_ptr(&self) -> i32 {
        self.thread_name_ptr
    }

    pub fn string_pool(&self) -> &ConstantPool<Arc<str>> {
        &self.string_pool
    }

    pub fn frame_pool(&self) -> &ConstantPool<FrameElement> {
        &self.frame_pool
    }

    pub fn stack_pool(&self) -> &ConstantPool<FrameSequence> {
        &self.stack_pool
    }

    /// The stack pool indices of the samples, run-length compressed.
    pub fn compressed_stack_ptrs(&self) -> &[i32] {
        &self.stack_ptrs
    }

    /// The stack pool index of every sample, in sampling order.
    pub fn stack_ptrs(&self) -> Expand<'_> {
        compression::expand(&self.stack_ptrs)
    }

    #[inline]
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Looks up a stack by its stack pool index.
    pub fn stack(&self, index: i32) -> Option<Stack<'_>> {
        let sequence = self.stack_pool.get(index)?;
        Some(Stack {
            chunk: self,
            index,
            sequence,
        })
    }

    /// The stack of every sample, in sampling order.
    pub fn stacks(&self) -> impl Iterator<Item = Stack<'_>> + '_ {
        self.stack_ptrs().filter_map(|index| self.stack(index))
    }
}

/// Two chunks are equal when their headers match and they hold the same
/// sequence of stacks. How the pools happen to be laid out doesn't matter.
impl PartialEq for MltChunk {
    fn eq(&self, other: &Self) -> bool {
        self.start_time == other.start_time
            && self.duration == other.duration
            && self.thread_id == other.thread_id
            && self.sample_count == other.sample_count
            && self.thread_name() == other.thread_name()
            && self
                .stacks()
                .zip(other.stacks())
                .all(|(a, b)| a.frames_from_leaves().eq(b.frames_from_leaves()))
    }
}

impl Eq for MltChunk {}

/// A sampled call stack, borrowed from its chunk.
#[derive(Clone, Copy, Debug)]
pub struct Stack<'a> {
    chunk: &'a MltChunk,
    index: i32,
    sequence: &'a FrameSequence,
}

impl<'a> Stack<'a> {
    /// The stack pool index of the stack's leaf-most node.
    #[inline]
    pub fn index(&self) -> i32 {
        self.index
    }

    #[inline]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn frames_from_leaves(&self) -> FramesFromLeaves<'a> {
        self.sequence
            .frames_from_leaves(&self.chunk.frame_pool, &self.chunk.stack_pool)
    }

    pub fn frames_from_root(
        &self,
    ) -> impl DoubleEndedIterator<Item = &'a FrameElement> + ExactSizeIterator {
        self.sequence
            .frames_from_root(&self.chunk.frame_pool, &self.chunk.stack_pool)
    }
}

/// Builds a [MltChunk] one sample at a time.
///
/// A builder is meant to be owned by the thread sampling a single target
/// thread; it is not synchronized. [MltChunkBuilder::build] consumes it, so
/// nothing can be added to a finished chunk.
///
/// Stacks are kept in a trie keyed from the root: a new stack walks down the
/// nodes matching its root-side frames, splitting a node that only matches
/// in part, and only its remaining leaf-side frames become new nodes. Any
/// two stacks with a common root-side chain therefore share the node that
/// holds it.
#[derive(Debug)]
pub struct MltChunkBuilder {
    start_time: i64,
    thread_id: i64,
    thread_name_ptr: i32,
    frames_per_sequence: usize,
    string_pool: ConstantPool<Arc<str>>,
    frame_pool: ConstantPool<FrameElement>,
    nodes: Vec<TrieNode>,
    /// Maps a node's parent and root-most frame to the node.
    children: FxIndexMap<(i32, i32), i32>,
    stack_ptrs: Vec<i32>,
    // Scratch space reused across samples.
    frame_ptrs: Vec<i32>,
}

#[derive(Debug)]
struct TrieNode {
    /// Frame pool indices, root first.
    frames: Vec<i32>,
    parent: i32,
}

impl MltChunkBuilder {
    pub fn new(start_time: i64, thread_id: i64, thread_name: &str) -> Result<Self, MltError> {
        Self::with_config(start_time, thread_id, thread_name, &MltConfig::default())
    }

    /// Creates a builder. The thread name becomes string pool entry 0.
    pub fn with_config(
        start_time: i64,
        thread_id: i64,
        thread_name: &str,
        config: &MltConfig,
    ) -> Result<Self, MltError> {
        config.validate()?;
        let mut string_pool = ConstantPool::new();
        let thread_name_ptr = string_pool.get_or_insert(Arc::from(thread_name))?;
        Ok(Self {
            start_time,
            thread_id,
            thread_name_ptr,
            frames_per_sequence: config.frames_per_sequence,
            string_pool,
            frame_pool: ConstantPool::new(),
            nodes: Vec::new(),
            children: FxIndexMap::default(),
            stack_ptrs: Vec::new(),
            frame_ptrs: Vec::new(),
        })
    }

    /// Records a sample of the given stack, innermost frame first, and
    /// returns an index identifying the stack within this builder.
    ///
    /// [MltChunkBuilder::build] may renumber the stack pool so that every
    /// node follows its subsequence; the samples are renumbered with it.
    pub fn add_stack<'f, I, F>(&mut self, frames: I) -> Result<i32, MltError>
    where
        I: IntoIterator<Item = F>,
        F: Into<StackFrame<'f>>,
    {
        let index = self.intern_stack(frames)?;
        self.stack_ptrs.push(index);
        Ok(index)
    }

    /// Records another sample of a stack returned by
    /// [MltChunkBuilder::add_stack].
    pub fn add_stack_index(&mut self, index: i32) -> Result<(), MltError> {
        if index < 0 || index as usize >= self.nodes.len() {
            return Err(MltError::InvalidArgument(
                format!("stack index {index} is not in the stack pool").into(),
            ));
        }
        self.stack_ptrs.push(index);
        Ok(())
    }

    fn intern_stack<'f, I, F>(&mut self, frames: I) -> Result<i32, MltError>
    where
        I: IntoIterator<Item = F>,
        F: Into<StackFrame<'f>>,
    {
        let frames: Vec<StackFrame<'f>> = frames.into_iter().map(Into::into).collect();
        if frames.is_empty() {
            return Err(MltError::invalid_argument("a stack needs at least one frame"));
        }

        let mut ptrs = std::mem::take(&mut self.frame_ptrs);
        ptrs.clear();
        let result = self.intern_frames(&frames, &mut ptrs).and_then(|()| {
            ptrs.reverse();
            self.insert_root_first(&ptrs)
        });
        self.frame_ptrs = ptrs;
        result
    }

    fn intern_frames(
        &mut self,
        frames: &[StackFrame<'_>],
        ptrs: &mut Vec<i32>,
    ) -> Result<(), MltError> {
        for frame in frames {
            let element =
                FrameElement::new(frame.owner, frame.method, frame.line, &mut self.string_pool)?;
            ptrs.push(self.frame_pool.get_or_insert(element)?);
        }
        Ok(())
    }

    /// Finds or creates the node covering the whole stack, given as frame
    /// pool indices root first.
    fn insert_root_first(&mut self, ptrs: &[i32]) -> Result<i32, MltError> {
        let mut parent = NO_INDEX;
        let mut pos = 0;
        while let Some(&ptr) = ptrs.get(pos) {
            let Some(&child) = self.children.get(&(parent, ptr)) else {
                break;
            };
            let node = &self.nodes[child as usize];
            let matched = node
                .frames
                .iter()
                .zip(&ptrs[pos..])
                .take_while(|(a, b)| a == b)
                .count();
            pos += matched;
            if matched < node.frames.len() {
                parent = self.split(child, matched)?;
                break;
            }
            parent = child;
        }
        for block in ptrs[pos..].chunks(self.frames_per_sequence) {
            parent = self.push_node(block.to_vec(), parent)?;
        }
        Ok(parent)
    }

    fn next_node_index(&self) -> Result<i32, MltError> {
        i32::try_from(self.nodes.len()).map_err(|_| MltError::StorageFull)
    }

    fn push_node(&mut self, frames: Vec<i32>, parent: i32) -> Result<i32, MltError> {
        let index = self.next_node_index()?;
        if let Some(&root_most) = frames.first() {
            self.children.insert((parent, root_most), index);
        }
        self.nodes.push(TrieNode { frames, parent });
        Ok(index)
    }

    /// Moves the first `at` root-side frames of node `index` into a new
    /// parent node, and returns the parent's index. Node `index` still
    /// covers the same stack afterward.
    fn split(&mut self, index: i32, at: usize) -> Result<i32, MltError> {
        let upper = self.next_node_index()?;
        let node = &mut self.nodes[index as usize];
        let leaf_side = node.frames.split_off(at);
        let root_side = std::mem::replace(&mut node.frames, leaf_side);
        let parent = std::mem::replace(&mut node.parent, upper);
        let keys = root_side.first().copied().zip(node.frames.first().copied());
        if let Some((upper_key, lower_key)) = keys {
            self.children.insert((parent, upper_key), upper);
            self.children.insert((upper, lower_key), index);
        }
        self.nodes.push(TrieNode {
            frames: root_side,
            parent,
        });
        Ok(upper)
    }

    /// The number of samples recorded so far.
    pub fn sample_count(&self) -> usize {
        self.stack_ptrs.len()
    }

    /// Finishes the chunk with the duration of the sampling window, in
    /// nanoseconds.
    pub fn build(self, duration: i64) -> MltChunk {
        let renumbered = subsequences_first(&self.nodes);

        let mut order = vec![NO_INDEX; self.nodes.len()];
        for (old, new) in renumbered.iter().enumerate() {
            order[*new as usize] = old as i32;
        }
        let mut stack_pool = ConstantPool::new();
        for old in order {
            let node = &self.nodes[old as usize];
            let subsequence = match node.parent {
                NO_INDEX => NO_INDEX,
                parent => renumbered[parent as usize],
            };
            let frame_ptrs = node.frames.iter().rev().copied().collect();
            stack_pool.push_unique(FrameSequence::from_trusted(
                frame_ptrs,
                subsequence,
                &stack_pool,
            ));
        }

        let samples: Vec<i32> = self
            .stack_ptrs
            .iter()
            .map(|index| renumbered[*index as usize])
            .collect();
        MltChunk {
            start_time: self.start_time,
            duration,
            thread_id: self.thread_id,
            thread_name_ptr: self.thread_name_ptr,
            string_pool: self.string_pool,
            frame_pool: self.frame_pool,
            stack_pool,
            stack_ptrs: compression::compress(&samples),
            sample_count: samples.len() as u64,
        }
    }
}

/// Numbers the trie nodes so that each comes after its parent, keeping
/// creation order otherwise. Returns the new index of every node.
fn subsequences_first(nodes: &[TrieNode]) -> Vec<i32> {
    let mut renumbered = vec![NO_INDEX; nodes.len()];
    let mut next = 0;
    let mut pending = Vec::new();
    for start in 0..nodes.len() {
        let mut current = start as i32;
        while current != NO_INDEX && renumbered[current as usize] == NO_INDEX {
            pending.push(current);
            current = nodes[current as usize].parent;
        }
        while let Some(index) = pending.pop() {
            renumbered[index as usize] = next;
            next += 1;
        }
    }
    renumbered
}
