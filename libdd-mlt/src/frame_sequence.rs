// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constant_pool::{ConstantPool, NO_INDEX};
use crate::frame::FrameElement;
use crate::MltError;

/// A node in the shared-suffix trie of call stacks.
///
/// The node holds a short run of frame pool indices, leaf first, and may
/// point at another node of the stack pool holding the rest of the stack
/// towards the root. Stacks that share a root-side tail point at the same
/// node instead of repeating its frames.
///
/// Nodes only refer to each other by stack pool index, and a subsequence
/// always has a smaller index than the nodes pointing to it, so chains are
/// finite.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct FrameSequence {
    frame_ptrs: Box<[i32]>,
    subsequence: i32,
    len: usize,
}

impl FrameSequence {
    /// Creates a node from `frames`, leaf first, interning each of them into
    /// `frame_pool`. `subsequence` must already be registered in
    /// `stack_pool`.
    ///
    /// The node isn't interned; pass it to [ConstantPool::get_or_insert] on
    /// `stack_pool` to get its index.
    pub fn new(
        frames: &[FrameElement],
        subsequence: Option<i32>,
        frame_pool: &mut ConstantPool<FrameElement>,
        stack_pool: &ConstantPool<FrameSequence>,
    ) -> Result<Self, MltError> {
        if frames.is_empty() {
            return Err(MltError::invalid_argument(
                "a frame sequence needs at least one frame",
            ));
        }
        let subsequence = subsequence.unwrap_or(NO_INDEX);
        let tail_len = Self::tail_len(subsequence, stack_pool)?;
        let frame_ptrs = frames
            .iter()
            .map(|frame| frame_pool.get_or_insert_with(frame, || frame.clone()))
            .collect::<Result<Box<[i32]>, _>>()?;
        Ok(Self {
            len: frame_ptrs.len() + tail_len,
            frame_ptrs,
            subsequence,
        })
    }

    /// Creates a node from raw indices, as found on the wire. Every frame
    /// index must be present in `frame_pool`, and `subsequence` must be
    /// [NO_INDEX] or present in `stack_pool`.
    ///
    /// Register the result with [ConstantPool::insert] at the index the
    /// wire format gave it.
    pub fn from_indices(
        frame_ptrs: &[i32],
        subsequence: i32,
        frame_pool: &ConstantPool<FrameElement>,
        stack_pool: &ConstantPool<FrameSequence>,
    ) -> Result<Self, MltError> {
        if frame_ptrs.is_empty() {
            return Err(MltError::invalid_argument(
                "a frame sequence needs at least one frame",
            ));
        }
        if let Some(ptr) = frame_ptrs.iter().find(|ptr| !frame_pool.contains_index(**ptr)) {
            return Err(MltError::InvalidArgument(
                format!("frame index {ptr} is not in the frame pool").into(),
            ));
        }
        let tail_len = Self::tail_len(subsequence, stack_pool)?;
        Ok(Self {
            frame_ptrs: frame_ptrs.into(),
            subsequence,
            len: frame_ptrs.len() + tail_len,
        })
    }

    /// Creates a node from parts the caller already checked: `frame_ptrs`
    /// is non-empty and resolves in the frame pool, and `subsequence` is
    /// [NO_INDEX] or present in `stack_pool`.
    pub(crate) fn from_trusted(
        frame_ptrs: Box<[i32]>,
        subsequence: i32,
        stack_pool: &ConstantPool<FrameSequence>,
    ) -> Self {
        let tail_len = stack_pool.get(subsequence).map_or(0, |tail| tail.len);
        Self {
            len: frame_ptrs.len() + tail_len,
            frame_ptrs,
            subsequence,
        }
    }

    fn tail_len(subsequence: i32, stack_pool: &ConstantPool<FrameSequence>) -> Result<usize, MltError> {
        if subsequence == NO_INDEX {
            return Ok(0);
        }
        match stack_pool.get(subsequence) {
            Some(tail) => Ok(tail.len),
            None => Err(MltError::InvalidArgument(
                format!("subsequence index {subsequence} is not in the stack pool").into(),
            )),
        }
    }

    /// The frame pool indices of this node's own frames, leaf first.
    #[inline]
    pub fn frame_ptrs(&self) -> &[i32] {
        &self.frame_ptrs
    }

    #[inline]
    pub fn subsequence(&self) -> Option<i32> {
        (self.subsequence != NO_INDEX).then_some(self.subsequence)
    }

    /// The number of frames in this node plus all of its subsequences.
    #[inline]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Iterates over the whole stack, starting at this node's innermost
    /// frame and walking the subsequences towards the root.
    pub fn frames_from_leaves<'a>(
        &'a self,
        frame_pool: &'a ConstantPool<FrameElement>,
        stack_pool: &'a ConstantPool<FrameSequence>,
    ) -> FramesFromLeaves<'a> {
        FramesFromLeaves {
            current: Some(self),
            pos: 0,
            remaining: self.len,
            frame_pool,
            stack_pool,
        }
    }

    /// The whole stack, root first.
    pub fn frames_from_root<'a>(
        &'a self,
        frame_pool: &'a ConstantPool<FrameElement>,
        stack_pool: &'a ConstantPool<FrameSequence>,
    ) -> impl DoubleEndedIterator<Item = &'a FrameElement> + ExactSizeIterator {
        self.frames_from_leaves(frame_pool, stack_pool)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
    }
}

/// Iterator returned by [FrameSequence::frames_from_leaves]. Its length is
/// exact as long as it walks the pools the sequence was created against.
pub struct FramesFromLeaves<'a> {
    current: Option<&'a FrameSequence>,
    pos: usize,
    remaining: usize,
    frame_pool: &'a ConstantPool<FrameElement>,
    stack_pool: &'a ConstantPool<FrameSequence>,
}

impl<'a> Iterator for FramesFromLeaves<'a> {
    type Item = &'a FrameElement;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let sequence = self.current?;
            match sequence.frame_ptrs.get(self.pos) {
                Some(ptr) => {
                    self.pos += 1;
                    self.remaining = self.remaining.saturating_sub(1);
                    return self.frame_pool.get(*ptr);
                }
                None => {
                    self.current = sequence
                        .subsequence()
                        .and_then(|index| self.stack_pool.get(index));
                    self.pos = 0;
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for FramesFromLeaves<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Pools {
        strings: ConstantPool<Arc<str>>,
        frames: ConstantPool<FrameElement>,
        stacks: ConstantPool<FrameSequence>,
    }

    impl Pools {
        fn new() -> Self {
            Self {
                strings: ConstantPool::new(),
                frames: ConstantPool::new(),
                stacks: ConstantPool::new(),
            }
        }

        fn frames(&mut self, names: &[(&str, &str, i32)]) -> Vec<FrameElement> {
            names
                .iter()
                .map(|(owner, method, line)| {
                    FrameElement::new(owner, method, *line, &mut self.strings).unwrap()
                })
                .collect()
        }

        fn intern(&mut self, frames: &[FrameElement], subsequence: Option<i32>) -> i32 {
            let sequence =
                FrameSequence::new(frames, subsequence, &mut self.frames, &self.stacks).unwrap();
            self.stacks.get_or_insert(sequence).unwrap()
        }
    }

    #[test]
    fn shared_tail() {
        let mut pools = Pools::new();
        let root = pools.frames(&[("A", "m1", 2), ("A", "main", 1)]);
        let root_index = pools.intern(&root, None);

        let left = pools.frames(&[("C", "m1", 3)]);
        let right = pools.frames(&[("D", "m1", 5), ("C", "m4", 4)]);
        let left_index = pools.intern(&left, Some(root_index));
        let right_index = pools.intern(&right, Some(root_index));

        assert_eq!(pools.stacks.len(), 3);
        // Interning the same node again returns the same index.
        assert_eq!(pools.intern(&left, Some(root_index)), left_index);
        assert_eq!(pools.stacks.len(), 3);
        // The shared frames were interned once.
        assert_eq!(pools.frames.len(), 5);

        let right_seq = pools.stacks.get(right_index).unwrap();
        assert_eq!(right_seq.len(), 4);
        assert_eq!(right_seq.subsequence(), Some(root_index));

        let leaves: Vec<String> = right_seq
            .frames_from_leaves(&pools.frames, &pools.stacks)
            .map(|f| f.to_string())
            .collect();
        assert_eq!(leaves, ["D.m1:5", "C.m4:4", "A.m1:2", "A.main:1"]);

        let mut frames = right_seq.frames_from_leaves(&pools.frames, &pools.stacks);
        assert_eq!(frames.len(), 4);
        frames.next();
        frames.next();
        frames.next();
        assert_eq!(frames.size_hint(), (1, Some(1)));
        frames.next();
        assert_eq!(frames.len(), 0);
        assert!(frames.next().is_none());

        let roots: Vec<String> = right_seq
            .frames_from_root(&pools.frames, &pools.stacks)
            .map(|f| f.to_string())
            .collect();
        assert_eq!(roots, ["A.main:1", "A.m1:2", "C.m4:4", "D.m1:5"]);
    }

    #[test]
    fn rejects_invalid_arguments() {
        let mut pools = Pools::new();
        assert!(matches!(
            FrameSequence::new(&[], None, &mut pools.frames, &pools.stacks),
            Err(MltError::InvalidArgument(_))
        ));

        let frames = pools.frames(&[("A", "main", 1)]);
        assert!(FrameSequence::new(&frames, Some(0), &mut pools.frames, &pools.stacks).is_err());
        // A failed argument check leaves the frame pool alone.
        assert!(pools.frames.is_empty());
    }

    #[test]
    fn from_indices_validates() {
        let mut pools = Pools::new();
        let frames = pools.frames(&[("A", "main", 1), ("A", "m1", 2)]);
        let index = pools.intern(&frames, None);

        let read = FrameSequence::from_indices(&[1], index, &pools.frames, &pools.stacks).unwrap();
        assert_eq!(read.len(), 3);
        assert_eq!(read.frame_ptrs(), &[1]);

        for (ptrs, subsequence) in [
            (&[][..], NO_INDEX),
            (&[2][..], NO_INDEX),
            (&[-1][..], NO_INDEX),
            (&[0][..], 1),
            (&[0][..], -2),
        ] {
            assert!(matches!(
                FrameSequence::from_indices(ptrs, subsequence, &pools.frames, &pools.stacks),
                Err(MltError::InvalidArgument(_))
            ));
        }
    }
}
