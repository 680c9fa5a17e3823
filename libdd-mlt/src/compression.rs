// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Run-length compression of per-sample stack pool indices.
//!
//! A run of `k > 1` identical indices `v` is stored as `v` followed by
//! `(k - 1) | REPEAT_FLAG`; a lone index is stored as itself. Idle and
//! blocked threads produce long runs of the same stack, which then cost two
//! slots no matter how long they are.

use crate::DecodeError;
use std::borrow::Cow;

/// Marks an element as a repeat count for the preceding index.
pub const REPEAT_FLAG: i32 = i32::MIN;

/// The largest repeat count a single marker can carry.
pub const MAX_REPEAT: i32 = i32::MAX;

#[inline]
pub const fn is_repeat(value: i32) -> bool {
    value & REPEAT_FLAG != 0
}

#[inline]
const fn repeat_count(value: i32) -> usize {
    (value & !REPEAT_FLAG) as usize
}

/// Compresses a sequence of non-negative stack indices.
pub fn compress(ptrs: &[i32]) -> Vec<i32> {
    let mut out = Vec::with_capacity(ptrs.len());
    let mut iter = ptrs.iter().copied().peekable();
    while let Some(value) = iter.next() {
        debug_assert!(value >= 0, "stack index {value} collides with REPEAT_FLAG");
        let mut extra = 0;
        while extra < MAX_REPEAT && iter.next_if_eq(&value).is_some() {
            extra += 1;
        }
        out.push(value);
        if extra > 0 {
            out.push(extra | REPEAT_FLAG);
        }
    }
    out
}

/// Expands compressed indices, rejecting a repeat marker that doesn't follow
/// an index.
pub fn decompress(data: &[i32]) -> Result<Vec<i32>, DecodeError> {
    validate(data, |_| true)?;
    Ok(expand(data).collect())
}

/// Checks the structure of compressed indices without expanding them, and
/// returns the number of samples they expand to. Every index must satisfy
/// `is_valid`.
pub fn validate(data: &[i32], is_valid: impl Fn(i32) -> bool) -> Result<u64, DecodeError> {
    let mut samples = 0u64;
    let mut iter = data.iter().copied().peekable();
    while let Some(value) = iter.next() {
        if is_repeat(value) {
            return Err(DecodeError::InvalidReference(Cow::Borrowed(
                "repeat count without a preceding stack index",
            )));
        }
        if !is_valid(value) {
            return Err(DecodeError::InvalidReference(
                format!("stack index {value} is not in the stack pool").into(),
            ));
        }
        let extra = iter.next_if(|next| is_repeat(*next)).map_or(0, repeat_count);
        samples += 1 + extra as u64;
    }
    Ok(samples)
}

/// Lazily expands compressed indices. Stray repeat markers are skipped, so
/// only use this on data that passed [validate].
pub fn expand(data: &[i32]) -> Expand<'_> {
    Expand {
        data,
        pos: 0,
        current: 0,
        pending: 0,
    }
}

#[derive(Clone, Debug)]
pub struct Expand<'a> {
    data: &'a [i32],
    pos: usize,
    current: i32,
    pending: usize,
}

impl Iterator for Expand<'_> {
    type Item = i32;

    fn next(&mut self) -> Option<i32> {
        if self.pending > 0 {
            self.pending -= 1;
            return Some(self.current);
        }
        loop {
            let value = *self.data.get(self.pos)?;
            self.pos += 1;
            if is_repeat(value) {
                continue;
            }
            self.current = value;
            if let Some(&next) = self.data.get(self.pos) {
                if is_repeat(next) {
                    self.pos += 1;
                    self.pending = repeat_count(next);
                }
            }
            return Some(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_runs() {
        assert_eq!(compress(&[1, 1, 1, 1, 2]), vec![1, 3 | REPEAT_FLAG, 2]);
        assert_eq!(
            compress(&[43, 15, 15, 45, 45]),
            vec![43, 15, 1 | REPEAT_FLAG, 45, 1 | REPEAT_FLAG]
        );
        assert_eq!(compress(&[]), Vec::<i32>::new());
        assert_eq!(compress(&[0, 1, 0]), vec![0, 1, 0]);
    }

    #[test]
    fn decompress_runs() {
        assert_eq!(
            decompress(&[1, 3 | REPEAT_FLAG, 2]).unwrap(),
            vec![1, 1, 1, 1, 2]
        );
        assert_eq!(
            decompress(&[43, 15, 1 | REPEAT_FLAG, 45, 1 | REPEAT_FLAG]).unwrap(),
            vec![43, 15, 15, 45, 45]
        );
    }

    #[test]
    fn dangling_repeat_markers() {
        assert!(decompress(&[REPEAT_FLAG | 2]).is_err());
        assert!(decompress(&[1, 1 | REPEAT_FLAG, 1 | REPEAT_FLAG]).is_err());
    }

    #[test]
    fn validate_counts_samples() {
        let data = [7, MAX_REPEAT | REPEAT_FLAG, 8];
        assert_eq!(validate(&data, |_| true).unwrap(), 2 + MAX_REPEAT as u64);
        assert!(validate(&data, |v| v < 8).is_err());
    }

    #[test]
    fn fuzz_round_trip() {
        bolero::check!()
            .with_type::<Vec<(u8, u8)>>()
            .for_each(|runs| {
                // Build runs out of a small alphabet to get plenty of repeats.
                let ptrs: Vec<i32> = runs
                    .iter()
                    .flat_map(|(value, len)| {
                        std::iter::repeat(*value as i32 % 4).take(*len as usize % 6)
                    })
                    .collect();
                let compressed = compress(&ptrs);
                assert!(compressed.len() <= ptrs.len());
                assert_eq!(
                    validate(&compressed, |_| true).unwrap(),
                    ptrs.len() as u64
                );
                assert_eq!(decompress(&compressed).unwrap(), ptrs);
            });
    }

    #[test]
    fn fuzz_any_indices() {
        bolero::check!().with_type::<Vec<u32>>().for_each(|values| {
            let ptrs: Vec<i32> = values.iter().map(|v| (*v >> 1) as i32).collect();
            assert_eq!(decompress(&compress(&ptrs)).unwrap(), ptrs);
        });
    }
}
