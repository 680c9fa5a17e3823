// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constant_pool::ConstantPool;
use crate::MltError;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// One frame of a sampled call stack as handed over by a sampler.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct StackFrame<'a> {
    pub owner: &'a str,
    pub method: &'a str,
    pub line: i32,
}

impl<'a> StackFrame<'a> {
    pub fn new(owner: &'a str, method: &'a str, line: i32) -> Self {
        Self {
            owner,
            method,
            line,
        }
    }
}

impl<'a> From<(&'a str, &'a str, i32)> for StackFrame<'a> {
    fn from((owner, method, line): (&'a str, &'a str, i32)) -> Self {
        Self::new(owner, method, line)
    }
}

/// A (declaring type, method, line) triple whose names are interned in a
/// string [ConstantPool].
///
/// Equality and hashing only look at the owner, method and line. The string
/// pool indices are carried along so the frame can be written without
/// looking its names up again, but they are not part of its identity.
#[derive(Clone, Debug)]
pub struct FrameElement {
    owner: Arc<str>,
    method: Arc<str>,
    line: i32,
    owner_ptr: i32,
    method_ptr: i32,
}

impl FrameElement {
    /// Creates a frame, interning `owner` and `method` into `string_pool`.
    pub fn new(
        owner: &str,
        method: &str,
        line: i32,
        string_pool: &mut ConstantPool<Arc<str>>,
    ) -> Result<Self, MltError> {
        let owner_ptr = string_pool.get_or_insert_with(owner, || Arc::from(owner))?;
        let method_ptr = string_pool.get_or_insert_with(method, || Arc::from(method))?;
        Self::from_indices(owner_ptr, method_ptr, line, string_pool)
    }

    /// Creates a frame from already-resolved string pool indices. Fails if
    /// either index is not present in `string_pool`.
    pub fn from_indices(
        owner_ptr: i32,
        method_ptr: i32,
        line: i32,
        string_pool: &ConstantPool<Arc<str>>,
    ) -> Result<Self, MltError> {
        let resolve = |ptr: i32, what: &str| {
            string_pool.get(ptr).cloned().ok_or_else(|| {
                MltError::InvalidArgument(
                    format!("{what} index {ptr} is not in the string pool").into(),
                )
            })
        };
        Ok(Self {
            owner: resolve(owner_ptr, "owner")?,
            method: resolve(method_ptr, "method")?,
            line,
            owner_ptr,
            method_ptr,
        })
    }

    #[inline]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[inline]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[inline]
    pub fn line(&self) -> i32 {
        self.line
    }

    #[inline]
    pub fn owner_ptr(&self) -> i32 {
        self.owner_ptr
    }

    #[inline]
    pub fn method_ptr(&self) -> i32 {
        self.method_ptr
    }
}

impl PartialEq for FrameElement {
    fn eq(&self, other: &Self) -> bool {
        self.line == other.line && self.owner == other.owner && self.method == other.method
    }
}

impl Eq for FrameElement {}

impl Hash for FrameElement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.owner.hash(state);
        self.method.hash(state);
        self.line.hash(state);
    }
}

impl fmt::Display for FrameElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.owner, self.method, self.line)
    }
}

impl PartialEq<StackFrame<'_>> for FrameElement {
    fn eq(&self, other: &StackFrame<'_>) -> bool {
        self.line == other.line && *self.owner == *other.owner && *self.method == *other.method
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(frame: &FrameElement) -> u64 {
        let mut hasher = DefaultHasher::new();
        frame.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn interns_names() {
        let mut strings = ConstantPool::new();
        let a = FrameElement::new("A", "main", 10, &mut strings).unwrap();
        let b = FrameElement::new("A", "m1", 11, &mut strings).unwrap();
        assert_eq!(strings.len(), 3);
        assert_eq!(a.owner_ptr(), b.owner_ptr());
        assert_ne!(a.method_ptr(), b.method_ptr());
        assert_eq!(a.to_string(), "A.main:10");
        assert_eq!(a, StackFrame::new("A", "main", 10));
    }

    #[test]
    fn equality_ignores_backing_pool() {
        let mut first = ConstantPool::new();
        first.get_or_insert(Arc::from("padding")).unwrap();
        let mut second = ConstantPool::new();

        let a = FrameElement::new("C", "m4", 42, &mut first).unwrap();
        let b = FrameElement::new("C", "m4", 42, &mut second).unwrap();
        assert_ne!(a.owner_ptr(), b.owner_ptr());
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let c = FrameElement::new("C", "m4", 43, &mut second).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn from_indices_resolves_names() {
        let mut strings = ConstantPool::new();
        let built = FrameElement::new("D", "m1", 7, &mut strings).unwrap();
        let read =
            FrameElement::from_indices(built.owner_ptr(), built.method_ptr(), 7, &strings).unwrap();
        assert_eq!(built, read);
        assert_eq!(read.owner(), "D");
        assert_eq!(read.method(), "m1");
    }

    #[test]
    fn from_indices_rejects_dangling() {
        let strings = ConstantPool::new();
        assert!(matches!(
            FrameElement::from_indices(0, 0, 1, &strings),
            Err(MltError::InvalidArgument(_))
        ));
        assert!(FrameElement::from_indices(-1, 0, 1, &strings).is_err());
    }
}
