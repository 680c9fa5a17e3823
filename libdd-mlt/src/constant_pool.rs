// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::MltError;
use indexmap::Equivalent;
use std::hash::{BuildHasherDefault, Hash};

pub type FxIndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<rustc_hash::FxHasher>>;
pub type FxIndexSet<K> = indexmap::IndexSet<K, BuildHasherDefault<rustc_hash::FxHasher>>;

/// Index marking an absent pool entry, e.g. a frame sequence without a
/// subsequence.
pub const NO_INDEX: i32 = -1;

/// Holds unique values and hands out indices that correspond to the order
/// the values were inserted, starting at the pool's base.
///
/// Lookups never fail loudly: [ConstantPool::get] returns `None` for any
/// index outside the populated range.
#[derive(Clone, Debug)]
pub struct ConstantPool<T> {
    base: i32,
    items: FxIndexSet<T>,
}

impl<T: Eq + Hash> Default for ConstantPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash> ConstantPool<T> {
    /// Creates an empty pool whose first index is 0.
    pub fn new() -> Self {
        Self {
            base: 0,
            items: FxIndexSet::default(),
        }
    }

    /// Creates an empty pool whose first index is `base`, e.g. 1 to keep 0
    /// reserved.
    pub fn with_base(base: i32) -> Result<Self, MltError> {
        if base < 0 {
            return Err(MltError::invalid_argument("pool base must not be negative"));
        }
        Ok(Self {
            base,
            items: FxIndexSet::default(),
        })
    }

    #[inline]
    pub fn base(&self) -> i32 {
        self.base
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The index the next inserted value will receive.
    #[inline]
    pub fn next_index(&self) -> i64 {
        self.base as i64 + self.items.len() as i64
    }

    fn offset_of(&self, index: i32) -> Option<usize> {
        usize::try_from(index.checked_sub(self.base)?).ok()
    }

    fn index_for(&self, offset: usize) -> Result<i32, MltError> {
        i32::try_from(offset)
            .ok()
            .and_then(|offset| offset.checked_add(self.base))
            .ok_or(MltError::StorageFull)
    }

    /// Returns the value stored at `index`, if any.
    pub fn get(&self, index: i32) -> Option<&T> {
        self.items.get_index(self.offset_of(index)?)
    }

    /// Returns true if `index` refers to a stored value.
    pub fn contains_index(&self, index: i32) -> bool {
        self.get(index).is_some()
    }

    /// Returns the index of `value` if it has been interned.
    pub fn index_of<Q>(&self, value: &Q) -> Option<i32>
    where
        Q: ?Sized + Hash + Equivalent<T>,
    {
        let offset = self.items.get_index_of(value)?;
        // Every stored offset was checked to fit when it was inserted.
        Some(self.base + offset as i32)
    }

    /// Adds the value if it isn't present already, and returns its index.
    /// Interning the same value again returns the same index.
    pub fn get_or_insert(&mut self, value: T) -> Result<i32, MltError> {
        match self.items.get_index_of(&value) {
            Some(offset) => self.index_for(offset),
            None => {
                let index = self.index_for(self.items.len())?;
                self.items.insert(value);
                Ok(index)
            }
        }
    }

    /// Like [ConstantPool::get_or_insert], but only builds the owned value
    /// when `key` isn't present yet.
    pub fn get_or_insert_with<Q, F>(&mut self, key: &Q, make: F) -> Result<i32, MltError>
    where
        Q: ?Sized + Hash + Equivalent<T>,
        F: FnOnce() -> T,
    {
        match self.items.get_index_of(key) {
            Some(offset) => self.index_for(offset),
            None => {
                let index = self.index_for(self.items.len())?;
                let (_, inserted) = self.items.insert_full(make());
                debug_assert!(inserted);
                Ok(index)
            }
        }
    }

    /// Stores `value` at `index`, which must be the next free index. This is
    /// how a pool is rebuilt from a format that already fixed the indices.
    ///
    /// `insert(NO_INDEX, None)` is accepted and does nothing, for slots that
    /// legitimately carry no value.
    pub fn insert(&mut self, index: i32, value: Option<T>) -> Result<(), MltError> {
        let value = match (index, value) {
            (NO_INDEX, None) => return Ok(()),
            (_, None) => {
                return Err(MltError::InvalidArgument(
                    format!("no value given for pool index {index}").into(),
                ))
            }
            (_, Some(value)) => value,
        };
        let next = self.next_index();
        if index as i64 != next {
            return Err(MltError::InvalidArgument(
                format!("pool index {index} is not the next free index {next}").into(),
            ));
        }
        if self.items.contains(&value) {
            return Err(MltError::InvalidArgument(
                format!("duplicate value for pool index {index}").into(),
            ));
        }
        self.items.insert(value);
        Ok(())
    }

    /// Appends a value the caller knows to be distinct from every stored
    /// one, and whose index is known to fit.
    pub(crate) fn push_unique(&mut self, value: T) {
        let (_, inserted) = self.items.insert_full(value);
        debug_assert!(inserted);
    }

    /// Iterates over `(index, value)` pairs in index order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (i32, &T)> + '_ {
        let base = self.base;
        self.items
            .iter()
            .enumerate()
            .map(move |(offset, value)| (base + offset as i32, value))
    }
}
