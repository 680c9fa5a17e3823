// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! LEB128 primitive codec.
//!
//! Integers are written either _packed_ (unsigned LEB128: 7 value bits per
//! byte, the high bit set on every byte but the last) or _raw_ (fixed width,
//! big-endian). Negative numbers are packed as their two's complement bit
//! pattern of the declared width, so an `i32` of -1 takes 5 bytes.
//!
//! Raw encodings exist for values that must be patched in place once the
//! data they describe has been written, e.g. a size prefix.

mod pool;
mod reader;
mod writer;

pub use pool::*;
pub use reader::*;
pub use writer::*;

/// The continuation bit of a packed byte.
pub const EXT_BIT: u8 = 0x80;

/// A packed `u16`/`i16` never takes more than 3 bytes to encode.
pub const MAX_PACKED_SHORT_LEN: usize = 3;

/// A packed `u32`/`i32` never takes more than 5 bytes to encode.
pub const MAX_PACKED_INT_LEN: usize = 5;

/// A packed `u64`/`i64` never takes more than 10 bytes to encode.
pub const MAX_PACKED_LONG_LEN: usize = 10;

/// Compact UTF marker for an absent string.
pub const COMPACT_UTF_NULL: u8 = 0;
/// Compact UTF marker for the empty string.
pub const COMPACT_UTF_EMPTY: u8 = 1;
/// Compact UTF marker for a length-prefixed UTF-8 run.
pub const COMPACT_UTF_UTF8: u8 = 3;

/// Returns the number of bytes the packed encoding of `value` occupies.
#[inline]
pub const fn packed_len(value: u64) -> usize {
    // https://github.com/google/protobuf/blob/3.3.x/src/google/protobuf/io/coded_stream.h#L1301-L1309
    ((((value | 1).leading_zeros() ^ 63) * 9 + 73) / 64) as usize
}

/// Returns the number of bytes the packed encoding of an `i32` occupies.
#[inline]
pub const fn packed_int_len(value: i32) -> usize {
    packed_len(value as u32 as u64)
}

/// Returns a capacity large enough to hold a blob of `len` bytes preceded by
/// its packed length. Saturates at `usize::MAX` instead of wrapping.
#[inline]
pub const fn adjust_length(len: usize) -> usize {
    len.saturating_add(packed_len(len as u64))
}

/// Encodes `value` into `out`, returning the number of bytes used.
#[inline]
pub(crate) fn encode_packed(mut value: u64, out: &mut [u8; MAX_PACKED_LONG_LEN]) -> usize {
    let mut n = 0;
    loop {
        if value < EXT_BIT as u64 {
            out[n] = value as u8;
            return n + 1;
        }
        out[n] = ((value & 0x7F) as u8) | EXT_BIT;
        value >>= 7;
        n += 1;
    }
}
