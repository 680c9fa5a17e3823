// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::borrow::Cow;

/// Represents errors that occur while building, encoding or decoding MLT
/// chunks.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum MltError {
    /// A parameter was incorrect, e.g., a null pointer was provided or a
    /// positional insert did not target the next free slot.
    #[error("invalid argument: {0}")]
    InvalidArgument(Cow<'static, str>),
    /// A constant pool would need more entries than an i32 index can address.
    #[error("storage full")]
    StorageFull,
    /// The input bytes are not a well-formed MLT chunk stream.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl MltError {
    pub fn invalid_argument(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// Represents structural problems found while decoding a chunk stream. Any of
/// these fails the decode of the whole chunk.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },
    #[error("packed integer does not fit its declared type")]
    VarintOverflow,
    #[error("invalid chunk magic")]
    InvalidMagic,
    #[error("unsupported chunk version {0}")]
    UnsupportedVersion(u8),
    #[error("chunk declared {declared} bytes but {actual} were read")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("invalid length or count {0}")]
    InvalidLength(i64),
    #[error("invalid utf-8 string")]
    InvalidUtf8,
    #[error("invalid reference: {0}")]
    InvalidReference(Cow<'static, str>),
    #[error("unknown field marker {0}")]
    InvalidMarker(u8),
}

impl DecodeError {
    /// Converts an argument error raised by a read-side constructor into a
    /// decode error; the wire format is what carried the bad argument.
    #[cold]
    pub(crate) fn from_argument(err: MltError) -> Self {
        match err {
            MltError::InvalidArgument(msg) => DecodeError::InvalidReference(msg),
            MltError::StorageFull => DecodeError::InvalidReference(Cow::Borrowed("storage full")),
            MltError::Decode(err) => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_errors_become_decode_errors() {
        let err = DecodeError::from_argument(MltError::invalid_argument("dangling"));
        assert_eq!(err, DecodeError::InvalidReference("dangling".into()));

        let err = DecodeError::from_argument(MltError::Decode(DecodeError::InvalidMagic));
        assert_eq!(err, DecodeError::InvalidMagic);
    }

    #[test]
    fn display() {
        let err = MltError::from(DecodeError::UnsupportedVersion(7));
        assert_eq!(err.to_string(), "unsupported chunk version 7");
        assert_eq!(
            MltError::invalid_argument("null buffer").to_string(),
            "invalid argument: null buffer"
        );
    }
}
