// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Encoder and decoder for Method-Level Trace (MLT) chunks.
//!
//! A chunk holds one thread's sampled call stacks over a time window. Stacks
//! are stored compactly:
//!
//! - strings, frames and stacks are interned into [ConstantPool]s;
//! - stacks sharing a root-side tail share [FrameSequence] nodes;
//! - runs of identical samples are [compression] encoded.
//!
//! Build chunks with [MltChunkBuilder], serialize them with [MltWriter], and
//! decode them with [MltReader]. Integers on the wire use the [leb128] codec.
//!
//! ```
//! use libdd_mlt::{read_mlt_chunks, MltChunkBuilder, MltWriter};
//!
//! let mut builder = MltChunkBuilder::new(1_700_000_000_000, 42, "main")?;
//! builder.add_stack([("App", "run", 12), ("App", "main", 3)])?;
//! let chunk = builder.build(10_000_000);
//!
//! let bytes = MltWriter::default().write_chunk(&chunk)?;
//! assert_eq!(read_mlt_chunks(&bytes)?, vec![chunk]);
//! # Ok::<(), libdd_mlt::MltError>(())
//! ```

pub mod chunk;
pub mod compression;
pub mod config;
pub mod constant_pool;
pub mod error;
pub mod frame;
pub mod frame_sequence;
pub mod leb128;
pub mod reader;
pub mod writer;

pub use chunk::*;
pub use config::*;
pub use constant_pool::{ConstantPool, NO_INDEX};
pub use error::*;
pub use frame::*;
pub use frame_sequence::*;
pub use reader::*;
pub use writer::*;
