// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use criterion::*;
use libdd_mlt::{read_mlt_chunks, MltChunk, MltChunkBuilder, MltWriter};

const OWNERS: [&str; 6] = [
    "java.lang.Thread",
    "java.util.concurrent.ThreadPoolExecutor",
    "java.util.concurrent.ThreadPoolExecutor$Worker",
    "com.example.http.Handler",
    "com.example.db.ConnectionPool",
    "sun.nio.ch.EPoll",
];
const METHODS: [&str; 6] = ["run", "runWorker", "handle", "query", "acquire", "wait"];

/// A chunk with deep stacks sharing their root-side frames and bursts of
/// identical samples, roughly what a busy worker thread looks like.
fn worker_chunk(samples: usize) -> MltChunk {
    let mut builder = MltChunkBuilder::new(1_700_000_000_000, 1, "worker-1").unwrap();
    for sample in 0..samples {
        let depth = 12 + sample % 5;
        let leaf = sample / 4 % 7;
        let stack: Vec<_> = (0..depth)
            .map(|i| {
                let slot = (i + leaf * (i % 3)) % OWNERS.len();
                (OWNERS[slot], METHODS[slot], (i * 10 + leaf) as i32)
            })
            .collect();
        builder.add_stack(stack).unwrap();
    }
    builder.build(10_000_000)
}

pub fn build_chunk(c: &mut Criterion) {
    c.bench_function("building a chunk of 1000 samples", |b| {
        b.iter(|| black_box(worker_chunk(1000)))
    });
}

pub fn write_chunk(c: &mut Criterion) {
    let chunk = worker_chunk(1000);
    let mut writer = MltWriter::default();
    c.bench_function("writing a chunk of 1000 samples", |b| {
        b.iter(|| {
            writer
                .write_chunk_with(black_box(&chunk), |bytes| black_box(bytes.len()))
                .unwrap()
        })
    });
}

pub fn read_chunk(c: &mut Criterion) {
    let bytes = MltWriter::default()
        .write_chunk(&worker_chunk(1000))
        .unwrap();
    c.bench_function("reading a chunk of 1000 samples", |b| {
        b.iter(|| black_box(read_mlt_chunks(black_box(&bytes)).unwrap()))
    });
}

criterion_group!(benches, build_chunk, write_chunk, read_chunk);
