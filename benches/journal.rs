//! Journal Benchmarks
//!
//! - Encoding: measure and serialize for entry and payload operations
//! - Append: end-to-end submit-and-wait latency through the worker
//!
//! ## Running
//!
//! ```bash
//! cargo bench --bench journal
//! cargo bench --bench journal -- "codec"
//! cargo bench --bench journal -- "append"
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fsjournal::{measure, serialize, Dict, FileOp, Gfid, Journal, JournalConfig, Loc};
use tempfile::TempDir;

// =============================================================================
// Fixtures
// =============================================================================

fn create_op() -> FileOp {
    FileOp::Create {
        loc: Loc::named(Gfid::new(), "file01.txt"),
        flags: 0o101,
        mode: 0o644,
        umask: 0o022,
        fd: Gfid::new(),
        xdata: Dict::new().with("user.x", "v"),
    }
}

fn write_op(size: usize) -> FileOp {
    FileOp::Write {
        fd: Gfid::new(),
        payload: vec![vec![0x5a; size]],
        offset: 0,
        flags: 0,
        xdata: Dict::new(),
    }
}

// =============================================================================
// Encoding
// =============================================================================

fn codec_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Elements(1));

    let create = create_op();
    group.bench_function("measure/create", |b| {
        b.iter(|| black_box(measure(black_box(&create)).unwrap()))
    });

    let len = measure(&create).unwrap();
    let mut meta = vec![0u8; len.meta];
    let mut data = vec![0u8; len.data];
    group.bench_function("serialize/create", |b| {
        b.iter(|| black_box(serialize(&create, &mut meta, &mut data).unwrap()))
    });

    for size in [512usize, 4096, 65536] {
        let op = write_op(size);
        let len = measure(&op).unwrap();
        let mut meta = vec![0u8; len.meta];
        let mut data = vec![0u8; len.data];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(BenchmarkId::new("serialize/write", size), |b| {
            b.iter(|| black_box(serialize(&op, &mut meta, &mut data).unwrap()))
        });
    }
    group.finish();
}

// =============================================================================
// Append path
// =============================================================================

fn append_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    group.throughput(Throughput::Elements(1));
    group.sample_size(20);

    let temp_dir = TempDir::new().unwrap();
    let config = JournalConfig::new().with_log_dir(temp_dir.path());
    let journal = Journal::start(config).unwrap();

    group.bench_function("create", |b| {
        b.iter(|| black_box(journal.submit_and_wait(create_op()).unwrap()))
    });
    group.bench_function("write_4k", |b| {
        b.iter(|| black_box(journal.submit_and_wait(write_op(4096)).unwrap()))
    });

    group.finish();
    journal.shutdown();
}

criterion_group!(benches, codec_benchmarks, append_benchmarks);
criterion_main!(benches);
