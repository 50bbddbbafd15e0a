//! Performance benchmarks for fmcore
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fmcore::core::FileTransferEngine;
use fmcore::fs::{FileSystemObject, TransferOptions};
use fmcore::notify::{NotificationQueue, Tag};
use std::fs::File;
use std::io::Write;
use tempfile::TempDir;

/// Create a test file of the specified size
fn create_test_file(dir: &std::path::Path, name: &str, size: usize) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).unwrap();

    let chunk_size = 64 * 1024;
    let chunk: Vec<u8> = (0..chunk_size).map(|i| (i % 256) as u8).collect();
    let mut remaining = size;

    while remaining > 0 {
        let to_write = remaining.min(chunk_size);
        file.write_all(&chunk[..to_write]).unwrap();
        remaining -= to_write;
    }

    path
}

fn bench_options() -> TransferOptions {
    // fsync dominates otherwise
    TransferOptions {
        sync_on_commit: false,
        check_free_space: false,
        ..Default::default()
    }
}

fn bench_atomic_vs_chunked(c: &mut Criterion) {
    let mut group = c.benchmark_group("copy_10MiB");
    let size = 10 * 1024 * 1024;

    let src_dir = TempDir::new().unwrap();
    let dst_dir = TempDir::new().unwrap();
    let src_file = create_test_file(src_dir.path(), "large.bin", size);
    let dst_file = dst_dir.path().join("large.bin");

    group.throughput(Throughput::Bytes(size as u64));
    group.sample_size(20);

    group.bench_function("atomic", |b| {
        b.iter(|| {
            let mut engine = FileTransferEngine::new(FileSystemObject::new(&src_file))
                .with_options(bench_options());
            black_box(engine.copy_atomically(dst_dir.path(), None).unwrap());
            std::fs::remove_file(&dst_file).unwrap();
        });
    });

    for chunk in [64 * 1024u64, 1024 * 1024, 4 * 1024 * 1024] {
        group.bench_with_input(
            BenchmarkId::new("chunked", humansize::format_size(chunk, humansize::BINARY)),
            &chunk,
            |b, &chunk| {
                b.iter(|| {
                    let mut engine = FileTransferEngine::new(FileSystemObject::new(&src_file))
                        .with_options(bench_options());
                    while !engine.copy_chunk(chunk, dst_dir.path(), None).unwrap().is_complete() {}
                    std::fs::remove_file(&dst_file).unwrap();
                });
            },
        );
    }

    group.finish();
}

fn bench_queue_coalescing(c: &mut Criterion) {
    let mut group = c.benchmark_group("notification_queue");

    for producers in [1usize, 100, 10_000] {
        group.bench_with_input(
            BenchmarkId::new("coalesced_enqueue_exec", producers),
            &producers,
            |b, &producers| {
                let queue = NotificationQueue::new();
                b.iter(|| {
                    for _ in 0..producers {
                        queue.enqueue(|| {}, Tag::Coalesce(0));
                    }
                    black_box(queue.exec().unwrap());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_atomic_vs_chunked, bench_queue_coalescing);
criterion_main!(benches);
