//! Benchmarks for the decode passes and the sort primitive.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use padrow::{CompressedClusters, Decompressor, Geometry, PartitionKey, NROWS, NSECTORS};

/// Unattached-only container with `per_partition` clusters in every
/// partition, cumulative mode.
fn synthetic_container(per_partition: u32) -> CompressedClusters {
    let mut c = CompressedClusters {
        mode: padrow::MODE_DIFFERENTIAL,
        ..Default::default()
    };
    for sector in 0..NSECTORS as u8 {
        for row in 0..NROWS as u8 {
            let flat = PartitionKey::new(sector, row).flat();
            c.unattached.partition_count[flat] = per_partition;
            for k in 0..per_partition {
                // Mildly shuffled deltas so the per-partition sort has work.
                c.unattached.time_diff.push((k * 37 + 11) % 101);
                c.unattached.pad_diff.push(((k * 13) % 29) as u16);
                c.unattached.flags.push(0);
                c.unattached.sigma_time.push(1);
                c.unattached.sigma_pad.push(1);
                c.unattached.q_max.push(40);
                c.unattached.q_tot.push(400);
                c.unattached_count += 1;
            }
        }
    }
    c
}

fn bench_decompress(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompress");
    for per_partition in [1u32, 8] {
        let container = synthetic_container(per_partition);
        let engine = Decompressor::new(Geometry::default());
        group.throughput(Throughput::Elements(container.total_clusters() as u64));
        group.bench_function(format!("unattached_{per_partition}_per_partition"), |b| {
            b.iter(|| {
                let decoded = engine.decompress(black_box(&container)).unwrap();
                black_box(decoded.buffer.len())
            })
        });
    }
    group.finish();
}

fn bench_container_round_trip(c: &mut Criterion) {
    let container = synthetic_container(4);
    let bytes = container.to_bytes().unwrap();
    let mut group = c.benchmark_group("container");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("from_bytes", |b| {
        b.iter(|| CompressedClusters::from_bytes(black_box(&bytes)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_decompress, bench_container_round_trip);
criterion_main!(benches);
