//! Benchmarks for the series engine.
//!
//! Run with: cargo bench --package alopex-series
//!
//! ## Benchmark Categories
//!
//! - **Field Codec**: Block encode/decode performance
//! - **Append**: Uncompressed and compressed appends
//! - **Search**: Cold and cached binary search
//! - **Streams**: Full forward and reverse scans

use alopex_series::codec::{CodecReader, CodecWriter};
use alopex_series::{
    CompressedSeriesFile, DynamicSerializer, KeyField, OrderedSeries, SeriesConfig, SeriesFile,
    StorageConfig, SyncMode,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

/// Regular timestamps in nanoseconds, one second apart.
fn generate_timestamps(count: usize) -> Vec<i64> {
    let start_ts = 1_000_000_000_i64;
    (0..count as i64).map(|i| start_ts + i * 1_000_000_000).collect()
}

fn bench_config() -> SeriesConfig {
    SeriesConfig {
        storage: StorageConfig {
            sync_mode: SyncMode::None,
            ..StorageConfig::default()
        },
        unique_keys: true,
        ..SeriesConfig::default()
    }
}

fn key() -> KeyField<i64, i64> {
    KeyField::new("timestamp", |t: &i64| *t)
}

fn bench_codec_encode(c: &mut Criterion) {
    let timestamps = generate_timestamps(10_000);
    let codec = DynamicSerializer::<i64>::new().unwrap();

    c.bench_function("codec_encode_10k", |b| {
        b.iter(|| {
            let mut encoder = codec.clone();
            let mut writer = CodecWriter::new(4096).unwrap();
            let mut input = black_box(&timestamps).iter().copied().peekable();
            let mut blocks = 0;
            while encoder.serialize(&mut writer, &mut input).unwrap() {
                blocks += 1;
            }
            blocks
        })
    });
}

fn bench_codec_decode(c: &mut Criterion) {
    let timestamps = generate_timestamps(10_000);
    let codec = DynamicSerializer::<i64>::new().unwrap();
    let mut encoder = codec.clone();
    let mut writer = CodecWriter::new(4096).unwrap();
    let mut input = timestamps.into_iter().peekable();
    let mut blocks = Vec::new();
    loop {
        let more = encoder.serialize(&mut writer, &mut input).unwrap();
        blocks.push(writer.block().to_vec());
        if !more {
            break;
        }
    }

    c.bench_function("codec_decode_10k", |b| {
        b.iter(|| {
            let mut decoder = codec.clone();
            let mut out = Vec::with_capacity(10_000);
            for block in &blocks {
                decoder
                    .deserialize(&mut CodecReader::new(block), &mut out, usize::MAX)
                    .unwrap();
            }
            black_box(out)
        })
    });
}

fn bench_append_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");

    for size in [1_000, 10_000, 100_000] {
        let timestamps = generate_timestamps(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("uncompressed", size), &timestamps, |b, ts| {
            b.iter_batched(
                || TempDir::new().unwrap(),
                |dir| {
                    let mut series =
                        SeriesFile::create(dir.path().join("bench.bin"), key(), bench_config())
                            .unwrap();
                    series.append(ts.iter().copied(), false).unwrap();
                },
                criterion::BatchSize::SmallInput,
            )
        });

        group.bench_with_input(BenchmarkId::new("compressed", size), &timestamps, |b, ts| {
            b.iter_batched(
                || TempDir::new().unwrap(),
                |dir| {
                    let mut series = CompressedSeriesFile::create(
                        dir.path().join("bench.bsd"),
                        key(),
                        bench_config(),
                    )
                    .unwrap();
                    series.append(ts.iter().copied(), false).unwrap();
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_binary_search(c: &mut Criterion) {
    let timestamps = generate_timestamps(100_000);
    let dir = TempDir::new().unwrap();
    let mut plain =
        SeriesFile::create(dir.path().join("search.bin"), key(), bench_config()).unwrap();
    plain.append(timestamps.iter().copied(), false).unwrap();
    let mut packed =
        CompressedSeriesFile::create(dir.path().join("search.bsd"), key(), bench_config()).unwrap();
    packed.append(timestamps.iter().copied(), false).unwrap();
    let target = timestamps[61_803];

    c.bench_function("search_uncompressed_100k", |b| {
        b.iter(|| plain.binary_search(black_box(&target), true).unwrap())
    });
    c.bench_function("search_compressed_100k", |b| {
        b.iter(|| packed.binary_search(black_box(&target), true).unwrap())
    });
}

fn bench_stream_scan(c: &mut Criterion) {
    let timestamps = generate_timestamps(100_000);
    let dir = TempDir::new().unwrap();
    let mut packed =
        CompressedSeriesFile::create(dir.path().join("scan.bsd"), key(), bench_config()).unwrap();
    packed.append(timestamps.iter().copied(), false).unwrap();

    let mut group = c.benchmark_group("stream");
    group.throughput(Throughput::Elements(100_000));
    for in_reverse in [false, true] {
        let name = if in_reverse { "reverse" } else { "forward" };
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut total = 0usize;
                for segment in packed.stream(None, in_reverse, None).unwrap() {
                    total += segment.unwrap().len();
                }
                total
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    // Field codec
    bench_codec_encode,
    bench_codec_decode,
    // Append
    bench_append_sizes,
    // Search
    bench_binary_search,
    // Streams
    bench_stream_scan,
);
criterion_main!(benches);
