//! Message encoding/decoding benchmarks.

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use franz_protocol::compression::{gunzip, gzip};
use franz_protocol::{Compression, Message, Offset};

fn payload(size: usize) -> Bytes {
    // Repetitive but not constant, so gzip has some work to do.
    Bytes::from(
        (0..size)
            .map(|i| b"franz-log-record-"[i % 17])
            .collect::<Vec<u8>>(),
    )
}

fn bench_encode(c: &mut Criterion) {
    for codec in [Compression::None, Compression::Gzip] {
        let mut group = c.benchmark_group(format!("message_encode_{}", codec));

        for size in [100, 1000, 10000] {
            let data = payload(size);

            group.throughput(Throughput::Bytes(size as u64));
            group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
                b.iter(|| {
                    let message = Message::encode(data.clone(), codec).unwrap();
                    black_box(message.to_bytes())
                });
            });
        }

        group.finish();
    }
}

fn bench_decode(c: &mut Criterion) {
    for codec in [Compression::None, Compression::Gzip] {
        let mut group = c.benchmark_group(format!("message_decode_{}", codec));

        for size in [100, 1000, 10000] {
            let encoded = Message::encode(payload(size), codec).unwrap().to_bytes();

            group.throughput(Throughput::Bytes(size as u64));
            group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
                b.iter(|| {
                    let mut buf = encoded.clone();
                    black_box(Message::decode(&mut buf, Offset::ZERO).unwrap())
                });
            });
        }

        group.finish();
    }
}

fn bench_message_set_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_set_decode");

    for count in [10, 100, 1000] {
        let mut set = BytesMut::new();
        for _ in 0..count {
            Message::new(payload(200)).write_to(&mut set);
        }
        let set = set.freeze();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &set, |b, set| {
            b.iter(|| {
                let mut buf = set.clone();
                let mut offset = Offset::ZERO;
                while !buf.is_empty() {
                    let message = Message::decode(&mut buf, offset).unwrap();
                    offset = offset.advance(message.wire_size() as u64).unwrap();
                }
                black_box(offset)
            });
        });
    }

    group.finish();
}

fn bench_gzip_container(c: &mut Criterion) {
    let mut group = c.benchmark_group("gunzip");

    for size in [1000, 10000, 100000] {
        let container = gzip(&payload(size)).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(size),
            &container,
            |b, container| {
                b.iter(|| black_box(gunzip(container).unwrap()));
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_message_set_decode,
    bench_gzip_container
);
criterion_main!(benches);
