use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sds011_collector::{
    aggregate,
    sensor::sds011::{decode_measurement, REPLY_LEN},
    Channel, ChannelKind, Command, LineSink, OutputFormat, ParticulateDevice, RawSample,
    ReadingSink, Sds011,
};
use std::io;
use tokio_test::io::Builder;

const DATA_REPLY: [u8; REPLY_LEN] = [0xAA, 0xC0, 0xD4, 0x04, 0x3A, 0x0A, 0xA1, 0x60, 0x1D, 0xAB];

fn burst(len: usize) -> Vec<RawSample> {
    (0..len)
        .map(|i| match i % 4 {
            0 => RawSample::MISSING,
            1 => RawSample {
                pm25: Some(i as f64),
                pm10: None,
            },
            _ => RawSample::new(i as f64 * 0.5, i as f64),
        })
        .collect()
}

/// Benchmark aggregation of bursts with mixed missing values
fn bench_aggregate(c: &mut Criterion) {
    for len in [1usize, 5, 20, 100].iter() {
        let samples = burst(*len);
        c.bench_with_input(BenchmarkId::new("aggregate_burst", len), &samples, |b, samples| {
            b.iter(|| aggregate(black_box(samples)))
        });
    }
}

/// Benchmark frame encoding and decoding
fn bench_frames(c: &mut Criterion) {
    c.bench_function("encode_query_command", |b| {
        b.iter(|| black_box(Command::Query).encode())
    });

    c.bench_function("decode_data_reply", |b| {
        b.iter(|| decode_measurement(black_box(&DATA_REPLY)))
    });
}

/// Benchmark a full query exchange against an in-memory port
fn bench_query_exchange(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("Should create tokio runtime");

    c.bench_function("query_exchange", |b| {
        b.to_async(&rt).iter(|| async {
            let port = Builder::new()
                .write(&Command::Query.encode())
                .read(&DATA_REPLY)
                .build();
            let mut sensor = Sds011::new(port);
            sensor.query().await.expect("Should decode reply")
        })
    });
}

/// Benchmark JSON line output
fn bench_json_sink(c: &mut Criterion) {
    let sink = LineSink::new(io::sink(), OutputFormat::Json);
    let channel = Channel::new(Some("Living Room"), ChannelKind::Pm25);

    c.bench_function("json_line_publish", |b| {
        b.iter(|| sink.publish(&channel, black_box(11.5)))
    });
}

criterion_group!(
    benches,
    bench_aggregate,
    bench_frames,
    bench_query_exchange,
    bench_json_sink
);
criterion_main!(benches);
