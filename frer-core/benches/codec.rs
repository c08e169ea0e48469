use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use frer_core::{rtag, MacAddr, TrafficGenerator};

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("rtag");
    group.throughput(Throughput::Elements(1));

    group.bench_function("encode", |b| {
        let mut seq = 0u16;
        b.iter(|| {
            seq = seq.wrapping_add(1);
            criterion::black_box(rtag::encode(seq, 1));
        });
    });

    for &payload_size in &[16usize, 100, 1400] {
        let mut gen = TrafficGenerator::new(MacAddr::ZERO);
        let frame = gen.next_frame(1, MacAddr::BROADCAST, 100, payload_size);

        group.bench_with_input(
            BenchmarkId::new("decode", payload_size),
            &frame,
            |b, frame| {
                b.iter(|| criterion::black_box(rtag::decode(frame)));
            },
        );

        group.bench_with_input(
            BenchmarkId::new("next_frame", payload_size),
            &payload_size,
            |b, &size| {
                b.iter(|| criterion::black_box(gen.next_frame(1, MacAddr::BROADCAST, 100, size)));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_codec);
criterion_main!(benches);
