//! Page verification and queue benchmarks using Criterion.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use roc_bench_core::card::EmulatedChannel;
use roc_bench_core::{
    superpage_queue, CardFamily, DmaBuffer, DmaChannel, GeneratorPattern, Superpage, Verifier,
};
use std::sync::Arc;

const PAGE: usize = 8 * 1024;
const PAGES: usize = 256;

/// Buffer holding `PAGES` consecutive emulator pages for `family`.
fn generated_pages(family: CardFamily, pattern: GeneratorPattern) -> Arc<DmaBuffer> {
    let buffer = Arc::new(DmaBuffer::anonymous(PAGES * PAGE).unwrap());
    let mut channel = EmulatedChannel::new(family, buffer.clone(), PAGE, pattern).unwrap();
    channel.start_dma().unwrap();
    channel
        .push_superpage(Superpage::new(0, PAGES * PAGE))
        .unwrap();
    channel.fill_superpages();
    channel.stop_dma().unwrap();
    buffer
}

fn benchmark_verify(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify");
    group.throughput(Throughput::Bytes((PAGES * PAGE) as u64));

    for family in [CardFamily::Cru, CardFamily::Crorc] {
        for pattern in [GeneratorPattern::Incremental, GeneratorPattern::Constant] {
            let buffer = generated_pages(family, pattern);
            let name = format!("{}/{pattern:?}", family.as_str());
            group.bench_function(name, |b| {
                b.iter(|| {
                    let mut verifier = Verifier::new(family, pattern, true, 10).unwrap();
                    for event in 0..PAGES {
                        let page = buffer.view(event * PAGE, PAGE).unwrap();
                        black_box(verifier.check_page(event as u64, &page));
                        verifier.advance();
                    }
                    verifier.error_count()
                });
            });
        }
    }

    group.finish();
}

fn benchmark_emulator_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("emulator");
    group.throughput(Throughput::Bytes((PAGES * PAGE) as u64));

    let buffer = Arc::new(DmaBuffer::anonymous(PAGES * PAGE).unwrap());
    let mut channel =
        EmulatedChannel::new(CardFamily::Cru, buffer, PAGE, GeneratorPattern::Incremental).unwrap();
    channel.start_dma().unwrap();

    group.bench_function("fill", |b| {
        b.iter(|| {
            channel
                .push_superpage(Superpage::new(0, PAGES * PAGE))
                .unwrap();
            channel.fill_superpages();
            black_box(channel.pop_superpage())
        });
    });

    group.finish();
}

fn benchmark_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue");
    group.throughput(Throughput::Elements(1024));

    let (mut tx, mut rx) = superpage_queue::<usize>(1025);
    group.bench_function("push_pop", |b| {
        b.iter(|| {
            for offset in 0..1024 {
                let _ = tx.push(black_box(offset));
            }
            while let Some(offset) = rx.pop() {
                black_box(offset);
            }
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_verify, benchmark_emulator_fill, benchmark_queue);
criterion_main!(benches);
