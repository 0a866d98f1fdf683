//! End-to-end benchmark of a bounded emulated run.

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use roc_bench::card::EmulatedChannel;
use roc_bench::config::MIB;
use roc_bench::{BenchConfig, BufferSize, CardFamily, CardId, DmaBench, DmaBuffer, HugePageSize};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

const PAGES: u64 = 2048;

fn benchmark_emulated_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("run");
    group.sample_size(10);

    for family in [CardFamily::Cru, CardFamily::Crorc] {
        let mut config = BenchConfig::new(CardId::Emulated(family), 0);
        config.max_pages = Some(PAGES);
        config.buffer = BufferSize {
            bytes: 4 * MIB,
            hugepage: HugePageSize::Size2M,
        };
        let page_size = config.page_size;
        let pattern = config.pattern;
        let bench = DmaBench::new(config).unwrap();
        let buffer = Arc::new(DmaBuffer::anonymous(4 * MIB).unwrap());

        group.throughput(Throughput::Bytes(PAGES * page_size as u64));
        group.bench_function(family.as_str(), |b| {
            b.iter(|| {
                let mut channel =
                    EmulatedChannel::new(family, buffer.clone(), page_size, pattern).unwrap();
                bench
                    .run(&mut channel, &buffer, &AtomicBool::new(false))
                    .unwrap()
                    .stats
                    .readout_count
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_emulated_run);
criterion_main!(benches);
