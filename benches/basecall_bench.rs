//! Performance benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use basecall::genomics::{
    consensus_call, entropy, AlignedRead, CigarOp, CigarOpKind, NoReference, StatsCache,
    VecAlignmentSource,
};
use basecall::{BaseCaller, BasecallConfig, NeverAbort};

const BASES: [u8; 4] = *b"ACGT";

fn tiled_reads(count: u32, len: u32, step: u32) -> Vec<AlignedRead> {
    (0..count)
        .map(|idx| {
            let sequence: Vec<u8> = (0..len)
                .map(|offset| BASES[((idx + offset) % 4) as usize])
                .collect();
            AlignedRead::new(
                0,
                format!("read{idx}"),
                idx * step,
                vec![CigarOp::new(CigarOpKind::Match, len)],
                sequence,
                vec![30; len as usize],
                idx % 2 == 1,
            )
        })
        .collect()
}

fn benchmark_statistics(c: &mut Criterion) {
    c.bench_function("consensus_call", |b| {
        b.iter(|| consensus_call(black_box(0.01), black_box(40), black_box(3), black_box(1), 0))
    });
    c.bench_function("entropy", |b| {
        b.iter(|| entropy(black_box(40), black_box(3), black_box(1), black_box(0)))
    });
    c.bench_function("entropy_cached", |b| {
        let mut cache = StatsCache::new();
        b.iter(|| cache.entropy(black_box([40, 3, 1, 0])))
    });
}

fn benchmark_pipeline(c: &mut Criterion) {
    let reads = tiled_reads(10_000, 100, 5);
    let config = BasecallConfig::default().with_show_strand(true);

    c.bench_function("call_10k_reads", |b| {
        b.iter(|| {
            let source = VecAlignmentSource::new(&["chr1"], reads.clone());
            let mut caller = BaseCaller::new(source, Box::new(NoReference), config.clone())
                .expect("valid configuration");
            let mut rows = 0u64;
            caller
                .run(None, &mut NeverAbort, |row| {
                    black_box(&row);
                    rows += 1;
                    Ok(())
                })
                .expect("base calling succeeds");
            black_box(rows)
        });
    });
}

criterion_group!(benches, benchmark_statistics, benchmark_pipeline);
criterion_main!(benches);
