//! Benchmarks for chunking and caption parsing.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use bookreel::chunking::split_into_chunks;
use bookreel::subtitles::{format_srt, parse_srt, CaptionSegment};
use std::time::Duration;

fn book_text(chars: usize) -> String {
    "It is a truth universally acknowledged, that a single man in possession of a good fortune, must be in want of a wife. "
        .chars()
        .cycle()
        .take(chars)
        .collect()
}

fn transcript(blocks: usize) -> String {
    let segments: Vec<CaptionSegment> = (1..=blocks)
        .map(|i| CaptionSegment {
            index: i,
            start: Duration::from_millis((i as u64 - 1) * 2500),
            end: Duration::from_millis(i as u64 * 2500),
            text: format!("Caption number {i}, spoken by the narrator."),
        })
        .collect();
    format_srt(&segments)
}

fn chunking_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_into_chunks");
    for chars in [40_000, 400_000] {
        let text = book_text(chars);
        group.bench_with_input(BenchmarkId::from_parameter(chars), &text, |b, text| {
            b.iter(|| split_into_chunks(black_box(text), 4000));
        });
    }
    group.finish();
}

fn srt_benchmark(c: &mut Criterion) {
    let srt = transcript(200);
    c.bench_function("parse_srt_200_blocks", |b| {
        b.iter(|| parse_srt(black_box(&srt)));
    });
}

criterion_group!(benches, chunking_benchmark, srt_benchmark);
criterion_main!(benches);
