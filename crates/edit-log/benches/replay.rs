//! Row codec and replay benchmarks.
#![allow(missing_docs)]

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use edit_log::{EditRow, HEADING, decode_row, encode_row, replay, splice_utf16};

fn typing_log(rows: u64) -> String {
    let mut log = String::from(HEADING);
    log.push_str(&encode_row(&EditRow::tab(1, 0, "src/lib.rs", "", "rust")));
    let mut len = 0;
    for seq in 2..=rows {
        let ch = if seq % 40 == 0 { "\n" } else { "x" };
        log.push_str(&encode_row(&EditRow::content(
            seq,
            seq * 120,
            "src/lib.rs",
            len,
            0,
            ch,
            "rust",
        )));
        len += 1;
    }
    log
}

fn bench_codec(c: &mut Criterion) {
    let row = EditRow::content(
        42,
        12_500,
        "src/handlers/session.rs",
        1024,
        3,
        "match event {\n\t\"quoted\" => {}\n}",
        "rust",
    );
    let line = encode_row(&row);

    c.bench_function("encode_row", |b| b.iter(|| encode_row(black_box(&row))));
    c.bench_function("decode_row", |b| b.iter(|| decode_row(black_box(&line))));
}

fn bench_splice(c: &mut Criterion) {
    let doc = "fn main() {\n    println!(\"héllo 🦀\");\n}\n".repeat(200);
    c.bench_function("splice_utf16_middle", |b| {
        b.iter(|| splice_utf16(black_box(&doc), 4000, 5, "world"));
    });
}

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");
    for rows in [100u64, 1000, 5000] {
        let log = typing_log(rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &log, |b, log| {
            b.iter(|| replay(black_box(log.as_bytes()), rows * 120 + 1000));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_codec, bench_splice, bench_replay);
criterion_main!(benches);
