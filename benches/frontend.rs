mod common;

use calcscript::{lexer, parser, semantic};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

fn bench_frontend(c: &mut Criterion) {
    for (label, source) in common::workloads() {
        let (tokens, _) = lexer::tokenize(&source);

        c.bench_function(&format!("frontend_tokenize_{label}"), |b| {
            b.iter(|| {
                let out = lexer::tokenize(black_box(&source));
                black_box(out);
            })
        });

        c.bench_function(&format!("frontend_parse_only_{label}"), |b| {
            b.iter(|| {
                let out = parser::parse(black_box(&tokens));
                black_box(out);
            })
        });

        c.bench_function(&format!("frontend_parse_analyze_{label}"), |b| {
            b.iter(|| {
                let (program, _) = parser::parse(black_box(&tokens));
                let analysis = semantic::analyze(&program);
                black_box(analysis);
            })
        });
    }
}

criterion_group!(benches, bench_frontend);
criterion_main!(benches);
