use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use quizscore_core::formula::{compile, evaluate};

const MAX_LEN: usize = 1 << 16;
const MAX_DEPTH: usize = 256;

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("formula_compile");

    let simple = "anxiety > 10";
    let typical = "(anxiety - trust) * 2 >= openness + 3 and not (energy < 1 or energy > 9)";
    let long = (0..200)
        .map(|i| format!("s{i} * {i}"))
        .collect::<Vec<_>>()
        .join(" + ")
        + " > 0";
    let nested = format!("{}1{} > 0", "(".repeat(100), ")".repeat(100));

    group.bench_function("simple", |b| {
        b.iter(|| compile(black_box(simple), MAX_LEN, MAX_DEPTH))
    });
    group.bench_function("typical", |b| {
        b.iter(|| compile(black_box(typical), MAX_LEN, MAX_DEPTH))
    });
    group.bench_function("200_terms", |b| {
        b.iter(|| compile(black_box(&long), MAX_LEN, MAX_DEPTH))
    });
    group.bench_function("100_parens", |b| {
        b.iter(|| compile(black_box(&nested), MAX_LEN, MAX_DEPTH))
    });

    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("formula_evaluate");

    let vars: BTreeMap<&str, f64> = BTreeMap::from([
        ("anxiety", 12.0),
        ("trust", 4.0),
        ("openness", 7.5),
        ("energy", 5.0),
    ]);
    let typical = "(anxiety - trust) * 2 >= openness + 3 and not (energy < 1 or energy > 9)";

    group.bench_function("typical", |b| {
        b.iter(|| evaluate(black_box(typical), black_box(&vars), MAX_LEN, MAX_DEPTH))
    });

    let expr = compile(typical, MAX_LEN, MAX_DEPTH).expect("benchmark formula compiles");
    group.bench_function("precompiled", |b| b.iter(|| expr.eval(black_box(&vars))));

    group.finish();
}

criterion_group!(benches, bench_compile, bench_evaluate);
criterion_main!(benches);
