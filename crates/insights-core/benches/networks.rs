use criterion::{black_box, criterion_group, criterion_main, Criterion};

use insights_core::centrality::centrality;
use insights_core::correlation::{build_correlation_graph, MetricMeans};
use insights_core::generator::{generate, generate_socratic};
use insights_core::graph::{build_bipartite_graph, build_co_miss_graph};
use insights_core::misses::{misses, Grouping, Level};
use insights_core::taxonomy::Taxonomy;

fn bench_miss_networks(c: &mut Criterion) {
    let mut group = c.benchmark_group("miss_networks");
    let scores = generate(42, 200, 10, &Taxonomy::default()).unwrap();
    let table = misses(&scores, 70.0).unwrap();
    let criteria = table.counts(Grouping::Student, Level::Criterion);
    let elements = table.counts(Grouping::StudentAttempt, Level::Element);

    group.bench_function("classify_200x10", |b| {
        b.iter(|| misses(black_box(&scores), black_box(70.0)))
    });

    group.bench_function("co_miss_criteria", |b| {
        b.iter(|| build_co_miss_graph(black_box(&criteria), black_box(2)))
    });

    group.bench_function("co_miss_elements_by_attempt", |b| {
        b.iter(|| build_co_miss_graph(black_box(&elements), black_box(1)))
    });

    group.bench_function("bipartite_criteria", |b| {
        b.iter(|| build_bipartite_graph(black_box(&criteria), black_box(2)).unwrap())
    });

    let bipartite = build_bipartite_graph(&criteria, 2).unwrap();
    group.bench_function("centrality_bipartite", |b| {
        b.iter(|| centrality(black_box(&bipartite)))
    });

    group.finish();
}

fn bench_correlation(c: &mut Criterion) {
    let mut group = c.benchmark_group("correlation");
    let scores = generate(42, 200, 10, &Taxonomy::proactive()).unwrap();
    let socratic = generate_socratic(42, 200, 10).unwrap();
    let a = MetricMeans::from_scores(&scores);
    let b_means = MetricMeans::from_socratic(&socratic);

    group.bench_function("metric_means", |b| {
        b.iter(|| MetricMeans::from_scores(black_box(&scores)))
    });

    group.bench_function("cross_table_200", |b| {
        b.iter(|| build_correlation_graph(black_box(&a), black_box(&b_means), black_box(0.3)))
    });

    group.finish();
}

criterion_group!(benches, bench_miss_networks, bench_correlation);
criterion_main!(benches);
