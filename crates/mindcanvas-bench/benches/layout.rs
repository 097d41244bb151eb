use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use mindcanvas_bench::crowded_chain;
use mindcanvas_graph::{CancellationToken, ForceLayouter, LayoutInput, Layouter};

fn bench_force_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("force_layout");
    group.sample_size(10);

    // 64 is where the repulsion sum switches to rayon.
    for count in [16usize, 63, 64, 200] {
        let (graph, ids) = crowded_chain(count);
        let input = LayoutInput::from_graph(&graph, &ids);
        let token = CancellationToken::new();

        group.bench_with_input(BenchmarkId::from_parameter(count), &input, |b, input| {
            b.iter(|| {
                let outcome = ForceLayouter.execute(black_box(input), &token);
                black_box(outcome);
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_force_layout);
criterion_main!(benches);
