use criterion::{Criterion, black_box, criterion_group, criterion_main};
use mindcanvas_bench::crowded_chain;
use mindcanvas_core::{Rect, Vec2};
use mindcanvas_graph::{History, HitTester};

fn bench_commit_on_large_canvas(c: &mut Criterion) {
    let (graph, ids) = crowded_chain(1000);
    let mut history = History::new(graph).with_limit(Some(100));
    let mut offset = 0.0;

    // Each commit shares every untouched node with the previous snapshot.
    c.bench_function("move_one_node_1000_nodes", |b| {
        b.iter(|| {
            offset += 1.0;
            let mut next = history.present().clone();
            next.set_positions(black_box(&[(ids[0], Vec2::new(offset, 0.0))]));
            history.commit(next);
        })
    });
}

fn bench_hit_testing(c: &mut Criterion) {
    let (graph, _) = crowded_chain(1000);
    let tester = HitTester::from_graph(&graph, 1.0);
    let area = Rect::from_points(Vec2::new(100.0, 100.0), Vec2::new(600.0, 400.0));

    c.bench_function("hit_test_1000_nodes", |b| {
        b.iter(|| black_box(tester.hit_test(black_box(Vec2::new(725.0, 530.0)))))
    });
    c.bench_function("rect_select_1000_nodes", |b| {
        b.iter(|| black_box(tester.nodes_in_rect(black_box(&area))))
    });
}

criterion_group!(benches, bench_commit_on_large_canvas, bench_hit_testing);
criterion_main!(benches);
