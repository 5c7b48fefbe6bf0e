use criterion::*;
use std::hint::black_box;

use ecs_framework::prelude::*;

mod common;
use common::*;

fn iterate_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    group.bench_function("integrate_sequential_10k", |b| {
        b.iter_batched(
            || make_world(PARTICLES_LARGE),
            |es| {
                let view = EntityView::new(&es)
                    .with_components::<MatchAll, (Position, Velocity)>();
                view.for_each(|_, (pos, vel)| {
                    pos.x += vel.x;
                    pos.y += vel.y;
                });
                drop(view);
                black_box(es);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("integrate_parallel_10k", |b| {
        b.iter_batched(
            || {
                let es = make_world(PARTICLES_LARGE);
                let queue = JobQueue::new().unwrap();
                (es, queue)
            },
            |(es, queue)| {
                let view = EntityView::new(&es)
                    .with_components::<MatchAll, (Position, Velocity)>()
                    .parallel_with(&queue);
                view.par_for_each(|_, (pos, vel)| {
                    pos.x += vel.x;
                    pos.y += vel.y;
                });
                black_box(&es);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("entity_walk_10k", |b| {
        b.iter_batched(
            || make_world(PARTICLES_LARGE),
            |es| {
                let mut count = 0usize;
                EntityView::new(&es).for_each(|ent| {
                    if ent.has_component::<Position>() {
                        count += 1;
                    }
                });
                black_box(count);
                black_box(es);
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

fn spawn_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn");

    group.bench_function("spawn_1k_with_two_components", |b| {
        b.iter(|| {
            let es = make_world(PARTICLES_SMALL);
            black_box(es);
        });
    });

    group.bench_function("spawn_destroy_reuse_1k", |b| {
        b.iter_batched(
            || make_world(PARTICLES_SMALL),
            |es| {
                let ids: Vec<EntityId> = EntityView::new(&es)
                    .iter()
                    .map(|ent| ent.id())
                    .collect();
                for id in &ids {
                    es.destroy_entity(*id);
                }
                for _ in 0..PARTICLES_SMALL {
                    es.create_entity().unwrap();
                }
                black_box(es);
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, iterate_benchmark, spawn_benchmark);
criterion_main!(benches);
