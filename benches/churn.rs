use criterion::*;
use std::hint::black_box;

use kinship::World;

mod common;
use common::*;

// Add/remove churn exercises the transition edge cache: after the first
// lap every move reuses a precomputed column map.
fn churn_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("churn");

    group.bench_function("toggle_component_10k", |b| {
        b.iter_batched(
            || {
                let mut world = World::new();
                let entities = populate(&mut world, ENTITIES_MED).unwrap();
                (world, entities)
            },
            |(mut world, entities)| {
                for &entity in &entities {
                    world.add_component(entity, Wealth(1)).unwrap();
                }
                for &entity in &entities {
                    world.remove_component::<Wealth>(entity).unwrap();
                }
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("pair_retarget_1k", |b| {
        b.iter_batched(
            || {
                let mut world = World::new();
                let parents = populate(&mut world, 16).unwrap();
                let children = populate(&mut world, ENTITIES_SMALL).unwrap();
                (world, parents, children)
            },
            |(mut world, parents, children)| {
                for (i, &child) in children.iter().enumerate() {
                    world
                        .add_pair_target::<ChildOf>(child, parents[i % parents.len()])
                        .unwrap();
                }
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, churn_benchmark);
criterion_main!(benches);
