use criterion::*;
use std::hint::black_box;

use kinship::{pair_wildcard, term, World};

mod common;
use common::*;

fn iterate_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    for &(label, n) in &[("each_10k", ENTITIES_MED), ("each_100k", ENTITIES_LARGE)] {
        group.bench_function(label, |b| {
            let mut world = World::new();
            populate(&mut world, n).unwrap();

            b.iter(|| {
                let mut sum = 0.0f32;
                world
                    .each(&[term::<Position>(), term::<Velocity>()], |world, hit| {
                        let position =
                            world.get_component::<Position>(hit.entity).unwrap();
                        sum += position.x;
                    })
                    .unwrap();
                black_box(sum);
            });
        });
    }

    group.bench_function("columns_100k", |b| {
        let mut world = World::new();
        populate(&mut world, ENTITIES_LARGE).unwrap();

        b.iter(|| {
            let mut sum = 0.0f32;
            let archetypes = world.query_archetypes(&[term::<Position>()]).unwrap();
            for archetype in archetypes {
                if let Some(positions) = world.column::<Position>(archetype) {
                    for position in positions {
                        sum += position.x;
                    }
                }
            }
            black_box(sum);
        });
    });

    group.bench_function("wildcard_pairs_1k", |b| {
        let mut world = World::new();
        let parents = populate(&mut world, 16).unwrap();
        let children = populate(&mut world, ENTITIES_SMALL).unwrap();
        for (i, &child) in children.iter().enumerate() {
            world.add_pair_target::<ChildOf>(child, parents[i % parents.len()]).unwrap();
        }

        b.iter(|| {
            let mut count = 0usize;
            world.each(&[pair_wildcard::<ChildOf>()], |_, _| count += 1).unwrap();
            black_box(count);
        });
    });

    group.finish();
}

criterion_group!(benches, iterate_benchmark);
criterion_main!(benches);
