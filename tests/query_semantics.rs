mod common;

use std::collections::HashSet;

use common::*;

use kinship::{
    any, none, not, on, pair_var, term, ECSResult, EntityID, QueryFlags, World,
};

fn collect(world: &mut World, terms: &[kinship::TermArg]) -> ECSResult<Vec<EntityID>> {
    let mut entities = Vec::new();
    world.each(terms, |_, hit| entities.push(hit.entity))?;
    Ok(entities)
}

// ─── REQUIRED AND EXCLUDED ───────────────────────────────────────────────────

#[test]
fn terms_conjoin_and_negation_excludes() -> ECSResult<()> {
    let mut world = World::new();

    let plain = world.spawn_with((Position { x: 0.0, y: 0.0 },))?;
    let moving =
        world.spawn_with((Position { x: 1.0, y: 0.0 }, Velocity { dx: 1.0, dy: 0.0 }))?;
    let heavy = world.spawn_with((Position { x: 2.0, y: 0.0 }, Mass(9.0)))?;
    let unrelated = world.spawn_with((Wealth(100),))?;

    let with_position = collect(&mut world, &[term::<Position>()])?;
    assert_eq!(
        with_position.iter().collect::<HashSet<_>>(),
        [plain, moving, heavy].iter().collect::<HashSet<_>>()
    );

    let still = collect(&mut world, &[term::<Position>(), not(term::<Velocity>())])?;
    assert_eq!(still.iter().collect::<HashSet<_>>(), [plain, heavy].iter().collect::<HashSet<_>>());

    let rich = collect(&mut world, &[term::<Wealth>()])?;
    assert_eq!(rich, vec![unrelated]);
    Ok(())
}

#[test]
fn unseen_component_kinds_match_nothing() -> ECSResult<()> {
    let mut world = World::new();
    world.spawn_with((Position { x: 0.0, y: 0.0 },))?;

    let hits = collect(&mut world, &[term::<Hidden>()])?;
    assert!(hits.is_empty());
    Ok(())
}

// ─── GROUPS ──────────────────────────────────────────────────────────────────

#[test]
fn any_groups_accept_either_branch() -> ECSResult<()> {
    let mut world = World::new();

    let moving =
        world.spawn_with((Position { x: 0.0, y: 0.0 }, Velocity { dx: 1.0, dy: 0.0 }))?;
    let heavy = world.spawn_with((Position { x: 0.0, y: 0.0 }, Mass(3.0)))?;
    let bare = world.spawn_with((Position { x: 0.0, y: 0.0 },))?;

    let hits = collect(
        &mut world,
        &[term::<Position>(), any(vec![term::<Velocity>(), term::<Mass>()])],
    )?;
    let hits: HashSet<_> = hits.into_iter().collect();
    assert!(hits.contains(&moving));
    assert!(hits.contains(&heavy));
    assert!(!hits.contains(&bare));
    Ok(())
}

#[test]
fn none_groups_reject_every_branch() -> ECSResult<()> {
    let mut world = World::new();

    let bare = world.spawn_with((Position { x: 0.0, y: 0.0 },))?;
    let moving =
        world.spawn_with((Position { x: 0.0, y: 0.0 }, Velocity { dx: 1.0, dy: 0.0 }))?;
    let frozen = world.spawn_with((Position { x: 0.0, y: 0.0 }, Frozen))?;

    let hits = collect(
        &mut world,
        &[term::<Position>(), none(vec![term::<Velocity>(), term::<Frozen>()])],
    )?;
    assert_eq!(hits, vec![bare]);
    assert!(world.is_alive(moving) && world.is_alive(frozen));
    Ok(())
}

// ─── CAPTURES ────────────────────────────────────────────────────────────────

#[test]
fn var_targets_bind_the_matched_parent() -> ECSResult<()> {
    let mut world = World::new();

    let parent = world.spawn()?;
    let child = world.spawn_with((Position { x: 0.0, y: 0.0 },))?;
    world.add_pair_target::<ChildOf>(child, parent)?;

    let mut seen = Vec::new();
    world.each(&[pair_var::<ChildOf>(0)], |_, hit| {
        seen.push((hit.entity, hit.bindings[0]));
    })?;

    assert_eq!(seen, vec![(child, parent)]);
    Ok(())
}

// ─── SOURCES ─────────────────────────────────────────────────────────────────

#[test]
fn foreign_sourced_terms_do_not_constrain_matching() -> ECSResult<()> {
    let mut world = World::new();

    let plain = world.spawn_with((Position { x: 0.0, y: 0.0 },))?;
    let moving =
        world.spawn_with((Position { x: 1.0, y: 0.0 }, Velocity { dx: 1.0, dy: 0.0 }))?;

    // A term sourced at another variable leaves the iterated entity's
    // archetype unconstrained; only This-sourced terms filter.
    let hits: HashSet<_> =
        collect(&mut world, &[term::<Position>(), on(1, term::<Velocity>())])?
            .into_iter()
            .collect();
    assert_eq!(hits, [plain, moving].into_iter().collect::<HashSet<_>>());

    // The same holds for negated and grouped forms.
    let hits = collect(
        &mut world,
        &[term::<Position>(), on(1, not(term::<Velocity>()))],
    )?;
    assert_eq!(hits.len(), 2);

    let hits = collect(
        &mut world,
        &[term::<Position>(), any(vec![on(1, term::<Velocity>()), on(2, term::<Mass>())])],
    )?;
    assert_eq!(hits.len(), 2);
    Ok(())
}

// ─── CACHE BEHAVIOR ──────────────────────────────────────────────────────────

#[test]
fn repeated_queries_yield_identical_sets() -> ECSResult<()> {
    let mut world = World::new();

    for i in 0..8 {
        if i % 2 == 0 {
            world.spawn_with((Position { x: i as f32, y: 0.0 },))?;
        } else {
            world.spawn_with((Position { x: i as f32, y: 0.0 }, Mass(i as f32)))?;
        }
    }

    let first: HashSet<_> = collect(&mut world, &[term::<Position>()])?.into_iter().collect();
    let second: HashSet<_> = collect(&mut world, &[term::<Position>()])?.into_iter().collect();
    assert_eq!(first, second);

    world.clear_query_cache();
    let third: HashSet<_> = collect(&mut world, &[term::<Position>()])?.into_iter().collect();
    assert_eq!(first, third);
    Ok(())
}

#[test]
fn structural_changes_invalidate_cached_matches() -> ECSResult<()> {
    let mut world = World::new();

    world.spawn_with((Position { x: 0.0, y: 0.0 },))?;
    assert_eq!(collect(&mut world, &[term::<Position>()])?.len(), 1);

    // A new archetype appears; the cached query must pick it up.
    world.spawn_with((Position { x: 1.0, y: 1.0 }, Velocity { dx: 0.0, dy: 1.0 }))?;
    assert_eq!(collect(&mut world, &[term::<Position>()])?.len(), 2);
    Ok(())
}

// ─── DISABLED COMPONENTS ─────────────────────────────────────────────────────

#[test]
fn disabled_components_mask_rows_from_queries() -> ECSResult<()> {
    let mut world = World::new();

    let visible = world.spawn_with((Position { x: 0.0, y: 0.0 },))?;
    let masked = world.spawn_with((Position { x: 1.0, y: 0.0 },))?;

    assert!(world.disable_component::<Position>(masked));
    assert!(world.is_component_disabled::<Position>(masked));

    let hits = collect(&mut world, &[term::<Position>()])?;
    assert_eq!(hits, vec![visible]);

    // The data itself is untouched and reachable.
    assert!(world.get_component::<Position>(masked).is_some());

    let mut with_disabled = Vec::new();
    world.each_filtered(
        &[term::<Position>()],
        QueryFlags { include_disabled: true },
        |_, hit| with_disabled.push(hit.entity),
    )?;
    assert_eq!(with_disabled.len(), 2);

    assert!(world.enable_component::<Position>(masked));
    let hits = collect(&mut world, &[term::<Position>()])?;
    assert_eq!(hits.len(), 2);
    Ok(())
}

// ─── MANUAL ITERATION ────────────────────────────────────────────────────────

#[test]
fn manual_iteration_supports_early_exit() -> ECSResult<()> {
    let mut world = World::new();

    for i in 0..6 {
        world.spawn_with((Position { x: i as f32, y: 0.0 },))?;
    }

    let mut iter = world.query_iter(&[term::<Position>()])?;
    let mut taken = 0;
    while let Some(hit) = world.query_next(&mut iter)? {
        taken += 1;
        assert!(world.is_alive(hit.entity));
        if taken == 3 {
            break;
        }
    }
    world.query_finish(iter)?;

    // The scope was released: structural changes apply immediately again.
    let extra = world.spawn_with((Position { x: 9.0, y: 9.0 },))?;
    world.despawn(extra)?;
    assert!(!world.is_alive(extra));
    Ok(())
}

#[test]
fn manual_iteration_releases_itself_on_exhaustion() -> ECSResult<()> {
    let mut world = World::new();

    let entity = world.spawn_with((Position { x: 0.0, y: 0.0 },))?;

    let mut iter = world.query_iter(&[term::<Position>()])?;
    let mut count = 0;
    while world.query_next(&mut iter)?.is_some() {
        count += 1;
    }
    assert_eq!(count, 1);

    // Exhaustion closed the scope; this destroy is immediate.
    world.despawn(entity)?;
    assert!(!world.is_alive(entity));
    Ok(())
}
