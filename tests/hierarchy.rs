mod common;

use common::*;

use kinship::{hierarchy, not, term, Cascade, ECSResult, EntityID, World};

// ─── CASCADE DESTRUCTION ─────────────────────────────────────────────────────

#[test]
fn destroying_a_root_cascades_down_the_chain() -> ECSResult<()> {
    let mut world = World::new();
    world.add_trait::<ChildOf, Cascade>()?;

    let grandparent = world.spawn()?;
    let parent = world.spawn()?;
    let child = world.spawn()?;

    world.add_pair_target::<ChildOf>(parent, grandparent)?;
    world.add_pair_target::<ChildOf>(child, parent)?;

    world.despawn(grandparent)?;

    assert!(!world.is_alive(grandparent));
    assert!(!world.is_alive(parent));
    assert!(!world.is_alive(child));
    Ok(())
}

#[test]
fn cascade_only_applies_to_marked_relations() -> ECSResult<()> {
    let mut world = World::new();
    world.add_trait::<ChildOf, Cascade>()?;

    let station = world.spawn()?;
    let ship = world.spawn()?;
    world.add_pair_target::<DockedTo>(ship, station)?;

    world.despawn(station)?;

    assert!(!world.is_alive(station));
    assert!(world.is_alive(ship));
    Ok(())
}

#[test]
fn cyclic_cascade_terminates_and_kills_the_cycle() -> ECSResult<()> {
    let mut world = World::new();
    world.add_trait::<ChildOf, Cascade>()?;

    let first = world.spawn()?;
    let second = world.spawn()?;

    world.add_pair_target::<ChildOf>(first, second)?;
    world.add_pair_target::<ChildOf>(second, first)?;

    world.despawn(first)?;

    assert!(!world.is_alive(first));
    assert!(!world.is_alive(second));
    Ok(())
}

// ─── DEPTH-ORDERED ITERATION ─────────────────────────────────────────────────

#[test]
fn cascade_queries_visit_parents_before_children() -> ECSResult<()> {
    let mut world = World::new();

    // Interleaved creation order; depth must come from the relation graph,
    // not from insertion order.
    let leaf_one = world.spawn_with((Position { x: 0.0, y: 0.0 },))?;
    let root_one = world.spawn_with((Position { x: 1.0, y: 0.0 },))?;
    let mid_two = world.spawn_with((Position { x: 2.0, y: 0.0 },))?;
    let root_two = world.spawn_with((Position { x: 3.0, y: 0.0 },))?;
    let mid_one = world.spawn_with((Position { x: 4.0, y: 0.0 },))?;
    let leaf_two = world.spawn_with((Position { x: 5.0, y: 0.0 },))?;

    world.add_pair_target::<ChildOf>(mid_one, root_one)?;
    world.add_pair_target::<ChildOf>(mid_two, root_two)?;
    world.add_pair_target::<ChildOf>(leaf_one, mid_one)?;
    world.add_pair_target::<ChildOf>(leaf_two, mid_two)?;

    let mut order: Vec<EntityID> = Vec::new();
    world.each(&[term::<Position>(), hierarchy::<ChildOf>()], |_, hit| {
        order.push(hit.entity);
    })?;
    assert_eq!(order.len(), 6);

    let position_of = |entity: EntityID| {
        order.iter().position(|&seen| seen == entity).expect("entity visited")
    };

    for root in [root_one, root_two] {
        for mid in [mid_one, mid_two] {
            assert!(position_of(root) < position_of(mid));
        }
    }
    for mid in [mid_one, mid_two] {
        for leaf in [leaf_one, leaf_two] {
            assert!(position_of(mid) < position_of(leaf));
        }
    }
    Ok(())
}

#[test]
fn additional_cascade_terms_filter_like_wildcards() -> ECSResult<()> {
    let mut world = World::new();

    let station = world.spawn()?;
    let root = world.spawn_with((Position { x: 0.0, y: 0.0 },))?;
    let child = world.spawn_with((Position { x: 1.0, y: 0.0 },))?;
    let outsider = world.spawn_with((Position { x: 2.0, y: 0.0 },))?;

    world.add_pair_target::<ChildOf>(child, root)?;
    world.add_pair_target::<DockedTo>(root, station)?;
    world.add_pair_target::<DockedTo>(child, station)?;

    // Only the first cascade term governs ordering; the second resolves as
    // an ordinary wildcard pair and filters out the undocked entity.
    let mut order = Vec::new();
    world.each(
        &[term::<Position>(), hierarchy::<ChildOf>(), hierarchy::<DockedTo>()],
        |_, hit| order.push(hit.entity),
    )?;

    assert_eq!(order, vec![root, child]);
    assert!(world.is_alive(outsider));
    Ok(())
}

#[test]
fn negated_cascade_terms_filter_like_negated_wildcards() -> ECSResult<()> {
    let mut world = World::new();

    let root = world.spawn_with((Position { x: 0.0, y: 0.0 },))?;
    let child = world.spawn_with((Position { x: 1.0, y: 0.0 },))?;
    world.add_pair_target::<ChildOf>(child, root)?;

    let mut hits = Vec::new();
    world.each(&[term::<Position>(), not(hierarchy::<ChildOf>())], |_, hit| {
        hits.push(hit.entity);
    })?;

    assert_eq!(hits, vec![root]);
    Ok(())
}

#[test]
fn cascade_ordering_survives_later_structural_changes() -> ECSResult<()> {
    let mut world = World::new();

    let root = world.spawn_with((Position { x: 0.0, y: 0.0 },))?;
    let child = world.spawn_with((Position { x: 1.0, y: 0.0 },))?;
    world.add_pair_target::<ChildOf>(child, root)?;

    let mut order = Vec::new();
    world.each(&[term::<Position>(), hierarchy::<ChildOf>()], |_, hit| {
        order.push(hit.entity);
    })?;
    assert_eq!(order, vec![root, child]);

    // New subtree under the existing child: the rebuilt cache must place
    // it after both ancestors.
    let grandchild = world.spawn_with((Position { x: 2.0, y: 0.0 },))?;
    world.add_pair_target::<ChildOf>(grandchild, child)?;

    let mut order = Vec::new();
    world.each(&[term::<Position>(), hierarchy::<ChildOf>()], |_, hit| {
        order.push(hit.entity);
    })?;
    assert_eq!(order, vec![root, child, grandchild]);
    Ok(())
}
