mod common;

use std::collections::HashSet;

use common::*;

use kinship::{
    is_pair, make_pair_id, not, pair_relation, pair_target, pair_wildcard, Cascade, ECSResult,
    Exclusive, World,
};

// ─── ENCODING ────────────────────────────────────────────────────────────────

#[test]
fn pair_ids_round_trip_and_carry_the_flag() {
    let pair = make_pair_id(12, 345).expect("encodable");
    assert!(is_pair(pair));
    assert_eq!(pair_relation(pair), 12);
    assert_eq!(pair_target(pair), 345);
    assert_eq!(make_pair_id(pair_relation(pair), pair_target(pair)).expect("encodable"), pair);
}

#[test]
fn oversized_fields_fail_encoding() {
    assert!(make_pair_id(1 << 15, 0).is_err());
    assert!(make_pair_id(0, 1 << 16).is_err());
}

// ─── PAIR OPERATIONS ─────────────────────────────────────────────────────────

#[test]
fn entity_target_pairs_are_queryable_per_target() -> ECSResult<()> {
    let mut world = World::new();

    let station_a = world.spawn()?;
    let station_b = world.spawn()?;
    let ship = world.spawn_with((Position { x: 0.0, y: 0.0 },))?;

    world.add_pair_target::<DockedTo>(ship, station_a)?;
    assert!(world.has_pair_target::<DockedTo>(ship, station_a));
    assert!(!world.has_pair_target::<DockedTo>(ship, station_b));

    assert_eq!(world.relation_targets::<DockedTo>(ship), vec![station_a]);

    world.remove_pair_target::<DockedTo>(ship, station_a)?;
    assert!(!world.has_pair_target::<DockedTo>(ship, station_a));
    Ok(())
}

#[test]
fn data_relations_store_and_overwrite_payloads() -> ECSResult<()> {
    let mut world = World::new();

    let beacon = world.spawn()?;
    let probe = world.spawn()?;

    world.add_pair_target_value::<Distance>(probe, beacon, Distance(5.0))?;
    assert_eq!(world.get_pair_target::<Distance>(probe, beacon), Some(&Distance(5.0)));

    // Adding the same pair again keeps the archetype and overwrites the
    // payload.
    let archetype = world.entity_archetype(probe);
    world.add_pair_target_value::<Distance>(probe, beacon, Distance(7.5))?;
    assert_eq!(world.entity_archetype(probe), archetype);
    assert_eq!(world.get_pair_target::<Distance>(probe, beacon), Some(&Distance(7.5)));
    Ok(())
}

#[test]
fn type_target_pairs_are_independent_identifiers() -> ECSResult<()> {
    let mut world = World::new();

    let entity = world.spawn()?;
    world.add_pair::<Likes, Position>(entity)?;

    assert!(world.has_pair::<Likes, Position>(entity));
    assert!(!world.has_pair::<Likes, Velocity>(entity));

    world.remove_pair::<Likes, Position>(entity)?;
    assert!(!world.has_pair::<Likes, Position>(entity));
    Ok(())
}

#[test]
fn entity_relations_work_without_registration() -> ECSResult<()> {
    let mut world = World::new();

    let owes = world.spawn()?;
    let creditor = world.spawn()?;
    let debtor = world.spawn()?;

    world.add_entity_pair(debtor, owes, creditor)?;
    assert!(world.has_entity_pair(debtor, owes, creditor));
    assert!(!world.has_entity_pair(creditor, owes, debtor));

    world.remove_entity_pair(debtor, owes, creditor)?;
    assert!(!world.has_entity_pair(debtor, owes, creditor));
    Ok(())
}

// ─── WILDCARD QUERIES ────────────────────────────────────────────────────────

#[test]
fn wildcard_pair_queries_match_any_target() -> ECSResult<()> {
    let mut world = World::new();

    let parent_one = world.spawn()?;
    let parent_two = world.spawn()?;

    let child_one = world.spawn()?;
    let child_two = world.spawn()?;
    let child_three = world.spawn()?;
    let orphan = world.spawn()?;

    world.add_pair_target::<ChildOf>(child_one, parent_one)?;
    world.add_pair_target::<ChildOf>(child_two, parent_one)?;
    world.add_pair_target::<ChildOf>(child_three, parent_two)?;

    let mut children = HashSet::new();
    world.each(&[pair_wildcard::<ChildOf>()], |_, hit| {
        children.insert(hit.entity);
    })?;
    assert_eq!(
        children,
        [child_one, child_two, child_three].into_iter().collect::<HashSet<_>>()
    );

    let mut childless = HashSet::new();
    world.each(&[not(pair_wildcard::<ChildOf>())], |_, hit| {
        childless.insert(hit.entity);
    })?;
    assert!(childless.contains(&orphan));
    assert!(childless.contains(&parent_one));
    assert!(childless.is_disjoint(&children));
    Ok(())
}

// ─── EXCLUSIVE ───────────────────────────────────────────────────────────────

#[test]
fn exclusive_relations_keep_only_the_latest_pair() -> ECSResult<()> {
    let mut world = World::new();
    world.add_trait::<DockedTo, Exclusive>()?;

    let station_one = world.spawn()?;
    let station_two = world.spawn()?;
    let station_three = world.spawn()?;
    let ship = world.spawn()?;

    world.add_pair_target::<DockedTo>(ship, station_one)?;
    world.add_pair_target::<DockedTo>(ship, station_two)?;
    world.add_pair_target::<DockedTo>(ship, station_three)?;

    assert!(!world.has_pair_target::<DockedTo>(ship, station_one));
    assert!(!world.has_pair_target::<DockedTo>(ship, station_two));
    assert!(world.has_pair_target::<DockedTo>(ship, station_three));
    assert_eq!(world.relation_targets::<DockedTo>(ship), vec![station_three]);
    Ok(())
}

#[test]
fn non_exclusive_relations_accumulate_pairs() -> ECSResult<()> {
    let mut world = World::new();

    let parent_one = world.spawn()?;
    let parent_two = world.spawn()?;
    let child = world.spawn()?;

    world.add_pair_target::<ChildOf>(child, parent_one)?;
    world.add_pair_target::<ChildOf>(child, parent_two)?;

    let targets: HashSet<_> = world.relation_targets::<ChildOf>(child).into_iter().collect();
    assert_eq!(targets, [parent_one, parent_two].into_iter().collect::<HashSet<_>>());
    Ok(())
}

// ─── TRAIT ANCHORS ───────────────────────────────────────────────────────────

#[test]
fn traits_anchor_on_type_entities() -> ECSResult<()> {
    let mut world = World::new();

    assert!(!world.has_trait::<ChildOf, Cascade>());
    world.add_trait::<ChildOf, Cascade>()?;
    assert!(world.has_trait::<ChildOf, Cascade>());
    assert!(!world.has_trait::<ChildOf, Exclusive>());
    assert!(!world.has_trait::<DockedTo, Cascade>());

    // The anchor is a stable hidden entity.
    let anchor = world.type_entity::<ChildOf>()?;
    assert_eq!(world.type_entity::<ChildOf>()?, anchor);
    assert!(world.is_alive(anchor));
    Ok(())
}
