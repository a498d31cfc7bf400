mod common;

use common::*;

use kinship::{entity_generation, entity_index, make_entity_id, ECSResult, World};

// ─── IDENTITY ────────────────────────────────────────────────────────────────

#[test]
fn entity_handles_round_trip_through_their_parts() -> ECSResult<()> {
    let mut world = World::new();
    let entity = world.spawn()?;

    let rebuilt = make_entity_id(entity_index(entity), entity_generation(entity));
    assert_eq!(rebuilt, entity);
    assert!(world.is_alive(entity));
    Ok(())
}

#[test]
fn first_allocated_index_is_one() -> ECSResult<()> {
    let mut world = World::new();
    let entity = world.spawn()?;
    assert_eq!(entity_index(entity), 1);
    Ok(())
}

// ─── RECYCLING ───────────────────────────────────────────────────────────────

#[test]
fn destroyed_index_is_recycled_with_bumped_generation() -> ECSResult<()> {
    let mut world = World::new();

    let first = world.spawn()?;
    let index = entity_index(first);
    let generation = entity_generation(first);

    world.despawn(first)?;
    let second = world.spawn()?;

    assert_eq!(entity_index(second), index);
    assert_eq!(entity_generation(second), generation + 1);
    assert!(!world.is_alive(first));
    assert!(world.is_alive(second));
    Ok(())
}

#[test]
fn stale_handles_fail_every_read() -> ECSResult<()> {
    let mut world = World::new();

    let entity = world.spawn_with((Position { x: 1.0, y: 2.0 },))?;
    world.despawn(entity)?;

    assert!(!world.is_alive(entity));
    assert!(world.get_component::<Position>(entity).is_none());
    assert!(!world.has_component::<Position>(entity));
    assert!(world.entity_row(entity).is_none());

    // Soft failures: mutations of a dead entity change nothing and succeed.
    world.add_component(entity, Velocity { dx: 1.0, dy: 0.0 })?;
    world.remove_component::<Position>(entity)?;
    world.despawn(entity)?;
    assert_eq!(world.entity_count(), 0);
    Ok(())
}

// ─── SPAWNING WITH COMPONENTS ────────────────────────────────────────────────

#[test]
fn bundle_spawn_places_all_components() -> ECSResult<()> {
    let mut world = World::new();

    let entity = world.spawn_with((
        Position { x: 3.0, y: 4.0 },
        Velocity { dx: -1.0, dy: 0.5 },
        Mass(2.5),
    ))?;

    assert_eq!(world.get_component::<Position>(entity), Some(&Position { x: 3.0, y: 4.0 }));
    assert_eq!(world.get_component::<Velocity>(entity), Some(&Velocity { dx: -1.0, dy: 0.5 }));
    assert_eq!(world.get_component::<Mass>(entity), Some(&Mass(2.5)));
    Ok(())
}

#[test]
fn tags_are_present_but_carry_no_value() -> ECSResult<()> {
    let mut world = World::new();

    let entity = world.spawn_with((Position { x: 0.0, y: 0.0 }, Frozen))?;
    assert!(world.has_component::<Frozen>(entity));
    assert!(world.get_component::<Frozen>(entity).is_none());
    Ok(())
}

// ─── SWAP-REMOVE ─────────────────────────────────────────────────────────────

#[test]
fn swap_remove_preserves_remaining_rows() -> ECSResult<()> {
    let mut world = World::new();

    let mut entities = Vec::new();
    for i in 0..5 {
        let e = world.spawn_with((Position { x: i as f32, y: 10.0 * i as f32 },))?;
        entities.push(e);
    }

    world.despawn(entities[1])?;

    for (i, &entity) in entities.iter().enumerate() {
        if i == 1 {
            assert!(!world.is_alive(entity));
            continue;
        }
        assert_eq!(
            world.get_component::<Position>(entity),
            Some(&Position { x: i as f32, y: 10.0 * i as f32 })
        );
    }

    let archetype = world.entity_archetype(entities[0]).expect("archetype");
    assert_eq!(world.entities_of(archetype).len(), 4);

    // The last row was swapped into the hole left at row 1.
    assert_eq!(world.entity_row(entities[4]), Some(1));
    Ok(())
}
