#![allow(dead_code)]

use bytemuck::{Pod, Zeroable};

use kinship::{ECSResult, EntityID, World};

pub const ENTITIES_SMALL: usize = 1_000;
pub const ENTITIES_MED: usize = 10_000;
pub const ENTITIES_LARGE: usize = 100_000;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct Velocity {
    pub dx: f32,
    pub dy: f32,
}

#[repr(transparent)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct Wealth(pub u64);

#[derive(Clone, Copy)]
pub struct ChildOf;

unsafe impl Zeroable for ChildOf {}
unsafe impl Pod for ChildOf {}

pub fn populate(world: &mut World, count: usize) -> ECSResult<Vec<EntityID>> {
    let mut entities = Vec::with_capacity(count);
    for i in 0..count {
        let entity = world.spawn_with((
            Position { x: i as f32, y: 0.0 },
            Velocity { dx: 1.0, dy: 0.0 },
        ))?;
        if i % 3 == 0 {
            world.add_component(entity, Wealth(i as u64))?;
        }
        entities.push(entity);
    }
    Ok(entities)
}
