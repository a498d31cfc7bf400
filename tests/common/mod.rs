#![allow(dead_code)]

use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Velocity {
    pub dx: f32,
    pub dy: f32,
}

#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Mass(pub f32);

#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Wealth(pub u64);

/// Data-carrying relation: the pair payload is the relation's backing type.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Distance(pub f32);

macro_rules! tag {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
        pub struct $name;

        unsafe impl Zeroable for $name {}
        unsafe impl Pod for $name {}
    };
}

tag!(Frozen);
tag!(Hidden);

// Tag relations.
tag!(ChildOf);
tag!(DockedTo);
tag!(Likes);
