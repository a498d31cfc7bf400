//! # Engine Module
//!
//! Internal ECS engine implementation.
//!
//! This module contains all core building blocks:
//! - Identifier layouts and limits
//! - Entity index and records
//! - Component registry and columnar storage
//! - Archetypes and transition edges
//! - Pair encoding and relation traits
//! - Query terms, matching, and the query cache
//! - Deferred ops and observers
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod storage;
pub mod component;
pub mod entity;
pub mod pair;
pub mod archetype;
pub mod term;
pub mod query;
pub mod commands;
pub mod relation;
pub mod observer;
pub mod world;
