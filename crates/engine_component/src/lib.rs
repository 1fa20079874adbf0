//! # engine_component
//!
//! The "C" in ECS. Defines what a component is, how entities sharing a set
//! of components are grouped, and how systems find them again.
//!
//! This crate provides:
//!
//! - [`Component`] trait and [`ComponentRegistry`]: registration-ordered
//!   component type identifiers.
//! - [`Entity`]: lightweight, never-reused `u64` identifiers.
//! - [`Layout`] and [`Archetype`]: column storage grouped by component set.
//! - [`ArchetypeStore`]: the archetype list plus the entity location index.
//! - [`Filter`] and [`Query`]: layout predicates and per-world cached queries.

pub mod archetype;
pub mod component;
pub mod entity;
pub mod error;
pub mod filter;
pub mod query;
pub mod storage;

pub use archetype::{Archetype, ArchetypeIndex, Column, Layout};
pub use component::{Component, ComponentMeta, ComponentRegistry, ComponentTypeId, Components};
pub use entity::{Entity, EntityAllocator};
pub use error::StorageError;
pub use filter::Filter;
pub use query::{CacheState, Query};
pub use storage::{ArchetypeStore, EntityLocation, StoreSnapshot, WorldId};
