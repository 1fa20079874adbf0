//! Storage-layer error types.

use crate::component::ComponentTypeId;
use crate::entity::Entity;

/// Errors produced by the component registry and the archetype store.
///
/// Registration errors ([`StorageError::DuplicateComponent`],
/// [`StorageError::RegistryFrozen`]) are fatal to world startup. Lookup
/// errors ([`StorageError::EntityNotFound`],
/// [`StorageError::ComponentNotPresent`]) are ordinary outcomes that systems
/// are expected to handle.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A component with this name was already registered.
    #[error("component '{0}' is already registered")]
    DuplicateComponent(String),

    /// The registry no longer accepts registrations.
    #[error("cannot register component '{0}': registry is frozen")]
    RegistryFrozen(String),

    /// No component with this name has been registered.
    #[error("component '{0}' is not registered")]
    UnknownComponent(String),

    /// No component with this numeric ID has been registered.
    #[error("component type {0} is not registered")]
    UnknownComponentId(ComponentTypeId),

    /// The entity does not exist (never created, or already removed).
    #[error("{0} not found")]
    EntityNotFound(Entity),

    /// The entity exists but its layout lacks the requested component.
    #[error("component '{component}' not present on {entity}")]
    ComponentNotPresent {
        /// The entity that was accessed.
        entity: Entity,
        /// Name of the missing component.
        component: String,
    },

    /// The entity already carries the component being added.
    #[error("component '{component}' already present on {entity}")]
    ComponentAlreadyPresent {
        /// The entity that was modified.
        entity: Entity,
        /// Name of the duplicated component.
        component: String,
    },

    /// The same component type was supplied twice for one entity.
    #[error("component '{0}' supplied more than once")]
    RepeatedComponent(String),

    /// Entities must carry at least one component.
    #[error("an entity must have at least one component")]
    EmptyLayout,

    /// A snapshot refers to component types that do not match this registry.
    #[error("snapshot component mismatch: expected '{expected}' at id {id}, found '{found}'")]
    SnapshotMismatch {
        /// The component id in question.
        id: ComponentTypeId,
        /// Name recorded in the snapshot.
        expected: String,
        /// Name registered locally (empty if none).
        found: String,
    },

    /// A snapshot is internally inconsistent.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// The entity location index disagrees with the archetype rows.
    #[error("entity location index corrupted: {0}")]
    IndexCorrupted(String),

    /// Failed to encode a component value.
    #[error("failed to encode component: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Failed to decode a component value.
    #[error("failed to decode component: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}
