//! Core [`Component`] trait, the [`ComponentRegistry`], and the
//! [`Components`] bundle used to spawn entities.
//!
//! ## Type Identity
//!
//! [`ComponentTypeId`]s are assigned by the registry in registration order,
//! starting at 0. Two worlds that register the same components in the same
//! order therefore agree on every ID, which is what lets a persisted store be
//! restored and a replayed tick reproduce identical state.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StorageError;

/// A registration-ordered identifier for a component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ComponentTypeId(pub u32);

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata recorded for each registered component type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentMeta {
    /// The assigned identifier.
    pub id: ComponentTypeId,
    /// The registered name (e.g. `"Health"`).
    pub name: String,
}

/// The core component trait.
///
/// Component values are stored MessagePack-encoded, so every component must
/// be serialisable. The [`Component::type_name`] is the name under which the
/// type is registered and the name CQL queries refer to.
///
/// # Examples
///
/// ```rust
/// use serde::{Serialize, Deserialize};
/// use engine_component::Component;
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Health {
///     current: i64,
///     max: i64,
/// }
///
/// impl Component for Health {
///     fn type_name() -> &'static str { "Health" }
/// }
/// ```
pub trait Component: Send + Sync + 'static + Serialize + for<'de> Deserialize<'de> {
    /// The registered name of this component type.
    fn type_name() -> &'static str;
}

/// Registry of component types owned by a world.
///
/// Registration is one-time per name and only allowed until
/// [`ComponentRegistry::freeze`] is called (the world freezes its registries
/// when it starts).
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    metas: Vec<ComponentMeta>,
    by_name: HashMap<String, ComponentTypeId>,
    frozen: bool,
}

impl ComponentRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the component type `T` under [`Component::type_name`].
    ///
    /// # Errors
    ///
    /// Fails if the name is already registered or the registry is frozen.
    pub fn register<T: Component>(&mut self) -> Result<ComponentTypeId, StorageError> {
        self.register_named(T::type_name())
    }

    /// Register a component type by name.
    ///
    /// # Errors
    ///
    /// Fails if the name is already registered or the registry is frozen.
    pub fn register_named(&mut self, name: &str) -> Result<ComponentTypeId, StorageError> {
        if self.frozen {
            return Err(StorageError::RegistryFrozen(name.to_string()));
        }
        if self.by_name.contains_key(name) {
            return Err(StorageError::DuplicateComponent(name.to_string()));
        }
        let id = ComponentTypeId(self.metas.len() as u32);
        self.metas.push(ComponentMeta {
            id,
            name: name.to_string(),
        });
        self.by_name.insert(name.to_string(), id);
        debug!(component = name, id = id.0, "registered component");
        Ok(id)
    }

    /// Disallow further registrations.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Returns `true` once [`ComponentRegistry::freeze`] has been called.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Look up a component ID by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<ComponentTypeId> {
        self.by_name.get(name).copied()
    }

    /// Look up a component ID by name, failing if it is not registered.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnknownComponent`].
    pub fn resolve(&self, name: &str) -> Result<ComponentTypeId, StorageError> {
        self.lookup(name)
            .ok_or_else(|| StorageError::UnknownComponent(name.to_string()))
    }

    /// The ID registered for `T`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnknownComponent`] if `T` was never registered.
    pub fn id_of<T: Component>(&self) -> Result<ComponentTypeId, StorageError> {
        self.resolve(T::type_name())
    }

    /// Metadata for a registered ID.
    #[must_use]
    pub fn meta(&self, id: ComponentTypeId) -> Option<&ComponentMeta> {
        self.metas.get(id.0 as usize)
    }

    /// The registered name for `id`, or `"<unregistered>"`.
    #[must_use]
    pub fn name_of(&self, id: ComponentTypeId) -> &str {
        self.meta(id).map_or("<unregistered>", |m| m.name.as_str())
    }

    /// Iterate all registrations in ID order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentMeta> {
        self.metas.iter()
    }

    /// Number of registered component types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.metas.len()
    }

    /// Returns `true` if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metas.is_empty()
    }
}

/// A set of encoded component values used to create an entity.
///
/// ```rust,ignore
/// let entity = store.create_entity(
///     &registry,
///     Components::new().with(Health { current: 10, max: 10 }).with(Attack(3)),
/// )?;
/// ```
#[derive(Debug, Default)]
pub struct Components {
    entries: Vec<(&'static str, Vec<u8>)>,
    error: Option<rmp_serde::encode::Error>,
}

impl Components {
    /// Create an empty bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component value. Encoding failures surface when the bundle is
    /// consumed by the store.
    #[must_use]
    pub fn with<T: Component>(mut self, value: T) -> Self {
        match rmp_serde::to_vec_named(&value) {
            Ok(bytes) => self.entries.push((T::type_name(), bytes)),
            Err(e) => {
                if self.error.is_none() {
                    self.error = Some(e);
                }
            }
        }
        self
    }

    /// Number of components in the bundle.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the bundle holds no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve names through `registry`, yielding `(id, encoded value)` pairs.
    pub(crate) fn resolve(
        self,
        registry: &ComponentRegistry,
    ) -> Result<Vec<(ComponentTypeId, Vec<u8>)>, StorageError> {
        if let Some(e) = self.error {
            return Err(StorageError::Encode(e));
        }
        self.entries
            .into_iter()
            .map(|(name, bytes)| Ok((registry.resolve(name)?, bytes)))
            .collect()
    }
}

/// Encode a component value.
pub(crate) fn encode<T: Component>(value: &T) -> Result<Vec<u8>, StorageError> {
    Ok(rmp_serde::to_vec_named(value)?)
}

/// Decode a component value.
pub(crate) fn decode<T: Component>(bytes: &[u8]) -> Result<T, StorageError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
    struct Health {
        current: i64,
        max: i64,
    }

    impl Component for Health {
        fn type_name() -> &'static str {
            "Health"
        }
    }

    #[test]
    fn test_ids_follow_registration_order() {
        let mut registry = ComponentRegistry::new();
        let a = registry.register_named("A").unwrap();
        let b = registry.register_named("B").unwrap();
        let health = registry.register::<Health>().unwrap();
        assert_eq!(a, ComponentTypeId(0));
        assert_eq!(b, ComponentTypeId(1));
        assert_eq!(health, ComponentTypeId(2));
        assert_eq!(registry.id_of::<Health>().unwrap(), health);
        assert_eq!(registry.name_of(b), "B");
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = ComponentRegistry::new();
        registry.register::<Health>().unwrap();
        let err = registry.register::<Health>().unwrap_err();
        assert!(matches!(err, StorageError::DuplicateComponent(ref n) if n == "Health"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_frozen_registry_rejects_registration() {
        let mut registry = ComponentRegistry::new();
        registry.freeze();
        assert!(matches!(
            registry.register::<Health>(),
            Err(StorageError::RegistryFrozen(_))
        ));
    }

    #[test]
    fn test_unknown_component_in_bundle() {
        let registry = ComponentRegistry::new();
        let bundle = Components::new().with(Health { current: 1, max: 1 });
        assert!(matches!(
            bundle.resolve(&registry),
            Err(StorageError::UnknownComponent(_))
        ));
    }

    #[test]
    fn test_component_value_roundtrip() {
        let health = Health {
            current: 80,
            max: 100,
        };
        let bytes = encode(&health).unwrap();
        let restored: Health = decode(&bytes).unwrap();
        assert_eq!(health, restored);
    }
}
