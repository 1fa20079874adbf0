//! World state persistence.
//!
//! A [`StateStore`] keeps the latest [`WorldSnapshot`] per namespace. The
//! world loads it on start and saves after every completed tick.

use dashmap::DashMap;
use engine_component::StoreSnapshot;
use serde::{Deserialize, Serialize};

/// Everything needed to resume a world: the next tick to run and the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub store: StoreSnapshot,
}

/// Durable key-value backing for world snapshots.
pub trait StateStore: Send + Sync {
    /// Persist `snapshot` as the latest state of `namespace`.
    ///
    /// # Errors
    ///
    /// Implementation-defined storage or encoding failures.
    fn save(&self, namespace: &str, snapshot: &WorldSnapshot) -> anyhow::Result<()>;

    /// The latest snapshot of `namespace`, or `None` for a fresh world.
    ///
    /// # Errors
    ///
    /// Implementation-defined storage or decoding failures.
    fn load(&self, namespace: &str) -> anyhow::Result<Option<WorldSnapshot>>;
}

/// In-memory [`StateStore`] holding MessagePack-encoded snapshots.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(namespace: &str) -> String {
        format!("{namespace}:snapshot")
    }

    /// Raw bytes stored under `key`.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StateStore for MemoryStateStore {
    fn save(&self, namespace: &str, snapshot: &WorldSnapshot) -> anyhow::Result<()> {
        let bytes = rmp_serde::to_vec_named(snapshot)?;
        self.entries.insert(Self::key(namespace), bytes);
        Ok(())
    }

    fn load(&self, namespace: &str) -> anyhow::Result<Option<WorldSnapshot>> {
        let Some(bytes) = self.entries.get(&Self::key(namespace)) else {
            return Ok(None);
        };
        Ok(Some(rmp_serde::from_slice(bytes.value())?))
    }
}

#[cfg(test)]
mod tests {
    use engine_component::{ArchetypeStore, Component, ComponentRegistry, Components};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Gold(u32);

    impl Component for Gold {
        fn type_name() -> &'static str {
            "Gold"
        }
    }

    #[test]
    fn test_save_and_load() {
        let mut registry = ComponentRegistry::new();
        registry.register::<Gold>().unwrap();
        let mut store = ArchetypeStore::new();
        let e = store
            .create_entity(&registry, Components::new().with(Gold(40)))
            .unwrap();

        let states = MemoryStateStore::new();
        assert!(states.load("town").unwrap().is_none());
        states
            .save("town", &WorldSnapshot { tick: 7, store: store.snapshot(&registry) })
            .unwrap();
        assert!(states.raw("town:snapshot").is_some());
        assert!(states.load("castle").unwrap().is_none());

        let loaded = states.load("town").unwrap().unwrap();
        assert_eq!(loaded.tick, 7);
        let restored = ArchetypeStore::restore(loaded.store, &registry).unwrap();
        assert_eq!(restored.get::<Gold>(&registry, e).unwrap(), Gold(40));
    }

    #[test]
    fn test_corrupt_bytes_error() {
        let states = MemoryStateStore::new();
        states.entries.insert("town:snapshot".into(), vec![0xc1, 0x00]);
        assert!(states.load("town").is_err());
    }
}
