//! Per-tick execution context provided to system functions.

use engine_component::{
    ArchetypeStore, Component, ComponentRegistry, Components, Entity, Query, StorageError,
};
use engine_cql::CqlError;
use engine_net::{MessageType, Transaction, TxHash};
use serde::{Serialize, de::DeserializeOwned};

use crate::messages::TickMessages;
use crate::receipt::Receipt;

/// One instance of a message delivered to a handler.
#[derive(Debug)]
pub struct MessageInstance<'m, In> {
    pub hash: TxHash,
    pub tx: &'m Transaction,
    pub value: &'m In,
}

/// Context provided to a system function on each tick.
///
/// Gives mutable access to the world's store, read access to the messages
/// due this tick, and collects the receipts handlers produce.
pub struct WorldContext<'a> {
    tick: u64,
    timestamp: u64,
    store: &'a mut ArchetypeStore,
    components: &'a ComponentRegistry,
    messages: &'a TickMessages,
    receipts: &'a mut Vec<Receipt>,
}

impl<'a> WorldContext<'a> {
    pub(crate) fn new(
        tick: u64,
        timestamp: u64,
        store: &'a mut ArchetypeStore,
        components: &'a ComponentRegistry,
        messages: &'a TickMessages,
        receipts: &'a mut Vec<Receipt>,
    ) -> Self {
        Self {
            tick,
            timestamp,
            store,
            components,
            messages,
            receipts,
        }
    }

    /// The tick being executed.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Unix time (seconds) the tick was triggered at.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    #[must_use]
    pub fn store(&self) -> &ArchetypeStore {
        self.store
    }

    #[must_use]
    pub fn components(&self) -> &ComponentRegistry {
        self.components
    }

    // -- Entities --

    /// # Errors
    ///
    /// See [`ArchetypeStore::create_entity`].
    pub fn create(&mut self, components: Components) -> Result<Entity, StorageError> {
        self.store.create_entity(self.components, components)
    }

    /// # Errors
    ///
    /// Returns [`StorageError::EntityNotFound`].
    pub fn remove(&mut self, entity: Entity) -> Result<(), StorageError> {
        self.store.remove_entity(entity)
    }

    /// # Errors
    ///
    /// See [`ArchetypeStore::get`].
    pub fn get<T: Component>(&self, entity: Entity) -> Result<T, StorageError> {
        self.store.get(self.components, entity)
    }

    /// # Errors
    ///
    /// See [`ArchetypeStore::set`].
    pub fn set<T: Component>(&mut self, entity: Entity, value: &T) -> Result<(), StorageError> {
        self.store.set(self.components, entity, value)
    }

    /// Read-modify-write component `T` on `entity`.
    ///
    /// # Errors
    ///
    /// See [`ArchetypeStore::get`] and [`ArchetypeStore::set`].
    pub fn update<T: Component>(
        &mut self,
        entity: Entity,
        f: impl FnOnce(&mut T),
    ) -> Result<(), StorageError> {
        let mut value: T = self.get(entity)?;
        f(&mut value);
        self.set(entity, &value)
    }

    /// # Errors
    ///
    /// See [`ArchetypeStore::add_component`].
    pub fn add_component<T: Component>(
        &mut self,
        entity: Entity,
        value: &T,
    ) -> Result<(), StorageError> {
        self.store.add_component(self.components, entity, value)
    }

    /// # Errors
    ///
    /// See [`ArchetypeStore::remove_component`].
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<T, StorageError> {
        self.store.remove_component(self.components, entity)
    }

    // -- Queries --

    /// Compile a CQL expression into a [`Query`]. Keep the query around
    /// between ticks to reuse its archetype cache.
    ///
    /// # Errors
    ///
    /// Returns [`CqlError`] for malformed input or unknown components.
    pub fn query(&self, cql: &str) -> Result<Query, CqlError> {
        Ok(Query::new(engine_cql::compile(cql, self.components)?))
    }

    /// Call `f` for each entity matching `query`; returning `false` stops.
    ///
    /// The matching entities are collected before the first call, so `f` may
    /// freely create, remove or migrate entities. Entities created during the
    /// iteration are not visited; removed ones still are, and will report
    /// [`StorageError::EntityNotFound`] on access.
    pub fn each<F>(&mut self, query: &mut Query, mut f: F)
    where
        F: FnMut(&mut Self, Entity) -> bool,
    {
        for entity in query.entities(self.store) {
            if !f(self, entity) {
                break;
            }
        }
    }

    /// Entities matching `query`, in iteration order.
    pub fn entities(&self, query: &mut Query) -> Vec<Entity> {
        query.entities(self.store)
    }

    pub fn count(&self, query: &mut Query) -> usize {
        query.count(self.store)
    }

    pub fn first(&self, query: &mut Query) -> Option<Entity> {
        query.first(self.store)
    }

    // -- Messages --

    /// Number of instances of `message` due this tick.
    pub fn message_count<In, Out>(&self, message: &MessageType<In, Out>) -> usize
    where
        In: Serialize + DeserializeOwned + Send + Sync + 'static,
        Out: Serialize + DeserializeOwned,
    {
        self.messages.get(message.id()).len()
    }

    /// Run `handler` on every instance of `message` due this tick, in
    /// arrival order. Each call produces a receipt holding the encoded reply
    /// or the error.
    pub fn each_message<In, Out, F>(&mut self, message: &MessageType<In, Out>, mut handler: F)
    where
        In: Serialize + DeserializeOwned + Send + Sync + 'static,
        Out: Serialize + DeserializeOwned,
        F: FnMut(&mut Self, MessageInstance<'_, In>) -> anyhow::Result<Out>,
    {
        let messages: &'a TickMessages = self.messages;
        for batch in messages.get(message.id()) {
            let receipt = match message.downcast(&batch.msg_value) {
                None => Receipt::failure(
                    batch.hash,
                    batch.msg_id,
                    format!("message body is not a '{}' input", message.name()),
                ),
                Some(value) => {
                    let instance = MessageInstance {
                        hash: batch.hash,
                        tx: &batch.tx,
                        value,
                    };
                    let result = handler(self, instance)
                        .and_then(|reply| Ok(message.encode_reply(&reply)?));
                    match result {
                        Ok(reply) => Receipt::success(batch.hash, batch.msg_id, reply),
                        Err(e) => Receipt::failure(batch.hash, batch.msg_id, format!("{e:#}")),
                    }
                }
            };
            self.receipts.push(receipt);
        }
    }
}
