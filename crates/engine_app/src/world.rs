//! The world: registries, store, scheduler and message pipeline for one
//! namespace.
//!
//! Lifecycle:
//!
//! ```text
//! Uninitialized --start()--> Running --stop()--> Stopped
//!   register_*                 tick(), submit
//! ```
//!
//! Each tick drains the submission inbox into a [`TickMessages`] buffer, runs
//! the systems against it, records receipts, advances the counter, persists
//! a snapshot (when a [`StateStore`] is configured), and publishes the new
//! tick count on a watch channel.

use std::sync::Arc;

use engine_component::{ArchetypeStore, Component, ComponentRegistry, ComponentTypeId};
use engine_net::{
    MessageRegistry, MessageType, NetError, ReplayCache, ShardFeed, ShardIterator,
    SignatureVerifier, TxBatch,
};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, info_span};

use crate::config::WorldConfig;
use crate::context::WorldContext;
use crate::error::WorldError;
use crate::messages::TickMessages;
use crate::persistence::{StateStore, WorldSnapshot};
use crate::receipt::ReceiptHistory;
use crate::scheduler::{Scheduler, SystemFailure};
use crate::submit::{Submitter, now_ms};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldState {
    Uninitialized,
    Running,
    Stopped,
}

/// Outcome of one tick.
#[derive(Debug)]
pub struct TickReport {
    /// The tick that ran.
    pub tick: u64,
    /// Messages drained into the tick.
    pub messages: usize,
    /// Receipts recorded by the tick.
    pub receipts: usize,
    /// Systems that returned an error.
    pub failures: Vec<SystemFailure>,
}

pub struct World {
    config: WorldConfig,
    state: WorldState,
    components: ComponentRegistry,
    messages: Arc<MessageRegistry>,
    scheduler: Scheduler,
    store: ArchetypeStore,
    tick: u64,
    init_pending: bool,
    receipts: ReceiptHistory,
    verifier: Option<Arc<dyn SignatureVerifier>>,
    state_store: Option<Arc<dyn StateStore>>,
    inbox: Option<mpsc::UnboundedReceiver<TxBatch>>,
    submitter: Option<Submitter>,
    ticks: watch::Sender<u64>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("namespace", &self.config.namespace)
            .field("state", &self.state)
            .field("tick", &self.tick)
            .field("entities", &self.store.entity_count())
            .field("systems", &self.scheduler.len())
            .finish_non_exhaustive()
    }
}

impl World {
    #[must_use]
    pub fn new(config: WorldConfig) -> Self {
        let receipts = ReceiptHistory::new(config.receipt_history_size);
        let (ticks, _) = watch::channel(0);
        Self {
            config,
            state: WorldState::Uninitialized,
            components: ComponentRegistry::new(),
            messages: Arc::new(MessageRegistry::new()),
            scheduler: Scheduler::new(),
            store: ArchetypeStore::new(),
            tick: 0,
            init_pending: true,
            receipts,
            verifier: None,
            state_store: None,
            inbox: None,
            submitter: None,
            ticks,
        }
    }

    /// Install the signature verifier used when
    /// [`WorldConfig::verify_signatures`] is set.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Persist a snapshot after every tick and resume from it on start.
    #[must_use]
    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    // ── Registration ────────────────────────────────────────────────────

    fn ensure_uninitialized(&self) -> Result<(), WorldError> {
        if self.state != WorldState::Uninitialized {
            return Err(WorldError::AlreadyStarted);
        }
        Ok(())
    }

    /// # Errors
    ///
    /// [`WorldError::AlreadyStarted`] after `start()`, or a storage error
    /// for a duplicate name.
    pub fn register_component<T: Component>(&mut self) -> Result<ComponentTypeId, WorldError> {
        self.ensure_uninitialized()?;
        Ok(self.components.register::<T>()?)
    }

    /// # Errors
    ///
    /// [`WorldError::AlreadyStarted`] after `start()`,
    /// [`NetError::DuplicateMessage`] for a taken name, or
    /// [`NetError::RegistryFrozen`] if the registry has already been shared.
    pub fn register_message<In, Out>(
        &mut self,
        name: &str,
    ) -> Result<MessageType<In, Out>, WorldError>
    where
        In: Serialize + DeserializeOwned + Send + Sync + 'static,
        Out: Serialize + DeserializeOwned,
    {
        self.ensure_uninitialized()?;
        let registry = Arc::get_mut(&mut self.messages)
            .ok_or_else(|| NetError::RegistryFrozen(name.to_string()))?;
        Ok(registry.register::<In, Out>(name)?)
    }

    /// Append a system to the per-tick run order.
    ///
    /// # Errors
    ///
    /// [`WorldError::AlreadyStarted`] or [`WorldError::DuplicateSystem`].
    pub fn register_system<F>(&mut self, name: &str, system: F) -> Result<(), WorldError>
    where
        F: FnMut(&mut WorldContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.ensure_uninitialized()?;
        self.scheduler.add_system(name, Box::new(system))
    }

    /// Register a system that runs once, before the regular systems, on tick
    /// 0 of a fresh world. Worlds resumed from a snapshot skip it.
    ///
    /// # Errors
    ///
    /// [`WorldError::AlreadyStarted`] or [`WorldError::DuplicateSystem`].
    pub fn register_init_system<F>(&mut self, name: &str, system: F) -> Result<(), WorldError>
    where
        F: FnMut(&mut WorldContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.ensure_uninitialized()?;
        self.scheduler.add_init_system(name, Box::new(system))
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Freeze registries, resume persisted state, open the inbox.
    ///
    /// # Errors
    ///
    /// [`WorldError::AlreadyStarted`], [`WorldError::MissingVerifier`],
    /// [`WorldError::Persistence`] if loading fails, or a storage error if
    /// the snapshot does not match the registered components.
    pub fn start(&mut self) -> Result<(), WorldError> {
        self.ensure_uninitialized()?;
        let verifier = if self.config.verify_signatures {
            Some(self.verifier.clone().ok_or(WorldError::MissingVerifier)?)
        } else {
            None
        };

        self.components.freeze();
        if let Some(registry) = Arc::get_mut(&mut self.messages) {
            registry.freeze();
        }

        if let Some(state_store) = &self.state_store {
            let loaded = state_store
                .load(&self.config.namespace)
                .map_err(WorldError::Persistence)?;
            if let Some(snapshot) = loaded {
                self.store = ArchetypeStore::restore(snapshot.store, &self.components)?;
                self.tick = snapshot.tick;
                self.init_pending = false;
                info!(
                    namespace = %self.config.namespace,
                    tick = self.tick,
                    entities = self.store.entity_count(),
                    "restored world state"
                );
            }
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let replay = ReplayCache::new(self.config.replay_cache_kb, self.config.message_expiration);
        let expiration_ms =
            u64::try_from(self.config.message_expiration.as_millis()).unwrap_or(u64::MAX);
        self.submitter = Some(Submitter::new(
            self.config.namespace.clone(),
            Arc::clone(&self.messages),
            verifier,
            replay,
            expiration_ms,
            sender,
        ));
        self.inbox = Some(receiver);
        self.state = WorldState::Running;
        self.ticks.send_replace(self.tick);

        info!(
            namespace = %self.config.namespace,
            components = self.components.len(),
            messages = self.messages.len(),
            systems = self.scheduler.len(),
            tick = self.tick,
            "world started"
        );
        Ok(())
    }

    /// Stop ticking and refuse further submissions.
    pub fn stop(&mut self) {
        if let Some(mut inbox) = self.inbox.take() {
            inbox.close();
        }
        self.submitter = None;
        if self.state == WorldState::Running {
            info!(namespace = %self.config.namespace, tick = self.tick, "world stopped");
        }
        self.state = WorldState::Stopped;
    }

    // ── Ticking ─────────────────────────────────────────────────────────

    /// Run one tick stamped with the wall clock.
    ///
    /// # Errors
    ///
    /// [`WorldError::NotRunning`], or [`WorldError::Persistence`] if the
    /// snapshot cannot be saved. System errors do not fail the tick; they
    /// are reported in [`TickReport::failures`].
    pub fn tick(&mut self) -> Result<TickReport, WorldError> {
        self.tick_at(now_ms() / 1000)
    }

    /// Run one tick stamped with `timestamp` (Unix seconds).
    ///
    /// # Errors
    ///
    /// See [`World::tick`].
    pub fn tick_at(&mut self, timestamp: u64) -> Result<TickReport, WorldError> {
        self.ensure_running()?;
        let mut messages = TickMessages::new();
        if let Some(inbox) = &mut self.inbox {
            while let Ok(batch) = inbox.try_recv() {
                messages.push(batch);
            }
        }
        self.run_tick(timestamp, &messages)
    }

    /// Drive the world from a shard's transaction log: one tick per epoch,
    /// each fed only that epoch's transactions and stamped with its
    /// timestamp. Iteration starts at `start` (default: the current tick).
    ///
    /// # Errors
    ///
    /// [`WorldError::NotRunning`], iterator errors, or a callback error if an
    /// epoch does not match the tick about to run.
    pub fn replay_from_shard<F: ShardFeed>(
        &mut self,
        iterator: &ShardIterator<F>,
        start: Option<u64>,
        stop: Option<u64>,
    ) -> Result<Vec<TickReport>, WorldError> {
        self.ensure_running()?;
        let start = start.unwrap_or(self.tick);
        let mut reports = Vec::new();
        iterator.each(
            |batch, epoch, timestamp| {
                anyhow::ensure!(
                    epoch == self.tick,
                    "shard epoch {epoch} does not match world tick {}",
                    self.tick
                );
                let mut messages = TickMessages::new();
                messages.extend(batch);
                reports.push(self.run_tick(timestamp, &messages)?);
                Ok(())
            },
            Some(start),
            stop,
        )?;
        debug!(ticks = reports.len(), "shard replay finished");
        Ok(reports)
    }

    fn ensure_running(&self) -> Result<(), WorldError> {
        if self.state != WorldState::Running {
            return Err(WorldError::NotRunning(self.state));
        }
        Ok(())
    }

    fn run_tick(
        &mut self,
        timestamp: u64,
        messages: &TickMessages,
    ) -> Result<TickReport, WorldError> {
        let tick = self.tick;
        let span = info_span!("tick", tick);
        let _guard = span.enter();

        let mut receipts = Vec::new();
        let mut failures = Vec::new();
        {
            let mut ctx = WorldContext::new(
                tick,
                timestamp,
                &mut self.store,
                &self.components,
                messages,
                &mut receipts,
            );
            if tick == 0 && self.init_pending {
                failures.extend(self.scheduler.run_init(&mut ctx));
                self.init_pending = false;
            }
            failures.extend(self.scheduler.run(&mut ctx));
        }

        let report = TickReport {
            tick,
            messages: messages.len(),
            receipts: receipts.len(),
            failures,
        };
        self.receipts.record(tick, receipts);
        self.tick += 1;

        let saved = match &self.state_store {
            Some(state_store) => {
                let snapshot = WorldSnapshot {
                    tick: self.tick,
                    store: self.store.snapshot(&self.components),
                };
                state_store.save(&self.config.namespace, &snapshot)
            }
            None => Ok(()),
        };

        // The tick has run either way; observers hear about it before any
        // persistence error surfaces.
        self.ticks.send_replace(self.tick);
        saved.map_err(WorldError::Persistence)?;
        debug!(
            messages = report.messages,
            receipts = report.receipts,
            failures = report.failures.len(),
            "tick complete"
        );
        Ok(report)
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// The next tick to run; equals the number of completed ticks.
    #[must_use]
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    #[must_use]
    pub fn state(&self) -> WorldState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &ArchetypeStore {
        &self.store
    }

    #[must_use]
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Shared handle to the message registry, e.g. for a [`ShardIterator`].
    /// Call after `start()`: registration fails while a handle is held.
    #[must_use]
    pub fn messages(&self) -> Arc<MessageRegistry> {
        Arc::clone(&self.messages)
    }

    /// A handle for submitting transactions.
    ///
    /// # Errors
    ///
    /// [`WorldError::NotRunning`] before `start()` or after `stop()`.
    pub fn submitter(&self) -> Result<Submitter, WorldError> {
        self.submitter
            .clone()
            .ok_or(WorldError::NotRunning(self.state))
    }

    #[must_use]
    pub fn receipts(&self) -> &ReceiptHistory {
        &self.receipts
    }

    /// Receive the tick count after each completed tick.
    #[must_use]
    pub fn subscribe_ticks(&self) -> watch::Receiver<u64> {
        self.ticks.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use engine_component::{Components, Query};
    use engine_net::{AcceptAll, Transaction};
    use serde::Deserialize;

    use super::*;
    use crate::persistence::MemoryStateStore;
    use crate::submit::Rejection;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter(u64);

    impl Component for Counter {
        fn type_name() -> &'static str {
            "Counter"
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Bump {
        by: u64,
    }

    fn config() -> WorldConfig {
        WorldConfig::default()
            .with_namespace("test")
            .with_verify_signatures(false)
    }

    fn counting_world(config: WorldConfig) -> (World, MessageType<Bump, u64>) {
        let mut world = World::new(config);
        world.register_component::<Counter>().unwrap();
        let bump = world.register_message::<Bump, u64>("bump").unwrap();
        world
            .register_init_system("spawn", |ctx| {
                ctx.create(Components::new().with(Counter(0)))?;
                Ok(())
            })
            .unwrap();
        let handler = bump.clone();
        let filter = engine_cql::compile("CONTAINS(Counter)", world.components()).unwrap();
        let mut query = Query::new(filter);
        world
            .register_system("bump", move |ctx| {
                let counter = ctx
                    .first(&mut query)
                    .ok_or_else(|| anyhow::anyhow!("no counter"))?;
                ctx.each_message(&handler, |ctx, msg| {
                    ctx.update::<Counter>(counter, |c| c.0 += msg.value.by)?;
                    Ok(ctx.get::<Counter>(counter)?.0)
                });
                Ok(())
            })
            .unwrap();
        (world, bump)
    }

    fn bump_tx(bump: &MessageType<Bump, u64>, by: u64) -> Transaction {
        Transaction::new("alice", "test", now_ms(), bump.encode(&Bump { by }).unwrap())
    }

    #[test]
    fn test_lifecycle_errors() {
        let (mut world, _) = counting_world(config());
        assert!(matches!(
            world.tick(),
            Err(WorldError::NotRunning(WorldState::Uninitialized))
        ));
        assert!(world.submitter().is_err());
        world.start().unwrap();
        assert!(matches!(world.start(), Err(WorldError::AlreadyStarted)));
        assert!(matches!(
            world.register_component::<Counter>(),
            Err(WorldError::AlreadyStarted)
        ));
        world.stop();
        assert!(matches!(
            world.tick(),
            Err(WorldError::NotRunning(WorldState::Stopped))
        ));
    }

    #[test]
    fn test_missing_verifier() {
        let (mut world, _) = counting_world(config().with_verify_signatures(true));
        assert!(matches!(world.start(), Err(WorldError::MissingVerifier)));

        let (world, _) = counting_world(config().with_verify_signatures(true));
        let mut world = world.with_verifier(Arc::new(AcceptAll));
        world.start().unwrap();
    }

    #[test]
    fn test_messages_visible_at_next_tick() {
        let (mut world, bump) = counting_world(config());
        world.start().unwrap();
        let submitter = world.submitter().unwrap();

        let first = submitter.submit(bump.id(), bump_tx(&bump, 2)).unwrap();
        let report = world.tick().unwrap();
        assert_eq!(report.tick, 0);
        assert_eq!(report.messages, 1);
        assert!(report.failures.is_empty());

        let second = submitter.submit(bump.id(), bump_tx(&bump, 3)).unwrap();
        let third = submitter.submit(bump.id(), bump_tx(&bump, 4)).unwrap();
        let report = world.tick().unwrap();
        assert_eq!(report.receipts, 2);

        let reply = |hash| {
            let receipt = world.receipts().get(&hash).unwrap();
            bump.decode_reply(receipt.reply.as_ref().unwrap()).unwrap()
        };
        assert_eq!(reply(first), 2);
        assert_eq!(reply(second), 5);
        assert_eq!(reply(third), 9);
        assert_eq!(world.receipts().for_tick(0).unwrap().len(), 1);
        assert_eq!(world.current_tick(), 2);
    }

    #[test]
    fn test_stopped_world_refuses_submissions() {
        let (mut world, bump) = counting_world(config());
        world.start().unwrap();
        let submitter = world.submitter().unwrap();
        world.stop();
        assert_eq!(
            submitter.submit(bump.id(), bump_tx(&bump, 1)),
            Err(Rejection::Closed)
        );
    }

    #[test]
    fn test_failing_system_reported() {
        let mut world = World::new(config());
        world
            .register_system("fails", |ctx| anyhow::bail!("tick {} went wrong", ctx.tick()))
            .unwrap();
        world.start().unwrap();
        let report = world.tick_at(100).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].system, "fails");
        assert_eq!(world.current_tick(), 1);
    }

    #[test]
    fn test_tick_notifications() {
        let (mut world, _) = counting_world(config());
        let mut ticks = world.subscribe_ticks();
        world.start().unwrap();
        world.tick().unwrap();
        world.tick().unwrap();
        assert!(ticks.has_changed().unwrap());
        assert_eq!(*ticks.borrow_and_update(), 2);
    }

    struct ReadOnlyStore;

    impl StateStore for ReadOnlyStore {
        fn save(&self, _: &str, _: &WorldSnapshot) -> anyhow::Result<()> {
            anyhow::bail!("store is read-only")
        }

        fn load(&self, _: &str) -> anyhow::Result<Option<WorldSnapshot>> {
            Ok(None)
        }
    }

    #[test]
    fn test_failed_save_still_notifies() {
        let (world, _) = counting_world(config());
        let mut world = world.with_state_store(Arc::new(ReadOnlyStore));
        let mut ticks = world.subscribe_ticks();
        world.start().unwrap();

        let err = world.tick_at(0).unwrap_err();
        assert!(matches!(err, WorldError::Persistence(_)));
        assert_eq!(world.current_tick(), 1);
        assert!(ticks.has_changed().unwrap());
        assert_eq!(*ticks.borrow_and_update(), 1);
    }

    #[test]
    fn test_resume_from_state_store() {
        let states = Arc::new(MemoryStateStore::new());
        let (world, bump) = counting_world(config());
        let mut world = world.with_state_store(states.clone());
        world.start().unwrap();
        let submitter = world.submitter().unwrap();
        submitter.submit(bump.id(), bump_tx(&bump, 5)).unwrap();
        world.tick().unwrap();
        world.tick().unwrap();
        world.stop();

        let (resumed, _) = counting_world(config());
        let mut resumed = resumed.with_state_store(states);
        resumed.start().unwrap();
        assert_eq!(resumed.current_tick(), 2);
        resumed.tick().unwrap();
        // Init did not run again: still a single counter holding 5.
        assert_eq!(resumed.store().entity_count(), 1);
        let mut query = Query::new(
            engine_cql::compile("EXACT(Counter)", resumed.components()).unwrap(),
        );
        let counter = query.first(resumed.store()).unwrap();
        assert_eq!(
            resumed.store().get::<Counter>(resumed.components(), counter).unwrap(),
            Counter(5)
        );
    }
}
