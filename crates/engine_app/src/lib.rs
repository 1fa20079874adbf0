//! # engine_app
//!
//! The world runtime. A [`World`] owns the component and message registries,
//! the archetype store and the ordered system list for one namespace, and
//! advances them one deterministic tick at a time.
//!
//! - [`World`]: registration, lifecycle, ticking, shard replay.
//! - [`WorldContext`]: what a system sees during a tick.
//! - [`Submitter`]: concurrent transaction intake with replay protection.
//! - [`ReceiptHistory`]: per-tick handler results.
//! - [`TickLoop`]: clock or trigger driven loop around a world.
//! - [`StateStore`]: snapshot persistence between runs.

pub mod config;
pub mod context;
pub mod error;
pub mod messages;
pub mod persistence;
pub mod receipt;
pub mod scheduler;
pub mod submit;
pub mod tick;
pub mod world;

pub use config::{ConfigError, TickConfig, WorldConfig};
pub use context::{MessageInstance, WorldContext};
pub use error::WorldError;
pub use messages::TickMessages;
pub use persistence::{MemoryStateStore, StateStore, WorldSnapshot};
pub use receipt::{Receipt, ReceiptHistory};
pub use scheduler::{Scheduler, SystemFailure, SystemFn};
pub use submit::{Rejection, Submitter, now_ms};
pub use tick::{StopHandle, TickLoop, TickSource};
pub use world::{TickReport, World, WorldState};
