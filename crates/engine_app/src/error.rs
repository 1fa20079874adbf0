//! World-level error types.

use engine_component::StorageError;
use engine_cql::CqlError;
use engine_net::NetError;

use crate::world::WorldState;

#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The operation needs a running world.
    #[error("world is not running (state: {0:?})")]
    NotRunning(WorldState),

    /// Registration or start attempted after the world started.
    #[error("world has already been started")]
    AlreadyStarted,

    /// Signature verification is on but no verifier was installed.
    #[error("signature verification is enabled but no verifier was configured")]
    MissingVerifier,

    /// A system with this name is already registered.
    #[error("system '{0}' is already registered")]
    DuplicateSystem(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Cql(#[from] CqlError),

    /// The state store failed to load or save.
    #[error("persistence failed: {0:#}")]
    Persistence(anyhow::Error),
}
