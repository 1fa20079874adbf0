//! System scheduler.
//!
//! Systems run sequentially, in registration order, once per tick. Init
//! systems run before them on tick 0 of a fresh world. A failing system does
//! not stop the tick: its error is logged and reported, and the remaining
//! systems still run.

use std::fmt;

use tracing::{trace, warn};

use crate::context::WorldContext;
use crate::error::WorldError;

/// A system function.
pub type SystemFn = Box<dyn FnMut(&mut WorldContext<'_>) -> anyhow::Result<()> + Send>;

/// A registered system with its name.
pub struct RegisteredSystem {
    /// The system name (e.g. `"physics"`).
    pub name: String,
    run: SystemFn,
}

impl fmt::Debug for RegisteredSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredSystem")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A system error surfaced from one tick.
#[derive(Debug)]
pub struct SystemFailure {
    pub system: String,
    pub tick: u64,
    pub error: anyhow::Error,
}

impl fmt::Display for SystemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "system '{}' failed at tick {}: {:#}",
            self.system, self.tick, self.error
        )
    }
}

/// Ordered lists of init and regular systems.
#[derive(Debug, Default)]
pub struct Scheduler {
    init: Vec<RegisteredSystem>,
    systems: Vec<RegisteredSystem>,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a system to the per-tick run order.
    ///
    /// # Errors
    ///
    /// [`WorldError::DuplicateSystem`] if a system (init or regular) with
    /// this name exists.
    pub fn add_system(&mut self, name: &str, run: SystemFn) -> Result<(), WorldError> {
        self.check_name(name)?;
        self.systems.push(RegisteredSystem {
            name: name.to_string(),
            run,
        });
        Ok(())
    }

    /// Append a system that runs once, on tick 0 of a fresh world.
    ///
    /// # Errors
    ///
    /// [`WorldError::DuplicateSystem`] if the name is taken.
    pub fn add_init_system(&mut self, name: &str, run: SystemFn) -> Result<(), WorldError> {
        self.check_name(name)?;
        self.init.push(RegisteredSystem {
            name: name.to_string(),
            run,
        });
        Ok(())
    }

    fn check_name(&self, name: &str) -> Result<(), WorldError> {
        if self.init.iter().chain(&self.systems).any(|s| s.name == name) {
            return Err(WorldError::DuplicateSystem(name.to_string()));
        }
        Ok(())
    }

    /// Names of the regular systems in run order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.systems.iter().map(|s| s.name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub(crate) fn run_init(&mut self, ctx: &mut WorldContext<'_>) -> Vec<SystemFailure> {
        run_all(&mut self.init, ctx)
    }

    pub(crate) fn run(&mut self, ctx: &mut WorldContext<'_>) -> Vec<SystemFailure> {
        run_all(&mut self.systems, ctx)
    }
}

fn run_all(systems: &mut [RegisteredSystem], ctx: &mut WorldContext<'_>) -> Vec<SystemFailure> {
    let mut failures = Vec::new();
    for system in systems {
        trace!(system = %system.name, tick = ctx.tick(), "running system");
        if let Err(error) = (system.run)(ctx) {
            let failure = SystemFailure {
                system: system.name.clone(),
                tick: ctx.tick(),
                error,
            };
            warn!(
                system = %failure.system,
                tick = failure.tick,
                error = %failure.error,
                "system failed"
            );
            failures.push(failure);
        }
    }
    failures
}
