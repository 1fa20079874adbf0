//! Tick loop driver.
//!
//! Triggers [`World::tick`] either from an internal fixed-rate clock or from
//! an external trigger channel, until `max_ticks` is reached, the trigger
//! channel closes, or a [`StopHandle`] fires.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::config::TickConfig;
use crate::world::{World, WorldState};

/// What triggers a tick.
#[derive(Debug)]
pub enum TickSource {
    /// Fixed-rate internal clock.
    Interval(Duration),
    /// One tick per `()` received; the loop ends when every sender is gone.
    External(mpsc::Receiver<()>),
}

/// Cooperative shutdown for a running [`TickLoop`]. The tick in progress
/// completes first.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

#[derive(Debug)]
pub struct TickLoop {
    world: World,
    config: TickConfig,
    source: TickSource,
    stop: StopHandle,
}

impl TickLoop {
    /// A loop driving `world` from an internal clock at `config.tick_rate`.
    #[must_use]
    pub fn new(world: World, config: TickConfig) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            source: TickSource::Interval(config.period()),
            world,
            config,
            stop: StopHandle { tx: Arc::new(tx) },
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: TickSource) -> Self {
        self.source = source;
        self
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Run until `max_ticks` (0 = unlimited), the trigger closes, or a stop
    /// is requested. Starts the world if needed and hands it back at the end.
    ///
    /// # Errors
    ///
    /// Returns the first world error (start, persistence, not running).
    /// System failures are logged by the world and do not end the loop.
    pub async fn run(self) -> anyhow::Result<World> {
        let Self {
            mut world,
            config,
            source,
            stop,
        } = self;
        if world.state() == WorldState::Uninitialized {
            world.start()?;
        }
        let mut stop_rx = stop.tx.subscribe();

        info!(
            tick_rate = config.tick_rate,
            max_ticks = config.max_ticks,
            start_tick = world.current_tick(),
            "starting tick loop"
        );

        let mut completed = 0u64;
        match source {
            TickSource::Interval(period) => {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                while !limit_reached(&config, completed) && !*stop_rx.borrow() {
                    tokio::select! {
                        biased;
                        _ = stop_rx.changed() => break,
                        _ = interval.tick() => {}
                    }
                    step(&mut world, Some(period))?;
                    completed += 1;
                }
            }
            TickSource::External(mut trigger) => {
                while !limit_reached(&config, completed) && !*stop_rx.borrow() {
                    tokio::select! {
                        biased;
                        _ = stop_rx.changed() => break,
                        next = trigger.recv() => {
                            if next.is_none() {
                                break;
                            }
                        }
                    }
                    step(&mut world, None)?;
                    completed += 1;
                }
            }
        }

        info!(ticks = completed, tick = world.current_tick(), "tick loop complete");
        Ok(world)
    }

    /// [`TickLoop::run`] on a fresh current-thread runtime.
    ///
    /// # Errors
    ///
    /// Runtime construction failures, plus everything [`TickLoop::run`]
    /// returns.
    pub fn run_blocking(self) -> anyhow::Result<World> {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?
            .block_on(self.run())
    }
}

fn limit_reached(config: &TickConfig, completed: u64) -> bool {
    config.max_ticks > 0 && completed >= config.max_ticks
}

fn step(world: &mut World, budget: Option<Duration>) -> anyhow::Result<()> {
    let start = Instant::now();
    let report = world.tick()?;
    let elapsed = start.elapsed();
    if let Some(budget) = budget
        && elapsed > budget
    {
        warn!(
            tick = report.tick,
            elapsed_ms = elapsed.as_millis() as u64,
            budget_ms = budget.as_millis() as u64,
            "tick exceeded time budget"
        );
    }
    Ok(())
}
