//! Ground driver for a dataspace
//!
//! The ground owns one [`Dataspace`] and drives it:
//! - `step`: drain external events, then run turns until quiet or out of fuel
//! - `run_until_quiescent`: step until no work is left
//! - `run`: the async loop, waiting on external events between steps
//!
//! The dataspace is single threaded, so the future returned by
//! [`Ground::run`] is not `Send`. Run it on a current-thread runtime or a
//! `tokio::task::LocalSet`.

mod config;
mod error;

pub use config::EngineConfig;
pub use error::{ActorError, ActorResult, Result, RuntimeError};

use crate::dataspace::{Dataspace, DataspaceStats, Turn};
use tracing::{debug, info};

/// Owner and driver of a dataspace.
pub struct Ground {
    dataspace: Dataspace,
    config: EngineConfig,
}

impl Ground {
    /// Validate `config` and create a dataspace whose first actor runs
    /// `boot`.
    pub fn new(
        config: EngineConfig,
        boot: impl FnOnce(&mut Turn<'_>) -> ActorResult + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let mut dataspace = Dataspace::new(boot);
        dataspace.set_log_turns(config.log_turns);
        Ok(Self { dataspace, config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn dataspace(&self) -> &Dataspace {
        &self.dataspace
    }

    pub fn dataspace_mut(&mut self) -> &mut Dataspace {
        &mut self.dataspace
    }

    pub fn stats(&self) -> DataspaceStats {
        self.dataspace.stats()
    }

    /// Run at most `fuel` batches of scripts and turns.
    ///
    /// Returns whether work remains.
    pub fn step(&mut self) -> bool {
        let events = self.dataspace.drain_external();
        if events > 0 {
            debug!(ground = %self.config.name, events, "accepted external events");
        }
        for _ in 0..self.config.fuel {
            if !self.dataspace.run_scripts() {
                return false;
            }
        }
        debug!(ground = %self.config.name, "fuel exhausted with work pending");
        self.dataspace.has_pending_work()
    }

    pub fn run_until_quiescent(&mut self) {
        while self.step() {}
    }

    /// Drive the dataspace until it is quiescent and nothing outside can
    /// wake it again.
    pub async fn run(&mut self) {
        info!(ground = %self.config.name, "ground starting");
        loop {
            while self.step() {
                tokio::task::yield_now().await;
            }
            if !self.dataspace.wait_external().await {
                break;
            }
        }
        let stats = self.stats();
        info!(
            ground = %self.config.name,
            turns = stats.turns_committed,
            actors = stats.actor_count,
            "ground stopped"
        );
    }
}
