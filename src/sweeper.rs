//! Background sweeper.
//!
//! One centralized loop owns deadline-triggered starts, timeout closes,
//! and held-round retries, instead of per-client best-effort checks.
//! Every sweep action is a conditional update underneath, so running
//! several sweepers side by side is safe: redundant invocations lose the
//! condition and back off.

use crate::tournament::TournamentManager;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Default sweep cadence
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Background sweeper over a tournament manager
pub struct Sweeper {
    manager: Arc<TournamentManager>,
    tick: Duration,
}

impl Sweeper {
    /// Create a sweeper with the default cadence
    pub fn new(manager: Arc<TournamentManager>) -> Self {
        Self::with_tick(manager, DEFAULT_TICK)
    }

    /// Create a sweeper with an explicit cadence
    pub fn with_tick(manager: Arc<TournamentManager>, tick: Duration) -> Self {
        Self { manager, tick }
    }

    /// Spawn the sweep loop; runs until the handle is aborted
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.tick);
            log::info!("Sweeper started (tick {:?})", self.tick);
            loop {
                ticker.tick().await;
                if let Err(err) = self.manager.sweep_once(Utc::now()).await {
                    log::warn!("Sweep failed: {err}");
                }
            }
        })
    }
}
