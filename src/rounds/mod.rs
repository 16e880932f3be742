//! Round scheduling and the target-draw collaborator seam.

use crate::config::TargetCriteria;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

pub mod scheduler;

pub use scheduler::RoundScheduler;

/// A drawn mystery target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: i64,
    pub label: String,
}

/// Target-draw errors
#[derive(Debug, Error)]
pub enum TargetDrawError {
    /// No target matches the criteria right now; the tournament is held
    /// open and the draw retried on the next scheduler tick.
    #[error("No eligible target for the given criteria")]
    NoEligibleTarget,

    /// Collaborator unreachable
    #[error("Target-draw service unavailable: {0}")]
    Unavailable(String),
}

/// External target-draw collaborator
#[async_trait]
pub trait TargetDraw: Send + Sync {
    async fn draw_target(&self, criteria: &TargetCriteria) -> Result<Target, TargetDrawError>;
}

/// Draws targets from a fixed pool in rotation.
///
/// Ignores criteria; suitable for local play and tests. An empty pool
/// reports `NoEligibleTarget` on every draw.
pub struct RotatingTargets {
    pool: Vec<Target>,
    cursor: AtomicUsize,
}

impl RotatingTargets {
    pub fn new(pool: Vec<Target>) -> Self {
        Self {
            pool,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Pool of `count` numbered targets
    pub fn numbered(count: usize) -> Self {
        let pool = (1..=count as i64)
            .map(|id| Target {
                id,
                label: format!("target-{id}"),
            })
            .collect();
        Self::new(pool)
    }
}

#[async_trait]
impl TargetDraw for RotatingTargets {
    async fn draw_target(&self, _criteria: &TargetCriteria) -> Result<Target, TargetDrawError> {
        if self.pool.is_empty() {
            return Err(TargetDrawError::NoEligibleTarget);
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.pool.len();
        Ok(self.pool[index].clone())
    }
}
