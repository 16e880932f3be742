//! Tournament lifecycle management.
//!
//! This module owns the `lobby -> live -> finished` state machine and
//! composes the invite manager, round scheduler, and elimination engine
//! into the full knockout flow:
//! - invites feed accepted participants into the lobby
//! - starting opens round 1 through the scheduler
//! - each round close runs the elimination engine synchronously
//! - the last surviving participant wins the pot
//!
//! ## Example
//!
//! ```no_run
//! use knockout_arena::config::TournamentConfig;
//! use knockout_arena::events::NullNotifier;
//! use knockout_arena::ledger::MemoryLedger;
//! use knockout_arena::rounds::RotatingTargets;
//! use knockout_arena::scoring::MemoryRecorder;
//! use knockout_arena::store::MemoryStore;
//! use knockout_arena::tournament::{Invitee, TournamentManager};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = TournamentManager::new(
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(MemoryLedger::new()),
//!         Arc::new(RotatingTargets::numbered(16)),
//!         Arc::new(MemoryRecorder::new()),
//!         Arc::new(NullNotifier),
//!     );
//!
//!     let tournament = manager
//!         .create(
//!             Invitee::new(1, "alva"),
//!             TournamentConfig::standard(100),
//!             vec![Invitee::new(2, "birk")],
//!             1,
//!         )
//!         .await?;
//!     println!("Created tournament {}", tournament.id);
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod manager;
pub mod models;

pub use errors::{TournamentError, TournamentResult};
pub use manager::{CloseOutcome, Invitee, StartOutcome, SubmitOutcome, TournamentManager};
