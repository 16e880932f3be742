//! Invite and join management.

pub mod manager;

pub use manager::{InviteManager, InviteOutcome};
