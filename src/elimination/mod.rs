//! Elimination engine: block accumulator bookkeeping and checkpoint
//! removals.

pub mod engine;

pub use engine::{EliminationEngine, RoundResolution, decide_eliminations};
