//! Crawl state and its durable form
//!
//! The frontier lives in memory for the length of a run; the checkpoint is
//! what survives between runs.

pub mod checkpoint;
pub mod frontier;

pub use checkpoint::{Checkpoint, CheckpointError, CheckpointStore, SaveOutcome, CHECKPOINT_FILE};
pub use frontier::FrontierState;
