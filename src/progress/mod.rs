//! Completion history and streak tracking.

pub mod tracker;

pub use tracker::{ProgressSnapshot, ProgressTracker};
