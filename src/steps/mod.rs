//! Actions and their tiny-step breakdowns: decomposition with deterministic
//! fallback, and strictly ordered step completion.

pub mod decomposer;
pub mod model;
pub mod progress;

pub use decomposer::{Breakdown, StepOrigin, TinyStepDecomposer};
pub use model::{Action, TinyStep};
pub use progress::{StepAdvance, StepProgress};
