//! The fixed-depth "Five Whys" reflective interview: state machine, prompt
//! construction, and root-motivation synthesis.

pub mod engine;
pub mod model;
pub mod prompts;
pub mod state;
pub mod synthesizer;

pub use engine::{FiveWhysEngine, ResumePoint, TurnOutcome};
pub use model::{ReflectionExchange, ReflectionSession, SessionStatus};
pub use state::InterviewState;
pub use synthesizer::RootMotivationSynthesizer;
