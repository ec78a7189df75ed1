//! User profile and dream records, plus the reconciler that makes sure they
//! exist before the pipeline writes to them.

pub mod model;
pub mod reconciler;

pub use model::{Dream, Profile, ProfileDraft};
pub use reconciler::ProfileReconciler;
