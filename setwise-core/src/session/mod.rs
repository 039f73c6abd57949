//! Session module for running a workout from a plan.
//!
//! `WorkoutSessionManager` drives one session through its lifecycle and
//! produces a `CompletionReport` when it is finished.

mod manager;
mod summary;

pub use manager::{FinishOutcome, SessionState, ToggleOutcome, WorkoutSessionManager};
pub use summary::{CompletionReport, ExerciseProgress, percent};
