//! Completion report produced when a session is finished.

use std::fmt;

use serde::Serialize;

use crate::clock::format_elapsed;
use crate::db::models::{ExerciseId, SessionId};
use crate::store::{PlanWithExercises, SessionHistory};

/// Local completion state of one exercise in the active session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExerciseProgress {
    pub exercise_id: ExerciseId,
    pub name: String,
    pub target_sets: i32,
    pub target_reps: i32,
    pub rest_seconds: i32,
    pub completed: bool,
    pub completed_sets: i32,
    /// Whether the user toggled this exercise during the session.
    pub touched: bool,
}

impl ExerciseProgress {
    pub(crate) fn untouched(plan: &PlanWithExercises) -> Vec<Self> {
        plan.exercises
            .iter()
            .map(|e| ExerciseProgress {
                exercise_id: e.id,
                name: e.name.clone(),
                target_sets: e.target_sets,
                target_reps: e.target_reps,
                rest_seconds: e.rest_seconds,
                completed: false,
                completed_sets: 0,
                touched: false,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionReport {
    pub session_id: SessionId,
    pub total_exercises: usize,
    pub completed_exercises: usize,
    pub completion_percent: u32,
    pub total_target_sets: i64,
    pub completed_sets: i64,
    pub sets_percent: u32,
    pub elapsed_seconds: u64,
}

/// `round(100 * part / whole)`, or 0 for an empty whole.
pub fn percent(part: i64, whole: i64) -> u32 {
    if whole <= 0 {
        return 0;
    }
    let value = (100.0 * part as f64 / whole as f64).round();
    value.max(0.0) as u32
}

impl CompletionReport {
    pub fn from_progress(
        session_id: SessionId,
        exercises: &[ExerciseProgress],
        elapsed_seconds: u64,
    ) -> Self {
        let total_exercises = exercises.len();
        let completed_exercises = exercises.iter().filter(|e| e.completed).count();
        let total_target_sets = exercises.iter().map(|e| i64::from(e.target_sets)).sum();
        let completed_sets = exercises.iter().map(|e| i64::from(e.completed_sets)).sum();
        Self {
            session_id,
            total_exercises,
            completed_exercises,
            completion_percent: percent(completed_exercises as i64, total_exercises as i64),
            total_target_sets,
            completed_sets,
            sets_percent: percent(completed_sets, total_target_sets),
            elapsed_seconds,
        }
    }

    /// Rebuilds the report from what the store holds for a session of
    /// `plan`.
    pub fn from_history(history: &SessionHistory, plan: &PlanWithExercises) -> Self {
        let total_exercises = plan.exercises.len();
        let completed_exercises = history.completed_exercise_count();
        let total_target_sets = plan.total_target_sets();
        let completed_sets = history.completed_set_count();
        let elapsed_seconds = history
            .session
            .duration_seconds()
            .and_then(|secs| u64::try_from(secs).ok())
            .unwrap_or(0);
        Self {
            session_id: history.session.id,
            total_exercises,
            completed_exercises,
            completion_percent: percent(completed_exercises as i64, total_exercises as i64),
            total_target_sets,
            completed_sets,
            sets_percent: percent(completed_sets, total_target_sets),
            elapsed_seconds,
        }
    }
}

impl fmt::Display for CompletionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Session #{} ({})", self.session_id, format_elapsed(self.elapsed_seconds))?;
        writeln!(
            f,
            "Exercises: {}/{} ({}%)",
            self.completed_exercises, self.total_exercises, self.completion_percent
        )?;
        write!(
            f,
            "Sets: {}/{} ({}%)",
            self.completed_sets, self.total_target_sets, self.sets_percent
        )
    }
}
