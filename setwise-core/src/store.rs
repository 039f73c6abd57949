//! Persistence contracts consumed by the domain logic.
//!
//! Every call takes the acting user's id; implementations reject rows owned
//! by someone else with [`StoreError::Forbidden`].

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::models::{
    Exercise, ExerciseChanges, ExerciseCompletionLog, ExerciseId, NewCompletionLog, PlanChanges,
    PlanId, SessionId, User, UserId, WorkoutPlan, WorkoutSession,
};
use crate::error::{StoreError, StoreResult};

/// A plan together with its exercises in display order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanWithExercises {
    pub plan: WorkoutPlan,
    pub exercises: Vec<Exercise>,
}

impl PlanWithExercises {
    pub fn total_target_sets(&self) -> i64 {
        self.exercises.iter().map(|e| i64::from(e.target_sets)).sum()
    }
}

/// One completion log with the exercise it refers to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggedExercise {
    pub log: ExerciseCompletionLog,
    pub exercise: Exercise,
}

/// A session with its logs and referenced plan inlined.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionHistory {
    pub session: WorkoutSession,
    pub plan: WorkoutPlan,
    pub logs: Vec<LoggedExercise>,
}

impl SessionHistory {
    pub fn completed_exercise_count(&self) -> usize {
        self.logs.iter().filter(|l| l.log.completed).count()
    }

    pub fn completed_set_count(&self) -> i64 {
        self.logs
            .iter()
            .map(|l| i64::from(l.log.completed_sets))
            .sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanDraft {
    pub name: String,
    pub description: Option<String>,
}

impl PlanDraft {
    pub fn validate(&self) -> StoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::Invalid("plan name must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExerciseDraft {
    pub name: String,
    pub target_sets: i32,
    pub target_reps: i32,
    pub rest_seconds: i32,
    pub notes: Option<String>,
}

impl ExerciseDraft {
    pub fn validate(&self) -> StoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::Invalid("exercise name must not be empty".into()));
        }
        validate_targets(
            Some(self.target_sets),
            Some(self.target_reps),
            Some(self.rest_seconds),
        )
    }
}

pub(crate) fn validate_targets(
    sets: Option<i32>,
    reps: Option<i32>,
    rest: Option<i32>,
) -> StoreResult<()> {
    if sets.is_some_and(|s| s < 1) {
        return Err(StoreError::Invalid("target sets must be at least 1".into()));
    }
    if reps.is_some_and(|r| r < 1) {
        return Err(StoreError::Invalid("target reps must be at least 1".into()));
    }
    if rest.is_some_and(|r| r < 0) {
        return Err(StoreError::Invalid("rest interval must not be negative".into()));
    }
    Ok(())
}

pub trait UserStore: Send + Sync {
    fn create_user(&self, username: &str) -> impl Future<Output = StoreResult<User>> + Send;

    fn find_user(&self, username: &str) -> impl Future<Output = StoreResult<Option<User>>> + Send;
}

pub trait PlanStore: Send + Sync {
    fn create_plan(
        &self,
        owner: UserId,
        draft: PlanDraft,
    ) -> impl Future<Output = StoreResult<WorkoutPlan>> + Send;

    fn get_plan(
        &self,
        owner: UserId,
        plan_id: PlanId,
    ) -> impl Future<Output = StoreResult<PlanWithExercises>> + Send;

    fn list_plans(&self, owner: UserId) -> impl Future<Output = StoreResult<Vec<WorkoutPlan>>> + Send;

    fn update_plan(
        &self,
        owner: UserId,
        plan_id: PlanId,
        changes: PlanChanges,
    ) -> impl Future<Output = StoreResult<WorkoutPlan>> + Send;

    /// Removes the plan and, through cascade, its exercises and sessions.
    fn delete_plan(&self, owner: UserId, plan_id: PlanId)
    -> impl Future<Output = StoreResult<()>> + Send;

    /// Inserts an exercise at the end of the plan. The position is assigned
    /// inside the same transaction as the insert.
    fn append_exercise(
        &self,
        owner: UserId,
        plan_id: PlanId,
        draft: ExerciseDraft,
    ) -> impl Future<Output = StoreResult<Exercise>> + Send;

    fn get_exercise(
        &self,
        owner: UserId,
        exercise_id: ExerciseId,
    ) -> impl Future<Output = StoreResult<Exercise>> + Send;

    fn list_exercises(
        &self,
        owner: UserId,
        plan_id: PlanId,
    ) -> impl Future<Output = StoreResult<Vec<Exercise>>> + Send;

    fn update_exercise(
        &self,
        owner: UserId,
        exercise_id: ExerciseId,
        changes: ExerciseChanges,
    ) -> impl Future<Output = StoreResult<Exercise>> + Send;

    fn set_exercise_images(
        &self,
        owner: UserId,
        exercise_id: ExerciseId,
        image_urls: Vec<String>,
    ) -> impl Future<Output = StoreResult<Exercise>> + Send;

    fn delete_exercise(
        &self,
        owner: UserId,
        exercise_id: ExerciseId,
    ) -> impl Future<Output = StoreResult<()>> + Send;
}

pub trait SessionStore: Send + Sync {
    fn create_session(
        &self,
        owner: UserId,
        plan_id: PlanId,
        start_time: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<WorkoutSession>> + Send;

    /// Writes the log for `(session, exercise)`, replacing any earlier row.
    /// Fails once the session has been completed.
    fn upsert_completion_log(
        &self,
        owner: UserId,
        log: NewCompletionLog,
    ) -> impl Future<Output = StoreResult<ExerciseCompletionLog>> + Send;

    /// Sets the end time. A session can only be completed once.
    fn complete_session(
        &self,
        owner: UserId,
        session_id: SessionId,
        end_time: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<WorkoutSession>> + Send;

    fn delete_session(
        &self,
        owner: UserId,
        session_id: SessionId,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    fn get_session_history(
        &self,
        owner: UserId,
        session_id: SessionId,
    ) -> impl Future<Output = StoreResult<SessionHistory>> + Send;

    /// Sessions whose start lies within `[start, end]`, oldest first.
    fn sessions_in_range(
        &self,
        owner: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Vec<SessionHistory>>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ExerciseDraft {
        ExerciseDraft {
            name: "Squat".into(),
            target_sets: 3,
            target_reps: 5,
            rest_seconds: 120,
            notes: None,
        }
    }

    #[test]
    fn exercise_draft_rejects_bad_targets() {
        assert!(draft().validate().is_ok());
        assert!(
            ExerciseDraft {
                target_sets: 0,
                ..draft()
            }
            .validate()
            .is_err()
        );
        assert!(
            ExerciseDraft {
                rest_seconds: -1,
                ..draft()
            }
            .validate()
            .is_err()
        );
        assert!(
            ExerciseDraft {
                name: "  ".into(),
                ..draft()
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn plan_draft_needs_a_name() {
        assert!(PlanDraft::default().validate().is_err());
        let ok = PlanDraft {
            name: "Push day".into(),
            description: None,
        };
        assert!(ok.validate().is_ok());
    }
}
