use chrono::{DateTime, Utc};
use diesel::{AsChangeset, Associations, Identifiable, Insertable, Queryable, Selectable};
use serde::Serialize;
use std::fmt;

use crate::db::schema;

pub type UserId = i32;
pub type PlanId = i32;
pub type ExerciseId = i32;
pub type SessionId = i32;

// User models
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = schema::users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = schema::users)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub created_at: DateTime<Utc>,
}

// Plan models
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = schema::workout_plans)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct WorkoutPlan {
    pub id: PlanId,
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = schema::workout_plans)]
pub struct NewWorkoutPlan {
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update of a plan. `None` leaves a column untouched; the nested
/// option on nullable columns distinguishes "clear" from "keep".
#[derive(AsChangeset, Debug, Default, Clone)]
#[diesel(table_name = schema::workout_plans)]
pub struct PlanChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub image_url: Option<Option<String>>,
}

// Exercise models
#[derive(
    Queryable, Selectable, Identifiable, Associations, Debug, Clone, PartialEq, Serialize,
)]
#[diesel(belongs_to(WorkoutPlan, foreign_key = plan_id))]
#[diesel(table_name = schema::exercises)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Exercise {
    pub id: ExerciseId,
    pub plan_id: PlanId,
    pub name: String,
    pub target_sets: i32,
    pub target_reps: i32,
    pub rest_seconds: i32,
    pub notes: Option<String>,
    pub position: i32,
    #[serde(skip)]
    pub image_urls: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Exercise {
    /// Ordered image references attached to this exercise.
    pub fn images(&self) -> Vec<String> {
        serde_json::from_str(&self.image_urls).unwrap_or_else(|e| {
            log::warn!("exercise {} has unreadable image list: {}", self.id, e);
            Vec::new()
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = schema::exercises)]
pub struct NewExercise {
    pub plan_id: PlanId,
    pub name: String,
    pub target_sets: i32,
    pub target_reps: i32,
    pub rest_seconds: i32,
    pub notes: Option<String>,
    pub position: i32,
    pub image_urls: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(AsChangeset, Debug, Default, Clone)]
#[diesel(table_name = schema::exercises)]
pub struct ExerciseChanges {
    pub name: Option<String>,
    pub target_sets: Option<i32>,
    pub target_reps: Option<i32>,
    pub rest_seconds: Option<i32>,
    pub notes: Option<Option<String>>,
}

// Session models
#[derive(
    Queryable, Selectable, Identifiable, Associations, Debug, Clone, PartialEq, Serialize,
)]
#[diesel(belongs_to(WorkoutPlan, foreign_key = plan_id))]
#[diesel(table_name = schema::workout_sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct WorkoutSession {
    pub id: SessionId,
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WorkoutSession {
    pub fn is_completed(&self) -> bool {
        self.end_time.is_some()
    }

    /// Whole seconds between start and end, `None` while in progress.
    pub fn duration_seconds(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_seconds())
            .filter(|secs| *secs >= 0)
    }
}

#[derive(Insertable)]
#[diesel(table_name = schema::workout_sessions)]
pub struct NewWorkoutSession {
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// Completion log models
#[derive(
    Queryable, Selectable, Identifiable, Associations, Debug, Clone, PartialEq, Serialize,
)]
#[diesel(belongs_to(WorkoutSession, foreign_key = session_id))]
#[diesel(belongs_to(Exercise, foreign_key = exercise_id))]
#[diesel(table_name = schema::exercise_completion_logs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ExerciseCompletionLog {
    pub id: i32,
    pub session_id: SessionId,
    pub exercise_id: ExerciseId,
    pub completed: bool,
    pub completed_sets: i32,
}

#[derive(Insertable, AsChangeset, Debug, Clone, Copy, PartialEq, Eq)]
#[diesel(table_name = schema::exercise_completion_logs)]
pub struct NewCompletionLog {
    pub session_id: SessionId,
    pub exercise_id: ExerciseId,
    pub completed: bool,
    pub completed_sets: i32,
}

impl NewCompletionLog {
    /// Builds a log row whose `completed` flag follows from the set count.
    pub fn new(session_id: SessionId, exercise_id: ExerciseId, completed_sets: i32) -> Self {
        let completed_sets = completed_sets.max(0);
        Self {
            session_id,
            exercise_id,
            completed: completed_sets > 0,
            completed_sets,
        }
    }
}

impl fmt::Display for ExerciseCompletionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.completed { "x" } else { " " };
        write!(
            f,
            "[{}] Exercise #{}: {} sets",
            mark, self.exercise_id, self.completed_sets
        )
    }
}

// Helper struct for displaying logs with exercise names
pub struct DisplayableLog<'a> {
    pub log: &'a ExerciseCompletionLog,
    pub exercise: &'a Exercise,
}

impl fmt::Display for DisplayableLog<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.log.completed { "x" } else { " " };
        write!(
            f,
            "[{}] {}: {}/{} sets x {} reps",
            mark,
            self.exercise.name,
            self.log.completed_sets,
            self.exercise.target_sets,
            self.exercise.target_reps
        )
    }
}
