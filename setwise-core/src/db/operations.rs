use std::collections::HashMap;

use chrono::{DateTime, SubsecRound, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::debug;

use crate::db::models::{
    Exercise, ExerciseChanges, ExerciseCompletionLog, ExerciseId, NewCompletionLog, NewExercise,
    NewUser, NewWorkoutPlan, NewWorkoutSession, PlanChanges, PlanId, SessionId, User, UserId,
    WorkoutPlan, WorkoutSession,
};
use crate::db::schema::{
    exercise_completion_logs, exercises, users, workout_plans, workout_sessions,
};
use crate::error::{StoreError, StoreResult};
use crate::store::{
    ExerciseDraft, LoggedExercise, PlanDraft, PlanWithExercises, SessionHistory, validate_targets,
};

/// Stored timestamps are kept at whole-second precision.
pub(crate) fn timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

// Users
pub fn create_user(conn: &mut SqliteConnection, username: &str) -> StoreResult<User> {
    let username = username.trim();
    if username.is_empty() {
        return Err(StoreError::Invalid("username must not be empty".into()));
    }
    diesel::insert_into(users::table)
        .values(&NewUser {
            username,
            created_at: timestamp(),
        })
        .returning(User::as_returning())
        .get_result(conn)
        .map_err(Into::into)
}

pub fn find_user(conn: &mut SqliteConnection, username: &str) -> StoreResult<Option<User>> {
    users::table
        .filter(users::username.eq(username.trim()))
        .select(User::as_select())
        .first(conn)
        .optional()
        .map_err(Into::into)
}

pub fn get_or_create_user(conn: &mut SqliteConnection, username: &str) -> StoreResult<User> {
    if let Some(user) = find_user(conn, username)? {
        return Ok(user);
    }
    create_user(conn, username)
}

// Ownership checks
fn owned_plan(conn: &mut SqliteConnection, owner: UserId, plan_id: PlanId) -> StoreResult<WorkoutPlan> {
    let plan = workout_plans::table
        .find(plan_id)
        .select(WorkoutPlan::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| StoreError::not_found("plan", plan_id))?;
    if plan.user_id != owner {
        return Err(StoreError::forbidden("plan", plan_id));
    }
    Ok(plan)
}

fn owned_exercise(
    conn: &mut SqliteConnection,
    owner: UserId,
    exercise_id: ExerciseId,
) -> StoreResult<Exercise> {
    let (exercise, plan_owner) = exercises::table
        .inner_join(workout_plans::table)
        .filter(exercises::id.eq(exercise_id))
        .select((Exercise::as_select(), workout_plans::user_id))
        .first::<(Exercise, UserId)>(conn)
        .optional()?
        .ok_or_else(|| StoreError::not_found("exercise", exercise_id))?;
    if plan_owner != owner {
        return Err(StoreError::forbidden("exercise", exercise_id));
    }
    Ok(exercise)
}

fn owned_session(
    conn: &mut SqliteConnection,
    owner: UserId,
    session_id: SessionId,
) -> StoreResult<WorkoutSession> {
    let session = workout_sessions::table
        .find(session_id)
        .select(WorkoutSession::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| StoreError::not_found("session", session_id))?;
    if session.user_id != owner {
        return Err(StoreError::forbidden("session", session_id));
    }
    Ok(session)
}

fn plan_exercises(conn: &mut SqliteConnection, plan_id: PlanId) -> StoreResult<Vec<Exercise>> {
    exercises::table
        .filter(exercises::plan_id.eq(plan_id))
        .order((exercises::position.asc(), exercises::id.asc()))
        .select(Exercise::as_select())
        .load(conn)
        .map_err(Into::into)
}

// Plans
pub fn create_plan(
    conn: &mut SqliteConnection,
    owner: UserId,
    draft: PlanDraft,
) -> StoreResult<WorkoutPlan> {
    draft.validate()?;
    let now = timestamp();
    diesel::insert_into(workout_plans::table)
        .values(&NewWorkoutPlan {
            user_id: owner,
            name: draft.name.trim().to_string(),
            description: draft.description,
            image_url: None,
            created_at: now,
            updated_at: now,
        })
        .returning(WorkoutPlan::as_returning())
        .get_result(conn)
        .map_err(Into::into)
}

pub fn get_plan(
    conn: &mut SqliteConnection,
    owner: UserId,
    plan_id: PlanId,
) -> StoreResult<PlanWithExercises> {
    let plan = owned_plan(conn, owner, plan_id)?;
    let exercises = plan_exercises(conn, plan_id)?;
    Ok(PlanWithExercises { plan, exercises })
}

pub fn list_plans(conn: &mut SqliteConnection, owner: UserId) -> StoreResult<Vec<WorkoutPlan>> {
    workout_plans::table
        .filter(workout_plans::user_id.eq(owner))
        .order(workout_plans::id.asc())
        .select(WorkoutPlan::as_select())
        .load(conn)
        .map_err(Into::into)
}

pub fn update_plan(
    conn: &mut SqliteConnection,
    owner: UserId,
    plan_id: PlanId,
    changes: &PlanChanges,
) -> StoreResult<WorkoutPlan> {
    if changes.name.as_ref().is_some_and(|n| n.trim().is_empty()) {
        return Err(StoreError::Invalid("plan name must not be empty".into()));
    }
    conn.immediate_transaction(|conn| {
        owned_plan(conn, owner, plan_id)?;
        diesel::update(workout_plans::table.find(plan_id))
            .set((changes, workout_plans::updated_at.eq(timestamp())))
            .returning(WorkoutPlan::as_returning())
            .get_result(conn)
            .map_err(Into::into)
    })
}

pub fn delete_plan(conn: &mut SqliteConnection, owner: UserId, plan_id: PlanId) -> StoreResult<()> {
    conn.immediate_transaction(|conn| {
        owned_plan(conn, owner, plan_id)?;
        diesel::delete(workout_plans::table.find(plan_id)).execute(conn)?;
        debug!("Deleted plan {} with its exercises and sessions", plan_id);
        Ok(())
    })
}

// Exercises
pub fn append_exercise(
    conn: &mut SqliteConnection,
    owner: UserId,
    plan_id: PlanId,
    draft: ExerciseDraft,
) -> StoreResult<Exercise> {
    draft.validate()?;
    conn.immediate_transaction(|conn| {
        owned_plan(conn, owner, plan_id)?;

        let max_position: Option<i32> = exercises::table
            .filter(exercises::plan_id.eq(plan_id))
            .select(diesel::dsl::max(exercises::position))
            .first(conn)?;
        let next_position = max_position.map(|p| p + 1).unwrap_or(0);

        let now = timestamp();
        diesel::insert_into(exercises::table)
            .values(&NewExercise {
                plan_id,
                name: draft.name.trim().to_string(),
                target_sets: draft.target_sets,
                target_reps: draft.target_reps,
                rest_seconds: draft.rest_seconds,
                notes: draft.notes,
                position: next_position,
                image_urls: "[]".to_string(),
                created_at: now,
                updated_at: now,
            })
            .returning(Exercise::as_returning())
            .get_result(conn)
            .map_err(Into::into)
    })
}

pub fn get_exercise(
    conn: &mut SqliteConnection,
    owner: UserId,
    exercise_id: ExerciseId,
) -> StoreResult<Exercise> {
    owned_exercise(conn, owner, exercise_id)
}

pub fn list_exercises(
    conn: &mut SqliteConnection,
    owner: UserId,
    plan_id: PlanId,
) -> StoreResult<Vec<Exercise>> {
    owned_plan(conn, owner, plan_id)?;
    plan_exercises(conn, plan_id)
}

pub fn update_exercise(
    conn: &mut SqliteConnection,
    owner: UserId,
    exercise_id: ExerciseId,
    changes: &ExerciseChanges,
) -> StoreResult<Exercise> {
    if changes.name.as_ref().is_some_and(|n| n.trim().is_empty()) {
        return Err(StoreError::Invalid("exercise name must not be empty".into()));
    }
    validate_targets(changes.target_sets, changes.target_reps, changes.rest_seconds)?;
    conn.immediate_transaction(|conn| {
        owned_exercise(conn, owner, exercise_id)?;
        diesel::update(exercises::table.find(exercise_id))
            .set((changes, exercises::updated_at.eq(timestamp())))
            .returning(Exercise::as_returning())
            .get_result(conn)
            .map_err(Into::into)
    })
}

pub fn set_exercise_images(
    conn: &mut SqliteConnection,
    owner: UserId,
    exercise_id: ExerciseId,
    image_urls: &[String],
) -> StoreResult<Exercise> {
    let encoded =
        serde_json::to_string(image_urls).map_err(|e| StoreError::Internal(e.to_string()))?;
    conn.immediate_transaction(|conn| {
        owned_exercise(conn, owner, exercise_id)?;
        diesel::update(exercises::table.find(exercise_id))
            .set((
                exercises::image_urls.eq(encoded),
                exercises::updated_at.eq(timestamp()),
            ))
            .returning(Exercise::as_returning())
            .get_result(conn)
            .map_err(Into::into)
    })
}

pub fn delete_exercise(
    conn: &mut SqliteConnection,
    owner: UserId,
    exercise_id: ExerciseId,
) -> StoreResult<()> {
    conn.immediate_transaction(|conn| {
        owned_exercise(conn, owner, exercise_id)?;
        diesel::delete(exercises::table.find(exercise_id)).execute(conn)?;
        Ok(())
    })
}

// Sessions
pub fn create_session(
    conn: &mut SqliteConnection,
    owner: UserId,
    plan_id: PlanId,
    start_time: DateTime<Utc>,
) -> StoreResult<WorkoutSession> {
    conn.immediate_transaction(|conn| {
        owned_plan(conn, owner, plan_id)?;
        diesel::insert_into(workout_sessions::table)
            .values(&NewWorkoutSession {
                user_id: owner,
                plan_id,
                start_time,
                end_time: None,
                created_at: timestamp(),
            })
            .returning(WorkoutSession::as_returning())
            .get_result(conn)
            .map_err(Into::into)
    })
}

pub fn upsert_completion_log(
    conn: &mut SqliteConnection,
    owner: UserId,
    log: NewCompletionLog,
) -> StoreResult<ExerciseCompletionLog> {
    let log = NewCompletionLog::new(log.session_id, log.exercise_id, log.completed_sets);
    conn.immediate_transaction(|conn| {
        let session = owned_session(conn, owner, log.session_id)?;
        if session.is_completed() {
            return Err(StoreError::Invalid(format!(
                "session {} is already completed",
                session.id
            )));
        }

        let exercise_plan: PlanId = exercises::table
            .find(log.exercise_id)
            .select(exercises::plan_id)
            .first(conn)
            .optional()?
            .ok_or_else(|| StoreError::not_found("exercise", log.exercise_id))?;
        if exercise_plan != session.plan_id {
            return Err(StoreError::Invalid(format!(
                "exercise {} is not part of the plan for session {}",
                log.exercise_id, session.id
            )));
        }

        diesel::insert_into(exercise_completion_logs::table)
            .values(&log)
            .on_conflict((
                exercise_completion_logs::session_id,
                exercise_completion_logs::exercise_id,
            ))
            .do_update()
            .set((
                exercise_completion_logs::completed.eq(log.completed),
                exercise_completion_logs::completed_sets.eq(log.completed_sets),
            ))
            .returning(ExerciseCompletionLog::as_returning())
            .get_result(conn)
            .map_err(Into::into)
    })
}

pub fn complete_session(
    conn: &mut SqliteConnection,
    owner: UserId,
    session_id: SessionId,
    end_time: DateTime<Utc>,
) -> StoreResult<WorkoutSession> {
    conn.immediate_transaction(|conn| {
        let session = owned_session(conn, owner, session_id)?;
        if session.is_completed() {
            return Err(StoreError::Invalid(format!(
                "session {} is already completed",
                session_id
            )));
        }
        if end_time < session.start_time {
            return Err(StoreError::Invalid(format!(
                "session {} cannot end before it started",
                session_id
            )));
        }
        diesel::update(workout_sessions::table.find(session_id))
            .set(workout_sessions::end_time.eq(Some(end_time)))
            .returning(WorkoutSession::as_returning())
            .get_result(conn)
            .map_err(Into::into)
    })
}

pub fn delete_session(
    conn: &mut SqliteConnection,
    owner: UserId,
    session_id: SessionId,
) -> StoreResult<()> {
    conn.immediate_transaction(|conn| {
        owned_session(conn, owner, session_id)?;
        diesel::delete(workout_sessions::table.find(session_id)).execute(conn)?;
        Ok(())
    })
}

pub fn get_session_history(
    conn: &mut SqliteConnection,
    owner: UserId,
    session_id: SessionId,
) -> StoreResult<SessionHistory> {
    let session = owned_session(conn, owner, session_id)?;
    load_histories(conn, vec![session])?
        .pop()
        .ok_or_else(|| StoreError::not_found("session", session_id))
}

pub fn sessions_in_range(
    conn: &mut SqliteConnection,
    owner: UserId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> StoreResult<Vec<SessionHistory>> {
    let sessions = workout_sessions::table
        .filter(workout_sessions::user_id.eq(owner))
        .filter(workout_sessions::start_time.ge(start))
        .filter(workout_sessions::start_time.le(end))
        .order((workout_sessions::start_time.asc(), workout_sessions::id.asc()))
        .select(WorkoutSession::as_select())
        .load(conn)?;
    debug!(
        "Loaded {} sessions for user {} between {} and {}",
        sessions.len(),
        owner,
        start,
        end
    );
    load_histories(conn, sessions)
}

/// Inlines plans and logged exercises for a batch of sessions.
fn load_histories(
    conn: &mut SqliteConnection,
    sessions: Vec<WorkoutSession>,
) -> StoreResult<Vec<SessionHistory>> {
    if sessions.is_empty() {
        return Ok(Vec::new());
    }

    let session_ids: Vec<SessionId> = sessions.iter().map(|s| s.id).collect();
    let mut plan_ids: Vec<PlanId> = sessions.iter().map(|s| s.plan_id).collect();
    plan_ids.sort_unstable();
    plan_ids.dedup();

    let plans: HashMap<PlanId, WorkoutPlan> = workout_plans::table
        .filter(workout_plans::id.eq_any(&plan_ids))
        .select(WorkoutPlan::as_select())
        .load(conn)?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let rows: Vec<(ExerciseCompletionLog, Exercise)> = exercise_completion_logs::table
        .inner_join(exercises::table)
        .filter(exercise_completion_logs::session_id.eq_any(&session_ids))
        .order((
            exercise_completion_logs::session_id.asc(),
            exercises::position.asc(),
        ))
        .select((ExerciseCompletionLog::as_select(), Exercise::as_select()))
        .load(conn)?;

    let mut logs_by_session: HashMap<SessionId, Vec<LoggedExercise>> = HashMap::new();
    for (log, exercise) in rows {
        logs_by_session
            .entry(log.session_id)
            .or_default()
            .push(LoggedExercise { log, exercise });
    }

    sessions
        .into_iter()
        .map(|session| {
            let plan = plans.get(&session.plan_id).cloned().ok_or_else(|| {
                StoreError::Internal(format!(
                    "plan {} missing for session {}",
                    session.plan_id, session.id
                ))
            })?;
            let logs = logs_by_session.remove(&session.id).unwrap_or_default();
            Ok(SessionHistory {
                session,
                plan,
                logs,
            })
        })
        .collect()
}
