use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, SubsecRound, Utc};
use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::watch;

use crate::auth::AuthContext;
use crate::clock::{Clock, SessionClock, SystemClock};
use crate::db::models::{ExerciseId, NewCompletionLog, SessionId, UserId};
use crate::error::{SessionError, StoreError};
use crate::retry::{RetryPolicy, with_retry};
use crate::session::summary::{CompletionReport, ExerciseProgress};
use crate::store::{PlanWithExercises, SessionStore};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    #[default]
    Idle,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub progress: ExerciseProgress,
    /// Set when the write could not reach the store. The local state is kept.
    pub warning: Option<SessionError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishOutcome {
    pub report: CompletionReport,
    /// Set when some of the final writes were not persisted.
    pub durability_warning: Option<SessionError>,
}

#[derive(Debug, Default)]
struct ActiveSession {
    state: SessionState,
    session_id: Option<SessionId>,
    start_time: Option<DateTime<Utc>>,
    exercises: Vec<ExerciseProgress>,
    report: Option<CompletionReport>,
}

/// Marks a start or finish as in flight until dropped.
struct PendingGuard<'a>(&'a AtomicBool);

impl<'a> PendingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, SessionError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| PendingGuard(flag))
            .map_err(|_| SessionError::validation("another start or finish is still in flight"))
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the lifecycle of a single workout session for one user:
/// `Idle -> InProgress -> Completed`.
///
/// Local completion state is updated before the store is written, so the UI
/// reflects a toggle immediately. Start and finish are single-flight.
pub struct WorkoutSessionManager<S, C: Clock = SystemClock> {
    store: Arc<S>,
    clock: Arc<C>,
    owner: UserId,
    retry: RetryPolicy,
    session_clock: SessionClock<C>,
    pending: AtomicBool,
    active: Mutex<ActiveSession>,
}

impl<S: SessionStore, C: Clock> WorkoutSessionManager<S, C> {
    pub fn new(store: Arc<S>, owner: UserId, clock: Arc<C>, retry: RetryPolicy) -> Self {
        let session_clock = SessionClock::new(Arc::clone(&clock));
        Self {
            store,
            clock,
            owner,
            retry,
            session_clock,
            pending: AtomicBool::new(false),
            active: Mutex::new(ActiveSession::default()),
        }
    }

    /// Builds a manager acting as the signed-in user of `auth`.
    pub fn for_current_user(
        store: Arc<S>,
        auth: &dyn AuthContext,
        clock: Arc<C>,
        retry: RetryPolicy,
    ) -> Result<Self, SessionError> {
        let owner = auth
            .current_user()
            .filter(|_| auth.is_session_valid())
            .ok_or_else(|| SessionError::Unauthorized("no signed-in user".into()))?;
        Ok(Self::new(store, owner, clock, retry))
    }

    fn active(&self) -> MutexGuard<'_, ActiveSession> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn owner(&self) -> UserId {
        self.owner
    }

    pub fn state(&self) -> SessionState {
        self.active().state
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.active().session_id
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Local state of every exercise, in plan order.
    pub fn progress(&self) -> Vec<ExerciseProgress> {
        self.active().exercises.clone()
    }

    /// The report of the finished session, if any.
    pub fn report(&self) -> Option<CompletionReport> {
        self.active().report.clone()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.session_clock.elapsed_seconds()
    }

    pub fn elapsed_display(&self) -> String {
        self.session_clock.formatted()
    }

    pub fn subscribe_elapsed(&self) -> watch::Receiver<u64> {
        self.session_clock.subscribe()
    }

    /// Creates the session row and starts the clock. On any failure the
    /// manager stays idle.
    pub async fn start_session(&self, plan: &PlanWithExercises) -> Result<SessionId, SessionError> {
        let _pending = PendingGuard::acquire(&self.pending)?;

        let state = self.state();
        match state {
            SessionState::Idle => {}
            SessionState::InProgress => {
                return Err(SessionError::validation("a session is already in progress"));
            }
            SessionState::Completed => {
                return Err(SessionError::validation(
                    "the previous session is finished; reset before starting another",
                ));
            }
        }
        if plan.exercises.is_empty() {
            return Err(SessionError::validation(
                "cannot start a session with zero exercises",
            ));
        }
        if plan.plan.user_id != self.owner {
            return Err(SessionError::Unauthorized(format!(
                "plan {} belongs to another user",
                plan.plan.id
            )));
        }

        let store = &*self.store;
        let owner = self.owner;
        let plan_id = plan.plan.id;
        let start_time = self.clock.now().trunc_subsecs(0);
        let session = with_retry(&self.retry, "create_session", move || {
            store.create_session(owner, plan_id, start_time)
        })
        .await
        .inspect_err(|e| error!("Failed to start session for plan {}: {}", plan_id, e))?;

        {
            let mut active = self.active();
            active.state = SessionState::InProgress;
            active.session_id = Some(session.id);
            active.start_time = Some(session.start_time);
            active.exercises = ExerciseProgress::untouched(plan);
            active.report = None;
        }
        self.session_clock.start(session.start_time);
        info!(
            "Started session {} for plan {} ({} exercises)",
            session.id,
            plan_id,
            plan.exercises.len()
        );
        Ok(session.id)
    }

    /// Flips an exercise between complete and incomplete.
    ///
    /// Without `completed_sets`, marking complete records the target set
    /// count and un-marking records zero. An explicit count is taken as the
    /// new value (complete when above zero), so repeating the same call is
    /// idempotent.
    pub async fn toggle_exercise_completion(
        &self,
        exercise_id: ExerciseId,
        completed_sets: Option<i32>,
    ) -> Result<ToggleOutcome, SessionError> {
        if completed_sets.is_some_and(|n| n < 0) {
            return Err(SessionError::validation("completed sets must not be negative"));
        }

        let (session_id, previous, updated) = {
            let mut active = self.active();
            if active.state != SessionState::InProgress {
                return Err(SessionError::validation("no session in progress"));
            }
            let session_id = active
                .session_id
                .ok_or_else(|| SessionError::validation("no session in progress"))?;
            let entry = active
                .exercises
                .iter_mut()
                .find(|e| e.exercise_id == exercise_id)
                .ok_or_else(|| {
                    SessionError::validation(format!(
                        "exercise {} is not part of this session",
                        exercise_id
                    ))
                })?;
            let previous = entry.clone();
            let sets = match completed_sets {
                Some(n) => n,
                None if entry.completed => 0,
                None => entry.target_sets,
            };
            entry.completed = sets > 0;
            entry.completed_sets = sets;
            entry.touched = true;
            (session_id, previous, entry.clone())
        };

        let store = &*self.store;
        let owner = self.owner;
        let log = NewCompletionLog::new(session_id, exercise_id, updated.completed_sets);
        match with_retry(&self.retry, "upsert_completion_log", move || {
            store.upsert_completion_log(owner, log)
        })
        .await
        {
            Ok(_) => {
                debug!(
                    "Exercise {} in session {}: {} sets",
                    exercise_id, session_id, updated.completed_sets
                );
                Ok(ToggleOutcome {
                    progress: updated,
                    warning: None,
                })
            }
            Err(e) if e.is_transient() => {
                warn!(
                    "Exercise {} toggled locally but not saved: {}",
                    exercise_id, e
                );
                Ok(ToggleOutcome {
                    progress: updated,
                    warning: Some(e.into()),
                })
            }
            Err(e) => {
                warn!("Reverting exercise {} after failed write: {}", exercise_id, e);
                let mut active = self.active();
                if active.state == SessionState::InProgress && active.session_id == Some(session_id)
                {
                    if let Some(entry) = active
                        .exercises
                        .iter_mut()
                        .find(|x| x.exercise_id == exercise_id && **x == updated)
                    {
                        *entry = previous;
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Completes every exercise that was never toggled at its target, writes
    /// one log per exercise, closes the session and stops the clock.
    ///
    /// Once the preconditions pass the report is always returned; failed
    /// writes are reported as a durability warning.
    pub async fn finish_session(&self) -> Result<FinishOutcome, SessionError> {
        let _pending = PendingGuard::acquire(&self.pending)?;

        let (session_id, end_time, logs, report) = {
            let mut active = self.active();
            if active.state != SessionState::InProgress {
                return Err(SessionError::validation("no session in progress"));
            }
            let session_id = active
                .session_id
                .ok_or_else(|| SessionError::validation("no session in progress"))?;
            for exercise in active.exercises.iter_mut().filter(|e| !e.touched) {
                exercise.completed = exercise.target_sets > 0;
                exercise.completed_sets = exercise.target_sets;
            }

            let now = self.clock.now().trunc_subsecs(0);
            let end_time = active.start_time.map_or(now, |start| now.max(start));
            let elapsed = self.session_clock.stop();
            let report = CompletionReport::from_progress(session_id, &active.exercises, elapsed);
            let logs: Vec<NewCompletionLog> = active
                .exercises
                .iter()
                .map(|e| NewCompletionLog::new(session_id, e.exercise_id, e.completed_sets))
                .collect();

            active.state = SessionState::Completed;
            active.report = Some(report.clone());
            (session_id, end_time, logs, report)
        };

        let store = &*self.store;
        let owner = self.owner;
        let retry = &self.retry;
        let writes = logs.into_iter().map(|log| {
            with_retry(retry, "upsert_completion_log", move || {
                store.upsert_completion_log(owner, log)
            })
        });
        let mut failures: Vec<StoreError> = join_all(writes)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect();

        if let Err(e) = with_retry(retry, "complete_session", move || {
            store.complete_session(owner, session_id, end_time)
        })
        .await
        {
            failures.push(e);
        }

        let durability_warning = if failures.is_empty() {
            None
        } else {
            error!(
                "Session {} finished with {} unsaved writes: {}",
                session_id,
                failures.len(),
                failures[0]
            );
            failures.into_iter().next().map(SessionError::from)
        };

        info!(
            "Finished session {}: {}/{} exercises, {}/{} sets",
            session_id,
            report.completed_exercises,
            report.total_exercises,
            report.completed_sets,
            report.total_target_sets
        );
        Ok(FinishOutcome {
            report,
            durability_warning,
        })
    }

    /// Returns a finished (or never started) manager to `Idle`.
    pub fn reset(&self) -> Result<(), SessionError> {
        if self.is_pending() {
            return Err(SessionError::validation(
                "cannot reset while a start or finish is in flight",
            ));
        }
        let mut active = self.active();
        if active.state == SessionState::InProgress {
            return Err(SessionError::validation(
                "cannot reset while a session is in progress",
            ));
        }
        *active = ActiveSession::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::SqliteStore;
    use crate::db::models::{ExerciseCompletionLog, PlanId, WorkoutSession};
    use crate::error::{ErrorKind, StoreResult};
    use crate::store::{ExerciseDraft, PlanDraft, PlanStore, SessionHistory};
    use chrono::{TimeDelta, TimeZone};
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    /// Wraps the SQLite store and injects failures on demand.
    struct FlakyStore {
        inner: SqliteStore,
        transient_upserts: AtomicU32,
        missing_upserts: AtomicBool,
        fail_complete: AtomicBool,
    }

    impl FlakyStore {
        fn new(inner: SqliteStore) -> Self {
            Self {
                inner,
                transient_upserts: AtomicU32::new(0),
                missing_upserts: AtomicBool::new(false),
                fail_complete: AtomicBool::new(false),
            }
        }
    }

    impl SessionStore for FlakyStore {
        async fn create_session(
            &self,
            owner: UserId,
            plan_id: PlanId,
            start_time: DateTime<Utc>,
        ) -> StoreResult<WorkoutSession> {
            self.inner.create_session(owner, plan_id, start_time).await
        }

        async fn upsert_completion_log(
            &self,
            owner: UserId,
            log: NewCompletionLog,
        ) -> StoreResult<ExerciseCompletionLog> {
            if self.missing_upserts.load(Ordering::SeqCst) {
                return Err(StoreError::not_found("session", log.session_id));
            }
            if self
                .transient_upserts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Unavailable("connection reset".into()));
            }
            self.inner.upsert_completion_log(owner, log).await
        }

        async fn complete_session(
            &self,
            owner: UserId,
            session_id: SessionId,
            end_time: DateTime<Utc>,
        ) -> StoreResult<WorkoutSession> {
            if self.fail_complete.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection reset".into()));
            }
            self.inner.complete_session(owner, session_id, end_time).await
        }

        async fn delete_session(&self, owner: UserId, session_id: SessionId) -> StoreResult<()> {
            self.inner.delete_session(owner, session_id).await
        }

        async fn get_session_history(
            &self,
            owner: UserId,
            session_id: SessionId,
        ) -> StoreResult<SessionHistory> {
            self.inner.get_session_history(owner, session_id).await
        }

        async fn sessions_in_range(
            &self,
            owner: UserId,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> StoreResult<Vec<SessionHistory>> {
            self.inner.sessions_in_range(owner, start, end).await
        }
    }

    struct Fixture {
        store: Arc<FlakyStore>,
        clock: Arc<ManualClock>,
        owner: UserId,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    async fn fixture() -> Fixture {
        let inner = SqliteStore::in_memory().unwrap();
        let owner = inner.get_or_create_user("riley").await.unwrap().id;
        Fixture {
            store: Arc::new(FlakyStore::new(inner)),
            clock: Arc::new(ManualClock::new(t0())),
            owner,
        }
    }

    impl Fixture {
        fn manager(&self) -> WorkoutSessionManager<FlakyStore, ManualClock> {
            WorkoutSessionManager::new(
                Arc::clone(&self.store),
                self.owner,
                Arc::clone(&self.clock),
                RetryPolicy::no_retry(),
            )
        }

        async fn plan(&self, targets: &[i32]) -> PlanWithExercises {
            let store = &self.store.inner;
            let plan = store
                .create_plan(
                    self.owner,
                    PlanDraft {
                        name: "Full body".into(),
                        description: None,
                    },
                )
                .await
                .unwrap();
            for (i, sets) in targets.iter().enumerate() {
                store
                    .append_exercise(
                        self.owner,
                        plan.id,
                        ExerciseDraft {
                            name: format!("Exercise {}", i + 1),
                            target_sets: *sets,
                            target_reps: 8,
                            rest_seconds: 90,
                            notes: None,
                        },
                    )
                    .await
                    .unwrap();
            }
            store.get_plan(self.owner, plan.id).await.unwrap()
        }

        async fn all_sessions(&self) -> Vec<SessionHistory> {
            self.store
                .sessions_in_range(
                    self.owner,
                    t0() - TimeDelta::days(1),
                    t0() + TimeDelta::days(1),
                )
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn start_requires_at_least_one_exercise() {
        let fx = fixture().await;
        let manager = fx.manager();

        let empty = fx.plan(&[]).await;
        let err = manager.start_session(&empty).await.unwrap_err();
        assert_eq!(
            err,
            SessionError::validation("cannot start a session with zero exercises")
        );
        assert_eq!(manager.state(), SessionState::Idle);
        assert!(fx.all_sessions().await.is_empty());

        let plan = fx.plan(&[3]).await;
        let id = manager.start_session(&plan).await.unwrap();
        assert_eq!(manager.session_id(), Some(id));
        assert_eq!(manager.state(), SessionState::InProgress);
        assert_eq!(fx.all_sessions().await.len(), 1);
    }

    #[tokio::test]
    async fn start_rejects_plans_of_other_users() {
        let fx = fixture().await;
        let plan = fx.plan(&[3]).await;
        let stranger = fx.store.inner.get_or_create_user("sam").await.unwrap().id;
        let manager = WorkoutSessionManager::new(
            Arc::clone(&fx.store),
            stranger,
            Arc::clone(&fx.clock),
            RetryPolicy::no_retry(),
        );
        let err = manager.start_session(&plan).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(manager.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn concurrent_starts_are_single_flight() {
        let fx = fixture().await;
        let plan = fx.plan(&[3, 3]).await;
        let manager = fx.manager();

        let (first, second) = tokio::join!(
            manager.start_session(&plan),
            manager.start_session(&plan)
        );
        assert!(first.is_ok());
        assert_eq!(second.unwrap_err().kind(), ErrorKind::Validation);
        assert!(!manager.is_pending());
        assert_eq!(fx.all_sessions().await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_finishes_are_single_flight() {
        let fx = fixture().await;
        let plan = fx.plan(&[3, 3]).await;
        let manager = fx.manager();
        let session_id = manager.start_session(&plan).await.unwrap();

        let (first, second) = tokio::join!(manager.finish_session(), manager.finish_session());
        let results = [first, second];
        let finished = results.iter().filter(|r| r.is_ok()).count();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::Validation))
            .count();
        assert_eq!((finished, rejected), (1, 1));
        assert!(!manager.is_pending());
        assert_eq!(manager.state(), SessionState::Completed);

        let history = fx
            .store
            .get_session_history(fx.owner, session_id)
            .await
            .unwrap();
        assert_eq!(history.logs.len(), 2);
        assert!(history.session.is_completed());
    }

    #[tokio::test]
    async fn toggles_on_different_exercises_run_concurrently() {
        let fx = fixture().await;
        let plan = fx.plan(&[3, 3, 3]).await;
        let manager = fx.manager();
        let session_id = manager.start_session(&plan).await.unwrap();

        let (a, b, c) = tokio::join!(
            manager.toggle_exercise_completion(plan.exercises[0].id, Some(1)),
            manager.toggle_exercise_completion(plan.exercises[1].id, Some(2)),
            manager.toggle_exercise_completion(plan.exercises[2].id, Some(0)),
        );
        for outcome in [a, b, c] {
            assert_eq!(outcome.unwrap().warning, None);
        }

        let sets: Vec<(i32, bool)> = manager
            .progress()
            .iter()
            .map(|p| (p.completed_sets, p.completed))
            .collect();
        assert_eq!(sets, vec![(1, true), (2, true), (0, false)]);

        let history = fx
            .store
            .get_session_history(fx.owner, session_id)
            .await
            .unwrap();
        let mut stored: Vec<(i32, i32)> = history
            .logs
            .iter()
            .map(|l| (l.exercise.position, l.log.completed_sets))
            .collect();
        stored.sort();
        let stored_sets: Vec<i32> = stored.into_iter().map(|(_, sets)| sets).collect();
        assert_eq!(stored_sets, vec![1, 2, 0]);
    }

    #[tokio::test]
    async fn repeated_explicit_toggle_keeps_one_log() {
        let fx = fixture().await;
        let plan = fx.plan(&[3, 4]).await;
        let exercise = plan.exercises[0].id;
        let manager = fx.manager();
        let session_id = manager.start_session(&plan).await.unwrap();

        manager
            .toggle_exercise_completion(exercise, Some(2))
            .await
            .unwrap();
        let outcome = manager
            .toggle_exercise_completion(exercise, Some(2))
            .await
            .unwrap();
        assert!(outcome.progress.completed);
        assert_eq!(outcome.progress.completed_sets, 2);

        let history = fx
            .store
            .get_session_history(fx.owner, session_id)
            .await
            .unwrap();
        let logs: Vec<_> = history
            .logs
            .iter()
            .filter(|l| l.log.exercise_id == exercise)
            .collect();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].log.completed_sets, 2);
        assert!(logs[0].log.completed);
    }

    #[tokio::test]
    async fn toggle_without_sets_flips() {
        let fx = fixture().await;
        let plan = fx.plan(&[4]).await;
        let exercise = plan.exercises[0].id;
        let manager = fx.manager();
        manager.start_session(&plan).await.unwrap();

        let on = manager
            .toggle_exercise_completion(exercise, None)
            .await
            .unwrap();
        assert!(on.progress.completed);
        assert_eq!(on.progress.completed_sets, 4);

        let off = manager
            .toggle_exercise_completion(exercise, None)
            .await
            .unwrap();
        assert!(!off.progress.completed);
        assert_eq!(off.progress.completed_sets, 0);
        assert!(off.progress.touched);
    }

    #[tokio::test]
    async fn toggle_outside_a_session_is_rejected() {
        let fx = fixture().await;
        let plan = fx.plan(&[3]).await;
        let manager = fx.manager();
        let err = manager
            .toggle_exercise_completion(plan.exercises[0].id, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        manager.start_session(&plan).await.unwrap();
        let err = manager
            .toggle_exercise_completion(plan.exercises[0].id, Some(-1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = manager
            .toggle_exercise_completion(9999, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn transient_toggle_failure_keeps_local_state() {
        let fx = fixture().await;
        let plan = fx.plan(&[3]).await;
        let exercise = plan.exercises[0].id;
        let manager = fx.manager();
        manager.start_session(&plan).await.unwrap();

        fx.store.transient_upserts.store(1, Ordering::SeqCst);
        let outcome = manager
            .toggle_exercise_completion(exercise, None)
            .await
            .unwrap();
        assert_eq!(
            outcome.warning.map(|w| w.kind()),
            Some(ErrorKind::Transient)
        );
        assert!(manager.progress()[0].completed);
    }

    #[tokio::test]
    async fn transient_toggle_failure_is_retried() {
        let fx = fixture().await;
        let plan = fx.plan(&[3]).await;
        let manager = WorkoutSessionManager::new(
            Arc::clone(&fx.store),
            fx.owner,
            Arc::clone(&fx.clock),
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
        );
        manager.start_session(&plan).await.unwrap();

        fx.store.transient_upserts.store(2, Ordering::SeqCst);
        let outcome = manager
            .toggle_exercise_completion(plan.exercises[0].id, None)
            .await
            .unwrap();
        assert_eq!(outcome.warning, None);
    }

    #[tokio::test]
    async fn missing_session_reverts_toggle() {
        let fx = fixture().await;
        let plan = fx.plan(&[3]).await;
        let exercise = plan.exercises[0].id;
        let manager = fx.manager();
        manager.start_session(&plan).await.unwrap();

        fx.store.missing_upserts.store(true, Ordering::SeqCst);
        let err = manager
            .toggle_exercise_completion(exercise, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let progress = &manager.progress()[0];
        assert!(!progress.completed);
        assert!(!progress.touched);
    }

    #[tokio::test]
    async fn finish_auto_completes_untouched_exercises() {
        let fx = fixture().await;
        let plan = fx.plan(&[3, 4, 3, 3, 2]).await;
        let manager = fx.manager();
        let session_id = manager.start_session(&plan).await.unwrap();

        manager
            .toggle_exercise_completion(plan.exercises[0].id, Some(3))
            .await
            .unwrap();
        manager
            .toggle_exercise_completion(plan.exercises[1].id, Some(4))
            .await
            .unwrap();

        fx.clock.advance(TimeDelta::minutes(45));
        let outcome = manager.finish_session().await.unwrap();
        assert_eq!(outcome.durability_warning, None);

        let report = outcome.report;
        assert_eq!(report.session_id, session_id);
        assert_eq!(report.total_exercises, 5);
        assert_eq!(report.completed_exercises, 5);
        assert_eq!(report.completion_percent, 100);
        assert_eq!(report.total_target_sets, 15);
        assert_eq!(report.completed_sets, 15);
        assert_eq!(report.sets_percent, 100);
        assert_eq!(report.elapsed_seconds, 45 * 60);
        assert_eq!(manager.state(), SessionState::Completed);

        let history = fx
            .store
            .get_session_history(fx.owner, session_id)
            .await
            .unwrap();
        assert_eq!(history.logs.len(), 5);
        assert_eq!(history.session.duration_seconds(), Some(45 * 60));
    }

    #[tokio::test]
    async fn explicitly_incomplete_exercises_stay_incomplete() {
        let fx = fixture().await;
        let plan = fx.plan(&[3, 3]).await;
        let manager = fx.manager();
        manager.start_session(&plan).await.unwrap();

        manager
            .toggle_exercise_completion(plan.exercises[0].id, Some(0))
            .await
            .unwrap();
        let report = manager.finish_session().await.unwrap().report;
        assert_eq!(report.completed_exercises, 1);
        assert_eq!(report.completion_percent, 50);
        assert_eq!(report.completed_sets, 3);
        assert_eq!(report.sets_percent, 50);
    }

    #[tokio::test]
    async fn failed_final_write_is_a_durability_warning() {
        let fx = fixture().await;
        let plan = fx.plan(&[3]).await;
        let manager = fx.manager();
        manager.start_session(&plan).await.unwrap();

        fx.store.fail_complete.store(true, Ordering::SeqCst);
        let outcome = manager.finish_session().await.unwrap();
        assert_eq!(outcome.report.completed_exercises, 1);
        assert_eq!(
            outcome.durability_warning.map(|w| w.kind()),
            Some(ErrorKind::Transient)
        );
        assert_eq!(manager.state(), SessionState::Completed);
    }

    #[tokio::test]
    async fn completed_manager_needs_reset() {
        let fx = fixture().await;
        let plan = fx.plan(&[3]).await;
        let manager = fx.manager();
        manager.start_session(&plan).await.unwrap();
        assert!(manager.reset().is_err());

        manager.finish_session().await.unwrap();
        assert!(manager.finish_session().await.is_err());
        assert!(manager.start_session(&plan).await.is_err());
        assert!(manager.report().is_some());

        manager.reset().unwrap();
        assert_eq!(manager.state(), SessionState::Idle);
        assert!(manager.report().is_none());
        manager.start_session(&plan).await.unwrap();
        assert_eq!(fx.all_sessions().await.len(), 2);
    }

    #[tokio::test]
    async fn elapsed_follows_the_wall_clock() {
        let fx = fixture().await;
        let plan = fx.plan(&[3]).await;
        let manager = fx.manager();
        manager.start_session(&plan).await.unwrap();

        fx.clock.advance(TimeDelta::seconds(125));
        assert_eq!(manager.elapsed_seconds(), 125);
        assert_eq!(manager.elapsed_display(), "02:05");
    }

    #[test]
    fn signed_out_users_cannot_build_a_manager() {
        struct SignedOut;
        impl AuthContext for SignedOut {
            fn current_user(&self) -> Option<UserId> {
                None
            }
        }

        let store = Arc::new(FlakyStore::new(SqliteStore::in_memory().unwrap()));
        let result = WorkoutSessionManager::for_current_user(
            store,
            &SignedOut,
            Arc::new(ManualClock::new(t0())),
            RetryPolicy::default(),
        );
        assert_eq!(
            result.err().map(|e| e.kind()),
            Some(ErrorKind::Unauthorized)
        );
    }
}
