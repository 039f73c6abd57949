use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use log::{debug, info};

use crate::auth::{AuthContext, LocalAuth};
use crate::blob::{self, FsBlobStore};
use crate::clock::SystemClock;
use crate::config::Config;
use crate::db::SqliteStore;
use crate::db::models::UserId;
use crate::history;
use crate::runtime::global_runtime;
use crate::session::{SessionState, WorkoutSessionManager};
use crate::store::{ExerciseDraft, PlanDraft, PlanStore, SessionStore};
use crate::uniffi_interface::errors::SetwiseError;
use crate::uniffi_interface::objects::{
    CompletionSummary, ExerciseItem, PlanSummary, ProgressItem, StatsSummary, ToggleResult,
};

type Manager = WorkoutSessionManager<SqliteStore, SystemClock>;

fn block_on<F: Future>(fut: F) -> Result<F::Output, SetwiseError> {
    Ok(global_runtime()?.block_on(fut))
}

/// One signed-in user's view of the app: plans, the active session and
/// history.
#[derive(uniffi::Object)]
pub struct WorkoutApp {
    store: Arc<SqliteStore>,
    blobs: Option<FsBlobStore>,
    auth: LocalAuth<SqliteStore>,
    clock: Arc<SystemClock>,
    config: Config,
    manager: Mutex<Option<Arc<Manager>>>,
}

impl WorkoutApp {
    fn slot(&self) -> MutexGuard<'_, Option<Arc<Manager>>> {
        self.manager.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn owner(&self) -> Result<UserId, SetwiseError> {
        self.auth
            .current_user()
            .ok_or_else(|| SetwiseError::Unauthorized("not signed in".into()))
    }

    fn active_manager(&self) -> Result<Arc<Manager>, SetwiseError> {
        self.slot()
            .clone()
            .ok_or_else(|| SetwiseError::Validation("no session in progress".into()))
    }

    fn blobs(&self) -> Result<&FsBlobStore, SetwiseError> {
        self.blobs
            .as_ref()
            .ok_or_else(|| SetwiseError::Config("SETWISE_BLOB_DIR is not set".into()))
    }
}

#[uniffi::export]
impl WorkoutApp {
    /// Opens the database and reads the remaining settings from the
    /// environment.
    #[uniffi::constructor]
    pub fn open(database_url: String) -> Result<Arc<Self>, SetwiseError> {
        let config = Config::from_env()?;
        let store = Arc::new(SqliteStore::open(&database_url)?);
        let clock = Arc::new(SystemClock);
        let auth = LocalAuth::new(Arc::clone(&store), Arc::clone(&clock), config.auth_ttl);
        info!("WorkoutApp opened {}", database_url);
        Ok(Arc::new(Self {
            blobs: config.blob_dir.clone().map(FsBlobStore::new),
            store,
            auth,
            clock,
            config,
            manager: Mutex::new(None),
        }))
    }

    pub fn sign_up(&self, username: String) -> Result<i32, SetwiseError> {
        Ok(block_on(self.auth.sign_up(&username))??.user_id)
    }

    pub fn sign_in(&self, username: String) -> Result<i32, SetwiseError> {
        Ok(block_on(self.auth.sign_in(&username))??.user_id)
    }

    pub fn sign_out(&self) {
        self.auth.sign_out();
        self.slot().take();
    }

    pub fn refresh_sign_in(&self) -> Result<(), SetwiseError> {
        self.auth.refresh()?;
        Ok(())
    }

    pub fn current_user(&self) -> Option<i32> {
        self.auth.current_user()
    }

    pub fn list_plans(&self) -> Result<Vec<PlanSummary>, SetwiseError> {
        let owner = self.owner()?;
        let plans = block_on(self.store.list_plans(owner))??;
        Ok(plans.into_iter().map(PlanSummary::from).collect())
    }

    pub fn create_plan(
        &self,
        name: String,
        description: Option<String>,
    ) -> Result<PlanSummary, SetwiseError> {
        let owner = self.owner()?;
        let plan = block_on(self.store.create_plan(owner, PlanDraft { name, description }))??;
        Ok(plan.into())
    }

    pub fn delete_plan(&self, plan_id: i32) -> Result<(), SetwiseError> {
        let owner = self.owner()?;
        block_on(self.store.delete_plan(owner, plan_id))??;
        Ok(())
    }

    pub fn plan_exercises(&self, plan_id: i32) -> Result<Vec<ExerciseItem>, SetwiseError> {
        let owner = self.owner()?;
        let exercises = block_on(self.store.list_exercises(owner, plan_id))??;
        Ok(exercises.into_iter().map(ExerciseItem::from).collect())
    }

    /// Appends an exercise. Without `rest_seconds` the configured default
    /// rest interval is used.
    pub fn add_exercise(
        &self,
        plan_id: i32,
        name: String,
        target_sets: i32,
        target_reps: i32,
        rest_seconds: Option<i32>,
        notes: Option<String>,
    ) -> Result<ExerciseItem, SetwiseError> {
        let owner = self.owner()?;
        let rest_seconds = rest_seconds.unwrap_or_else(|| {
            i32::try_from(self.config.default_rest_seconds).unwrap_or(i32::MAX)
        });
        let draft = ExerciseDraft {
            name,
            target_sets,
            target_reps,
            rest_seconds,
            notes,
        };
        let exercise = block_on(self.store.append_exercise(owner, plan_id, draft))??;
        Ok(exercise.into())
    }

    pub fn delete_exercise(&self, exercise_id: i32) -> Result<(), SetwiseError> {
        let owner = self.owner()?;
        block_on(self.store.delete_exercise(owner, exercise_id))??;
        Ok(())
    }

    pub fn set_plan_image(
        &self,
        plan_id: i32,
        bytes: Vec<u8>,
        extension: String,
    ) -> Result<PlanSummary, SetwiseError> {
        let owner = self.owner()?;
        let blobs = self.blobs()?;
        let plan = block_on(blob::attach_plan_image(
            &*self.store,
            blobs,
            owner,
            plan_id,
            bytes,
            &extension,
        ))??;
        Ok(plan.into())
    }

    pub fn add_exercise_image(
        &self,
        exercise_id: i32,
        bytes: Vec<u8>,
        extension: String,
    ) -> Result<ExerciseItem, SetwiseError> {
        let owner = self.owner()?;
        let blobs = self.blobs()?;
        let exercise = block_on(blob::add_exercise_image(
            &*self.store,
            blobs,
            owner,
            exercise_id,
            bytes,
            &extension,
        ))??;
        Ok(exercise.into())
    }

    pub fn remove_exercise_image(
        &self,
        exercise_id: i32,
        index: u32,
    ) -> Result<ExerciseItem, SetwiseError> {
        let owner = self.owner()?;
        let blobs = self.blobs()?;
        let exercise = block_on(blob::remove_exercise_image(
            &*self.store,
            blobs,
            owner,
            exercise_id,
            index as usize,
        ))??;
        Ok(exercise.into())
    }

    /// Starts a session for the plan. A finished session is cleared first;
    /// a running one is rejected.
    pub fn start_session(&self, plan_id: i32) -> Result<i32, SetwiseError> {
        let owner = self.owner()?;
        let plan = block_on(self.store.get_plan(owner, plan_id))??;

        let manager = {
            let mut slot = self.slot();
            match slot.as_ref() {
                Some(existing) if existing.owner() == owner => Arc::clone(existing),
                _ => {
                    let created = Arc::new(Manager::for_current_user(
                        Arc::clone(&self.store),
                        &self.auth,
                        Arc::clone(&self.clock),
                        self.config.retry,
                    )?);
                    *slot = Some(Arc::clone(&created));
                    created
                }
            }
        };
        if manager.state() == SessionState::Completed {
            debug!("Clearing finished session before starting plan {}", plan_id);
            manager.reset()?;
        }
        Ok(block_on(manager.start_session(&plan))??)
    }

    pub fn toggle_exercise(
        &self,
        exercise_id: i32,
        completed_sets: Option<i32>,
    ) -> Result<ToggleResult, SetwiseError> {
        let manager = self.active_manager()?;
        let outcome = block_on(manager.toggle_exercise_completion(exercise_id, completed_sets))??;
        Ok(outcome.into())
    }

    pub fn session_progress(&self) -> Vec<ProgressItem> {
        self.slot()
            .as_ref()
            .map(|m| m.progress().into_iter().map(ProgressItem::from).collect())
            .unwrap_or_default()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.slot().as_ref().map_or(0, |m| m.elapsed_seconds())
    }

    pub fn elapsed_display(&self) -> String {
        self.slot()
            .as_ref()
            .map(|m| m.elapsed_display())
            .unwrap_or_else(|| crate::clock::format_elapsed(0))
    }

    pub fn finish_session(&self) -> Result<CompletionSummary, SetwiseError> {
        let manager = self.active_manager()?;
        let outcome = block_on(manager.finish_session())??;
        Ok(outcome.into())
    }

    /// Removes a past session and its logs. The session still being
    /// recorded cannot be deleted.
    pub fn delete_session(&self, session_id: i32) -> Result<(), SetwiseError> {
        let owner = self.owner()?;
        let active = self.slot().as_ref().is_some_and(|m| {
            m.session_id() == Some(session_id) && m.state() == SessionState::InProgress
        });
        if active {
            return Err(SetwiseError::Validation(
                "finish the session before deleting it".into(),
            ));
        }
        block_on(self.store.delete_session(owner, session_id))??;
        info!("Deleted session {}", session_id);
        Ok(())
    }

    /// Statistics over the last `days` days.
    pub fn stats(&self, days: u32) -> Result<StatsSummary, SetwiseError> {
        let owner = self.owner()?;
        let (start, end) = history::trailing_range(Utc::now(), days)?;
        let stats = block_on(history::fetch_stats(&*self.store, owner, &start, &end))??;
        Ok(stats.into())
    }
}
