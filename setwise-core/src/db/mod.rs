pub mod models;
pub mod operations;
pub mod schema;

use chrono::{DateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use log::{debug, info};

use crate::db::models::{
    Exercise, ExerciseChanges, ExerciseCompletionLog, ExerciseId, NewCompletionLog, PlanChanges,
    PlanId, SessionId, User, UserId, WorkoutPlan, WorkoutSession,
};
use crate::error::{StoreError, StoreResult};
use crate::store::{
    ExerciseDraft, PlanDraft, PlanStore, PlanWithExercises, SessionHistory, SessionStore,
    UserStore,
};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

#[derive(Debug)]
struct ConnectionPragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionPragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// SQLite-backed implementation of the persistence contracts.
///
/// Diesel is synchronous, so every call checks a connection out of the pool
/// on tokio's blocking thread pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `database_url` and applies
    /// pending migrations.
    pub fn open(database_url: &str) -> StoreResult<Self> {
        let pool = Pool::builder()
            .max_size(4)
            .connection_customizer(Box::new(ConnectionPragmas))
            .build(ConnectionManager::<SqliteConnection>::new(database_url))?;
        let store = Self { pool };
        store.init_database()?;
        info!("Opened workout database at {}", database_url);
        Ok(store)
    }

    /// A private in-memory database. The pool holds exactly one connection
    /// that is never recycled, otherwise the data would vanish with it.
    pub fn in_memory() -> StoreResult<Self> {
        let pool = Pool::builder()
            .max_size(1)
            .max_lifetime(None)
            .idle_timeout(None)
            .connection_customizer(Box::new(ConnectionPragmas))
            .build(ConnectionManager::<SqliteConnection>::new(":memory:"))?;
        let store = Self { pool };
        store.init_database()?;
        Ok(store)
    }

    fn init_database(&self) -> StoreResult<()> {
        let mut conn = self.pool.get()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::Internal(format!("failed to run migrations: {}", e)))?;
        for migration in applied {
            info!("Applied migration {}", migration);
        }
        Ok(())
    }

    async fn run<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> StoreResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            op(&mut conn)
        })
        .await?
    }

    pub async fn get_or_create_user(&self, username: &str) -> StoreResult<User> {
        let username = username.to_string();
        self.run(move |conn| operations::get_or_create_user(conn, &username))
            .await
    }

    /// Deletes every row, leaving the schema in place.
    pub async fn clear_all(&self) -> StoreResult<()> {
        debug!("Clearing all tables");
        self.run(|conn| {
            conn.batch_execute(
                "DELETE FROM exercise_completion_logs;
                 DELETE FROM workout_sessions;
                 DELETE FROM exercises;
                 DELETE FROM workout_plans;
                 DELETE FROM users;",
            )
            .map_err(StoreError::from)
        })
        .await
    }
}

impl UserStore for SqliteStore {
    async fn create_user(&self, username: &str) -> StoreResult<User> {
        let username = username.to_string();
        self.run(move |conn| operations::create_user(conn, &username))
            .await
    }

    async fn find_user(&self, username: &str) -> StoreResult<Option<User>> {
        let username = username.to_string();
        self.run(move |conn| operations::find_user(conn, &username))
            .await
    }
}

impl PlanStore for SqliteStore {
    async fn create_plan(&self, owner: UserId, draft: PlanDraft) -> StoreResult<WorkoutPlan> {
        self.run(move |conn| operations::create_plan(conn, owner, draft))
            .await
    }

    async fn get_plan(&self, owner: UserId, plan_id: PlanId) -> StoreResult<PlanWithExercises> {
        self.run(move |conn| operations::get_plan(conn, owner, plan_id))
            .await
    }

    async fn list_plans(&self, owner: UserId) -> StoreResult<Vec<WorkoutPlan>> {
        self.run(move |conn| operations::list_plans(conn, owner))
            .await
    }

    async fn update_plan(
        &self,
        owner: UserId,
        plan_id: PlanId,
        changes: PlanChanges,
    ) -> StoreResult<WorkoutPlan> {
        self.run(move |conn| operations::update_plan(conn, owner, plan_id, &changes))
            .await
    }

    async fn delete_plan(&self, owner: UserId, plan_id: PlanId) -> StoreResult<()> {
        self.run(move |conn| operations::delete_plan(conn, owner, plan_id))
            .await
    }

    async fn append_exercise(
        &self,
        owner: UserId,
        plan_id: PlanId,
        draft: ExerciseDraft,
    ) -> StoreResult<Exercise> {
        self.run(move |conn| operations::append_exercise(conn, owner, plan_id, draft))
            .await
    }

    async fn get_exercise(&self, owner: UserId, exercise_id: ExerciseId) -> StoreResult<Exercise> {
        self.run(move |conn| operations::get_exercise(conn, owner, exercise_id))
            .await
    }

    async fn list_exercises(&self, owner: UserId, plan_id: PlanId) -> StoreResult<Vec<Exercise>> {
        self.run(move |conn| operations::list_exercises(conn, owner, plan_id))
            .await
    }

    async fn update_exercise(
        &self,
        owner: UserId,
        exercise_id: ExerciseId,
        changes: ExerciseChanges,
    ) -> StoreResult<Exercise> {
        self.run(move |conn| operations::update_exercise(conn, owner, exercise_id, &changes))
            .await
    }

    async fn set_exercise_images(
        &self,
        owner: UserId,
        exercise_id: ExerciseId,
        image_urls: Vec<String>,
    ) -> StoreResult<Exercise> {
        self.run(move |conn| {
            operations::set_exercise_images(conn, owner, exercise_id, &image_urls)
        })
        .await
    }

    async fn delete_exercise(&self, owner: UserId, exercise_id: ExerciseId) -> StoreResult<()> {
        self.run(move |conn| operations::delete_exercise(conn, owner, exercise_id))
            .await
    }
}

impl SessionStore for SqliteStore {
    async fn create_session(
        &self,
        owner: UserId,
        plan_id: PlanId,
        start_time: DateTime<Utc>,
    ) -> StoreResult<WorkoutSession> {
        self.run(move |conn| operations::create_session(conn, owner, plan_id, start_time))
            .await
    }

    async fn upsert_completion_log(
        &self,
        owner: UserId,
        log: NewCompletionLog,
    ) -> StoreResult<ExerciseCompletionLog> {
        self.run(move |conn| operations::upsert_completion_log(conn, owner, log))
            .await
    }

    async fn complete_session(
        &self,
        owner: UserId,
        session_id: SessionId,
        end_time: DateTime<Utc>,
    ) -> StoreResult<WorkoutSession> {
        self.run(move |conn| operations::complete_session(conn, owner, session_id, end_time))
            .await
    }

    async fn delete_session(&self, owner: UserId, session_id: SessionId) -> StoreResult<()> {
        self.run(move |conn| operations::delete_session(conn, owner, session_id))
            .await
    }

    async fn get_session_history(
        &self,
        owner: UserId,
        session_id: SessionId,
    ) -> StoreResult<SessionHistory> {
        self.run(move |conn| operations::get_session_history(conn, owner, session_id))
            .await
    }

    async fn sessions_in_range(
        &self,
        owner: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<SessionHistory>> {
        self.run(move |conn| operations::sessions_in_range(conn, owner, start, end))
            .await
    }
}
