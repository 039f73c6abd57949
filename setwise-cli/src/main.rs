use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use log::LevelFilter;

use setwise::auth::{AuthContext, LocalAuth};
use setwise::blob::{self, FsBlobStore};
use setwise::clock::{SystemClock, format_elapsed};
use setwise::config::Config;
use setwise::db::SqliteStore;
use setwise::db::models::{DisplayableLog, UserId};
use setwise::error::ErrorKind;
use setwise::history::{compute_stats, trailing_range};
use setwise::logging::{LogTarget, init_logger_with_target, parse_level};
use setwise::session::WorkoutSessionManager;
use setwise::store::{ExerciseDraft, PlanDraft, PlanStore, SessionStore};

mod workout;

#[derive(Parser, Debug)]
#[command(version, about = "Setwise - workout plans, sessions and history", long_about = None)]
struct Args {
    /// Username to act as; created on first use
    #[arg(short, long, global = true, default_value = "default")]
    user: String,
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage workout plans
    Plan {
        #[command(subcommand)]
        action: PlanCommand,
    },
    /// Manage the exercises of a plan
    Exercise {
        #[command(subcommand)]
        action: ExerciseCommand,
    },
    /// Run an interactive session for a plan
    Workout { plan_id: i32 },
    /// Statistics over recent sessions
    History {
        #[arg(short, long, default_value_t = 30)]
        days: u32,
        /// List every session with its logs
        #[arg(short, long)]
        verbose: bool,
        #[arg(long)]
        json: bool,
    },
    /// Manage recorded sessions
    Session {
        #[command(subcommand)]
        action: SessionCommand,
    },
}

#[derive(Subcommand, Debug)]
enum SessionCommand {
    /// Delete a session and its logs
    Delete { session_id: i32 },
}

#[derive(Subcommand, Debug)]
enum PlanCommand {
    Create {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    List,
    Show {
        plan_id: i32,
    },
    Delete {
        plan_id: i32,
    },
    /// Set the cover image of a plan
    Image {
        plan_id: i32,
        path: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum ExerciseCommand {
    /// Append an exercise to the end of a plan
    Add {
        plan_id: i32,
        name: String,
        #[arg(short, long, default_value_t = 3)]
        sets: i32,
        #[arg(short, long, default_value_t = 10)]
        reps: i32,
        /// Rest between sets in seconds
        #[arg(long)]
        rest: Option<i32>,
        #[arg(short, long)]
        notes: Option<String>,
    },
    Remove {
        exercise_id: i32,
    },
    /// Attach an image to an exercise
    Image {
        exercise_id: i32,
        path: PathBuf,
    },
}

struct App {
    config: Config,
    store: Arc<SqliteStore>,
    auth: LocalAuth<SqliteStore>,
    owner: UserId,
}

impl App {
    async fn open(config: Config, username: &str) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(config.require_database_url()?)?);
        let auth = LocalAuth::new(Arc::clone(&store), Arc::new(SystemClock), config.auth_ttl);
        match auth.sign_in(username).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::Unauthorized => {
                auth.sign_up(username).await?;
                println!("Created user {}", username);
            }
            Err(e) => return Err(e.into()),
        }
        let owner = auth
            .current_user()
            .ok_or_else(|| anyhow!("sign-in for {} did not stick", username))?;
        Ok(Self {
            config,
            store,
            auth,
            owner,
        })
    }

    fn blobs(&self) -> Result<FsBlobStore> {
        let dir = self
            .config
            .blob_dir
            .clone()
            .ok_or_else(|| anyhow!("SETWISE_BLOB_DIR is not set"))?;
        Ok(FsBlobStore::new(dir))
    }
}

fn read_image(path: &Path) -> Result<(Vec<u8>, String)> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| anyhow!("{} has no file extension", path.display()))?
        .to_string();
    Ok((bytes, extension))
}

async fn run_plan_command(ctx: &App, action: PlanCommand) -> Result<()> {
    let store = &*ctx.store;
    match action {
        PlanCommand::Create { name, description } => {
            let plan = store
                .create_plan(ctx.owner, PlanDraft { name, description })
                .await?;
            println!("Created plan {} ({})", plan.id, plan.name);
        }
        PlanCommand::List => {
            let plans = store.list_plans(ctx.owner).await?;
            if plans.is_empty() {
                println!("No plans yet. Create one with `plan create <name>`.");
            }
            for plan in plans {
                println!("{}, {}", plan.id, plan.name);
            }
        }
        PlanCommand::Show { plan_id } => {
            let plan = store.get_plan(ctx.owner, plan_id).await?;
            println!("{} (#{})", plan.plan.name, plan.plan.id);
            if let Some(description) = &plan.plan.description {
                println!("{}", description);
            }
            if let Some(image) = &plan.plan.image_url {
                println!("Cover: {}", image);
            }
            for exercise in &plan.exercises {
                println!(
                    "\t{}. [{}] {}: {} x {}, rest {}",
                    exercise.position + 1,
                    exercise.id,
                    exercise.name,
                    exercise.target_sets,
                    exercise.target_reps,
                    format_elapsed(u64::try_from(exercise.rest_seconds).unwrap_or(0))
                );
                if let Some(notes) = &exercise.notes {
                    println!("\t   {}", notes);
                }
                for image in exercise.images() {
                    println!("\t   image: {}", image);
                }
            }
            println!("Total target sets: {}", plan.total_target_sets());
        }
        PlanCommand::Delete { plan_id } => {
            store.delete_plan(ctx.owner, plan_id).await?;
            println!("Deleted plan {}", plan_id);
        }
        PlanCommand::Image { plan_id, path } => {
            let (bytes, extension) = read_image(&path)?;
            let blobs = ctx.blobs()?;
            let plan =
                blob::attach_plan_image(store, &blobs, ctx.owner, plan_id, bytes, &extension)
                    .await?;
            println!(
                "Cover of plan {} set to {}",
                plan.id,
                plan.image_url.unwrap_or_default()
            );
        }
    }
    Ok(())
}

async fn run_exercise_command(ctx: &App, action: ExerciseCommand) -> Result<()> {
    let store = &*ctx.store;
    match action {
        ExerciseCommand::Add {
            plan_id,
            name,
            sets,
            reps,
            rest,
            notes,
        } => {
            let rest_seconds = match rest {
                Some(rest) => rest,
                None => i32::try_from(ctx.config.default_rest_seconds)?,
            };
            let exercise = store
                .append_exercise(
                    ctx.owner,
                    plan_id,
                    ExerciseDraft {
                        name,
                        target_sets: sets,
                        target_reps: reps,
                        rest_seconds,
                        notes,
                    },
                )
                .await?;
            println!(
                "Added {} (#{}) at position {}",
                exercise.name,
                exercise.id,
                exercise.position + 1
            );
        }
        ExerciseCommand::Remove { exercise_id } => {
            store.delete_exercise(ctx.owner, exercise_id).await?;
            println!("Removed exercise {}", exercise_id);
        }
        ExerciseCommand::Image { exercise_id, path } => {
            let (bytes, extension) = read_image(&path)?;
            let blobs = ctx.blobs()?;
            let exercise =
                blob::add_exercise_image(store, &blobs, ctx.owner, exercise_id, bytes, &extension)
                    .await?;
            println!("{} now has {} images", exercise.name, exercise.images().len());
        }
    }
    Ok(())
}

async fn run_workout(ctx: &App, plan_id: i32, log_level: LevelFilter) -> Result<()> {
    let plan = ctx.store.get_plan(ctx.owner, plan_id).await?;
    let manager = WorkoutSessionManager::for_current_user(
        Arc::clone(&ctx.store),
        &ctx.auth,
        Arc::new(SystemClock),
        ctx.config.retry,
    )?;
    let session_id = manager.start_session(&plan).await?;

    // Log lines would tear the full-screen view.
    log::set_max_level(LevelFilter::Off);
    let terminal = ratatui::init();
    let result =
        workout::run_workout(terminal, &manager, &plan, ctx.config.default_rest_seconds).await;
    ratatui::restore();
    log::set_max_level(log_level);

    match result? {
        Some(outcome) => {
            println!("{}", outcome.report);
            if let Some(warning) = outcome.durability_warning {
                eprintln!("Warning: not everything was saved: {}", warning);
            }
        }
        None => println!(
            "Left session {} open after {}",
            session_id,
            manager.elapsed_display()
        ),
    }
    Ok(())
}

async fn run_history(ctx: &App, days: u32, verbose: bool, json: bool) -> Result<()> {
    let (start, end) = trailing_range(Local::now(), days)?;
    let sessions = ctx
        .store
        .sessions_in_range(
            ctx.owner,
            start.with_timezone(&Utc),
            end.with_timezone(&Utc),
        )
        .await?;
    let stats = compute_stats(&sessions, &start, &end);

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Last {} days", days);
    println!("Sessions: {}", stats.total_sessions);
    println!(
        "Completed exercises: {} ({}% of logged)",
        stats.completed_exercises, stats.completion_rate
    );
    if let Some(plan_id) = stats.most_frequent_plan {
        let name = sessions
            .iter()
            .find(|s| s.plan.id == plan_id)
            .map(|s| s.plan.name.as_str())
            .unwrap_or("?");
        println!("Most frequent plan: {} (#{})", name, plan_id);
    }
    println!("Average duration: {} min", stats.average_duration_minutes);
    println!("Sessions per week: {:.1}", stats.sessions_per_week);
    println!(
        "Streak: {} days (longest {})",
        stats.current_streak_days, stats.longest_streak_days
    );

    if verbose {
        for history in &sessions {
            let started = history.session.start_time.with_timezone(&Local);
            let duration = history
                .session
                .duration_seconds()
                .map(|s| format_elapsed(u64::try_from(s).unwrap_or(0)))
                .unwrap_or_else(|| "in progress".to_string());
            println!(
                "\n#{} {} - {} ({})",
                history.session.id,
                started.format("%Y-%m-%d %H:%M"),
                history.plan.name,
                duration
            );
            for logged in &history.logs {
                let displayable = DisplayableLog {
                    log: &logged.log,
                    exercise: &logged.exercise,
                };
                println!("\t{}", displayable);
            }
        }
    }
    Ok(())
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let log_level = parse_level(&args.log_level)
        .ok_or_else(|| anyhow!("unknown log level {}", args.log_level))?;
    init_logger_with_target(log_level, LogTarget::Stderr);

    let config = Config::from_env()?;
    let ctx = App::open(config, &args.user).await?;

    match args.command {
        Commands::Plan { action } => run_plan_command(&ctx, action).await,
        Commands::Exercise { action } => run_exercise_command(&ctx, action).await,
        Commands::Workout { plan_id } => run_workout(&ctx, plan_id, log_level).await,
        Commands::History {
            days,
            verbose,
            json,
        } => run_history(&ctx, days, verbose, json).await,
        Commands::Session {
            action: SessionCommand::Delete { session_id },
        } => {
            ctx.store.delete_session(ctx.owner, session_id).await?;
            println!("Deleted session {}", session_id);
            Ok(())
        }
    }
}
