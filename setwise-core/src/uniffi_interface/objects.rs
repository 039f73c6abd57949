use crate::clock::format_elapsed;
use crate::db::models;
use crate::history::HistoryStats;
use crate::session::{CompletionReport, ExerciseProgress, FinishOutcome, ToggleOutcome};

#[derive(Debug, Clone, uniffi::Record)]
pub struct PlanSummary {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

impl From<models::WorkoutPlan> for PlanSummary {
    fn from(p: models::WorkoutPlan) -> Self {
        PlanSummary {
            id: p.id,
            name: p.name,
            description: p.description,
            image_url: p.image_url,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct ExerciseItem {
    pub id: i32,
    pub plan_id: i32,
    pub name: String,
    pub target_sets: i32,
    pub target_reps: i32,
    pub rest_seconds: i32,
    pub notes: Option<String>,
    pub position: i32,
    pub image_urls: Vec<String>,
}

impl From<models::Exercise> for ExerciseItem {
    fn from(e: models::Exercise) -> Self {
        let image_urls = e.images();
        ExerciseItem {
            id: e.id,
            plan_id: e.plan_id,
            name: e.name,
            target_sets: e.target_sets,
            target_reps: e.target_reps,
            rest_seconds: e.rest_seconds,
            notes: e.notes,
            position: e.position,
            image_urls,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct ProgressItem {
    pub exercise_id: i32,
    pub name: String,
    pub target_sets: i32,
    pub rest_seconds: i32,
    pub completed: bool,
    pub completed_sets: i32,
}

impl From<ExerciseProgress> for ProgressItem {
    fn from(p: ExerciseProgress) -> Self {
        ProgressItem {
            exercise_id: p.exercise_id,
            name: p.name,
            target_sets: p.target_sets,
            rest_seconds: p.rest_seconds,
            completed: p.completed,
            completed_sets: p.completed_sets,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct ToggleResult {
    pub progress: ProgressItem,
    pub warning: Option<String>,
}

impl From<ToggleOutcome> for ToggleResult {
    fn from(o: ToggleOutcome) -> Self {
        ToggleResult {
            progress: o.progress.into(),
            warning: o.warning.map(|w| w.to_string()),
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct CompletionSummary {
    pub session_id: i32,
    pub total_exercises: u32,
    pub completed_exercises: u32,
    pub completion_percent: u32,
    pub total_target_sets: i64,
    pub completed_sets: i64,
    pub sets_percent: u32,
    pub elapsed_seconds: u64,
    pub elapsed_display: String,
    pub durability_warning: Option<String>,
}

impl CompletionSummary {
    fn new(report: CompletionReport, durability_warning: Option<String>) -> Self {
        CompletionSummary {
            session_id: report.session_id,
            total_exercises: u32::try_from(report.total_exercises).unwrap_or(u32::MAX),
            completed_exercises: u32::try_from(report.completed_exercises).unwrap_or(u32::MAX),
            completion_percent: report.completion_percent,
            total_target_sets: report.total_target_sets,
            completed_sets: report.completed_sets,
            sets_percent: report.sets_percent,
            elapsed_seconds: report.elapsed_seconds,
            elapsed_display: format_elapsed(report.elapsed_seconds),
            durability_warning,
        }
    }
}

impl From<FinishOutcome> for CompletionSummary {
    fn from(o: FinishOutcome) -> Self {
        CompletionSummary::new(o.report, o.durability_warning.map(|w| w.to_string()))
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct StatsSummary {
    pub total_sessions: u32,
    pub completed_exercises: u32,
    pub completion_rate: u32,
    pub most_frequent_plan: Option<i32>,
    pub average_duration_minutes: i64,
    pub sessions_per_week: f64,
    pub longest_streak_days: u32,
    pub current_streak_days: u32,
}

impl From<HistoryStats> for StatsSummary {
    fn from(s: HistoryStats) -> Self {
        StatsSummary {
            total_sessions: u32::try_from(s.total_sessions).unwrap_or(u32::MAX),
            completed_exercises: u32::try_from(s.completed_exercises).unwrap_or(u32::MAX),
            completion_rate: s.completion_rate,
            most_frequent_plan: s.most_frequent_plan,
            average_duration_minutes: s.average_duration_minutes,
            sessions_per_week: s.sessions_per_week,
            longest_streak_days: s.longest_streak_days,
            current_streak_days: s.current_streak_days,
        }
    }
}
