use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use setwise::clock::ManualClock;
use setwise::db::SqliteStore;
use setwise::db::models::UserId;
use setwise::history::{compute_stats, fetch_stats};
use setwise::retry::RetryPolicy;
use setwise::session::{CompletionReport, SessionState, WorkoutSessionManager};
use setwise::store::{ExerciseDraft, PlanDraft, PlanStore, PlanWithExercises, SessionStore};

fn monday_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 7, 30, 0).unwrap()
}

async fn seed_plan(
    store: &SqliteStore,
    owner: UserId,
    targets: &[(&str, i32)],
) -> PlanWithExercises {
    let plan = store
        .create_plan(
            owner,
            PlanDraft {
                name: "Upper body".into(),
                description: Some("Push and pull".into()),
            },
        )
        .await
        .unwrap();
    for (name, sets) in targets {
        store
            .append_exercise(
                owner,
                plan.id,
                ExerciseDraft {
                    name: name.to_string(),
                    target_sets: *sets,
                    target_reps: 10,
                    rest_seconds: 60,
                    notes: None,
                },
            )
            .await
            .unwrap();
    }
    store.get_plan(owner, plan.id).await.unwrap()
}

#[tokio::test]
async fn finished_session_reads_back_with_the_same_report() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let owner = store.get_or_create_user("jordan").await.unwrap().id;
    let plan = seed_plan(&store, owner, &[("Bench press", 3), ("Rows", 4), ("Curls", 2)]).await;
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let manager = WorkoutSessionManager::new(
        Arc::clone(&store),
        owner,
        Arc::clone(&clock),
        RetryPolicy::no_retry(),
    );

    let session_id = manager.start_session(&plan).await.unwrap();
    manager
        .toggle_exercise_completion(plan.exercises[0].id, Some(3))
        .await
        .unwrap();
    // Marked done, then changed mind.
    manager
        .toggle_exercise_completion(plan.exercises[1].id, None)
        .await
        .unwrap();
    let undone = manager
        .toggle_exercise_completion(plan.exercises[1].id, None)
        .await
        .unwrap();
    assert!(!undone.progress.completed);
    assert_eq!(undone.progress.completed_sets, 0);

    clock.advance(TimeDelta::minutes(30));
    let outcome = manager.finish_session().await.unwrap();
    assert_eq!(outcome.durability_warning, None);
    assert_eq!(manager.state(), SessionState::Completed);

    let report = outcome.report;
    assert_eq!(report.total_exercises, 3);
    assert_eq!(report.completed_exercises, 2);
    assert_eq!(report.completion_percent, 67);
    assert_eq!(report.total_target_sets, 9);
    assert_eq!(report.completed_sets, 5);
    assert_eq!(report.sets_percent, 56);
    assert_eq!(report.elapsed_seconds, 30 * 60);

    let history = store.get_session_history(owner, session_id).await.unwrap();
    assert_eq!(history.logs.len(), 3);
    assert_eq!(CompletionReport::from_history(&history, &plan), report);

    let rows = history
        .logs
        .iter()
        .find(|l| l.exercise.id == plan.exercises[1].id)
        .unwrap();
    assert!(!rows.log.completed);
    assert_eq!(rows.log.completed_sets, 0);
}

#[tokio::test]
async fn completed_sessions_feed_history_stats() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let owner = store.get_or_create_user("jordan").await.unwrap().id;
    let plan = seed_plan(&store, owner, &[("Squats", 5), ("Lunges", 3)]).await;
    let clock = Arc::new(ManualClock::new(monday_morning()));

    for (day, minutes) in [(0, 40), (1, 50)] {
        clock.set(monday_morning() + TimeDelta::days(day));
        let manager = WorkoutSessionManager::new(
            Arc::clone(&store),
            owner,
            Arc::clone(&clock),
            RetryPolicy::no_retry(),
        );
        manager.start_session(&plan).await.unwrap();
        clock.advance(TimeDelta::minutes(minutes));
        manager.finish_session().await.unwrap();
    }

    let range_start = monday_morning() - TimeDelta::days(6);
    let range_end = monday_morning() + TimeDelta::days(1) + TimeDelta::hours(12);
    let stats = fetch_stats(&*store, owner, &range_start, &range_end)
        .await
        .unwrap();

    assert_eq!(stats.total_sessions, 2);
    assert_eq!(stats.completed_exercises, 4);
    assert_eq!(stats.completion_rate, 100);
    assert_eq!(stats.most_frequent_plan, Some(plan.plan.id));
    assert_eq!(stats.average_duration_minutes, 45);
    assert_eq!(stats.longest_streak_days, 2);
    assert_eq!(stats.current_streak_days, 2);

    let sessions = store
        .sessions_in_range(owner, range_start, range_end)
        .await
        .unwrap();
    assert_eq!(compute_stats(&sessions, &range_start, &range_end), stats);

    store.delete_plan(owner, plan.plan.id).await.unwrap();
    let after_delete = fetch_stats(&*store, owner, &range_start, &range_end)
        .await
        .unwrap();
    assert_eq!(after_delete.total_sessions, 0);
}
