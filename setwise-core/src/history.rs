//! Statistics over a user's past sessions.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone, Utc};
use log::debug;
use serde::Serialize;

use crate::db::models::{PlanId, UserId};
use crate::error::{StoreError, StoreResult};
use crate::session::percent;
use crate::store::{SessionHistory, SessionStore};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryStats {
    pub total_sessions: usize,
    pub completed_exercises: usize,
    /// Completed logs out of all logs, as a rounded percentage.
    pub completion_rate: u32,
    pub most_frequent_plan: Option<PlanId>,
    pub average_duration_minutes: i64,
    pub sessions_per_week: f64,
    pub longest_streak_days: u32,
    pub current_streak_days: u32,
}

/// Computes [`HistoryStats`] for the sessions that started within
/// `[range_start, range_end]`.
///
/// Calendar days are taken in the time zone of `range_start`. The result
/// depends only on the arguments.
pub fn compute_stats<Tz: TimeZone>(
    sessions: &[SessionHistory],
    range_start: &DateTime<Tz>,
    range_end: &DateTime<Tz>,
) -> HistoryStats {
    let tz = range_start.timezone();
    let in_range: Vec<&SessionHistory> = sessions
        .iter()
        .filter(|s| s.session.start_time >= *range_start && s.session.start_time <= *range_end)
        .collect();

    let total_sessions = in_range.len();
    let completed_exercises = in_range.iter().map(|s| s.completed_exercise_count()).sum();
    let total_logs: usize = in_range.iter().map(|s| s.logs.len()).sum();

    let days: BTreeSet<NaiveDate> = in_range
        .iter()
        .map(|s| s.session.start_time.with_timezone(&tz).date_naive())
        .collect();
    let last_day = range_end.with_timezone(&tz).date_naive();
    let days_in_range = (range_end.clone() - range_start.clone()).num_days();

    HistoryStats {
        total_sessions,
        completed_exercises,
        completion_rate: percent(completed_exercises as i64, total_logs as i64),
        most_frequent_plan: most_frequent_plan(&in_range),
        average_duration_minutes: average_duration_minutes(&in_range),
        sessions_per_week: sessions_per_week(total_sessions, days_in_range),
        longest_streak_days: longest_streak(&days),
        current_streak_days: current_streak(&days, last_day),
    }
}

/// Ties go to the plan seen first.
fn most_frequent_plan(sessions: &[&SessionHistory]) -> Option<PlanId> {
    let mut counts: Vec<(PlanId, usize)> = Vec::new();
    for s in sessions {
        match counts.iter_mut().find(|(id, _)| *id == s.session.plan_id) {
            Some((_, n)) => *n += 1,
            None => counts.push((s.session.plan_id, 1)),
        }
    }
    let mut best: Option<(PlanId, usize)> = None;
    for (id, n) in counts {
        if best.is_none_or(|(_, top)| n > top) {
            best = Some((id, n));
        }
    }
    best.map(|(id, _)| id)
}

fn average_duration_minutes(sessions: &[&SessionHistory]) -> i64 {
    let durations: Vec<i64> = sessions
        .iter()
        .filter_map(|s| s.session.duration_seconds())
        .collect();
    if durations.is_empty() {
        return 0;
    }
    let mean_seconds = durations.iter().sum::<i64>() as f64 / durations.len() as f64;
    (mean_seconds / 60.0).round() as i64
}

fn sessions_per_week(total: usize, days_in_range: i64) -> f64 {
    if days_in_range <= 0 {
        return 0.0;
    }
    let per_week = total as f64 / (days_in_range as f64 / 7.0);
    (per_week * 10.0).round() / 10.0
}

fn longest_streak(days: &BTreeSet<NaiveDate>) -> u32 {
    let mut longest = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;
    for day in days {
        run = match previous {
            Some(prev) if prev.succ_opt() == Some(*day) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(*day);
    }
    longest
}

/// Length of the run that ends on `last_day` or the day before it.
fn current_streak(days: &BTreeSet<NaiveDate>, last_day: NaiveDate) -> u32 {
    let mut cursor = if days.contains(&last_day) {
        last_day
    } else {
        match last_day.pred_opt() {
            Some(yesterday) if days.contains(&yesterday) => yesterday,
            _ => return 0,
        }
    };
    let mut run = 0;
    while days.contains(&cursor) {
        run += 1;
        match cursor.pred_opt() {
            Some(prev) => cursor = prev,
            None => break,
        }
    }
    run
}

/// `[now - days, now]`. Fails when the start would fall before the earliest
/// representable date.
pub fn trailing_range<Tz: TimeZone>(
    now: DateTime<Tz>,
    days: u32,
) -> StoreResult<(DateTime<Tz>, DateTime<Tz>)> {
    let start = now
        .clone()
        .checked_sub_signed(TimeDelta::days(i64::from(days)))
        .ok_or_else(|| StoreError::Invalid(format!("{} days is out of range", days)))?;
    Ok((start, now))
}

/// Loads the owner's sessions in range from the store and aggregates them.
pub async fn fetch_stats<S: SessionStore, Tz: TimeZone>(
    store: &S,
    owner: UserId,
    range_start: &DateTime<Tz>,
    range_end: &DateTime<Tz>,
) -> StoreResult<HistoryStats> {
    let sessions = store
        .sessions_in_range(
            owner,
            range_start.with_timezone(&Utc),
            range_end.with_timezone(&Utc),
        )
        .await?;
    debug!("Aggregating {} sessions for user {}", sessions.len(), owner);
    Ok(compute_stats(&sessions, range_start, range_end))
}
