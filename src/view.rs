//! Read-only progress views derived from a document and the current time.
//!
//! `stress` is in `0..=1` and grows as time runs out on unfinished work.

use crate::model::{AppState, TaskId, TaskKind};
use crate::timekey::format_minutes;
use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use std::fmt;

const MINUTES_PER_DAY: f64 = 24.0 * 60.0;
const MINUTES_PER_WEEK: f64 = 7.0 * MINUTES_PER_DAY;

/// Daily pressure starts rising at noon.
const DAILY_PRESSURE_START: f64 = 0.5;
/// Weekly pressure starts rising a little past mid-week.
const WEEK_END_PRESSURE_START: f64 = 0.55;

const BEHIND_THRESHOLD: f64 = 0.66;
const KEEP_PACE_THRESHOLD: f64 = 0.33;

fn clamp01(x: f64) -> f64 {
    if x.is_finite() { x.clamp(0.0, 1.0) } else { 0.0 }
}

/// Minutes since local midnight.
fn local_minutes(now: DateTime<Utc>, zone: Tz) -> f64 {
    let local = now.with_timezone(&zone);
    f64::from(local.hour() * 60 + local.minute())
}

/// Fraction of the local day elapsed.
pub fn day_progress(now: DateTime<Utc>, zone: Tz) -> f64 {
    clamp01(local_minutes(now, zone) / MINUTES_PER_DAY)
}

/// Zero before noon, rising linearly to 1 at midnight.
pub fn daily_pressure(day_progress: f64) -> f64 {
    clamp01((day_progress - DAILY_PRESSURE_START) / (1.0 - DAILY_PRESSURE_START))
}

/// Fraction of the local Monday-to-Sunday week elapsed.
pub fn week_elapsed(now: DateTime<Utc>, zone: Tz) -> f64 {
    let days_from_monday = now.with_timezone(&zone).weekday().num_days_from_monday();
    let minutes = f64::from(days_from_monday) * MINUTES_PER_DAY + local_minutes(now, zone);
    clamp01(minutes / MINUTES_PER_WEEK)
}

pub fn week_end_pressure(week_elapsed: f64) -> f64 {
    clamp01((week_elapsed - WEEK_END_PRESSURE_START) / (1.0 - WEEK_END_PRESSURE_START))
}

/// Weekly pace verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    OnTrack,
    KeepPace,
    Behind,
}

impl Pace {
    pub fn from_stress(stress: f64) -> Self {
        if stress >= BEHIND_THRESHOLD {
            Self::Behind
        } else if stress >= KEEP_PACE_THRESHOLD {
            Self::KeepPace
        } else {
            Self::OnTrack
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::OnTrack => "On track.",
            Self::KeepPace => "Week is moving. Keep pace.",
            Self::Behind => "Behind schedule. Consider adding time soon.",
        }
    }
}

impl fmt::Display for Pace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyRow {
    pub id: TaskId,
    pub title: String,
    pub done: bool,
    pub stress: f64,
}

impl DailyRow {
    pub fn subtitle(&self) -> &'static str {
        if self.done { "Done today" } else { "Not done yet" }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyRow {
    pub id: TaskId,
    pub title: String,
    pub spent_min: u32,
    pub target_min: u32,
    /// `spent / target`, clamped; zero when there is no target.
    pub progress: f64,
    /// Progress the week's elapsed time calls for.
    pub expected: f64,
    pub stress: f64,
    pub pace: Pace,
}

impl WeeklyRow {
    /// `1h 30m / 10h (15%)`.
    pub fn subtitle(&self) -> String {
        format!(
            "{} / {} ({}%)",
            format_minutes(self.spent_min),
            format_minutes(self.target_min),
            (self.progress * 100.0).round() as u32
        )
    }
}

/// Daily tasks, not-done first, original order otherwise.
pub fn daily_rows(state: &AppState, now: DateTime<Utc>, zone: Tz) -> Vec<DailyRow> {
    let pressure = daily_pressure(day_progress(now, zone));
    let mut rows: Vec<DailyRow> = state
        .tasks_of_kind(TaskKind::Daily)
        .map(|task| {
            let done = state.is_done_today(&task.id);
            DailyRow {
                id: task.id.clone(),
                title: task.title.clone(),
                done,
                stress: if done { 0.0 } else { pressure },
            }
        })
        .collect();
    rows.sort_by_key(|row| row.done);
    rows
}

/// Ordering key: least progress first. A zero target counts as finished
/// once any time is logged against it.
fn sort_progress(spent: u32, target: u32) -> f64 {
    match (spent, target) {
        (0, _) => 0.0,
        (_, 0) => f64::INFINITY,
        (s, t) => f64::from(s) / f64::from(t),
    }
}

/// Weekly tasks, least progress first.
pub fn weekly_rows(state: &AppState, now: DateTime<Utc>, zone: Tz) -> Vec<WeeklyRow> {
    let expected = week_elapsed(now, zone);
    let end_pressure = week_end_pressure(expected);

    let mut rows: Vec<(f64, WeeklyRow)> = state
        .tasks_of_kind(TaskKind::Weekly)
        .map(|task| {
            let spent = state.spent_min(&task.id);
            let target = state.target_min(&task.id);
            let progress = if target > 0 {
                clamp01(f64::from(spent) / f64::from(target))
            } else {
                0.0
            };
            let behind = clamp01(expected - progress);
            let stress = clamp01((end_pressure * 0.8).max(behind * 1.2));
            let row = WeeklyRow {
                id: task.id.clone(),
                title: task.title.clone(),
                spent_min: spent,
                target_min: target,
                progress,
                expected,
                stress,
                pace: Pace::from_stress(stress),
            };
            (sort_progress(spent, target), row)
        })
        .collect();
    rows.sort_by(|a, b| a.0.total_cmp(&b.0));
    rows.into_iter().map(|(_, row)| row).collect()
}
