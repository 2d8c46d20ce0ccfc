//! Pure document transformations.
//!
//! Each function returns `Cow::Borrowed` when it would not change the
//! document, so the engine can skip persistence without comparing whole
//! documents. Unknown task ids are always a no-op.

use crate::model::{AppState, DEFAULT_WEEKLY_TARGET_MIN, Task, TaskKind};
use crate::timekey::clamp_min0;
use std::borrow::Cow;

/// Append `task`. Weekly tasks get the default target and zero spent
/// minutes in the same document.
pub fn add_task(state: &AppState, task: Task) -> Cow<'_, AppState> {
    if task.title.trim().is_empty() || state.task(&task.id).is_some() {
        return Cow::Borrowed(state);
    }

    let mut next = state.clone();
    if task.kind == TaskKind::Weekly {
        next.weekly_target_min
            .insert(task.id.clone(), DEFAULT_WEEKLY_TARGET_MIN);
        next.weekly_spent_min.insert(task.id.clone(), 0);
    }
    next.tasks.push(task);
    Cow::Owned(next)
}

/// Rename a task. Blank titles are ignored.
pub fn update_task_title<'a>(state: &'a AppState, id: &str, title: &str) -> Cow<'a, AppState> {
    let title = title.trim();
    match state.task(id) {
        Some(task) if !title.is_empty() && task.title != title => {
            let mut next = state.clone();
            if let Some(task) = next.tasks.iter_mut().find(|t| t.id == id) {
                task.title = title.to_owned();
            }
            Cow::Owned(next)
        }
        _ => Cow::Borrowed(state),
    }
}

/// Remove a task and every mapping entry that references it.
pub fn delete_task<'a>(state: &'a AppState, id: &str) -> Cow<'a, AppState> {
    if state.task(id).is_none() {
        return Cow::Borrowed(state);
    }

    let mut next = state.clone();
    next.tasks.retain(|t| t.id != id);
    next.daily_done.remove(id);
    next.weekly_target_min.remove(id);
    next.weekly_spent_min.remove(id);
    Cow::Owned(next)
}

/// Flip today's done flag of a daily task.
pub fn toggle_daily_done<'a>(state: &'a AppState, id: &str) -> Cow<'a, AppState> {
    match state.task(id) {
        Some(task) if task.kind == TaskKind::Daily => {
            let mut next = state.clone();
            let done = state.is_done_today(id);
            next.daily_done.insert(id.to_owned(), !done);
            Cow::Owned(next)
        }
        _ => Cow::Borrowed(state),
    }
}

/// Add (or with a negative delta, remove) minutes from a weekly task.
/// The result never drops below zero.
pub fn add_weekly_minutes<'a>(state: &'a AppState, id: &str, delta_min: i64) -> Cow<'a, AppState> {
    match state.task(id) {
        Some(task) if task.kind == TaskKind::Weekly => {
            let current = state.spent_min(id);
            let spent = clamp_min0(i64::from(current).saturating_add(delta_min));
            if spent == current {
                return Cow::Borrowed(state);
            }
            let mut next = state.clone();
            next.weekly_spent_min.insert(id.to_owned(), spent);
            Cow::Owned(next)
        }
        _ => Cow::Borrowed(state),
    }
}

/// Set the weekly target, clamped at zero.
pub fn set_weekly_target<'a>(state: &'a AppState, id: &str, target_min: i64) -> Cow<'a, AppState> {
    match state.task(id) {
        Some(task) if task.kind == TaskKind::Weekly => {
            let target = clamp_min0(target_min);
            if state.weekly_target_min.get(id) == Some(&target) {
                return Cow::Borrowed(state);
            }
            let mut next = state.clone();
            next.weekly_target_min.insert(id.to_owned(), target);
            Cow::Owned(next)
        }
        _ => Cow::Borrowed(state),
    }
}

/// Replace the whole document.
pub fn replace_document(state: &AppState, incoming: AppState) -> Cow<'_, AppState> {
    if *state == incoming {
        Cow::Borrowed(state)
    } else {
        Cow::Owned(incoming)
    }
}
