//! Day and week rollover.

use crate::model::AppState;
use crate::timekey::TimeKeys;
use std::borrow::Cow;

/// Advance the document to the period described by `keys`.
///
/// A new day clears `daily_done`; a new week clears `weekly_spent_min` and
/// keeps targets. Both may happen in one call. When neither key changed the
/// input is returned borrowed, so a second call with the same keys is
/// always a no-op.
pub fn rollover<'a>(state: &'a AppState, keys: &TimeKeys) -> Cow<'a, AppState> {
    let new_day = state.today_key != keys.day;
    let new_week = state.week_key != keys.week;
    if !new_day && !new_week {
        return Cow::Borrowed(state);
    }

    let mut next = state.clone();
    if new_day {
        next.today_key = keys.day.clone();
        next.daily_done.clear();
    }
    if new_week {
        next.week_key = keys.week.clone();
        next.weekly_spent_min.clear();
    }
    Cow::Owned(next)
}
