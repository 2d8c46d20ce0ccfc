//! JSON import and export of the whole document.

use crate::error::{Result, TimeslicerError};
use crate::model::AppState;
use crate::rollover::rollover;
use crate::timekey::TimeKeys;

/// Pretty-printed JSON of `state`.
///
/// # Errors
///
/// Returns [`TimeslicerError::Decode`] if serialization fails.
pub fn export_state_json(state: &AppState) -> Result<String> {
    serde_json::to_string_pretty(state)
        .map_err(|e| TimeslicerError::Decode(format!("cannot serialize state: {e}")))
}

/// Parse exported text into a document ready to replace the current one.
///
/// The document is normalized and rolled over to `keys`, so text exported
/// on an earlier day imports with that day's completions cleared.
///
/// # Errors
///
/// Returns [`TimeslicerError::Import`] when the text is not valid JSON, is
/// not a state object, or carries a version other than 1.
pub fn import_state_json(text: &str, keys: &TimeKeys) -> Result<AppState> {
    let parsed = AppState::from_json(text)
        .map_err(|e| TimeslicerError::Import(format!("invalid state JSON: {e}")))?;
    let normalized = parsed.normalized();
    Ok(rollover(&normalized, keys).into_owned())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::model::{Task, TaskKind};
    use crate::mutations;
    use chrono::Utc;

    fn keys() -> TimeKeys {
        TimeKeys {
            day: "2024-01-03".to_owned(),
            week: "2024-W01".to_owned(),
        }
    }

    fn sample() -> AppState {
        let state = AppState::blank(&keys());
        let study = Task::new("Study", TaskKind::Weekly, Utc::now()).unwrap();
        let study_id = study.id.clone();
        let state = mutations::add_task(&state, study).into_owned();
        let stretch = Task::new("Stretch", TaskKind::Daily, Utc::now()).unwrap();
        let stretch_id = stretch.id.clone();
        let state = mutations::add_task(&state, stretch).into_owned();
        let state = mutations::toggle_daily_done(&state, &stretch_id).into_owned();
        mutations::add_weekly_minutes(&state, &study_id, 45).into_owned()
    }

    #[test]
    fn export_then_import_is_identity_within_period() {
        let state = sample();
        let text = export_state_json(&state).unwrap();
        assert!(text.contains('\n'), "export should be pretty-printed");
        let imported = import_state_json(&text, &keys()).unwrap();
        assert_eq!(imported, state);
    }

    #[test]
    fn import_across_day_boundary_clears_completions() {
        let state = sample();
        let text = export_state_json(&state).unwrap();
        let tomorrow = TimeKeys {
            day: "2024-01-04".to_owned(),
            week: "2024-W01".to_owned(),
        };
        let imported = import_state_json(&text, &tomorrow).unwrap();
        assert!(imported.daily_done.is_empty());
        assert_eq!(imported.weekly_spent_min, state.weekly_spent_min);
    }

    #[test]
    fn malformed_text_is_a_descriptive_error() {
        let err = import_state_json("{\"version\": 1, \"tasks\": ", &keys()).unwrap_err();
        match err {
            TimeslicerError::Import(msg) => assert!(msg.contains("invalid state JSON")),
            other => panic!("expected Import error, got {other:?}"),
        }
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let err = import_state_json(r#"{"version": 2, "tasks": []}"#, &keys()).unwrap_err();
        match err {
            TimeslicerError::Import(msg) => assert!(msg.contains("version"), "msg: {msg}"),
            other => panic!("expected Import error, got {other:?}"),
        }
    }
}
