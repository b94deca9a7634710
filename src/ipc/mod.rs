//! IPC protocol types for communication with the UI process.
//!
//! Events use `{"event": "<name>", "data": {...}}` format (core -> UI).
//! Commands use `{"command": "<name>", ...}` format (UI -> core).

pub mod bridge;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::narration::PlaybackSnapshot;
use crate::persistence::View;
use crate::schedule::ScheduleEntry;

// ---------------------------------------------------------------------------
// Events: core -> UI (stdout)
// ---------------------------------------------------------------------------

/// All events emitted via stdout as JSON lines.
///
/// Serialized as `{"event": "<variant>", "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum NarrationEvent {
    Starting {},
    Loading { step: String },
    Ready {},
    Pong {},
    NarrationState(PlaybackSnapshot),
    LessonLoaded(LessonSummary),
    ViewChanged { view: View },
    ScheduleFired { id: String, name: String },
    Armed { armed: bool },
    AudioDevices { output: Vec<String> },
    Error { message: String },
    Stopping {},
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonSummary {
    pub id: String,
    pub title: String,
    pub unit_count: usize,
}

// ---------------------------------------------------------------------------
// Commands: UI -> core (stdin)
// ---------------------------------------------------------------------------

/// All commands received via stdin as JSON lines.
///
/// Deserialized from `{"command": "<variant>", ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command")]
#[serde(rename_all = "snake_case")]
pub enum NarrationCommand {
    Ping {},
    LoadLesson { path: PathBuf },
    Start {},
    Stop {},
    Seek { index: usize },
    Next {},
    Previous {},
    ToggleLoop {},
    PointRead { unit_id: String },
    ToggleAutoPlay {},
    ShowView { view: View },
    Arm {},
    Disarm {},
    SetSchedules { schedules: Vec<ScheduleEntry> },
    ListAudioDevices {},
    Status {},
    Quit {},
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_shapes() {
        let cmd: NarrationCommand =
            serde_json::from_str(r#"{"command":"seek","index":3}"#).unwrap();
        assert!(matches!(cmd, NarrationCommand::Seek { index: 3 }));

        let cmd: NarrationCommand = serde_json::from_str(r#"{"command":"start"}"#).unwrap();
        assert!(matches!(cmd, NarrationCommand::Start {}));

        let cmd: NarrationCommand =
            serde_json::from_str(r#"{"command":"show_view","view":"player"}"#).unwrap();
        assert!(matches!(cmd, NarrationCommand::ShowView { view: View::Player }));

        let cmd: NarrationCommand =
            serde_json::from_str(r#"{"command":"point_read","unit_id":"l-2"}"#).unwrap();
        match cmd {
            NarrationCommand::PointRead { unit_id } => assert_eq!(unit_id, "l-2"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_set_schedules_command() {
        let cmd: NarrationCommand = serde_json::from_str(
            r#"{"command":"set_schedules","schedules":[{"id":"1","name":"Morning","startTime":"07:00","endTime":"07:30","repeatDays":[1]}]}"#,
        )
        .unwrap();
        match cmd {
            NarrationCommand::SetSchedules { schedules } => {
                assert_eq!(schedules.len(), 1);
                assert_eq!(schedules[0].start_time, "07:00");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(serde_json::from_str::<NarrationCommand>(r#"{"command":"dance"}"#).is_err());
        assert!(serde_json::from_str::<NarrationCommand>(r#"{"command":"seek"}"#).is_err());
    }

    #[test]
    fn test_event_shapes() {
        let value = serde_json::to_value(NarrationEvent::ViewChanged { view: View::Player }).unwrap();
        assert_eq!(value, json!({"event": "view_changed", "data": {"view": "player"}}));

        let value = serde_json::to_value(NarrationEvent::Pong {}).unwrap();
        assert_eq!(value, json!({"event": "pong", "data": {}}));

        let value = serde_json::to_value(NarrationEvent::LessonLoaded(LessonSummary {
            id: "abc".into(),
            title: "Spring".into(),
            unit_count: 4,
        }))
        .unwrap();
        assert_eq!(value["data"]["unitCount"], 4);
    }
}
