//! Explicit application state, saved after every mutation.
//!
//! Stored as a single JSON blob (`app_state.json`). On load the armed flag is
//! always reset to disarmed and the view to home, so automatic playback never
//! resumes without fresh user consent.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::lesson::Lesson;
use crate::schedule::{HostView, ScheduleEntry};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    #[default]
    Home,
    Scan,
    Library,
    Schedule,
    Player,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(default)]
    pub view: View,
    #[serde(default)]
    pub current_lesson: Option<Lesson>,
    #[serde(default)]
    pub schedules: Vec<ScheduleEntry>,
    #[serde(default)]
    pub is_armed: bool,
}

impl HostView for AppState {
    fn is_showing_player(&self) -> bool {
        self.view == View::Player
    }

    fn show_player(&mut self) {
        self.view = View::Player;
    }
}

/// Reads and writes [`AppState`] at a fixed path.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load state. Missing or corrupt files yield defaults.
    pub fn load(&self) -> AppState {
        let mut state = match std::fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str::<AppState>(&contents) {
                Ok(state) => state,
                Err(e) => {
                    warn!("Failed to parse {}: {}. Using defaults.", self.path.display(), e);
                    AppState::default()
                }
            },
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {}", self.path.display(), e);
                }
                AppState::default()
            }
        };

        state.view = View::Home;
        state.is_armed = false;
        state.schedules.retain(|entry| match entry.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!(entry = %entry.id, "Dropping invalid schedule: {}", e);
                false
            }
        });
        info!(
            schedules = state.schedules.len(),
            has_lesson = state.current_lesson.is_some(),
            "Application state loaded"
        );
        state
    }

    /// Write state via a temp file and rename.
    pub fn save(&self, state: &AppState) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(state).context("Failed to serialize state")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}
