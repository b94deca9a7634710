//! Configuration reading and data directory paths.

pub mod paths;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::narration::DEFAULT_SKIP_DELAY;
use paths::get_data_dir;

/// narrator_config.json shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarratorConfig {
    #[serde(default = "default_adapter")]
    pub speech_adapter: String,
    #[serde(default)]
    pub speech_api_key: Option<String>,
    #[serde(default)]
    pub speech_voice: Option<String>,
    #[serde(default)]
    pub output_device: Option<String>,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default = "default_skip_delay_ms")]
    pub skip_delay_ms: u64,
    #[serde(default = "default_autoplay")]
    pub autoplay_on_schedule: bool,
}

fn default_adapter() -> String {
    "gemini".to_string()
}

fn default_volume() -> f32 {
    1.0
}

fn default_skip_delay_ms() -> u64 {
    DEFAULT_SKIP_DELAY.as_millis() as u64
}

fn default_autoplay() -> bool {
    true
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            speech_adapter: default_adapter(),
            speech_api_key: None,
            speech_voice: None,
            output_device: None,
            volume: default_volume(),
            skip_delay_ms: default_skip_delay_ms(),
            autoplay_on_schedule: default_autoplay(),
        }
    }
}

impl NarratorConfig {
    pub fn skip_delay(&self) -> Duration {
        Duration::from_millis(self.skip_delay_ms)
    }

    /// Fill a missing API key from the adapter's environment variable.
    pub fn apply_env(&mut self) {
        if self.speech_api_key.is_some() {
            return;
        }
        let var = match self.speech_adapter.as_str() {
            "gemini" => "GEMINI_API_KEY",
            "openai" => "OPENAI_API_KEY",
            _ => return,
        };
        self.speech_api_key = std::env::var(var).ok().filter(|k| !k.is_empty());
    }
}

/// Read narrator_config.json from the data directory, with env overrides.
pub fn read_config() -> NarratorConfig {
    let mut config: NarratorConfig = read_json_file(&get_config_path()).unwrap_or_default();
    config.apply_env();
    config
}

/// Path to narrator_config.json.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("narrator_config.json")
}

/// Path to the persisted application state.
pub fn get_state_path() -> PathBuf {
    get_data_dir().join("app_state.json")
}

/// Generic helper: read a JSON file and deserialize it.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}
