//! Narration state machine types.

use serde::Serialize;

/// Which kind of playback a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Whole-lesson narration with auto-advance.
    AutoNarrate,
    /// A single unit, then back to idle.
    PointRead,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AutoNarrate => write!(f, "auto_narrate"),
            Self::PointRead => write!(f, "point_read"),
        }
    }
}

/// Controller states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum NarrationState {
    Idle,
    /// Waiting on the speech source (or on the skip delay after a failure).
    RequestingSpeech { index: usize, mode: Mode },
    /// Auto-narration is sounding unit `index`.
    Playing { index: usize },
    /// A point-read is sounding.
    PointReading { unit_id: String },
    /// The last attempt failed on the output device.
    Error,
}

impl NarrationState {
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle | Self::Error)
    }
}

impl std::fmt::Display for NarrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::RequestingSpeech { index, mode } => write!(f, "requesting({}, {})", index, mode),
            Self::Playing { index } => write!(f, "playing({})", index),
            Self::PointReading { unit_id } => write!(f, "point_reading({})", unit_id),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Transient status, the only user-visible failure surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Generating { index: usize },
    Playing { index: usize },
    Finished,
    Stopped,
    /// Auto-narration skipped a unit that produced no audio.
    GenerationFailed { index: usize, reason: String },
    PointReadFailed { reason: String },
    Device { reason: String },
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generating { index } => write!(f, "Generating audio for sentence {}...", index + 1),
            Self::Playing { index } => write!(f, "Playing sentence {}", index + 1),
            Self::Finished => write!(f, "finished"),
            Self::Stopped => write!(f, "stopped"),
            Self::GenerationFailed { index, reason } => {
                write!(f, "Sentence {} could not be generated, skipping ({})", index + 1, reason)
            }
            Self::PointReadFailed { reason } => write!(f, "Could not read this sentence ({})", reason),
            Self::Device { reason } => write!(f, "Audio unavailable ({})", reason),
        }
    }
}

/// Serializable view of the controller's public state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    #[serde(flatten)]
    pub state: NarrationState,
    pub current_index: usize,
    pub unit_count: usize,
    pub is_playing: bool,
    pub is_looping: bool,
    pub active_unit_id: Option<String>,
    pub status: Option<String>,
    pub finished: bool,
}
