//! Engine error types.
//!
//! Device problems are fatal for the current attempt only. Speech failures
//! live in [`crate::speech::SpeechError`] and are treated as routine.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NarrationError {
    /// No output device could be opened.
    #[error("audio output unavailable: {0}")]
    DeviceUnavailable(String),
    /// The device is suspended and refused to resume.
    #[error("audio output suspended: {0}")]
    DeviceSuspended(String),
    /// A handle from an earlier acquire/release cycle was used.
    #[error("audio output handle is no longer valid")]
    StaleHandle,
    /// The backend failed to start a buffer.
    #[error("audio playback failed: {0}")]
    Playback(String),
}

pub type Result<T, E = NarrationError> = std::result::Result<T, E>;
