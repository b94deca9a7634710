//! Lesson narration engine.
//!
//! Sequences generated speech across the units of a lesson, supports
//! point-read of single units, and opens the player on a weekly schedule.

pub mod audio;
pub mod config;
pub mod error;
pub mod ipc;
pub mod lesson;
pub mod logging;
pub mod narration;
pub mod persistence;
pub mod schedule;
pub mod speech;

#[cfg(test)]
mod test_support;

pub use error::NarrationError;
pub use lesson::{Lesson, TextUnit};
pub use narration::{NarrationController, NarrationState, PlaybackSnapshot};
