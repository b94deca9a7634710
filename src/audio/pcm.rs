//! PCM16 decoding into normalized f32 buffers.

use std::time::Duration;

/// Sample rate of synthesized speech (24kHz mono).
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;

/// Normalized mono samples tagged with their sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBuffer {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl DecodedBuffer {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback length at the tagged sample rate.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Decode signed 16-bit little-endian mono PCM.
///
/// A trailing odd byte is dropped, so this never fails.
pub fn decode(bytes: &[u8], sample_rate: u32) -> DecodedBuffer {
    let samples = bytes
        .chunks_exact(2)
        .map(|chunk| {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            sample as f32 / 32768.0
        })
        .collect();

    DecodedBuffer {
        sample_rate,
        samples,
    }
}
