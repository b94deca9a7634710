//! PCM decoding, the output device and its rodio backend.

pub mod output;
pub mod pcm;
pub mod playback;

pub use output::{AudioBackend, AudioOutputDevice, CompletionSlot, DeviceHandle, PlaybackHandle, PlaybackId};
pub use pcm::{decode, DecodedBuffer, SPEECH_SAMPLE_RATE};
pub use playback::{list_output_devices, RodioBackend};
