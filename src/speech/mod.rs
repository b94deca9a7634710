//! Speech generation boundary.
//!
//! A `SpeechSource` turns text into raw PCM16 little-endian mono bytes at
//! 24kHz. Failures come back as values; callers treat them as routine.
//!
//! Adapters:
//! - Gemini TTS (base64 PCM inside a JSON response)
//! - OpenAI TTS (raw PCM response body)

pub mod cloud;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

pub use cloud::{GeminiSpeech, OpenAiSpeech};

/// Boxed future returned by [`SpeechSource::generate`].
pub type SpeechFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>, SpeechError>> + Send + 'a>>;

/// Common trait for speech generators (dyn-compatible).
pub trait SpeechSource: Send + Sync {
    /// Generate PCM16 LE mono audio for `text`.
    fn generate(&self, text: &str) -> SpeechFuture<'_>;

    /// Display name (e.g. "Gemini TTS (Kore)").
    fn name(&self) -> String;
}

/// Why a generation produced no audio.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpeechError {
    #[error("speech request failed: {0}")]
    Network(String),
    #[error("speech API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed speech response: {0}")]
    Malformed(String),
    #[error("speech response contained no audio")]
    Empty,
}

/// Create a speech source from config values.
///
/// `adapter` is one of: "gemini", "openai".
pub fn create_speech_source(
    adapter: &str,
    api_key: Option<&str>,
    voice: Option<&str>,
) -> anyhow::Result<Arc<dyn SpeechSource>> {
    match adapter {
        "gemini" => {
            let key = api_key.ok_or_else(|| anyhow::anyhow!("Gemini TTS requires an API key"))?;
            let v = voice.unwrap_or(cloud::GEMINI_DEFAULT_VOICE);
            Ok(Arc::new(GeminiSpeech::new(key, v)))
        }
        "openai" => {
            let key = api_key.ok_or_else(|| anyhow::anyhow!("OpenAI TTS requires an API key"))?;
            let v = voice.unwrap_or(cloud::OPENAI_DEFAULT_VOICE);
            Ok(Arc::new(OpenAiSpeech::new(key, v)))
        }
        other => anyhow::bail!("Unknown speech adapter: {}", other),
    }
}
