//! Cloud speech adapters: Gemini TTS and OpenAI TTS.
//!
//! Both return raw 24kHz 16-bit mono PCM. Decoding to samples happens in
//! `audio::pcm`, not here.

use base64::{engine::general_purpose, Engine as _};
use tracing::{debug, info};

use super::{SpeechError, SpeechFuture, SpeechSource};

pub const GEMINI_DEFAULT_VOICE: &str = "Kore";
pub const OPENAI_DEFAULT_VOICE: &str = "alloy";

const GEMINI_MODEL: &str = "gemini-2.5-flash-preview-tts";

// ---------------------------------------------------------------------------
// Gemini TTS
// ---------------------------------------------------------------------------

/// Gemini TTS via REST `generateContent` with an AUDIO response modality.
///
/// The PCM arrives base64-encoded in
/// `candidates[0].content.parts[*].inlineData.data`.
pub struct GeminiSpeech {
    api_key: String,
    voice: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiSpeech {
    pub fn new(api_key: &str, voice: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            voice: voice.to_string(),
            model: GEMINI_MODEL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        serde_json::json!({
            "contents": [{ "parts": [{ "text": text }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": self.voice }
                    }
                }
            }
        })
    }
}

/// Pull the first inline audio part out of a `generateContent` response.
pub(crate) fn extract_inline_audio(response: &serde_json::Value) -> Result<Vec<u8>, SpeechError> {
    let parts = response
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| SpeechError::Malformed("missing candidates[0].content.parts".into()))?;

    let data = parts
        .iter()
        .find_map(|part| part.pointer("/inlineData/data").and_then(|d| d.as_str()))
        .ok_or(SpeechError::Empty)?;

    let bytes = general_purpose::STANDARD
        .decode(data)
        .map_err(|e| SpeechError::Malformed(format!("bad base64 audio: {}", e)))?;

    if bytes.is_empty() {
        return Err(SpeechError::Empty);
    }
    Ok(bytes)
}

impl SpeechSource for GeminiSpeech {
    fn generate(&self, text: &str) -> SpeechFuture<'_> {
        let text = text.to_string();
        Box::pin(async move {
            if text.trim().is_empty() {
                return Err(SpeechError::Empty);
            }

            info!(voice = %self.voice, text_len = text.len(), "Gemini TTS request");

            let url = format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                self.model
            );

            let resp = self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&self.request_body(&text))
                .send()
                .await
                .map_err(|e| SpeechError::Network(e.to_string()))?;

            if !resp.status().is_success() {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                return Err(SpeechError::Api { status, body });
            }

            let json: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| SpeechError::Malformed(e.to_string()))?;

            let bytes = extract_inline_audio(&json)?;
            debug!(bytes = bytes.len(), "Gemini TTS synthesis complete");
            Ok(bytes)
        })
    }

    fn name(&self) -> String {
        format!("Gemini TTS ({})", self.voice)
    }
}

// ---------------------------------------------------------------------------
// OpenAI TTS
// ---------------------------------------------------------------------------

/// OpenAI TTS via REST.
///
/// POST `https://api.openai.com/v1/audio/speech` with `response_format: "pcm"`,
/// which returns raw 24kHz 16-bit mono PCM.
pub struct OpenAiSpeech {
    api_key: String,
    voice: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiSpeech {
    pub fn new(api_key: &str, voice: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            voice: voice.to_string(),
            model: "tts-1".to_string(),
            client: reqwest::Client::new(),
        }
    }
}

impl SpeechSource for OpenAiSpeech {
    fn generate(&self, text: &str) -> SpeechFuture<'_> {
        let text = text.to_string();
        Box::pin(async move {
            if text.trim().is_empty() {
                return Err(SpeechError::Empty);
            }

            info!(voice = %self.voice, text_len = text.len(), "OpenAI TTS request");

            let body = serde_json::json!({
                "model": self.model,
                "input": text,
                "voice": self.voice,
                "response_format": "pcm",
            });

            let resp = self
                .client
                .post("https://api.openai.com/v1/audio/speech")
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| SpeechError::Network(e.to_string()))?;

            if !resp.status().is_success() {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                return Err(SpeechError::Api { status, body });
            }

            let bytes = resp
                .bytes()
                .await
                .map_err(|e| SpeechError::Network(e.to_string()))?;

            if bytes.is_empty() {
                return Err(SpeechError::Empty);
            }
            debug!(bytes = bytes.len(), "OpenAI TTS synthesis complete");
            Ok(bytes.to_vec())
        })
    }

    fn name(&self) -> String {
        format!("OpenAI TTS ({})", self.voice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_inline_audio() {
        let encoded = general_purpose::STANDARD.encode([1u8, 0, 2, 0]);
        let response = serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "ignored" },
                        { "inlineData": { "mimeType": "audio/L16;rate=24000", "data": encoded } }
                    ]
                }
            }]
        });
        assert_eq!(extract_inline_audio(&response).unwrap(), vec![1, 0, 2, 0]);
    }

    #[test]
    fn test_extract_without_audio_part() {
        let response = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "no audio" }] } }]
        });
        assert_eq!(extract_inline_audio(&response), Err(SpeechError::Empty));
    }

    #[test]
    fn test_extract_malformed() {
        let response = serde_json::json!({ "error": { "code": 429 } });
        assert!(matches!(
            extract_inline_audio(&response),
            Err(SpeechError::Malformed(_))
        ));

        let bad_base64 = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "inlineData": { "data": "!!!" } }] } }]
        });
        assert!(matches!(
            extract_inline_audio(&bad_base64),
            Err(SpeechError::Malformed(_))
        ));
    }

    #[test]
    fn test_gemini_request_body() {
        let source = GeminiSpeech::new("key", "Puck");
        let body = source.request_body("Hello");
        assert_eq!(body.pointer("/contents/0/parts/0/text").unwrap(), "Hello");
        assert_eq!(
            body.pointer("/generationConfig/speechConfig/voiceConfig/prebuiltVoiceConfig/voiceName")
                .unwrap(),
            "Puck"
        );
    }

    #[tokio::test]
    async fn test_blank_text_is_empty() {
        let source = OpenAiSpeech::new("key", OPENAI_DEFAULT_VOICE);
        assert_eq!(source.generate("   ").await, Err(SpeechError::Empty));
    }
}
