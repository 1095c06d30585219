//! OpenAI-compatible speech synthesis endpoint

use super::VoiceSynthesizer;
use crate::{Result, VivaError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Remote voice at `{base_url}/audio/speech`
#[derive(Debug, Clone)]
pub struct HttpVoiceSynthesizer {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1)
    pub base_url: String,
    pub api_key: Option<String>,
    /// TTS model, e.g. tts-1
    pub model: String,
    client: reqwest::Client,
}

impl HttpVoiceSynthesizer {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VivaError::ConfigError(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            client,
        })
    }
}

#[async_trait]
impl VoiceSynthesizer for HttpVoiceSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/audio/speech", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": voice_id,
        });
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request
            .send()
            .await
            .map_err(|e| VivaError::SynthesisError(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VivaError::SynthesisError(format!("TTS API error {}: {}", status, body)));
        }
        let bytes = res
            .bytes()
            .await
            .map_err(|e| VivaError::SynthesisError(e.to_string()))?;
        debug!("Synthesized {} bytes for {} chars", bytes.len(), text.len());
        Ok(bytes.to_vec())
    }
}
