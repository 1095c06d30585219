//! Configuration for the interviewer
//!
//! Every section has working defaults, so an empty TOML file (or no file at
//! all) runs an offline, text-only interview.

use crate::playback::VoiceSelection;
use crate::session::{CandidateProfile, Language};
use crate::{Result, VivaError};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Turn-taking tuning constants
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Silence after the last fragment that ends an utterance
    pub silence_timeout_ms: u64,
    /// Delay between the end of agent speech and reopening capture
    pub echo_grace_ms: u64,
    /// Delay before restarting capture that ended on its own
    pub capture_restart_ms: u64,
    /// Window in which an identical utterance counts as a duplicate
    pub duplicate_window_ms: u64,
    /// Shortest normalized utterance checked for echo
    pub echo_min_chars: usize,
    /// How long blocked audio waits for the user to enable it
    pub unlock_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            silence_timeout_ms: 2500,
            echo_grace_ms: 500,
            capture_restart_ms: 300,
            duplicate_window_ms: 3000,
            echo_min_chars: 8,
            unlock_timeout_ms: 15000,
        }
    }
}

impl TimingConfig {
    pub fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.silence_timeout_ms)
    }

    pub fn echo_grace(&self) -> Duration {
        Duration::from_millis(self.echo_grace_ms)
    }

    pub fn capture_restart(&self) -> Duration {
        Duration::from_millis(self.capture_restart_ms)
    }

    pub fn duplicate_window(&self) -> Duration {
        Duration::from_millis(self.duplicate_window_ms)
    }

    pub fn unlock_timeout(&self) -> Duration {
        Duration::from_millis(self.unlock_timeout_ms)
    }
}

/// Content service endpoint
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Base URL; `None` runs on local fallbacks only
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Seed for canned transition phrases; random when absent
    pub phrase_seed: Option<u64>,
    /// Content calls allowed over the interviewer's lifetime; unlimited when absent
    pub credits: Option<u32>,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_secs: 20,
            phrase_seed: None,
            credits: None,
        }
    }
}

/// Remote voice endpoint
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// OpenAI-compatible base URL; `None` disables the remote tier
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub voice_id: String,
    pub timeout_secs: u64,
    /// Start with output muted
    pub muted: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            model: "tts-1".to_string(),
            voice_id: "alloy".to_string(),
            timeout_secs: 30,
            muted: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct InterviewConfig {
    pub timing: TimingConfig,
    pub content: ContentConfig,
    pub voice: VoiceConfig,
    /// Profile used when the caller starts without one
    pub candidate: CandidateProfile,
    /// Capacity of the UI event channel
    pub event_buffer_size: usize,
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            content: ContentConfig::default(),
            voice: VoiceConfig::default(),
            candidate: CandidateProfile::default(),
            event_buffer_size: 100,
        }
    }
}

impl InterviewConfig {
    /// Load from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| VivaError::ConfigError(format!("{}: {}", path.display(), e)))?;
        let config: InterviewConfig = toml::from_str(&content)?;
        config.validate()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Override endpoints from `VIVA_*` environment variables
    pub fn apply_env(self) -> Self {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = var("VIVA_CONTENT_URL") {
            self.content.base_url = Some(url);
        }
        if let Some(key) = var("VIVA_CONTENT_API_KEY") {
            self.content.api_key = Some(key);
        }
        if let Some(url) = var("VIVA_VOICE_URL") {
            self.voice.base_url = Some(url);
        }
        if let Some(key) = var("VIVA_VOICE_API_KEY") {
            self.voice.api_key = Some(key);
        }
        self
    }

    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_candidate(mut self, candidate: CandidateProfile) -> Self {
        self.candidate = candidate;
        self
    }

    pub fn with_content_url(mut self, url: impl Into<String>) -> Self {
        self.content.base_url = Some(url.into());
        self
    }

    pub fn with_voice_url(mut self, url: impl Into<String>) -> Self {
        self.voice.base_url = Some(url.into());
        self
    }

    pub fn with_phrase_seed(mut self, seed: u64) -> Self {
        self.content.phrase_seed = Some(seed);
        self
    }

    pub fn muted(mut self) -> Self {
        self.voice.muted = true;
        self
    }

    /// Voice for lines spoken in `language`
    pub fn voice_for(&self, language: Language) -> VoiceSelection {
        VoiceSelection {
            voice_id: self.voice.voice_id.clone(),
            language,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.timing.silence_timeout_ms == 0 {
            return Err(VivaError::ConfigError(
                "timing.silence_timeout_ms must be positive".to_string(),
            ));
        }
        if self.event_buffer_size == 0 {
            return Err(VivaError::ConfigError(
                "event_buffer_size must be positive".to_string(),
            ));
        }
        for (name, url) in [
            ("content.base_url", &self.content.base_url),
            ("voice.base_url", &self.voice.base_url),
        ] {
            if let Some(url) = url {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(VivaError::ConfigError(format!(
                        "{} must be an http(s) URL, got {:?}",
                        name, url
                    )));
                }
            }
        }
        if self.voice.voice_id.trim().is_empty() {
            return Err(VivaError::ConfigError("voice.voice_id is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ExperienceLevel;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = InterviewConfig::default();
        assert_eq!(config.timing.silence_timeout(), Duration::from_millis(2500));
        assert_eq!(config.timing.echo_grace(), Duration::from_millis(500));
        assert_eq!(config.timing.echo_min_chars, 8);
        assert!(config.content.base_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[timing]
silence_timeout_ms = 1800

[content]
base_url = "https://interview.example.com/api"
phrase_seed = 42

[candidate]
candidate_name = "Omar"
target_role = "Accountant"
experience_level = "senior"
language = "ar"
"#
        )
        .unwrap();

        let config = InterviewConfig::load(file.path()).unwrap();
        assert_eq!(config.timing.silence_timeout_ms, 1800);
        assert_eq!(config.timing.echo_grace_ms, 500);
        assert_eq!(config.content.phrase_seed, Some(42));
        assert_eq!(config.candidate.candidate_name, "Omar");
        assert_eq!(config.candidate.experience_level, ExperienceLevel::Senior);
        assert_eq!(config.candidate.language, Language::Arabic);
        assert_eq!(config.candidate.question_count, 5);
    }

    #[test]
    fn test_load_rejects_bad_url() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[voice]\nbase_url = \"ftp://nope\"").unwrap();
        let err = InterviewConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, VivaError::ConfigError(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = InterviewConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, VivaError::ConfigError(_)));
    }

    #[test]
    fn test_env_overrides() {
        let config = InterviewConfig::default().apply_vars(|key| match key {
            "VIVA_CONTENT_URL" => Some("http://localhost:8080".to_string()),
            "VIVA_VOICE_API_KEY" => Some("secret".to_string()),
            _ => None,
        });
        assert_eq!(config.content.base_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.voice.api_key.as_deref(), Some("secret"));
        assert!(config.voice.base_url.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = InterviewConfig::default()
            .with_phrase_seed(7)
            .with_candidate(CandidateProfile::new("Ana", "Nurse"))
            .muted();
        assert_eq!(config.content.phrase_seed, Some(7));
        assert!(config.voice.muted);
        assert_eq!(config.voice_for(Language::Arabic).language, Language::Arabic);
    }
}
