pub mod capture;
pub mod content;
pub mod integration;
pub mod playback;
pub mod session;
pub mod turn;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum VivaError {
    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("Capture error: {0}")]
    CaptureError(String),

    #[error("Speech synthesis error: {0}")]
    SynthesisError(String),

    #[error("Playback error: {0}")]
    PlaybackError(String),

    #[error("Autoplay blocked: {0}")]
    AutoplayBlocked(String),

    #[error("Content service error: {0}")]
    ContentError(String),

    #[error("Quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("IO error: {0}")]
    IOError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl From<std::io::Error> for VivaError {
    fn from(e: std::io::Error) -> Self {
        VivaError::IOError(e.to_string())
    }
}

impl From<reqwest::Error> for VivaError {
    fn from(e: reqwest::Error) -> Self {
        VivaError::ContentError(e.to_string())
    }
}

impl From<serde_json::Error> for VivaError {
    fn from(e: serde_json::Error) -> Self {
        VivaError::ContentError(format!("Malformed response: {}", e))
    }
}

impl From<toml::de::Error> for VivaError {
    fn from(e: toml::de::Error) -> Self {
        VivaError::ConfigError(e.to_string())
    }
}

impl VivaError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Hardware/device errors and denied permissions persist for the session
            VivaError::AudioDeviceError(_) => false,
            VivaError::PermissionDenied(_) => false,
            // These are typically transient errors
            VivaError::CaptureError(_) => true,
            VivaError::SynthesisError(_) => true,
            VivaError::PlaybackError(_) => true,
            // Cleared by a user gesture
            VivaError::AutoplayBlocked(_) => true,
            VivaError::ContentError(_) => true,
            VivaError::QuotaExhausted(_) => false,
            VivaError::IOError(_) => false,
            VivaError::ConfigError(_) => false,
            VivaError::ChannelError(_) => false,
        }
    }

    /// Check if this error means the microphone can never be used this session
    pub fn is_capture_fatal(&self) -> bool {
        matches!(
            self,
            VivaError::PermissionDenied(_) | VivaError::AudioDeviceError(_)
        )
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            VivaError::AudioDeviceError(_) => {
                "Audio device error. Please check your microphone/speakers.".to_string()
            }
            VivaError::PermissionDenied(_) => {
                "Microphone unavailable. Please type your answers instead.".to_string()
            }
            VivaError::CaptureError(_) => {
                "Speech recognition hiccup. Keep talking or type your answer.".to_string()
            }
            VivaError::SynthesisError(_) => {
                "AI voice unavailable. Using the device voice instead.".to_string()
            }
            VivaError::PlaybackError(_) => {
                "Audio playback failed. The interview continues as text.".to_string()
            }
            VivaError::AutoplayBlocked(_) => {
                "Audio is blocked by the browser. Tap to enable audio.".to_string()
            }
            VivaError::ContentError(_) => {
                "Interview service unavailable. Using built-in questions.".to_string()
            }
            VivaError::QuotaExhausted(_) => {
                "No credits left. Using built-in questions and feedback.".to_string()
            }
            VivaError::IOError(_) => "File system error occurred.".to_string(),
            VivaError::ConfigError(_) => {
                "Configuration error. Please check settings.".to_string()
            }
            VivaError::ChannelError(_) => {
                "Internal communication error. Please restart the interview.".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, VivaError>;
