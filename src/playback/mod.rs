//! Agent speech output with tiered fallback
//!
//! A line is spoken by the first tier that works:
//! 1. remote synthesis played through the audio sink
//! 2. the device's local speech engine
//! 3. nothing (the line stays text only)
//!
//! [`PlaybackChannel::speak`] never fails. Failures are reported as
//! [`PlaybackProgress`] so the caller can surface notices and track an
//! output device waiting for an unlock gesture.

pub mod http;
pub mod text;

pub use http::HttpVoiceSynthesizer;
pub use text::prepare_for_speech;

use crate::session::Language;
use crate::{Result, VivaError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Opaque id of audio loaded into a sink
pub type AssetHandle = u64;

/// Remote text-to-speech service
#[async_trait]
pub trait VoiceSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>>;
}

/// Device speech engine
#[async_trait]
pub trait LocalSpeech: Send + Sync {
    fn is_available(&self) -> bool;
    /// Resolves when the utterance finishes
    async fn speak(&self, text: &str, language: Language) -> Result<()>;
    fn cancel(&self);
}

/// Audio output device
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Silent probe that satisfies platform gesture requirements
    async fn unlock(&self) -> Result<()>;
    fn load(&self, bytes: Vec<u8>) -> Result<AssetHandle>;
    /// Resolves when playback completes. Fails with
    /// [`VivaError::AutoplayBlocked`] when a user gesture is required first.
    async fn play(&self, handle: AssetHandle) -> Result<()>;
    fn stop(&self);
    fn release(&self, handle: AssetHandle);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTier {
    Remote,
    Local,
    None,
}

/// Audio loaded into a sink, released exactly once
pub struct AudioAsset {
    pub source_tier: SourceTier,
    handle: Option<AssetHandle>,
    sink: Arc<dyn AudioSink>,
}

impl AudioAsset {
    fn load(sink: Arc<dyn AudioSink>, bytes: Vec<u8>) -> Result<Self> {
        let handle = sink.load(bytes)?;
        Ok(Self {
            source_tier: SourceTier::Remote,
            handle: Some(handle),
            sink,
        })
    }

    pub fn handle(&self) -> Option<AssetHandle> {
        self.handle
    }

    pub fn release(mut self) {
        self.release_handle();
    }

    fn release_handle(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.sink.release(handle);
        }
    }
}

impl Drop for AudioAsset {
    fn drop(&mut self) {
        self.release_handle();
    }
}

/// Voice and language for one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSelection {
    pub voice_id: String,
    pub language: Language,
}

impl Default for VoiceSelection {
    fn default() -> Self {
        Self {
            voice_id: "alloy".to_string(),
            language: Language::English,
        }
    }
}

/// Side-channel reports from a `speak` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackProgress {
    /// The remote tier failed; falling back to the device voice
    RemoteUnavailable(String),
    /// Output is blocked until the user retries
    AwaitingUnlock,
    /// The user's retry unblocked output
    Unlocked,
    /// No tier produced audio
    Silent,
}

pub struct PlaybackChannel {
    remote: Option<Arc<dyn VoiceSynthesizer>>,
    local: Option<Arc<dyn LocalSpeech>>,
    sink: Option<Arc<dyn AudioSink>>,
    unlock_retry: Notify,
    primed: AtomicBool,
    unlock_timeout: Duration,
}

impl PlaybackChannel {
    pub fn new(
        remote: Option<Arc<dyn VoiceSynthesizer>>,
        local: Option<Arc<dyn LocalSpeech>>,
        sink: Option<Arc<dyn AudioSink>>,
        unlock_timeout: Duration,
    ) -> Self {
        Self {
            remote,
            local,
            sink,
            unlock_retry: Notify::new(),
            primed: AtomicBool::new(false),
            unlock_timeout,
        }
    }

    /// Channel with no tiers; every line is silent
    pub fn silent() -> Self {
        Self::new(None, None, None, Duration::ZERO)
    }

    /// One-time unlock probe, run from the user's start action
    pub async fn prime(&self) {
        if self.primed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(sink) = &self.sink {
            match sink.unlock().await {
                Ok(()) => debug!("Audio output unlocked"),
                Err(e) => debug!("Unlock probe failed: {}", e),
            }
        }
    }

    /// Speak `text`, resolving when audio ends or every tier has failed
    pub async fn speak(
        &self,
        text: &str,
        voice: &VoiceSelection,
        report: &(dyn Fn(PlaybackProgress) + Send + Sync),
    ) -> SourceTier {
        let text = prepare_for_speech(text, voice.language);
        if text.is_empty() {
            report(PlaybackProgress::Silent);
            return SourceTier::None;
        }

        if let (Some(remote), Some(sink)) = (&self.remote, &self.sink) {
            match self.play_remote(remote.as_ref(), sink, &text, voice, report).await {
                Ok(()) => return SourceTier::Remote,
                Err(e) => {
                    warn!("Remote voice failed: {}", e);
                    report(PlaybackProgress::RemoteUnavailable(e.to_string()));
                }
            }
        }

        if let Some(local) = self.local.as_ref().filter(|local| local.is_available()) {
            match local.speak(&text, voice.language).await {
                Ok(()) => return SourceTier::Local,
                Err(e) => warn!("Device voice failed: {}", e),
            }
        }

        info!("No voice available, line stays text only");
        report(PlaybackProgress::Silent);
        SourceTier::None
    }

    async fn play_remote(
        &self,
        remote: &dyn VoiceSynthesizer,
        sink: &Arc<dyn AudioSink>,
        text: &str,
        voice: &VoiceSelection,
        report: &(dyn Fn(PlaybackProgress) + Send + Sync),
    ) -> Result<()> {
        let bytes = remote.synthesize(text, &voice.voice_id).await?;
        if bytes.is_empty() {
            return Err(VivaError::SynthesisError("empty audio".into()));
        }

        let asset = AudioAsset::load(sink.clone(), bytes)?;
        let handle = asset.handle().ok_or_else(|| VivaError::PlaybackError("asset released".into()))?;

        match sink.play(handle).await {
            Ok(()) => {
                asset.release();
                Ok(())
            }
            Err(VivaError::AutoplayBlocked(reason)) => {
                info!("Playback blocked ({}), waiting for the user", reason);
                // Retries reach only registered waiters; register before reporting
                let retry = self.unlock_retry.notified();
                report(PlaybackProgress::AwaitingUnlock);

                if tokio::time::timeout(self.unlock_timeout, retry)
                    .await
                    .is_err()
                {
                    return Err(VivaError::AutoplayBlocked("no retry before timeout".into()));
                }

                sink.unlock().await?;
                report(PlaybackProgress::Unlocked);
                let played = sink.play(handle).await;
                asset.release();
                played
            }
            Err(e) => Err(e),
        }
    }

    /// A device voice is there to fall back on
    pub fn has_local_voice(&self) -> bool {
        self.local.as_ref().is_some_and(|local| local.is_available())
    }

    /// User gesture to unblock output. Only a playback already waiting
    /// for it is released; an early or late retry is not remembered.
    pub fn retry_unlock(&self) {
        self.unlock_retry.notify_waiters();
    }

    /// Stop all output immediately
    pub fn halt(&self) {
        if let Some(sink) = &self.sink {
            sink.stop();
        }
        if let Some(local) = &self.local {
            local.cancel();
        }
    }
}
