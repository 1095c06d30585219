//! Speech capture channel
//!
//! Wraps a speech-to-text engine behind [`SpeechRecognizer`]. The engine
//! reports fragments and lifecycle events on a channel; this module owns
//! start/stop/restart bookkeeping and the permanent switch to typed input
//! when the microphone cannot be used.

pub mod dedup;
pub mod endpointing;

pub use dedup::{normalize_utterance, DedupGuard, Verdict};
pub use endpointing::PendingUtterance;

use crate::{Result, VivaError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// Transcript fragment from the recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    pub is_final: bool,
}

impl Fragment {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn finalized(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Why recognition stopped with an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureFailure {
    NoSpeech,
    Aborted,
    PermissionDenied,
    DeviceUnavailable,
    Network(String),
}

impl CaptureFailure {
    /// Expected interruptions, swallowed silently
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CaptureFailure::NoSpeech | CaptureFailure::Aborted)
    }

    /// The microphone is unusable for the rest of the session
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CaptureFailure::PermissionDenied | CaptureFailure::DeviceUnavailable
        )
    }
}

impl From<&VivaError> for CaptureFailure {
    fn from(e: &VivaError) -> Self {
        match e {
            VivaError::PermissionDenied(_) => CaptureFailure::PermissionDenied,
            VivaError::AudioDeviceError(_) => CaptureFailure::DeviceUnavailable,
            other => CaptureFailure::Network(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Fragment(Fragment),
    /// Recognition stopped (engine timeout, explicit stop, or after an error)
    Ended,
    Failed(CaptureFailure),
}

/// Speech-to-text engine
///
/// `start` begins a recognition run that reports on `events` until `stop`
/// is called or the engine ends on its own.
pub trait SpeechRecognizer: Send {
    fn start(&mut self, events: UnboundedSender<CaptureEvent>) -> Result<()>;
    fn stop(&mut self);
}

/// Capture lifecycle around an optional recognizer
pub struct CaptureChannel {
    recognizer: Option<Box<dyn SpeechRecognizer>>,
    events: UnboundedSender<CaptureEvent>,
    active: bool,
    suppress_resume: bool,
    text_mode: bool,
}

impl CaptureChannel {
    /// Without a recognizer the channel is in text mode from the outset
    pub fn new(recognizer: Option<Box<dyn SpeechRecognizer>>) -> (Self, UnboundedReceiver<CaptureEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let text_mode = recognizer.is_none();
        (
            Self {
                recognizer,
                events,
                active: false,
                suppress_resume: false,
                text_mode,
            },
            rx,
        )
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_text_mode(&self) -> bool {
        self.text_mode
    }

    /// Begin recognition. Fails with the recognizer's error; a fatal error
    /// should be followed by [`enter_text_mode`](Self::enter_text_mode).
    pub fn start(&mut self) -> Result<()> {
        if self.text_mode || self.active {
            return Ok(());
        }
        let Some(recognizer) = self.recognizer.as_mut() else {
            return Ok(());
        };

        recognizer.start(self.events.clone())?;
        self.active = true;
        self.suppress_resume = false;
        debug!("Capture started");
        Ok(())
    }

    /// Stop recognition. With `suppress_resume` the following `Ended`
    /// event does not trigger a restart.
    pub fn stop(&mut self, suppress_resume: bool) {
        self.suppress_resume = suppress_resume;
        if !self.active {
            return;
        }
        if let Some(recognizer) = self.recognizer.as_mut() {
            recognizer.stop();
        }
        self.active = false;
        debug!("Capture stopped (suppress_resume={})", suppress_resume);
    }

    /// Recognition ended. Returns `true` if the caller should restart it.
    pub fn on_ended(&mut self) -> bool {
        let was_active = self.active;
        self.active = false;
        let restart = was_active && !self.suppress_resume && !self.text_mode;
        if restart {
            debug!("Capture ended unexpectedly, restart wanted");
        }
        restart
    }

    /// New session: the microphone may be tried again
    pub fn reset(&mut self) {
        self.stop(true);
        self.text_mode = self.recognizer.is_none();
    }

    /// Switch permanently to typed input. Returns `true` only the first time,
    /// which is when the user should be told.
    pub fn enter_text_mode(&mut self) -> bool {
        self.stop(true);
        if self.text_mode {
            return false;
        }
        self.text_mode = true;
        if self.recognizer.is_some() {
            warn!("Microphone unavailable, switching to text input");
            true
        } else {
            info!("No recognizer, text input only");
            false
        }
    }
}
