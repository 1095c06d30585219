//! Non-blocking user notices, each shown at most once per session

use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Notice {
    /// Capture denied or device missing; answers are typed from now on
    MicrophoneUnavailable,
    /// Remote voice failed, the device voice is used instead
    DeviceVoiceFallback,
    /// Output needs a user gesture
    AudioBlocked,
    /// No voice at all; lines are text only
    AudioUnavailable,
}

impl Notice {
    pub fn message(&self) -> &'static str {
        match self {
            Notice::MicrophoneUnavailable => "Microphone unavailable, please type your answers.",
            Notice::DeviceVoiceFallback => "AI voice unavailable, using device voice.",
            Notice::AudioBlocked => "Audio is blocked. Tap \"Enable audio\" to hear the interviewer.",
            Notice::AudioUnavailable => "Audio unavailable, follow the interview as text.",
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

#[derive(Debug, Default)]
pub struct NoticeBoard {
    shown: HashSet<Notice>,
}

impl NoticeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the notice should be shown now
    pub fn post(&mut self, notice: Notice) -> bool {
        self.shown.insert(notice)
    }

    pub fn reset(&mut self) {
        self.shown.clear();
    }
}
