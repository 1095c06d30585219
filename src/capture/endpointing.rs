//! Silence-based end-of-utterance detection

use super::Fragment;
use std::time::Duration;
use tokio::time::Instant;

/// Fragments accumulated since the last finalized utterance
#[derive(Debug, Clone)]
pub struct PendingUtterance {
    pub finalized_text: String,
    pub interim_text: String,
    pub last_fragment_at: Option<Instant>,
    silence_timeout: Duration,
}

impl PendingUtterance {
    pub fn new(silence_timeout: Duration) -> Self {
        Self {
            finalized_text: String::new(),
            interim_text: String::new(),
            last_fragment_at: None,
            silence_timeout,
        }
    }

    /// Add a fragment and push the silence deadline out
    pub fn push(&mut self, fragment: Fragment, now: Instant) {
        let text = fragment.text.trim();
        if fragment.is_final {
            if !text.is_empty() {
                if !self.finalized_text.is_empty() {
                    self.finalized_text.push(' ');
                }
                self.finalized_text.push_str(text);
            }
            self.interim_text.clear();
        } else {
            self.interim_text = text.to_string();
        }
        self.last_fragment_at = Some(now);
    }

    /// When the utterance will be considered complete
    pub fn deadline(&self) -> Option<Instant> {
        self.last_fragment_at.map(|at| at + self.silence_timeout)
    }

    /// Everything heard so far, for display
    pub fn preview(&self) -> String {
        match (self.finalized_text.is_empty(), self.interim_text.is_empty()) {
            (_, true) => self.finalized_text.clone(),
            (true, false) => self.interim_text.clone(),
            (false, false) => format!("{} {}", self.finalized_text, self.interim_text),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.finalized_text.is_empty() && self.interim_text.is_empty()
    }

    /// Emit the utterance if silence has lasted long enough. Clears state
    /// whenever the deadline has passed, even if nothing is emitted.
    pub fn take_if_due(&mut self, now: Instant) -> Option<String> {
        match self.deadline() {
            Some(deadline) if now >= deadline => {}
            _ => return None,
        }
        let text = self.preview();
        self.clear();
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }

    pub fn clear(&mut self) {
        self.finalized_text.clear();
        self.interim_text.clear();
        self.last_fragment_at = None;
    }
}
