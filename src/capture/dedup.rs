//! Duplicate and echo rejection for candidate utterances

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Outcome of screening an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    /// Blank after trimming
    Empty,
    /// Same as the last accepted utterance, within the duplicate window
    Duplicate,
    /// Overlaps the agent's own last line
    Echo,
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

/// Harakat, Quranic annotation marks and superscript alef
fn is_arabic_diacritic(c: char) -> bool {
    matches!(c, '\u{0610}'..='\u{061A}' | '\u{064B}'..='\u{065F}' | '\u{0670}' | '\u{06D6}'..='\u{06ED}')
}

fn fold_arabic(c: char) -> char {
    match c {
        'أ' | 'إ' | 'آ' | 'ٱ' => 'ا',
        'ة' => 'ه',
        'ى' => 'ي',
        other => other,
    }
}

/// Comparable form of an utterance: lower-cased, punctuation removed,
/// whitespace collapsed, Arabic diacritics stripped and letter variants folded
pub fn normalize_utterance(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    for c in text.chars() {
        if is_arabic_diacritic(c) || c == '\u{0640}' {
            continue;
        }
        let c = fold_arabic(c);
        if c.is_alphanumeric() {
            cleaned.extend(c.to_lowercase());
        } else {
            cleaned.push(' ');
        }
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct DedupGuard {
    window: Duration,
    min_echo_chars: usize,
    last_accepted: Option<(String, Instant)>,
    agent_line: String,
}

impl DedupGuard {
    pub fn new(window: Duration, min_echo_chars: usize) -> Self {
        Self {
            window,
            min_echo_chars,
            last_accepted: None,
            agent_line: String::new(),
        }
    }

    /// Remember the line the agent is about to speak
    pub fn note_agent_line(&mut self, line: &str) {
        self.agent_line = normalize_utterance(line);
    }

    /// Classify without recording anything
    pub fn screen(&self, text: &str, now: Instant) -> Verdict {
        if text.trim().is_empty() {
            return Verdict::Empty;
        }
        let normalized = normalize_utterance(text);
        if normalized.is_empty() {
            return Verdict::Empty;
        }

        if let Some((last, at)) = &self.last_accepted {
            if *last == normalized && now.saturating_duration_since(*at) <= self.window {
                return Verdict::Duplicate;
            }
        }

        let heard_part = normalized.chars().count() >= self.min_echo_chars
            && self.agent_line.contains(&normalized);
        let heard_all = self.agent_line.chars().count() >= self.min_echo_chars
            && normalized.contains(&self.agent_line);
        if !self.agent_line.is_empty() && (heard_part || heard_all) {
            return Verdict::Echo;
        }

        Verdict::Accepted
    }

    /// Screen and, if accepted, record as the last accepted utterance
    pub fn accept(&mut self, text: &str, now: Instant) -> bool {
        let verdict = self.screen(text, now);
        if verdict.is_accepted() {
            self.last_accepted = Some((normalize_utterance(text), now));
            true
        } else {
            debug!("Utterance rejected: {:?}", verdict);
            false
        }
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
        self.agent_line.clear();
    }
}
