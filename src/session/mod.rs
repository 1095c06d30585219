//! Interview session data model
//!
//! The session is the single record of one interview: its phase, the
//! candidate profile, the question list and cursor, the transcript and the
//! per-question evaluation results. It is mutated only by the
//! [`SessionMachine`](machine::SessionMachine); everything else reads it
//! through [`SharedSession`].

pub mod machine;
pub mod script;

pub use machine::{ReviewOutcome, ReviewRequest, SessionMachine, Step};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Interview phase
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for the user to start
    #[default]
    Setup,
    /// Preparing the question list
    Connecting,
    /// Agent greeted the candidate, waiting for the first reply
    Greeting,
    /// Warm-up exchange before the first question
    Warmup,
    /// Question loop
    Interview,
    /// Questions exhausted, waiting for the candidate's last words
    Closing,
    /// Terminal until a new session starts
    Ended,
}

impl Phase {
    /// Phases in which the candidate is expected to talk
    pub fn is_interactive(&self) -> bool {
        matches!(
            self,
            Phase::Greeting | Phase::Warmup | Phase::Interview | Phase::Closing
        )
    }

    /// Phases from which a new session may be started
    pub fn can_start(&self) -> bool {
        matches!(self, Phase::Setup | Phase::Ended)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Setup => write!(f, "Setup"),
            Phase::Connecting => write!(f, "Connecting"),
            Phase::Greeting => write!(f, "Greeting"),
            Phase::Warmup => write!(f, "Warmup"),
            Phase::Interview => write!(f, "Interview"),
            Phase::Closing => write!(f, "Closing"),
            Phase::Ended => write!(f, "Ended"),
        }
    }
}

/// Interview language
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "ar")]
    Arabic,
}

impl Language {
    /// BCP-47 style language code
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Arabic => "ar",
        }
    }
}

/// Seniority the candidate is interviewing for
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Entry,
    #[default]
    Mid,
    Senior,
}

impl ExperienceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperienceLevel::Entry => "entry",
            ExperienceLevel::Mid => "mid",
            ExperienceLevel::Senior => "senior",
        }
    }
}

/// Who the interview is for and how it should be run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateProfile {
    pub candidate_name: String,
    pub target_role: String,
    pub experience_level: ExperienceLevel,
    pub language: Language,
    /// Regional dialect hint for content generation (e.g. "gulf")
    pub dialect: Option<String>,
    /// Number of questions to request
    pub question_count: usize,
}

impl Default for CandidateProfile {
    fn default() -> Self {
        Self {
            candidate_name: "Candidate".to_string(),
            target_role: "Software Engineer".to_string(),
            experience_level: ExperienceLevel::Mid,
            language: Language::English,
            dialect: None,
            question_count: 5,
        }
    }
}

impl CandidateProfile {
    pub fn new(candidate_name: impl Into<String>, target_role: impl Into<String>) -> Self {
        Self {
            candidate_name: candidate_name.into(),
            target_role: target_role.into(),
            ..Default::default()
        }
    }

    pub fn with_level(mut self, level: ExperienceLevel) -> Self {
        self.experience_level = level;
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_dialect(mut self, dialect: impl Into<String>) -> Self {
        self.dialect = Some(dialect.into());
        self
    }

    pub fn with_question_count(mut self, count: usize) -> Self {
        self.question_count = count;
        self
    }
}

/// One interview question
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub question: String,
    #[serde(default)]
    pub category: String,
}

impl Question {
    pub fn new(question: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            category: category.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Agent,
    Candidate,
}

/// One atomic contribution to the transcript
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            speaker,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self::new(Speaker::Agent, text)
    }

    pub fn candidate(text: impl Into<String>) -> Self {
        Self::new(Speaker::Candidate, text)
    }
}

/// Feedback on one answered question, appended once and never mutated
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub question: String,
    pub answer: String,
    /// 0-10
    pub score: u8,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
}

/// Closing assessment of the whole interview
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub summary: String,
    pub top_strength: String,
    pub top_improvement: String,
}

/// The full interview record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub phase: Phase,
    pub profile: CandidateProfile,
    pub questions: Vec<Question>,
    pub cursor: usize,
    pub transcript: Vec<Turn>,
    pub results: Vec<EvaluationResult>,
    pub summary: Option<Summary>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(CandidateProfile::default())
    }
}

impl Session {
    pub fn new(profile: CandidateProfile) -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: Phase::Setup,
            profile,
            questions: Vec::new(),
            cursor: 0,
            transcript: Vec::new(),
            results: Vec::new(),
            summary: None,
        }
    }

    /// Question under the cursor, if any remain
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.cursor)
    }

    /// Most recent agent line
    pub fn last_agent_line(&self) -> Option<&str> {
        self.transcript
            .iter()
            .rev()
            .find(|turn| turn.speaker == Speaker::Agent)
            .map(|turn| turn.text.as_str())
    }

    /// Average score over evaluated questions
    pub fn average_score(&self) -> Option<f32> {
        if self.results.is_empty() {
            return None;
        }
        let total: u32 = self.results.iter().map(|r| r.score as u32).sum();
        Some(total as f32 / self.results.len() as f32)
    }
}

/// Thread-safe shared session
///
/// Wraps [`Session`] in `Arc<RwLock<>>`; the session machine writes, the UI
/// and tests read.
#[derive(Clone, Default)]
pub struct SharedSession {
    inner: Arc<RwLock<Session>>,
}

impl SharedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, Session> {
        self.inner.read()
    }

    pub(crate) fn write(&self) -> parking_lot::RwLockWriteGuard<'_, Session> {
        self.inner.write()
    }

    /// Get a copy of the current session (no lock held after return)
    pub fn snapshot(&self) -> Session {
        self.inner.read().clone()
    }

    pub fn phase(&self) -> Phase {
        self.inner.read().phase
    }

    pub fn cursor(&self) -> usize {
        self.inner.read().cursor
    }

    pub fn questions(&self) -> Vec<Question> {
        self.inner.read().questions.clone()
    }

    pub fn transcript(&self) -> Vec<Turn> {
        self.inner.read().transcript.clone()
    }

    pub fn results(&self) -> Vec<EvaluationResult> {
        self.inner.read().results.clone()
    }

    pub fn summary(&self) -> Option<Summary> {
        self.inner.read().summary.clone()
    }

    pub fn profile(&self) -> CandidateProfile {
        self.inner.read().profile.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interactive_phases() {
        assert!(!Phase::Setup.is_interactive());
        assert!(!Phase::Connecting.is_interactive());
        assert!(Phase::Greeting.is_interactive());
        assert!(Phase::Warmup.is_interactive());
        assert!(Phase::Interview.is_interactive());
        assert!(Phase::Closing.is_interactive());
        assert!(!Phase::Ended.is_interactive());
    }

    #[test]
    fn test_can_start_only_from_setup_or_ended() {
        assert!(Phase::Setup.can_start());
        assert!(Phase::Ended.can_start());
        assert!(!Phase::Interview.can_start());
    }

    #[test]
    fn test_last_agent_line_skips_candidate_turns() {
        let mut session = Session::default();
        session.transcript.push(Turn::agent("Hello there"));
        session.transcript.push(Turn::candidate("Hi"));
        assert_eq!(session.last_agent_line(), Some("Hello there"));
    }

    #[test]
    fn test_average_score() {
        let mut session = Session::default();
        assert!(session.average_score().is_none());
        for score in [4, 8] {
            session.results.push(EvaluationResult {
                question: "q".into(),
                answer: "a".into(),
                score,
                strengths: vec![],
                improvements: vec![],
            });
        }
        assert_eq!(session.average_score(), Some(6.0));
    }

    #[test]
    fn test_language_serde_codes() {
        let json = serde_json::to_string(&Language::Arabic).unwrap();
        assert_eq!(json, "\"ar\"");
        let parsed: Language = serde_json::from_str("\"en\"").unwrap();
        assert_eq!(parsed, Language::English);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let shared = SharedSession::new();
        let before = shared.snapshot();
        shared.write().phase = Phase::Greeting;
        assert_eq!(before.phase, Phase::Setup);
        assert_eq!(shared.phase(), Phase::Greeting);
    }
}
