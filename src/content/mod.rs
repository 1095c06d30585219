//! Content gateway: questions, evaluations, transitions and summaries
//!
//! Four independent calls produce what the agent says and how answers are
//! scored. Each call passes a credit gate, is attempted exactly once, and
//! on any non-success outcome resolves to a deterministic local fallback so
//! the session always has a next line to speak.

pub mod fallback;
pub mod http;

pub use http::HttpContentService;

use crate::session::{
    CandidateProfile, EvaluationResult, ExperienceLevel, Language, Question, Summary, Turn,
};
use crate::{Result, VivaError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Session context sent with every content call
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentContext {
    pub candidate_name: String,
    pub target_role: String,
    pub experience_level: ExperienceLevel,
    pub language: Language,
    pub dialect: Option<String>,
}

impl From<&CandidateProfile> for ContentContext {
    fn from(profile: &CandidateProfile) -> Self {
        Self {
            candidate_name: profile.candidate_name.clone(),
            target_role: profile.target_role.clone(),
            experience_level: profile.experience_level,
            language: profile.language,
            dialect: profile.dialect.clone(),
        }
    }
}

/// The four content operations, used for credit accounting
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContentOp {
    Questions,
    Evaluation,
    Transition,
    Summary,
}

impl std::fmt::Display for ContentOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentOp::Questions => write!(f, "generate-questions"),
            ContentOp::Evaluation => write!(f, "evaluate-answer"),
            ContentOp::Transition => write!(f, "generate-transition"),
            ContentOp::Summary => write!(f, "generate-summary"),
        }
    }
}

/// Score and feedback for one answer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub score: u8,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
}

impl Evaluation {
    pub const FALLBACK_SCORE: u8 = 5;
    pub const MAX_SCORE: u8 = 10;

    /// Mid-score with no feedback, used whenever evaluation is unavailable
    pub fn fallback() -> Self {
        Self {
            score: Self::FALLBACK_SCORE,
            strengths: Vec::new(),
            improvements: Vec::new(),
        }
    }

    fn clamped(mut self) -> Self {
        self.score = self.score.min(Self::MAX_SCORE);
        self
    }
}

/// Remote producer of interview content
#[async_trait]
pub trait ContentService: Send + Sync {
    async fn generate_questions(
        &self,
        context: &ContentContext,
        count: usize,
    ) -> Result<Vec<Question>>;

    async fn evaluate_answer(
        &self,
        question: &Question,
        answer: &str,
        context: &ContentContext,
    ) -> Result<Evaluation>;

    async fn generate_transition(
        &self,
        conversation: &[Turn],
        current: &Question,
        next: &Question,
        context: &ContentContext,
    ) -> Result<String>;

    async fn generate_summary(
        &self,
        results: &[EvaluationResult],
        context: &ContentContext,
    ) -> Result<Summary>;
}

/// Service used when no content endpoint is configured; every call falls back
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineContentService;

#[async_trait]
impl ContentService for OfflineContentService {
    async fn generate_questions(&self, _: &ContentContext, _: usize) -> Result<Vec<Question>> {
        Err(VivaError::ContentError("offline".into()))
    }

    async fn evaluate_answer(&self, _: &Question, _: &str, _: &ContentContext) -> Result<Evaluation> {
        Err(VivaError::ContentError("offline".into()))
    }

    async fn generate_transition(
        &self,
        _: &[Turn],
        _: &Question,
        _: &Question,
        _: &ContentContext,
    ) -> Result<String> {
        Err(VivaError::ContentError("offline".into()))
    }

    async fn generate_summary(&self, _: &[EvaluationResult], _: &ContentContext) -> Result<Summary> {
        Err(VivaError::ContentError("offline".into()))
    }
}

/// Upstream credits/quota check; `false` short-circuits the call to its fallback
pub trait CreditGate: Send + Sync {
    fn try_consume(&self, op: ContentOp) -> bool;
}

/// No quota
#[derive(Debug, Default, Clone, Copy)]
pub struct Unmetered;

impl CreditGate for Unmetered {
    fn try_consume(&self, _op: ContentOp) -> bool {
        true
    }
}

/// Fixed number of credits, one per call
#[derive(Debug)]
pub struct CreditBudget {
    remaining: AtomicU32,
}

impl CreditBudget {
    pub fn new(credits: u32) -> Self {
        Self {
            remaining: AtomicU32::new(credits),
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::SeqCst)
    }
}

impl CreditGate for CreditBudget {
    fn try_consume(&self, _op: ContentOp) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Infallible front for a [`ContentService`]
pub struct ContentGateway {
    service: Arc<dyn ContentService>,
    credits: Arc<dyn CreditGate>,
    phrase_seed: u64,
}

impl ContentGateway {
    pub fn new(service: Arc<dyn ContentService>) -> Self {
        Self {
            service,
            credits: Arc::new(Unmetered),
            phrase_seed: rand::random(),
        }
    }

    /// Gateway whose every call uses the local fallback
    pub fn offline() -> Self {
        Self::new(Arc::new(OfflineContentService))
    }

    pub fn with_credits(mut self, credits: Arc<dyn CreditGate>) -> Self {
        self.credits = credits;
        self
    }

    /// Fix the seed for fallback phrase selection
    pub fn with_phrase_seed(mut self, seed: u64) -> Self {
        self.phrase_seed = seed;
        self
    }

    fn admit(&self, op: ContentOp) -> Result<()> {
        if self.credits.try_consume(op) {
            Ok(())
        } else {
            Err(VivaError::QuotaExhausted(format!("{} not admitted", op)))
        }
    }

    /// Question list for the session, never empty
    pub async fn generate_questions(&self, context: &ContentContext, count: usize) -> Vec<Question> {
        let outcome = match self.admit(ContentOp::Questions) {
            Ok(()) => self.service.generate_questions(context, count).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(questions) => {
                let questions: Vec<Question> = questions
                    .into_iter()
                    .filter(|q| !q.question.trim().is_empty())
                    .take(count)
                    .collect();
                if questions.is_empty() {
                    warn!("Question generation returned nothing, using local bank");
                    fallback::questions(context.language, count)
                } else {
                    debug!("Generated {} questions", questions.len());
                    questions
                }
            }
            Err(e) => {
                warn!("Question generation failed ({}), using local bank", e);
                fallback::questions(context.language, count)
            }
        }
    }

    /// Score for an answer; mid-score with empty feedback on failure
    pub async fn evaluate_answer(
        &self,
        question: &Question,
        answer: &str,
        context: &ContentContext,
    ) -> Evaluation {
        let outcome = match self.admit(ContentOp::Evaluation) {
            Ok(()) => self.service.evaluate_answer(question, answer, context).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(evaluation) => evaluation.clamped(),
            Err(e) => {
                warn!("Answer evaluation failed ({}), using default score", e);
                Evaluation::fallback()
            }
        }
    }

    /// Line that bridges to `next`; a canned phrase plus the question on failure
    pub async fn generate_transition(
        &self,
        conversation: &[Turn],
        current: &Question,
        next: &Question,
        position: usize,
        context: &ContentContext,
    ) -> String {
        let outcome = match self.admit(ContentOp::Transition) {
            Ok(()) => {
                self.service
                    .generate_transition(conversation, current, next, context)
                    .await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!("Transition generation returned blank text, using canned phrase");
                fallback::transition_line(context.language, position, self.phrase_seed, next)
            }
            Err(e) => {
                warn!("Transition generation failed ({}), using canned phrase", e);
                fallback::transition_line(context.language, position, self.phrase_seed, next)
            }
        }
    }

    /// Closing summary; `None` when unavailable
    pub async fn generate_summary(
        &self,
        results: &[EvaluationResult],
        context: &ContentContext,
    ) -> Option<Summary> {
        let outcome = match self.admit(ContentOp::Summary) {
            Ok(()) => self.service.generate_summary(results, context).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!("Summary generation failed ({}), no summary", e);
                None
            }
        }
    }
}
