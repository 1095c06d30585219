//! Interview phase machine
//!
//! Decides what the agent says next. It never talks to devices or services:
//! the caller feeds it questions, candidate utterances and review outcomes,
//! and it answers with the next line. Every line it hands out and every
//! utterance it consumes is appended to the transcript.

use super::{script, CandidateProfile, EvaluationResult, Phase, Question, Session, SharedSession, Summary, Turn};
use crate::content::{ContentContext, Evaluation};
use tracing::{debug, info};

/// What the caller should do after a candidate utterance
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Speak this line and hand the floor back
    Speak(String),
    /// Evaluate the answer and fetch a transition, then call [`SessionMachine::review_ready`]
    Review(ReviewRequest),
    /// Speak the farewell; the session has ended
    Conclude { farewell: String },
    /// Utterance not expected right now
    Ignored,
}

/// Content work needed before the next question can be asked
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRequest {
    pub question: Question,
    pub answer: String,
    /// `None` when this was the last question
    pub next: Option<Question>,
    /// Index of the answered question
    pub position: usize,
    pub conversation: Vec<Turn>,
    pub context: ContentContext,
}

/// Completed review: the evaluation plus the transition line when a next question exists
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewOutcome {
    pub question: Question,
    pub answer: String,
    pub evaluation: Evaluation,
    pub transition: Option<String>,
}

pub struct SessionMachine {
    session: SharedSession,
    reviewing: bool,
}

impl SessionMachine {
    pub fn new(session: SharedSession) -> Self {
        Self {
            session,
            reviewing: false,
        }
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    /// A review is outstanding; candidate input is not accepted until it lands
    pub fn is_reviewing(&self) -> bool {
        self.reviewing
    }

    /// Begin a fresh session. Returns the context for question generation,
    /// or `None` if a session is already running.
    pub fn start(&mut self, profile: CandidateProfile) -> Option<ContentContext> {
        let mut session = self.session.write();
        if !session.phase.can_start() {
            debug!("Start ignored in phase {}", session.phase);
            return None;
        }

        let context = ContentContext::from(&profile);
        *session = Session::new(profile);
        session.phase = Phase::Connecting;
        self.reviewing = false;
        info!("Session {} connecting", session.id);
        Some(context)
    }

    /// Install the question list and move to the greeting. Returns the greeting line.
    pub fn questions_ready(&mut self, questions: Vec<Question>) -> Option<String> {
        let mut session = self.session.write();
        if session.phase != Phase::Connecting {
            debug!("Questions arrived in phase {}, dropping", session.phase);
            return None;
        }

        info!("{} questions ready", questions.len());
        session.questions = questions;
        session.cursor = 0;
        session.phase = Phase::Greeting;

        let line = script::greeting(&session.profile);
        session.transcript.push(Turn::agent(line.clone()));
        Some(line)
    }

    /// Consume one accepted candidate utterance
    pub fn candidate_spoke(&mut self, text: &str) -> Step {
        let mut session = self.session.write();
        if self.reviewing || !session.phase.is_interactive() {
            debug!("Utterance ignored in phase {}", session.phase);
            return Step::Ignored;
        }

        session.transcript.push(Turn::candidate(text));

        match session.phase {
            Phase::Greeting => {
                session.phase = Phase::Warmup;
                let line = script::warmup(&session.profile);
                session.transcript.push(Turn::agent(line.clone()));
                Step::Speak(line)
            }
            Phase::Warmup => {
                let first = session.questions.first().map(|q| q.question.clone());
                let line = match first {
                    Some(first) => {
                        session.phase = Phase::Interview;
                        script::first_question(session.profile.language, &first)
                    }
                    None => {
                        session.phase = Phase::Closing;
                        script::closing(session.profile.language)
                    }
                };
                session.transcript.push(Turn::agent(line.clone()));
                Step::Speak(line)
            }
            Phase::Interview => {
                let Some(question) = session.current_question().cloned() else {
                    session.phase = Phase::Closing;
                    let line = script::closing(session.profile.language);
                    session.transcript.push(Turn::agent(line.clone()));
                    return Step::Speak(line);
                };
                self.reviewing = true;
                Step::Review(ReviewRequest {
                    question,
                    answer: text.to_string(),
                    next: session.questions.get(session.cursor + 1).cloned(),
                    position: session.cursor,
                    conversation: session.transcript.clone(),
                    context: ContentContext::from(&session.profile),
                })
            }
            Phase::Closing => {
                session.phase = Phase::Ended;
                let farewell = script::farewell(&session.profile);
                session.transcript.push(Turn::agent(farewell.clone()));
                info!("Session {} ended", session.id);
                Step::Conclude { farewell }
            }
            _ => Step::Ignored,
        }
    }

    /// Record the evaluation, advance the cursor and return the next line.
    /// Returns `None` if the review is stale (session ended or reset meanwhile).
    pub fn review_ready(&mut self, outcome: ReviewOutcome) -> Option<String> {
        let mut session = self.session.write();
        if !self.reviewing || session.phase != Phase::Interview {
            debug!("Stale review for {:?} dropped", outcome.question.question);
            return None;
        }
        self.reviewing = false;

        session.results.push(EvaluationResult {
            question: outcome.question.question,
            answer: outcome.answer,
            score: outcome.evaluation.score,
            strengths: outcome.evaluation.strengths,
            improvements: outcome.evaluation.improvements,
        });
        session.cursor += 1;

        let line = match session.current_question() {
            Some(next) => outcome.transition.unwrap_or_else(|| next.question.clone()),
            None => {
                session.phase = Phase::Closing;
                script::closing(session.profile.language)
            }
        };
        debug!("Advanced to question {}/{}", session.cursor, session.questions.len());
        session.transcript.push(Turn::agent(line.clone()));
        Some(line)
    }

    /// End a running session immediately. Returns `false` if nothing was running.
    pub fn conclude_early(&mut self) -> bool {
        let mut session = self.session.write();
        if session.phase == Phase::Connecting || session.phase.is_interactive() {
            info!("Session {} ended early in phase {}", session.id, session.phase);
            session.phase = Phase::Ended;
            self.reviewing = false;
            true
        } else {
            false
        }
    }

    pub fn record_summary(&mut self, summary: Option<Summary>) {
        self.session.write().summary = summary;
    }

    /// Back to setup with all state cleared
    pub fn reset(&mut self) {
        let profile = self.session.profile();
        *self.session.write() = Session::new(profile);
        self.reviewing = false;
    }
}
