//! JSON-over-HTTP content service

use super::{ContentContext, ContentService, Evaluation};
use crate::session::{EvaluationResult, Question, Speaker, Summary, Turn};
use crate::{Result, VivaError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Content service reached at `{base_url}/questions|evaluate|transition|summary`
#[derive(Debug, Clone)]
pub struct HttpContentService {
    /// Base URL without trailing slash
    pub base_url: String,
    /// Optional bearer key
    pub api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpContentService {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VivaError::ConfigError(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    async fn post<B: Serialize, R: DeserializeOwned>(&self, route: &str, body: &B) -> Result<R> {
        let url = format!("{}/{}", self.base_url, route);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::PAYMENT_REQUIRED || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(VivaError::QuotaExhausted(format!("{} returned {}", route, status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VivaError::ContentError(format!(
                "{} returned {}: {}",
                route, status, body
            )));
        }

        let bytes = response.bytes().await?;
        debug!("{} answered with {} bytes", route, bytes.len());
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QuestionsRequest<'a> {
    #[serde(flatten)]
    context: &'a ContentContext,
    count: usize,
}

#[derive(Deserialize)]
struct QuestionsResponse {
    #[serde(default)]
    questions: Vec<Question>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EvaluateRequest<'a> {
    #[serde(flatten)]
    context: &'a ContentContext,
    question: &'a str,
    category: &'a str,
    answer: &'a str,
}

/// Services sometimes score with decimals
#[derive(Deserialize)]
struct EvaluateResponse {
    score: f64,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    improvements: Vec<String>,
}

impl From<EvaluateResponse> for Evaluation {
    fn from(wire: EvaluateResponse) -> Self {
        let score = if wire.score.is_finite() {
            wire.score.round().clamp(0.0, Evaluation::MAX_SCORE as f64) as u8
        } else {
            Evaluation::FALLBACK_SCORE
        };
        Evaluation {
            score,
            strengths: wire.strengths,
            improvements: wire.improvements,
        }
    }
}

#[derive(Serialize)]
struct ExchangeLine<'a> {
    speaker: Speaker,
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransitionRequest<'a> {
    #[serde(flatten)]
    context: &'a ContentContext,
    conversation: Vec<ExchangeLine<'a>>,
    current_question: &'a str,
    next_question: &'a str,
}

#[derive(Deserialize)]
struct TransitionResponse {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryRequest<'a> {
    #[serde(flatten)]
    context: &'a ContentContext,
    results: &'a [EvaluationResult],
}

#[async_trait]
impl ContentService for HttpContentService {
    async fn generate_questions(
        &self,
        context: &ContentContext,
        count: usize,
    ) -> Result<Vec<Question>> {
        let response: QuestionsResponse = self
            .post("questions", &QuestionsRequest { context, count })
            .await?;
        Ok(response.questions)
    }

    async fn evaluate_answer(
        &self,
        question: &Question,
        answer: &str,
        context: &ContentContext,
    ) -> Result<Evaluation> {
        let request = EvaluateRequest {
            context,
            question: &question.question,
            category: &question.category,
            answer,
        };
        let response: EvaluateResponse = self.post("evaluate", &request).await?;
        Ok(response.into())
    }

    async fn generate_transition(
        &self,
        conversation: &[Turn],
        current: &Question,
        next: &Question,
        context: &ContentContext,
    ) -> Result<String> {
        let request = TransitionRequest {
            context,
            conversation: conversation
                .iter()
                .map(|turn| ExchangeLine {
                    speaker: turn.speaker,
                    text: &turn.text,
                })
                .collect(),
            current_question: &current.question,
            next_question: &next.question,
        };
        let response: TransitionResponse = self.post("transition", &request).await?;
        Ok(response.text)
    }

    async fn generate_summary(
        &self,
        results: &[EvaluationResult],
        context: &ContentContext,
    ) -> Result<Summary> {
        self.post("summary", &SummaryRequest { context, results }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_scores_round_and_clamp() {
        let wire = EvaluateResponse {
            score: 7.6,
            strengths: vec![],
            improvements: vec![],
        };
        assert_eq!(Evaluation::from(wire).score, 8);

        let wire = EvaluateResponse {
            score: -3.0,
            strengths: vec![],
            improvements: vec![],
        };
        assert_eq!(Evaluation::from(wire).score, 0);

        let wire = EvaluateResponse {
            score: f64::NAN,
            strengths: vec![],
            improvements: vec![],
        };
        assert_eq!(Evaluation::from(wire).score, 5);
    }

    #[test]
    fn test_request_bodies_are_camel_case() {
        let context = ContentContext::from(&crate::session::CandidateProfile::new("Sam", "Nurse"));
        let body = serde_json::to_value(QuestionsRequest {
            context: &context,
            count: 4,
        })
        .unwrap();
        assert_eq!(body["targetRole"], "Nurse");
        assert_eq!(body["experienceLevel"], "mid");
        assert_eq!(body["language"], "en");
        assert_eq!(body["count"], 4);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let service =
            HttpContentService::new("http://localhost:9/api/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(service.base_url, "http://localhost:9/api");
    }
}
