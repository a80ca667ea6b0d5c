//! Reasoning service boundary: one aggregate request per interview, a
//! strictly structured report back.
//!
//! The service reply is validated against the report schema at this
//! boundary; anything missing or mistyped is a typed `MalformedAnalysis`
//! error, never a partially-trusted value.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Ordered (question, transcript) pair for the aggregate prompt.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    pub question_id: Uuid,
    pub prompt: String,
    pub transcript: String,
}

/// Everything the reasoning service sees: job metadata plus every answer in
/// original question order.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    pub job_title: String,
    pub job_description: String,
    pub entries: Vec<TranscriptEntry>,
}

/// The required shape of the service output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub overall_score: f32,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub communication_style: String,
    pub confidence_level: String,
    pub skill_alignment: String,
    pub red_flags: Vec<String>,
    pub summary: String,
    pub question_analyses: Vec<QuestionReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionReport {
    pub question_id: Uuid,
    pub score: f32,
    pub feedback: String,
}

#[async_trait]
pub trait Analyst: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisReport>;
}

// ---------------------------------------------------------------------
// Chat-completions client
// ---------------------------------------------------------------------

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
    temperature: f64,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: String,
}

/// Reasoning client speaking the chat-completions dialect, demanding a JSON
/// object and parsing it into `AnalysisReport`.
pub struct HttpAnalyst {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl HttpAnalyst {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn build_prompt(request: &AnalysisRequest) -> String {
        let mut prompt = format!(
            "Evaluate a completed video interview for the role below.\n\n\
             Role: {}\nDescription: {}\n\nAnswers, in interview order:\n",
            request.job_title, request.job_description
        );
        for (i, entry) in request.entries.iter().enumerate() {
            prompt.push_str(&format!(
                "\nQ{} (id {}): {}\nAnswer transcript: {}\n",
                i + 1,
                entry.question_id,
                entry.prompt,
                entry.transcript
            ));
        }
        prompt.push_str(
            "\nRespond with a single JSON object with these keys: \
             overall_score (0-100 number), strengths (string array), \
             weaknesses (string array), communication_style (string), \
             confidence_level (string), skill_alignment (string), \
             red_flags (string array), summary (string), \
             question_analyses (array of {question_id, score, feedback}, \
             one per question, using the question ids given above).",
        );
        prompt
    }
}

#[async_trait]
impl Analyst for HttpAnalyst {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisReport> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are a structured interview assessor. \
                              You always answer with a single JSON object."
                        .to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: Self::build_prompt(request),
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: 0.2,
        };

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Analysis(format!(
                "service returned {}: {}",
                status, text
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::MalformedAnalysis(e.to_string()))?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| Error::MalformedAnalysis("no choices in response".into()))?;

        serde_json::from_str(content).map_err(|e| Error::MalformedAnalysis(e.to_string()))
    }
}
