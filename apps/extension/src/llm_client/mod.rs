/// LLM Client: the single point of entry for all Gemini API calls.
///
/// ARCHITECTURAL RULE: No other module may call the Gemini API directly.
/// Pipelines depend on the `GenerativeModel` trait, and upstream failures are
/// classified here, once, into `LlmErrorKind`.
///
/// No retries are performed. A request timeout applies only when configured.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}, {reason}): {message}")]
    Api {
        status: u16,
        reason: String,
        message: String,
    },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// Closed classification of upstream failures, consumed by the pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    InvalidApiKey,
    RateLimited,
    QuotaExceeded,
    FileTooLarge,
    Network,
    EmptyResponse,
    Upstream,
}

impl LlmError {
    pub fn kind(&self) -> LlmErrorKind {
        match self {
            LlmError::Http(e) if e.is_decode() => LlmErrorKind::Upstream,
            LlmError::Http(_) => LlmErrorKind::Network,
            LlmError::Api {
                status,
                reason,
                message,
            } => classify_api_error(*status, reason, message),
            LlmError::Parse(_) => LlmErrorKind::Upstream,
            LlmError::EmptyContent => LlmErrorKind::EmptyResponse,
        }
    }
}

fn classify_api_error(status: u16, reason: &str, message: &str) -> LlmErrorKind {
    let message = message.to_lowercase();

    if reason == "API_KEY_INVALID"
        || status == 401
        || status == 403
        || message.contains("api key not valid")
        || message.contains("api_key_invalid")
    {
        return LlmErrorKind::InvalidApiKey;
    }

    if status == 413
        || reason == "FILE_TOO_LARGE"
        || message.contains("too large")
        || message.contains("payload size exceeds")
    {
        return LlmErrorKind::FileTooLarge;
    }

    if status == 429 || reason == "RATE_LIMIT_EXCEEDED" || reason == "RESOURCE_EXHAUSTED" {
        if message.contains("quota") {
            return LlmErrorKind::QuotaExceeded;
        }
        return LlmErrorKind::RateLimited;
    }

    LlmErrorKind::Upstream
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

/// One piece of multimodal input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Text(String),
    InlineData(InlineData),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    /// Base64-encoded payload.
    pub data: String,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }

    pub fn inline_data(mime_type: impl Into<String>, base64_data: impl Into<String>) -> Self {
        Part::InlineData(InlineData {
            mime_type: mime_type.into(),
            data: base64_data.into(),
        })
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'a str,
    parts: &'a [Part],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub usage_metadata: Option<UsageMetadata>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<CandidateContent>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
pub struct CandidatePart {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    pub prompt_token_count: Option<u32>,
    pub candidates_token_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate's parts.
    pub fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        (!text.is_empty()).then_some(text)
    }

    /// The first candidate's finish reason when it stopped for anything but `STOP`.
    pub fn abnormal_finish(&self) -> Option<&str> {
        self.candidates
            .first()?
            .finish_reason
            .as_deref()
            .filter(|reason| *reason != "STOP")
    }
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    reason: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// The external model boundary both pipelines depend on: one prompt in
/// (text plus optional inline binary), one text completion out.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate_content(&self, api_key: &str, parts: Vec<Part>) -> Result<String, LlmError>;
}

/// Gemini `generateContent` over HTTPS.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_base: String,
    model: String,
}

impl LlmClient {
    pub fn new(
        api_base: impl Into<String>,
        model: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, LlmError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            api_base: api_base.into(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model
        )
    }

    /// Makes one call to the Gemini API, returning the full response object.
    pub async fn call(
        &self,
        api_key: &str,
        parts: &[Part],
    ) -> Result<GenerateContentResponse, LlmError> {
        let body = GenerateContentRequest {
            contents: [RequestContent { role: "user", parts }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (reason, message) = match serde_json::from_str::<GeminiError>(&body) {
                Ok(e) => {
                    let reason = e
                        .error
                        .details
                        .into_iter()
                        .find_map(|d| d.reason)
                        .unwrap_or(e.error.status);
                    (reason, e.error.message)
                }
                Err(_) => (String::new(), body),
            };
            warn!("Gemini API returned {status}: {reason} {message}");
            return Err(LlmError::Api {
                status: status.as_u16(),
                reason,
                message,
            });
        }

        let parsed: GenerateContentResponse = serde_json::from_slice(&response.bytes().await?)?;

        if let Some(usage) = &parsed.usage_metadata {
            debug!(
                "Gemini call succeeded: prompt_tokens={:?}, candidate_tokens={:?}",
                usage.prompt_token_count, usage.candidates_token_count
            );
        }
        if let Some(reason) = parsed
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            warn!("Gemini blocked the prompt: {reason}");
        }
        if let Some(reason) = parsed.abnormal_finish() {
            warn!("Gemini stopped generating early: {reason}");
        }

        Ok(parsed)
    }
}

#[async_trait]
impl GenerativeModel for LlmClient {
    async fn generate_content(&self, api_key: &str, parts: Vec<Part>) -> Result<String, LlmError> {
        self.call(api_key, &parts)
            .await?
            .text()
            .ok_or(LlmError::EmptyContent)
    }
}

/// Removes ```json / ``` code-fence markers the model may wrap output in.
pub fn strip_json_fences(text: &str) -> String {
    text.replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
        .trim()
        .to_string()
}
