//! Resume Parsing Pipeline: one multimodal model call per uploaded file,
//! followed by JSON extraction, field cleanup, and validation.
//!
//! Flow: api key check → file type check → size check → base64 encode →
//!       model call → strip fences → first `{` .. last `}` → clean fields.
//!
//! No retries. The caller offers "Try Again" or manual entry instead.

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::llm_client::{strip_json_fences, GenerativeModel, LlmErrorKind, Part};
use crate::resume::file::{ResumeFile, MAX_INLINE_BYTES};
use crate::resume::models::{clean_field, ResumeRecord};
use crate::resume::prompts::resume_extraction_prompt;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResumeParseError {
    #[error("API key is required for resume parsing. Please set your Gemini API key.")]
    MissingApiKey,

    #[error("Unsupported file type. Please upload PDF, DOCX, or TXT files.")]
    UnsupportedFileType { mime_type: String },

    #[error("Invalid API key. Please check your Gemini API key.")]
    InvalidApiKey,

    #[error("Rate limit exceeded. Please try again in a moment.")]
    RateLimited,

    #[error("File is too large. Please use a smaller file.")]
    FileTooLarge,

    #[error("Invalid response format from AI. Please try again.")]
    MalformedModelResponse { detail: String },

    #[error("Could not extract essential information (name or email) from the resume")]
    IncompleteExtraction,

    #[error("Failed to parse resume with AI. Please try again or enter details manually.")]
    UnknownUpstreamFailure { detail: String },
}

impl ResumeParseError {
    pub fn user_message(&self) -> String {
        self.to_string()
    }

    /// Credential problems send the user to the settings view.
    pub fn opens_settings(&self) -> bool {
        matches!(
            self,
            ResumeParseError::MissingApiKey | ResumeParseError::InvalidApiKey
        )
    }

    /// Diagnostic detail kept out of the user-facing message.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ResumeParseError::UnsupportedFileType { mime_type } => Some(mime_type),
            ResumeParseError::MalformedModelResponse { detail }
            | ResumeParseError::UnknownUpstreamFailure { detail } => Some(detail),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct ResumeParser {
    model: Arc<dyn GenerativeModel>,
}

impl ResumeParser {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    pub async fn parse_resume_file(
        &self,
        api_key: Option<&str>,
        file: &ResumeFile,
    ) -> Result<ResumeRecord, ResumeParseError> {
        info!(
            "Parsing resume file with LLM: {} ({})",
            file.name, file.mime_type
        );

        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(ResumeParseError::MissingApiKey)?;

        if !file.is_valid_file_type() {
            return Err(ResumeParseError::UnsupportedFileType {
                mime_type: file.mime_type.clone(),
            });
        }

        if file.size_bytes() > MAX_INLINE_BYTES {
            warn!(
                "Resume file {} is {} bytes, over the {MAX_INLINE_BYTES} byte inline limit",
                file.name,
                file.size_bytes()
            );
            return Err(ResumeParseError::FileTooLarge);
        }

        debug!("Sending {} file to Gemini", file.transport_mime_type());
        let parts = vec![
            Part::text(resume_extraction_prompt()),
            Part::inline_data(file.transport_mime_type(), file.to_base64()),
        ];

        let response = self
            .model
            .generate_content(api_key, parts)
            .await
            .map_err(|e| {
                warn!("Resume extraction call failed: {e}");
                match e.kind() {
                    LlmErrorKind::InvalidApiKey => ResumeParseError::InvalidApiKey,
                    LlmErrorKind::RateLimited | LlmErrorKind::QuotaExceeded => {
                        ResumeParseError::RateLimited
                    }
                    LlmErrorKind::FileTooLarge => ResumeParseError::FileTooLarge,
                    LlmErrorKind::EmptyResponse => ResumeParseError::MalformedModelResponse {
                        detail: e.to_string(),
                    },
                    LlmErrorKind::Network | LlmErrorKind::Upstream => {
                        ResumeParseError::UnknownUpstreamFailure {
                            detail: e.to_string(),
                        }
                    }
                }
            })?;

        let record = parse_model_response(&response)?;
        info!("Resume parsed for {}", record.name);
        Ok(record)
    }
}

/// Extracts a `ResumeRecord` from raw model output.
pub fn parse_model_response(response: &str) -> Result<ResumeRecord, ResumeParseError> {
    let cleaned = strip_json_fences(response);

    let json = extract_json_object(&cleaned).ok_or_else(|| {
        warn!("No JSON object found in model response");
        ResumeParseError::MalformedModelResponse {
            detail: "No JSON object found in response".to_string(),
        }
    })?;

    let fields: Map<String, Value> = serde_json::from_str(json).map_err(|e| {
        warn!("Model response is not valid JSON: {e}");
        ResumeParseError::MalformedModelResponse {
            detail: e.to_string(),
        }
    })?;

    let mut record = ResumeRecord::default();
    for field in ResumeRecord::FIELDS {
        if let Some(slot) = record.field_mut(field) {
            *slot = clean_field(&field_text(fields.get(field)));
        }
    }

    if record.name.is_empty() && record.email.is_empty() {
        return Err(ResumeParseError::IncompleteExtraction);
    }
    Ok(record)
}

/// The first `{` through the last `}`, inclusive.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Flattens a JSON value into field text. Lists are joined with ", ".
fn field_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| field_text(Some(item)))
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Some(other) => other.to_string(),
    }
}
