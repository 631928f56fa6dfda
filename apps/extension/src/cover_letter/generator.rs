//! Cover Letter Generation: builds one prompt from the job text and the
//! resume, makes one model call, and returns the text verbatim.
//!
//! No post-parsing and no retries. "Regenerate" is simply another call.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::cover_letter::prompts::{
    ACHIEVEMENTS_FALLBACK, COVER_LETTER_PROMPT_TEMPLATE, EDUCATION_FALLBACK, EMAIL_PLACEHOLDER,
    EXPERIENCE_FALLBACK, NAME_PLACEHOLDER, PHONE_PLACEHOLDER, SKILLS_FALLBACK, SUMMARY_FALLBACK,
};
use crate::llm_client::{GenerativeModel, LlmErrorKind, Part};
use crate::resume::models::ResumeRecord;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoverLetterError {
    #[error("❌ Please set your Gemini API key in settings first!")]
    MissingApiKey,

    #[error("Please select some job description text first!")]
    EmptyJobText,

    #[error("❌ Invalid API key. Please check your Gemini API key in settings.")]
    InvalidApiKey,

    #[error("❌ API quota exceeded. Please try again later or check your Gemini usage.")]
    QuotaExceeded,

    #[error("❌ Network error. Please check your internet connection and try again.")]
    NetworkFailure,

    #[error("❌ Error: {detail}")]
    UnknownUpstreamFailure { detail: String },
}

impl CoverLetterError {
    pub fn user_message(&self) -> String {
        self.to_string()
    }

    /// Credential problems send the user to the settings view.
    pub fn opens_settings(&self) -> bool {
        matches!(
            self,
            CoverLetterError::MissingApiKey | CoverLetterError::InvalidApiKey
        )
    }
}

/// Fills the prompt template. Empty resume fields become placeholders or
/// instructions for the model to infer them.
pub fn build_cover_letter_prompt(job_description: &str, resume: Option<&ResumeRecord>) -> String {
    let field = |pick: fn(&ResumeRecord) -> &str, fallback: &'static str| -> String {
        resume
            .map(pick)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(fallback)
            .to_string()
    };

    let values = [
        ("job_description", job_description.to_string()),
        ("name", field(|r| r.name.as_str(), NAME_PLACEHOLDER)),
        ("email", field(|r| r.email.as_str(), EMAIL_PLACEHOLDER)),
        ("phone", field(|r| r.phone.as_str(), PHONE_PLACEHOLDER)),
        ("summary", field(|r| r.summary.as_str(), SUMMARY_FALLBACK)),
        ("experience", field(|r| r.experience.as_str(), EXPERIENCE_FALLBACK)),
        ("skills", field(|r| r.skills.as_str(), SKILLS_FALLBACK)),
        ("education", field(|r| r.education.as_str(), EDUCATION_FALLBACK)),
        ("achievements", field(|r| r.achievements.as_str(), ACHIEVEMENTS_FALLBACK)),
    ];
    fill_template(COVER_LETTER_PROMPT_TEMPLATE, &values)
}

/// Substitutes `{key}` placeholders in one left-to-right pass. Inserted values
/// are never rescanned, and unknown `{...}` sequences are copied unchanged.
fn fill_template(template: &str, values: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let key = &after[..close];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (v, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[derive(Clone)]
pub struct CoverLetterGenerator {
    model: Arc<dyn GenerativeModel>,
}

impl CoverLetterGenerator {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    pub async fn generate(
        &self,
        api_key: Option<&str>,
        job_description: &str,
        resume: Option<&ResumeRecord>,
    ) -> Result<String, CoverLetterError> {
        let job_description = job_description.trim();
        if job_description.is_empty() {
            return Err(CoverLetterError::EmptyJobText);
        }
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(CoverLetterError::MissingApiKey)?;

        info!(
            "Generating cover letter ({} characters of job text, resume: {})",
            job_description.chars().count(),
            resume.map_or("none", |r| r.name.as_str())
        );

        let prompt = build_cover_letter_prompt(job_description, resume);
        let letter = self
            .model
            .generate_content(api_key, vec![Part::text(prompt)])
            .await
            .map_err(|e| {
                warn!("Cover letter generation failed: {e}");
                match e.kind() {
                    LlmErrorKind::InvalidApiKey => CoverLetterError::InvalidApiKey,
                    LlmErrorKind::QuotaExceeded | LlmErrorKind::RateLimited => {
                        CoverLetterError::QuotaExceeded
                    }
                    LlmErrorKind::Network => CoverLetterError::NetworkFailure,
                    LlmErrorKind::FileTooLarge
                    | LlmErrorKind::EmptyResponse
                    | LlmErrorKind::Upstream => CoverLetterError::UnknownUpstreamFailure {
                        detail: e.to_string(),
                    },
                }
            })?;

        info!("Cover letter generated ({} characters)", letter.chars().count());
        Ok(letter)
    }
}
