// Prompt constants for resume extraction.
// Reuses the JSON-only fragment from llm_client::prompts.

use crate::llm_client::prompts::JSON_ONLY_INSTRUCTIONS;

const RESUME_PARSE_INTRO: &str = "You are a professional resume parser. \
Your task is to extract structured information from the uploaded resume file \
and return it as a valid JSON object.";

const RESUME_PARSE_RULES: &str = "\
1. Extract information accurately from the resume
2. If a field is not found, use an empty string \"\"
3. For experience and skills, provide meaningful summaries, not just raw text";

const RESUME_JSON_STRUCTURE: &str = r#"{
  "name": "Full name of the person",
  "email": "Email address",
  "phone": "Phone number (formatted nicely)",
  "experience": "Professional experience summary (2-3 sentences highlighting key roles and achievements)",
  "skills": "Key technical and professional skills (comma-separated list)",
  "achievements": "Notable achievements, awards, or accomplishments",
  "education": "Educational background (degrees, institutions, dates)",
  "summary": "Professional summary or objective statement"
}"#;

/// The fixed extraction prompt sent alongside the resume file.
pub fn resume_extraction_prompt() -> String {
    format!(
        "{RESUME_PARSE_INTRO}\n\nIMPORTANT INSTRUCTIONS:\n{JSON_ONLY_INSTRUCTIONS}\n{RESUME_PARSE_RULES}\n\nRequired JSON structure:\n{RESUME_JSON_STRUCTURE}"
    )
}
