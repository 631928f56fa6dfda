// Cover Letter Generation Pipeline.
// All model calls go through llm_client.

pub mod generator;
pub mod handlers;
pub mod prompts;

pub use generator::{CoverLetterError, CoverLetterGenerator};
