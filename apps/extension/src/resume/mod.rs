pub mod file;
pub mod handlers;
pub mod models;
pub mod parser;
pub mod prompts;

pub use file::ResumeFile;
pub use models::ResumeRecord;
pub use parser::ResumeParser;
