// Shared prompt fragments. Each pipeline that calls the model keeps its own
// prompts.rs alongside it and reuses these.

/// Instruction fragment that enforces JSON-only output.
pub const JSON_ONLY_INSTRUCTIONS: &str = "\
Return ONLY a valid JSON object with the exact structure shown below. \
Do not include any markdown formatting, explanations, or additional text.";
