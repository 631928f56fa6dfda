use serde::{Deserialize, Serialize};

/// Normalized candidate profile used to personalize cover letters.
/// Every field defaults to an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumeRecord {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub experience: String,
    pub skills: String,
    pub achievements: String,
    pub education: String,
    pub summary: String,
}

impl ResumeRecord {
    pub const FIELDS: [&'static str; 8] = [
        "name",
        "email",
        "phone",
        "experience",
        "skills",
        "achievements",
        "education",
        "summary",
    ];

    /// A record is usable for personalization only when both name and email are set.
    pub fn is_usable(&self) -> bool {
        !self.name.is_empty() && !self.email.is_empty()
    }

    /// Applies `clean_field` to every field.
    pub fn normalized(self) -> Self {
        Self {
            name: clean_field(&self.name),
            email: clean_field(&self.email),
            phone: clean_field(&self.phone),
            experience: clean_field(&self.experience),
            skills: clean_field(&self.skills),
            achievements: clean_field(&self.achievements),
            education: clean_field(&self.education),
            summary: clean_field(&self.summary),
        }
    }

    pub(crate) fn field_mut(&mut self, field: &str) -> Option<&mut String> {
        match field {
            "name" => Some(&mut self.name),
            "email" => Some(&mut self.email),
            "phone" => Some(&mut self.phone),
            "experience" => Some(&mut self.experience),
            "skills" => Some(&mut self.skills),
            "achievements" => Some(&mut self.achievements),
            "education" => Some(&mut self.education),
            "summary" => Some(&mut self.summary),
            _ => None,
        }
    }
}

/// Trims a field and collapses blank lines and runs of whitespace into single spaces.
pub fn clean_field(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
