// All prompt constants for the cover letter pipeline.

/// Cover letter prompt template.
/// Replace: {job_description}, {name}, {email}, {phone}, {summary},
///          {experience}, {skills}, {education}, {achievements}
pub const COVER_LETTER_PROMPT_TEMPLATE: &str = r#"You are a professional career coach and expert cover letter writer. Create a compelling, personalized cover letter based on this job description:

JOB DESCRIPTION:
{job_description}

CANDIDATE PROFILE:
- Name: {name}
- Email: {email}
- Phone: {phone}
- Professional Summary: {summary}
- Experience: {experience}
- Skills: {skills}
- Education: {education}
- Achievements: {achievements}

REQUIREMENTS:
1. Start with a compelling opening that shows genuine interest
2. Highlight 2-3 most relevant qualifications from the job description
3. Include specific examples when possible
4. Show knowledge of the company/role
5. End with a strong call to action
6. Keep it concise and impactful (300-400 words)
7. Use a professional but engaging tone
8. Avoid generic phrases and clichés

FORMAT:
- Use proper business letter format
- Include placeholders for company name and hiring manager if not specified
- Make it ready to customize and send

Generate a cover letter that would make this candidate stand out for this specific position."#;

// Placeholders for contact fields the resume does not provide.
pub const NAME_PLACEHOLDER: &str = "[Your Name]";
pub const EMAIL_PLACEHOLDER: &str = "[Your Email]";
pub const PHONE_PLACEHOLDER: &str = "[Your Phone]";

// Instructions used in place of empty profile fields.
pub const SUMMARY_FALLBACK: &str =
    "Please create a compelling professional summary based on experience and skills";
pub const EXPERIENCE_FALLBACK: &str =
    "Please highlight relevant experience based on the job requirements";
pub const SKILLS_FALLBACK: &str = "Please emphasize skills that match the job requirements";
pub const EDUCATION_FALLBACK: &str = "Please mention relevant educational background";
pub const ACHIEVEMENTS_FALLBACK: &str = "Please mention relevant accomplishments";
