//! Uploaded resume files: accepted types and transport encoding.

use std::path::Path;

use base64::Engine;
use bytes::Bytes;

pub const PDF: &str = "application/pdf";
pub const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const DOC: &str = "application/msword";
pub const TEXT: &str = "text/plain";

pub const SUPPORTED_MIME_TYPES: [&str; 4] = [PDF, DOCX, DOC, TEXT];

/// Inline-data ceiling of the model API.
pub const MAX_INLINE_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ResumeFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl ResumeFile {
    /// Builds a file from an upload. The MIME type is inferred from the
    /// extension only when the upload carries none.
    pub fn from_upload(name: impl Into<String>, mime_type: Option<&str>, bytes: Bytes) -> Self {
        let name = name.into();
        let mime_type = match mime_type.map(str::trim) {
            Some(mime) if !mime.is_empty() => mime.to_string(),
            _ => mime_from_extension(&name).unwrap_or_default().to_string(),
        };
        Self {
            name,
            mime_type,
            bytes,
        }
    }

    pub fn is_valid_file_type(&self) -> bool {
        is_valid_file_type(&self.mime_type)
    }

    /// MIME type sent to the model. Legacy `.doc` is sent as DOCX.
    pub fn transport_mime_type(&self) -> &str {
        match self.mime_type.as_str() {
            DOC => DOCX,
            other => other,
        }
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

pub fn is_valid_file_type(mime_type: &str) -> bool {
    SUPPORTED_MIME_TYPES.contains(&mime_type)
}

fn mime_from_extension(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(PDF),
        "docx" => Some(DOCX),
        "doc" => Some(DOC),
        "txt" => Some(TEXT),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_types_are_accepted() {
        for mime in SUPPORTED_MIME_TYPES {
            assert!(is_valid_file_type(mime), "{mime} should be accepted");
        }
    }

    #[test]
    fn test_other_types_are_rejected() {
        for mime in ["image/png", "application/zip", "text/html", ""] {
            assert!(!is_valid_file_type(mime), "{mime} should be rejected");
        }
    }

    #[test]
    fn test_declared_mime_type_wins_over_extension() {
        let file = ResumeFile::from_upload("resume.pdf", Some("image/png"), Bytes::new());
        assert_eq!(file.mime_type, "image/png");
        assert!(!file.is_valid_file_type());
    }

    #[test]
    fn test_missing_mime_type_is_inferred_from_extension() {
        let file = ResumeFile::from_upload("CV.DOCX", None, Bytes::new());
        assert_eq!(file.mime_type, DOCX);

        let file = ResumeFile::from_upload("notes.txt", Some(""), Bytes::new());
        assert_eq!(file.mime_type, TEXT);

        let file = ResumeFile::from_upload("photo.jpg", None, Bytes::new());
        assert_eq!(file.mime_type, "");
    }

    #[test]
    fn test_doc_is_sent_as_docx() {
        let file = ResumeFile::from_upload("old.doc", Some(DOC), Bytes::new());
        assert_eq!(file.transport_mime_type(), DOCX);

        let file = ResumeFile::from_upload("r.pdf", Some(PDF), Bytes::new());
        assert_eq!(file.transport_mime_type(), PDF);
    }

    #[test]
    fn test_base64_encoding() {
        let file = ResumeFile::from_upload("r.txt", Some(TEXT), Bytes::from_static(b"hello"));
        assert_eq!(file.to_base64(), "aGVsbG8=");
        assert_eq!(file.size_bytes(), 5);
    }
}
