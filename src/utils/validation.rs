use thiserror::Error;
use validator::Validate;

/// Extensions accepted by the converter (compared case-insensitively)
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf"];

/// Longest staged name component we keep from the client's filename
const MAX_STAGED_NAME_LEN: usize = 128;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Optional form parameters accepted next to the uploaded file
#[derive(Debug, Default, Validate)]
pub struct ConvertOptions {
    #[validate(range(min = 1, message = "max_pages must be a positive integer"))]
    pub max_pages: Option<u32>,
}

/// Check that the client supplied a filename carrying a PDF extension.
///
/// This is purely syntactic; the content itself is never sniffed.
pub fn validate_pdf_filename(filename: Option<&str>) -> Result<&str, ValidationError> {
    let name = filename.map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(ValidationError::new(
            "UNSUPPORTED_FILE",
            "Only PDF files are supported",
        ));
    }

    let lower = name.to_lowercase();
    let allowed = ALLOWED_EXTENSIONS
        .iter()
        .any(|ext| lower.strip_suffix(ext).is_some_and(|stem| stem.ends_with('.')));

    if allowed {
        Ok(name)
    } else {
        Err(ValidationError::new(
            "UNSUPPORTED_FILE",
            "Only PDF files are supported",
        ))
    }
}

/// Parse the raw `max_pages` form value. Empty input means "no limit".
pub fn parse_convert_options(max_pages: Option<&str>) -> Result<ConvertOptions, ValidationError> {
    let raw = max_pages.map(str::trim).filter(|v| !v.is_empty());

    let max_pages = match raw {
        None => None,
        Some(v) => Some(v.parse::<u32>().map_err(|_| {
            ValidationError::new("INVALID_MAX_PAGES", "max_pages must be a positive integer")
        })?),
    };

    let options = ConvertOptions { max_pages };
    options
        .validate()
        .map_err(|_| ValidationError::new("INVALID_MAX_PAGES", "max_pages must be a positive integer"))?;
    Ok(options)
}

/// Reduce a client filename to a safe single path component for the staging directory.
pub fn sanitize_filename(filename: &str) -> String {
    // Keep only the final component, whichever separator the client used
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    if name != filename {
        tracing::warn!("Path components stripped from upload filename: {}", filename);
    }

    let mut sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    // No hidden files or parent references
    while sanitized.starts_with('.') {
        sanitized.replace_range(..1, "_");
    }

    if sanitized.len() > MAX_STAGED_NAME_LEN {
        sanitized = sanitized[sanitized.len() - MAX_STAGED_NAME_LEN..].to_string();
    }

    if sanitized.is_empty() {
        "upload.pdf".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pdf_filename() {
        assert_eq!(validate_pdf_filename(Some("report.pdf")).unwrap(), "report.pdf");
        assert!(validate_pdf_filename(Some("REPORT.PDF")).is_ok());
        assert!(validate_pdf_filename(Some("archive.tar.pdf")).is_ok());
        assert!(validate_pdf_filename(Some(".pdf")).is_ok());
        assert!(validate_pdf_filename(Some("report.pdf.txt")).is_err());

        let err = validate_pdf_filename(Some("notes.txt")).unwrap_err();
        assert!(err.message.contains("PDF"));
        assert!(validate_pdf_filename(Some("pdf")).is_err());
        assert!(validate_pdf_filename(Some("")).is_err());
        assert!(validate_pdf_filename(None).is_err());
    }

    #[test]
    fn test_parse_convert_options() {
        assert_eq!(parse_convert_options(None).unwrap().max_pages, None);
        assert_eq!(parse_convert_options(Some("")).unwrap().max_pages, None);
        assert_eq!(parse_convert_options(Some(" 5 ")).unwrap().max_pages, Some(5));
        assert!(parse_convert_options(Some("0")).is_err());
        assert!(parse_convert_options(Some("-3")).is_err());
        assert!(parse_convert_options(Some("ten")).is_err());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("my report (v2).pdf"), "my_report__v2_.pdf");
        assert_eq!(sanitize_filename("../../../etc/passwd.pdf"), "passwd.pdf");
        assert_eq!(sanitize_filename("C:\\Users\\me\\doc.pdf"), "doc.pdf");
        assert_eq!(sanitize_filename(".hidden.pdf"), "_hidden.pdf");
        assert_eq!(sanitize_filename("日本語.pdf"), "___.pdf");
        assert_eq!(sanitize_filename("dir/"), "upload.pdf");
    }

    #[test]
    fn test_sanitize_truncates_long_names() {
        let long = format!("{}.pdf", "a".repeat(300));
        let sanitized = sanitize_filename(&long);
        assert_eq!(sanitized.len(), MAX_STAGED_NAME_LEN);
        assert!(sanitized.ends_with(".pdf"));
    }
}
