//! Text extraction seam
//!
//! OCR itself happens elsewhere; Scanwise only consumes its output. An
//! extractor signals failure either with an error or by returning text that
//! starts with [`ERROR_MARKER`]. Both are hard failures and the text is never
//! parsed.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::ErrorKind;

/// Prefix an extractor puts on text that is really an error message
pub const ERROR_MARKER: &str = "ERROR:";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("text extraction failed: {0}")]
    Failed(String),

    #[error("no text could be extracted")]
    Empty,

    #[error("extracted text is not valid UTF-8: {0}")]
    InvalidEncoding(String),
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ExtractionFailed
    }
}

/// Turns uploaded file bytes into plain text
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract text from `bytes`; `language_hint` is a language name such as "English"
    async fn extract(&self, bytes: &[u8], language_hint: &str) -> Result<String, ExtractError>;
}

/// Reject marker-prefixed or blank extractor output
pub fn check_extracted(text: String) -> Result<String, ExtractError> {
    let trimmed = text.trim_start();
    if let Some(message) = trimmed.strip_prefix(ERROR_MARKER) {
        return Err(ExtractError::Failed(message.trim().to_string()));
    }
    if trimmed.trim_end().is_empty() {
        return Err(ExtractError::Empty);
    }
    Ok(text)
}

/// Extractor for inputs that are already text (pasted OCR output, .txt files)
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, bytes: &[u8], _language_hint: &str) -> Result<String, ExtractError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ExtractError::InvalidEncoding(e.to_string()))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        check_extracted(text.to_string())
    }
}

/// OCR languages and the provider code each maps to
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("Auto Detect", "eng"),
    ("English", "eng"),
    ("Arabic", "ara"),
    ("Bulgarian", "bul"),
    ("Chinese (Simplified)", "chs"),
    ("Chinese (Traditional)", "cht"),
    ("Croatian", "hrv"),
    ("Czech", "cze"),
    ("Danish", "dan"),
    ("Dutch", "dut"),
    ("Finnish", "fin"),
    ("French", "fre"),
    ("German", "ger"),
    ("Greek", "gre"),
    ("Hungarian", "hun"),
    ("Korean", "kor"),
    ("Italian", "ita"),
    ("Japanese", "jpn"),
    ("Polish", "pol"),
    ("Portuguese", "por"),
    ("Russian", "rus"),
    ("Slovenian", "slv"),
    ("Spanish", "spa"),
    ("Swedish", "swe"),
    ("Turkish", "tur"),
];

/// Provider code for a language name; unknown names fall back to English
pub fn ocr_language_code(name: &str) -> &'static str {
    let name = name.trim();
    SUPPORTED_LANGUAGES
        .iter()
        .find(|(label, _)| label.eq_ignore_ascii_case(name))
        .map(|(_, code)| *code)
        .unwrap_or("eng")
}
