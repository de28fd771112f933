//! Input text normalization.
//!
//! SQL Server Management Studio exports CRLF line endings and often a UTF-8
//! BOM; every later rewrite pass assumes LF-only text with no BOM.

/// Canonicalize line endings and strip a leading UTF-8 BOM.
pub fn apply(text: &str) -> String {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    text.replace("\r\n", "\n")
}
