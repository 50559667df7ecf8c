//! How text is pulled out of a Drive file, by MIME type.

pub const GOOGLE_DOC: &str = "application/vnd.google-apps.document";
pub const GOOGLE_SHEET: &str = "application/vnd.google-apps.spreadsheet";
pub const GOOGLE_SLIDES: &str = "application/vnd.google-apps.presentation";
pub const PDF: &str = "application/pdf";
pub const PLAIN_TEXT: &str = "text/plain";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    /// Native Google format, exported server-side to the given MIME type.
    Export(&'static str),
    Ocr,
    Pdf,
    PlainText,
    Unsupported,
}

pub fn classify(mime_type: &str) -> Extraction {
    match mime_type {
        GOOGLE_DOC | GOOGLE_SLIDES => Extraction::Export("text/plain"),
        GOOGLE_SHEET => Extraction::Export("text/csv"),
        PDF => Extraction::Pdf,
        PLAIN_TEXT => Extraction::PlainText,
        m if m.starts_with("image/") => Extraction::Ocr,
        _ => Extraction::Unsupported,
    }
}
