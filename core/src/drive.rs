use std::sync::LazyLock;

use regex::Regex;

pub const GOOGLE_DOCS_MIME: &str = "application/vnd.google-apps.document";
pub const GOOGLE_SHEETS_MIME: &str = "application/vnd.google-apps.spreadsheet";
pub const GOOGLE_SLIDES_MIME: &str = "application/vnd.google-apps.presentation";
pub const GOOGLE_FOLDER_MIME: &str = "application/vnd.google-apps.folder";
pub const PDF_MIME: &str = "application/pdf";
pub const OCTET_STREAM_MIME: &str = "application/octet-stream";

/// Subfolder inside every site folder that holds the DD source documents.
pub const DUE_DILIGENCE_SUBFOLDER: &str = "01_Due Diligence";

static FOLDER_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/folders/([a-zA-Z0-9_-]+)").expect("valid folder id regex"));

static DRIVE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("valid drive id regex"));

/// Drive file and folder ids are URL-safe tokens; anything else is rejected
/// before it reaches a request path.
pub fn is_drive_id(value: &str) -> bool {
    DRIVE_ID_RE.is_match(value)
}

/// Folder id from URLs like `https://drive.google.com/drive/u/0/folders/<ID>`.
pub fn extract_folder_id(url: &str) -> Option<String> {
    FOLDER_ID_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn infer_mime_from_name(file_name: &str) -> &'static str {
    let name = file_name.to_lowercase();
    if name.ends_with(".pdf") {
        PDF_MIME
    } else if name.ends_with(".doc") || name.ends_with(".docx") {
        "application/msword"
    } else if name.ends_with(".txt") {
        "text/plain"
    } else {
        OCTET_STREAM_MIME
    }
}

/// How the text of a Drive file is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStrategy {
    /// Workspace file exported through the Drive export endpoint.
    Export { mime: &'static str },
    /// Binary PDF downloaded and run through text extraction.
    Pdf,
    /// Downloaded and decoded as UTF-8.
    PlainText,
    /// Unknown type: download and decode, tolerating failure.
    Generic,
}

impl ReadStrategy {
    pub fn classify(mime_type: &str, file_name: &str) -> Self {
        let name = file_name.to_lowercase();
        match mime_type {
            GOOGLE_DOCS_MIME | GOOGLE_SLIDES_MIME => Self::Export { mime: "text/plain" },
            GOOGLE_SHEETS_MIME => Self::Export { mime: "text/csv" },
            PDF_MIME => Self::Pdf,
            _ if name.ends_with(".pdf") => Self::Pdf,
            m if m.starts_with("text/") => Self::PlainText,
            _ if [".txt", ".md", ".csv"].iter().any(|ext| name.ends_with(ext)) => Self::PlainText,
            _ => Self::Generic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Export { .. } => "export",
            Self::Pdf => "pdf",
            Self::PlainText => "plain_text",
            Self::Generic => "generic",
        }
    }
}

/// Drive search query for the direct children of a folder.
pub fn children_query(folder_id: &str, folders: bool, include_trashed: bool) -> String {
    let op = if folders { "=" } else { "!=" };
    let mut query = format!("'{folder_id}' in parents and mimeType{op}'{GOOGLE_FOLDER_MIME}'");
    if !include_trashed {
        query.push_str(" and trashed=false");
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_id_from_common_url_shapes() {
        assert_eq!(
            extract_folder_id("https://drive.google.com/drive/folders/1AbC_d-9").as_deref(),
            Some("1AbC_d-9")
        );
        assert_eq!(
            extract_folder_id("https://drive.google.com/drive/u/0/folders/XYZ123?usp=sharing")
                .as_deref(),
            Some("XYZ123")
        );
        assert_eq!(extract_folder_id("https://drive.google.com/file/d/abc/view"), None);
    }

    #[test]
    fn drive_ids_reject_path_characters() {
        assert!(is_drive_id("1AbC_d-9xYz"));
        for bad in ["", "a/b", "../files", "id?alt=media", "id%2F", "id with space"] {
            assert!(!is_drive_id(bad), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn mime_inference_by_extension() {
        assert_eq!(infer_mime_from_name("Survey.PDF"), PDF_MIME);
        assert_eq!(infer_mime_from_name("memo.docx"), "application/msword");
        assert_eq!(infer_mime_from_name("notes.txt"), "text/plain");
        assert_eq!(infer_mime_from_name("photo.jpg"), OCTET_STREAM_MIME);
    }

    #[test]
    fn read_strategy_classification() {
        assert_eq!(
            ReadStrategy::classify(GOOGLE_DOCS_MIME, "Report"),
            ReadStrategy::Export { mime: "text/plain" }
        );
        assert_eq!(
            ReadStrategy::classify(GOOGLE_SHEETS_MIME, "Budget"),
            ReadStrategy::Export { mime: "text/csv" }
        );
        assert_eq!(ReadStrategy::classify(PDF_MIME, "x"), ReadStrategy::Pdf);
        assert_eq!(
            ReadStrategy::classify(OCTET_STREAM_MIME, "scan.pdf"),
            ReadStrategy::Pdf
        );
        assert_eq!(
            ReadStrategy::classify("text/markdown", "README"),
            ReadStrategy::PlainText
        );
        assert_eq!(
            ReadStrategy::classify(OCTET_STREAM_MIME, "data.csv"),
            ReadStrategy::PlainText
        );
        assert_eq!(
            ReadStrategy::classify("image/png", "site.png"),
            ReadStrategy::Generic
        );
    }

    #[test]
    fn children_query_shapes() {
        assert_eq!(
            children_query("F1", false, false),
            "'F1' in parents and mimeType!='application/vnd.google-apps.folder' and trashed=false"
        );
        assert_eq!(
            children_query("F1", true, true),
            "'F1' in parents and mimeType='application/vnd.google-apps.folder'"
        );
    }
}
