use std::panic::{AssertUnwindSafe, catch_unwind};

/// Text of a PDF, pages separated by a blank line.
///
/// Returns an empty string when nothing can be extracted (scanned images,
/// encrypted or malformed files). The parser is CPU bound; call this from
/// `spawn_blocking`.
pub fn extract_text(data: &[u8]) -> String {
    // pdf-extract panics on some malformed inputs
    let result = catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(data)));
    let text = match result {
        Ok(Ok(text)) => text,
        Ok(Err(err)) => {
            tracing::warn!(error = %err, bytes = data.len(), "PDF text extraction failed");
            return String::new();
        }
        Err(_) => {
            tracing::warn!(bytes = data.len(), "PDF parser panicked");
            return String::new();
        }
    };
    join_pages(&text)
}

fn join_pages(text: &str) -> String {
    text.split('\x0C')
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_input_yields_empty_text() {
        assert_eq!(extract_text(b"definitely not a pdf"), "");
        assert_eq!(extract_text(&[]), "");
    }

    #[test]
    fn pages_are_separated_by_blank_lines() {
        assert_eq!(
            join_pages("Page one\n\x0C\n  \x0CPage three\n"),
            "Page one\n\nPage three"
        );
    }
}
