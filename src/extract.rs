//! Text extraction for watched documents.
//!
//! The pipeline hands over raw bytes plus a content type inferred from the
//! filename and gets plain UTF-8 text back. [`LocalExtractor`] handles
//! text formats, PDF and DOCX in-process; other implementations (an OCR
//! service, a hosted model) plug in through [`TextExtractor`].

use async_trait::async_trait;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Cap on the decompressed `word/document.xml` we are willing to parse.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Non-`text/*` types that are still plain text.
const TEXTUAL_APPLICATION_TYPES: &[&str] = &[
    "application/json",
    "application/xml",
    "application/toml",
    "application/x-yaml",
    "application/yaml",
];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error("extraction task failed: {0}")]
    Task(String),
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract plain text. An empty string means "nothing to index".
    async fn extract(&self, bytes: &[u8], content_type: &str) -> Result<String, ExtractError>;
}

/// In-process extractor for text, PDF and DOCX.
///
/// Parsing runs on the blocking thread pool so a large PDF does not stall
/// the runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalExtractor;

#[async_trait]
impl TextExtractor for LocalExtractor {
    async fn extract(&self, bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
        let bytes = bytes.to_vec();
        let content_type = content_type.to_string();
        tokio::task::spawn_blocking(move || extract_text(&bytes, &content_type))
            .await
            .map_err(|e| ExtractError::Task(e.to_string()))?
    }
}

/// Content type for a path, from its extension.
pub fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Extract plain text from `bytes` according to `content_type`.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    match content_type {
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes),
        ct if is_textual(ct) => Ok(decode_text(bytes)),
        _ => Err(ExtractError::UnsupportedContentType(
            content_type.to_string(),
        )),
    }
}

fn is_textual(content_type: &str) -> bool {
    content_type.starts_with("text/") || TEXTUAL_APPLICATION_TYPES.contains(&content_type)
}

fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Docx(format!("word/document.xml: {}", e)))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    docx_paragraphs(&xml)
}

/// Collect `w:t` runs, one line per `w:p` paragraph.
fn docx_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Docx(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut archive = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            archive
                .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            let body: String = paragraphs
                .iter()
                .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>", p))
                .collect();
            let xml = format!(
                "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
                body
            );
            archive.write_all(xml.as_bytes()).unwrap();
            archive.finish().unwrap();
        }
        buf
    }

    #[test]
    fn binary_blob_is_not_indexed() {
        let err = extract_text(&[0u8, 159, 146, 150], "application/octet-stream").unwrap_err();
        match err {
            ExtractError::UnsupportedContentType(ct) => assert_eq!(ct, "application/octet-stream"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn garbage_pdf_and_docx_fail_cleanly() {
        let scanned = b"scanned notice, not a real document";
        assert!(matches!(extract_text(scanned, MIME_PDF), Err(ExtractError::Pdf(_))));
        assert!(matches!(
            extract_text(scanned, MIME_DOCX),
            Err(ExtractError::Docx(_))
        ));
    }

    #[test]
    fn docx_without_document_part_fails() {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/styles.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<styles/>").unwrap();
            zip.finish().unwrap();
        }
        let err = extract_text(&buf, MIME_DOCX).unwrap_err();
        assert!(err.to_string().contains("word/document.xml"));
    }

    #[test]
    fn plain_text_is_decoded() {
        let text = extract_text(b"\xEF\xBB\xBFSection 16: input tax credit", "text/plain").unwrap();
        assert_eq!(text, "Section 16: input tax credit");
    }

    #[test]
    fn json_counts_as_text() {
        assert_eq!(extract_text(b"{}", "application/json").unwrap(), "{}");
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let bytes = docx_with_paragraphs(&["Rule 36(4)", "ITC &amp; GSTR-2B"]);
        let text = extract_text(&bytes, MIME_DOCX).unwrap();
        assert_eq!(text, "Rule 36(4)\nITC & GSTR-2B");
    }

    #[test]
    fn content_type_from_extension() {
        assert_eq!(content_type_for(Path::new("a/notice.pdf")), MIME_PDF);
        assert_eq!(content_type_for(Path::new("rules.txt")), "text/plain");
        assert_eq!(
            content_type_for(Path::new("blob.unknownext")),
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn local_extractor_runs_off_runtime() {
        let text = LocalExtractor
            .extract(b"hello gst", "text/markdown")
            .await
            .unwrap();
        assert_eq!(text, "hello gst");
    }
}
