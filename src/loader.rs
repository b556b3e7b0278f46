//! Format-specific document loading.
//!
//! A [`DocumentKind`] is selected by file extension or MIME type and turns
//! raw bytes into plain UTF-8 text for ingestion. Loading never panics;
//! undecodable input surfaces as a [`LoadError`] and callers skip the file.

use std::io::Read;
use std::path::Path;

use thiserror::Error;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Maximum decompressed bytes read from `word/document.xml` (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unsupported document type: {0}")]
    Unsupported(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error("failed to read {path}: {reason}")]
    Io {
        path: String,
        reason: std::io::Error,
    },
}

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    PlainText,
    Markdown,
    Csv,
    Pdf,
    Docx,
}

impl DocumentKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "text" | "log" => Some(DocumentKind::PlainText),
            "md" | "markdown" => Some(DocumentKind::Markdown),
            "csv" => Some(DocumentKind::Csv),
            "pdf" => Some(DocumentKind::Pdf),
            "docx" => Some(DocumentKind::Docx),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        let base = mime.split(';').next().unwrap_or(mime).trim();
        match base {
            "text/plain" => Some(DocumentKind::PlainText),
            "text/markdown" | "text/x-markdown" => Some(DocumentKind::Markdown),
            "text/csv" => Some(DocumentKind::Csv),
            MIME_PDF => Some(DocumentKind::Pdf),
            MIME_DOCX => Some(DocumentKind::Docx),
            _ => None,
        }
    }

    /// Decode `bytes` into plain text.
    pub fn load(self, bytes: &[u8]) -> Result<String, LoadError> {
        match self {
            DocumentKind::PlainText | DocumentKind::Markdown | DocumentKind::Csv => {
                Ok(decode_utf8(bytes))
            }
            DocumentKind::Pdf => {
                pdf_extract::extract_text_from_mem(bytes).map_err(|e| LoadError::Pdf(e.to_string()))
            }
            DocumentKind::Docx => extract_docx(bytes),
        }
    }
}

/// Read and decode a file, picking the loader from its extension.
pub fn load_file(path: &Path) -> Result<String, LoadError> {
    let kind = DocumentKind::from_path(path)
        .ok_or_else(|| LoadError::Unsupported(path.display().to_string()))?;
    let bytes = std::fs::read(path).map_err(|reason| LoadError::Io {
        path: path.display().to_string(),
        reason,
    })?;
    kind.load(&bytes)
}

fn decode_utf8(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

fn extract_docx(bytes: &[u8]) -> Result<String, LoadError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| LoadError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| LoadError::Docx("word/document.xml not found".to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| LoadError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(LoadError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    extract_paragraph_text(&doc_xml)
}

/// Concatenate `w:t` runs, one line per `w:p` paragraph.
fn extract_paragraph_text(xml: &[u8]) -> Result<String, LoadError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(LoadError::Docx(e.to_string())),
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

    fn docx_bytes(document_xml: &str) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut cursor);
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(document_xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_kind_by_extension_and_mime() {
        assert_eq!(DocumentKind::from_extension("MD"), Some(DocumentKind::Markdown));
        assert_eq!(DocumentKind::from_extension("markdown"), Some(DocumentKind::Markdown));
        assert_eq!(DocumentKind::from_extension("pdf"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_extension("exe"), None);
        assert_eq!(
            DocumentKind::from_path(Path::new("/a/b/notes.txt")),
            Some(DocumentKind::PlainText)
        );
        assert_eq!(
            DocumentKind::from_mime("text/plain; charset=utf-8"),
            Some(DocumentKind::PlainText)
        );
        assert_eq!(DocumentKind::from_mime(MIME_DOCX), Some(DocumentKind::Docx));
        assert_eq!(DocumentKind::from_mime("image/png"), None);
    }

    #[test]
    fn test_plain_text_strips_bom() {
        let text = DocumentKind::PlainText.load(b"\xEF\xBB\xBFhello").unwrap();
        assert_eq!(text, "hello");
    }

    #[test]
    fn test_docx_paragraphs() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t xml:space="preserve"> world</w:t></w:r></w:p>
    <w:p><w:r><w:t>Fish &amp; chips</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let text = DocumentKind::Docx.load(&docx_bytes(xml)).unwrap();
        assert_eq!(text, "Hello world\nFish & chips");
    }

    #[test]
    fn test_invalid_binary_inputs_return_errors() {
        assert!(matches!(
            DocumentKind::Pdf.load(b"not a pdf"),
            Err(LoadError::Pdf(_))
        ));
        assert!(matches!(
            DocumentKind::Docx.load(b"not a zip"),
            Err(LoadError::Docx(_))
        ));
    }

    #[test]
    fn test_load_file_unsupported_extension() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("image.png");
        std::fs::write(&path, b"png").unwrap();
        assert!(matches!(load_file(&path), Err(LoadError::Unsupported(_))));

        let md = tmp.path().join("note.md");
        std::fs::write(&md, "# Title\nbody").unwrap();
        assert_eq!(load_file(&md).unwrap(), "# Title\nbody");
    }
}
