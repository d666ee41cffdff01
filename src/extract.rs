//! Text extraction for binary training documents (PDF, EPUB).
//!
//! The training corpus may contain PDF or EPUB files alongside plain text.
//! This module turns their bytes into UTF-8 text; the retriever caches the
//! result as a sibling `.txt` so extraction runs at most once per source
//! document.

use std::io::Read;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extraction error. Callers log and skip the offending file; a bad
/// document never aborts a query.
#[derive(Debug)]
pub enum ExtractError {
    Pdf(String),
    Epub(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Epub(e) => write!(f, "EPUB extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

pub fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Extract the text of all XHTML content documents in an EPUB archive.
///
/// EPUB is a ZIP of XHTML files; entries are walked in lexical order, which
/// matches the spine numbering used by every mainstream packaging tool.
pub fn extract_epub(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Epub(e.to_string()))?;

    let mut content_names: Vec<String> = archive
        .file_names()
        .filter(|n| {
            n.ends_with(".xhtml") || n.ends_with(".html") || n.ends_with(".htm")
        })
        .map(|s| s.to_string())
        .collect();
    content_names.sort();

    if content_names.is_empty() {
        return Err(ExtractError::Epub(
            "no XHTML content documents found".to_string(),
        ));
    }

    let mut out = String::new();
    for name in content_names {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let text = extract_xhtml_text(&xml)?;
        if !out.is_empty() && !text.is_empty() {
            out.push('\n');
        }
        out.push_str(&text);
    }
    Ok(out)
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Epub(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Epub(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Epub(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

/// Collect text events from an XHTML document, skipping script and style.
fn extract_xhtml_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    reader.config_mut().check_end_names = false;
    let mut buf = Vec::new();
    let mut skip_depth = 0usize;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"script" || name.as_ref() == b"style" {
                    skip_depth += 1;
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                let name = e.local_name();
                if (name.as_ref() == b"script" || name.as_ref() == b"style") && skip_depth > 0 {
                    skip_depth -= 1;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if skip_depth == 0 => {
                let text = te.unescape().unwrap_or_default();
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(trimmed);
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Epub(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
