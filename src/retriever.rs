//! Document retrieval over the on-disk corpora.
//!
//! A corpus is a flat directory of `.txt` files (`training` or `learned`).
//! Retrieval splits every document into overlapping chunks, embeds them,
//! and returns the single most similar chunk prefixed with its source
//! filename. There is no similarity threshold at this layer — the pipeline
//! applies its own semantic gate (LLM confirmation) where it matters.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use crate::chunk::chunk_document;
use crate::embedding::{best_match, Embedder};
use crate::extract;

/// Which corpus a search targets. The training corpus additionally gets
/// binary documents (PDF/EPUB) extracted to sibling `.txt` files before
/// listing, at most once per source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corpus {
    Training,
    Learned,
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    chunk_size: usize,
    overlap: usize,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, chunk_size: usize, overlap: usize) -> Self {
        Self {
            embedder,
            chunk_size,
            overlap,
        }
    }

    /// Return the best-matching chunk as `"{file}: {text}"`, or `None` when
    /// the directory is absent or holds no text documents.
    pub async fn search(
        &self,
        query: &str,
        dir: &Path,
        corpus: Corpus,
    ) -> Result<Option<String>> {
        if corpus == Corpus::Training {
            prepare_binary_documents(dir);
        }

        let documents = load_text_documents(dir)?;
        if documents.is_empty() {
            return Ok(None);
        }

        let mut chunks = Vec::new();
        for (file, content) in &documents {
            chunks.extend(chunk_document(file, content, self.chunk_size, self.overlap));
        }
        if chunks.is_empty() {
            return Ok(None);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let chunk_vecs = self.embedder.embed_batch(&texts).await?;
        let query_vec = self.embedder.embed_one(query).await?;

        let best = match best_match(&query_vec, &chunk_vecs) {
            Some((idx, _)) => &chunks[idx],
            None => return Ok(None),
        };

        Ok(Some(format!("{}: {}", best.source_file, best.text)))
    }
}

/// Read every `.txt` file in `dir`, sorted by filename for determinism.
///
/// A missing directory means "no documents", not an error.
fn load_text_documents(dir: &Path) -> Result<Vec<(String, String)>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut documents = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let content = std::fs::read_to_string(&path)?;
        documents.push((name, content));
    }

    documents.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(documents)
}

/// Extract sibling `.txt` files from any PDF/EPUB that lacks one.
///
/// Extraction failures are logged and skipped; a corrupt document never
/// blocks a query. A missing directory is ignored.
fn prepare_binary_documents(dir: &Path) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_ascii_lowercase(),
            None => continue,
        };
        if ext != "pdf" && ext != "epub" {
            continue;
        }

        let txt_path = path.with_extension("txt");
        if txt_path.exists() {
            continue;
        }

        eprintln!("extracting text from {}", path.display());
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("failed to read {}: {}", path.display(), e);
                continue;
            }
        };

        let extracted = match ext.as_str() {
            "pdf" => extract::extract_pdf(&bytes),
            _ => extract::extract_epub(&bytes),
        };

        match extracted {
            Ok(text) => {
                if let Err(e) = std::fs::write(&txt_path, &text) {
                    eprintln!("failed to write {}: {}", txt_path.display(), e);
                }
            }
            Err(e) => eprintln!("skipping {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_dir_yields_no_documents() {
        let docs = load_text_documents(Path::new("/nonexistent/corpus")).unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn only_txt_files_are_loaded_sorted() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("b.txt"), "bee").unwrap();
        std::fs::write(tmp.path().join("a.txt"), "ay").unwrap();
        std::fs::write(tmp.path().join("notes.md"), "skip me").unwrap();

        let docs = load_text_documents(tmp.path()).unwrap();
        let names: Vec<&str> = docs.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn epub_gets_sibling_txt_once() {
        let tmp = tempfile::TempDir::new().unwrap();
        let epub_path = tmp.path().join("book.epub");

        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("ch1.xhtml", options).unwrap();
            writer
                .write_all(b"<html><body><p>epub body text</p></body></html>")
                .unwrap();
            writer.finish().unwrap();
        }
        std::fs::write(&epub_path, &buf).unwrap();

        prepare_binary_documents(tmp.path());
        let txt_path = tmp.path().join("book.txt");
        let first = std::fs::read_to_string(&txt_path).unwrap();
        assert!(first.contains("epub body text"));

        // Second pass must not re-extract: overwrite the sibling and check
        // it survives.
        std::fs::write(&txt_path, "edited by hand").unwrap();
        prepare_binary_documents(tmp.path());
        assert_eq!(std::fs::read_to_string(&txt_path).unwrap(), "edited by hand");
    }

    /// Minimal valid PDF with one page of Helvetica text. Builds the body
    /// then the xref with correct byte offsets so pdf-extract can parse it.
    fn minimal_pdf(phrase: &str) -> Vec<u8> {
        let stream = format!("BT /F1 12 Tf 100 700 Td ({phrase}) Tj ET\n");
        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n");
        let o1 = out.len();
        out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
        let o2 = out.len();
        out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
        let o3 = out.len();
        out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
        let o4 = out.len();
        out.extend_from_slice(
            format!("4 0 obj << /Length {} >> stream\n{}endstream endobj\n", stream.len(), stream)
                .as_bytes(),
        );
        let o5 = out.len();
        out.extend_from_slice(
            b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
        );
        let xref_start = out.len();
        out.extend_from_slice(b"xref\n0 6\n");
        for offset in [0, o1, o2, o3, o4, o5] {
            let kind = if offset == 0 { "65535 f" } else { "00000 n" };
            out.extend_from_slice(format!("{offset:010} {kind} \n").as_bytes());
        }
        out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
        out.extend_from_slice(format!("{xref_start}\n").as_bytes());
        out.extend_from_slice(b"%%EOF\n");
        out
    }

    #[test]
    fn pdf_gets_sibling_txt_once() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pdf_path = tmp.path().join("notes.pdf");
        std::fs::write(&pdf_path, minimal_pdf("pdf body text")).unwrap();

        prepare_binary_documents(tmp.path());
        let txt_path = tmp.path().join("notes.txt");
        assert!(txt_path.exists(), "extraction should produce a sibling .txt");

        // Second pass must not re-extract: overwrite the sibling and check
        // it survives.
        std::fs::write(&txt_path, "edited by hand").unwrap();
        prepare_binary_documents(tmp.path());
        assert_eq!(std::fs::read_to_string(&txt_path).unwrap(), "edited by hand");
    }

    #[test]
    fn corrupt_binary_is_skipped() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("bad.pdf"), b"not a pdf").unwrap();
        prepare_binary_documents(tmp.path());
        assert!(!tmp.path().join("bad.txt").exists());
    }
}
