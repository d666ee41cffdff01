//! Question/answer cache backed by a single JSON file.
//!
//! The cache is a flat array of `{question, answer}` entries. Lookup embeds
//! the cached questions plus the incoming one and accepts the best match
//! only when its cosine similarity is strictly above the configured
//! threshold. Appends re-read the file under a lock so concurrent writers
//! never clobber each other within one process.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::embedding::{best_match, Embedder};
use crate::models::CacheEntry;

pub struct AnswerCache {
    path: PathBuf,
    threshold: f32,
    max_embedded: Option<usize>,
    embedder: Arc<dyn Embedder>,
    write_lock: Mutex<()>,
}

impl AnswerCache {
    pub fn new(
        path: impl Into<PathBuf>,
        threshold: f32,
        max_embedded: Option<usize>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            path: path.into(),
            threshold,
            max_embedded,
            embedder,
            write_lock: Mutex::new(()),
        }
    }

    /// Return the cached answer whose question is most similar to `query`,
    /// if that similarity exceeds the threshold.
    pub async fn lookup(&self, query: &str) -> Result<Option<String>> {
        let entries = read_entries(&self.path)?;
        if entries.is_empty() {
            return Ok(None);
        }

        // Only the most recent entries are embedded when a cap is set.
        let window: &[CacheEntry] = match self.max_embedded {
            Some(cap) if entries.len() > cap => &entries[entries.len() - cap..],
            _ => &entries,
        };

        let questions: Vec<String> = window.iter().map(|e| e.question.clone()).collect();
        let vectors = self.embedder.embed_batch(&questions).await?;
        let query_vec = self.embedder.embed_one(query).await?;

        match best_match(&query_vec, &vectors) {
            Some((idx, score)) if score > self.threshold => {
                Ok(Some(window[idx].answer.clone()))
            }
            _ => Ok(None),
        }
    }

    /// Append an entry, preserving everything already on disk.
    pub async fn append(&self, question: &str, answer: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = read_entries(&self.path)?;
        entries.push(CacheEntry {
            question: question.to_string(),
            answer: answer.to_string(),
        });
        let json = serde_json::to_string_pretty(&entries)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("failed to write cache file {}", self.path.display()))?;
        Ok(())
    }
}

/// A missing file is an empty cache; a malformed one is an error the
/// operator needs to see, not silently discard.
fn read_entries(path: &Path) -> Result<Vec<CacheEntry>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read cache file {}", path.display()))
        }
    };
    serde_json::from_str(&raw)
        .with_context(|| format!("malformed cache file {}", path.display()))
}
