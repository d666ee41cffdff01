//! Learned-knowledge store: one `.txt` document per researched topic.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Map a free-form topic to a stable filename: every non-alphanumeric
/// character becomes `_`, the result is lowercased and suffixed `.txt`.
pub fn sanitize_topic(topic: &str) -> String {
    let mut name: String = topic
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    name.make_ascii_lowercase();
    name.push_str(".txt");
    name
}

pub struct KnowledgeStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl KnowledgeStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path_for(&self, topic: &str) -> PathBuf {
        self.dir.join(sanitize_topic(topic))
    }

    /// Write (or overwrite) the document for `topic`. The same topic always
    /// lands in the same file, so fresher research replaces stale content.
    pub async fn save(&self, topic: &str, content: &str) -> Result<PathBuf> {
        let _guard = self.write_lock.lock().await;
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.path_for(topic);
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_and_lowercases() {
        assert_eq!(
            sanitize_topic("Qual é a capital?"),
            "qual___a_capital_.txt"
        );
        assert_eq!(sanitize_topic("Rust 2024"), "rust_2024.txt");
        assert_eq!(sanitize_topic(""), ".txt");
    }

    #[tokio::test]
    async fn save_overwrites_same_topic() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = KnowledgeStore::new(tmp.path().join("learned"));
        let first = store.save("My Topic", "v1").await.unwrap();
        let second = store.save("MY TOPIC", "v2").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second.file_name().unwrap(), "my_topic.txt");
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "v2");
    }
}
