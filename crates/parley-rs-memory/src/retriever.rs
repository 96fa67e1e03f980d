//! Memory retriever interface and the JSONL-backed lexical retriever.

use crate::error::MemoryError;
use crate::model::MemoryRecord;
use async_trait::async_trait;
use log::{debug, info};
use parley_rs_protocol::{MemoryId, MemoryMatch};
use regex::Regex;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static TERM_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\w+").ok());
static MEMORY_ID_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").ok());

/// Options for a retrieval call.
#[derive(Debug, Clone, Copy)]
pub struct RecallOptions {
    /// Maximum number of matches returned.
    pub limit: usize,
    /// Matches scoring below this are dropped.
    pub min_score: Option<f32>,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self {
            limit: 5,
            min_score: None,
        }
    }
}

#[async_trait]
/// Memory collaborator consulted during context assembly.
pub trait MemoryRetriever: Send + Sync {
    /// Return the snippets of `memory_ids` most relevant to `query`, best first.
    async fn retrieve(
        &self,
        user_id: &str,
        memory_ids: &[MemoryId],
        query: &str,
        options: RecallOptions,
    ) -> Result<Vec<MemoryMatch>, MemoryError>;
}

/// File-backed retriever storing one JSONL file per memory collection.
///
/// Scoring is the fraction of query terms present in a snippet. It stands in
/// for embedding search in local deployments and tests.
#[derive(Debug, Clone)]
pub struct FileMemoryRetriever {
    root: PathBuf,
}

impl FileMemoryRetriever {
    /// Create a retriever under the given root directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        info!("initialized file memory retriever (root={})", root.display());
        Ok(Self { root })
    }

    /// Append a record to its collection.
    pub fn store(&self, record: &MemoryRecord) -> Result<(), MemoryError> {
        let path = self.collection_path(&record.memory_id)?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        debug!(
            "stored memory record (memory_id={}, content_len={})",
            record.memory_id,
            record.content.len()
        );
        Ok(())
    }

    fn collection_path(&self, memory_id: &str) -> Result<PathBuf, MemoryError> {
        let valid = MEMORY_ID_PATTERN
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(memory_id));
        if !valid {
            return Err(MemoryError::InvalidMemoryId(memory_id.to_string()));
        }
        Ok(self.root.join(format!("{memory_id}.jsonl")))
    }

    fn load_collection(&self, memory_id: &str) -> Result<Vec<MemoryRecord>, MemoryError> {
        let path = self.collection_path(memory_id)?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(OpenOptions::new().read(true).open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl MemoryRetriever for FileMemoryRetriever {
    async fn retrieve(
        &self,
        user_id: &str,
        memory_ids: &[MemoryId],
        query: &str,
        options: RecallOptions,
    ) -> Result<Vec<MemoryMatch>, MemoryError> {
        let query_terms = terms(query);
        let mut matches = Vec::new();
        for memory_id in memory_ids {
            for record in self.load_collection(memory_id)? {
                // Collections owned by someone else are invisible.
                if record.user_id != user_id {
                    continue;
                }
                let score = overlap_score(&query_terms, &record.content);
                if score <= 0.0 || options.min_score.is_some_and(|min| score < min) {
                    continue;
                }
                matches.push(MemoryMatch {
                    content: record.content,
                    score,
                    source_id: record.memory_id,
                });
            }
        }
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(options.limit);
        debug!(
            "retrieved memory (collections={}, returned={})",
            memory_ids.len(),
            matches.len()
        );
        Ok(matches)
    }
}

fn terms(text: &str) -> HashSet<String> {
    let Some(pattern) = TERM_PATTERN.as_ref() else {
        return HashSet::new();
    };
    pattern
        .find_iter(text)
        .map(|term| term.as_str().to_lowercase())
        .collect()
}

fn overlap_score(query_terms: &HashSet<String>, content: &str) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let content_terms = terms(content);
    let shared = query_terms.intersection(&content_terms).count();
    shared as f32 / query_terms.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[tokio::test]
    async fn retrieves_best_matches_for_owner() {
        let temp = tempdir().expect("tempdir");
        let retriever = FileMemoryRetriever::new(temp.path()).expect("retriever");
        retriever
            .store(&MemoryRecord::new("notes", "u1", "Rust uses ownership"))
            .expect("store");
        retriever
            .store(&MemoryRecord::new("notes", "u1", "Ownership and borrowing in Rust"))
            .expect("store");
        retriever
            .store(&MemoryRecord::new("notes", "u1", "Unrelated gardening tips"))
            .expect("store");
        retriever
            .store(&MemoryRecord::new("notes", "u2", "Rust borrowing secrets"))
            .expect("store");

        let matches = retriever
            .retrieve(
                "u1",
                &["notes".to_string()],
                "rust borrowing",
                RecallOptions::default(),
            )
            .await
            .expect("retrieve");
        let contents: Vec<_> = matches.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["Ownership and borrowing in Rust", "Rust uses ownership"]
        );
        assert_eq!(matches[0].score, 1.0);
    }

    #[tokio::test]
    async fn limit_and_min_score_filter() {
        let temp = tempdir().expect("tempdir");
        let retriever = FileMemoryRetriever::new(temp.path()).expect("retriever");
        for content in ["alpha beta", "alpha", "beta"] {
            retriever
                .store(&MemoryRecord::new("m", "u1", content))
                .expect("store");
        }
        let options = RecallOptions {
            limit: 1,
            min_score: Some(0.75),
        };
        let matches = retriever
            .retrieve("u1", &["m".to_string()], "alpha beta", options)
            .await
            .expect("retrieve");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].content, "alpha beta");
    }

    #[tokio::test]
    async fn rejects_path_like_memory_ids() {
        let temp = tempdir().expect("tempdir");
        let retriever = FileMemoryRetriever::new(temp.path()).expect("retriever");
        let err = retriever
            .retrieve(
                "u1",
                &["../etc".to_string()],
                "q",
                RecallOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidMemoryId(_)));
    }
}
