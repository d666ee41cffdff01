//! Core data types that flow through the resolution pipeline.

use serde::{Deserialize, Serialize};

/// A single prior question/answer pair persisted in the cache file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub question: String,
    pub answer: String,
}

/// Approximate token counts for one pipeline run.
///
/// Created fresh per request and threaded through every model invocation;
/// never process-global.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

impl TokenUsage {
    pub fn add_input(&mut self, tokens: u64) {
        self.input += tokens;
        self.total = self.input + self.output;
    }

    pub fn add_output(&mut self, tokens: u64) {
        self.output += tokens;
        self.total = self.input + self.output;
    }
}

/// Which path of the pipeline produced the final answer.
///
/// The wire values are the product's original labels and are part of the
/// API contract consumed by the chat frontend.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum AnswerSource {
    #[serde(rename = "Cache")]
    Cache,
    #[serde(rename = "Treinamento")]
    Training,
    #[serde(rename = "Web")]
    Web,
    #[serde(rename = "Comparado")]
    Compared,
}

impl std::fmt::Display for AnswerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AnswerSource::Cache => "Cache",
            AnswerSource::Training => "Treinamento",
            AnswerSource::Web => "Web",
            AnswerSource::Compared => "Comparado",
        };
        write!(f, "{}", label)
    }
}

/// The terminal result of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub answer: String,
    pub source: AnswerSource,
    pub token_usage: TokenUsage,
}

/// A bounded window of a corpus document, the unit of embedding and
/// similarity search. Derived transiently per query, never persisted.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    pub text: String,
    pub source_file: String,
}
