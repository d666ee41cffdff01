//! End-to-end pipeline behavior with stubbed providers.
//!
//! These tests drive [`Pipeline::resolve`] against real on-disk corpora and
//! cache files, replacing only the network-facing pieces: embeddings come
//! from a dictionary of pre-registered vectors, completions from a scripted
//! queue, and web search from a counting stub.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use oraculo::config::{
    CacheConfig, ChunkingConfig, Config, DataConfig, DbConfig, ProviderConfig, ServerConfig,
    WebConfig,
};
use oraculo::embedding::Embedder;
use oraculo::knowledge::{sanitize_topic, KnowledgeStore};
use oraculo::llm::LanguageModel;
use oraculo::models::{AnswerSource, CacheEntry, TokenUsage};
use oraculo::pipeline::Pipeline;
use oraculo::websearch::WebSearch;

// ============ Stub providers ============

/// Embeds only pre-registered texts; anything else is a test bug.
struct DictEmbedder {
    vectors: HashMap<String, Vec<f32>>,
}

impl DictEmbedder {
    fn new(entries: &[(&str, &[f32])]) -> Arc<Self> {
        Arc::new(Self {
            vectors: entries
                .iter()
                .map(|(text, v)| (text.to_string(), v.to_vec()))
                .collect(),
        })
    }
}

#[async_trait]
impl Embedder for DictEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                self.vectors
                    .get(t)
                    .unwrap_or_else(|| panic!("unexpected text embedded: {t:?}"))
                    .clone()
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "dict-test"
    }
}

/// Pops scripted responses in order; panics when the script runs dry.
struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedLlm {
    fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
        })
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("language model called more times than scripted"))
    }

    fn model_name(&self) -> &str {
        "scripted-test"
    }
}

/// Returns a fixed answer and counts how often it was consulted.
struct StubWeb {
    answer: String,
    calls: AtomicUsize,
}

impl StubWeb {
    fn new(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearch for StubWeb {
    async fn search(&self, _query: &str, usage: &mut TokenUsage) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        usage.add_input(10);
        usage.add_output(5);
        Ok(self.answer.clone())
    }
}

// ============ Fixture ============

fn test_config(root: &Path) -> Config {
    Config {
        db: DbConfig {
            path: root.join("users.db"),
        },
        data: DataConfig {
            cache_file: root.join("cache.json"),
            training_dir: root.join("training"),
            learned_dir: root.join("learned"),
        },
        chunking: ChunkingConfig::default(),
        cache: CacheConfig::default(),
        provider: ProviderConfig {
            name: "openai".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            embed_model: "text-embedding-3-small".to_string(),
            base_url: None,
            max_retries: 0,
            timeout_secs: 5,
        },
        web: WebConfig::default(),
        server: ServerConfig::default(),
    }
}

fn setup_dirs(config: &Config) {
    std::fs::create_dir_all(&config.data.training_dir).unwrap();
    std::fs::create_dir_all(&config.data.learned_dir).unwrap();
    std::fs::write(&config.data.cache_file, "[]").unwrap();
}

fn read_cache(config: &Config) -> Vec<CacheEntry> {
    let raw = std::fs::read_to_string(&config.data.cache_file).unwrap();
    serde_json::from_str(&raw).unwrap()
}

fn build_pipeline(
    config: &Config,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LanguageModel>,
    web: Arc<dyn WebSearch>,
) -> Pipeline {
    let knowledge = Arc::new(KnowledgeStore::new(&config.data.learned_dir));
    Pipeline::new(embedder, llm, web, knowledge, config)
}

// ============ Tests ============

#[tokio::test]
async fn cache_hit_short_circuits_everything() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path());
    setup_dirs(&config);
    std::fs::write(
        &config.data.cache_file,
        serde_json::to_string(&vec![CacheEntry {
            question: "qual a capital da frança".to_string(),
            answer: "Paris".to_string(),
        }])
        .unwrap(),
    )
    .unwrap();

    let embedder = DictEmbedder::new(&[("qual a capital da frança", &[1.0, 0.0])]);
    let llm = ScriptedLlm::new(&[]);
    let web = StubWeb::new("unreached");
    let pipeline = build_pipeline(&config, embedder, llm, web.clone());

    let resolution = pipeline.resolve("qual a capital da frança").await.unwrap();
    assert_eq!(resolution.answer, "Paris");
    assert_eq!(resolution.source, AnswerSource::Cache);
    assert_eq!(resolution.token_usage.total, 0);
    assert_eq!(web.call_count(), 0);
    // A hit must not re-append the entry.
    assert_eq!(read_cache(&config).len(), 1);
}

#[tokio::test]
async fn second_ask_of_same_question_hits_cache() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path());
    setup_dirs(&config);

    let embedder = DictEmbedder::new(&[("qual a capital da frança", &[1.0, 0.0])]);
    let llm = ScriptedLlm::new(&[]);
    let web = StubWeb::new("Paris");
    let pipeline = build_pipeline(&config, embedder, llm, web.clone());

    let first = pipeline.resolve("qual a capital da frança").await.unwrap();
    assert_eq!(first.source, AnswerSource::Web);

    let second = pipeline.resolve("qual a capital da frança").await.unwrap();
    assert_eq!(second.source, AnswerSource::Cache);
    assert_eq!(second.answer, first.answer);
    // The web was consulted exactly once across both asks.
    assert_eq!(web.call_count(), 1);
    assert_eq!(read_cache(&config).len(), 1);
}

#[tokio::test]
async fn below_threshold_is_a_miss() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path());
    setup_dirs(&config);
    std::fs::write(
        &config.data.cache_file,
        serde_json::to_string(&vec![CacheEntry {
            question: "pergunta antiga".to_string(),
            answer: "resposta antiga".to_string(),
        }])
        .unwrap(),
    )
    .unwrap();

    // Cosine similarity 0.89, just under the 0.9 gate.
    let embedder = DictEmbedder::new(&[
        ("pergunta antiga", &[1.0, 0.0]),
        ("pergunta nova", &[0.89, 0.456]),
    ]);
    let llm = ScriptedLlm::new(&[]);
    let web = StubWeb::new("resposta da web");
    let pipeline = build_pipeline(&config, embedder, llm, web.clone());

    let resolution = pipeline.resolve("pergunta nova").await.unwrap();
    assert_eq!(resolution.source, AnswerSource::Web);
    assert_eq!(web.call_count(), 1);
}

#[tokio::test]
async fn training_answer_is_confirmed_and_cached() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path());
    setup_dirs(&config);
    let doc = "A capital da França é Paris.";
    std::fs::write(config.data.training_dir.join("geo.txt"), doc).unwrap();

    let embedder = DictEmbedder::new(&[
        ("qual a capital da frança", &[1.0, 0.0]),
        (doc, &[0.9, 0.1]),
    ]);
    let llm = ScriptedLlm::new(&["Paris é a capital da França."]);
    let web = StubWeb::new("unreached");
    let pipeline = build_pipeline(&config, embedder, llm, web.clone());

    let resolution = pipeline.resolve("qual a capital da frança").await.unwrap();
    assert_eq!(resolution.answer, "Paris é a capital da França.");
    assert_eq!(resolution.source, AnswerSource::Training);
    assert_eq!(web.call_count(), 0);
    assert!(resolution.token_usage.input > 0);
    assert!(resolution.token_usage.output > 0);

    let cache = read_cache(&config);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache[0].answer, "Paris é a capital da França.");
}

#[tokio::test]
async fn not_found_sentinel_falls_through_to_web() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path());
    setup_dirs(&config);
    let doc = "Documento sobre outro assunto.";
    std::fs::write(config.data.training_dir.join("outro.txt"), doc).unwrap();

    let embedder = DictEmbedder::new(&[
        ("qual a capital da frança", &[1.0, 0.0]),
        (doc, &[0.0, 1.0]),
    ]);
    // Confirmation declines; learned corpus is empty so the web answer wins.
    let llm = ScriptedLlm::new(&["NOT_FOUND"]);
    let web = StubWeb::new("Paris, segundo a web.");
    let pipeline = build_pipeline(&config, embedder, llm, web.clone());

    let resolution = pipeline.resolve("qual a capital da frança").await.unwrap();
    assert_eq!(resolution.answer, "Paris, segundo a web.");
    assert_eq!(resolution.source, AnswerSource::Web);
    assert_eq!(web.call_count(), 1);

    let cache = read_cache(&config);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache[0].answer, "Paris, segundo a web.");
}

#[tokio::test]
async fn arbitration_disagreement_overwrites_learned_with_web_answer() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path());
    setup_dirs(&config);
    let question = "quem venceu a copa";
    let learned_content = "O Brasil venceu a copa de 2002.";
    std::fs::write(
        config.data.learned_dir.join("copa.txt"),
        learned_content,
    )
    .unwrap();

    let embedder = DictEmbedder::new(&[
        (question, &[1.0, 0.0]),
        (learned_content, &[0.8, 0.2]),
    ]);
    let llm = ScriptedLlm::new(&["A Argentina venceu a copa de 2022."]);
    let web = StubWeb::new("A Argentina venceu em 2022.");
    let pipeline = build_pipeline(&config, embedder, llm, web.clone());

    let resolution = pipeline.resolve(question).await.unwrap();
    assert_eq!(resolution.answer, "A Argentina venceu a copa de 2022.");
    assert_eq!(resolution.source, AnswerSource::Compared);

    // The user saw the arbitrated answer but the learned corpus gets the
    // raw web answer.
    let updated = config.data.learned_dir.join(sanitize_topic(question));
    assert_eq!(
        std::fs::read_to_string(updated).unwrap(),
        "A Argentina venceu em 2022."
    );

    let cache = read_cache(&config);
    assert_eq!(cache[0].answer, "A Argentina venceu a copa de 2022.");
}

#[tokio::test]
async fn arbitration_agreement_leaves_learned_untouched() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path());
    setup_dirs(&config);
    let question = "quem venceu a copa";
    let learned_content = "O Brasil venceu a copa de 2002.";
    std::fs::write(
        config.data.learned_dir.join("copa.txt"),
        learned_content,
    )
    .unwrap();

    let embedder = DictEmbedder::new(&[
        (question, &[1.0, 0.0]),
        (learned_content, &[0.8, 0.2]),
    ]);
    // The arbitrated answer echoes the retrieved chunk verbatim.
    let learned_text = format!("copa.txt: {learned_content}");
    let llm = ScriptedLlm::new(&[learned_text.as_str()]);
    let web = StubWeb::new("conteúdo da web");
    let pipeline = build_pipeline(&config, embedder, llm, web);

    let resolution = pipeline.resolve(question).await.unwrap();
    assert_eq!(resolution.source, AnswerSource::Compared);
    assert_eq!(resolution.answer, learned_text);

    let files: Vec<_> = std::fs::read_dir(&config.data.learned_dir)
        .unwrap()
        .collect();
    assert_eq!(files.len(), 1);
    assert_eq!(
        std::fs::read_to_string(config.data.learned_dir.join("copa.txt")).unwrap(),
        learned_content
    );
}

#[tokio::test]
async fn token_usage_is_per_request() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path());
    setup_dirs(&config);

    let embedder = DictEmbedder::new(&[
        ("primeira pergunta", &[1.0, 0.0]),
        ("segunda pergunta", &[0.0, 1.0]),
    ]);
    let llm = ScriptedLlm::new(&[]);
    let web = StubWeb::new("resposta");
    let pipeline = build_pipeline(&config, embedder, llm, web);

    let first = pipeline.resolve("primeira pergunta").await.unwrap();
    let second = pipeline.resolve("segunda pergunta").await.unwrap();
    assert!(first.token_usage.total > 0);
    // Counters never leak across requests.
    assert_eq!(first.token_usage, second.token_usage);
}
