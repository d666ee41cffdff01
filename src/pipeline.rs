//! Answer-resolution pipeline.
//!
//! Stages run in a fixed order and the first conclusive one wins:
//!
//! | Stage                 | Source label  |
//! |-----------------------|---------------|
//! | cache lookup          | `Cache`       |
//! | training corpus + LLM | `Treinamento` |
//! | learned vs web        | `Comparado`   |
//! | web only              | `Web`         |
//!
//! Every resolution carries the token usage it accrued, counted per
//! request so concurrent questions never mix their totals.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::AnswerCache;
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::knowledge::KnowledgeStore;
use crate::llm::{create_language_model, invoke, LanguageModel};
use crate::models::{AnswerSource, Resolution, TokenUsage};
use crate::retriever::{Corpus, Retriever};
use crate::websearch::{DuckDuckGo, WebSearch};

/// Sentinel the confirmation prompt demands when the retrieved chunk does
/// not actually answer the question.
const NOT_FOUND: &str = "NOT_FOUND";

pub struct Pipeline {
    llm: Arc<dyn LanguageModel>,
    web: Arc<dyn WebSearch>,
    retriever: Retriever,
    cache: AnswerCache,
    knowledge: Arc<KnowledgeStore>,
    training_dir: PathBuf,
    learned_dir: PathBuf,
}

impl Pipeline {
    /// Wire the full production stack from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.provider)?;
        let llm = create_language_model(&config.provider)?;
        let knowledge = Arc::new(KnowledgeStore::new(&config.data.learned_dir));
        let web = Arc::new(DuckDuckGo::new(
            Arc::clone(&llm),
            Arc::clone(&knowledge),
            config.web.search_url.clone(),
            config.web.user_agent.clone(),
            config.web.max_results,
            config.provider.timeout_secs,
        )?);
        Ok(Self::new(embedder, llm, web, knowledge, config))
    }

    /// Assemble from parts. Tests inject stub providers here.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
        web: Arc<dyn WebSearch>,
        knowledge: Arc<KnowledgeStore>,
        config: &Config,
    ) -> Self {
        let retriever = Retriever::new(
            Arc::clone(&embedder),
            config.chunking.chunk_size,
            config.chunking.overlap,
        );
        let cache = AnswerCache::new(
            &config.data.cache_file,
            config.cache.similarity_threshold,
            config.cache.max_embedded,
            Arc::clone(&embedder),
        );
        Self {
            llm,
            web,
            retriever,
            cache,
            knowledge,
            training_dir: config.data.training_dir.clone(),
            learned_dir: config.data.learned_dir.clone(),
        }
    }

    /// Resolve a question through the staged pipeline.
    pub async fn resolve(&self, question: &str) -> Result<Resolution> {
        let mut usage = TokenUsage::default();

        // Stage 0: cache. A hit is returned as-is and not re-appended.
        if let Some(answer) = self.cache.lookup(question).await? {
            eprintln!("answer found in cache");
            return Ok(Resolution {
                answer,
                source: AnswerSource::Cache,
                token_usage: usage,
            });
        }

        // Stage 1: training corpus, gated by an LLM confirmation that the
        // retrieved chunk really answers the question.
        if let Some(answer) = self.search_training(question, &mut usage).await? {
            eprintln!("answer found in training data");
            self.cache.append(question, &answer).await?;
            return Ok(Resolution {
                answer,
                source: AnswerSource::Training,
                token_usage: usage,
            });
        }

        // Stages 2 and 3 both need the web answer.
        let learned = self
            .retriever
            .search(question, &self.learned_dir, Corpus::Learned)
            .await?;
        let web_answer = self.web.search(question, &mut usage).await?;

        if let Some(learned_text) = learned {
            eprintln!("answer found in learned data, verifying against the web");
            let prompt = arbitration_prompt(question, &learned_text, &web_answer);
            let final_answer = invoke(self.llm.as_ref(), &prompt, &mut usage).await?;

            // The user gets the arbitrated answer; the learned corpus gets
            // the web answer whenever the arbitration moved away from the
            // stored text.
            if final_answer != learned_text {
                eprintln!("web search superseded learned data, updating");
                if let Err(e) = self.knowledge.save(question, &web_answer).await {
                    eprintln!("failed to update learned document: {e}");
                }
            }

            self.cache.append(question, &final_answer).await?;
            return Ok(Resolution {
                answer: final_answer,
                source: AnswerSource::Compared,
                token_usage: usage,
            });
        }

        eprintln!("no local answer, returning web result");
        self.cache.append(question, &web_answer).await?;
        Ok(Resolution {
            answer: web_answer,
            source: AnswerSource::Web,
            token_usage: usage,
        })
    }

    async fn search_training(
        &self,
        question: &str,
        usage: &mut TokenUsage,
    ) -> Result<Option<String>> {
        let chunk = match self
            .retriever
            .search(question, &self.training_dir, Corpus::Training)
            .await?
        {
            Some(chunk) => chunk,
            None => return Ok(None),
        };

        let prompt = confirmation_prompt(question, &chunk);
        let answer = invoke(self.llm.as_ref(), &prompt, usage).await?;
        if answer.trim() == NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(answer))
    }
}

fn confirmation_prompt(question: &str, chunk: &str) -> String {
    format!(
        "Baseado exclusivamente no texto a seguir, responda à pergunta.\n\
         Se a resposta não estiver contida no texto, responda EXATAMENTE 'NOT_FOUND'.\n\
         Texto: {chunk}\n\
         Pergunta: {question}\n\
         Resposta em português:"
    )
}

fn arbitration_prompt(question: &str, learned: &str, web: &str) -> String {
    format!(
        "Você é um assistente de verificação de fatos. Compare a informação da \
         \"Base de Dados Local\" com a da \"Busca na Web\" para a pergunta: \"{question}\".\n\n\
         Base de Dados Local: \"{learned}\"\n\
         Busca na Web: \"{web}\"\n\n\
         Analise as duas fontes. Se elas forem consistentes ou a busca na web não for \
         conclusiva, responda com a informação da Base de Dados Local. Se a Busca na Web \
         tiver uma informação claramente mais atualizada ou correta, responda com a \
         informação da Busca na Web. Seja conciso e direto na sua resposta final em português."
    )
}
