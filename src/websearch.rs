//! Web research via DuckDuckGo's HTML endpoint.
//!
//! The flow mirrors what a human would do: run the query, open the first
//! few result links, read the pages, then have the language model write a
//! short answer from the combined text. The raw answer is persisted to the
//! learned corpus so the next question on the topic can skip the web.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use std::time::Duration;

use crate::knowledge::KnowledgeStore;
use crate::llm::{invoke, LanguageModel};
use crate::models::TokenUsage;

/// Returned verbatim when the search page yields no result links.
pub const NO_RESULTS: &str =
    "Não foram encontrados resultados de pesquisa para a sua pergunta.";

/// Returned verbatim when result links exist but no page yields text.
pub const NO_CONTENT: &str =
    "Não foi possível extrair conteúdo das páginas encontradas.";

const SUMMARY_PROMPT: &str =
    "Com base nos textos extraídos da web a seguir, forneça uma resposta concisa para a pergunta.";

#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Research `query` on the web and return a synthesized answer.
    async fn search(&self, query: &str, usage: &mut TokenUsage) -> Result<String>;
}

pub struct DuckDuckGo {
    client: reqwest::Client,
    llm: Arc<dyn LanguageModel>,
    knowledge: Arc<KnowledgeStore>,
    search_url: String,
    max_results: usize,
}

impl DuckDuckGo {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        knowledge: Arc<KnowledgeStore>,
        search_url: String,
        user_agent: String,
        max_results: usize,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            llm,
            knowledge,
            search_url,
            max_results,
        })
    }
}

#[async_trait]
impl WebSearch for DuckDuckGo {
    async fn search(&self, query: &str, usage: &mut TokenUsage) -> Result<String> {
        let url = Url::parse_with_params(&self.search_url, &[("q", query)])
            .context("invalid search url")?;
        let html = self
            .client
            .get(url)
            .send()
            .await
            .context("search request failed")?
            .text()
            .await
            .context("failed to read search response")?;

        let urls = extract_result_urls(&html, &self.search_url, self.max_results);
        if urls.is_empty() {
            return Ok(NO_RESULTS.to_string());
        }

        let mut combined = String::new();
        for url in &urls {
            eprintln!("fetching {url}");
            let page = match self.client.get(url.clone()).send().await {
                Ok(resp) => match resp.text().await {
                    Ok(body) => body,
                    Err(e) => {
                        eprintln!("failed to read {url}: {e}");
                        continue;
                    }
                },
                Err(e) => {
                    eprintln!("failed to fetch {url}: {e}");
                    continue;
                }
            };
            let text = html_to_text(&page);
            if text.is_empty() {
                continue;
            }
            combined.push_str(&format!("\n\n--- Content from {url} ---\n{text}"));
        }

        if combined.is_empty() {
            return Ok(NO_CONTENT.to_string());
        }

        let prompt = format!(
            "{SUMMARY_PROMPT}\n\nTextos Extraídos:{combined}\n\nPergunta: {query}\n\nResposta em português:"
        );
        let answer = invoke(self.llm.as_ref(), &prompt, usage).await?;

        if let Err(e) = self.knowledge.save(query, &answer).await {
            eprintln!("failed to persist learned document: {e}");
        }

        Ok(answer)
    }
}

/// Pull result links out of a DuckDuckGo HTML results page.
///
/// Links carry the `a.result__a` class and usually wrap the destination in
/// a `uddg` redirect parameter, which is unwrapped here. Relative hrefs are
/// resolved against the search endpoint.
pub fn extract_result_urls(html: &str, base: &str, max: usize) -> Vec<Url> {
    let document = Html::parse_document(html);
    let selector = match Selector::parse("a.result__a") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let base_url = Url::parse(base).ok();

    let mut urls = Vec::new();
    for element in document.select(&selector) {
        if urls.len() >= max {
            break;
        }
        let href = match element.value().attr("href") {
            Some(href) => href,
            None => continue,
        };
        let resolved = match Url::parse(href) {
            Ok(url) => url,
            Err(_) => match base_url.as_ref().and_then(|b| b.join(href).ok()) {
                Some(url) => url,
                None => continue,
            },
        };
        let target = resolved
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .and_then(|(_, v)| Url::parse(&v).ok())
            .unwrap_or(resolved);
        urls.push(target);
    }
    urls
}

/// Collapse a page's body to whitespace-normalized plain text.
///
/// Script and style subtrees carry no readable content and would bloat the
/// summarization prompt, so they are excluded from the walk.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let selector = match Selector::parse("body") {
        Ok(s) => s,
        Err(_) => return String::new(),
    };
    let mut parts = Vec::new();
    for body in document.select(&selector) {
        collect_readable_text(body, &mut parts);
    }
    parts.join(" ")
}

fn collect_readable_text(element: ElementRef<'_>, parts: &mut Vec<String>) {
    if matches!(element.value().name(), "script" | "style" | "noscript") {
        return;
    }
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
        } else if let Some(child_element) = ElementRef::wrap(child) {
            collect_readable_text(child_element, parts);
        }
    }
}
