use std::sync::LazyLock;

use async_trait::async_trait;
use reqwest::{Client, Url};
use scraper::{ElementRef, Html, Selector};

use super::Tool;
use crate::errors::{AgentError, AgentResult};

pub const DUCKDUCKGO_HTML_URL: &str = "https://html.duckduckgo.com";
pub const NO_WEB_RESULTS: &str = "No relevant web results found.";
const MAX_RESULTS: usize = 3;

/// Web search through DuckDuckGo's HTML endpoint, which needs no API key
pub struct WebSearchTool {
    client: Client,
    base_url: String,
}

impl WebSearchTool {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, DUCKDUCKGO_HTML_URL)
    }

    pub fn with_base_url<S: Into<String>>(client: Client, base_url: S) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Searches the web for current information about people, events and topics."
    }

    async fn invoke(&self, query: &str) -> AgentResult<String> {
        let url = format!(
            "{}/html/?q={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(query)
        );

        let html = async {
            self.client
                .get(&url)
                .header("User-Agent", "Mozilla/5.0 (compatible; alfred/0.1)")
                .send()
                .await?
                .error_for_status()?
                .text()
                .await
        }
        .await
        .map_err(|e| AgentError::ExecutionError(format!("Web search failed: {}", e)))?;

        let results = extract_results(&html, MAX_RESULTS);
        if results.is_empty() {
            return Ok(NO_WEB_RESULTS.to_string());
        }
        Ok(results
            .iter()
            .map(SearchResult::render)
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl SearchResult {
    fn render(&self) -> String {
        format!(
            "Title: {}\nURL: {}\nSnippet: {}",
            self.title, self.url, self.snippet
        )
    }
}

static RESULT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".result").expect("static selector"));
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.result__a").expect("static selector"));
static SNIPPET: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".result__snippet").expect("static selector"));

/// Collapsed text content of an element; entities are already decoded by the parser
fn text_of(element: ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// The target of a result link. DuckDuckGo routes clicks through `/l/?uddg=<target>`.
fn target_url(href: &str) -> Option<String> {
    let base = Url::parse(DUCKDUCKGO_HTML_URL).ok()?;
    let link = base.join(href).ok()?;
    let target = link
        .query_pairs()
        .find(|(key, _)| key == "uddg")
        .map(|(_, value)| value.into_owned());
    Some(target.unwrap_or_else(|| link.to_string()))
}

fn extract_results(html: &str, limit: usize) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    document
        .select(&RESULT)
        .filter_map(|result| {
            let link = result.select(&TITLE).next()?;
            let title = text_of(link);
            if title.is_empty() {
                return None;
            }
            Some(SearchResult {
                title,
                url: link
                    .value()
                    .attr("href")
                    .and_then(target_url)
                    .unwrap_or_default(),
                snippet: result.select(&SNIPPET).next().map(text_of).unwrap_or_default(),
            })
        })
        .take(limit)
        .collect()
}
