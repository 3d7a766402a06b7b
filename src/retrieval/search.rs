//! Web search via DuckDuckGo's HTML endpoint.
//!
//! No API key required. The result page is parsed with regular expressions —
//! result anchors carry `result__a`, snippets `result__snippet`, and outbound
//! links are wrapped in a `uddg=` redirect that gets unwrapped here.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client as HttpClient;
use std::time::Duration;

use super::fetch::html_to_text;
use super::{RetrievalError, USER_AGENT};

/// Total request timeout for a search call.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// One web search hit. Ephemeral — consumed only to decide which URLs to
/// fetch, never persisted in the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// An opaque public web search capability.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Search the web. Returns an empty list on any failure — never raises
    /// to the caller.
    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult>;
}

/// DuckDuckGo HTML search.
pub struct DuckDuckGoSearch {
    http: HttpClient,
}

impl DuckDuckGoSearch {
    pub fn new() -> Result<Self, RetrievalError> {
        let http = HttpClient::builder()
            .timeout(SEARCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RetrievalError::ClientBuild {
                reason: e.to_string(),
            })?;
        Ok(Self { http })
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        let url = format!(
            "https://html.duckduckgo.com/html/?q={}",
            urlencoding::encode(query)
        );

        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(query = %query, error = %e, "web search request failed");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            tracing::warn!(query = %query, status = %response.status(), "web search non-success");
            return Vec::new();
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(query = %query, error = %e, "web search body read failed");
                return Vec::new();
            }
        };

        let results = parse_results(&body, max_results);
        tracing::info!(query = %query, result_count = results.len(), "web search complete");
        results
    }
}

/// Parse the DuckDuckGo HTML result page.
fn parse_results(html: &str, max_results: usize) -> Vec<SearchResult> {
    let re_link = Regex::new(r#"(?s)class="result__a"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#).unwrap();
    let re_snippet = Regex::new(r#"(?s)class="result__snippet"[^>]*>(.*?)</a>"#).unwrap();

    let snippets: Vec<String> = re_snippet
        .captures_iter(html)
        .filter_map(|cap| cap.get(1).map(|m| html_to_text(m.as_str())))
        .collect();

    re_link
        .captures_iter(html)
        .take(max_results)
        .enumerate()
        .filter_map(|(i, cap)| {
            let raw_url = cap.get(1)?.as_str();
            let title = html_to_text(cap.get(2)?.as_str());
            let url = unwrap_redirect(raw_url);
            if url.is_empty() || title.is_empty() {
                return None;
            }
            Some(SearchResult {
                title,
                url,
                snippet: snippets.get(i).cloned().unwrap_or_default(),
            })
        })
        .collect()
}

/// Unwrap DuckDuckGo's `uddg=` redirect wrapper around outbound links.
fn unwrap_redirect(url: &str) -> String {
    if let Some(idx) = url.find("uddg=") {
        let encoded = &url[idx + 5..];
        let end = encoded.find('&').unwrap_or(encoded.len());
        return urlencoding::decode(&encoded[..end])
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| url.to_string());
    }
    url.to_string()
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r##"
        <div class="result">
          <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Frust&amp;rut=abc">Rust <b>Language</b></a>
          <a class="result__snippet" href="#">A language empowering <b>everyone</b>.</a>
        </div>
        <div class="result">
          <a class="result__a" href="https://other.org/page">Other Page</a>
          <a class="result__snippet" href="#">Second snippet.</a>
        </div>
    "##;

    #[test]
    fn parses_titles_urls_and_snippets() {
        let results = parse_results(FIXTURE, 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Rust Language");
        assert_eq!(results[0].url, "https://example.com/rust");
        assert_eq!(results[0].snippet, "A language empowering everyone.");
        assert_eq!(results[1].url, "https://other.org/page");
    }

    #[test]
    fn respects_result_limit() {
        let results = parse_results(FIXTURE, 1);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn empty_page_yields_no_results() {
        assert!(parse_results("<html><body>no results</body></html>", 10).is_empty());
    }

    #[test]
    fn unwrap_redirect_decodes_uddg() {
        let url = "//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fa%20b&rut=xyz";
        assert_eq!(unwrap_redirect(url), "https://example.com/a b");
    }

    #[test]
    fn unwrap_redirect_passes_plain_urls_through() {
        assert_eq!(
            unwrap_redirect("https://example.com/plain"),
            "https://example.com/plain"
        );
    }
}
