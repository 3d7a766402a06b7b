//! Page fetching and readable-text extraction.
//!
//! Seeds a same-domain crawl from each URL, extracting cleaned text per page.
//! The landing page (rank 0) is always fetched before links discovered on it
//! (rank 1). Cross-domain links and binary/asset URLs never enter the queue,
//! and every per-page failure is logged and skipped — a bad page never fails
//! the batch.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use regex::Regex;
use reqwest::Client as HttpClient;
use url::Url;

use super::{RetrievalError, USER_AGENT};

// ─── Constants ──────────────────────────────────────────────────────────────

/// TCP connection timeout for page fetches.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-page fetch timeout.
const PAGE_TIMEOUT: Duration = Duration::from_secs(15);

/// Pages shorter than this after extraction are discarded as boilerplate.
const MIN_CONTENT_CHARS: usize = 100;

/// Path extensions that mark binary/asset URLs — never fetched.
const SKIP_EXTENSIONS: &[&str] = &[
    ".jpg", ".png", ".gif", ".pdf", ".zip", ".css", ".js", ".svg", ".webp",
];

// ─── URL Normalization ──────────────────────────────────────────────────────

/// Validate and normalize a discovered link against the crawl domain.
///
/// Returns the URL stripped of query string and fragment when it is an
/// http(s) link on `domain` and does not point at a known binary/asset
/// extension; `None` otherwise.
pub fn normalize_url(raw: &str, domain: &str) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return None;
    }
    let host = parsed.host_str()?;
    if host != domain {
        return None;
    }
    let path = parsed.path();
    let lower = path.to_ascii_lowercase();
    if SKIP_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return None;
    }
    Some(format!("{}://{host}{path}", parsed.scheme()))
}

// ─── Text Extraction ────────────────────────────────────────────────────────

/// Extract readable text from an HTML document.
///
/// Strips script/style/noscript blocks and comments, turns block-level
/// closing tags into line breaks, drops the remaining markup, decodes common
/// entities, and collapses whitespace.
pub(crate) fn html_to_text(html: &str) -> String {
    let re_script = Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap();
    let re_style = Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap();
    let re_noscript = Regex::new(r"(?is)<noscript[^>]*>.*?</noscript>").unwrap();
    let re_comment = Regex::new(r"(?s)<!--.*?-->").unwrap();
    let re_block_end = Regex::new(r"(?i)</(?:p|div|h[1-6]|li|tr|section|article|blockquote|pre)>|<br\s*/?>").unwrap();
    let re_tags = Regex::new(r"<[^>]+>").unwrap();
    let re_spaces = Regex::new(r"[ \t]+").unwrap();
    let re_blank_lines = Regex::new(r"\n\s*\n(\s*\n)+").unwrap();

    let text = re_script.replace_all(html, "");
    let text = re_style.replace_all(&text, "");
    let text = re_noscript.replace_all(&text, "");
    let text = re_comment.replace_all(&text, "");
    // Block-level closers become line breaks; inline markup vanishes so
    // "<b>word</b>." doesn't grow a stray space before punctuation.
    let text = re_block_end.replace_all(&text, "\n");
    let text = re_tags.replace_all(&text, "");
    let text = decode_entities(&text);
    let text = re_spaces.replace_all(&text, " ");
    let text = re_blank_lines.replace_all(&text, "\n\n");

    text.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Decode the HTML entities that actually show up in page text.
fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

/// Collect `href` targets from anchor tags.
fn extract_links(html: &str) -> Vec<String> {
    let re_href = Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*"([^"]+)""#).unwrap();
    re_href
        .captures_iter(html)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

// ─── PageFetcher ────────────────────────────────────────────────────────────

/// Fetches pages per seed URL with a bounded same-domain crawl.
#[derive(Clone)]
pub struct PageFetcher {
    http: HttpClient,
    max_pages_per_site: usize,
    delay: Duration,
}

impl PageFetcher {
    /// Create a fetcher collecting up to `max_pages_per_site` pages per seed,
    /// waiting `delay` between page requests to avoid hammering a host.
    pub fn new(max_pages_per_site: usize, delay: Duration) -> Result<Self, RetrievalError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(PAGE_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RetrievalError::ClientBuild {
                reason: e.to_string(),
            })?;

        Ok(Self {
            http,
            max_pages_per_site,
            delay,
        })
    }

    /// Fetch readable text for each seed URL.
    ///
    /// Returns `(url, text)` pairs in fetch order. The stop flag is observed
    /// between pages — an in-flight request completes before it takes effect.
    pub async fn fetch(&self, urls: &[String], stop: &AtomicBool) -> Vec<(String, String)> {
        let mut results = Vec::new();
        for url in urls {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            results.extend(self.fetch_site(url, stop).await);
        }
        results
    }

    /// Crawl one seed: landing page first, then same-domain body links by
    /// discovery rank, until the per-site page cap is reached.
    async fn fetch_site(&self, start_url: &str, stop: &AtomicBool) -> Vec<(String, String)> {
        let domain = match Url::parse(start_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
        {
            Some(domain) => domain,
            None => {
                tracing::warn!(url = %start_url, "seed URL has no host — skipping");
                return Vec::new();
            }
        };

        let mut visited: HashSet<String> = HashSet::from([start_url.to_string()]);
        let mut queue: Vec<(u8, String)> = vec![(0, start_url.to_string())];
        let mut pages: Vec<(String, String)> = Vec::new();

        while !queue.is_empty() && pages.len() < self.max_pages_per_site {
            if stop.load(Ordering::SeqCst) {
                break;
            }

            queue.sort_by_key(|(rank, _)| *rank);
            let (_, url) = queue.remove(0);

            if let Some(html) = self.fetch_page(&url).await {
                let text = html_to_text(&html);
                if text.len() > MIN_CONTENT_CHARS {
                    tracing::info!(url = %url, chars = text.len(), "page extracted");
                    pages.push((url.clone(), text));
                }

                if pages.len() < self.max_pages_per_site {
                    for href in extract_links(&html) {
                        if let Some(normalized) = normalize_url(&href, &domain) {
                            if visited.insert(normalized.clone()) {
                                queue.push((1, normalized));
                            }
                        }
                    }
                }
            }

            tokio::time::sleep(self.delay).await;
        }

        pages
    }

    /// Fetch one page, returning its HTML body or `None` on any failure or
    /// non-HTML content type.
    async fn fetch_page(&self, url: &str) -> Option<String> {
        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "page fetch failed");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(url = %url, status = %response.status(), "page fetch non-success");
            return None;
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.is_empty()
            && !content_type.contains("text/html")
            && !content_type.contains("text/plain")
        {
            tracing::info!(url = %url, content_type = %content_type, "skipping non-HTML page");
            return None;
        }

        match response.text().await {
            Ok(body) => Some(body),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "page body read failed");
                None
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
