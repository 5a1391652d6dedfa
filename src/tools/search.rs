//! Web search collaborator.
//!
//! [`GoogleSearch`] pages through the Google results page and scrapes the
//! organic `div.g` result blocks with `scraper`.

use std::{collections::HashSet, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Search request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Search engine blocked the request: {0}")]
    BlockedError(String),

    #[error("Failed to parse search results: {0}")]
    ParsingError(String),
}

/// One organic result. `title` and `description` stay empty unless extended
/// metadata was requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub description: String,
}

impl SearchResult {
    pub fn new<U: Into<String>>(url: U) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        result_count: usize,
        extended_metadata: bool,
    ) -> Result<Vec<SearchResult>, SearchError>;
}

#[derive(Debug, Clone)]
pub struct GoogleSearchConfig {
    pub base_url: String,
    pub user_agent: String,
    pub language: String,
    pub safe: Option<String>,
    /// Pause between result pages.
    pub sleep_interval: Duration,
    pub timeout: Duration,
}

impl Default for GoogleSearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.google.com".to_string(),
            user_agent: "Lynx/2.8.6rel.5 libwww-FM/2.14".to_string(),
            language: "en".to_string(),
            safe: Some("active".to_string()),
            sleep_interval: Duration::ZERO,
            timeout: Duration::from_secs(5),
        }
    }
}

impl GoogleSearchConfig {
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_language<S: Into<String>>(mut self, language: S) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_sleep_interval(mut self, interval: Duration) -> Self {
        self.sleep_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct GoogleSearch {
    config: GoogleSearchConfig,
    client: Client,
}

impl GoogleSearch {
    pub fn new(config: GoogleSearchConfig) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { config, client })
    }

    async fn fetch_page(&self, query: &str, count: usize, start: usize) -> Result<String, SearchError> {
        let mut params = vec![
            ("q", query.to_string()),
            ("num", count.to_string()),
            ("hl", self.config.language.clone()),
            ("start", start.to_string()),
        ];
        if let Some(safe) = &self.config.safe {
            params.push(("safe", safe.clone()));
        }

        let response = self
            .client
            .get(format!("{}/search", self.config.base_url.trim_end_matches('/')))
            .query(&params)
            .send()
            .await?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(SearchError::BlockedError(
                "too many requests, try again later".into(),
            )),
            status if !status.is_success() => Err(SearchError::BlockedError(format!(
                "search page returned status {}",
                status
            ))),
            _ => Ok(response.text().await?),
        }
    }
}

#[async_trait]
impl SearchProvider for GoogleSearch {
    async fn search(
        &self,
        query: &str,
        result_count: usize,
        extended_metadata: bool,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let mut results: Vec<SearchResult> = Vec::new();
        let mut seen = HashSet::new();
        let mut start = 0;

        while results.len() < result_count {
            let remaining = result_count - results.len();
            let html = self.fetch_page(query, remaining + 2, start).await?;
            let page = parse_results(&html, extended_metadata)?;
            if page.is_empty() {
                break;
            }
            start += page.len();

            let mut added = 0;
            for result in page {
                if seen.insert(result.url.clone()) {
                    results.push(result);
                    added += 1;
                }
            }
            if added == 0 {
                break;
            }

            if results.len() < result_count && !self.config.sleep_interval.is_zero() {
                tokio::time::sleep(self.config.sleep_interval).await;
            }
        }

        results.truncate(result_count);
        log::info!("Search for {:?} returned {} results", query, results.len());
        Ok(results)
    }
}

fn selector(css: &str) -> Result<Selector, SearchError> {
    Selector::parse(css).map_err(|e| SearchError::ParsingError(format!("bad selector {}: {}", css, e)))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join("").trim().to_string()
}

/// Unwrap `/url?q=<target>&...` redirect links.
fn clean_href(href: &str) -> Option<String> {
    let href = if let Some(rest) = href.strip_prefix("/url?") {
        url::form_urlencoded::parse(rest.as_bytes())
            .find(|(key, _)| key == "q")
            .map(|(_, value)| value.into_owned())?
    } else {
        href.to_string()
    };

    (href.starts_with("http://") || href.starts_with("https://")).then_some(href)
}

/// Organic results in page order.
pub fn parse_results(html: &str, extended_metadata: bool) -> Result<Vec<SearchResult>, SearchError> {
    let document = Html::parse_document(html);
    let block = selector("div.g")?;
    let link = selector("a[href]")?;
    let title = selector("h3")?;
    let description = selector(r#"div[style="-webkit-line-clamp:2"], div.VwiC3b, span.st"#)?;

    let mut results = Vec::new();
    for element in document.select(&block) {
        let Some(url) = element
            .select(&link)
            .filter_map(|a| a.value().attr("href"))
            .find_map(clean_href)
        else {
            continue;
        };

        let mut result = SearchResult::new(url);
        if extended_metadata {
            let Some(heading) = element.select(&title).next() else {
                continue;
            };
            result.title = element_text(heading);
            result.description = element
                .select(&description)
                .next()
                .map(element_text)
                .unwrap_or_default();
        }
        results.push(result);
    }
    Ok(results)
}
