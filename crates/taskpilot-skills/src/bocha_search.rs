//! Bocha web search client (`POST /web-search`).

use scraper::Html;
use serde::{Deserialize, Serialize};
use taskpilot_core::{ConfigError, RawHit, SearchError, SearchSettings, WebSearch};

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    freshness: &'a str,
    summary: bool,
    count: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    code: Option<i64>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<SearchData>,
}

#[derive(Deserialize)]
struct SearchData {
    #[serde(rename = "webPages", default)]
    web_pages: Option<WebPages>,
}

#[derive(Deserialize)]
struct WebPages {
    #[serde(default)]
    value: Vec<WebPage>,
}

#[derive(Deserialize)]
struct WebPage {
    #[serde(default)]
    url: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

pub struct BochaSearch {
    client: reqwest::Client,
    url: String,
    api_key: String,
    timeout_secs: u64,
}

impl BochaSearch {
    /// Requires `search.api_key`.
    pub fn from_settings(settings: &SearchSettings) -> Result<Self, ConfigError> {
        if settings.api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential("search.api_key"));
        }
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| ConfigError::Invalid {
                key: "search",
                reason: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            url: format!("{}/web-search", settings.base_url.trim_end_matches('/')),
            api_key: settings.api_key.clone(),
            timeout_secs: settings.timeout().as_secs(),
        })
    }
}

#[async_trait::async_trait]
impl WebSearch for BochaSearch {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<RawHit>, SearchError> {
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&SearchRequest {
                query,
                freshness: "noLimit",
                summary: true,
                count,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout(self.timeout_secs)
                } else {
                    SearchError::Request(e.to_string())
                }
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status(status.as_u16()));
        }
        let body = response
            .text()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;
        let hits = parse_response(&body)?;
        tracing::debug!(target: "taskpilot::search", query, hits = hits.len(), "bocha search");
        Ok(hits)
    }
}

/// Hits from a Bocha response body. `code` must be 200.
pub fn parse_response(body: &str) -> Result<Vec<RawHit>, SearchError> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| SearchError::Api(format!("malformed response: {}", e)))?;
    if response.code != Some(200) {
        return Err(SearchError::Api(format!(
            "code {}: {}",
            response.code.map(|c| c.to_string()).unwrap_or_else(|| "missing".to_string()),
            response.msg.unwrap_or_default()
        )));
    }
    let pages = response
        .data
        .and_then(|d| d.web_pages)
        .map(|w| w.value)
        .unwrap_or_default();
    Ok(pages
        .into_iter()
        .filter(|page| !page.url.trim().is_empty())
        .map(|page| {
            let summary = page
                .summary
                .filter(|s| !s.trim().is_empty())
                .or(page.snippet)
                .unwrap_or_default();
            RawHit::new(page.url.trim(), html_to_text(&page.name), html_to_text(&summary))
        })
        .collect())
}

/// Strips markup (search APIs wrap matches in `<em>`) and collapses whitespace.
fn html_to_text(fragment: &str) -> String {
    let text = if fragment.contains('<') {
        Html::parse_fragment(fragment)
            .root_element()
            .text()
            .collect::<String>()
    } else {
        fragment.to_string()
    };
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
