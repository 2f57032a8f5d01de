//! Tavily search client — general web search plus the scoped variants
//! (government schemes, market prices, input shopping links).

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::warn;

use crate::error::ProviderError;
use crate::providers::TimeRange;
use crate::session::{WebContext, utc_now_iso};

const SEARCH_URL: &str = "https://api.tavily.com/search";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(25);

const MAX_SNIPPETS: usize = 6;
const MAX_URLS: usize = 6;
const MAX_BUY_RESULTS: usize = 8;
/// Per-query contribution to the merged buy-links result.
const BUY_PER_QUERY: usize = 3;

pub struct TavilyClient {
    client: reqwest::Client,
    api_key: SecretString,
    max_results: usize,
}

impl TavilyClient {
    pub fn new(api_key: SecretString, max_results: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            max_results: max_results.max(1),
        }
    }

    /// General web search over the given recency window.
    pub async fn search(
        &self,
        query: &str,
        time_range: TimeRange,
    ) -> Result<WebContext, ProviderError> {
        let q = query.trim();
        if q.is_empty() {
            return Ok(WebContext {
                fetched_at_utc: utc_now_iso(),
                ..WebContext::default()
            });
        }

        let api_key = self.api_key.expose_secret();
        if api_key.is_empty() {
            return Err(ProviderError::MissingCredential {
                name: "tavily".into(),
                key: "TAVILY_API_KEY".into(),
            });
        }

        let payload = serde_json::json!({
            "api_key": api_key,
            "query": q,
            "max_results": self.max_results,
            "time_range": time_range.as_str(),
            "search_depth": "basic",
            "include_images": false,
            "include_answer": false,
        });

        let resp = self
            .client
            .post(SEARCH_URL)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout {
                        name: "tavily".into(),
                        timeout: REQUEST_TIMEOUT,
                    }
                } else {
                    ProviderError::RequestFailed {
                        name: "tavily".into(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::RequestFailed {
                name: "tavily".into(),
                reason: format!("status {status}"),
            });
        }

        let data: Value = resp.json().await.map_err(|e| ProviderError::InvalidPayload {
            name: "tavily".into(),
            reason: e.to_string(),
        })?;

        Ok(context_from_results(q, &data, self.max_results))
    }

    /// Government-scheme search, scoped to official portals.
    pub async fn schemes(
        &self,
        location: &str,
        crop: Option<&str>,
    ) -> Result<WebContext, ProviderError> {
        let loc = location.trim();
        let c = crop.unwrap_or("").trim().to_lowercase();
        let q = format!("site:gov.in farmer scheme {c} {loc}");
        self.search(q.trim(), TimeRange::Year).await
    }

    /// Mandi price search for the crop near the location.
    pub async fn market_prices(
        &self,
        location: &str,
        crop: Option<&str>,
    ) -> Result<WebContext, ProviderError> {
        let loc = location.trim();
        let c = {
            let c = crop.unwrap_or("").trim().to_lowercase();
            if c.is_empty() { "crop".to_string() } else { c }
        };
        let q = format!("{c} mandi price today {loc} APMC");
        self.search(q.trim(), TimeRange::Week).await
    }

    /// Shopping links for seeds, fertilizer, and crop protection: three
    /// scoped searches merged, deduplicated, capped at 8.
    pub async fn buy_inputs(&self, location: &str, crop: &str) -> Result<WebContext, ProviderError> {
        let loc = location.trim();
        let c = crop.trim().to_lowercase();
        if c.is_empty() {
            return Err(ProviderError::InvalidParameters {
                name: "tavily".into(),
                reason: "crop is required for buy_inputs".into(),
            });
        }

        let queries = [
            format!("buy {c} seeds online India {loc}"),
            format!("best fertilizer for {c} buy online India {loc}"),
            format!("bio pesticide for {c} buy online India {loc}"),
        ];

        let mut merged_snippets: Vec<String> = Vec::new();
        let mut merged_urls: Vec<String> = Vec::new();

        for q in &queries {
            match self.search(q.trim(), TimeRange::Month).await {
                Ok(ctx) => {
                    merged_snippets.extend(ctx.snippets.into_iter().take(BUY_PER_QUERY));
                    merged_urls.extend(ctx.urls.into_iter().take(BUY_PER_QUERY));
                }
                Err(e) => warn!(query = %q, error = %e, "buy-inputs search failed"),
            }
        }

        Ok(WebContext {
            fetched_at_utc: utc_now_iso(),
            query: format!("buy inputs {c} {loc}").trim().to_string(),
            snippets: dedup_case_insensitive(merged_snippets, MAX_BUY_RESULTS),
            urls: dedup_exact(merged_urls, MAX_BUY_RESULTS),
        })
    }
}

// ── Payload shaping ─────────────────────────────────────────────────

fn clean_snippet(title: &str, content: &str) -> String {
    let title = title.trim();
    let content = content.trim();
    if !title.is_empty() && !content.is_empty() {
        format!("{title} — {content}")
    } else if !title.is_empty() {
        title.to_string()
    } else {
        content.to_string()
    }
}

fn context_from_results(query: &str, data: &Value, max_results: usize) -> WebContext {
    let mut snippets = Vec::new();
    let mut urls = Vec::new();

    if let Some(results) = data.get("results").and_then(Value::as_array) {
        for item in results.iter().take(max_results) {
            let title = item.get("title").and_then(Value::as_str).unwrap_or("");
            let content = item.get("content").and_then(Value::as_str).unwrap_or("");
            let url = item.get("url").and_then(Value::as_str).unwrap_or("").trim();

            let snippet = clean_snippet(title, content);
            if !snippet.is_empty() {
                snippets.push(snippet);
            }
            if !url.is_empty() {
                urls.push(url.to_string());
            }
        }
    }

    WebContext {
        fetched_at_utc: utc_now_iso(),
        query: query.to_string(),
        snippets: snippets.into_iter().take(MAX_SNIPPETS).collect(),
        urls: dedup_exact(urls, MAX_URLS),
    }
}

fn dedup_exact(items: Vec<String>, cap: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|u| !u.is_empty() && seen.insert(u.clone()))
        .take(cap)
        .collect()
}

fn dedup_case_insensitive(items: Vec<String>, cap: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|s| {
            let key = s.trim().to_lowercase();
            !key.is_empty() && seen.insert(key)
        })
        .take(cap)
        .collect()
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn snippets_join_title_and_content() {
        assert_eq!(clean_snippet("T", "C"), "T — C");
        assert_eq!(clean_snippet("T", ""), "T");
        assert_eq!(clean_snippet("", " C "), "C");
        assert_eq!(clean_snippet("", ""), "");
    }

    #[test]
    fn results_shaped_and_urls_deduped() {
        let data = json!({"results": [
            {"title": "A", "content": "a", "url": "https://x/1"},
            {"title": "B", "content": "", "url": "https://x/1"},
            {"title": "", "content": "", "url": "https://x/2"},
        ]});
        let ctx = context_from_results("q", &data, 5);
        assert_eq!(ctx.snippets, vec!["A — a", "B"]);
        assert_eq!(ctx.urls, vec!["https://x/1", "https://x/2"]);
        assert_eq!(ctx.query, "q");
    }

    #[test]
    fn results_capped_at_six() {
        let results: Vec<Value> = (0..10)
            .map(|i| json!({"title": format!("t{i}"), "content": "c", "url": format!("https://x/{i}")}))
            .collect();
        let ctx = context_from_results("q", &json!({"results": results}), 10);
        assert_eq!(ctx.snippets.len(), MAX_SNIPPETS);
        assert_eq!(ctx.urls.len(), MAX_URLS);
    }

    #[test]
    fn malformed_payload_yields_empty_context() {
        let ctx = context_from_results("q", &json!({"results": "nope"}), 5);
        assert!(ctx.snippets.is_empty());
        assert!(ctx.urls.is_empty());
        assert!(!ctx.fetched_at_utc.is_empty());
    }

    #[test]
    fn dedup_helpers() {
        let urls = vec!["a".to_string(), "a".to_string(), "b".to_string()];
        assert_eq!(dedup_exact(urls, 8), vec!["a", "b"]);

        let snips = vec!["Buy Seeds".to_string(), "buy seeds".to_string(), " ".to_string()];
        assert_eq!(dedup_case_insensitive(snips, 8), vec!["Buy Seeds"]);
    }

    #[tokio::test]
    async fn empty_query_short_circuits() {
        let client = TavilyClient::new(SecretString::from("k"), 5);
        let ctx = client.search("   ", TimeRange::Month).await.unwrap();
        assert!(ctx.snippets.is_empty());
        assert!(!ctx.fetched_at_utc.is_empty());
    }

    #[tokio::test]
    async fn missing_key_is_a_credential_error() {
        let client = TavilyClient::new(SecretString::from(""), 5);
        let err = client.search("q", TimeRange::Week).await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredential { .. }));
    }

    #[tokio::test]
    async fn buy_inputs_requires_crop() {
        let client = TavilyClient::new(SecretString::from("k"), 5);
        let err = client.buy_inputs("Pune", "  ").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidParameters { .. }));
    }
}
