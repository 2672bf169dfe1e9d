use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Deserialize;
use std::time::Duration;

use crate::ingest::normalize_text;
use crate::ingest::types::{ArticleKey, Item, SearchProvider, SearchQuery, SourceFetchError};

/// Title NewsAPI substitutes for articles that were taken down.
pub const REMOVED_TITLE: &str = "[Removed]";

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    articles: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArticle {
    title: Option<String>,
    source: Option<RawSource>,
    url: Option<String>,
    published_at: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    name: Option<String>,
}

fn parse_rfc3339(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// NewsAPI-compatible `/v2/everything` search.
pub struct NewsApiProvider {
    mode: Mode,
}

enum Mode {
    // Canned response body, used by tests and local runs without a key.
    Fixture(String),
    Http {
        client: reqwest::Client,
        base_url: String,
        api_key: String,
        language: String,
    },
}

impl NewsApiProvider {
    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
        }
    }

    pub fn new(
        base_url: &str,
        api_key: &str,
        language: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent("news-impact-scanner/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            mode: Mode::Http {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key: api_key.to_string(),
                language: language.to_string(),
            },
        })
    }

    /// Decode a response body into items tagged with `category`.
    pub fn parse_body(body: &str, category: &str) -> Result<Vec<Item>, SourceFetchError> {
        let resp: Response =
            serde_json::from_str(body).map_err(|e| SourceFetchError::Malformed(e.to_string()))?;

        let mut out = Vec::with_capacity(resp.articles.len());
        for a in resp.articles {
            // Without a URL there is no identity, so the article cannot take part in a scan.
            let Some(url) = a.url.as_deref().and_then(ArticleKey::from_url) else {
                continue;
            };
            out.push(Item {
                url,
                title: normalize_text(a.title.as_deref().unwrap_or_default()),
                source: a
                    .source
                    .and_then(|s| s.name)
                    .map(|n| normalize_text(&n))
                    .unwrap_or_else(|| "Unknown".to_string()),
                published_at: a
                    .published_at
                    .as_deref()
                    .map(parse_rfc3339)
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                category: category.to_string(),
                description: normalize_text(a.description.as_deref().unwrap_or_default()),
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl SearchProvider for NewsApiProvider {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Item>, SourceFetchError> {
        match &self.mode {
            Mode::Fixture(body) => Self::parse_body(body, &query.category),
            Mode::Http {
                client,
                base_url,
                api_key,
                language,
            } => {
                let page_size = query.page_size.to_string();
                let resp = client
                    .get(format!("{base_url}/v2/everything"))
                    .header("X-Api-Key", api_key)
                    .query(&[
                        ("q", query.query.as_str()),
                        ("pageSize", page_size.as_str()),
                        ("language", language.as_str()),
                        ("sortBy", "publishedAt"),
                    ])
                    .send()
                    .await
                    .inspect_err(|_| {
                        counter!("ingest_provider_http_errors_total").increment(1);
                    })?;

                if !resp.status().is_success() {
                    return Err(SourceFetchError::Status {
                        status: resp.status().as_u16(),
                    });
                }
                let body = resp.text().await?;
                Self::parse_body(&body, &query.category)
            }
        }
    }

    fn name(&self) -> &'static str {
        "newsapi"
    }
}
