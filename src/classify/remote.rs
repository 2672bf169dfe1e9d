//! Remote LLM classifier: prompt assembly, provider calls, and strict response validation.
//!
//! The response is validated against a fixed schema. Anything that does not
//! deserialize, or does not line up 1:1 with the batch, is a protocol error
//! and the whole batch is retried; there is no partial salvage.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    ClassificationResult, Classifier, ClassifierError, CommodityImpact, Region, ResultOrigin,
    SectorImpact, Sentiment,
};
use crate::config::{AiConfig, FatalConfigError, ProviderKind};
use crate::ingest::types::Item;

const ANTHROPIC_VERSION: &str = "2023-06-01";

const SYSTEM_PROMPT: &str = "You are a financial news analyst. For every numbered headline, assess its market impact. \
Respond with JSON only: {\"results\": [{\"index\": <headline number>, \"region\": \"USA|Europe|Asia|Middle East|Latin America|Africa|Global\", \
\"summary\": string, \"overallSentiment\": \"Bullish|Bearish|Mixed|Neutral\", \"keyInsight\": string, \
\"sectors\": [{\"sector\": string, \"impact\": \"Bullish|Bearish|Neutral|Uncertain\", \"reasoning\": string, \"tickers\": [string], \
\"timeframe\": \"Short-term|Medium-term|Long-term\", \"confidence\": \"High|Medium|Low\"}], \
\"gold\": I, \"silver\": I, \"rareMinerals\": I, \"stockMarkets\": I}]} where I is one of Bullish|Bearish|Neutral|Mixed. \
Return exactly one result per headline.";

/// Numbered headline list sent as the user message.
pub fn build_prompt(batch: &[Item]) -> String {
    let mut out = String::with_capacity(batch.len() * 120);
    for (i, it) in batch.iter().enumerate() {
        out.push_str(&format!(
            "{}. [{}] {} ({})\n",
            i + 1,
            it.category,
            it.title,
            it.source
        ));
    }
    out
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    results: Vec<RawResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResult {
    #[serde(default, alias = "articleNum")]
    index: Option<usize>,
    region: Region,
    summary: String,
    overall_sentiment: Sentiment,
    key_insight: String,
    #[serde(default)]
    sectors: Vec<SectorImpact>,
    gold: CommodityImpact,
    silver: CommodityImpact,
    rare_minerals: CommodityImpact,
    stock_markets: CommodityImpact,
}

impl RawResult {
    fn into_result(self) -> ClassificationResult {
        ClassificationResult {
            region: self.region,
            summary: self.summary,
            overall_sentiment: self.overall_sentiment,
            sectors: self.sectors,
            key_insight: self.key_insight,
            gold: self.gold,
            silver: self.silver,
            rare_minerals: self.rare_minerals,
            stock_markets: self.stock_markets,
            origin: ResultOrigin::Remote,
        }
    }
}

/// Strip a surrounding markdown code fence, if any.
fn strip_code_fences(s: &str) -> &str {
    s.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Validate a classifier reply and return results in batch order.
///
/// Results either all carry a 1-based `index` (alias `articleNum`), forming a
/// permutation of `1..=expected`, or none do and array position is used.
pub fn parse_classifier_response(
    text: &str,
    expected: usize,
) -> Result<Vec<ClassificationResult>, ClassifierError> {
    let raw: RawResponse = serde_json::from_str(strip_code_fences(text))
        .map_err(|e| ClassifierError::Protocol(format!("invalid classifier JSON: {e}")))?;

    if raw.results.len() != expected {
        return Err(ClassifierError::Protocol(format!(
            "expected {expected} results, got {}",
            raw.results.len()
        )));
    }

    let indexed = raw.results.iter().filter(|r| r.index.is_some()).count();
    let ordered = if indexed == 0 {
        raw.results
    } else if indexed == expected {
        let mut slots: Vec<Option<RawResult>> = (0..expected).map(|_| None).collect();
        for r in raw.results {
            let idx = r.index.unwrap_or(0);
            if idx == 0 || idx > expected {
                return Err(ClassifierError::Protocol(format!(
                    "result index {idx} out of range 1..={expected}"
                )));
            }
            if slots[idx - 1].is_some() {
                return Err(ClassifierError::Protocol(format!("duplicate result index {idx}")));
            }
            slots[idx - 1] = Some(r);
        }
        // Pigeonhole: `expected` distinct in-range indexes fill every slot.
        slots.into_iter().flatten().collect()
    } else {
        return Err(ClassifierError::Protocol(
            "results mix indexed and positional entries".to_string(),
        ));
    };

    Ok(ordered.into_iter().map(RawResult::into_result).collect())
}

/// Always fails with `Disabled`; used when AI is turned off or mocked.
pub struct DisabledClassifier;

#[async_trait]
impl Classifier for DisabledClassifier {
    async fn classify(&self, _batch: &[Item]) -> Result<Vec<ClassificationResult>, ClassifierError> {
        Err(ClassifierError::Disabled)
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Chat-completion backed classifier (OpenAI or Claude).
pub struct LlmClassifier {
    kind: ProviderKind,
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl LlmClassifier {
    pub fn new(
        kind: ProviderKind,
        cfg: &AiConfig,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent("news-impact-scanner/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            kind,
            http,
            base_url: cfg.base_url_for(kind),
            api_key,
            model: cfg.model_for(kind),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
        })
    }

    async fn complete(&self, user: &str) -> Result<String, ClassifierError> {
        match self.kind {
            ProviderKind::OpenAi => self.complete_openai(user).await,
            ProviderKind::Claude => self.complete_claude(user).await,
        }
    }

    async fn complete_openai(&self, user: &str) -> Result<String, ClassifierError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct ResponseFormat {
            r#type: &'static str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
            response_format: ResponseFormat,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat {
                r#type: "json_object",
            },
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;
        let body = checked_body(resp).await?;
        let parsed: Resp = serde_json::from_str(&body)
            .map_err(|e| ClassifierError::Protocol(format!("openai envelope: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ClassifierError::Protocol("openai reply has no content".to_string()))
    }

    async fn complete_claude(&self, user: &str) -> Result<String, ClassifierError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            max_tokens: u32,
            temperature: f32,
            system: &'a str,
            messages: Vec<Msg<'a>>,
        }
        #[derive(Deserialize)]
        struct Resp {
            content: Vec<Block>,
        }
        #[derive(Deserialize)]
        struct Block {
            #[serde(rename = "type")]
            kind: String,
            #[serde(default)]
            text: String,
        }

        let req = Req {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: SYSTEM_PROMPT,
            messages: vec![Msg {
                role: "user",
                content: user,
            }],
        };

        let resp = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&req)
            .send()
            .await?;
        let body = checked_body(resp).await?;
        let parsed: Resp = serde_json::from_str(&body)
            .map_err(|e| ClassifierError::Protocol(format!("claude envelope: {e}")))?;
        let text: String = parsed
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text)
            .collect();
        if text.trim().is_empty() {
            return Err(ClassifierError::Protocol("claude reply has no text".to_string()));
        }
        Ok(text)
    }
}

async fn checked_body(resp: reqwest::Response) -> Result<String, ClassifierError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(ClassifierError::Status {
            status: status.as_u16(),
            body: truncate_to_char_boundary(&body, 300).to_string(),
        });
    }
    Ok(body)
}

fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, batch: &[Item]) -> Result<Vec<ClassificationResult>, ClassifierError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let text = self.complete(&build_prompt(batch)).await?;
        parse_classifier_response(&text, batch.len())
    }

    fn name(&self) -> &'static str {
        match self.kind {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Claude => "claude",
        }
    }
}

/// Factory: build the classifier the config asks for.
///
/// * `AI_TEST_MODE=mock` or `enabled = false` → `DisabledClassifier` (all-fallback scans).
/// * Otherwise the provider must be known and its key present, else a fatal config error.
pub fn build_classifier(
    cfg: &AiConfig,
    timeout: Duration,
) -> Result<Arc<dyn Classifier>, FatalConfigError> {
    if cfg.remote_disabled() {
        return Ok(Arc::new(DisabledClassifier));
    }
    let kind = cfg.provider_kind()?;
    let key = cfg.resolve_api_key()?;
    let classifier = LlmClassifier::new(kind, cfg, key, timeout)
        .map_err(|e| FatalConfigError::HttpClient(e.to_string()))?;
    Ok(Arc::new(classifier))
}
