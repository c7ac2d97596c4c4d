// src/classify/openai.rs
//! OpenAI batch classifier (Chat Completions). One request per batch.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Classifier, CATEGORIES};
use crate::ingest::types::{EnrichedItem, Item};

const ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const MAX_TAGS: usize = 5;

pub struct OpenAiClassifier {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiClassifier {
    pub fn new(api_key: String, model: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("news-alert-aggregator/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key,
            model,
            endpoint: ENDPOINT.to_string(),
        }
    }

    /// Point at a compatible endpoint (proxy, local gateway).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
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

#[derive(Debug, Deserialize)]
struct Categorization {
    #[serde(default)]
    articles: Vec<Categorized>,
}

#[derive(Debug, Deserialize)]
struct Categorized {
    /// Batch-local key from the prompt (1-based position), string or number.
    id: serde_json::Value,
    #[serde(default)]
    category: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    sentiment: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    confidence: f64,
}

const SYSTEM_PROMPT: &str = "You are a news categorization expert. Analyze articles and provide structured categorization data. Output JSON only.";

pub(crate) fn build_prompt(batch: &[Item]) -> String {
    let mut sb = String::new();
    sb.push_str("Categorize these news articles. For each article, provide:\n");
    let _ = writeln!(sb, "- category: one of [{}]", CATEGORIES.join(", "));
    let _ = writeln!(sb, "- tags: relevant keywords (max {MAX_TAGS})");
    sb.push_str("- sentiment: positive, negative, or neutral\n");
    sb.push_str("- summary: 1-2 sentence summary\n");
    sb.push_str("- confidence: 0.0-1.0\n\n");
    sb.push_str("Respond with JSON format:\n");
    sb.push_str(r#"{"articles": [{"id": "article_id", "category": "category", "tags": ["tag1", "tag2"], "sentiment": "sentiment", "summary": "summary", "confidence": 0.95}]}"#);
    sb.push_str("\n\nArticles to categorize:\n\n");

    for (i, it) in batch.iter().enumerate() {
        let _ = writeln!(sb, "Article {}:", i + 1);
        // Origin ids can repeat across sources; the position cannot.
        let _ = writeln!(sb, "ID: {}", i + 1);
        let _ = writeln!(sb, "Title: {}", it.title);
        let _ = writeln!(sb, "Content: {}", it.body);
        let _ = writeln!(sb, "Source: {}", it.source);
        sb.push('\n');
    }
    sb
}

/// Map the model's answer back onto the input batch by prompt position.
/// Unknown or repeated keys are skipped, confidence is clamped to [0, 1] and
/// tags are capped.
pub(crate) fn parse_categorization(
    content: &str,
    batch: &[Item],
    now: DateTime<Utc>,
) -> Result<Vec<EnrichedItem>> {
    let json = strip_code_fence(content);
    let parsed: Categorization =
        serde_json::from_str(json).context("parse classifier JSON")?;

    let mut emitted: HashSet<usize> = HashSet::with_capacity(batch.len());
    let mut out = Vec::with_capacity(parsed.articles.len().min(batch.len()));
    for c in parsed.articles {
        let Some(idx) = batch_index(&c.id, batch.len()) else {
            tracing::debug!(target: "classify", id = %c.id, "classifier returned unknown id");
            continue;
        };
        if !emitted.insert(idx) {
            tracing::debug!(target: "classify", id = %c.id, "classifier repeated an id");
            continue;
        }
        let mut item = batch[idx].clone();
        item.category = c.category.trim().to_lowercase();
        item.tags = c
            .tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .take(MAX_TAGS)
            .collect();
        item.sentiment = c.sentiment.trim().to_lowercase();
        item.summary = c.summary.trim().to_string();
        out.push(EnrichedItem {
            item,
            confidence: if c.confidence.is_finite() {
                c.confidence.clamp(0.0, 1.0)
            } else {
                0.0
            },
            enriched_at: now,
        });
    }
    Ok(out)
}

/// 1-based prompt key -> 0-based batch index.
fn batch_index(key: &serde_json::Value, len: usize) -> Option<usize> {
    let n = match key {
        serde_json::Value::Number(n) => n.as_u64()?,
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    let n = usize::try_from(n).ok()?;
    (1..=len).contains(&n).then(|| n - 1)
}

fn strip_code_fence(s: &str) -> &str {
    let t = s.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn classify(&self, batch: &[Item]) -> Result<Vec<EnrichedItem>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = build_prompt(batch);
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.1,
            max_tokens: 4000,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("openai request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("openai HTTP {status}: {}", body.chars().take(200).collect::<String>());
        }

        let body: Resp = resp.json().await.context("decode openai response")?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("no response from openai"))?;

        parse_categorization(&content, batch, Utc::now())
    }

    fn name(&self) -> &str {
        "openai"
    }
}
