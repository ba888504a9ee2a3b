//! Gemini `generateContent` client for structured strategy answers.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, instrument};

use super::fingerprint::MatchupQuery;
use super::{StrategyData, WebRef, WebSource};
use crate::error::{CopilotError, Result};
use crate::templates;

/// At most this many citations are kept from grounding metadata.
pub const MAX_SOURCES: usize = 3;
/// Title used for a citation that arrives without one.
pub const DEFAULT_SOURCE_TITLE: &str = "参考资料";

const TEMPERATURE: f32 = 0.1;

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    /// Attach the Google Search grounding tool to requests.
    pub web_search: bool,
}

pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(client: reqwest::Client, config: GeminiConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn build_headers(&self) -> Result<HeaderMap> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(CopilotError::MissingApiKey)?;

        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let _ = headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(api_key)
                .map_err(|e| CopilotError::Custom(format!("Invalid API key header: {e}")))?,
        );
        Ok(headers)
    }

    /// Request body: one user turn, JSON output constrained to the strategy schema.
    pub fn build_request_body(&self, prompt: &str) -> Value {
        let mut body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": templates::strategy_response_schema(),
                "temperature": TEMPERATURE,
            },
        });
        if self.config.web_search {
            body["tools"] = json!([{ "google_search": {} }]);
        }
        body
    }

    /// One best-effort call. No retry: any failure goes straight to the caller.
    #[instrument(skip_all, fields(model = %self.config.model, role = %query.role))]
    pub async fn generate(&self, query: &MatchupQuery) -> Result<StrategyData> {
        let headers = self.build_headers()?;
        let prompt = templates::strategy_prompt(
            query.role,
            &query.my_champion,
            &query.opponent,
            query.context(),
        );
        let body = self.build_request_body(&prompt);

        debug!(
            my_champion = %query.my_champion,
            opponent = %query.opponent,
            web_search = self.config.web_search,
            "Requesting strategy from Gemini"
        );

        let response = self
            .client
            .post(self.endpoint())
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let message = parse_api_error(&text, status.as_u16());
            error!(status = status.as_u16(), message = %message, "Gemini API error");
            return Err(CopilotError::Ai {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text)
            .map_err(|e| CopilotError::MalformedStrategy(format!("response envelope: {e}")))?;
        parse_strategy(parsed)
    }
}

// ── Response types ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebChunk>,
}

#[derive(Debug, Deserialize)]
struct WebChunk {
    uri: Option<String>,
    title: Option<String>,
}

/// Schema fields as the model emits them, before normalization.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStrategy {
    summary: String,
    early_game: Vec<String>,
    mid_game: Vec<String>,
    late_game: Vec<String>,
    matchup_tips: String,
    #[serde(default)]
    recommended_creator: Option<String>,
}

fn parse_strategy(response: GenerateContentResponse) -> Result<StrategyData> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| CopilotError::MalformedStrategy("no candidates returned".into()))?;

    let text: String = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter(|p| !p.thought)
                .filter_map(|p| p.text)
                .collect()
        })
        .unwrap_or_default();

    let raw: RawStrategy = serde_json::from_str(strip_code_fence(&text))
        .map_err(|e| CopilotError::MalformedStrategy(e.to_string()))?;

    let sources = candidate
        .grounding_metadata
        .map(|m| extract_sources(m.grounding_chunks))
        .unwrap_or_default();

    let mut data = StrategyData {
        summary: raw.summary,
        early_game: raw.early_game,
        mid_game: raw.mid_game,
        late_game: raw.late_game,
        matchup_tips: raw.matchup_tips,
        sources,
        recommended_creator: raw.recommended_creator,
    };
    data.normalize();
    Ok(data)
}

/// Web citations with a URI, titled by default when the title is missing.
fn extract_sources(chunks: Vec<GroundingChunk>) -> Vec<WebSource> {
    chunks
        .into_iter()
        .filter_map(|chunk| chunk.web)
        .filter_map(|web| {
            let uri = web.uri.filter(|u| !u.is_empty())?;
            let title = web
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SOURCE_TITLE.to_string());
            Some(WebSource {
                web: WebRef { uri, title },
            })
        })
        .take(MAX_SOURCES)
        .collect()
}

/// Grounded responses sometimes wrap the JSON in a markdown fence.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}

/// Pull the message out of a Google error body.
fn parse_api_error(body: &str, status: u16) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| json["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| format!("HTTP {status}: {body}"))
}
