// Path and File Name : /root/crate/gateway/src/generation/llm.rs
// Details of functionality of this file: the LLM client seam. A trait so the generator can be
// tested against a fake, plus a reqwest-based implementation of the Groq-compatible chat-completions
// wire contract (spec §6 LLM wire contract).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::Settings;
use crate::error::{GatewayError, GatewayResult};
use crate::session::IntentSummary;

#[derive(Debug, Clone)]
pub struct LlmCompletion {
    pub sql: String,
    pub confidence: f64,
    pub tables_used: Vec<String>,
    pub intent_summary: IntentSummary,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> GatewayResult<LlmCompletion>;
}

pub struct HttpLlmClient {
    client: reqwest::Client,
    settings: Settings,
}

impl HttpLlmClient {
    pub fn new(settings: Settings) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.llm_timeout_seconds))
            .build()
            .map_err(|e| GatewayError::Generation(e.to_string()))?;
        Ok(Self { client, settings })
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct GeneratedSqlPayload {
    sql: String,
    confidence: f64,
    tables_used: Vec<String>,
    #[serde(default)]
    intent_summary: IntentSummary,
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> GatewayResult<LlmCompletion> {
        let body = json!({
            "model": self.settings.llm_model,
            "temperature": self.settings.llm_temperature,
            "max_tokens": self.settings.llm_max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .client
            .post("https://api.groq.com/openai/v1/chat/completions")
            .bearer_auth(&self.settings.llm_api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Generation(format!("llm request failed: {e}")))?;

        let parsed: ChatCompletionResponse = response
            .error_for_status()
            .map_err(|e| GatewayError::Generation(format!("llm returned an error status: {e}")))?
            .json()
            .await
            .map_err(|e| GatewayError::Generation(format!("llm response decode failed: {e}")))?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| GatewayError::Generation("llm returned no choices".to_string()))?;

        let payload = extract_json_payload(&content)?;
        Ok(LlmCompletion {
            sql: payload.sql,
            confidence: payload.confidence,
            tables_used: payload.tables_used,
            intent_summary: payload.intent_summary,
        })
    }
}

/// Strips Markdown code fences if present, then finds the first balanced `{...}` block, since
/// models occasionally wrap JSON in prose despite being asked not to.
fn extract_json_payload(content: &str) -> GatewayResult<GeneratedSqlPayload> {
    let stripped = strip_fences(content);
    let candidate = extract_balanced_braces(&stripped)
        .ok_or_else(|| GatewayError::Generation("no JSON object found in llm response".to_string()))?;

    if let Ok(payload) = serde_json::from_str(&candidate) {
        return Ok(payload);
    }

    // Last resort: models occasionally emit raw newlines/tabs inside a JSON string value instead
    // of the escaped form, which breaks strict parsing even though the braces balance. Escape
    // those control characters and retry once; reject rather than guess further if it still fails.
    let sanitized = sanitize_control_characters(&candidate);
    serde_json::from_str(&sanitized)
        .map_err(|e| GatewayError::Generation(format!("llm response was not valid JSON: {e}")))
}

fn sanitize_control_characters(candidate: &str) -> String {
    let mut out = String::with_capacity(candidate.len());
    let mut in_string = false;
    let mut escaped = false;
    for ch in candidate.chars() {
        if escaped {
            out.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => {
                out.push(ch);
                escaped = true;
            }
            '"' => {
                in_string = !in_string;
                out.push(ch);
            }
            '\n' if in_string => out.push_str("\\n"),
            '\r' if in_string => out.push_str("\\r"),
            '\t' if in_string => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}

fn strip_fences(content: &str) -> String {
    let trimmed = content.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        rest.trim_end_matches("```").trim().to_string()
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest.trim_end_matches("```").trim().to_string()
    } else {
        trimmed.to_string()
    }
}

fn extract_balanced_braces(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    for (i, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}
