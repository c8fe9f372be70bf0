//! Anthropic Messages API adapter.
//!
//! Generalizes the teacher's `backends::AnthropicAdapter` schema translation
//! (system-message hoisting, finish-reason mapping) from a fixed OpenAI<->
//! Anthropic passthrough into the provider-agnostic
//! `chat`/`chat_stream`/`list_models` contract of spec.md §4.3. Anthropic has
//! no `/v1/models` endpoint, so `list_models` returns an empty list rather
//! than erroring (spec.md §4.3: "some providers do not list models").

use std::time::Duration;

use futures_util::StreamExt as _;
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::ProviderError;
use crate::providers::descriptor::{ChatResponse, Model, NormalizedMessage, Role};

use super::TokenStream;

const DEFAULT_MAX_TOKENS: u64 = 8_192;
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug)]
pub struct AnthropicAdapter {
    client: Client,
    stream_client: Client,
    base_url: String,
}

impl AnthropicAdapter {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .expect("failed to build reqwest client");
        let stream_client = Client::builder().build().expect("failed to build streaming reqwest client");
        Self { client, stream_client, base_url: base_url.into() }
    }

    /// Hoist system messages to the top-level `system` field — Anthropic has
    /// no system role in its `messages` array.
    fn build_body(model: &str, messages: &[NormalizedMessage], stream: bool) -> Value {
        let mut system_parts = Vec::new();
        let mut wire_messages = Vec::with_capacity(messages.len());
        for m in messages {
            match m.role {
                Role::System => system_parts.push(m.content.as_str()),
                Role::User => wire_messages.push(json!({ "role": "user", "content": m.content })),
                Role::Assistant => wire_messages.push(json!({ "role": "assistant", "content": m.content })),
            }
        }

        let mut body = json!({
            "model": model,
            "max_tokens": DEFAULT_MAX_TOKENS,
            "messages": wire_messages,
            "stream": stream,
        });
        if !system_parts.is_empty() {
            body["system"] = Value::String(system_parts.join("\n\n"));
        }
        body
    }

    pub async fn list_models(&self, _credential: &str) -> Result<Vec<Model>, ProviderError> {
        Ok(Vec::new())
    }

    pub async fn chat(&self, credential: &str, model: &str, messages: &[NormalizedMessage]) -> Result<ChatResponse, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::build_body(model, messages, false);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", credential)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ProviderError::Upstream { provider: "anthropic".to_string(), status: status.as_u16(), message: text });
        }

        let parsed: Value = serde_json::from_str(&text).map_err(|e| ProviderError::Upstream {
            provider: "anthropic".to_string(),
            status: status.as_u16(),
            message: format!("invalid JSON response: {e}"),
        })?;
        let content = parsed["content"]
            .as_array()
            .and_then(|blocks| blocks.iter().find(|b| b["type"] == "text"))
            .and_then(|b| b["text"].as_str())
            .unwrap_or_default()
            .to_string();
        Ok(ChatResponse { content })
    }

    pub async fn chat_stream(&self, credential: &str, model: &str, messages: &[NormalizedMessage]) -> Result<TokenStream, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::build_body(model, messages, true);
        let response = self
            .stream_client
            .post(&url)
            .header("x-api-key", credential)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream { provider: "anthropic".to_string(), status: status.as_u16(), message });
        }

        let byte_stream = response.bytes_stream();
        let token_stream = byte_stream.filter_map(|chunk| async move {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => return Some(Err(ProviderError::Transport(e))),
            };
            let text = String::from_utf8_lossy(&chunk).to_string();
            let mut out = Vec::new();
            for line in text.lines() {
                let Some(payload) = line.strip_prefix("data: ") else { continue };
                let Ok(frame) = serde_json::from_str::<Value>(payload) else { continue };
                if frame["type"] == "content_block_delta" {
                    if let Some(token) = frame["delta"]["text"].as_str() {
                        out.push(Ok(token.to_string()));
                    }
                }
            }
            if out.is_empty() { None } else { Some(out.remove(0)) }
        });
        Ok(Box::pin(token_stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn build_body_hoists_system_message_to_top_level() {
        let messages = vec![NormalizedMessage::system("be terse"), NormalizedMessage::user("hi")];
        let body = AnthropicAdapter::build_body("claude-test", &messages, false);
        assert_eq!(body["system"], "be terse");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn chat_extracts_text_block() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{ "type": "text", "text": "hello back" }]
            })))
            .mount(&server)
            .await;

        let adapter = AnthropicAdapter::new(server.uri(), 5_000);
        let resp = adapter.chat("sk-ant-test", "claude-test", &[NormalizedMessage::user("hi")]).await.unwrap();
        assert_eq!(resp.content, "hello back");
    }

    #[tokio::test]
    async fn list_models_is_empty_for_anthropic() {
        let adapter = AnthropicAdapter::new("http://unused", 5_000);
        assert!(adapter.list_models("sk-ant-test").await.unwrap().is_empty());
    }
}
