//! OpenAI-compatible adapter — also serves OpenRouter and any other backend
//! speaking the `/v1/chat/completions` + `/v1/models` dialect.
//!
//! Generalized from the teacher's `backends::OpenAIAdapter`, which proxied a
//! fixed OpenAI-shaped body verbatim. Here the adapter builds that body
//! itself from [`NormalizedMessage`]s and a bare `model`/`credential` pair,
//! per spec.md §4.3's `chat(credential, model, messages, stream)` contract.

use std::time::Duration;

use futures_util::StreamExt as _;
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::ProviderError;
use crate::providers::descriptor::{ChatResponse, Model, NormalizedMessage, Role};

use super::TokenStream;

#[derive(Debug)]
pub struct OpenAIAdapter {
    client: Client,
    stream_client: Client,
    base_url: String,
}

impl OpenAIAdapter {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .expect("failed to build reqwest client");
        let stream_client = Client::builder().build().expect("failed to build streaming reqwest client");
        Self { client, stream_client, base_url: base_url.into() }
    }

    fn role_str(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    fn build_body(model: &str, messages: &[NormalizedMessage], stream: bool) -> Value {
        let wire_messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({ "role": Self::role_str(m.role), "content": m.content }))
            .collect();
        json!({ "model": model, "messages": wire_messages, "stream": stream })
    }

    pub async fn list_models(&self, credential: &str) -> Result<Vec<Model>, ProviderError> {
        let url = format!("{}/v1/models", self.base_url);
        let response = self.client.get(&url).bearer_auth(credential).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Upstream {
                provider: "openai".to_string(),
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let body: Value = response.json().await?;
        let models = body["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str())
                    .map(|id| Model { id: id.to_string(), name: id.to_string() })
                    .collect()
            })
            .unwrap_or_default();
        Ok(models)
    }

    pub async fn chat(&self, credential: &str, model: &str, messages: &[NormalizedMessage]) -> Result<ChatResponse, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = Self::build_body(model, messages, false);
        let response = self.client.post(&url).bearer_auth(credential).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ProviderError::Upstream { provider: "openai".to_string(), status: status.as_u16(), message: text });
        }
        let parsed: Value = serde_json::from_str(&text).map_err(|e| ProviderError::Upstream {
            provider: "openai".to_string(),
            status: status.as_u16(),
            message: format!("invalid JSON response: {e}"),
        })?;
        let content = parsed["choices"][0]["message"]["content"].as_str().unwrap_or_default().to_string();
        Ok(ChatResponse { content })
    }

    pub async fn chat_stream(&self, credential: &str, model: &str, messages: &[NormalizedMessage]) -> Result<TokenStream, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = Self::build_body(model, messages, true);
        let response = self.stream_client.post(&url).bearer_auth(credential).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream { provider: "openai".to_string(), status: status.as_u16(), message });
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
                if payload.trim() == "[DONE]" {
                    continue;
                }
                let Ok(frame) = serde_json::from_str::<Value>(payload) else { continue };
                if let Some(token) = frame["choices"][0]["delta"]["content"].as_str() {
                    out.push(Ok(token.to_string()));
                }
            }
            if out.is_empty() { None } else { Some(out.remove(0)) }
        });
        Ok(Box::pin(token_stream))
    }
}
