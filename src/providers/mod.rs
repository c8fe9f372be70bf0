//! Provider Abstraction — spec §4.3.
//!
//! One contract — `list_models`, `chat`, `chat_stream` — dispatched over
//! enum-wrapped adapters, the same shape as the teacher's
//! `backends::BackendClient`. [`ProviderRegistry`] replaces the teacher's
//! single-backend-per-process `BackendClient::new` with a lookup keyed by
//! provider ID, since this crate talks to N cloud providers plus the local
//! executor concurrently.

pub mod adapters;
pub mod descriptor;

use std::collections::HashMap;

use crate::error::ProviderError;

pub use adapters::{AnthropicAdapter, LocalAdapter, OpenAIAdapter, TokenStream};
pub use descriptor::{ChatResponse, Model, NormalizedMessage, Role};

/// Per-provider connection settings — the "provider descriptor" of spec.md
/// §4.3, reduced to what an adapter constructor needs (base URL, timeout);
/// header/request building and frame parsing live in the adapter itself.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    pub id: String,
    pub base_url: String,
    pub timeout_ms: u64,
}

/// Enum dispatch over the concrete adapters, mirroring the teacher's
/// `BackendClient`.
#[derive(Debug)]
pub enum ProviderClient {
    OpenAI(OpenAIAdapter),
    Anthropic(AnthropicAdapter),
    Local(LocalAdapter),
}

impl ProviderClient {
    pub fn from_descriptor(kind: &str, desc: &ProviderDescriptor) -> Self {
        match kind {
            "anthropic" => Self::Anthropic(AnthropicAdapter::new(desc.base_url.clone(), desc.timeout_ms)),
            "local" => Self::Local(LocalAdapter::new(desc.base_url.clone(), desc.timeout_ms)),
            _ => Self::OpenAI(OpenAIAdapter::new(desc.base_url.clone(), desc.timeout_ms)),
        }
    }

    pub async fn list_models(&self, credential: Option<&str>) -> Result<Vec<Model>, ProviderError> {
        match self {
            Self::OpenAI(a) => a.list_models(credential.unwrap_or_default()).await,
            Self::Anthropic(a) => a.list_models(credential.unwrap_or_default()).await,
            Self::Local(a) => a.list_models().await,
        }
    }

    pub async fn chat(&self, credential: Option<&str>, model: &str, messages: &[NormalizedMessage]) -> Result<ChatResponse, ProviderError> {
        match self {
            Self::OpenAI(a) => a.chat(credential.unwrap_or_default(), model, messages).await,
            Self::Anthropic(a) => a.chat(credential.unwrap_or_default(), model, messages).await,
            Self::Local(a) => a.chat(model, messages).await,
        }
    }

    pub async fn chat_stream(&self, credential: Option<&str>, model: &str, messages: &[NormalizedMessage]) -> Result<TokenStream, ProviderError> {
        match self {
            Self::OpenAI(a) => a.chat_stream(credential.unwrap_or_default(), model, messages).await,
            Self::Anthropic(a) => a.chat_stream(credential.unwrap_or_default(), model, messages).await,
            Self::Local(a) => a.chat_stream(model, messages).await,
        }
    }
}

/// Registry of configured providers, keyed by provider ID. Built once at
/// startup from `AppConfig.providers` and handed to the Router behind an
/// `Arc` (spec §5: providers run independently of the scheduling loop).
///
/// Credentials are resolved once at registration time (from the env var the
/// config names) and cached alongside the client, the way the teacher's
/// `BackendConfig::api_key()` resolves its env var eagerly rather than on
/// every call.
#[derive(Default)]
pub struct ProviderRegistry {
    clients: HashMap<String, ProviderClient>,
    credentials: HashMap<String, String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self { clients: HashMap::new(), credentials: HashMap::new() }
    }

    pub fn register(&mut self, id: impl Into<String>, kind: &str, base_url: impl Into<String>, timeout_ms: u64) {
        let id = id.into();
        let descriptor = ProviderDescriptor { id: id.clone(), base_url: base_url.into(), timeout_ms };
        self.clients.insert(id, ProviderClient::from_descriptor(kind, &descriptor));
    }

    /// Same as [`Self::register`] plus a resolved API credential, used by
    /// every non-local provider.
    pub fn register_with_credential(&mut self, id: impl Into<String>, kind: &str, base_url: impl Into<String>, timeout_ms: u64, credential: impl Into<String>) {
        let id = id.into();
        self.credentials.insert(id.clone(), credential.into());
        self.register(id, kind, base_url, timeout_ms);
    }

    pub fn get(&self, provider_id: &str) -> Result<&ProviderClient, ProviderError> {
        self.clients.get(provider_id).ok_or_else(|| ProviderError::UnknownProvider(provider_id.to_string()))
    }

    pub fn credential_for(&self, provider_id: &str) -> Option<&str> {
        self.credentials.get(provider_id).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_id_is_rejected() {
        let registry = ProviderRegistry::new();
        let err = registry.get("nonexistent").unwrap_err();
        assert!(matches!(err, ProviderError::UnknownProvider(id) if id == "nonexistent"));
    }

    #[test]
    fn registered_provider_is_retrievable() {
        let mut registry = ProviderRegistry::new();
        registry.register("local", "local", "http://127.0.0.1:11434", 30_000);
        assert!(registry.get("local").is_ok());
    }
}
