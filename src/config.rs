//! On-disk configuration — spec.md §6 "Configuration options", loaded and
//! hot-reloaded the way the teacher's `Config` is: `AppConfig::load` reads
//! and parses TOML, `validate()` rejects anything inconsistent before the
//! rest of the crate ever sees it, and `main.rs::config_watcher` polls the
//! file's mtime and calls `load` again on change.
//!
//! Sized to this crate's domain rather than the teacher's tiers/profiles/
//! aliases/clients multi-tenant model: a `routing` section feeding
//! `RouterConfig` directly, a `memory` section, a bounded `queue` section,
//! a `gateway` section (bind port, rate limit, bot credentials), and a
//! `providers` map keyed by provider ID.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};

use crate::types::{RouterConfig, RoutingMode};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub routing: RoutingSection,
    #[serde(default)]
    pub memory: MemorySection,
    #[serde(default)]
    pub queue: QueueSection,
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

impl AppConfig {
    /// Load, parse and validate a config file from disk.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.routing.threshold <= 10, "routing.threshold must be in [0, 10], got {}", self.routing.threshold);
        ensure!(self.memory.chunk_size > 0, "memory.chunkSize must be positive");
        ensure!(self.memory.top_k > 0, "memory.topK must be positive");
        ensure!(self.memory.min_score >= 0.0, "memory.minScore must be non-negative");
        ensure!(self.queue.max_depth > 0, "queue.maxDepth must be positive");
        ensure!(
            self.queue.background_victim_policy == "oldest",
            "queue.backgroundVictimPolicy: only \"oldest\" is supported, got \"{}\"",
            self.queue.background_victim_policy
        );
        for (id, provider) in &self.providers {
            ensure!(!provider.base_url.is_empty(), "provider `{id}` is missing base_url");
            ensure!(
                matches!(provider.kind.as_str(), "openai" | "anthropic" | "local"),
                "provider `{id}` has unknown kind \"{}\" (expected openai, anthropic or local)",
                provider.kind
            );
        }
        Ok(())
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            mode: self.routing.mode,
            threshold: self.routing.threshold,
            privacy_mode: self.routing.privacy_mode,
        }
    }

    /// The first non-local provider, used as the Router's default CLOUD
    /// route target when a task's route resolves to Cloud.
    pub fn default_cloud_provider(&self) -> Option<&str> {
        self.providers
            .iter()
            .find(|(_, cfg)| cfg.kind != "local")
            .map(|(id, _)| id.as_str())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            routing: RoutingSection::default(),
            memory: MemorySection::default(),
            queue: QueueSection::default(),
            gateway: GatewaySection::default(),
            providers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingSection {
    #[serde(default)]
    pub mode: RoutingMode,
    #[serde(default = "defaults::threshold")]
    pub threshold: u8,
    #[serde(default)]
    pub privacy_mode: bool,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self { mode: RoutingMode::default(), threshold: defaults::threshold(), privacy_mode: false }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySection {
    #[serde(default = "defaults::chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "defaults::top_k")]
    pub top_k: usize,
    #[serde(default = "defaults::min_score")]
    pub min_score: f64,
    #[serde(default = "defaults::cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            chunk_size: defaults::chunk_size(),
            top_k: defaults::top_k(),
            min_score: defaults::min_score(),
            cache_capacity: defaults::cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSection {
    #[serde(default = "defaults::max_depth")]
    pub max_depth: usize,
    #[serde(default = "defaults::background_victim_policy")]
    pub background_victim_policy: String,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self { max_depth: defaults::max_depth(), background_victim_policy: defaults::background_victim_policy() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewaySection {
    #[serde(default = "defaults::port")]
    pub port: u16,
    #[serde(default = "defaults::rate_limit_rpm")]
    pub rate_limit_rpm: u32,
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Base URL of the external bot API (e.g. `https://api.telegram.org/bot<token>`).
    /// The long-poll worker is not started when this is absent.
    #[serde(default)]
    pub bot_api_base: Option<String>,
    #[serde(default)]
    pub bot_token_env: Option<String>,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            port: defaults::port(),
            rate_limit_rpm: defaults::rate_limit_rpm(),
            poll_interval_ms: defaults::poll_interval_ms(),
            bot_api_base: None,
            bot_token_env: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// `"openai"`, `"anthropic"` or `"local"`.
    pub kind: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,
    /// Display-only model identifier surfaced by `GET /api/status`.
    #[serde(default)]
    pub model: Option<String>,
}

impl ProviderConfig {
    /// Resolve the API key from `api_key_env`. `local` providers have none.
    pub fn api_key(&self) -> anyhow::Result<Option<String>> {
        match &self.api_key_env {
            Some(var) => {
                let key = std::env::var(var).with_context(|| format!("environment variable `{var}` is not set"))?;
                Ok(Some(key))
            }
            None => Ok(None),
        }
    }
}

mod defaults {
    pub fn threshold() -> u8 {
        6
    }
    pub fn chunk_size() -> usize {
        300
    }
    pub fn top_k() -> usize {
        8
    }
    pub fn min_score() -> f64 {
        0.1
    }
    pub fn cache_capacity() -> usize {
        256
    }
    pub fn max_depth() -> usize {
        50
    }
    pub fn background_victim_policy() -> String {
        "oldest".to_string()
    }
    pub fn port() -> u16 {
        8080
    }
    pub fn rate_limit_rpm() -> u32 {
        120
    }
    pub fn poll_interval_ms() -> u64 {
        2_000
    }
    pub fn timeout_ms() -> u64 {
        30_000
    }
}
