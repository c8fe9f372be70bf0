//! Shared data model — §3 of the design spec.
//!
//! These types are passed between the Router, Memory Engine, Provider
//! Abstraction and Channel Gateway; none of them owns more than one of these
//! collaborators (see the Ownership note in §3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Totally ordered: URGENT > NORMAL > BACKGROUND.
///
/// Derives `Ord` from declaration order, so `Priority::Urgent > Priority::Normal`
/// falls out of `#[derive(PartialOrd, Ord)]` without a manual impl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Background,
    Normal,
    Urgent,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Priority::Urgent => "URGENT",
            Priority::Normal => "NORMAL",
            Priority::Background => "BACKGROUND",
        })
    }
}

/// Where a task's tokens are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Route {
    Local,
    Cloud,
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Route::Local => "LOCAL",
            Route::Cloud => "CLOUD",
        })
    }
}

/// One unit of work: a single user message to be answered.
///
/// Immutable after admission except for the derived fields computed during
/// scoring (`complexity`, `priority`, `route`, `realtime`, `privacy_flag`,
/// `context`), which are filled in synchronously by the router before the
/// task ever reaches the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub channel_id: String,
    pub user_id: String,
    pub message: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub arrived_at: DateTime<Utc>,

    // Derived on admission by `score_and_route`.
    pub complexity: u8,
    pub priority: Priority,
    pub route: Route,
    pub realtime: bool,
    pub privacy_flag: bool,
    pub context: Option<String>,
}

impl Task {
    /// Build a fresh, unscored task. Callers pass this to the router, which
    /// fills in the derived fields before admission.
    pub fn new(channel_id: impl Into<String>, user_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            message: message.into(),
            metadata: HashMap::new(),
            arrived_at: Utc::now(),
            complexity: 0,
            priority: Priority::Background,
            route: Route::Local,
            realtime: false,
            privacy_flag: false,
            context: None,
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A bounded, content-addressed slice of a document — spec §3 `MemoryChunk`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryChunk {
    /// `<docId>_chunk_<i>`
    pub key: String,
    pub doc_id: String,
    pub index: usize,
    pub text: String,
    /// First 16 bytes of SHA-256(text), big-endian u128 — the content address.
    pub fingerprint: u128,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// Role of a [`ConversationTurn`] within a (channel, user) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One stored turn of a conversation — spec §3 `ConversationTurn`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub key: String,
    pub channel_id: String,
    pub user_id: String,
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A mapping from provider ID to secret string, optionally encrypted at rest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialBundle {
    pub secrets: HashMap<String, String>,
}

/// On-disk representation of a [`CredentialBundle`] — either stored in plain
/// form or as an opaque AEAD envelope (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredCredentials {
    Plain(CredentialBundle),
    Encrypted(EncryptedEnvelope),
}

/// `{ciphertext, salt, iv, encrypted=true}` — spec §6 envelope shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub salt: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub iv: Vec<u8>,
    pub encrypted: bool,
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// Routing mode — spec §3 `RouterConfig.mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    Auto,
    Local,
    Cloud,
}

impl Default for RoutingMode {
    fn default() -> Self {
        RoutingMode::Auto
    }
}

/// Live routing configuration — spec §3 `RouterConfig`. Swapped atomically as
/// a whole record (§5: "a scoring decision always sees one consistent
/// configuration").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub mode: RoutingMode,
    #[serde(default = "RouterConfig::default_threshold")]
    pub threshold: u8,
    #[serde(default)]
    pub privacy_mode: bool,
}

impl RouterConfig {
    fn default_threshold() -> u8 {
        6
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            mode: RoutingMode::Auto,
            threshold: Self::default_threshold(),
            privacy_mode: false,
        }
    }
}

/// Executor availability — mutated by the Inference Engine and by
/// credential/network probes (spec §3 `ExecutorStatus`).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExecutorStatus {
    pub local_model_loaded: bool,
    pub cloud_available: bool,
}

/// Snapshot of router state returned by `status()` — a copy, never a
/// reference into the live queue (§3 Ownership).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSnapshot {
    pub queue_len: usize,
    pub current: Option<String>,
    pub urgent_count: usize,
    pub normal_count: usize,
    pub background_count: usize,
}

/// Reason a task was dropped on queue overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    QueueOverflow,
}

/// Internal pub/sub event stream — spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TaskEvent {
    Ready,
    Queued { id: String, position: usize },
    Routed {
        id: String,
        route: Route,
        complexity: u8,
        priority: Priority,
        realtime: bool,
        privacy_flag: bool,
    },
    Stream { id: String, token: String },
    Complete { id: String, response: String },
    Preempted { id: String },
    Cancelled { id: String },
    Dropped { id: String, reason: DropReason },
    Error { id: String, error: String },
    Status(RouterSnapshot),
}

/// Result of a `submit()` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAck {
    pub id: String,
    pub queued_position: Option<usize>,
}

/// Result of a `cancel()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Cancelled,
    NotFound,
    AlreadyRunning,
}
