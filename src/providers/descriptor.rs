//! Wire-independent types shared by every provider adapter — spec §4.3
//! "Normalized Message" and "Provider descriptor".

use serde::{Deserialize, Serialize};

/// A chat message role, normalized across providers that use different
/// vocabularies for the same three concepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// `{role, content}` — the provider-agnostic message shape the Router
/// builds and every adapter translates into its own wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub role: Role,
    pub content: String,
}

impl NormalizedMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// One entry returned by `list_models`. Curated model metadata (pricing,
/// context windows, capability flags) is a static registry out of this
/// crate's scope per spec.md §1 — only identity is carried here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub name: String,
}

/// A single non-streaming chat response, normalized across providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
}
