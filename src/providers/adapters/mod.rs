//! Concrete provider adapters. Each implements the same three operations
//! — `list_models`, `chat`, `chat_stream` — against its own wire format,
//! generalizing the teacher's `backends::{OpenAIAdapter, AnthropicAdapter,
//! OllamaAdapter}` from a fixed OpenAI-schema passthrough into the
//! provider-agnostic contract of spec.md §4.3.

pub mod anthropic;
pub mod local;
pub mod openai;

use std::pin::Pin;

use futures_util::Stream;

use crate::error::ProviderError;

/// A `Send`-able stream of decoded tokens. Malformed frames are skipped
/// inside the adapter, never surfaced here (spec §4.3 "Failure semantics").
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

pub use anthropic::AnthropicAdapter;
pub use local::LocalAdapter;
pub use openai::OpenAIAdapter;
