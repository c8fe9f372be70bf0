//! Memory Engine — spec §4.2.
//!
//! Owns document chunking, fingerprinting, content-addressed storage,
//! retrieval and context assembly, and the per-channel conversation log.
//! The Router holds one [`MemoryEngine`] behind an `Arc` and calls it
//! synchronously before dispatch (spec §5: memory never blocks on the
//! network).

pub mod chunk;
pub mod context;
pub mod fingerprint;
pub mod retrieval;
pub mod store;

use std::collections::HashMap;

use serde_json::Value;

use crate::error::MemoryError;
use crate::types::{ConversationTurn, MemoryChunk, TurnRole};

pub use store::VerifyReport;

const DEFAULT_CHUNK_WORDS: usize = 300;
const DEFAULT_TOP_K: usize = 4;
const DEFAULT_MIN_SCORE: f64 = 0.1;
const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Facade over [`store::ChunkStore`] and [`store::ConversationStore`],
/// exposing the operations the Router and Channel Gateway need without
/// either having to know about chunking, fingerprinting or scoring
/// internals.
pub struct MemoryEngine {
    chunks: store::ChunkStore,
    conversations: store::ConversationStore,
    chunk_words: usize,
    top_k: usize,
    min_score: f64,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            chunks: store::ChunkStore::new(DEFAULT_CACHE_CAPACITY),
            conversations: store::ConversationStore::new(),
            chunk_words: DEFAULT_CHUNK_WORDS,
            top_k: DEFAULT_TOP_K,
            min_score: DEFAULT_MIN_SCORE,
        }
    }

    pub fn with_params(chunk_words: usize, top_k: usize, min_score: f64, cache_capacity: usize) -> Self {
        Self {
            chunks: store::ChunkStore::new(cache_capacity),
            conversations: store::ConversationStore::new(),
            chunk_words,
            top_k,
            min_score,
        }
    }

    /// Split `text` into chunks, fingerprint and store each one under
    /// `<doc_id>_chunk_<i>` — spec §4.2 "Chunking" + "Fingerprint".
    pub async fn store_document(&self, doc_id: &str, text: &str, metadata: HashMap<String, Value>) -> Vec<String> {
        let pieces = chunk::chunk_text(text, self.chunk_words);
        let mut keys = Vec::with_capacity(pieces.len());
        for (index, piece) in pieces.into_iter().enumerate() {
            let key = format!("{doc_id}_chunk_{index}");
            let chunk = MemoryChunk {
                key: key.clone(),
                doc_id: doc_id.to_string(),
                index,
                fingerprint: fingerprint::fingerprint(&piece),
                text: piece,
                metadata: metadata.clone(),
                created_at: chrono::Utc::now(),
            };
            self.chunks.store(chunk).await;
            keys.push(key);
        }
        keys
    }

    pub async fn clear_document(&self, doc_id: &str) {
        self.chunks.clear_document(doc_id).await;
    }

    /// Exhaustive TF-IDF retrieval over the full corpus — spec §4.2 step 1-5.
    pub async fn retrieve(&self, query: &str) -> Vec<String> {
        let corpus = self.chunks.all().await;
        retrieval::tfidf_retrieve(&corpus, query, self.top_k, self.min_score)
            .into_iter()
            .map(|c| c.text.clone())
            .collect()
    }

    /// Cheap set-overlap fallback over the recency cache — used by the
    /// Router when a full TF-IDF pass would cost more than the task is
    /// worth (spec §4.2 "A simpler fallback path ... MUST also be available").
    pub async fn retrieve_fallback(&self, query: &str) -> Vec<String> {
        let recent = self.chunks.recent().await;
        retrieval::fallback_retrieve(&recent, query, self.top_k)
            .into_iter()
            .map(|c| c.text.clone())
            .collect()
    }

    /// Retrieve then assemble into the final prompt — spec §4.2 "Context
    /// assembly".
    pub async fn assemble_context(&self, query: &str, message: &str) -> String {
        let chunks = self.retrieve(query).await;
        context::assemble_context(&chunks, message)
    }

    /// Total number of chunks currently stored — surfaced by `GET /admin/status`.
    pub async fn chunk_count(&self) -> usize {
        self.chunks.all().await.len()
    }

    pub async fn verify(&self, key: &str) -> Result<bool, MemoryError> {
        self.chunks.verify(key).await
    }

    pub async fn verify_all(&self) -> VerifyReport {
        self.chunks.verify_all().await
    }

    pub async fn record_turn(&self, channel_id: &str, user_id: &str, role: TurnRole, content: &str) -> ConversationTurn {
        self.conversations.record(channel_id, user_id, role, content).await
    }

    pub async fn turns_for(&self, channel_id: &str, user_id: &str) -> Vec<ConversationTurn> {
        self.conversations.turns_for(channel_id, user_id).await
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_document_then_retrieve_round_trip() {
        let engine = MemoryEngine::new();
        engine
            .store_document("doc1", "Rust is a systems programming language. It guarantees memory safety without garbage collection.", HashMap::new())
            .await;

        let hits = engine.retrieve("memory safety").await;
        assert!(!hits.is_empty());
        assert!(hits[0].contains("memory safety"));
    }

    #[tokio::test]
    async fn assemble_context_passes_through_when_nothing_retrieved() {
        let engine = MemoryEngine::new();
        let prompt = engine.assemble_context("nonexistent topic", "hello").await;
        assert_eq!(prompt, "hello");
    }

    #[tokio::test]
    async fn assemble_context_wraps_retrieved_chunks() {
        let engine = MemoryEngine::new();
        engine
            .store_document("doc1", "The quarterly report shows revenue growth of twelve percent.", HashMap::new())
            .await;

        let prompt = engine.assemble_context("quarterly report revenue", "summarize it").await;
        assert!(prompt.contains("--- MEMORY CONTEXT ---"));
        assert!(prompt.contains("Current request: summarize it"));
    }

    #[tokio::test]
    async fn clear_document_removes_its_chunks_from_retrieval() {
        let engine = MemoryEngine::new();
        engine.store_document("doc1", "Unique gizmo widget content here.", HashMap::new()).await;
        assert!(!engine.retrieve("gizmo widget").await.is_empty());

        engine.clear_document("doc1").await;
        assert!(engine.retrieve("gizmo widget").await.is_empty());
    }

    #[tokio::test]
    async fn conversation_turns_recorded_and_read_back() {
        let engine = MemoryEngine::new();
        engine.record_turn("chan", "user1", TurnRole::User, "hi there").await;
        engine.record_turn("chan", "user1", TurnRole::Assistant, "hello!").await;

        let turns = engine.turns_for("chan", "user1").await;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "hi there");
    }
}
