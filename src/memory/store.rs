//! Content-addressed chunk store + conversation turn store — spec §4.2/§3.
//!
//! Mirrors the teacher's `TrafficLog`: an async-`Mutex`-guarded collection
//! behind a small, explicit API, with writes going through a single lock
//! scoped to the mutation (spec §5: "writes take a short exclusive lock
//! scoped to the chunk key; reads take no lock").

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::MemoryError;
use crate::types::{ConversationTurn, MemoryChunk, TurnRole};

use super::fingerprint::fingerprint;

/// Outcome of `verify_all()` — spec §4.2 "Verification".
#[derive(Debug, Clone, serde::Serialize)]
pub struct VerifyReport {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub errors: Vec<VerifyError>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct VerifyError {
    pub key: String,
}

/// Content-addressed store of [`MemoryChunk`]s, with a recency cache of the
/// `cache_capacity` most recently written/read chunks (spec §4.2 "Cache").
pub struct ChunkStore {
    chunks: RwLock<HashMap<String, MemoryChunk>>,
    by_doc: RwLock<HashMap<String, Vec<String>>>,
    cache: RwLock<VecDeque<MemoryChunk>>,
    cache_capacity: usize,
}

impl ChunkStore {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
            by_doc: RwLock::new(HashMap::new()),
            cache: RwLock::new(VecDeque::with_capacity(cache_capacity)),
            cache_capacity,
        }
    }

    /// Persist a chunk. Writes go through both the store and the cache so
    /// they never diverge (spec §4.2: "Cache and store MUST remain
    /// consistent").
    pub async fn store(&self, chunk: MemoryChunk) {
        {
            let mut chunks = self.chunks.write().await;
            chunks.insert(chunk.key.clone(), chunk.clone());
        }
        {
            let mut by_doc = self.by_doc.write().await;
            by_doc.entry(chunk.doc_id.clone()).or_default().push(chunk.key.clone());
        }
        self.cache_put(chunk).await;
    }

    async fn cache_put(&self, chunk: MemoryChunk) {
        let mut cache = self.cache.write().await;
        cache.retain(|c| c.key != chunk.key);
        cache.push_back(chunk);
        while cache.len() > self.cache_capacity {
            cache.pop_front();
        }
    }

    pub async fn get(&self, key: &str) -> Option<MemoryChunk> {
        self.chunks.read().await.get(key).cloned()
    }

    /// Full corpus scan — used by exhaustive TF-IDF retrieval and by
    /// `verify_all`. Deliberately the "slow path"; `recent` below is the
    /// cache-backed fast path.
    pub async fn all(&self) -> Vec<MemoryChunk> {
        self.chunks.read().await.values().cloned().collect()
    }

    /// The cache-backed fast path: the N most recently written chunks,
    /// newest last. Used by the set-overlap retrieval fallback so a cold
    /// dispatch doesn't pay for a full store scan.
    pub async fn recent(&self) -> Vec<MemoryChunk> {
        self.cache.read().await.iter().cloned().collect()
    }

    /// Drop every chunk belonging to `doc_id` from both store and cache.
    pub async fn clear_document(&self, doc_id: &str) {
        let keys = {
            let mut by_doc = self.by_doc.write().await;
            by_doc.remove(doc_id).unwrap_or_default()
        };
        if keys.is_empty() {
            return;
        }
        let mut chunks = self.chunks.write().await;
        for key in &keys {
            chunks.remove(key);
        }
        drop(chunks);
        let mut cache = self.cache.write().await;
        cache.retain(|c| c.doc_id != doc_id);
    }

    /// Recompute the fingerprint from stored text and compare to the stored
    /// value — spec §4.2 "Verification", invariant I-M1.
    pub async fn verify(&self, key: &str) -> Result<bool, MemoryError> {
        let chunk = self
            .get(key)
            .await
            .ok_or_else(|| MemoryError::NotFound(key.to_string()))?;
        Ok(fingerprint(&chunk.text) == chunk.fingerprint)
    }

    /// Verify every stored chunk; never aborts on the first failure — a bad
    /// chunk is reported, not propagated (spec §7: "Integrity errors do not
    /// corrupt retrieval").
    pub async fn verify_all(&self) -> VerifyReport {
        let chunks = self.chunks.read().await;
        let total = chunks.len();
        let mut valid = 0;
        let mut errors = Vec::new();
        for chunk in chunks.values() {
            if fingerprint(&chunk.text) == chunk.fingerprint {
                valid += 1;
            } else {
                errors.push(VerifyError { key: chunk.key.clone() });
            }
        }
        VerifyReport {
            total,
            valid,
            invalid: errors.len(),
            errors,
        }
    }

    /// Test/ops-only hook: corrupt a stored chunk's text without touching its
    /// fingerprint, simulating out-of-band corruption (used by the §8
    /// scenario 6 integrity test).
    #[cfg(test)]
    pub async fn corrupt_text(&self, key: &str, new_text: &str) {
        if let Some(chunk) = self.chunks.write().await.get_mut(key) {
            chunk.text = new_text.to_string();
        }
    }
}

/// Append-only store of [`ConversationTurn`]s, read back oldest-first per
/// (channel, user) pair. Enforces I-C1 (non-decreasing timestamps within a
/// pair) by construction: `record` always timestamps with `Utc::now()`,
/// which is monotonic for a single process.
pub struct ConversationStore {
    turns: RwLock<HashMap<(String, String), Vec<ConversationTurn>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            turns: RwLock::new(HashMap::new()),
        }
    }

    pub async fn record(&self, channel_id: &str, user_id: &str, role: TurnRole, content: &str) -> ConversationTurn {
        let now = Utc::now();
        let turn = ConversationTurn {
            key: uuid::Uuid::new_v4().to_string(),
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
            role,
            content: content.to_string(),
            timestamp: now,
        };
        let mut turns = self.turns.write().await;
        turns
            .entry((channel_id.to_string(), user_id.to_string()))
            .or_default()
            .push(turn.clone());
        turn
    }

    /// Oldest-first turns for a (channel, user) pair.
    pub async fn turns_for(&self, channel_id: &str, user_id: &str) -> Vec<ConversationTurn> {
        self.turns
            .read()
            .await
            .get(&(channel_id.to_string(), user_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdMap;

    fn make_chunk(key: &str, doc_id: &str, text: &str) -> MemoryChunk {
        MemoryChunk {
            key: key.to_string(),
            doc_id: doc_id.to_string(),
            index: 0,
            text: text.to_string(),
            fingerprint: fingerprint(text),
            metadata: StdMap::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn store_and_get_roundtrip() {
        let store = ChunkStore::new(10);
        let chunk = make_chunk("doc_chunk_0", "doc", "hello world");
        store.store(chunk.clone()).await;
        let fetched = store.get("doc_chunk_0").await.unwrap();
        assert_eq!(fetched.text, "hello world");
    }

    #[tokio::test]
    async fn verify_all_reports_valid_and_invalid() {
        let store = ChunkStore::new(10);
        store.store(make_chunk("a_chunk_0", "a", "A.")).await;
        store.store(make_chunk("a_chunk_1", "a", "B.")).await;
        store.store(make_chunk("a_chunk_2", "a", "C.")).await;

        let report = store.verify_all().await;
        assert_eq!(report.total, 3);
        assert_eq!(report.valid, 3);
        assert_eq!(report.invalid, 0);

        store.corrupt_text("a_chunk_1", "corrupted!").await;
        let report = store.verify_all().await;
        assert_eq!(report.valid, 2);
        assert_eq!(report.invalid, 1);
        assert_eq!(report.errors[0].key, "a_chunk_1");
    }

    #[tokio::test]
    async fn clear_document_removes_all_its_chunks() {
        let store = ChunkStore::new(10);
        store.store(make_chunk("a_chunk_0", "a", "x")).await;
        store.store(make_chunk("a_chunk_1", "a", "y")).await;
        store.store(make_chunk("b_chunk_0", "b", "z")).await;

        store.clear_document("a").await;

        assert!(store.get("a_chunk_0").await.is_none());
        assert!(store.get("a_chunk_1").await.is_none());
        assert!(store.get("b_chunk_0").await.is_some());
    }

    #[tokio::test]
    async fn cache_evicts_oldest_beyond_capacity() {
        let store = ChunkStore::new(2);
        store.store(make_chunk("d_chunk_0", "d", "one")).await;
        store.store(make_chunk("d_chunk_1", "d", "two")).await;
        store.store(make_chunk("d_chunk_2", "d", "three")).await;

        let recent = store.recent().await;
        assert_eq!(recent.len(), 2);
        assert!(recent.iter().all(|c| c.key != "d_chunk_0"));
    }

    #[tokio::test]
    async fn turns_are_returned_oldest_first() {
        let store = ConversationStore::new();
        store.record("c1", "u1", TurnRole::User, "hi").await;
        store.record("c1", "u1", TurnRole::Assistant, "hello").await;
        store.record("c1", "u1", TurnRole::User, "how are you").await;

        let turns = store.turns_for("c1", "u1").await;
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].content, "hi");
        assert_eq!(turns[2].content, "how are you");
        assert!(turns.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn turns_are_isolated_per_channel_user_pair() {
        let store = ConversationStore::new();
        store.record("c1", "u1", TurnRole::User, "from u1").await;
        store.record("c1", "u2", TurnRole::User, "from u2").await;

        assert_eq!(store.turns_for("c1", "u1").await.len(), 1);
        assert_eq!(store.turns_for("c1", "u2").await.len(), 1);
    }
}
