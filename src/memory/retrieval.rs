//! Retrieval — spec §4.2 "Retrieval": a TF-IDF-like scorer over the full
//! corpus, plus a cheaper set-overlap fallback over the recency cache for
//! callers (the Router's `assemble_context`) that don't want a full scan.

use std::collections::HashSet;

use crate::types::MemoryChunk;

const MIN_TOKEN_LEN: usize = 3; // tokens of length <= 2 are dropped

fn tokenize(s: &str) -> Vec<String> {
    s.to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| w.len() > MIN_TOKEN_LEN - 1 && w.len() > 2)
        .collect()
}

/// One scored retrieval hit.
#[derive(Debug, Clone)]
pub struct ScoredChunk<'a> {
    pub chunk: &'a MemoryChunk,
    pub score: f64,
}

/// TF-IDF-like retrieval over the full corpus — spec §4.2 step 1-5.
///
/// Deterministic and stable under ties by insertion (corpus iteration) order,
/// per the spec's requirement.
pub fn tfidf_retrieve<'a>(corpus: &'a [MemoryChunk], query: &str, k: usize, min_score: f64) -> Vec<&'a MemoryChunk> {
    let query_tokens = tokenize(query);
    if query_tokens.is_empty() || corpus.is_empty() {
        return Vec::new();
    }

    let n_docs = corpus.len() as f64;
    // Document frequency per query token.
    let mut doc_freq: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    let chunk_tokens: Vec<Vec<String>> = corpus.iter().map(|c| tokenize(&c.text)).collect();
    for qw in &query_tokens {
        let df = chunk_tokens.iter().filter(|toks| toks.iter().any(|t| t == qw)).count();
        doc_freq.insert(qw.as_str(), df);
    }

    let query_lower = query.to_lowercase();
    let mut query_counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for qw in &query_tokens {
        *query_counts.entry(qw.as_str()).or_insert(0) += 1;
    }

    let mut scored: Vec<ScoredChunk> = Vec::new();
    for (chunk, toks) in corpus.iter().zip(chunk_tokens.iter()) {
        if toks.is_empty() {
            continue;
        }
        let len = toks.len() as f64;
        let mut score = 0.0;
        for qw in query_counts.keys() {
            let count_in_chunk = toks.iter().filter(|t| t.as_str() == *qw).count();
            if count_in_chunk == 0 {
                continue;
            }
            let tf = count_in_chunk as f64 / len;
            let df = *doc_freq.get(qw).unwrap_or(&0) as f64;
            let idf = (n_docs / (1.0 + df)).ln();
            let qcount = query_counts[qw] as f64;
            score += tf * idf * qcount;
        }
        if score <= 0.0 {
            continue;
        }

        if chunk.text.to_lowercase().contains(&query_lower) {
            score *= 2.0;
        }
        if let Some(title) = chunk.metadata.get("title").and_then(|v| v.as_str()) {
            if title.to_lowercase().contains(&query_lower) {
                score *= 1.5;
            }
        }

        if score >= min_score {
            scored.push(ScoredChunk { chunk, score });
        }
    }

    // Stable sort preserves corpus order among ties.
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(k).map(|s| s.chunk).collect()
}

/// Cheap set-overlap + sqrt-length-normalized fallback, used when no TF-IDF
/// index exists yet (spec §4.2: "A simpler fallback path ... MUST also be
/// available"). Deterministic and stable under ties by insertion order.
pub fn fallback_retrieve<'a>(chunks: &'a [MemoryChunk], query: &str, k: usize) -> Vec<&'a MemoryChunk> {
    let query_tokens: HashSet<String> = tokenize(query).into_iter().collect();
    if query_tokens.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(f64, &MemoryChunk)> = Vec::new();
    for chunk in chunks {
        let chunk_tokens: HashSet<String> = tokenize(&chunk.text).into_iter().collect();
        let overlap = query_tokens.intersection(&chunk_tokens).count();
        if overlap == 0 {
            continue;
        }
        let norm = (chunk_tokens.len().max(1) as f64).sqrt();
        scored.push((overlap as f64 / norm, chunk));
    }

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(k).map(|(_, c)| c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn chunk(key: &str, text: &str) -> MemoryChunk {
        MemoryChunk {
            key: key.to_string(),
            doc_id: "doc".to_string(),
            index: 0,
            text: text.to_string(),
            fingerprint: 0,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn tfidf_prefers_chunk_with_more_query_term_occurrences() {
        let corpus = vec![
            chunk("a", "rust programming language memory safety"),
            chunk("b", "rust rust rust rust programming"),
            chunk("c", "completely unrelated text about cooking"),
        ];
        let results = tfidf_retrieve(&corpus, "rust programming", 3, 0.0);
        assert!(!results.is_empty());
        assert!(results.iter().any(|c| c.key == "b"));
        assert!(!results.iter().any(|c| c.key == "c"));
    }

    #[test]
    fn verbatim_match_doubles_score_and_wins_tie() {
        let corpus = vec![
            chunk("a", "the quick brown fox jumps"),
            chunk("b", "quick fox quick fox quick brown jumps"),
        ];
        let results = tfidf_retrieve(&corpus, "quick brown fox", 1, 0.0);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn adding_a_chunk_never_decreases_existing_chunk_score_p6() {
        let mut corpus = vec![chunk("a", "rust memory safety ownership model")];
        let before = tfidf_retrieve(&corpus, "rust memory", 5, 0.0);
        let before_score_present = !before.is_empty();

        corpus.push(chunk("b", "completely different content about gardening"));
        let after = tfidf_retrieve(&corpus, "rust memory", 5, 0.0);

        assert_eq!(before_score_present, !after.is_empty());
        assert!(after.iter().any(|c| c.key == "a"));
    }

    #[test]
    fn fallback_retrieve_orders_by_overlap_density() {
        let corpus = vec![
            chunk("a", "alpha beta gamma delta epsilon zeta eta theta"),
            chunk("b", "alpha beta"),
        ];
        let results = fallback_retrieve(&corpus, "alpha beta", 2);
        // "b" is short and fully matches both terms — higher overlap / sqrt(len)
        assert_eq!(results[0].key, "b");
    }

    #[test]
    fn empty_query_returns_nothing() {
        let corpus = vec![chunk("a", "some content here")];
        assert!(tfidf_retrieve(&corpus, "", 5, 0.0).is_empty());
        assert!(fallback_retrieve(&corpus, "", 5).is_empty());
    }

    #[test]
    fn short_tokens_are_dropped_from_matching() {
        let corpus = vec![chunk("a", "it is a or an of to on in at go")];
        // Query of only short stop-word-like tokens should not match anything.
        assert!(tfidf_retrieve(&corpus, "is a or", 5, 0.0).is_empty());
    }
}
