//! Sentence-aware chunking — spec §4.2 "Chunking".
//!
//! Splits on `.?!` followed by whitespace, then accumulates sentences into
//! chunks of roughly `target_words` words each. No chunk is ever empty; a
//! single sentence longer than the target becomes its own oversized chunk.

/// Split `text` into sentences on `.?!` followed by whitespace (or end of
/// string). The terminator stays attached to the sentence it closes.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = text.chars().collect();

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        current.push(c);
        if matches!(c, '.' | '?' | '!') {
            let next_is_boundary = chars
                .get(i + 1)
                .map(|c| c.is_whitespace())
                .unwrap_or(true);
            if next_is_boundary {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    sentences.push(trimmed.to_string());
                }
                current.clear();
            }
        }
        i += 1;
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}

fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

/// Break `text` into chunks of roughly `target_words` words, sentence-aware.
///
/// Accumulates sentences into the current chunk; when adding the next
/// sentence would exceed `target_words` AND the current chunk is non-empty,
/// the current chunk is emitted and a new one started. A lone sentence
/// longer than `target_words` becomes its own oversized chunk. Never
/// produces an empty chunk.
pub fn chunk_text(text: &str, target_words: usize) -> Vec<String> {
    let sentences = split_sentences(text);
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_words = 0usize;

    for sentence in sentences {
        let sentence_words = word_count(&sentence);
        if !current.is_empty() && current_words + sentence_words > target_words {
            chunks.push(current.join(" "));
            current = Vec::new();
            current_words = 0;
        }
        current_words += sentence_words;
        current.push(sentence);
    }
    if !current.is_empty() {
        chunks.push(current.join(" "));
    }
    chunks
}
