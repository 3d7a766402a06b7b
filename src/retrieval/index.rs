//! Per-run retrieval index: chunk, embed, rank by cosine similarity.
//!
//! Built fresh for every retrieval-augmented run and discarded at its end —
//! there is no cross-run cache. Embeddings come from the generation
//! service's embeddings endpoint and are L2-normalized so cosine similarity
//! reduces to a dot product.

use crate::inference::GenerationService;

// ─── Constants ──────────────────────────────────────────────────────────────

/// Target chunk size in characters.
pub const CHUNK_SIZE: usize = 500;

/// Overlap between consecutive chunks in characters.
pub const CHUNK_OVERLAP: usize = 50;

/// Default number of chunks returned by a retrieval query.
pub const DEFAULT_TOP_K: usize = 4;

// ─── RetrievalIndex ─────────────────────────────────────────────────────────

/// One embedded chunk with its source attribution.
#[derive(Debug, Clone)]
struct IndexedChunk {
    text: String,
    source: String,
    embedding: Vec<f32>,
}

/// In-memory similarity index over fetched documents.
#[derive(Debug)]
pub struct RetrievalIndex {
    embed_model: String,
    chunks: Vec<IndexedChunk>,
}

impl RetrievalIndex {
    /// Create an empty index that embeds with `embed_model`.
    pub fn new(embed_model: impl Into<String>) -> Self {
        Self {
            embed_model: embed_model.into(),
            chunks: Vec::new(),
        }
    }

    /// Whether any chunks have been ingested.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Split each `(source, text)` document into overlapping chunks, embed
    /// them, and build the index.
    ///
    /// Returns `false` on empty input or embedding failure; never raises.
    pub async fn ingest(
        &mut self,
        service: &dyn GenerationService,
        documents: &[(String, String)],
    ) -> bool {
        if documents.is_empty() {
            return false;
        }

        let mut texts: Vec<String> = Vec::new();
        let mut sources: Vec<String> = Vec::new();
        for (source, text) in documents {
            for chunk in split_chunks(text, CHUNK_SIZE, CHUNK_OVERLAP) {
                texts.push(chunk);
                sources.push(source.clone());
            }
        }
        if texts.is_empty() {
            return false;
        }

        let embeddings = match service.embed(&self.embed_model, &texts).await {
            Ok(embeddings) if embeddings.len() == texts.len() => embeddings,
            Ok(embeddings) => {
                tracing::warn!(
                    expected = texts.len(),
                    actual = embeddings.len(),
                    "embedding count mismatch — index not built"
                );
                return false;
            }
            Err(e) => {
                tracing::warn!(error = %e, "ingestion failed — index not built");
                return false;
            }
        };

        self.chunks = texts
            .into_iter()
            .zip(sources)
            .zip(embeddings)
            .map(|((text, source), embedding)| IndexedChunk {
                text,
                source,
                embedding: l2_normalize(embedding),
            })
            .collect();

        tracing::info!(
            chunk_count = self.chunks.len(),
            document_count = documents.len(),
            "retrieval index built"
        );
        true
    }

    /// Return the top-`k` chunks by similarity to `query`, each annotated
    /// with its source, concatenated in rank order.
    ///
    /// Returns an empty string when no index exists or the query fails.
    pub async fn retrieve(
        &self,
        service: &dyn GenerationService,
        query: &str,
        k: usize,
    ) -> String {
        if self.chunks.is_empty() {
            return String::new();
        }

        let query_embedding = match service.embed(&self.embed_model, &[query.to_string()]).await
        {
            Ok(mut embeddings) if !embeddings.is_empty() => l2_normalize(embeddings.remove(0)),
            Ok(_) => {
                tracing::warn!("empty query embedding — retrieval skipped");
                return String::new();
            }
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed — retrieval skipped");
                return String::new();
            }
        };

        let mut scored: Vec<(f32, &IndexedChunk)> = self
            .chunks
            .iter()
            .map(|chunk| (cosine_similarity(&query_embedding, &chunk.embedding), chunk))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut context = String::new();
        for (i, (_, chunk)) in scored.iter().take(k).enumerate() {
            context.push_str(&format!(
                "[Source {}: {}]\n{}\n\n",
                i + 1,
                chunk.source,
                chunk.text.replace('\n', " ")
            ));
        }
        context
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Split text into overlapping chunks of at most `size` characters.
///
/// Operates on character counts, never byte offsets, so multi-byte text
/// cannot split mid-character.
fn split_chunks(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || size == 0 {
        return Vec::new();
    }

    let step = size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        if !chunk.trim().is_empty() {
            chunks.push(chunk);
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// L2-normalize a vector. Zero vectors pass through unchanged.
fn l2_normalize(vec: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vec.into_iter().map(|v| v / norm).collect()
    } else {
        vec
    }
}

/// Cosine similarity between two L2-normalized vectors (= dot product).
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::test_support::ScriptedService;

    #[test]
    fn split_short_text_is_single_chunk() {
        let chunks = split_chunks("hello world", 500, 50);
        assert_eq!(chunks, vec!["hello world"]);
    }

    #[test]
    fn split_long_text_overlaps() {
        let text = "a".repeat(120);
        let chunks = split_chunks(&text, 100, 20);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 100);
        // Second chunk starts size - overlap = 80 chars in → 40 chars left.
        assert_eq!(chunks[1].chars().count(), 40);
    }

    #[test]
    fn split_handles_multibyte_text() {
        let text = "héllo wörld ".repeat(60);
        let chunks = split_chunks(&text, 100, 20);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100);
        }
    }

    #[test]
    fn split_empty_text_yields_nothing() {
        assert!(split_chunks("", 500, 50).is_empty());
        assert!(split_chunks("   \n  ", 500, 50).is_empty());
    }

    #[test]
    fn l2_normalize_unit_norm() {
        let v = l2_normalize(vec![3.0, 4.0]);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_identical_vectors_score_one() {
        let v = l2_normalize(vec![1.0, 2.0, 3.0]);
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn ingest_empty_input_returns_false() {
        let service = ScriptedService::new();
        let mut index = RetrievalIndex::new("embed");
        assert!(!index.ingest(&service, &[]).await);
        assert_eq!(index.retrieve(&service, "x", DEFAULT_TOP_K).await, "");
    }

    #[tokio::test]
    async fn ingest_failure_returns_false() {
        let service = ScriptedService::new();
        service
            .embed_fails
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let mut index = RetrievalIndex::new("embed");
        let docs = vec![("https://example.com".to_string(), "some text".to_string())];
        assert!(!index.ingest(&service, &docs).await);
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn retrieve_ranks_similar_chunks_first() {
        let service = ScriptedService::new();
        let docs = vec![
            (
                "https://pets.example.com".to_string(),
                "cats and dogs and cats and dogs".to_string(),
            ),
            (
                "https://physics.example.com".to_string(),
                "quantum flux experiment results".to_string(),
            ),
        ];

        let mut index = RetrievalIndex::new("embed");
        assert!(index.ingest(&service, &docs).await);

        let context = index.retrieve(&service, "cats dogs", 1).await;
        assert!(context.starts_with("[Source 1: https://pets.example.com]"));
        assert!(context.contains("cats and dogs"));
        assert!(!context.contains("quantum"));
    }

    #[tokio::test]
    async fn retrieve_annotates_all_sources_in_rank_order() {
        let service = ScriptedService::new();
        let docs = vec![
            ("https://a.example.com".to_string(), "alpha text body".to_string()),
            ("https://b.example.com".to_string(), "beta text body".to_string()),
        ];

        let mut index = RetrievalIndex::new("embed");
        assert!(index.ingest(&service, &docs).await);

        let context = index.retrieve(&service, "text body", DEFAULT_TOP_K).await;
        assert!(context.contains("[Source 1:"));
        assert!(context.contains("[Source 2:"));
    }
}
