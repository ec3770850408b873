use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::provider::embedder::Embedder;
use crate::provider::types::ProviderError;

use super::segment::Segment;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Corpus misaligned: {segments} segments but {embeddings} embeddings")]
    Misaligned { segments: usize, embeddings: usize },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding error: {0}")]
    Embedding(#[from] ProviderError),
}

pub type IndexResult<T> = Result<T, IndexError>;

/// A segment with its similarity to a query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSegment<'a> {
    /// Position of the segment in the corpus.
    pub index: usize,
    pub score: f32,
    pub segment: &'a Segment,
}

/// Immutable corpus of segments and their embeddings.
///
/// `embeddings[i]` belongs to `segments[i]`; both are fixed at construction.
pub struct CorpusIndex {
    segments: Vec<Segment>,
    embeddings: Vec<Vec<f32>>,
    dimension: Option<usize>,
    embedder: Arc<dyn Embedder>,
}

impl CorpusIndex {
    pub fn new(
        segments: Vec<Segment>,
        embeddings: Vec<Vec<f32>>,
        embedder: Arc<dyn Embedder>,
    ) -> IndexResult<Self> {
        if segments.len() != embeddings.len() {
            return Err(IndexError::Misaligned {
                segments: segments.len(),
                embeddings: embeddings.len(),
            });
        }

        let dimension = embeddings.first().map(Vec::len);
        if let Some(expected) = dimension {
            if let Some(bad) = embeddings.iter().find(|e| e.len() != expected) {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: bad.len(),
                });
            }
        }

        Ok(Self {
            segments,
            embeddings,
            dimension,
            embedder,
        })
    }

    /// Embeds every segment once, `batch_size` texts per embedder call.
    #[tracing::instrument(skip_all, fields(segments = segments.len()))]
    pub async fn build(
        segments: Vec<Segment>,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
    ) -> IndexResult<Self> {
        let mut embeddings = Vec::with_capacity(segments.len());
        let texts: Vec<String> = segments.iter().map(|s| s.text.clone()).collect();
        for batch in texts.chunks(batch_size.max(1)) {
            let vectors = embedder.embed_batch(batch).await?;
            if vectors.len() != batch.len() {
                return Err(IndexError::Misaligned {
                    segments: batch.len(),
                    embeddings: vectors.len(),
                });
            }
            embeddings.extend(vectors);
        }
        info!("corpus index built with {} segments", segments.len());
        Self::new(segments, embeddings, embedder)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Texts of the `k` segments most similar to `question`, best first.
    #[tracing::instrument(skip(self, question), level = "debug")]
    pub async fn retrieve(&self, question: &str, k: usize) -> IndexResult<Vec<String>> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        let query = self.embedder.embed(question).await?;
        let hits = self.search(&query, k)?;
        debug!(
            "retrieved {:?}",
            hits.iter().map(|h| (h.index, h.score)).collect::<Vec<_>>()
        );
        Ok(hits.into_iter().map(|h| h.segment.text.clone()).collect())
    }

    /// Ranks segments by raw dot product with `query`.
    ///
    /// Scores are non-increasing; equal scores keep corpus order.
    pub fn search(&self, query: &[f32], k: usize) -> IndexResult<Vec<ScoredSegment<'_>>> {
        if let Some(expected) = self.dimension {
            if query.len() != expected {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }

        let mut scored: Vec<ScoredSegment<'_>> = self
            .embeddings
            .iter()
            .zip(&self.segments)
            .enumerate()
            .map(|(index, (embedding, segment))| ScoredSegment {
                index,
                score: dot(embedding, query),
                segment,
            })
            .collect();

        scored.sort_by(|a, b| match b.score.total_cmp(&a.score) {
            Ordering::Equal => a.index.cmp(&b.index),
            other => other,
        });
        scored.truncate(k);
        Ok(scored)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::embedder::{HashingEmbedder, MockEmbedder};
    use pretty_assertions::assert_eq;

    fn fixed_embedder(query: Vec<f32>) -> Arc<dyn Embedder> {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .returning(move |_| Ok(query.clone()));
        Arc::new(embedder)
    }

    fn segments(texts: &[&str]) -> Vec<Segment> {
        texts.iter().map(|t| Segment::new(*t)).collect()
    }

    #[test]
    fn test_misaligned_corpus_is_rejected() {
        let result = CorpusIndex::new(
            segments(&["a", "b"]),
            vec![vec![1.0]],
            fixed_embedder(vec![1.0]),
        );
        assert!(matches!(
            result,
            Err(IndexError::Misaligned {
                segments: 2,
                embeddings: 1
            })
        ));
    }

    #[test]
    fn test_mixed_dimensions_are_rejected() {
        let result = CorpusIndex::new(
            segments(&["a", "b"]),
            vec![vec![1.0, 0.0], vec![1.0]],
            fixed_embedder(vec![1.0, 0.0]),
        );
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn test_retrieve_orders_by_descending_score() {
        let index = CorpusIndex::new(
            segments(&["low", "high", "mid"]),
            vec![vec![0.1, 0.0], vec![0.9, 0.0], vec![0.5, 0.0]],
            fixed_embedder(vec![1.0, 0.0]),
        )
        .unwrap();

        assert_eq!(index.retrieve("q", 2).await.unwrap(), vec!["high", "mid"]);
        assert_eq!(index.retrieve("q", 1).await.unwrap(), vec!["high"]);
    }

    #[tokio::test]
    async fn test_raw_dot_product_is_not_normalized() {
        // the longer vector wins although both point the same way
        let index = CorpusIndex::new(
            segments(&["short", "long"]),
            vec![vec![1.0, 0.0], vec![3.0, 0.0]],
            fixed_embedder(vec![1.0, 0.0]),
        )
        .unwrap();
        assert_eq!(index.retrieve("q", 1).await.unwrap(), vec!["long"]);
    }

    #[tokio::test]
    async fn test_ties_prefer_lower_index() {
        let index = CorpusIndex::new(
            segments(&["first", "second", "third"]),
            vec![vec![0.5], vec![0.5], vec![0.5]],
            fixed_embedder(vec![1.0]),
        )
        .unwrap();
        assert_eq!(
            index.retrieve("q", 3).await.unwrap(),
            vec!["first", "second", "third"]
        );
    }

    #[tokio::test]
    async fn test_k_is_truncated_to_corpus_size() {
        let index = CorpusIndex::new(
            segments(&["only"]),
            vec![vec![1.0]],
            fixed_embedder(vec![1.0]),
        )
        .unwrap();
        assert_eq!(index.retrieve("q", 10).await.unwrap(), vec!["only"]);
        assert!(index.retrieve("q", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_corpus_never_embeds() {
        let mut embedder = MockEmbedder::new();
        embedder.expect_embed().never();
        let index = CorpusIndex::new(Vec::new(), Vec::new(), Arc::new(embedder)).unwrap();

        assert!(index.is_empty());
        assert!(index.retrieve("anything", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch() {
        let index = CorpusIndex::new(
            segments(&["a"]),
            vec![vec![1.0, 0.0]],
            fixed_embedder(vec![1.0, 0.0, 0.0]),
        )
        .unwrap();
        assert!(matches!(
            index.retrieve("q", 1).await,
            Err(IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[tokio::test]
    async fn test_embedding_errors_propagate() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .returning(|_| Err(ProviderError::Transport("down".into())));
        let index = CorpusIndex::new(segments(&["a"]), vec![vec![1.0]], Arc::new(embedder)).unwrap();
        assert!(matches!(
            index.retrieve("q", 1).await,
            Err(IndexError::Embedding(ProviderError::Transport(_)))
        ));
    }

    #[tokio::test]
    async fn test_build_embeds_in_batches() {
        let embedder = Arc::new(HashingEmbedder::new(512));
        let corpus = segments(&[
            "A function is a named block of code.",
            "Data activism uses data for social change.",
            "Loops repeat steps.",
        ]);
        let index = CorpusIndex::build(corpus, embedder, 2).await.unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.dimension(), Some(512));
        let top = index.retrieve("what is data activism", 1).await.unwrap();
        assert_eq!(top, vec!["Data activism uses data for social change."]);
    }
}
