//! Dense re-ranking: reorder lexical candidates by query/passage cosine.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::domain::errors::BackendError;
use crate::domain::models::similarity::cosine_similarity;
use crate::domain::models::Segment;
use crate::domain::ports::EmbeddingProvider;
use crate::infrastructure::resilience::RetryPolicy;

/// Second retrieval stage. Reorders the lexical candidates without adding
/// or dropping any.
pub struct DenseReranker {
    embedder: Arc<dyn EmbeddingProvider>,
    retry: RetryPolicy,
}

impl DenseReranker {
    /// Re-ranker over `embedder`; embedding calls retry under `retry`.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, retry: RetryPolicy) -> Self {
        Self { embedder, retry }
    }

    /// Name of the encoder, for logging.
    pub fn provider_name(&self) -> &'static str {
        self.embedder.name()
    }

    /// Score every candidate and sort by descending cosine. Ties keep the
    /// lexical order. The output is a permutation of the input.
    pub async fn rerank(&self, query: &str, mut candidates: Vec<Segment>) -> Result<Vec<Segment>, BackendError> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let mut texts = Vec::with_capacity(candidates.len() + 1);
        texts.push(query.to_string());
        texts.extend(candidates.iter().map(Segment::passage));

        let vectors = self
            .retry
            .execute("embed", |_| self.embedder.embed_batch(&texts))
            .await?;
        if vectors.len() != texts.len() {
            return Err(BackendError::Malformed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        let (query_vector, passage_vectors) = vectors.split_at(1);
        for (segment, vector) in candidates.iter_mut().zip(passage_vectors) {
            segment.dense_score = Some(cosine_similarity(&query_vector[0], vector));
        }

        candidates.sort_by(|a, b| {
            b.dense_score
                .partial_cmp(&a.dense_score)
                .unwrap_or(Ordering::Equal)
        });
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::HashingEmbedder;
    use async_trait::async_trait;

    fn candidate(id: &str, text: &str, rank: usize) -> Segment {
        Segment {
            id: id.to_string(),
            document_id: id.split('#').next().unwrap_or(id).to_string(),
            title: String::new(),
            url: String::new(),
            text: text.to_string(),
            lexical_score: 10.0 - rank as f32,
            lexical_rank: rank,
            dense_score: None,
        }
    }

    fn candidates() -> Vec<Segment> {
        vec![
            candidate("doc_1#0", "heavy rain expected this weekend", 1),
            candidate("doc_2#0", "engineers reported corrosion on the harbor bridge cables", 2),
            candidate("doc_3#0", "the mayor cited an independent audit", 3),
            candidate("doc_4#0", "harbor bridge corrosion", 4),
            candidate("doc_5#0", "", 5),
        ]
    }

    fn sorted_ids(segments: &[Segment]) -> Vec<String> {
        let mut ids: Vec<String> = segments.iter().map(|s| s.id.clone()).collect();
        ids.sort();
        ids
    }

    /// Encoder that returns one vector too few.
    struct ShortEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ShortEmbedder {
        fn name(&self) -> &'static str {
            "short"
        }

        fn dimension(&self) -> usize {
            2
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, BackendError> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
            Ok(vec![vec![1.0, 0.0]; texts.len().saturating_sub(1)])
        }
    }

    #[tokio::test]
    async fn test_rerank_is_a_permutation_of_candidates() {
        let reranker = DenseReranker::new(Arc::new(HashingEmbedder::new(64)), RetryPolicy::no_retry());
        let input = candidates();

        let output = reranker.rerank("harbor bridge corrosion", input.clone()).await.unwrap();

        assert_eq!(output.len(), input.len());
        assert_eq!(sorted_ids(&output), sorted_ids(&input));
        for segment in &output {
            let original = input.iter().find(|s| s.id == segment.id).unwrap();
            assert_eq!(segment.text, original.text);
            assert_eq!(segment.lexical_rank, original.lexical_rank);
        }
    }

    #[tokio::test]
    async fn test_rerank_orders_by_cosine() {
        let reranker = DenseReranker::new(Arc::new(HashingEmbedder::new(64)), RetryPolicy::no_retry());

        let output = reranker.rerank("harbor bridge corrosion", candidates()).await.unwrap();

        assert_eq!(output[0].id, "doc_4#0");
        assert!(output.iter().all(|s| s.dense_score.is_some()));
        assert!(output.windows(2).all(|w| w[0].dense_score >= w[1].dense_score));
    }

    #[tokio::test]
    async fn test_rerank_of_nothing_skips_the_encoder() {
        let reranker = DenseReranker::new(Arc::new(ShortEmbedder), RetryPolicy::no_retry());
        assert!(reranker.rerank("query", Vec::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_vectors_are_malformed() {
        let reranker = DenseReranker::new(Arc::new(ShortEmbedder), RetryPolicy::no_retry());
        let err = reranker.rerank("query", candidates()).await.unwrap_err();
        assert!(matches!(err, BackendError::Malformed(_)));
    }
}
