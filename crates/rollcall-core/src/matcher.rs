use crate::index::Index;
use crate::types::Embedding;
use serde::Serialize;

/// Similarity reported when nothing could be compared (empty index or a
/// query of the wrong dimension).
pub const NO_CANDIDATE_SIMILARITY: f32 = -1.0;

/// Result of matching a query embedding against the gallery index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    /// Identity of the best candidate, if it cleared the threshold.
    pub identity: Option<String>,
    /// Cosine similarity of the best candidate, reported even on a miss so
    /// the threshold can be tuned from logs.
    pub similarity: f32,
}

impl MatchResult {
    pub fn no_match(similarity: f32) -> Self {
        Self {
            identity: None,
            similarity,
        }
    }

    pub fn is_match(&self) -> bool {
        self.identity.is_some()
    }
}

/// Strategy for comparing a query embedding against the gallery index.
pub trait Matcher {
    fn compare(&self, query: &Embedding, index: &Index, threshold: f32) -> MatchResult;
}

/// Cosine similarity matcher over a linear scan of the index.
///
/// Ties keep the first candidate in index order, which is identity order.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(&self, query: &Embedding, index: &Index, threshold: f32) -> MatchResult {
        if let Some(dim) = index.dim() {
            if dim != query.dim() {
                tracing::warn!(
                    query_dim = query.dim(),
                    index_dim = dim,
                    "query dimension does not match index"
                );
                return MatchResult::no_match(NO_CANDIDATE_SIMILARITY);
            }
        }

        let mut best_sim = NO_CANDIDATE_SIMILARITY;
        let mut best_id: Option<&str> = None;

        for (identity, reference) in index.iter() {
            let sim = reference.similarity(query);
            if best_id.is_none() || sim > best_sim {
                best_sim = sim;
                best_id = Some(identity);
            }
        }

        match best_id {
            Some(identity) if best_sim >= threshold => MatchResult {
                identity: Some(identity.to_string()),
                similarity: best_sim,
            },
            _ => MatchResult::no_match(best_sim),
        }
    }
}
