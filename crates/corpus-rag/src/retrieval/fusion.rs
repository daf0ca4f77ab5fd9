//! Weighted-sum fusion of vector and keyword retrieval branches

use std::collections::HashMap;
use uuid::Uuid;

use crate::storage::ScoredChunk;

/// Branch weights applied before summing
#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    /// Weight for vector-branch scores
    pub vector: f32,
    /// Weight for keyword-branch scores
    pub keyword: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            vector: 0.7,
            keyword: 0.3,
        }
    }
}

/// Merge the two branches into one ranking.
///
/// Each branch score is multiplied by its weight; a chunk appearing in both
/// branches gets the sum of its weighted scores, rewarding agreement between
/// the retrieval methods. Duplicates are collapsed strictly by chunk id. The
/// result is sorted by descending fused score.
pub fn fuse(
    vector_results: Vec<ScoredChunk>,
    keyword_results: Vec<ScoredChunk>,
    weights: FusionWeights,
) -> Vec<ScoredChunk> {
    let mut fused: HashMap<Uuid, ScoredChunk> = HashMap::new();

    for result in vector_results {
        let weighted = result.score * weights.vector;
        fused
            .entry(result.chunk.id)
            .and_modify(|existing| existing.score += weighted)
            .or_insert(ScoredChunk {
                chunk: result.chunk,
                score: weighted,
            });
    }

    for result in keyword_results {
        let weighted = result.score * weights.keyword;
        fused
            .entry(result.chunk.id)
            .and_modify(|existing| existing.score += weighted)
            .or_insert(ScoredChunk {
                chunk: result.chunk,
                score: weighted,
            });
    }

    let mut ranked: Vec<ScoredChunk> = fused.into_values().collect();
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;

    fn scored(chunk: &Chunk, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: chunk.clone(),
            score,
        }
    }

    #[test]
    fn vector_only_chunk_keeps_its_weighted_score() {
        let chunk = Chunk::new(Uuid::new_v4(), 0, "a".into());
        let ranked = fuse(vec![scored(&chunk, 0.9)], vec![], FusionWeights::default());
        assert_eq!(ranked.len(), 1);
        assert!((ranked[0].score - 0.63).abs() < 1e-6);
    }

    #[test]
    fn keyword_only_chunk_keeps_its_weighted_score() {
        let chunk = Chunk::new(Uuid::new_v4(), 0, "a".into());
        let ranked = fuse(vec![], vec![scored(&chunk, 0.8)], FusionWeights::default());
        assert_eq!(ranked.len(), 1);
        assert!((ranked[0].score - 0.24).abs() < 1e-6);
    }

    #[test]
    fn chunk_in_both_branches_sums_weighted_scores() {
        let chunk = Chunk::new(Uuid::new_v4(), 0, "a".into());
        let ranked = fuse(
            vec![scored(&chunk, 0.9)],
            vec![scored(&chunk, 0.8)],
            FusionWeights::default(),
        );
        // 0.9*0.7 + 0.8*0.3 = 0.63 + 0.24 = 0.87, deduplicated by chunk id
        assert_eq!(ranked.len(), 1);
        assert!((ranked[0].score - 0.87).abs() < 1e-6);
    }

    #[test]
    fn ranking_is_descending_and_agreement_wins() {
        let both = Chunk::new(Uuid::new_v4(), 0, "both".into());
        let vector_only = Chunk::new(Uuid::new_v4(), 1, "vector".into());
        let keyword_only = Chunk::new(Uuid::new_v4(), 2, "keyword".into());

        let ranked = fuse(
            vec![scored(&vector_only, 0.95), scored(&both, 0.7)],
            vec![scored(&keyword_only, 0.9), scored(&both, 0.9)],
            FusionWeights::default(),
        );

        // both: 0.49 + 0.27 = 0.76; vector_only: 0.665; keyword_only: 0.27
        let texts: Vec<&str> = ranked.iter().map(|r| r.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["both", "vector", "keyword"]);
        for pair in ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }
}
