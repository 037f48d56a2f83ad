use serde::Serialize;

/// One retrievable snippet of the corpus.
///
/// Records are only created by [`crate::Corpus`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusRecord {
    /// Source collection the snippet was taken from
    pub repository: String,

    /// Path relative to the repository root
    pub file_path: String,

    /// Enclosing function/class; `None` for whole-file chunks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,

    /// Raw chunk text
    pub content: String,

    /// Embedding, `D` components
    pub vector: Vec<f32>,

    /// Cached Euclidean magnitude of `vector`
    pub norm: f32,
}

/// A corpus record paired with its scores for one query.
#[derive(Debug, Clone, Copy)]
pub struct ScoredCandidate<'a> {
    /// Position of the record in the corpus
    pub id: usize,
    pub record: &'a CorpusRecord,
    /// Cosine similarity to the query vector
    pub similarity: f32,
    /// Heuristic score, set once the reranker has run
    pub rerank_score: Option<f32>,
}

impl<'a> ScoredCandidate<'a> {
    #[must_use]
    pub const fn new(id: usize, record: &'a CorpusRecord, similarity: f32) -> Self {
        Self {
            id,
            record,
            similarity,
            rerank_score: None,
        }
    }

    /// Score used for ordering: the rerank score when present, otherwise the similarity.
    #[must_use]
    pub fn score(&self) -> f32 {
        self.rerank_score.unwrap_or(self.similarity)
    }
}

/// ANN hit: record position and cosine distance (`1 - similarity`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: usize,
    pub distance: f32,
}
