use crate::error::Result;
use retriever_vector_store::{
    build_index, cosine_with_norms, exact_top_k, magnitude, Corpus, IndexConfig, ScoredCandidate,
    VectorIndex, VectorStoreError,
};
use std::path::{Path, PathBuf};

/// One immutable generation of corpus + index.
///
/// A snapshot is never mutated once built; reloading builds a new one.
pub struct CorpusSnapshot {
    generation: u64,
    corpus: Corpus,
    index: Option<Box<dyn VectorIndex>>,
    source: Option<PathBuf>,
}

impl CorpusSnapshot {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            generation: 0,
            corpus: Corpus::new(),
            index: None,
            source: None,
        }
    }

    /// Build the ANN index over `corpus`. Index failures fall back to exact search.
    #[must_use]
    pub fn build(
        corpus: Corpus,
        config: &IndexConfig,
        generation: u64,
        source: Option<PathBuf>,
    ) -> Self {
        let index = match build_index(&corpus, config) {
            Ok(index) => Some(index),
            Err(VectorStoreError::IndexUnavailable(reason)) => {
                log::info!("Approximate index not built ({reason}); using exact search");
                None
            }
            Err(err) => {
                log::warn!("Approximate index build failed: {err}; using exact search");
                None
            }
        };
        Self {
            generation,
            corpus,
            index,
            source,
        }
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub const fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    #[must_use]
    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }

    /// Up to `k` candidates ordered by similarity desc, then corpus position.
    ///
    /// Uses the ANN index when built; similarities are recomputed exactly so the index
    /// only decides membership. An empty ANN answer falls back to exact search.
    pub fn candidates(&self, query: &[f32], k: usize) -> Result<Vec<ScoredCandidate<'_>>> {
        let Some(dimension) = self.corpus.dimension() else {
            return Ok(Vec::new());
        };
        if query.len() != dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            }
            .into());
        }

        let Some(index) = self.index.as_ref() else {
            return Ok(exact_top_k(query, &self.corpus, k)?);
        };

        let query_norm = magnitude(query);
        let mut candidates: Vec<ScoredCandidate<'_>> = index
            .search(query, k)
            .into_iter()
            .filter_map(|neighbor| {
                self.corpus.get(neighbor.id).map(|record| {
                    let similarity =
                        cosine_with_norms(query, query_norm, &record.vector, record.norm);
                    ScoredCandidate::new(neighbor.id, record, similarity)
                })
            })
            .collect();

        if candidates.is_empty() {
            log::debug!("ANN returned no candidates; falling back to exact search");
            return Ok(exact_top_k(query, &self.corpus, k)?);
        }

        candidates.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.id.cmp(&b.id))
        });
        candidates.truncate(k);
        Ok(candidates)
    }
}

impl Default for CorpusSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for CorpusSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorpusSnapshot")
            .field("generation", &self.generation)
            .field("records", &self.corpus.len())
            .field("index", &self.index.as_ref().map(|i| i.backend().as_str()))
            .field("source", &self.source)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retriever_vector_store::{CorpusRecord, IndexBackend};

    fn corpus(vectors: &[[f32; 2]]) -> Corpus {
        let records = vectors
            .iter()
            .enumerate()
            .map(|(idx, v)| CorpusRecord {
                repository: "repo".to_string(),
                file_path: format!("f{idx}.ts"),
                symbol: None,
                content: String::new(),
                vector: v.to_vec(),
                norm: magnitude(v),
            })
            .collect();
        Corpus::from_records(records).unwrap()
    }

    #[test]
    fn ann_and_exact_paths_agree() {
        let corpus = corpus(&[[1.0, 0.0], [0.0, 1.0], [0.7, 0.7], [1.0, 0.1]]);
        let with_index = CorpusSnapshot::build(corpus.clone(), &IndexConfig::default(), 1, None);
        let flat = CorpusSnapshot::build(
            corpus.clone(),
            &IndexConfig {
                backend: IndexBackend::Flat,
                ..IndexConfig::default()
            },
            1,
            None,
        );
        assert!(with_index.has_index());

        let query = [1.0, 0.3];
        let exact: Vec<usize> = exact_top_k(&query, &corpus, 3)
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        for snapshot in [&with_index, &flat] {
            let ids: Vec<usize> = snapshot
                .candidates(&query, 3)
                .unwrap()
                .iter()
                .map(|c| c.id)
                .collect();
            assert_eq!(ids, exact);
        }
    }

    #[test]
    fn empty_snapshot_has_no_candidates() {
        let snapshot = CorpusSnapshot::build(Corpus::new(), &IndexConfig::default(), 1, None);
        assert!(!snapshot.has_index());
        assert!(snapshot.candidates(&[1.0], 15).unwrap().is_empty());
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        let snapshot =
            CorpusSnapshot::build(corpus(&[[1.0, 0.0]]), &IndexConfig::default(), 1, None);
        let err = snapshot.candidates(&[1.0, 0.0, 0.0], 15).unwrap_err();
        assert!(err.is_dimension_mismatch());
    }

    #[test]
    fn zero_query_falls_back_to_exact() {
        let snapshot = CorpusSnapshot::build(
            corpus(&[[1.0, 0.0], [0.0, 1.0]]),
            &IndexConfig::default(),
            1,
            None,
        );
        let candidates = snapshot.candidates(&[0.0, 0.0], 5).unwrap();
        let ids: Vec<usize> = candidates.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert!(candidates.iter().all(|c| c.similarity == 0.0));
    }
}
