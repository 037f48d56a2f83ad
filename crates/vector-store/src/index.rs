use crate::corpus::Corpus;
use crate::error::{Result, VectorStoreError};
use crate::flat_index::FlatIndex;
use crate::hnsw_index::HnswIndex;
use crate::types::Neighbor;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Nearest-neighbour backend over a fixed set of vectors.
///
/// Ids are positions in the slice handed to [`VectorIndex::build`]. A backend is
/// built wholesale; there is no incremental insert or delete.
pub trait VectorIndex: Send + Sync {
    /// Replace the indexed set with `vectors`.
    fn build(&mut self, vectors: &[&[f32]]) -> Result<()>;

    /// Up to `k` neighbours by ascending cosine distance. Empty before `build`.
    fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor>;

    /// Number of vectors the index was built over.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn backend(&self) -> IndexBackend;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    #[default]
    Hnsw,
    Flat,
}

impl IndexBackend {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hnsw => "hnsw",
            Self::Flat => "flat",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexConfig {
    pub backend: IndexBackend,
    /// Graph out-degree per layer (HNSW `M`)
    pub max_connections: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Hnsw,
            max_connections: 16,
            ef_construction: 200,
            ef_search: 64,
        }
    }
}

/// Build the configured backend over every corpus vector.
///
/// Fails with [`VectorStoreError::IndexUnavailable`] when the corpus has no dimension;
/// callers fall back to exact search in that case.
pub fn build_index(corpus: &Corpus, config: &IndexConfig) -> Result<Box<dyn VectorIndex>> {
    let Some(dimension) = corpus.dimension() else {
        return Err(VectorStoreError::IndexUnavailable(
            "corpus is empty, no embedding dimension".to_string(),
        ));
    };

    let vectors: Vec<&[f32]> = corpus.records().iter().map(|r| r.vector.as_slice()).collect();
    let mut index: Box<dyn VectorIndex> = match config.backend {
        IndexBackend::Hnsw => Box::new(HnswIndex::new(dimension, config.clone())),
        IndexBackend::Flat => Box::new(FlatIndex::new(dimension)),
    };
    index.build(&vectors)?;

    log::info!(
        "Built {} index over {} vectors (dimension {dimension})",
        config.backend.as_str(),
        index.len()
    );
    Ok(index)
}

/// Ascending distance, then ascending id.
pub(crate) fn sort_neighbors(neighbors: &mut [Neighbor]) {
    neighbors.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });
}

pub(crate) fn check_dimension(expected: usize, vectors: &[&[f32]]) -> Result<()> {
    match vectors.iter().find(|v| v.len() != expected) {
        Some(bad) => Err(VectorStoreError::DimensionMismatch {
            expected,
            actual: bad.len(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::magnitude;
    use crate::store::exact_top_k;
    use crate::types::CorpusRecord;
    use std::collections::HashSet;

    /// Deterministic pseudo-random stream (xorshift) so the fixture is reproducible.
    struct XorShift(u64);

    impl XorShift {
        fn next_f32(&mut self) -> f32 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            (self.0 % 10_000) as f32 / 10_000.0
        }
    }

    fn clustered_corpus(clusters: usize, per_cluster: usize, dim: usize) -> (Corpus, Vec<Vec<f32>>) {
        let mut rng = XorShift(0x9E37_79B9_7F4A_7C15);
        let mut centroids = Vec::new();
        let mut records = Vec::new();
        for c in 0..clusters {
            let mut centroid = vec![0.0f32; dim];
            centroid[c % dim] = 1.0;
            centroid[(c * 7 + 3) % dim] += 0.5;
            for p in 0..per_cluster {
                let vector: Vec<f32> = centroid
                    .iter()
                    .map(|x| x + (rng.next_f32() - 0.5) * 0.05)
                    .collect();
                records.push(CorpusRecord {
                    repository: "repo".to_string(),
                    file_path: format!("c{c}/p{p}.ts"),
                    symbol: None,
                    content: String::new(),
                    norm: magnitude(&vector),
                    vector,
                });
            }
            centroids.push(centroid);
        }
        (Corpus::from_records(records).unwrap(), centroids)
    }

    fn recall(backend: IndexBackend) -> f32 {
        let (corpus, centroids) = clustered_corpus(20, 25, 32);
        let config = IndexConfig {
            backend,
            ..IndexConfig::default()
        };
        let index = build_index(&corpus, &config).unwrap();
        assert_eq!(index.len(), 500);

        let k = 25;
        let mut hits = 0usize;
        for centroid in &centroids {
            let exact: HashSet<usize> = exact_top_k(centroid, &corpus, k)
                .unwrap()
                .into_iter()
                .map(|c| c.id)
                .collect();
            hits += index
                .search(centroid, k)
                .iter()
                .filter(|n| exact.contains(&n.id))
                .count();
        }
        hits as f32 / (centroids.len() * k) as f32
    }

    #[test]
    fn hnsw_matches_exact_on_separated_clusters() {
        let recall = recall(IndexBackend::Hnsw);
        assert!(recall >= 0.95, "recall {recall}");
    }

    #[test]
    fn flat_backend_is_exact() {
        assert!((recall(IndexBackend::Flat) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn cluster_members_come_first() {
        let (corpus, centroids) = clustered_corpus(5, 10, 16);
        let index = build_index(&corpus, &IndexConfig::default()).unwrap();
        let hits = index.search(&centroids[2], 10);
        assert_eq!(hits.len(), 10);
        for hit in hits {
            let path = &corpus.records()[hit.id].file_path;
            assert!(path.starts_with("c2/"), "{path}");
        }
    }

    #[test]
    fn empty_corpus_has_no_index() {
        let Err(err) = build_index(&Corpus::new(), &IndexConfig::default()) else {
            panic!("expected IndexUnavailable for an empty corpus");
        };
        assert!(matches!(err, VectorStoreError::IndexUnavailable(_)));
    }
}
