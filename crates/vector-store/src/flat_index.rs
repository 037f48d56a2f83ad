use crate::error::Result;
use crate::index::{check_dimension, sort_neighbors, IndexBackend, VectorIndex};
use crate::similarity::{cosine_with_norms, magnitude};
use crate::types::Neighbor;

/// Brute-force index: same contract as the HNSW backend, exact results.
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<(Vec<f32>, f32)>,
}

impl FlatIndex {
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }
}

impl VectorIndex for FlatIndex {
    fn build(&mut self, vectors: &[&[f32]]) -> Result<()> {
        check_dimension(self.dimension, vectors)?;
        self.vectors = vectors
            .iter()
            .map(|vector| (vector.to_vec(), magnitude(vector)))
            .collect();
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        if k == 0 || query.len() != self.dimension {
            return Vec::new();
        }

        let query_norm = magnitude(query);
        let mut neighbors: Vec<Neighbor> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(id, (vector, norm))| Neighbor {
                id,
                distance: 1.0 - cosine_with_norms(query, query_norm, vector, *norm),
            })
            .collect();

        sort_neighbors(&mut neighbors);
        neighbors.truncate(k);
        neighbors
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn backend(&self) -> IndexBackend {
        IndexBackend::Flat
    }
}
