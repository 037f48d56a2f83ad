use crate::error::Result;
use crate::index::{check_dimension, sort_neighbors, IndexBackend, IndexConfig, VectorIndex};
use crate::similarity::magnitude;
use crate::types::Neighbor;
use hnsw_rs::prelude::*;

/// Upper bound on graph layers accepted by hnsw_rs.
const MAX_LAYERS: usize = 16;

/// HNSW graph over corpus vectors under cosine distance.
///
/// Zero-magnitude vectors are left out of the graph: their similarity to any query is
/// defined as zero, and the cosine kernel would otherwise report them as distance 0.
pub struct HnswIndex {
    dimension: usize,
    config: IndexConfig,
    graph: Option<Hnsw<'static, f32, DistCosine>>,
    len: usize,
}

impl HnswIndex {
    #[must_use]
    pub fn new(dimension: usize, config: IndexConfig) -> Self {
        Self {
            dimension,
            config,
            graph: None,
            len: 0,
        }
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    fn layer_count(elements: usize) -> usize {
        ((elements as f32).ln().ceil() as usize).clamp(1, MAX_LAYERS)
    }
}

impl VectorIndex for HnswIndex {
    fn build(&mut self, vectors: &[&[f32]]) -> Result<()> {
        check_dimension(self.dimension, vectors)?;

        self.graph = None;
        self.len = vectors.len();
        if vectors.is_empty() {
            return Ok(());
        }

        let graph = Hnsw::<f32, DistCosine>::new(
            self.config.max_connections.max(2),
            vectors.len(),
            Self::layer_count(vectors.len()),
            self.config.ef_construction.max(self.config.max_connections),
            DistCosine {},
        );

        let mut skipped = 0usize;
        for (id, vector) in vectors.iter().enumerate() {
            if magnitude(vector) == 0.0 {
                skipped += 1;
                continue;
            }
            graph.insert_slice((*vector, id));
        }
        if skipped > 0 {
            log::debug!("HNSW build skipped {skipped} zero-magnitude vectors");
        }

        self.graph = Some(graph);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        let Some(graph) = self.graph.as_ref() else {
            return Vec::new();
        };
        if k == 0 || query.len() != self.dimension || magnitude(query) == 0.0 {
            return Vec::new();
        }

        let ef = self.config.ef_search.max(k);
        let mut neighbors: Vec<Neighbor> = graph
            .search(query, k, ef)
            .into_iter()
            .map(|n| Neighbor {
                id: n.d_id,
                distance: n.distance,
            })
            .collect();

        sort_neighbors(&mut neighbors);
        neighbors.truncate(k);
        neighbors
    }

    fn len(&self) -> usize {
        self.len
    }

    fn backend(&self) -> IndexBackend {
        IndexBackend::Hnsw
    }
}
