//! # Retriever Vector Store
//!
//! In-memory corpus of pre-embedded code snippets and the vector search paths over it.
//!
//! ## Features
//!
//! - **Validated corpus loading** from the JSON file produced by the ingestion pipeline
//! - **Cached magnitudes** so cosine similarity never recomputes a record norm
//! - **Exact search** (brute-force cosine) as the ground truth and fallback
//! - **Fast ANN search** via HNSW (Hierarchical Navigable Small World)
//!
//! ## Architecture
//!
//! ```text
//! corpus.json
//!     │
//!     ├──> Corpus (validated records, fixed dimension D)
//!     │      └─> cached norm per record
//!     │
//!     ├──> exact_search ───────────┐
//!     │                            ├──> ScoredCandidate[]
//!     └──> VectorIndex (HNSW/flat)─┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use retriever_vector_store::{build_index, exact_search, Corpus, IndexConfig};
//!
//! #[tokio::main]
//! async fn main() -> retriever_vector_store::Result<()> {
//!     let corpus = Corpus::load("data/embeddings.json").await?;
//!     let query = vec![0.1_f32; corpus.dimension().unwrap_or_default()];
//!
//!     for candidate in exact_search(&query, &corpus)?.iter().take(5) {
//!         println!("{}: {:.3}", candidate.record.file_path, candidate.similarity);
//!     }
//!
//!     let index = build_index(&corpus, &IndexConfig::default())?;
//!     for neighbor in index.search(&query, 5) {
//!         println!("#{} distance={:.3}", neighbor.id, neighbor.distance);
//!     }
//!     Ok(())
//! }
//! ```

mod corpus;
mod error;
mod flat_index;
mod hnsw_index;
mod index;
mod similarity;
mod store;
mod types;

pub use corpus::{Corpus, CorpusStats};
pub use error::{Result, VectorStoreError};
pub use flat_index::FlatIndex;
pub use hnsw_index::HnswIndex;
pub use index::{build_index, IndexBackend, IndexConfig, VectorIndex};
pub use similarity::{cosine_similarity, cosine_with_norms, magnitude};
pub use store::{exact_search, exact_top_k};
pub use types::{CorpusRecord, Neighbor, ScoredCandidate};
