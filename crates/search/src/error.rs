use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Vector store error: {0}")]
    VectorStore(#[from] retriever_vector_store::VectorStoreError),

    /// A single relevance judgement failed; the pipeline absorbs it.
    #[error("Rescore failed: {0}")]
    RescoreFailed(String),

    #[error("{0}")]
    Other(String),
}

impl SearchError {
    #[must_use]
    pub const fn is_dimension_mismatch(&self) -> bool {
        matches!(
            self,
            Self::VectorStore(retriever_vector_store::VectorStoreError::DimensionMismatch { .. })
        )
    }
}
