//! Two-stage snippet retrieval: vector candidates, keyword/path reranking, and optional
//! fusion with an external relevance judge.

mod error;
mod keywords;
mod pipeline;
mod profile;
mod rerank;
mod rescore;
mod snapshot;

pub use error::{Result, SearchError};
pub use keywords::{extract_keywords, KeywordExtractor, KeywordSet, STOP_WORDS};
pub use pipeline::{RetrievedSnippet, Retriever};
pub use profile::{
    HttpJudgeConfig, KeywordConfig, PipelineConfig, RerankWeights, RescoreConfig,
    RetrievalProfile,
};
pub use rerank::{classify_path, HeuristicReranker, PathRole};
pub use rescore::{fuse_scores, FusedCandidate, HttpRelevanceJudge, RelevanceJudge, Rescorer};
pub use snapshot::CorpusSnapshot;
