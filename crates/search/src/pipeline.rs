use crate::error::Result;
use crate::keywords::KeywordExtractor;
use crate::profile::RetrievalProfile;
use crate::rerank::HeuristicReranker;
use crate::rescore::{FusedCandidate, RelevanceJudge, Rescorer};
use crate::snapshot::CorpusSnapshot;
use retriever_vector_store::{Corpus, ScoredCandidate};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// A retrieved snippet with its metadata and every score that shaped its rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedSnippet {
    /// Position of the record in the corpus generation that produced it
    pub corpus_id: usize,
    pub repository: String,
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub content: String,
    pub similarity: f32,
    pub rerank_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f32>,
    /// Score the final order is based on
    pub score: f32,
}

impl RetrievedSnippet {
    fn from_fused(fused: &FusedCandidate<'_>) -> Self {
        let record = fused.candidate.record;
        Self {
            corpus_id: fused.candidate.id,
            repository: record.repository.clone(),
            file_path: record.file_path.clone(),
            symbol: record.symbol.clone(),
            content: record.content.clone(),
            similarity: fused.candidate.similarity,
            rerank_score: fused.candidate.score(),
            relevance: fused.relevance,
            score: fused.score,
        }
    }
}

/// Coarse-to-fine snippet retrieval over a swappable corpus snapshot.
///
/// Queries clone the current snapshot `Arc` and never hold the lock while searching, so a
/// concurrent reload is observed either entirely or not at all.
pub struct Retriever {
    profile: RetrievalProfile,
    snapshot: RwLock<Arc<CorpusSnapshot>>,
    generation: AtomicU64,
    keywords: KeywordExtractor,
    reranker: HeuristicReranker,
    rescorer: Option<Rescorer>,
}

impl Retriever {
    #[must_use]
    pub fn new(profile: RetrievalProfile) -> Self {
        let keywords =
            KeywordExtractor::new().with_extra_stop_words(&profile.keywords().extra_stop_words);
        let reranker = HeuristicReranker::new(profile.rerank_weights().clone());
        Self {
            profile,
            snapshot: RwLock::new(Arc::new(CorpusSnapshot::empty())),
            generation: AtomicU64::new(0),
            keywords,
            reranker,
            rescorer: None,
        }
    }

    /// Attach the external relevance judge used when a search asks for rescoring.
    #[must_use]
    pub fn with_judge(mut self, judge: Arc<dyn RelevanceJudge>) -> Self {
        self.rescorer = Some(Rescorer::new(judge, self.profile.rescore().clone()));
        self
    }

    #[must_use]
    pub const fn profile(&self) -> &RetrievalProfile {
        &self.profile
    }

    #[must_use]
    pub fn has_judge(&self) -> bool {
        self.rescorer.is_some()
    }

    /// Current generation. Cheap: clones an `Arc`.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CorpusSnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Load the corpus file and swap it in.
    ///
    /// On failure the serving snapshot is left untouched (empty before the first
    /// successful load) and the error is returned once.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<Arc<CorpusSnapshot>> {
        let path = path.as_ref();
        match Corpus::load(path).await {
            Ok(corpus) => Ok(self.install_from(corpus, Some(path))),
            Err(err) => {
                log::warn!(
                    "Corpus load from {} failed: {err}; keeping generation {}",
                    path.display(),
                    self.snapshot().generation()
                );
                Err(err.into())
            }
        }
    }

    /// Build a snapshot for `corpus` (index included) and swap it in.
    pub fn install(&self, corpus: Corpus) -> Arc<CorpusSnapshot> {
        self.install_from(corpus, None)
    }

    fn install_from(&self, corpus: Corpus, source: Option<&Path>) -> Arc<CorpusSnapshot> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(CorpusSnapshot::build(
            corpus,
            self.profile.index(),
            generation,
            source.map(Path::to_path_buf),
        ));

        let mut current = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        // A slower build must not replace a newer generation.
        if current.generation() < snapshot.generation() {
            *current = Arc::clone(&snapshot);
            log::info!(
                "Serving corpus generation {} ({} records, index: {})",
                snapshot.generation(),
                snapshot.len(),
                snapshot.has_index()
            );
        }
        snapshot
    }

    /// Full pipeline: vector candidates, keyword rerank, optional relevance fusion.
    ///
    /// A missing, empty or non-finite query vector yields no results; a vector of the wrong
    /// length is a [`retriever_vector_store::VectorStoreError::DimensionMismatch`].
    pub async fn search(
        &self,
        query_vector: Option<&[f32]>,
        query_text: &str,
        rescore: bool,
    ) -> Result<Vec<RetrievedSnippet>> {
        let snapshot = self.snapshot();
        let Some(reranked) = self.reranked(&snapshot, query_vector, query_text)? else {
            return Ok(Vec::new());
        };

        let final_k = self.profile.pipeline().final_k;
        let pool = match (&self.rescorer, rescore) {
            (Some(rescorer), true) => rescorer.fuse(query_text, &reranked).await,
            (None, true) => {
                log::debug!("Rescoring requested but no relevance judge is configured");
                heuristic_pool(&reranked)
            }
            (_, false) => heuristic_pool(&reranked),
        };

        Ok(pool
            .iter()
            .take(final_k)
            .map(RetrievedSnippet::from_fused)
            .collect())
    }

    /// Pipeline without the rescoring stage.
    pub fn search_heuristic(
        &self,
        query_vector: Option<&[f32]>,
        query_text: &str,
    ) -> Result<Vec<RetrievedSnippet>> {
        let snapshot = self.snapshot();
        let Some(reranked) = self.reranked(&snapshot, query_vector, query_text)? else {
            return Ok(Vec::new());
        };
        Ok(heuristic_pool(&reranked)
            .iter()
            .take(self.profile.pipeline().final_k)
            .map(RetrievedSnippet::from_fused)
            .collect())
    }

    fn reranked<'s>(
        &self,
        snapshot: &'s CorpusSnapshot,
        query_vector: Option<&[f32]>,
        query_text: &str,
    ) -> Result<Option<Vec<ScoredCandidate<'s>>>> {
        let Some(query) = query_vector.filter(|q| !q.is_empty()) else {
            return Ok(None);
        };
        if snapshot.is_empty() {
            return Ok(None);
        }
        if query.iter().any(|x| !x.is_finite()) {
            log::debug!("Query vector contains non-finite values; returning no results");
            return Ok(None);
        }

        let candidates = snapshot.candidates(query, self.profile.pipeline().candidate_k)?;
        let keywords = self.keywords.extract(query_text);
        log::debug!(
            "search: generation={} candidates={} keywords={:?}",
            snapshot.generation(),
            candidates.len(),
            keywords.as_slice()
        );

        Ok(Some(self.reranker.rerank(candidates, &keywords)))
    }
}

impl Default for Retriever {
    fn default() -> Self {
        Self::new(RetrievalProfile::builtin())
    }
}

fn heuristic_pool<'a>(reranked: &[ScoredCandidate<'a>]) -> Vec<FusedCandidate<'a>> {
    reranked
        .iter()
        .map(|candidate| FusedCandidate {
            candidate: *candidate,
            relevance: None,
            score: candidate.score(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use retriever_vector_store::{magnitude, CorpusRecord};

    fn record(path: &str, vector: Vec<f32>) -> CorpusRecord {
        CorpusRecord {
            repository: "web".to_string(),
            file_path: path.to_string(),
            symbol: None,
            content: String::new(),
            norm: magnitude(&vector),
            vector,
        }
    }

    fn retriever_with(records: Vec<CorpusRecord>) -> Retriever {
        let retriever = Retriever::default();
        retriever.install(Corpus::from_records(records).unwrap());
        retriever
    }

    #[test]
    fn empty_corpus_returns_nothing() {
        let retriever = Retriever::default();
        let results = retriever.search_heuristic(Some(&[1.0, 0.0]), "anything").unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn absent_or_malformed_query_returns_nothing() {
        let retriever = retriever_with(vec![record("a.ts", vec![1.0, 0.0])]);
        assert!(retriever.search_heuristic(None, "a").unwrap().is_empty());
        assert!(retriever.search_heuristic(Some(&[]), "a").unwrap().is_empty());
        assert!(retriever
            .search_heuristic(Some(&[f32::NAN, 0.0]), "a")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn dimension_mismatch_fails_the_call() {
        let retriever = retriever_with(vec![record("a.ts", vec![1.0, 0.0])]);
        let err = retriever
            .search_heuristic(Some(&[1.0, 0.0, 0.0]), "a")
            .unwrap_err();
        assert!(err.is_dimension_mismatch());
    }

    #[test]
    fn truncates_to_final_k() {
        let records = (0..10)
            .map(|i| record(&format!("docs/{i}.md"), vec![1.0, i as f32 * 0.1]))
            .collect();
        let retriever = retriever_with(records);
        let results = retriever.search_heuristic(Some(&[1.0, 0.0]), "").unwrap();
        assert_eq!(results.len(), 3);
        let ids: Vec<usize> = results.iter().map(|r| r.corpus_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(results.iter().all(|r| r.relevance.is_none()));
    }

    #[test]
    fn install_bumps_generation() {
        let retriever = Retriever::default();
        assert_eq!(retriever.snapshot().generation(), 0);
        retriever.install(Corpus::from_records(vec![record("a.ts", vec![1.0])]).unwrap());
        retriever.install(Corpus::from_records(vec![record("b.ts", vec![1.0])]).unwrap());
        let snapshot = retriever.snapshot();
        assert_eq!(snapshot.generation(), 2);
        assert_eq!(snapshot.corpus().records()[0].file_path, "b.ts");
    }
}
