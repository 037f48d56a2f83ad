use crate::keywords::KeywordSet;
use crate::profile::RerankWeights;
use retriever_vector_store::{CorpusRecord, ScoredCandidate};
use std::cmp::Ordering;

const TEST_DIRS: &[&str] = &["__tests__", "test", "tests"];
const TEST_MARKERS: &[&str] = &["test", "spec", "mock"];

/// Linear keyword and path-role rescoring of vector-search candidates.
#[derive(Clone, Debug, Default)]
pub struct HeuristicReranker {
    weights: RerankWeights,
}

/// Role of a file inferred from its path alone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PathRole {
    pub is_test: bool,
    pub is_index: bool,
    pub in_src: bool,
}

impl HeuristicReranker {
    #[must_use]
    pub const fn new(weights: RerankWeights) -> Self {
        Self { weights }
    }

    #[must_use]
    pub const fn weights(&self) -> &RerankWeights {
        &self.weights
    }

    /// Heuristic score of one record: `similarity` plus every matching adjustment.
    #[must_use]
    pub fn score(&self, record: &CorpusRecord, similarity: f32, keywords: &KeywordSet) -> f32 {
        let w = &self.weights;
        let path = record.file_path.to_lowercase();
        let mut score = similarity;

        if !keywords.is_empty() {
            score += w.path_match * keywords.count_in(&path) as f32;
            score += w.content_match * keywords.count_in(&record.content.to_lowercase()) as f32;
            if let Some(symbol) = record.symbol.as_deref() {
                score += w.symbol_match * keywords.count_in(&symbol.to_lowercase()) as f32;
            }
        }

        let role = classify_path(&path, &w.source_extensions);
        if role.is_test {
            score -= w.test_penalty;
        }
        if role.in_src {
            score -= w.src_penalty;
        }
        if role.is_index {
            score += w.index_bonus;
        }
        score
    }

    /// Set `rerank_score` on every candidate and reorder.
    ///
    /// Order: rerank score desc, then similarity desc, then corpus position.
    #[must_use]
    pub fn rerank<'a>(
        &self,
        candidates: Vec<ScoredCandidate<'a>>,
        keywords: &KeywordSet,
    ) -> Vec<ScoredCandidate<'a>> {
        let mut reranked: Vec<ScoredCandidate<'a>> = candidates
            .into_iter()
            .map(|mut candidate| {
                candidate.rerank_score =
                    Some(self.score(candidate.record, candidate.similarity, keywords));
                candidate
            })
            .collect();

        reranked.sort_by(compare_candidates);

        if log::log_enabled!(log::Level::Debug) {
            for candidate in reranked.iter().take(5) {
                log::debug!(
                    "rerank: repo={} path={} score={:.4}",
                    candidate.record.repository,
                    candidate.record.file_path,
                    candidate.score()
                );
            }
        }
        reranked
    }
}

pub(crate) fn compare_candidates(a: &ScoredCandidate<'_>, b: &ScoredCandidate<'_>) -> Ordering {
    compare_scores(
        (a.score(), a.similarity, a.id),
        (b.score(), b.similarity, b.id),
    )
}

/// `(score, similarity, id)`: higher score, then higher similarity, then lower id.
pub(crate) fn compare_scores(a: (f32, f32, usize), b: (f32, f32, usize)) -> Ordering {
    b.0.total_cmp(&a.0)
        .then_with(|| b.1.total_cmp(&a.1))
        .then_with(|| a.2.cmp(&b.2))
}

/// Classify a lower-cased, `/`-separated path.
#[must_use]
pub fn classify_path(path: &str, source_extensions: &[String]) -> PathRole {
    let normalized = path.replace('\\', "/");
    let mut segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
    let Some(file_name) = segments.pop() else {
        return PathRole::default();
    };

    let (stem, is_source) = match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem, source_extensions.iter().any(|e| e == ext)),
        None => (file_name, false),
    };

    let is_index = is_source && stem == "index";
    let in_test_dir = segments.iter().any(|dir| TEST_DIRS.contains(dir));
    let test_suffix = is_source && has_test_suffix(stem);

    PathRole {
        is_test: test_suffix || in_test_dir,
        is_index,
        in_src: !is_index && segments.iter().any(|dir| *dir == "src"),
    }
}

/// `button.test`, `button_spec`, `api-mock`...
fn has_test_suffix(stem: &str) -> bool {
    TEST_MARKERS.iter().any(|marker| {
        stem.strip_suffix(marker)
            .and_then(|rest| rest.chars().last())
            .is_some_and(|sep| matches!(sep, '.' | '_' | '-'))
    })
}
