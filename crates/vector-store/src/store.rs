use crate::corpus::Corpus;
use crate::error::{Result, VectorStoreError};
use crate::similarity::{cosine_with_norms, magnitude};
use crate::types::ScoredCandidate;

/// Brute-force cosine ranking over the whole corpus.
///
/// Sorted by similarity descending; the sort is stable so ties keep corpus order.
pub fn exact_search<'a>(query: &[f32], corpus: &'a Corpus) -> Result<Vec<ScoredCandidate<'a>>> {
    let Some(dimension) = corpus.dimension() else {
        return Ok(Vec::new());
    };
    if query.len() != dimension {
        return Err(VectorStoreError::DimensionMismatch {
            expected: dimension,
            actual: query.len(),
        });
    }

    let query_norm = magnitude(query);
    let mut scored: Vec<ScoredCandidate<'a>> = corpus
        .records()
        .iter()
        .enumerate()
        .map(|(id, record)| {
            let similarity = cosine_with_norms(query, query_norm, &record.vector, record.norm);
            ScoredCandidate::new(id, record, similarity)
        })
        .collect();

    scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    Ok(scored)
}

/// [`exact_search`] truncated to `k` candidates.
pub fn exact_top_k<'a>(
    query: &[f32],
    corpus: &'a Corpus,
    k: usize,
) -> Result<Vec<ScoredCandidate<'a>>> {
    let mut scored = exact_search(query, corpus)?;
    scored.truncate(k);
    Ok(scored)
}
