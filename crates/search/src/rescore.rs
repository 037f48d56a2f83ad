use crate::error::{Result, SearchError};
use crate::profile::{HttpJudgeConfig, RescoreConfig};
use crate::rerank::compare_scores;
use async_trait::async_trait;
use retriever_vector_store::ScoredCandidate;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// External judgement of how relevant one candidate text is to a query.
///
/// Implementations return a score in `[0, 1]`; anything else is discarded by [`Rescorer`].
#[async_trait]
pub trait RelevanceJudge: Send + Sync {
    async fn judge(&self, query: &str, candidate: &str) -> Result<f32>;
}

/// Judge backed by an HTTP rerank endpoint (`{model, query, documents}` in, scores out).
pub struct HttpRelevanceJudge {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpRelevanceJudge {
    pub fn new(cfg: &HttpJudgeConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SearchError::Other(format!("failed to build HTTP client: {err}")))?;
        let api_key = match cfg.api_key_env.as_deref() {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                SearchError::Other(format!("relevance judge key variable {var} is not set"))
            })?),
            None => None,
        };
        Ok(Self {
            client,
            url: format!("{}{}", cfg.api_base.trim_end_matches('/'), cfg.path),
            model: cfg.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl RelevanceJudge for HttpRelevanceJudge {
    async fn judge(&self, query: &str, candidate: &str) -> Result<f32> {
        let body = serde_json::json!({
            "model": self.model,
            "query": query,
            "documents": [candidate],
        });
        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| SearchError::RescoreFailed(err.to_string()))?;
        let json: Value = response
            .json()
            .await
            .map_err(|err| SearchError::RescoreFailed(format!("malformed response: {err}")))?;
        parse_relevance_response(&json)
    }
}

/// Accepts `{"results": [{"relevance_score"|"score": x}]}`, `{"data": [...]}` or `{"score": x}`.
fn parse_relevance_response(json: &Value) -> Result<f32> {
    let first = json
        .get("results")
        .or_else(|| json.get("data"))
        .and_then(Value::as_array)
        .and_then(|results| results.first());

    let score = match first {
        Some(item) => item.get("relevance_score").or_else(|| item.get("score")),
        None => json.get("score"),
    };

    score
        .and_then(Value::as_f64)
        .map(|s| s as f32)
        .ok_or_else(|| SearchError::RescoreFailed("response carries no relevance score".to_string()))
}

/// Candidate after the fusion stage.
#[derive(Debug, Clone, Copy)]
pub struct FusedCandidate<'a> {
    pub candidate: ScoredCandidate<'a>,
    /// Judge score when one was obtained
    pub relevance: Option<f32>,
    /// Final ordering score
    pub score: f32,
}

/// Fuses external relevance judgements into the heuristic top slice.
#[derive(Clone)]
pub struct Rescorer {
    judge: Arc<dyn RelevanceJudge>,
    config: RescoreConfig,
}

impl Rescorer {
    #[must_use]
    pub fn new(judge: Arc<dyn RelevanceJudge>, config: RescoreConfig) -> Self {
        Self { judge, config }
    }

    #[must_use]
    pub const fn config(&self) -> &RescoreConfig {
        &self.config
    }

    /// One judgement with truncation and timeout; every failure is `None`.
    pub async fn rescore(&self, query: &str, candidate: &str) -> Option<f32> {
        judge_once(
            self.judge.as_ref(),
            truncate_chars(query, self.config.max_chars),
            truncate_chars(candidate, self.config.max_chars),
            Duration::from_millis(self.config.timeout_ms),
        )
        .await
    }

    /// Judge the first `top_n` reranked candidates, fuse, and re-sort that slice.
    ///
    /// Candidates beyond the slice are dropped: the returned pool is the rescored slice only.
    pub async fn fuse<'a>(
        &self,
        query: &str,
        reranked: &[ScoredCandidate<'a>],
    ) -> Vec<FusedCandidate<'a>> {
        let slice = &reranked[..reranked.len().min(self.config.top_n)];
        let scores = if self.config.concurrency <= 1 {
            self.judge_serial(query, slice).await
        } else {
            self.judge_concurrent(query, slice).await
        };

        let mut fused: Vec<FusedCandidate<'a>> = slice
            .iter()
            .zip(scores)
            .map(|(candidate, relevance)| {
                let heuristic = candidate.score();
                FusedCandidate {
                    candidate: *candidate,
                    relevance,
                    score: relevance.map_or(heuristic, |s| {
                        fuse_scores(heuristic, s, &self.config)
                    }),
                }
            })
            .collect();

        let judged = fused.iter().filter(|c| c.relevance.is_some()).count();
        log::debug!("rescore: {judged}/{} candidates judged", fused.len());

        fused.sort_by(|a, b| {
            compare_scores(
                (a.score, a.candidate.similarity, a.candidate.id),
                (b.score, b.candidate.similarity, b.candidate.id),
            )
        });
        fused
    }

    async fn judge_serial(&self, query: &str, slice: &[ScoredCandidate<'_>]) -> Vec<Option<f32>> {
        let delay = Duration::from_millis(self.config.delay_ms);
        let mut scores = Vec::with_capacity(slice.len());
        for (idx, candidate) in slice.iter().enumerate() {
            if idx > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            scores.push(self.rescore(query, &candidate.record.content).await);
        }
        scores
    }

    async fn judge_concurrent(
        &self,
        query: &str,
        slice: &[ScoredCandidate<'_>],
    ) -> Vec<Option<f32>> {
        let permits = Arc::new(Semaphore::new(self.config.concurrency));
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let delay = Duration::from_millis(self.config.delay_ms);
        let query = truncate_chars(query, self.config.max_chars).to_string();

        let mut tasks = JoinSet::new();
        for (idx, candidate) in slice.iter().enumerate() {
            let judge = Arc::clone(&self.judge);
            let permits = Arc::clone(&permits);
            let query = query.clone();
            let text = truncate_chars(&candidate.record.content, self.config.max_chars).to_string();
            // Calls start at least `delay` apart, as in serial dispatch.
            let start_after = delay.saturating_mul(u32::try_from(idx).unwrap_or(u32::MAX));
            tasks.spawn(async move {
                if !start_after.is_zero() {
                    tokio::time::sleep(start_after).await;
                }
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (idx, None);
                };
                (idx, judge_once(judge.as_ref(), &query, &text, timeout).await)
            });
        }

        let mut scores = vec![None; slice.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, score)) => scores[idx] = score,
                Err(err) => log::debug!("rescore task aborted: {err}"),
            }
        }
        scores
    }
}

/// `heuristic * heuristic_weight + external * external_weight`.
#[must_use]
pub fn fuse_scores(heuristic: f32, external: f32, config: &RescoreConfig) -> f32 {
    heuristic * config.heuristic_weight + external * config.external_weight
}

async fn judge_once(
    judge: &dyn RelevanceJudge,
    query: &str,
    candidate: &str,
    timeout: Duration,
) -> Option<f32> {
    match tokio::time::timeout(timeout, judge.judge(query, candidate)).await {
        Ok(Ok(score)) if score.is_finite() && (0.0..=1.0).contains(&score) => Some(score),
        Ok(Ok(score)) => {
            log::debug!("rescore: discarding out-of-range score {score}");
            None
        }
        Ok(Err(err)) => {
            log::debug!("rescore: {err}");
            None
        }
        Err(_) => {
            log::debug!("rescore: judge timed out after {}ms", timeout.as_millis());
            None
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
