use std::path::Path;

use anyhow::{anyhow, Context, Result};
use retriever_vector_store::{IndexBackend, IndexConfig};
use serde::Deserialize;
use tokio::sync::Semaphore;

const BUILTIN_DEFAULT: &str = include_str!("../../../profiles/default.json");

/// Tunable knobs of the retrieval pipeline.
///
/// Every weight is a named value so it can be retuned without touching code. Profiles
/// are JSON (TOML accepted as a fallback) layered over the bundled default profile.
#[derive(Clone, Debug)]
pub struct RetrievalProfile {
    name: String,
    description: Option<String>,
    pipeline: PipelineConfig,
    rerank: RerankWeights,
    keywords: KeywordConfig,
    index: IndexConfig,
    rescore: RescoreConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Candidates pulled from vector search (K₁)
    pub candidate_k: usize,
    /// Results returned to the caller (K₂)
    pub final_k: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            candidate_k: 15,
            final_k: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RerankWeights {
    pub path_match: f32,
    pub content_match: f32,
    pub symbol_match: f32,
    pub test_penalty: f32,
    pub src_penalty: f32,
    pub index_bonus: f32,
    /// Extensions that count as source files for the index/test rules
    pub source_extensions: Vec<String>,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            path_match: 0.15,
            content_match: 0.05,
            symbol_match: 0.10,
            test_penalty: 0.40,
            src_penalty: 0.05,
            index_bonus: 0.20,
            source_extensions: ["js", "jsx", "ts", "tsx"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeywordConfig {
    pub extra_stop_words: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RescoreConfig {
    /// Size of the heuristic top slice sent to the judge
    pub top_n: usize,
    pub heuristic_weight: f32,
    pub external_weight: f32,
    pub timeout_ms: u64,
    /// Minimum gap between the starts of consecutive judge calls
    pub delay_ms: u64,
    /// Max in-flight judge calls; `<= 1` means serial
    pub concurrency: usize,
    /// Query and candidate text are cut to this many chars before judging
    pub max_chars: usize,
    pub http: Option<HttpJudgeConfig>,
}

impl Default for RescoreConfig {
    fn default() -> Self {
        Self {
            top_n: 5,
            heuristic_weight: 0.7,
            external_weight: 0.3,
            timeout_ms: 10_000,
            delay_ms: 0,
            concurrency: 1,
            max_chars: 4_000,
            http: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpJudgeConfig {
    pub api_base: String,
    #[serde(default = "default_judge_path")]
    pub path: String,
    pub model: String,
    /// Environment variable holding the bearer token
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_judge_path() -> String {
    "/v1/rerank".to_string()
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProfile {
    #[serde(default)]
    schema_version: Option<u32>,
    name: Option<String>,
    description: Option<String>,
    pipeline: Option<RawPipeline>,
    rerank: Option<RawRerank>,
    keywords: Option<RawKeywords>,
    index: Option<RawIndex>,
    rescore: Option<RawRescore>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPipeline {
    candidate_k: Option<usize>,
    final_k: Option<usize>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRerank {
    path_match: Option<f32>,
    content_match: Option<f32>,
    symbol_match: Option<f32>,
    test_penalty: Option<f32>,
    src_penalty: Option<f32>,
    index_bonus: Option<f32>,
    source_extensions: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawKeywords {
    extra_stop_words: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawIndex {
    backend: Option<IndexBackend>,
    max_connections: Option<usize>,
    ef_construction: Option<usize>,
    ef_search: Option<usize>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRescore {
    top_n: Option<usize>,
    heuristic_weight: Option<f32>,
    external_weight: Option<f32>,
    timeout_ms: Option<u64>,
    delay_ms: Option<u64>,
    concurrency: Option<usize>,
    max_chars: Option<usize>,
    http: Option<HttpJudgeConfig>,
}

impl RetrievalProfile {
    /// The bundled reference profile.
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_raw(
            parse_raw(BUILTIN_DEFAULT.as_bytes()).expect("builtin default profile must parse"),
            &Self::reference(),
            "default",
        )
        .expect("builtin default profile must validate")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read profile file {}", path.display()))?;
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("custom");
        Self::from_bytes(name, &bytes)
    }

    /// Parse a profile; fields it omits keep the builtin values.
    pub fn from_bytes(profile_name: &str, bytes: &[u8]) -> Result<Self> {
        let raw = parse_raw(bytes).with_context(|| {
            format!("Profile '{profile_name}' is not valid JSON/TOML configuration")
        })?;
        Self::from_raw(raw, &Self::builtin(), profile_name)
    }

    fn reference() -> Self {
        Self {
            name: "reference".to_string(),
            description: None,
            pipeline: PipelineConfig::default(),
            rerank: RerankWeights::default(),
            keywords: KeywordConfig::default(),
            index: IndexConfig::default(),
            rescore: RescoreConfig::default(),
        }
    }

    fn from_raw(raw: RawProfile, base: &Self, fallback_name: &str) -> Result<Self> {
        if let Some(version) = raw.schema_version {
            if version != 1 {
                return Err(anyhow!(
                    "profile.schema_version {version} is not supported (expected 1)"
                ));
            }
        }

        let pipeline = {
            let raw = raw.pipeline.unwrap_or_default();
            PipelineConfig {
                candidate_k: raw.candidate_k.unwrap_or(base.pipeline.candidate_k),
                final_k: raw.final_k.unwrap_or(base.pipeline.final_k),
            }
        };

        let rerank = {
            let raw = raw.rerank.unwrap_or_default();
            let defaults = &base.rerank;
            RerankWeights {
                path_match: raw.path_match.unwrap_or(defaults.path_match),
                content_match: raw.content_match.unwrap_or(defaults.content_match),
                symbol_match: raw.symbol_match.unwrap_or(defaults.symbol_match),
                test_penalty: raw.test_penalty.unwrap_or(defaults.test_penalty),
                src_penalty: raw.src_penalty.unwrap_or(defaults.src_penalty),
                index_bonus: raw.index_bonus.unwrap_or(defaults.index_bonus),
                source_extensions: raw
                    .source_extensions
                    .map(|exts| {
                        exts.into_iter()
                            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                            .collect()
                    })
                    .unwrap_or_else(|| defaults.source_extensions.clone()),
            }
        };

        let keywords = KeywordConfig {
            extra_stop_words: raw
                .keywords
                .and_then(|k| k.extra_stop_words)
                .unwrap_or_else(|| base.keywords.extra_stop_words.clone()),
        };

        let index = {
            let raw = raw.index.unwrap_or_default();
            IndexConfig {
                backend: raw.backend.unwrap_or(base.index.backend),
                max_connections: raw.max_connections.unwrap_or(base.index.max_connections),
                ef_construction: raw.ef_construction.unwrap_or(base.index.ef_construction),
                ef_search: raw.ef_search.unwrap_or(base.index.ef_search),
            }
        };

        let rescore = {
            let raw = raw.rescore.unwrap_or_default();
            let defaults = &base.rescore;
            RescoreConfig {
                top_n: raw.top_n.unwrap_or(defaults.top_n),
                heuristic_weight: raw.heuristic_weight.unwrap_or(defaults.heuristic_weight),
                external_weight: raw.external_weight.unwrap_or(defaults.external_weight),
                timeout_ms: raw.timeout_ms.unwrap_or(defaults.timeout_ms),
                delay_ms: raw.delay_ms.unwrap_or(defaults.delay_ms),
                concurrency: raw.concurrency.unwrap_or(defaults.concurrency),
                max_chars: raw.max_chars.unwrap_or(defaults.max_chars),
                http: raw.http.or_else(|| defaults.http.clone()),
            }
        };

        let profile = Self {
            name: raw.name.unwrap_or_else(|| fallback_name.to_string()),
            description: raw.description.or_else(|| base.description.clone()),
            pipeline,
            rerank,
            keywords,
            index,
            rescore,
        };
        profile.validate()?;
        Ok(profile)
    }

    fn validate(&self) -> Result<()> {
        if self.pipeline.final_k == 0 {
            return Err(anyhow!("pipeline.final_k must be at least 1"));
        }
        if self.pipeline.candidate_k < self.pipeline.final_k {
            return Err(anyhow!(
                "pipeline.candidate_k ({}) must not be smaller than pipeline.final_k ({})",
                self.pipeline.candidate_k,
                self.pipeline.final_k
            ));
        }

        let weights = [
            ("rerank.path_match", self.rerank.path_match),
            ("rerank.content_match", self.rerank.content_match),
            ("rerank.symbol_match", self.rerank.symbol_match),
            ("rerank.test_penalty", self.rerank.test_penalty),
            ("rerank.src_penalty", self.rerank.src_penalty),
            ("rerank.index_bonus", self.rerank.index_bonus),
            ("rescore.heuristic_weight", self.rescore.heuristic_weight),
            ("rescore.external_weight", self.rescore.external_weight),
        ];
        for (key, value) in weights {
            if !value.is_finite() {
                return Err(anyhow!("{key} must be a finite number"));
            }
        }

        if self.index.max_connections < 2 {
            return Err(anyhow!("index.max_connections must be at least 2"));
        }
        if self.rescore.max_chars == 0 {
            return Err(anyhow!("rescore.max_chars must be at least 1"));
        }
        if self.rescore.top_n == 0 {
            return Err(anyhow!("rescore.top_n must be at least 1"));
        }
        if self.rescore.concurrency > Semaphore::MAX_PERMITS {
            return Err(anyhow!(
                "rescore.concurrency must not exceed {}",
                Semaphore::MAX_PERMITS
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub const fn pipeline(&self) -> &PipelineConfig {
        &self.pipeline
    }

    #[must_use]
    pub const fn rerank_weights(&self) -> &RerankWeights {
        &self.rerank
    }

    #[must_use]
    pub const fn keywords(&self) -> &KeywordConfig {
        &self.keywords
    }

    #[must_use]
    pub const fn index(&self) -> &IndexConfig {
        &self.index
    }

    #[must_use]
    pub const fn rescore(&self) -> &RescoreConfig {
        &self.rescore
    }
}

impl Default for RetrievalProfile {
    fn default() -> Self {
        Self::builtin()
    }
}

fn parse_raw(bytes: &[u8]) -> Result<RawProfile> {
    match serde_json::from_slice::<RawProfile>(bytes) {
        Ok(raw) => Ok(raw),
        Err(json_err) if json_err.is_syntax() || json_err.is_eof() => {
            let utf8 = std::str::from_utf8(bytes).map_err(|err| anyhow!("{json_err}; {err}"))?;
            toml::from_str(utf8).map_err(|toml_err| {
                anyhow!(
                    "Profile is not valid JSON or TOML ({json_err}); TOML parse error: {toml_err}"
                )
            })
        }
        Err(json_err) => Err(anyhow!("Profile parse error: {json_err}")),
    }
}
