use crate::error::{Result, VectorStoreError};
use crate::similarity::magnitude;
use crate::types::CorpusRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Immutable set of corpus records sharing one embedding dimension.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    records: Vec<CorpusRecord>,
    dimension: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedRecord {
    repository: String,
    file_path: String,
    #[serde(default)]
    symbol: Option<String>,
    content: String,
    vector: Vec<f32>,
    // Older corpora omit it, some write it as a string.
    #[serde(default)]
    norm: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorpusStats {
    pub records: usize,
    pub dimension: Option<usize>,
    pub repositories: usize,
    pub files: usize,
    pub whole_file_chunks: usize,
}

impl Corpus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and validate the corpus file written by the ingestion pipeline.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading corpus from {}", path.display());
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(VectorStoreError::CorpusUnavailable {
                    path: path.to_path_buf(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        let corpus = Self::from_slice(&bytes)?;
        log::info!(
            "Loaded {} records (dimension: {:?})",
            corpus.len(),
            corpus.dimension
        );
        Ok(corpus)
    }

    /// Parse a corpus from its JSON representation.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let persisted: Vec<PersistedRecord> = serde_json::from_slice(bytes)
            .map_err(|err| VectorStoreError::CorpusCorrupt(format!("invalid corpus JSON: {err}")))?;

        let records = persisted
            .into_iter()
            .map(|raw| {
                let norm = raw
                    .norm
                    .as_ref()
                    .and_then(serde_json::Value::as_f64)
                    .map(|n| n as f32)
                    .filter(|n| n.is_finite() && *n >= 0.0)
                    .unwrap_or_else(|| magnitude(&raw.vector));
                CorpusRecord {
                    repository: raw.repository,
                    file_path: raw.file_path,
                    symbol: raw.symbol.filter(|s| !s.trim().is_empty()),
                    content: raw.content,
                    vector: raw.vector,
                    norm,
                }
            })
            .collect();

        Self::from_records(records)
    }

    /// Validate already-built records. The first record fixes the dimension.
    pub fn from_records(records: Vec<CorpusRecord>) -> Result<Self> {
        let dimension = records.first().map(|record| record.vector.len());

        for (idx, record) in records.iter().enumerate() {
            if record.repository.trim().is_empty() {
                return Err(VectorStoreError::CorpusCorrupt(format!(
                    "record #{idx} ({}) has an empty repository",
                    record.file_path
                )));
            }
            if let Some(expected) = dimension {
                if record.vector.len() != expected {
                    return Err(VectorStoreError::CorpusCorrupt(format!(
                        "record #{idx} ({}) has dimension {}, expected {expected}",
                        record.file_path,
                        record.vector.len()
                    )));
                }
            }
            if record.vector.iter().any(|x| !x.is_finite()) {
                return Err(VectorStoreError::CorpusCorrupt(format!(
                    "record #{idx} ({}) contains a non-finite vector component",
                    record.file_path
                )));
            }
        }

        if dimension == Some(0) {
            return Err(VectorStoreError::CorpusCorrupt(
                "records have zero-length vectors".to_string(),
            ));
        }

        Ok(Self { records, dimension })
    }

    /// Write records in the persisted corpus format (temp file + rename).
    pub async fn save(path: impl AsRef<Path>, records: &[CorpusRecord]) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec(records)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    #[must_use]
    pub fn records(&self) -> &[CorpusRecord] {
        &self.records
    }

    #[must_use]
    pub fn get(&self, id: usize) -> Option<&CorpusRecord> {
        self.records.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Embedding dimension; `None` for an empty corpus.
    #[must_use]
    pub const fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    #[must_use]
    pub fn stats(&self) -> CorpusStats {
        let repositories: BTreeSet<&str> =
            self.records.iter().map(|r| r.repository.as_str()).collect();
        let files: BTreeSet<(&str, &str)> = self
            .records
            .iter()
            .map(|r| (r.repository.as_str(), r.file_path.as_str()))
            .collect();
        CorpusStats {
            records: self.records.len(),
            dimension: self.dimension,
            repositories: repositories.len(),
            files: files.len(),
            whole_file_chunks: self.records.iter().filter(|r| r.symbol.is_none()).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn record(path: &str, vector: Vec<f32>) -> CorpusRecord {
        CorpusRecord {
            repository: "web".to_string(),
            file_path: path.to_string(),
            symbol: None,
            content: format!("// {path}"),
            norm: magnitude(&vector),
            vector,
        }
    }

    #[test]
    fn norm_is_computed_when_missing_or_not_numeric() {
        let json = br#"[
            {"repository": "web", "filePath": "a.ts", "content": "a", "vector": [3.0, 4.0]},
            {"repository": "web", "filePath": "b.ts", "content": "b", "vector": [0.0, 2.0], "norm": "oops"},
            {"repository": "web", "filePath": "c.ts", "content": "c", "vector": [1.0, 0.0], "norm": 7.5}
        ]"#;
        let corpus = Corpus::from_slice(json).unwrap();

        let norms: Vec<f32> = corpus.records().iter().map(|r| r.norm).collect();
        assert_eq!(norms, vec![5.0, 2.0, 7.5]);
        assert_eq!(corpus.dimension(), Some(2));
    }

    #[test]
    fn symbol_is_optional() {
        let json = br#"[
            {"repository": "web", "filePath": "a.ts", "symbol": "useCart", "content": "a", "vector": [1.0]},
            {"repository": "web", "filePath": "b.ts", "symbol": null, "content": "b", "vector": [1.0]}
        ]"#;
        let corpus = Corpus::from_slice(json).unwrap();
        assert_eq!(corpus.records()[0].symbol.as_deref(), Some("useCart"));
        assert_eq!(corpus.records()[1].symbol, None);
        assert_eq!(corpus.stats().whole_file_chunks, 1);
    }

    #[test]
    fn mismatched_dimension_is_corrupt() {
        let json = br#"[
            {"repository": "web", "filePath": "a.ts", "content": "a", "vector": [1.0, 0.0]},
            {"repository": "web", "filePath": "b.ts", "content": "b", "vector": [1.0]}
        ]"#;
        let err = Corpus::from_slice(json).unwrap_err();
        assert!(matches!(err, VectorStoreError::CorpusCorrupt(_)), "{err}");
        assert!(err.to_string().contains("b.ts"), "{err}");
    }

    #[test]
    fn wrong_shape_is_corrupt() {
        let err = Corpus::from_slice(br#"{"records": []}"#).unwrap_err();
        assert!(matches!(err, VectorStoreError::CorpusCorrupt(_)));

        let err = Corpus::from_slice(
            br#"[{"repository": "", "filePath": "a.ts", "content": "a", "vector": [1.0]}]"#,
        )
        .unwrap_err();
        assert!(matches!(err, VectorStoreError::CorpusCorrupt(_)));
    }

    #[test]
    fn empty_corpus_is_valid() {
        let corpus = Corpus::from_slice(b"[]").unwrap();
        assert!(corpus.is_empty());
        assert_eq!(corpus.dimension(), None);
    }

    #[tokio::test]
    async fn missing_file_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        let err = Corpus::load(tmp.path().join("nope.json")).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::CorpusUnavailable { .. }));
    }

    #[tokio::test]
    async fn saved_corpus_loads_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data").join("corpus.json");
        let records = vec![
            record("src/a.ts", vec![1.0, 0.0]),
            record("src/b.ts", vec![0.0, 2.0]),
        ];

        Corpus::save(&path, &records).await.unwrap();
        let loaded = Corpus::load(&path).await.unwrap();

        assert_eq!(loaded.records(), records.as_slice());
        assert_eq!(
            loaded.stats(),
            CorpusStats {
                records: 2,
                dimension: Some(2),
                repositories: 1,
                files: 2,
                whole_file_chunks: 2,
            }
        );
    }
}
