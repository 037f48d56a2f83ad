use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::tempdir;

const CORPUS: &str = r#"[
  {"repository": "shop-web", "filePath": "packages/cart/src/cart.test.ts", "content": "describe('basket')", "vector": [1.0, 0.0, 0.0]},
  {"repository": "shop-web", "filePath": "packages/cart/index.ts", "symbol": "CartProvider", "content": "export * from './src'", "vector": [0.9, 0.1, 0.0]},
  {"repository": "docs", "filePath": "guide.md", "symbol": null, "content": "How to deploy", "vector": [0.0, 1.0, 0.0], "norm": "1"}
]"#;

fn setup_corpus() -> tempfile::TempDir {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("corpus.json"), CORPUS).unwrap();
    fs::write(temp.path().join("query.json"), "[1.0, 0.0, 0.0]").unwrap();
    temp
}

#[allow(deprecated)]
fn cli() -> Command {
    Command::cargo_bin("code-retriever").expect("binary")
}

#[test]
fn stats_reports_corpus_shape() {
    let temp = setup_corpus();
    let output = cli()
        .current_dir(temp.path())
        .args(["stats", "--corpus", "corpus.json"])
        .output()
        .expect("command run");
    assert!(output.status.success());

    let stats: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(stats["records"], 3);
    assert_eq!(stats["dimension"], 3);
    assert_eq!(stats["repositories"], 2);
}

#[test]
fn search_prints_reranked_json() {
    let temp = setup_corpus();
    let output = cli()
        .current_dir(temp.path())
        .args([
            "search",
            "--corpus",
            "corpus.json",
            "--vector",
            "query.json",
            "--query",
            "cart index",
            "--json",
        ])
        .output()
        .expect("command run");
    assert!(output.status.success());

    let results: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    let results = results.as_array().expect("array");
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["filePath"], "packages/cart/index.ts");
    assert_eq!(results[0]["symbol"], "CartProvider");
    assert_eq!(results[1]["filePath"], "packages/cart/src/cart.test.ts");
    assert!(results[0].get("vector").is_none());
}

#[test]
fn search_reads_vector_from_stdin() {
    let temp = setup_corpus();
    cli()
        .current_dir(temp.path())
        .args(["search", "--corpus", "corpus.json", "--vector", "-"])
        .write_stdin("[0.0, 1.0, 0.0]")
        .assert()
        .success()
        .stdout(predicate::str::contains("docs/guide.md"));
}

#[test]
fn missing_corpus_fails_with_context() {
    let temp = tempdir().unwrap();
    cli()
        .current_dir(temp.path())
        .args(["stats", "--corpus", "absent.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load corpus"));
}

#[test]
fn wrong_vector_length_fails() {
    let temp = setup_corpus();
    fs::write(temp.path().join("short.json"), "[1.0, 0.0]").unwrap();
    cli()
        .current_dir(temp.path())
        .args(["search", "--corpus", "corpus.json", "--vector", "short.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("dimension"));
}

#[test]
fn invalid_profile_is_rejected() {
    let temp = setup_corpus();
    fs::write(temp.path().join("bad.json"), r#"{"rerank": {"unknown": 1}}"#).unwrap();
    cli()
        .current_dir(temp.path())
        .args([
            "search",
            "--corpus",
            "corpus.json",
            "--vector",
            "query.json",
            "--profile",
            "bad.json",
        ])
        .assert()
        .failure();
}
