use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use retriever_search::{HttpRelevanceJudge, RetrievalProfile, RetrievedSnippet, Retriever};
use retriever_vector_store::Corpus;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "code-retriever")]
#[command(about = "Retrieve code snippets from an embedded corpus", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a corpus file and print its statistics
    Stats(StatsArgs),

    /// Run one query against a corpus file
    Search(SearchArgs),
}

#[derive(Args)]
struct StatsArgs {
    /// Corpus file (JSON array of embedded snippets)
    #[arg(long)]
    corpus: PathBuf,
}

#[derive(Args)]
struct SearchArgs {
    /// Corpus file (JSON array of embedded snippets)
    #[arg(long)]
    corpus: PathBuf,

    /// Query embedding as a JSON array of numbers; `-` reads it from stdin
    #[arg(long)]
    vector: String,

    /// Natural-language query text used for keyword reranking
    #[arg(short, long, default_value = "")]
    query: String,

    /// Fuse external relevance scores (needs `rescore.http` in the profile)
    #[arg(long)]
    rescore: bool,

    /// Retrieval profile file (JSON or TOML); defaults to the bundled profile
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    // Auto-enable quiet mode when JSON is printed (to keep stdout clean for parsing)
    let json_output = match &cli.command {
        Commands::Stats(_) => true,
        Commands::Search(args) => args.json,
    };
    if json_output {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Stats(args) => run_stats(args).await?,
        Commands::Search(args) => run_search(args).await?,
    }
    Ok(())
}

/// Print corpus statistics
async fn run_stats(args: StatsArgs) -> Result<()> {
    let corpus = Corpus::load(&args.corpus)
        .await
        .with_context(|| format!("Failed to load corpus {}", args.corpus.display()))?;
    println!("{}", serde_json::to_string_pretty(&corpus.stats())?);
    Ok(())
}

/// Search a corpus with one query embedding
async fn run_search(args: SearchArgs) -> Result<()> {
    let profile = match &args.profile {
        Some(path) => RetrievalProfile::from_file(path)?,
        None => RetrievalProfile::builtin(),
    };
    let query_vector = read_query_vector(&args.vector)?;

    let mut retriever = Retriever::new(profile);
    if args.rescore {
        retriever = attach_http_judge(retriever)?;
    }
    retriever
        .load(&args.corpus)
        .await
        .with_context(|| format!("Failed to load corpus {}", args.corpus.display()))?;

    let results = retriever
        .search(Some(&query_vector), &args.query, args.rescore)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_results(&results);
    }
    Ok(())
}

fn attach_http_judge(retriever: Retriever) -> Result<Retriever> {
    let rescore = retriever.profile().rescore();
    let Some(http) = rescore.http.as_ref() else {
        log::warn!("--rescore given but the profile has no rescore.http block; skipping");
        return Ok(retriever);
    };
    let judge = HttpRelevanceJudge::new(http, Duration::from_millis(rescore.timeout_ms))
        .context("Failed to configure the relevance judge")?;
    Ok(retriever.with_judge(Arc::new(judge)))
}

fn read_query_vector(source: &str) -> Result<Vec<f32>> {
    let raw = if source == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read query vector from stdin")?;
        buf
    } else {
        std::fs::read_to_string(Path::new(source))
            .with_context(|| format!("Failed to read query vector file {source}"))?
    };
    serde_json::from_str(&raw).context("Query vector must be a JSON array of numbers")
}

fn print_results(results: &[RetrievedSnippet]) {
    if results.is_empty() {
        eprintln!("No results");
        return;
    }
    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. {}/{} (score: {:.3}, similarity: {:.3})",
            i + 1,
            result.repository,
            result.file_path,
            result.score,
            result.similarity
        );
        if let Some(symbol) = &result.symbol {
            println!("   Symbol: {}", symbol);
        }
        if let Some(relevance) = result.relevance {
            println!("   Relevance: {:.3}", relevance);
        }
        println!();
    }
}
