//! Command line front end for quarry.

mod output;
mod workspace;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use quarry_config::Config;
use quarry_index::embeddings::DEFAULT_MAX_CHUNK_SIZE;
use quarry_index::{
    build_pipeline, BasicChunker, EmbeddingProvider, HttpReranker, InMemoryVectorIndex, LocalIde,
    OpenAiEmbeddings, QdrantConfig, QdrantVectorIndex, RecentlyEditedFiles, Reranker,
    RetrievalBase, RetrievalPipelineOptions, RetrievalPipelineRunArguments, RetrievalSources, Tag,
    TrigramIndex, VectorIndex,
};

pub use workspace::{absolutize, IndexStats, WorkspaceIndexer};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "QUARRY_LOG";

#[derive(Parser, Debug)]
#[command(
    name = "quarry",
    version,
    about = "Hybrid code context retrieval",
    long_about = "Find the code most relevant to a question by combining full-text search,\n\
        embeddings and recently edited files, optionally reranked by a relevance model."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: <config dir>/quarry/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Retrieve the chunks most relevant to a query
    Search(SearchArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Natural language or keyword query
    query: String,

    /// Workspace root to index
    #[arg(long, short, default_value = ".")]
    workspace: PathBuf,

    /// Branch name recorded in the index scope
    #[arg(long, default_value = "main")]
    branch: String,

    /// Only return chunks under this directory
    #[arg(long)]
    filter_dir: Option<PathBuf>,

    /// Recently edited files, most recent first
    #[arg(long)]
    recent: Vec<PathBuf>,

    /// Files open in the editor
    #[arg(long)]
    open: Vec<PathBuf>,

    /// Candidates requested from each source
    #[arg(long)]
    n_retrieve: Option<usize>,

    /// Maximum number of results
    #[arg(long, short = 'n')]
    n_final: Option<usize>,

    /// Skip vector retrieval even if embeddings are configured
    #[arg(long)]
    no_embeddings: bool,

    /// Skip reranking even if a reranker is configured
    #[arg(long)]
    no_rerank: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

/// Install the stderr subscriber. `QUARRY_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let fallback = if verbose {
        "quarry=debug,quarry_index=debug,quarry_cli=debug"
    } else {
        "quarry=info,quarry_index=info,quarry_cli=info"
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    debug!(
        embeddings = config.embeddings.is_some(),
        reranker = config.reranker.is_some(),
        "Loaded configuration"
    );

    match cli.command {
        Command::Search(args) => search(&config, args).await,
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Pipeline options from the config file, with command line overrides.
fn retrieval_options(config: &Config, args: &SearchArgs) -> RetrievalPipelineOptions {
    let retrieval = &config.retrieval;
    RetrievalPipelineOptions {
        n_retrieve: args.n_retrieve.unwrap_or(retrieval.n_retrieve).max(1),
        n_final: args.n_final.unwrap_or(retrieval.n_final).max(1),
        include_embeddings: retrieval.include_embeddings
            && !args.no_embeddings
            && config.embeddings.is_some(),
        filter_directory: config.filter_directory(),
        max_chunk_size: config
            .embeddings
            .as_ref()
            .map_or(DEFAULT_MAX_CHUNK_SIZE, |e| e.max_chunk_size),
        max_rerank_candidates: retrieval.max_rerank_candidates,
    }
}

fn embedding_provider(config: &Config) -> Option<Arc<dyn EmbeddingProvider>> {
    let embeddings = config.embeddings.as_ref()?;
    let provider = OpenAiEmbeddings::new(
        embeddings.resolved_base_url(),
        embeddings.model.clone(),
        embeddings.resolved_api_key(),
        embeddings.dimensions,
    )
    .with_max_batch_size(embeddings.max_batch_size)
    .with_max_chunk_size(embeddings.max_chunk_size);
    Some(Arc::new(provider))
}

fn reranker(config: &Config) -> Option<Arc<dyn Reranker>> {
    let reranker = config.reranker.as_ref()?;
    Some(Arc::new(HttpReranker::new(
        reranker.resolved_base_url(),
        Some(reranker.model.clone()),
        reranker.resolved_api_key(),
    )))
}

/// Resolve each path against `base`, dropping the ones that do not exist.
fn resolve_paths(base: &Path, paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|path| match absolutize(base, path) {
            Ok(path) => Some(path.to_string_lossy().into_owned()),
            Err(e) => {
                warn!(error = %e, "Ignoring file");
                None
            }
        })
        .collect()
}

async fn search(config: &Config, args: SearchArgs) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let root = absolutize(&cwd, &args.workspace)?;
    let tag = Tag::new(args.branch.clone(), root.to_string_lossy());
    let options = retrieval_options(config, &args);

    let lexical = Arc::new(TrigramIndex::new());
    let indexer = WorkspaceIndexer::new(root.clone(), tag.clone(), options.max_chunk_size);
    let embeddings = embedding_provider(config).filter(|_| options.include_embeddings);

    let vector: Option<Arc<dyn VectorIndex>> =
        match (embeddings, config.vector_store.resolved_qdrant_url()) {
            (Some(embeddings), Some(url)) => {
                indexer.index(&lexical, None).await?;
                let qdrant = QdrantConfig {
                    url,
                    api_key: config.vector_store.resolved_qdrant_api_key(),
                    collection_name: config.vector_store.collection.clone(),
                };
                Some(Arc::new(QdrantVectorIndex::from_config(&qdrant, embeddings)?))
            }
            (Some(embeddings), None) => {
                let memory = InMemoryVectorIndex::new(embeddings);
                indexer.index(&lexical, Some(&memory)).await?;
                Some(Arc::new(memory))
            }
            (None, _) => {
                indexer.index(&lexical, None).await?;
                None
            }
        };

    let mut recent = RecentlyEditedFiles::new(config.recency.capacity);
    if let Some(secs) = config.recency.max_age_secs {
        recent = recent.with_max_age(Duration::from_secs(secs));
    }
    // Record oldest first so the first path given ends up most recent
    for path in resolve_paths(&cwd, &args.recent).into_iter().rev() {
        recent.record_edit(path);
    }

    let ide = LocalIde::new(vec![root.clone()]).with_open_files(resolve_paths(&cwd, &args.open));

    let base = RetrievalBase::new(
        options,
        RetrievalSources {
            lexical,
            vector,
            recent: Arc::new(recent),
            ide: Arc::new(ide),
            chunker: Arc::new(BasicChunker),
        },
    );
    let reranker = reranker(config).filter(|_| !args.no_rerank);
    let pipeline = build_pipeline(base, reranker);

    let filter_directory = match &args.filter_dir {
        Some(dir) => Some(absolutize(&root, dir)?.to_string_lossy().into_owned()),
        None => None,
    };
    let run_args = RetrievalPipelineRunArguments {
        query: args.query.clone(),
        tags: vec![tag],
        filter_directory,
    };

    let results = pipeline.run(&run_args).await;

    if args.json {
        println!("{}", output::render_json(&args.query, &results)?);
    } else {
        print!("{}", output::render_text(&results));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_args(argv: &[&str]) -> SearchArgs {
        let cli = Cli::try_parse_from(argv.iter().copied()).unwrap();
        match cli.command {
            Command::Search(args) => args,
            other => panic!("expected search, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::try_parse_from([
            "quarry", "search", "parse json", "--recent", "a.rs", "--recent", "b.rs", "-n", "3",
            "--json", "--verbose",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Command::Search(args) = cli.command else {
            panic!("expected search");
        };
        assert_eq!(args.query, "parse json");
        assert_eq!(args.recent, vec![PathBuf::from("a.rs"), PathBuf::from("b.rs")]);
        assert_eq!(args.n_final, Some(3));
        assert_eq!(args.branch, "main");
        assert!(args.json);
    }

    #[test]
    fn test_query_is_required() {
        assert!(Cli::try_parse_from(["quarry", "search"]).is_err());
    }

    #[test]
    fn test_options_from_config() {
        let config = Config::default();
        let options = retrieval_options(&config, &search_args(&["quarry", "search", "q"]));
        assert_eq!(options.n_retrieve, 25);
        assert_eq!(options.n_final, 10);
        assert_eq!(options.max_chunk_size, DEFAULT_MAX_CHUNK_SIZE);
        // No embeddings section, so nothing to embed with
        assert!(!options.include_embeddings);
    }

    #[test]
    fn test_options_command_line_overrides() {
        let config = Config::from_toml_str(
            r#"
[retrieval]
n_final = 4

[embeddings]
base_url = "http://localhost:8100/v1"
model = "bce-embedding"
dimensions = 768
max_chunk_size = 256
"#,
        )
        .unwrap();

        let options = retrieval_options(
            &config,
            &search_args(&["quarry", "search", "q", "--n-retrieve", "7"]),
        );
        assert_eq!(options.n_retrieve, 7);
        assert_eq!(options.n_final, 4);
        assert_eq!(options.max_chunk_size, 256);
        assert!(options.include_embeddings);

        let options = retrieval_options(
            &config,
            &search_args(&["quarry", "search", "q", "--no-embeddings", "-n", "0"]),
        );
        assert!(!options.include_embeddings);
        assert_eq!(options.n_final, 1);
    }
}
