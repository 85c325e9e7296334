mod ingest;

use clap::{Parser, Subcommand};
use smartpick_cache::{CacheLookup, SemanticCache};
use smartpick_core::SmartpickConfig;
use smartpick_memory::{
    LexicalFilterConfig, LexicalQuery, LocalEmbedding, PersistentVectorStore, TagTable,
    TwoStageOutcome, TwoStageRetriever,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "smartpick", about = "SmartPick — scoped vector retrieval and semantic cache")]
struct Cli {
    /// Path to config file
    #[arg(short, long, env = "SMARTPICK_CONFIG", default_value = "smartpick.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed and store records from a JSON-lines file
    Ingest {
        /// Input file, one record per line
        file: PathBuf,
    },
    /// Two-stage search: tag filtering, then vector re-ranking
    Search {
        /// Free-text query
        query: String,
        /// Positive keywords (defaults to keywords extracted from the query)
        #[arg(short, long)]
        positive: Vec<String>,
        /// Negative keywords; documents tagged with any are excluded
        #[arg(short, long)]
        negative: Vec<String>,
        /// Number of documents to return (overrides config)
        #[arg(short)]
        k: Option<usize>,
    },
    /// Semantic cache operations
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Show store and cache statistics
    Stats,
    /// Rewrite the vector log without overwrite history
    Compact,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Cache a JSON payload for a question
    Store {
        text: String,
        /// Payload as JSON
        payload: String,
        /// Explicit query id
        #[arg(long)]
        id: Option<String>,
    },
    /// Look up a cached payload
    Lookup { text: String },
    /// Show a stored query record
    Show { id: String },
}

fn load_config(path: &Path) -> anyhow::Result<SmartpickConfig> {
    if path.exists() {
        Ok(SmartpickConfig::load(path)?)
    } else {
        info!(path = %path.display(), "config file not found, using defaults");
        Ok(SmartpickConfig::default())
    }
}

fn open_store(config: &SmartpickConfig) -> anyhow::Result<PersistentVectorStore> {
    Ok(PersistentVectorStore::open(
        config.resolve(&config.store.file),
        config.store.dimension,
    )?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let embedder = Arc::new(LocalEmbedding::new(config.store.dimension));

    match cli.command {
        Commands::Ingest { file } => {
            let records = ingest::read_records(&file)?;
            let count = records.len();
            let (batch, tagged) =
                ingest::stage_records(records, embedder.as_ref(), config.store.dimension).await?;

            let mut store = open_store(&config)?;
            let report = store.flush(batch)?;
            store.close()?;

            if !tagged.is_empty() {
                let tag_path = config.resolve(&config.store.tag_file);
                let mut table = if tag_path.exists() {
                    TagTable::load(&tag_path)?
                } else {
                    TagTable::new()
                };
                for doc in tagged {
                    table.upsert(doc);
                }
                table.save(&tag_path)?;
            }

            println!(
                "Ingested {count} record(s): {} appended, {} overwritten",
                report.appended, report.overwritten
            );
        }
        Commands::Search {
            query,
            positive,
            negative,
            k,
        } => {
            let store = open_store(&config)?;
            let tag_path = config.resolve(&config.store.tag_file);
            let table = if tag_path.exists() {
                TagTable::load(&tag_path)?
            } else {
                TagTable::new()
            };

            let positive = if positive.is_empty() {
                let cache = SemanticCache::from_config(&config)?;
                cache.extractor().extract(&query).into_iter().collect()
            } else {
                positive
            };
            let lexical = LexicalQuery::new(positive, negative);

            let retriever = TwoStageRetriever::new(
                &store,
                embedder,
                table,
                LexicalFilterConfig::from(&config.retrieval),
            );
            match retriever
                .retrieve(&query, &lexical, k.unwrap_or(config.retrieval.k))
                .await?
            {
                TwoStageOutcome::Ranked(docs) => {
                    for doc in &docs {
                        println!(
                            "{:>10.4}  {} p{}  {}",
                            doc.distance,
                            doc.document.metadata.index,
                            doc.document.metadata.page,
                            doc.document.page_content
                        );
                    }
                    println!("\n{} document(s)", docs.len());
                }
                TwoStageOutcome::NoEligibleDocuments => {
                    println!("No eligible documents.");
                }
            }
        }
        Commands::Cache { action } => {
            let mut cache = SemanticCache::from_config(&config)?;
            match action {
                CacheAction::Store { text, payload, id } => {
                    let payload: serde_json::Value = serde_json::from_str(&payload)?;
                    let id = cache.add_query(&text, payload, id.as_deref())?;
                    println!("{id}");
                }
                CacheAction::Lookup { text } => match cache.cache_lookup(&text)? {
                    CacheLookup::Hit(hit) => {
                        println!("hit {} (score {:.3})", hit.query_id, hit.score);
                        println!("{}", serde_json::to_string_pretty(&hit.payload)?);
                    }
                    CacheLookup::Miss => println!("miss"),
                },
                CacheAction::Show { id } => match cache.index().query_info(&id)? {
                    Some(record) => {
                        println!("{}", serde_json::to_string_pretty(record)?);
                        if let Some(payload) = cache.payloads().get(&id)? {
                            println!("{}", serde_json::to_string_pretty(payload)?);
                        }
                    }
                    None => println!("No query with id '{id}'."),
                },
            }
            cache.close();
        }
        Commands::Stats => {
            let store = open_store(&config)?;
            let cache = SemanticCache::from_config(&config)?;
            println!("Vector store: {}", store.path().display());
            println!("  rows:      {}", store.len());
            println!("  dimension: {}", store.dimension());
            println!("Semantic cache: {}", cache.index().path().display());
            println!("  queries:   {}", cache.index().len());
            println!("  keywords:  {}", cache.index().all_keywords()?.len());
            println!("  payloads:  {}", cache.payloads().len());
        }
        Commands::Compact => {
            let mut store = open_store(&config)?;
            store.compact()?;
            println!("Compacted {} row(s) in {}", store.len(), store.path().display());
        }
    }

    Ok(())
}
