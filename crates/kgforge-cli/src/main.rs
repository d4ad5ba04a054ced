//! KGForge CLI
//!
//! - `build`: extract text documents and schemas into a stored graph
//! - `validate`, `stats`, `list`: inspect stored graphs
//! - `export`: write a stored graph as JSON or node-link JSON
//! - `embed`, `recommend`: train Node2Vec/TransE vectors and query them

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use kgforge_builder::{KnowledgeGraphBuilder, Severity, ValidationReport};
use kgforge_embed::{EmbeddingStore, GraphEmbedding, Node2Vec, TransE};
use kgforge_model::analysis::{graph_metrics, type_distribution};
use kgforge_model::KnowledgeGraph;
use kgforge_storage::{ExportFormat, GraphStorage};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod inputs;

use config::{ForgeConfig, StorageBackend};

#[derive(Parser)]
#[command(name = "kgforge")]
#[command(author, version, about = "KGForge: knowledge graphs from text and database schemas")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Store directory (overrides the configuration)
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    /// Storage backend (overrides the configuration)
    #[arg(long, value_enum, global = true)]
    backend: Option<StorageBackend>,
    /// Debug logging unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a graph from text files and schemas, validate it and store it.
    Build {
        #[arg(long)]
        name: String,
        /// Text files or directories of `.txt`/`.md` files
        #[arg(long = "text")]
        texts: Vec<PathBuf>,
        /// Schema files: `.sql` DDL or the JSON schema description
        #[arg(long = "schema")]
        schemas: Vec<PathBuf>,
        /// Database name for DDL schemas (defaults to the file stem)
        #[arg(long)]
        database_name: Option<String>,
        /// Skip relation inference
        #[arg(long)]
        no_infer: bool,
    },
    /// Validate a stored graph.
    Validate {
        #[arg(long)]
        graph: String,
    },
    /// List stored graphs, most recently updated first.
    List,
    /// Entity and relation statistics of a stored graph.
    Stats {
        #[arg(long)]
        graph: String,
    },
    /// Export a stored graph.
    Export {
        #[arg(long)]
        graph: String,
        #[arg(long, default_value = "json")]
        format: ExportFormat,
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Train embeddings for a stored graph and save them.
    Embed {
        #[arg(long)]
        graph: String,
        #[arg(long, value_enum, default_value = "transe")]
        model: EmbeddingModel,
        #[arg(short, long)]
        out: PathBuf,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        dimension: Option<usize>,
        #[arg(long)]
        epochs: Option<usize>,
    },
    /// Entities most similar to one entity, from a saved embeddings file.
    Recommend {
        #[arg(long)]
        embeddings: PathBuf,
        #[arg(long)]
        entity: String,
        #[arg(short, long, default_value_t = 10)]
        k: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbeddingModel {
    Node2vec,
    Transe,
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = ForgeConfig::load_or_default(cli.config.as_deref())?;
    if let Some(store) = cli.store {
        config.store = store;
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    match cli.command {
        Commands::Build {
            name,
            texts,
            schemas,
            database_name,
            no_infer,
        } => cmd_build(&config, &name, &texts, &schemas, database_name.as_deref(), no_infer),
        Commands::Validate { graph } => cmd_validate(&config, &graph),
        Commands::List => cmd_list(&config),
        Commands::Stats { graph } => cmd_stats(&config, &graph),
        Commands::Export { graph, format, out } => cmd_export(&config, &graph, format, out.as_deref()),
        Commands::Embed {
            graph,
            model,
            out,
            seed,
            dimension,
            epochs,
        } => cmd_embed(&config, &graph, model, &out, seed, dimension, epochs),
        Commands::Recommend { embeddings, entity, k } => cmd_recommend(&embeddings, &entity, k),
    }
}

// ============================================================================
// Commands
// ============================================================================

fn load_stored(storage: &dyn GraphStorage, graph_id: &str) -> Result<KnowledgeGraph> {
    storage
        .load_graph(graph_id)?
        .ok_or_else(|| anyhow!("graph `{graph_id}` not found in {} store", storage.backend_name()))
}

fn print_report(report: &ValidationReport) {
    let verdict = if report.valid {
        "valid".green().bold()
    } else {
        "invalid".red().bold()
    };
    println!(
        "{} {} entities, {} relations, density {:.3}, {} components",
        verdict,
        report.statistics.entity_count,
        report.statistics.relation_count,
        report.statistics.density,
        report.statistics.component_count
    );
    for issue in &report.issues {
        let tag = match issue.severity() {
            Severity::High => "high".red().bold(),
            Severity::Medium => "medium".yellow().bold(),
            Severity::Low => "low".normal(),
        };
        println!("  {} [{}] {}", tag, issue.code(), issue.message());
    }
    for recommendation in &report.recommendations {
        println!("  {} {}", "→".yellow(), recommendation);
    }
}

fn cmd_build(
    config: &ForgeConfig,
    name: &str,
    texts: &[PathBuf],
    schemas: &[PathBuf],
    database_name: Option<&str>,
    no_infer: bool,
) -> Result<()> {
    let mut sources = inputs::text_sources(texts);
    for path in schemas {
        sources.push(inputs::schema_source(path, database_name)?);
    }
    if sources.is_empty() {
        bail!("nothing to build: pass --text and/or --schema");
    }
    println!("{} {} from {} sources", "Building".green().bold(), name.bold(), sources.len());

    let mut builder_config = config.builder.clone();
    if no_infer {
        builder_config.infer_relations = false;
    }
    let builder = KnowledgeGraphBuilder::new(builder_config)?;
    let graph = builder.build_graph(name, &sources)?;
    print_report(&builder.validate_graph(&graph));

    let storage = config.open_storage()?;
    storage.save_graph(&graph)?;
    println!("{} {}", "stored".green().bold(), graph.id().bold());
    Ok(())
}

fn cmd_validate(config: &ForgeConfig, graph_id: &str) -> Result<()> {
    let storage = config.open_storage()?;
    let graph = load_stored(storage.as_ref(), graph_id)?;
    print_report(&kgforge_builder::validate_graph(&graph));
    Ok(())
}

fn cmd_list(config: &ForgeConfig) -> Result<()> {
    let storage = config.open_storage()?;
    let graphs = storage.list_graphs()?;
    if graphs.is_empty() {
        println!("{} no graphs in {}", "info:".yellow().bold(), config.store.display());
        return Ok(());
    }
    for summary in graphs {
        println!(
            "{}  {}  {} entities  {} relations  updated {}",
            summary.id.bold(),
            summary.name,
            summary.entity_count,
            summary.relation_count,
            summary.updated_at.to_rfc3339()
        );
    }
    Ok(())
}

fn cmd_stats(config: &ForgeConfig, graph_id: &str) -> Result<()> {
    let storage = config.open_storage()?;
    let graph = load_stored(storage.as_ref(), graph_id)?;
    let stats = graph.get_statistics();
    println!(
        "{} {} ({} entities, {} relations)",
        "Graph".green().bold(),
        stats.graph_name.bold(),
        stats.total_entities,
        stats.total_relations
    );
    for (entity_type, count) in type_distribution(&graph).into_iter().filter(|(_, n)| *n > 0) {
        println!("  {:<14} {}", entity_type.as_str(), count);
    }
    for (relation_type, count) in &stats.relation_types {
        println!("  {:<14} {}", relation_type, count);
    }
    if let Some(metrics) = graph_metrics(&graph) {
        println!(
            "  density {:.3}, avg degree {:.2}, {} components (largest {})",
            metrics.density, metrics.avg_degree, metrics.connected_components, metrics.largest_component_size
        );
        for central in &metrics.top_central {
            println!("  {} {} (degree {})", "→".yellow(), central.entity_name, central.degree);
        }
    }
    Ok(())
}

fn cmd_export(config: &ForgeConfig, graph_id: &str, format: ExportFormat, out: Option<&Path>) -> Result<()> {
    let storage = config.open_storage()?;
    let value = storage.export_graph(graph_id, format)?;
    let text = serde_json::to_string_pretty(&value)?;
    match out {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("{} {}", "wrote".green().bold(), path.display().to_string().bold());
        }
        None => println!("{text}"),
    }
    Ok(())
}

fn cmd_embed(
    config: &ForgeConfig,
    graph_id: &str,
    model: EmbeddingModel,
    out: &Path,
    seed: Option<u64>,
    dimension: Option<usize>,
    epochs: Option<usize>,
) -> Result<()> {
    let storage = config.open_storage()?;
    let graph = load_stored(storage.as_ref(), graph_id)?;

    let mut embedding: Box<dyn GraphEmbedding> = match model {
        EmbeddingModel::Node2vec => {
            let mut c = config.node2vec.clone();
            c.seed = seed.unwrap_or(c.seed);
            c.dimension = dimension.unwrap_or(c.dimension);
            c.epochs = epochs.unwrap_or(c.epochs);
            Box::new(Node2Vec::new(c)?)
        }
        EmbeddingModel::Transe => {
            let mut c = config.transe.clone();
            c.seed = seed.unwrap_or(c.seed);
            c.dimension = dimension.unwrap_or(c.dimension);
            c.epochs = epochs.unwrap_or(c.epochs);
            Box::new(TransE::new(c)?)
        }
    };
    let summary = embedding.train(&graph)?;
    println!(
        "{} {} on {} entities, {} epochs, final loss {:.4}",
        "trained".green().bold(),
        embedding.model_name(),
        summary.entity_count,
        summary.epochs,
        summary.final_loss
    );
    embedding.store().save(out)?;
    eprintln!("{} {}", "wrote".green().bold(), out.display().to_string().bold());
    Ok(())
}

fn cmd_recommend(embeddings: &Path, entity_id: &str, k: usize) -> Result<()> {
    let store = EmbeddingStore::load(embeddings)?;
    if store.entity(entity_id).is_none() {
        bail!("entity `{entity_id}` has no {} embedding", store.model());
    }
    for (id, score) in store.recommend(entity_id, k) {
        println!("{:.4}  {}", score, id);
    }
    Ok(())
}
