use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use pagewise_core::config::{Config, StorageMode};
use pagewise_core::detection::{self, probe_ollama};
use pagewise_core::loader::{collect_sources, load_documents, PDF_EXTENSIONS};
use pagewise_core::provider::OllamaProvider;
use pagewise_core::rag::RagEngine;
use pagewise_core::web::WebScraper;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

#[derive(Parser)]
#[command(name = "pagewise")]
#[command(about = "Ask questions about your PDFs with a local model", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./config.yaml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Index every PDF of a directory")]
    Ingest {
        #[arg(long, default_value = "docs", help = "Directory containing the PDFs")]
        docs_dir: PathBuf,

        #[arg(long, help = "Index directory (overrides storage.path)")]
        index_dir: Option<String>,

        #[arg(long, help = "Ollama embedding model")]
        embed_model: Option<String>,

        #[arg(long, help = "Chunk size in characters")]
        chunk_size: Option<usize>,

        #[arg(long, help = "Characters shared by consecutive chunks")]
        chunk_overlap: Option<usize>,

        #[arg(long, help = "Replace the index contents with these documents")]
        reset: bool,
    },

    #[command(about = "Answer a question from the indexed documents")]
    Query {
        question: String,

        #[arg(long, help = "Index directory (overrides storage.path)")]
        index_dir: Option<String>,

        #[arg(long, help = "Ollama embedding model")]
        embed_model: Option<String>,

        #[arg(long, help = "Ollama chat model")]
        chat_model: Option<String>,

        #[arg(long, help = "Number of chunks to retrieve")]
        top_k: Option<usize>,
    },

    #[command(about = "Fetch a web page and save its HTML and text")]
    Scrape {
        url: String,

        #[arg(long, default_value = "outputs", help = "Output directory")]
        out_dir: PathBuf,

        #[arg(long = "allowed-domain", help = "Domain allowlist (repeatable)")]
        allowed_domains: Vec<String>,

        #[arg(long, help = "Also ingest the page text into the index")]
        ingest: bool,
    },

    #[command(about = "Configuration commands")]
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    #[command(about = "List models installed in Ollama")]
    Models {
        #[arg(short, long, help = "Ollama URL (defaults to llm.base_url)")]
        url: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    #[command(about = "Show the effective configuration")]
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest {
            docs_dir,
            index_dir,
            embed_model,
            chunk_size,
            chunk_overlap,
            reset,
        } => {
            let mut config = config;
            if let Some(path) = index_dir {
                config.storage = config.storage.with_path(path);
            }
            if let Some(model) = embed_model {
                config.rag.embedding_model = model;
            }
            if let Some(size) = chunk_size {
                config.rag.chunk_size = size;
            }
            if let Some(overlap) = chunk_overlap {
                config.rag.chunk_overlap = overlap;
            }
            ingest(config, &docs_dir, reset).await
        }
        Commands::Query {
            question,
            index_dir,
            embed_model,
            chat_model,
            top_k,
        } => {
            let mut config = config;
            if let Some(path) = index_dir {
                config.storage = config.storage.with_path(path);
            }
            if let Some(model) = embed_model {
                config.rag.embedding_model = model;
            }
            if let Some(model) = chat_model {
                config.llm.model = model;
            }
            if let Some(top_k) = top_k {
                config.rag.top_k = top_k;
            }
            query(config, &question).await
        }
        Commands::Scrape {
            url,
            out_dir,
            allowed_domains,
            ingest,
        } => {
            let mut config = config;
            if !allowed_domains.is_empty() {
                config.web.allowed_domains = allowed_domains;
            }
            scrape(config, &url, &out_dir, ingest).await
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => show_config(&config),
        },
        Commands::Models { url } => {
            let url = url.unwrap_or_else(|| config.llm.base_url.clone());
            list_models(&config, &url).await
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "pagewise={level},pagewise_core={level},lance=warn"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Config::load_or_default().context("Failed to load config.yaml"),
    }
}

async fn build_engine(config: &Config) -> Result<RagEngine> {
    config.validate().context("Invalid configuration")?;

    let provider = OllamaProvider::new(&config.llm).context("Failed to create Ollama client")?;
    RagEngine::new(config, Arc::new(provider))
        .await
        .context("Failed to open the index")
}

async fn ingest(config: Config, docs_dir: &Path, reset: bool) -> Result<()> {
    let sources = collect_sources(docs_dir, PDF_EXTENSIONS)
        .await
        .with_context(|| format!("Failed to read {}", docs_dir.display()))?;
    if sources.is_empty() {
        anyhow::bail!("No PDF files found in {}", docs_dir.display());
    }

    if config.storage.mode == StorageMode::Embedded {
        tokio::fs::create_dir_all(&config.storage.path)
            .await
            .with_context(|| format!("Failed to create {}", config.storage.path))?;
    }

    let documents = load_documents(&sources).await.context("Failed to load documents")?;
    println!(
        "{} Loaded {} pages from {} files",
        "→".blue(),
        documents.len(),
        sources.len()
    );

    let engine = build_engine(&config).await?;
    let chunks = if reset {
        engine.replace(&documents).await.context("Re-indexing failed")?
    } else {
        engine.ingest(&documents).await.context("Ingestion failed")?
    };
    println!(
        "{} Indexed {} chunks into {}",
        "OK".green().bold(),
        chunks,
        config.storage.path
    );

    Ok(())
}

async fn query(config: Config, question: &str) -> Result<()> {
    let engine = build_engine(&config).await?;
    if engine.count().await? == 0 {
        warn!("The index is empty, run `pagewise ingest` first");
    }

    let answer = engine
        .query(question, config.rag.top_k)
        .await
        .context("Query failed")?;
    println!("{}", answer);

    Ok(())
}

async fn scrape(config: Config, url: &str, out_dir: &Path, ingest: bool) -> Result<()> {
    let scraper = WebScraper::new(&config.web).context("Failed to create HTTP client")?;
    let result = scraper.scrape(url).await.with_context(|| format!("Failed to fetch {}", url))?;

    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    tokio::fs::write(out_dir.join("page.html"), &result.html)
        .await
        .context("Failed to write page.html")?;
    tokio::fs::write(out_dir.join("page.txt"), &result.text)
        .await
        .context("Failed to write page.txt")?;
    println!(
        "{} Saved HTML/TEXT to {}",
        "OK".green().bold(),
        out_dir.display()
    );

    if ingest {
        let engine = build_engine(&config).await?;
        let chunks = engine
            .ingest(&[result.into_document()])
            .await
            .context("Ingestion failed")?;
        println!(
            "{} Indexed {} chunks into {}",
            "OK".green().bold(),
            chunks,
            config.storage.path
        );
    }

    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    println!("{}", "Current Configuration:".bold().green());
    println!();
    println!("{}", "LLM:".bold());
    println!("  Model:           {}", config.llm.model.cyan());
    println!("  Base URL:        {}", config.llm.base_url);
    println!("  Temperature:     {}", config.llm.temperature);
    println!("  Timeout:         {}s", config.llm.timeout_secs);
    println!();
    println!("{}", "RAG:".bold());
    println!("  Embedding Model: {}", config.rag.embedding_model.cyan());
    println!("  Chunk Size:      {}", config.rag.chunk_size);
    println!("  Chunk Overlap:   {}", config.rag.chunk_overlap);
    println!("  Top K:           {}", config.rag.top_k);
    println!("  Embed Batch:     {}", config.rag.embed_batch_size);
    println!();
    println!("{}", "Storage:".bold());
    println!("  Mode:            {:?}", config.storage.mode);
    println!("  Path:            {}", config.storage.path);
    println!("  Table:           {}", config.storage.table);
    println!();
    println!("{}", "Web:".bold());
    if config.web.allowed_domains.is_empty() {
        println!("  Allowed Domains: {}", "any".yellow());
    } else {
        println!("  Allowed Domains: {}", config.web.allowed_domains.join(", "));
    }
    println!("  Timeout:         {}s", config.web.timeout_secs);

    if let Ok(yaml) = serde_yaml::to_string(config) {
        println!();
        println!("{}", "As YAML:".bold());
        println!("{}", yaml);
    }

    Ok(())
}

async fn list_models(config: &Config, base_url: &str) -> Result<()> {
    println!("{} Fetching models from {}...", "→".blue(), base_url);
    println!();

    let info = match probe_ollama(base_url).await {
        Ok(info) => info,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            eprintln!("{}", detection::startup_help());
            return Err(e).context("Ollama is not available");
        }
    };

    if info.models.is_empty() {
        println!("{}", "No models found. Pull a model with 'ollama pull <model>'".yellow());
    } else {
        println!("{}", "Available models:".bold().green());
        println!();
        for model in &info.models {
            println!("  {} {}", "•".cyan(), model.bold());
        }
    }

    println!();
    for (role, model) in [
        ("chat", &config.llm.model),
        ("embedding", &config.rag.embedding_model),
    ] {
        if info.has_model(model) {
            println!("{} {} model {} is installed", "✓".green().bold(), role, model.cyan());
        } else {
            println!(
                "{} {} model {} is missing, run {}",
                "!".yellow().bold(),
                role,
                model.cyan(),
                format!("ollama pull {}", model).bold()
            );
        }
    }

    Ok(())
}
