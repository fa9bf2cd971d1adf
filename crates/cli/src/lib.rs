//! # Docqa CLI
//!
//! The `docqa` binary: an HTTP server plus one-shot commands over the same
//! [`RagService`]. One-shot commands print JSON to stdout; logs go to stderr.

use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use docqa_service::{EmbeddingMode, RagService, ServiceConfig};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod http_api;
pub mod server_security;

use http_api::HttpState;
use server_security::{ServeSecurity, AUTH_TOKEN_ENV};

const DEFAULT_CONFIG_FILE: &str = "docqa.toml";

fn print_stdout(text: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    print_stdout(&serde_json::to_string_pretty(value)?)
}

#[derive(Parser)]
#[command(name = "docqa")]
#[command(about = "Ask questions about your documents", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML config file (default: ./docqa.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the index and kept uploads (overrides DOCQA_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override the embedding backend (overrides DOCQA_EMBEDDING_MODE)
    #[arg(long, global = true, value_enum)]
    embed_mode: Option<EmbedMode>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve(ServeArgs),
    /// Index one or more .pdf / .txt files
    Ingest(IngestArgs),
    /// Answer a question from the indexed documents
    Ask(AskArgs),
    /// List indexed files
    Files,
    /// Remove one indexed file
    Delete(DeleteArgs),
    /// Remove every indexed file
    Clear,
    /// Show store size and model information
    Status,
}

#[derive(Args)]
struct ServeArgs {
    /// Bind address, e.g. 127.0.0.1:8000 (default from config)
    #[arg(long)]
    bind: Option<String>,

    /// Allow binding to non-loopback addresses (requires an auth token)
    #[arg(long)]
    public: bool,

    /// Bearer token required on every request (or DOCQA_AUTH_TOKEN)
    #[arg(long)]
    auth_token: Option<String>,
}

#[derive(Args)]
struct IngestArgs {
    /// Files to index
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[derive(Args)]
struct AskArgs {
    question: String,
}

#[derive(Args)]
struct DeleteArgs {
    filename: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedMode {
    Stub,
    Local,
    #[value(name = "openai")]
    OpenAi,
}

impl From<EmbedMode> for EmbeddingMode {
    fn from(mode: EmbedMode) -> Self {
        match mode {
            EmbedMode::Stub => Self::Stub,
            EmbedMode::Local => Self::Local,
            EmbedMode::OpenAi => Self::OpenAi,
        }
    }
}

pub async fn main_entry() -> Result<()> {
    let mut cli = Cli::parse();

    // one-shot commands keep stderr quiet unless asked otherwise
    if !matches!(cli.command, Commands::Serve(_)) && !cli.verbose {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    // fastembed's ONNX runtime is noisy below warn
    if !cli.verbose {
        builder.filter_module("ort", log::LevelFilter::Warn);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Serve(args) => serve(args, config).await?,
        Commands::Ingest(args) => run_ingest(args, config).await?,
        Commands::Ask(args) => {
            let service = open_service(config).await?;
            print_json(&service.ask(&args.question).await?)?;
        }
        Commands::Files => print_json(&open_service(config).await?.files().await)?,
        Commands::Delete(args) => {
            let service = open_service(config).await?;
            print_json(&service.delete_file(&args.filename).await?)?;
        }
        Commands::Clear => print_json(&open_service(config).await?.clear().await?)?,
        Commands::Status => print_json(&open_service(config).await?.status().await)?,
    }

    Ok(())
}

/// File, then `DOCQA_*` environment, then command-line flags.
fn load_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            ServiceConfig::load(path)?
        }
        None => ServiceConfig::load(Path::new(DEFAULT_CONFIG_FILE))?,
    };
    config
        .apply_process_env()
        .context("Invalid DOCQA_* environment override")?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(mode) = cli.embed_mode {
        config.embedding.mode = mode.into();
    }
    Ok(config)
}

async fn open_service(config: ServiceConfig) -> Result<RagService> {
    RagService::from_config(config)
        .await
        .context("Failed to initialise the document service")
}

async fn run_ingest(args: IngestArgs, config: ServiceConfig) -> Result<()> {
    let service = open_service(config).await?;
    let mut reports = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("Not a file path: {}", path.display()))?;
        let report = service
            .ingest(filename, &bytes)
            .await
            .with_context(|| format!("Failed to ingest {}", path.display()))?;
        reports.push(report);
    }
    print_json(&reports)
}

async fn serve(args: ServeArgs, config: ServiceConfig) -> Result<()> {
    let bind = args.bind.unwrap_or_else(|| config.http.bind.clone());
    let security = ServeSecurity::from_env(args.public, args.auth_token.as_deref())?;
    let addrs = security.listen_addrs(&bind).await?;

    let service = Arc::new(open_service(config).await?);
    let auth_enabled = security.token.is_some();
    let app = http_api::router(HttpState {
        service,
        auth_token: security.token,
    });

    let listener = tokio::net::TcpListener::bind(addrs.as_slice())
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    let local_addr = listener.local_addr()?;
    let base_url = format!("http://{local_addr}");

    print_stdout(&format!("Serving docqa API: {base_url}"))?;
    if auth_enabled {
        print_stdout(&format!(
            "Auth enabled: add header 'Authorization: Bearer ${AUTH_TOKEN_ENV}'"
        ))?;
    }
    if security.public {
        let addrs = addrs
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        print_stdout(&format!(
            "Public bind enabled (--public). Resolved addresses: {addrs}"
        ))?;
    }
    print_stdout(&format!("Try: curl {base_url}/status"))?;
    print_stdout(&format!(
        "Try: curl -X POST {base_url}/upload -F 'file=@notes.txt'"
    ))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::warn!("Failed to listen for Ctrl-C: {err}");
        std::future::pending::<()>().await;
    }
}
