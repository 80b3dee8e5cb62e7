use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use retriever::datastore::{DataStore, QdrantDataStore};
use retriever::models::Config;
use retriever::registry::CollectionRegistry;
use retriever::server::{self, AppState};
use retriever::services::{Embedders, LocalEmbedder, OpenAiEmbedder};

#[derive(Parser)]
#[command(name = "retrieverd", about = "Multi-tenant document retrieval service")]
struct Cli {
    /// Path to the config file (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the config file
    #[arg(long)]
    listen: Option<String>,
}

/// Detect the ONNX Runtime library and set ORT_DYLIB_PATH if not already set.
/// Must run before any ort code.
fn detect_and_set_ort_path() {
    if std::env::var("ORT_DYLIB_PATH")
        .map(|p| Path::new(&p).exists())
        .unwrap_or(false)
    {
        return;
    }

    let home = std::env::var("HOME").unwrap_or_default();

    let found = if cfg!(target_os = "macos") {
        [
            format!("{home}/.local/lib/retriever/libonnxruntime.dylib"),
            "/opt/homebrew/opt/onnxruntime/lib/libonnxruntime.dylib".into(),
            "/usr/local/opt/onnxruntime/lib/libonnxruntime.dylib".into(),
        ]
        .into_iter()
        .find(|p| Path::new(p).exists())
    } else if cfg!(target_os = "linux") {
        [
            format!("{home}/.local/lib/retriever/libonnxruntime.so"),
            "/usr/lib/libonnxruntime.so".into(),
            "/usr/local/lib/libonnxruntime.so".into(),
            "/usr/lib/x86_64-linux-gnu/libonnxruntime.so".into(),
            "/usr/lib/aarch64-linux-gnu/libonnxruntime.so".into(),
        ]
        .into_iter()
        .find(|p| Path::new(p).exists())
    } else {
        None
    };

    if let Some(path) = found {
        // SAFETY: Called at program start before any threads are spawned.
        unsafe {
            std::env::set_var("ORT_DYLIB_PATH", path);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    detect_and_set_ort_path();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("retriever=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let listen_addr = cli
        .listen
        .unwrap_or_else(|| config.server.listen_addr.clone());

    let openai = OpenAiEmbedder::from_env(&config.openai)
        .context("OPENAI_API_KEY must be set")?;

    let local = if config.local_model.model_dir.is_some() {
        let embedder = LocalEmbedder::load(&config.local_model)
            .context("failed to load local embedding model")?;
        info!(dimension = embedder.dimension(), "local embedding model loaded");
        Some(embedder)
    } else {
        None
    };

    let embedders = Arc::new(Embedders::new(openai, local));
    if !embedders.has_local_model() {
        warn!("no local model configured, mpnet collections will be unavailable");
    }
    let datastore: Arc<dyn DataStore> = Arc::new(QdrantDataStore::new(&config.vector_store)?);
    let registry = Arc::new(
        CollectionRegistry::connect(&config.registry.database_url()?, &config.registry).await?,
    );

    let state = Arc::new(AppState {
        datastore,
        embedders,
        registry,
        chunk_token_size: config.chunking.chunk_token_size,
    });

    server::serve(state, &listen_addr).await
}
