//! The composition root (spec §9 "collapse into a single service"): builds
//! every collaborator from a `GlobalConfig` and wires the four engines and
//! the `OperationDispatcher` around them. Nothing downstream of here holds
//! a process-wide singleton — everything is an explicit `Arc` passed in.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cortex_core::{Clock, GlobalConfig, SystemClock};
use cortex_engine::{CodeIndexer, CodeIndexerConfig, CodeWatchPipeline, KnowledgeEngine, OperationDispatcher, TaskEngine, WorkflowMetrics};
use cortex_ingestion::PathMapper;
use cortex_semantic::{DeterministicEmbedder, EmbeddingMode, EmbeddingSettings, Embedder, InMemoryVectorStore, QdrantStore, RemoteEmbedder, VectorStore};
use cortex_storage::{ConnectionConfig, ConnectionMode, ConnectionPool, DocStore, InMemoryStore, SurrealStore};
use tracing::{info, warn};

/// Everything a running instance needs to answer RPC/REST calls and to run
/// the code-index watcher. Holds the dispatcher plus the pieces the watch
/// pipeline and auto-registration need directly.
pub struct CortexApp {
    pub dispatcher: Arc<OperationDispatcher>,
    pub code: Arc<CodeIndexer>,
    pub config: GlobalConfig,
    watch_pipeline: std::sync::Mutex<Option<Arc<CodeWatchPipeline>>>,
}

impl CortexApp {
    /// Builds every collaborator from `config` and wires the engines
    /// together. Returns `Err` (exit code 2, spec §6.4) if the docstore is
    /// unreachable.
    pub async fn build(config: GlobalConfig) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = build_docstore(&config).await?;
        let embedder = build_embedder(&config);
        let vector_store = build_vector_store(&config)?;
        let path_mapper = match config.get("code_index.path_mappings") {
            Some(spec) if !spec.is_empty() => PathMapper::parse(spec)?,
            _ => PathMapper::new(),
        };

        let tasks = Arc::new(TaskEngine::new(store.clone(), clock.clone()));
        let knowledge = Arc::new(KnowledgeEngine::new(
            store.clone(),
            Some(embedder.clone()),
            vector_store.clone(),
            clock.clone(),
        ));
        let code = Arc::new(CodeIndexer::new(
            store.clone(),
            vector_store.unwrap_or_else(|| InMemoryVectorStore::new() as Arc<dyn VectorStore>),
            embedder,
            path_mapper,
            clock.clone(),
            CodeIndexerConfig::default(),
        ));
        let metrics = Arc::new(WorkflowMetrics::new(store, clock));

        let dispatcher = Arc::new(OperationDispatcher::new(tasks, knowledge, code.clone(), metrics));

        let app = Self {
            dispatcher,
            code,
            config,
            watch_pipeline: std::sync::Mutex::new(None),
        };
        app.auto_register_folders().await?;
        Ok(app)
    }

    /// `code_index.folders` / `code_index.auto_scan` (spec §6.3): folders
    /// registered at startup, optionally scanned immediately.
    async fn auto_register_folders(&self) -> Result<()> {
        let folders = self.config.get_csv("code_index.folders");
        let auto_scan = self.config.get_bool("code_index.auto_scan", false);
        for path in folders {
            let folder = match self.code.add_folder(PathBuf::from(&path), String::new()).await {
                Ok(folder) => folder,
                Err(e) if e.kind() == "AlreadyExists" => {
                    info!(path = %path, "folder already registered, skipping auto-add");
                    continue;
                }
                Err(e) => return Err(anyhow::anyhow!(e).context(format!("auto-registering {path}"))),
            };
            if auto_scan {
                if let Err(e) = self.code.scan_folder(folder.id).await {
                    warn!(path = %path, error = %e, "initial auto-scan failed");
                }
            }
        }
        Ok(())
    }

    /// Starts the filesystem watcher over every currently-registered
    /// folder (spec §4.3.5). Idempotent: calling twice replaces the prior
    /// pipeline with a fresh one watching the current folder set.
    pub async fn start_watching(&self) -> Result<()> {
        let (pipeline, _handle) = CodeWatchPipeline::new(self.code.clone())?;
        for folder in self.code.list_folders().await? {
            if folder.status == cortex_core::FolderStatus::Active {
                pipeline.watch(&folder.path).await?;
            }
        }
        *self.watch_pipeline.lock().unwrap() = Some(pipeline);
        Ok(())
    }

    pub fn stop_watching(&self) {
        if let Some(pipeline) = self.watch_pipeline.lock().unwrap().take() {
            pipeline.stop();
        }
    }
}

/// Marker wrapped around any docstore-startup failure so `main` can map it
/// to exit code 2 (spec §6.4) without string-matching error messages.
#[derive(Debug, thiserror::Error)]
#[error("docstore unreachable at startup: {0}")]
pub struct DocstoreUnreachable(String);

async fn build_docstore(config: &GlobalConfig) -> Result<Arc<dyn DocStore>> {
    let uri = config.get("docstore.uri").unwrap_or("mem://");
    if uri == "mem://" {
        return Ok(InMemoryStore::new());
    }
    let database = config.get("docstore.database").unwrap_or("cortex").to_string();
    let mode = if let Some(path) = uri.strip_prefix("rocksdb://") {
        ConnectionMode::RocksDb { path: PathBuf::from(path) }
    } else {
        ConnectionMode::Remote { endpoint: uri.to_string() }
    };
    let conn_config = ConnectionConfig { mode, database, ..ConnectionConfig::memory() };
    let pool = Arc::new(ConnectionPool::new(conn_config));
    pool.initialize()
        .await
        .map_err(|e| DocstoreUnreachable(e.to_string()))?;
    let store = SurrealStore::with_schema(pool)
        .await
        .map_err(|e| DocstoreUnreachable(e.to_string()))?;
    Ok(Arc::new(store))
}

fn build_embedder(config: &GlobalConfig) -> Arc<dyn Embedder> {
    let settings = EmbeddingSettings::from_config(config);
    match settings.mode {
        EmbeddingMode::Remote => {
            if let Some(url) = settings.url {
                Arc::new(RemoteEmbedder::new(url, settings.api_key, settings.dimension, settings.batch_size))
            } else {
                warn!("embedding.mode=remote but no embedding.url configured; falling back to local");
                Arc::new(DeterministicEmbedder::new(settings.dimension))
            }
        }
        EmbeddingMode::Local => Arc::new(DeterministicEmbedder::new(settings.dimension)),
    }
}

fn build_vector_store(config: &GlobalConfig) -> Result<Option<Arc<dyn VectorStore>>> {
    match config.get("vectorstore.url") {
        Some(url) => {
            let store = QdrantStore::connect(url, config.get("vectorstore.apiKey"))?;
            Ok(Some(store))
        }
        None => Ok(None),
    }
}
