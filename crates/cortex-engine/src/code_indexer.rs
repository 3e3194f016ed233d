//! The CodeIndexer (spec §4.3): folder registry, scanner-driven pipeline,
//! and code search. The watcher-driven incremental path is wired in
//! `watch.rs`; this module owns the parts a scan or a watcher event both
//! funnel through.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cortex_core::error::{CortexError, Result};
use cortex_core::{
    infer_language, Clock, CodeChunk, CortexId, FolderStatus, IndexedFile, IndexedFolder,
};
use cortex_ingestion::{
    chunk_lines, hash_bytes, is_allowed_extension, scan_folder, PathMapper, ScannedFile,
    DEFAULT_CHUNK_LINES, DEFAULT_DEBOUNCE, DEFAULT_MAX_FILE_SIZE, DEFAULT_OVERLAP_LINES,
};
use cortex_semantic::{Embedder, MetadataFilter, VectorStore};
use cortex_storage::{Collection, DocStore, Filter};
use serde_json::{json, Value};

/// The single VectorStore collection every indexed folder's chunks land in,
/// scoped per folder by the `folder_id` metadata field (spec §4.3.1).
pub const CODE_COLLECTION: &str = "code-index";

const DEFAULT_BATCH_SIZE: usize = 32;
const DEFAULT_WORKER_COUNT: usize = 4;
/// `SearchCode` oversamples by this factor to compensate for post-filter
/// drop (spec §4.3.6).
const SEARCH_OVERSAMPLE: usize = 2;

#[derive(Debug, Clone)]
pub struct CodeIndexerConfig {
    pub chunk_lines: usize,
    pub overlap_lines: usize,
    pub batch_size: usize,
    pub max_file_size: u64,
    pub worker_count: usize,
    pub debounce: Duration,
}

impl Default for CodeIndexerConfig {
    fn default() -> Self {
        Self {
            chunk_lines: DEFAULT_CHUNK_LINES,
            overlap_lines: DEFAULT_OVERLAP_LINES,
            batch_size: DEFAULT_BATCH_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            worker_count: DEFAULT_WORKER_COUNT,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub files_seen: u64,
    pub files_indexed: u64,
    pub files_failed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Chunk,
    File,
}

#[derive(Debug, Clone, Default)]
pub struct CodeSearchFilters {
    /// Languages (per `infer_language`) to restrict results to; empty means
    /// no restriction.
    pub file_types: Vec<String>,
    pub min_score: f32,
    pub mode: SearchMode,
}

impl Default for SearchMode {
    fn default() -> Self {
        Self::Chunk
    }
}

#[derive(Debug, Clone)]
pub struct CodeSearchHit {
    pub file_id: CortexId,
    pub relative_path: String,
    pub chunk_num: u32,
    pub content: String,
    pub starting_line_number: u32,
    pub ending_line_number: u32,
    pub score: f32,
    pub full_file_retrieved: bool,
}

pub struct CodeIndexer {
    folders: Collection<IndexedFolder>,
    files: Collection<IndexedFile>,
    chunks: Collection<CodeChunk>,
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    path_mapper: PathMapper,
    clock: Arc<dyn Clock>,
    config: CodeIndexerConfig,
}

impl CodeIndexer {
    pub fn new(
        store: Arc<dyn DocStore>,
        vector_store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        path_mapper: PathMapper,
        clock: Arc<dyn Clock>,
        config: CodeIndexerConfig,
    ) -> Self {
        Self {
            folders: Collection::new(store.clone(), "indexed_folders"),
            files: Collection::new(store.clone(), "indexed_files"),
            chunks: Collection::new(store, "code_chunks"),
            vector_store,
            embedder,
            path_mapper,
            clock,
            config,
        }
    }

    // -----------------------------------------------------------------
    // 4.3.1 Folder registry
    // -----------------------------------------------------------------

    pub async fn add_folder(&self, path: PathBuf, description: String) -> Result<IndexedFolder> {
        let canonical = std::fs::canonicalize(&path).map_err(|e| {
            CortexError::invalid_argument(format!("{} is not a readable directory: {e}", path.display()))
        })?;
        let path_key = canonical.to_string_lossy().to_string();

        if self
            .folders
            .find_one(&Filter::new().eq("path", path_key.clone()))
            .await?
            .is_some()
        {
            return Err(CortexError::already_exists("indexed_folder", path_key));
        }

        let folder = IndexedFolder::new(canonical, description, self.clock.now());
        self.folders.insert(&folder.id.to_string(), &folder).await?;
        Ok(folder)
    }

    /// Idempotent: removing an already-absent folder is a no-op success
    /// (spec §4.3.1).
    pub async fn remove_folder(&self, id: CortexId) -> Result<()> {
        let Some(folder) = self.folders.find_one(&Filter::new().eq("id", id.to_string())).await? else {
            return Ok(());
        };
        // CodeChunk carries `file_id`, not `folder_id` (spec §3.3) — go
        // through the folder's files to reach its chunks.
        let files = self
            .files
            .find(&Filter::new().eq("folder_id", folder.id.to_string()), None, None, None)
            .await?;
        if !files.is_empty() {
            let file_ids: Vec<Value> = files.iter().map(|f| json!(f.id.to_string())).collect();
            self.chunks.delete(&Filter::new().in_("file_id", file_ids)).await?;
        }
        self.files.delete(&Filter::new().eq("folder_id", folder.id.to_string())).await?;
        self.vector_store
            .delete(CODE_COLLECTION, &MetadataFilter::new().eq("folder_id", folder.id.to_string()))
            .await?;
        self.folders.delete(&Filter::new().eq("id", folder.id.to_string())).await?;
        Ok(())
    }

    pub async fn get_folder(&self, id: CortexId) -> Result<IndexedFolder> {
        self.folders
            .find_one(&Filter::new().eq("id", id.to_string()))
            .await?
            .ok_or_else(|| CortexError::not_found("indexed_folder", id.to_string()))
    }

    pub async fn list_folders(&self) -> Result<Vec<IndexedFolder>> {
        self.folders.find(&Filter::new(), None, None, None).await
    }

    // -----------------------------------------------------------------
    // 4.3.2 / 4.3.4 Scan + pipeline
    // -----------------------------------------------------------------

    pub async fn scan_folder(&self, id: CortexId) -> Result<ScanSummary> {
        let mut folder = self.get_folder(id).await?;
        let observed_root = self.path_mapper.resolve(&folder.path);

        let scanned = match scan_folder(&observed_root, self.config.max_file_size) {
            Ok(files) => files,
            Err(e) => {
                folder.status = FolderStatus::Error;
                folder.record_failure(e.to_string());
                self.persist_folder(&folder).await?;
                return Err(e);
            }
        };

        let existing = self
            .files
            .find(&Filter::new().eq("folder_id", folder.id.to_string()), None, None, None)
            .await?;
        let mut existing_by_path: std::collections::HashMap<String, IndexedFile> =
            existing.into_iter().map(|f| (f.relative_path.clone(), f)).collect();

        let mut summary = ScanSummary { files_seen: scanned.len() as u64, ..Default::default() };

        for scanned_file in &scanned {
            let prior = existing_by_path.remove(&scanned_file.relative_path);
            let changed = match &prior {
                Some(p) => p.content_hash != scanned_file.content_hash,
                None => true,
            };
            if !changed {
                continue; // unchanged: no work, no VectorStore writes (spec §8 invariant 4)
            }
            if let Some(prior) = &prior {
                self.delete_file_artifacts(prior.id).await?;
            }
            match self.process_file(&folder, scanned_file, prior.map(|p| p.id)).await {
                Ok(()) => summary.files_indexed += 1,
                Err(e) => {
                    summary.files_failed += 1;
                    folder.record_failure(format!("{}: {e}", scanned_file.relative_path));
                }
            }
        }

        // whatever's left in existing_by_path was in the registry but absent on disk: deleted.
        for (_, stale) in existing_by_path {
            self.delete_file_artifacts(stale.id).await?;
            self.files.delete(&Filter::new().eq("id", stale.id.to_string())).await?;
        }

        folder.last_scan_at = Some(self.clock.now());
        if folder.status == FolderStatus::Error {
            folder.status = FolderStatus::Active;
        }
        self.persist_folder(&folder).await?;
        Ok(summary)
    }

    /// Re-indexes a single path in response to a watcher event (spec
    /// §4.3.5): classifies the path against its owning folder exactly the
    /// way `scan_folder` classifies one row of a full scan, then runs the
    /// same new/changed/deleted handling. A no-op if no registered,
    /// `active` folder owns the path — e.g. a stale event after the
    /// folder was removed or paused.
    pub async fn reindex_path(&self, observed_path: &std::path::Path) -> Result<()> {
        let logical_path = self.path_mapper.reverse(observed_path);
        let folders = self.folders.find(&Filter::new(), None, None, None).await?;
        let Some(folder) = folders
            .into_iter()
            .filter(|f| f.status == FolderStatus::Active)
            .filter(|f| logical_path.starts_with(&f.path))
            .max_by_key(|f| f.path.as_os_str().len())
        else {
            return Ok(());
        };
        let relative_path = logical_path
            .strip_prefix(&folder.path)
            .unwrap_or(&logical_path)
            .to_string_lossy()
            .replace('\\', "/");

        let prior = self
            .files
            .find_one(
                &Filter::new()
                    .eq("folder_id", folder.id.to_string())
                    .eq("relative_path", relative_path.clone()),
            )
            .await?;

        if !observed_path.is_file() || !is_allowed_extension(observed_path) {
            if let Some(prior) = prior {
                self.delete_file_artifacts(prior.id).await?;
                self.files.delete(&Filter::new().eq("id", prior.id.to_string())).await?;
            }
            return Ok(());
        }

        let metadata = std::fs::metadata(observed_path)
            .map_err(|e| CortexError::internal(format!("failed to stat {}: {e}", observed_path.display())))?;
        if metadata.len() > self.config.max_file_size {
            return Ok(());
        }
        let bytes = std::fs::read(observed_path)
            .map_err(|e| CortexError::internal(format!("failed to read {}: {e}", observed_path.display())))?;
        let content_hash = hash_bytes(&bytes);

        if let Some(prior) = &prior {
            if prior.content_hash == content_hash {
                return Ok(()); // unchanged: no re-embedding (spec §8 invariant 4)
            }
        }
        let reuse_id = prior.as_ref().map(|p| p.id);
        if let Some(prior) = &prior {
            self.delete_file_artifacts(prior.id).await?;
        }

        let scanned = ScannedFile {
            relative_path,
            absolute_path: observed_path.to_path_buf(),
            content_hash,
            size: metadata.len(),
            mod_time: metadata.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH).into(),
            extension: observed_path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default()
                .to_string(),
        };
        self.process_file(&folder, &scanned, reuse_id).await
    }

    async fn delete_file_artifacts(&self, file_id: CortexId) -> Result<()> {
        self.chunks.delete(&Filter::new().eq("file_id", file_id.to_string())).await?;
        self.vector_store
            .delete(CODE_COLLECTION, &MetadataFilter::new().eq("file_id", file_id.to_string()))
            .await?;
        Ok(())
    }

    /// Runs the per-file pipeline (spec §4.3.4): persist IndexedFile, chunk,
    /// batch-embed, upsert vectors, persist CodeChunks.
    async fn process_file(
        &self,
        folder: &IndexedFolder,
        scanned: &ScannedFile,
        reuse_file_id: Option<CortexId>,
    ) -> Result<()> {
        let text = std::fs::read_to_string(&scanned.absolute_path)
            .map_err(|e| CortexError::internal(format!("failed to read {}: {e}", scanned.absolute_path.display())))?;

        let now = self.clock.now();
        let file_id = reuse_file_id.unwrap_or_else(CortexId::new);
        let language = infer_language(&scanned.extension).to_string();
        let indexed_file = IndexedFile {
            id: file_id,
            folder_id: folder.id,
            relative_path: scanned.relative_path.clone(),
            content_hash: scanned.content_hash.clone(),
            size: scanned.size,
            mod_time: scanned.mod_time,
            language: language.clone(),
            last_indexed_at: now,
        };
        self.files.insert(&file_id.to_string(), &indexed_file).await?;

        let line_chunks = chunk_lines(&text, self.config.chunk_lines, self.config.overlap_lines);
        if line_chunks.is_empty() {
            return Ok(());
        }

        for batch in line_chunks.chunks(self.config.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            self.vector_store
                .ensure_collection(CODE_COLLECTION, self.embedder.dimension())
                .await?;

            for (chunk, vector) in batch.iter().zip(vectors) {
                let chunk_id = CortexId::new();
                let metadata = std::collections::HashMap::from([
                    ("folder_id".to_string(), json!(folder.id.to_string())),
                    ("file_id".to_string(), json!(file_id.to_string())),
                    ("relative_path".to_string(), json!(scanned.relative_path)),
                    ("start_line".to_string(), json!(chunk.start_line)),
                    ("end_line".to_string(), json!(chunk.end_line)),
                    ("language".to_string(), json!(language)),
                    ("content_hash".to_string(), json!(chunk.content_hash)),
                ]);
                self.vector_store
                    .upsert(CODE_COLLECTION, &chunk_id.to_string(), vector, metadata)
                    .await?;

                let code_chunk = CodeChunk {
                    id: chunk_id,
                    file_id,
                    chunk_num: chunk.chunk_num,
                    start_line: chunk.start_line,
                    end_line: chunk.end_line,
                    text: chunk.text.clone(),
                    content_hash: chunk.content_hash.clone(),
                };
                self.chunks.insert(&chunk_id.to_string(), &code_chunk).await?;
            }
        }
        Ok(())
    }

    async fn persist_folder(&self, folder: &IndexedFolder) -> Result<()> {
        let patch = serde_json::to_value(folder)?;
        self.folders.update(&Filter::new().eq("id", folder.id.to_string()), patch).await?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // 4.3.6 Code search
    // -----------------------------------------------------------------

    pub async fn search_code(&self, query: &str, limit: usize, filters: CodeSearchFilters) -> Result<Vec<CodeSearchHit>> {
        let vector = self.embedder.embed(query).await?;
        let oversampled = (limit * SEARCH_OVERSAMPLE).max(limit);
        let raw_hits = self
            .vector_store
            .search(CODE_COLLECTION, &vector, oversampled, &MetadataFilter::new())
            .await?;

        let mut out = Vec::new();
        for hit in raw_hits {
            if hit.score < filters.min_score {
                continue;
            }
            if !filters.file_types.is_empty() {
                let language = hit.metadata.get("language").and_then(|v| v.as_str()).unwrap_or("");
                if !filters.file_types.iter().any(|t| t == language) {
                    continue;
                }
            }
            let Some(file_id_str) = hit.metadata.get("file_id").and_then(|v| v.as_str()) else {
                continue;
            };
            let Ok(file_id) = file_id_str.parse::<CortexId>() else {
                continue;
            };
            let Some(chunk) = self.chunks.find_one(&Filter::new().eq("id", hit.id.clone())).await? else {
                continue;
            };
            let Some(file) = self.files.find_one(&Filter::new().eq("id", file_id.to_string())).await? else {
                continue;
            };

            let (content, full_file_retrieved) = if filters.mode == SearchMode::File {
                match self.read_full_file(&file).await {
                    Ok(full_text) => (full_text, true),
                    Err(_) => (chunk.text.clone(), false),
                }
            } else {
                (chunk.text.clone(), false)
            };

            out.push(CodeSearchHit {
                file_id: file.id,
                relative_path: file.relative_path.clone(),
                chunk_num: chunk.chunk_num,
                content,
                starting_line_number: chunk.start_line,
                ending_line_number: chunk.end_line,
                score: hit.score,
                full_file_retrieved,
            });
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    async fn read_full_file(&self, file: &IndexedFile) -> Result<String> {
        let folder = self.folders.find(&Filter::new(), None, None, None).await?;
        let folder = folder
            .into_iter()
            .find(|f| f.id == file.folder_id)
            .ok_or_else(|| CortexError::not_found("indexed_folder", file.folder_id.to_string()))?;
        let observed_root = self.path_mapper.resolve(&folder.path);
        let absolute = observed_root.join(&file.relative_path);
        std::fs::read_to_string(&absolute)
            .map_err(|e| CortexError::internal(format!("failed to read {}: {e}", absolute.display())))
    }
}
