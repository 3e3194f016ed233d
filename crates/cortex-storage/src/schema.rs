//! Database schema definitions for the coordination engine's collections.

/// SurrealQL schema. Tables are `SCHEMALESS` because `DocStore` documents
/// are arbitrary JSON shaped by `cortex-core::types` — the typed `Collection<T>`
/// wrapper is where schema discipline actually lives, mirroring the spec's
/// choice to keep the collaborator interface generic.
pub const SCHEMA: &str = r#"
DEFINE TABLE human_tasks SCHEMALESS;
DEFINE TABLE agent_tasks SCHEMALESS;
DEFINE TABLE knowledge_entries SCHEMALESS;
DEFINE TABLE indexed_folders SCHEMALESS;
DEFINE TABLE indexed_files SCHEMALESS;
DEFINE TABLE code_chunks SCHEMALESS;

DEFINE INDEX agent_tasks_human_task ON agent_tasks FIELDS human_task_id;
DEFINE INDEX agent_tasks_agent_name ON agent_tasks FIELDS agent_name;
DEFINE INDEX knowledge_entries_collection ON knowledge_entries FIELDS collection;
DEFINE INDEX indexed_folders_path ON indexed_folders FIELDS path UNIQUE;
DEFINE INDEX indexed_files_folder ON indexed_files FIELDS folder_id;
DEFINE INDEX code_chunks_file ON code_chunks FIELDS file_id;
"#;

/// Initialize the database schema
pub async fn init_schema(db: &surrealdb::Surreal<impl surrealdb::Connection>) -> cortex_core::error::Result<()> {
    tracing::info!("initializing docstore schema");

    db.query(SCHEMA)
        .await
        .map_err(|e| cortex_core::error::CortexError::unavailable(format!("schema init failed: {e}")))?;

    Ok(())
}
