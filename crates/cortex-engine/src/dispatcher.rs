//! The OperationDispatcher (spec §4.5): the single entry point an RPC or
//! REST adapter calls through. Every operation is a name plus a JSON
//! argument blob; the dispatcher validates and type-checks the blob before
//! any engine is touched, then shapes the engine's response as JSON.
//!
//! Argument mistakes never reach an engine: every extraction helper below
//! returns `InvalidArgument` directly.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use cortex_core::error::CortexError;
use cortex_core::{CortexId, TaskStatus, TodoStatus};
use serde::Serialize;
use serde_json::{json, Value};

use crate::code_indexer::{CodeIndexer, CodeSearchFilters, SearchMode};
use crate::knowledge_engine::KnowledgeEngine;
use crate::metrics::WorkflowMetrics;
use crate::task_engine::{ListAgentTasksQuery, NewAgentTask, TaskEngine};

/// Uniform error envelope for every operation (spec §4.5, §7).
#[derive(Debug, Clone, Serialize)]
pub struct DispatchError {
    pub kind: String,
    pub message: String,
    pub retriable: bool,
}

impl From<CortexError> for DispatchError {
    fn from(e: CortexError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
            retriable: e.retriable(),
        }
    }
}

pub type DispatchResult = std::result::Result<Value, DispatchError>;

/// Routes named operations (spec §6.2) to the four engines. Holds no state
/// of its own beyond the engines it was built with.
pub struct OperationDispatcher {
    tasks: Arc<TaskEngine>,
    knowledge: Arc<KnowledgeEngine>,
    code: Arc<CodeIndexer>,
    metrics: Arc<WorkflowMetrics>,
}

impl OperationDispatcher {
    pub fn new(
        tasks: Arc<TaskEngine>,
        knowledge: Arc<KnowledgeEngine>,
        code: Arc<CodeIndexer>,
        metrics: Arc<WorkflowMetrics>,
    ) -> Self {
        Self { tasks, knowledge, code, metrics }
    }

    pub async fn execute(&self, operation: &str, args: Value) -> DispatchResult {
        match operation {
            // Tasks
            "create_human_task" => self.create_human_task(args).await,
            "create_agent_task" => self.create_agent_task(args).await,
            "get_agent_task" => self.get_agent_task(args).await,
            "get_task_history" => self.get_task_history(args).await,
            "list_human_tasks" => self.list_human_tasks().await,
            "list_agent_tasks" => self.list_agent_tasks(args).await,
            "update_task_status" => self.update_task_status(args).await,
            "update_todo_status" => self.update_todo_status(args).await,
            "clear_task_board" => self.clear_task_board(args).await,
            "add_task_prompt_notes" | "update_task_prompt_notes" => {
                self.set_task_prompt_notes(args, true).await
            }
            "clear_task_prompt_notes" => self.set_task_prompt_notes(args, false).await,
            "add_todo_prompt_notes" | "update_todo_prompt_notes" => {
                self.set_todo_prompt_notes(args, true).await
            }
            "clear_todo_prompt_notes" => self.set_todo_prompt_notes(args, false).await,

            // Knowledge
            "upsert_knowledge" => self.upsert_knowledge(args).await,
            "delete_knowledge_entry" => self.delete_knowledge_entry(args).await,
            "query_knowledge" => self.query_knowledge(args).await,
            "get_popular_collections" => self.get_popular_collections(args).await,
            "list_collections" => self.list_collections().await,
            "recent_learnings" => self.recent_learnings().await,

            // Code
            "code_index_add_folder" => self.code_index_add_folder(args).await,
            "code_index_remove_folder" => self.code_index_remove_folder(args).await,
            "code_index_scan" => self.code_index_scan(args).await,
            "code_index_status" => self.code_index_status(args).await,
            "code_search" => self.code_search(args).await,

            // Metrics
            "squad_velocity" => self.squad_velocity().await,
            "context_efficiency" => self.context_efficiency().await,
            "active_agents" => self.active_agents().await,
            "task_queue" => self.task_queue().await,
            "task_dependencies" => self.task_dependencies().await,

            other => Err(CortexError::invalid_argument(format!("unknown operation: {other}")).into()),
        }
    }

    // -----------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------

    async fn create_human_task(&self, args: Value) -> DispatchResult {
        let prompt = require_str(&args, "prompt")?;
        let task = self.tasks.create_human_task(prompt).await?;
        to_value(&task)
    }

    async fn create_agent_task(&self, args: Value) -> DispatchResult {
        let new_task = NewAgentTask {
            human_task_id: require_id(&args, "human_task_id")?,
            agent_name: require_str(&args, "agent_name")?,
            role: require_str(&args, "role")?,
            todo_descriptions: require_string_array(&args, "todo_descriptions")?,
            context_summary: optional_str(&args, "context_summary").unwrap_or_default(),
            files_modified: optional_string_array(&args, "files_modified").unwrap_or_default(),
            qdrant_collections: optional_string_array(&args, "qdrant_collections").unwrap_or_default(),
            prior_work_summary: optional_str(&args, "prior_work_summary").unwrap_or_default(),
        };
        let task = self.tasks.create_agent_task(new_task).await?;
        to_value(&task)
    }

    async fn get_agent_task(&self, args: Value) -> DispatchResult {
        let id = require_id(&args, "task_id")?;
        let task = self.tasks.get_agent_task(id).await?;
        to_value(&task)
    }

    async fn get_task_history(&self, args: Value) -> DispatchResult {
        let id = require_id(&args, "task_id")?;
        let history = self.tasks.get_task_history(id).await?;
        to_value(&history)
    }

    async fn list_human_tasks(&self) -> DispatchResult {
        let tasks = self.tasks.list_human_tasks().await?;
        to_value(&tasks)
    }

    async fn list_agent_tasks(&self, args: Value) -> DispatchResult {
        let query = ListAgentTasksQuery {
            human_task_id: optional_id(&args, "human_task_id")?,
            agent_name: optional_str(&args, "agent_name"),
            offset: optional_usize(&args, "offset")?.unwrap_or(0),
            limit: optional_usize(&args, "limit")?.unwrap_or(crate::task_engine::MAX_LIST_LIMIT),
        };
        let page = self.tasks.list_agent_tasks(query).await?;
        to_value(&json!({ "items": page.items, "total_count": page.total_count }))
    }

    async fn update_task_status(&self, args: Value) -> DispatchResult {
        let task_id = require_id(&args, "task_id")?;
        let status = require_task_status(&args, "status")?;
        let notes = optional_str(&args, "notes");
        let task = self.tasks.update_task_status(task_id, status, notes).await?;
        to_value(&task)
    }

    async fn update_todo_status(&self, args: Value) -> DispatchResult {
        let agent_task_id = require_id(&args, "agent_task_id")?;
        let todo_id = require_id(&args, "todo_id")?;
        let status = require_todo_status(&args, "status")?;
        let notes = optional_str(&args, "notes");
        let task = self.tasks.update_todo_status(agent_task_id, todo_id, status, notes).await?;
        to_value(&task)
    }

    async fn clear_task_board(&self, args: Value) -> DispatchResult {
        let confirm = optional_bool(&args, "confirm").unwrap_or(false);
        let result = self.tasks.clear_all_tasks(confirm).await?;
        to_value(&json!({
            "human_tasks_deleted": result.human_tasks_deleted,
            "agent_tasks_deleted": result.agent_tasks_deleted,
            "cleared_at": result.cleared_at,
        }))
    }

    async fn set_task_prompt_notes(&self, args: Value, require_text: bool) -> DispatchResult {
        let agent_task_id = require_id(&args, "agent_task_id")?;
        let text = if require_text { Some(require_str(&args, "text")?) } else { None };
        self.tasks.set_task_prompt_notes(agent_task_id, text).await?;
        to_value(&json!({ "ok": true }))
    }

    async fn set_todo_prompt_notes(&self, args: Value, require_text: bool) -> DispatchResult {
        let agent_task_id = require_id(&args, "agent_task_id")?;
        let todo_id = require_id(&args, "todo_id")?;
        let text = if require_text { Some(require_str(&args, "text")?) } else { None };
        self.tasks.set_todo_prompt_notes(agent_task_id, todo_id, text).await?;
        to_value(&json!({ "ok": true }))
    }

    // -----------------------------------------------------------------
    // Knowledge
    // -----------------------------------------------------------------

    async fn upsert_knowledge(&self, args: Value) -> DispatchResult {
        let collection = require_str(&args, "collection")?;
        let text = require_str(&args, "text")?;
        let metadata = optional_object(&args, "metadata").unwrap_or_default();
        let entry = self.knowledge.write(collection, text, metadata).await?;
        to_value(&entry)
    }

    async fn query_knowledge(&self, args: Value) -> DispatchResult {
        let collection = require_str(&args, "collection")?;
        let query = require_str(&args, "query")?;
        let limit = optional_usize(&args, "limit")?.unwrap_or(10);
        let hits = self.knowledge.query(&collection, &query, limit).await?;
        let payload: Vec<Value> = hits
            .into_iter()
            .map(|h| json!({ "entry": h.entry, "score": h.score }))
            .collect();
        to_value(&payload)
    }

    async fn delete_knowledge_entry(&self, args: Value) -> DispatchResult {
        let id = require_id(&args, "id")?;
        let collection = require_str(&args, "collection")?;
        self.knowledge.delete_entry(id, &collection).await?;
        to_value(&json!({ "ok": true }))
    }

    async fn get_popular_collections(&self, args: Value) -> DispatchResult {
        let limit = optional_usize(&args, "limit")?.unwrap_or(10);
        let popular = self.knowledge.popular_collections(limit).await?;
        to_value(&popular)
    }

    async fn list_collections(&self) -> DispatchResult {
        let directory = self.knowledge.collection_directory().await?;
        let payload: Vec<Value> = directory
            .into_iter()
            .map(|d| {
                json!({
                    "name": d.name,
                    "purpose": d.purpose,
                    "category": d.category,
                    "example_query": d.example_query,
                    "has_data": d.has_data,
                })
            })
            .collect();
        to_value(&payload)
    }

    async fn recent_learnings(&self) -> DispatchResult {
        let grouped = self.knowledge.recent_learnings().await?;
        to_value(&grouped)
    }

    // -----------------------------------------------------------------
    // Code
    // -----------------------------------------------------------------

    async fn code_index_add_folder(&self, args: Value) -> DispatchResult {
        let path = PathBuf::from(require_str(&args, "path")?);
        let description = optional_str(&args, "description").unwrap_or_default();
        let folder = self.code.add_folder(path, description).await?;
        to_value(&folder)
    }

    async fn code_index_remove_folder(&self, args: Value) -> DispatchResult {
        let id = require_id(&args, "folder_id")?;
        self.code.remove_folder(id).await?;
        to_value(&json!({ "ok": true }))
    }

    async fn code_index_scan(&self, args: Value) -> DispatchResult {
        let id = require_id(&args, "folder_id")?;
        let summary = self.code.scan_folder(id).await?;
        to_value(&json!({
            "files_seen": summary.files_seen,
            "files_indexed": summary.files_indexed,
            "files_failed": summary.files_failed,
        }))
    }

    async fn code_index_status(&self, args: Value) -> DispatchResult {
        match optional_id(&args, "folder_id")? {
            Some(id) => {
                let folder = self.code.get_folder(id).await?;
                to_value(&folder)
            }
            None => {
                let folders = self.code.list_folders().await?;
                to_value(&folders)
            }
        }
    }

    async fn code_search(&self, args: Value) -> DispatchResult {
        let query = require_str(&args, "query")?;
        let limit = optional_usize(&args, "limit")?.unwrap_or(10);
        let filters = CodeSearchFilters {
            file_types: optional_string_array(&args, "file_types").unwrap_or_default(),
            min_score: optional_f32(&args, "min_score")?.unwrap_or(0.0),
            mode: match optional_str(&args, "mode").as_deref() {
                Some("file") => SearchMode::File,
                Some("chunk") | None => SearchMode::Chunk,
                Some(other) => {
                    return Err(CortexError::invalid_argument(format!(
                        "mode must be 'chunk' or 'file', got '{other}'"
                    ))
                    .into())
                }
            },
        };
        let hits = self.code.search_code(&query, limit, filters).await?;
        let payload: Vec<Value> = hits
            .into_iter()
            .map(|h| {
                json!({
                    "file_id": h.file_id,
                    "relative_path": h.relative_path,
                    "chunk_num": h.chunk_num,
                    "content": h.content,
                    "starting_line_number": h.starting_line_number,
                    "ending_line_number": h.ending_line_number,
                    "score": h.score,
                    "full_file_retrieved": h.full_file_retrieved,
                })
            })
            .collect();
        to_value(&payload)
    }

    // -----------------------------------------------------------------
    // Metrics
    // -----------------------------------------------------------------

    async fn squad_velocity(&self) -> DispatchResult {
        let velocity = self.metrics.squad_velocity().await?;
        let payload: Vec<Value> = velocity
            .into_iter()
            .map(|v| {
                json!({
                    "agent_name": v.agent_name,
                    "today": window_json(&v.today),
                    "week": window_json(&v.week),
                    "all_time": window_json(&v.all_time),
                    "avg_todo_duration_secs": v.avg_todo_duration_secs,
                })
            })
            .collect();
        to_value(&payload)
    }

    async fn context_efficiency(&self) -> DispatchResult {
        let efficiency = self.metrics.context_efficiency().await?;
        to_value(&json!({
            "overall_score": efficiency.overall_score,
            "per_squad": efficiency.per_squad.iter().map(|s| json!({
                "agent_name": s.agent_name,
                "completion_rate": s.completion_rate,
                "avg_hours": s.avg_hours,
                "score": s.score,
            })).collect::<Vec<_>>(),
            "daily_series": efficiency.daily_series.iter().map(|p| json!({
                "date": p.date,
                "completed_count": p.completed_count,
            })).collect::<Vec<_>>(),
            "weekly_series": efficiency.weekly_series.iter().map(|p| json!({
                "week_start": p.week_start,
                "completed_count": p.completed_count,
            })).collect::<Vec<_>>(),
            "complexity_histogram": {
                "low": efficiency.complexity_histogram.low,
                "medium": efficiency.complexity_histogram.medium,
                "high": efficiency.complexity_histogram.high,
                "very_high": efficiency.complexity_histogram.very_high,
            },
        }))
    }

    async fn active_agents(&self) -> DispatchResult {
        let agents = self.metrics.active_agents().await?;
        let payload: Vec<Value> = agents
            .into_iter()
            .map(|a| {
                json!({
                    "agent_name": a.agent_name,
                    "status": match a.status {
                        crate::metrics::AgentActivityStatus::Working => "working",
                        crate::metrics::AgentActivityStatus::Blocked => "blocked",
                        crate::metrics::AgentActivityStatus::Idle => "idle",
                    },
                    "task_count": a.task_count,
                    "completed_count": a.completed_count,
                    "blocked_count": a.blocked_count,
                })
            })
            .collect();
        to_value(&payload)
    }

    async fn task_queue(&self) -> DispatchResult {
        let queue = self.metrics.task_queue().await?;
        let payload: Vec<Value> = queue
            .into_iter()
            .map(|e| json!({ "task_id": e.task_id, "priority_score": e.priority_score }))
            .collect();
        to_value(&payload)
    }

    async fn task_dependencies(&self) -> DispatchResult {
        let edges = self.metrics.dependencies().await?;
        let payload: Vec<Value> = edges
            .into_iter()
            .map(|e| {
                json!({
                    "task_id": e.task_id,
                    "blocked_by": e.blocked_by,
                    "blocks": e.blocks,
                })
            })
            .collect();
        to_value(&payload)
    }
}

fn window_json(w: &crate::metrics::VelocityWindow) -> Value {
    json!({
        "completed_count": w.completed_count,
        "total_count": w.total_count,
        "completion_rate": w.completion_rate,
    })
}

fn to_value<T: Serialize>(value: &T) -> DispatchResult {
    serde_json::to_value(value).map_err(|e| CortexError::internal(format!("failed to encode response: {e}")).into())
}

// -----------------------------------------------------------------
// Argument extraction helpers. Every failure mode is InvalidArgument,
// before any engine call (spec §4.5).
// -----------------------------------------------------------------

fn field<'a>(args: &'a Value, name: &str) -> Option<&'a Value> {
    args.get(name).filter(|v| !v.is_null())
}

fn require_str(args: &Value, name: &str) -> std::result::Result<String, DispatchError> {
    match field(args, name).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
        Some(_) => Err(CortexError::invalid_argument(format!("'{name}' must not be empty")).into()),
        None => Err(CortexError::invalid_argument(format!("'{name}' is required and must be a string")).into()),
    }
}

fn optional_str(args: &Value, name: &str) -> Option<String> {
    field(args, name).and_then(Value::as_str).map(|s| s.to_string())
}

fn require_string_array(args: &Value, name: &str) -> std::result::Result<Vec<String>, DispatchError> {
    let arr = field(args, name)
        .and_then(Value::as_array)
        .ok_or_else(|| CortexError::invalid_argument(format!("'{name}' is required and must be an array of strings")))?;
    arr.iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| CortexError::invalid_argument(format!("'{name}' must contain only strings")).into())
        })
        .collect()
}

fn optional_string_array(args: &Value, name: &str) -> Option<Vec<String>> {
    field(args, name).and_then(Value::as_array).map(|arr| {
        arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()
    })
}

fn require_id(args: &Value, name: &str) -> std::result::Result<CortexId, DispatchError> {
    let raw = require_str(args, name)?;
    raw.parse::<CortexId>()
        .map_err(|_| CortexError::invalid_argument(format!("'{name}' must be a valid UUID")).into())
}

fn optional_id(args: &Value, name: &str) -> std::result::Result<Option<CortexId>, DispatchError> {
    match field(args, name).and_then(Value::as_str) {
        Some(raw) => raw
            .parse::<CortexId>()
            .map(Some)
            .map_err(|_| CortexError::invalid_argument(format!("'{name}' must be a valid UUID")).into()),
        None => Ok(None),
    }
}

fn optional_usize(args: &Value, name: &str) -> std::result::Result<Option<usize>, DispatchError> {
    match field(args, name) {
        Some(v) => v
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| CortexError::invalid_argument(format!("'{name}' must be a non-negative integer")).into()),
        None => Ok(None),
    }
}

fn optional_f32(args: &Value, name: &str) -> std::result::Result<Option<f32>, DispatchError> {
    match field(args, name) {
        Some(v) => v
            .as_f64()
            .map(|n| Some(n as f32))
            .ok_or_else(|| CortexError::invalid_argument(format!("'{name}' must be a number")).into()),
        None => Ok(None),
    }
}

fn optional_bool(args: &Value, name: &str) -> Option<bool> {
    field(args, name).and_then(Value::as_bool)
}

fn optional_object(args: &Value, name: &str) -> Option<HashMap<String, Value>> {
    field(args, name).and_then(Value::as_object).map(|map| {
        map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    })
}

fn require_task_status(args: &Value, name: &str) -> std::result::Result<TaskStatus, DispatchError> {
    let raw = require_str(args, name)?;
    parse_task_status(&raw).ok_or_else(|| {
        CortexError::invalid_argument(format!(
            "'{name}' must be one of pending, in_progress, completed, blocked"
        ))
        .into()
    })
}

fn require_todo_status(args: &Value, name: &str) -> std::result::Result<TodoStatus, DispatchError> {
    let raw = require_str(args, name)?;
    parse_todo_status(&raw).ok_or_else(|| {
        CortexError::invalid_argument(format!("'{name}' must be one of pending, in_progress, completed")).into()
    })
}

fn parse_task_status(raw: &str) -> Option<TaskStatus> {
    match raw {
        "pending" => Some(TaskStatus::Pending),
        "in_progress" => Some(TaskStatus::InProgress),
        "completed" => Some(TaskStatus::Completed),
        "blocked" => Some(TaskStatus::Blocked),
        _ => None,
    }
}

fn parse_todo_status(raw: &str) -> Option<TodoStatus> {
    match raw {
        "pending" => Some(TodoStatus::Pending),
        "in_progress" => Some(TodoStatus::InProgress),
        "completed" => Some(TodoStatus::Completed),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_indexer::CodeIndexerConfig;
    use cortex_core::SystemClock;
    use cortex_ingestion::PathMapper;
    use cortex_semantic::{DeterministicEmbedder, InMemoryVectorStore};
    use cortex_storage::InMemoryStore;

    fn dispatcher() -> OperationDispatcher {
        let store = InMemoryStore::new();
        let clock = Arc::new(SystemClock);
        let embedder = Arc::new(DeterministicEmbedder::new(16));
        let vector_store = InMemoryVectorStore::new();
        let tasks = Arc::new(TaskEngine::new(store.clone(), clock.clone()));
        let knowledge = Arc::new(KnowledgeEngine::new(
            store.clone(),
            Some(embedder.clone()),
            Some(vector_store.clone()),
            clock.clone(),
        ));
        let code = Arc::new(CodeIndexer::new(
            store.clone(),
            vector_store,
            embedder,
            PathMapper::new(),
            clock.clone(),
            CodeIndexerConfig::default(),
        ));
        let metrics = Arc::new(WorkflowMetrics::new(store, clock));
        OperationDispatcher::new(tasks, knowledge, code, metrics)
    }

    #[tokio::test]
    async fn unknown_operation_is_invalid_argument() {
        let d = dispatcher();
        let err = d.execute("does_not_exist", json!({})).await.unwrap_err();
        assert_eq!(err.kind, "InvalidArgument");
        assert!(!err.retriable);
    }

    #[tokio::test]
    async fn create_human_task_requires_prompt_field() {
        let d = dispatcher();
        let err = d.execute("create_human_task", json!({})).await.unwrap_err();
        assert_eq!(err.kind, "InvalidArgument");
    }

    #[tokio::test]
    async fn create_human_task_round_trips_through_dispatcher() {
        let d = dispatcher();
        let out = d.execute("create_human_task", json!({ "prompt": "build a thing" })).await.unwrap();
        assert_eq!(out["prompt"], "build a thing");
        assert_eq!(out["status"], "pending");
    }

    #[tokio::test]
    async fn create_agent_task_rejects_malformed_human_task_id() {
        let d = dispatcher();
        let err = d
            .execute(
                "create_agent_task",
                json!({
                    "human_task_id": "not-a-uuid",
                    "agent_name": "go-dev",
                    "role": "implement",
                    "todo_descriptions": ["a"],
                }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, "InvalidArgument");
    }

    #[tokio::test]
    async fn update_task_status_rejects_unknown_status_value() {
        let d = dispatcher();
        let human = d.execute("create_human_task", json!({ "prompt": "p" })).await.unwrap();
        let agent = d
            .execute(
                "create_agent_task",
                json!({
                    "human_task_id": human["id"],
                    "agent_name": "go-dev",
                    "role": "implement",
                    "todo_descriptions": ["a"],
                }),
            )
            .await
            .unwrap();
        let err = d
            .execute(
                "update_task_status",
                json!({ "task_id": agent["id"], "status": "on_fire" }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, "InvalidArgument");
    }

    #[tokio::test]
    async fn clear_task_board_without_confirm_is_precondition_failed() {
        let d = dispatcher();
        let err = d.execute("clear_task_board", json!({})).await.unwrap_err();
        assert_eq!(err.kind, "PreconditionFailed");
    }

    #[tokio::test]
    async fn upsert_and_query_knowledge_round_trip() {
        let d = dispatcher();
        d.execute(
            "upsert_knowledge",
            json!({ "collection": "technical-knowledge", "text": "rust ownership rules" }),
        )
        .await
        .unwrap();
        let hits = d
            .execute(
                "query_knowledge",
                json!({ "collection": "technical-knowledge", "query": "ownership", "limit": 5 }),
            )
            .await
            .unwrap();
        assert_eq!(hits.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_task_history_reflects_status_updates() {
        let d = dispatcher();
        let human = d.execute("create_human_task", json!({ "prompt": "p" })).await.unwrap();
        let agent = d
            .execute(
                "create_agent_task",
                json!({
                    "human_task_id": human["id"],
                    "agent_name": "go-dev",
                    "role": "implement",
                    "todo_descriptions": ["a"],
                }),
            )
            .await
            .unwrap();
        d.execute(
            "update_task_status",
            json!({ "task_id": agent["id"], "status": "in_progress" }),
        )
        .await
        .unwrap();

        let history = d.execute("get_task_history", json!({ "task_id": agent["id"] })).await.unwrap();
        assert_eq!(history.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_knowledge_entry_removes_it_from_query_results() {
        let d = dispatcher();
        let entry = d
            .execute(
                "upsert_knowledge",
                json!({ "collection": "technical-knowledge", "text": "rust ownership rules" }),
            )
            .await
            .unwrap();
        d.execute(
            "delete_knowledge_entry",
            json!({ "id": entry["id"], "collection": "technical-knowledge" }),
        )
        .await
        .unwrap();
        let hits = d
            .execute(
                "query_knowledge",
                json!({ "collection": "technical-knowledge", "query": "ownership", "limit": 5 }),
            )
            .await
            .unwrap();
        assert!(hits.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn code_search_rejects_unknown_mode() {
        let d = dispatcher();
        let err = d
            .execute("code_search", json!({ "query": "fn main", "mode": "bogus" }))
            .await
            .unwrap_err();
        assert_eq!(err.kind, "InvalidArgument");
    }
}
