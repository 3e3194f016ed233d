//! The domain model shared by every engine: tasks, knowledge entries, and
//! code-index metadata.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CortexError;
use crate::id::CortexId;

/// Current on-disk schema version for task records. Bumped when a
/// backwards-incompatible field is added; older records default this in on
/// deserialize.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Human-prompt-notes are capped at this many bytes after sanitisation.
pub const PROMPT_NOTES_MAX_LEN: usize = 5_000;

/// Listing responses truncate long text fields to this many bytes.
pub const LISTING_TRUNCATE_LEN: usize = 500;

pub const TRUNCATION_SENTINEL: &str =
    "\u{2026} [TRUNCATED \u{2013} use <get-single-agent-task> for full content]";

/// Bounded length of the per-task status-transition history kept for
/// observability. Not consulted by the cascade rule.
const MAX_HISTORY_LEN: usize = 50;

// ---------------------------------------------------------------------------
// Status domains
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = CortexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "blocked" => Ok(Self::Blocked),
            other => Err(CortexError::invalid_argument(format!(
                "unknown task status '{other}'"
            ))),
        }
    }
}

/// Todo statuses are a strict subset of task statuses: no `blocked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

impl std::fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TodoStatus {
    type Err = CortexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(CortexError::invalid_argument(format!(
                "unknown todo status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub timestamp: DateTime<Utc>,
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub note: Option<String>,
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanTask {
    pub id: CortexId,
    pub prompt: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub notes: Option<String>,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

impl HumanTask {
    pub fn new(prompt: String, now: DateTime<Utc>) -> Self {
        Self {
            id: CortexId::new(),
            prompt,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            notes: None,
            schema_version: CURRENT_SCHEMA_VERSION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Todo {
    pub id: CortexId,
    pub description: String,
    pub status: TodoStatus,
    pub file_path: Option<String>,
    pub function_name: Option<String>,
    pub context_hint: Option<String>,
    pub notes: Option<String>,
    pub human_prompt_notes: Option<String>,
    pub human_prompt_notes_added_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Todo {
    pub fn new(description: String, now: DateTime<Utc>) -> Self {
        Self {
            id: CortexId::new(),
            description,
            status: TodoStatus::Pending,
            file_path: None,
            function_name: None,
            context_hint: None,
            notes: None,
            human_prompt_notes: None,
            human_prompt_notes_added_at: None,
            created_at: now,
            completed_at: None,
        }
    }

    /// Applies a status mutation, keeping `completed_at` consistent with the
    /// invariant `completedAt is set iff status = completed`.
    pub fn set_status(&mut self, status: TodoStatus, now: DateTime<Utc>) {
        self.status = status;
        self.completed_at = if status == TodoStatus::Completed {
            Some(now)
        } else {
            None
        };
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: CortexId,
    pub human_task_id: CortexId,
    pub agent_name: String,
    pub role: String,
    pub status: TaskStatus,
    pub todos: Vec<Todo>,
    pub context_summary: String,
    pub files_modified: Vec<String>,
    pub qdrant_collections: Vec<String>,
    pub prior_work_summary: String,
    pub notes: Option<String>,
    pub human_prompt_notes: Option<String>,
    pub human_prompt_notes_added_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub history: VecDeque<StatusTransition>,
}

fn default_schema_version() -> u32 {
    CURRENT_SCHEMA_VERSION
}

impl AgentTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        human_task_id: CortexId,
        agent_name: String,
        role: String,
        todos: Vec<Todo>,
        context_summary: String,
        files_modified: Vec<String>,
        qdrant_collections: Vec<String>,
        prior_work_summary: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CortexId::new(),
            human_task_id,
            agent_name,
            role,
            status: TaskStatus::Pending,
            todos,
            context_summary,
            files_modified,
            qdrant_collections,
            prior_work_summary,
            notes: None,
            human_prompt_notes: None,
            human_prompt_notes_added_at: None,
            created_at: now,
            updated_at: now,
            schema_version: CURRENT_SCHEMA_VERSION,
            history: VecDeque::new(),
        }
    }

    fn record_transition(&mut self, to: TaskStatus, note: Option<String>, now: DateTime<Utc>) {
        if self.status == to {
            return;
        }
        self.history.push_back(StatusTransition {
            timestamp: now,
            from: self.status,
            to,
            note,
        });
        while self.history.len() > MAX_HISTORY_LEN {
            self.history.pop_front();
        }
        self.status = to;
    }

    /// Explicit status update (`UpdateTaskStatus`), independent of the cascade.
    pub fn set_status(&mut self, status: TaskStatus, note: Option<String>, now: DateTime<Utc>) {
        self.record_transition(status, note, now);
        self.updated_at = now;
    }

    /// Applies a Todo status mutation and recomputes the cascade rule:
    /// if every Todo is `completed`, the AgentTask transitions to `completed`
    /// atomically with this same call. Returns `true` if the cascade fired.
    ///
    /// No-op (returns `false`) if the task is already `completed` — cascade
    /// on an already-completed AgentTask never re-fires.
    pub fn apply_todo_status(
        &mut self,
        todo_id: CortexId,
        status: TodoStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, CortexError> {
        let todo = self
            .todos
            .iter_mut()
            .find(|t| t.id == todo_id)
            .ok_or_else(|| CortexError::not_found("todo", todo_id.to_string()))?;
        todo.set_status(status, now);
        self.updated_at = now;

        if self.status == TaskStatus::Completed {
            return Ok(false);
        }
        let all_completed = !self.todos.is_empty()
            && self.todos.iter().all(|t| t.status == TodoStatus::Completed);
        if all_completed {
            self.record_transition(TaskStatus::Completed, None, now);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

// ---------------------------------------------------------------------------
// Listing truncation + prompt-note sanitisation
// ---------------------------------------------------------------------------

/// Truncates `s` to `LISTING_TRUNCATE_LEN` bytes on a UTF-8 boundary and
/// appends the truncation sentinel, if it is longer than that.
pub fn truncate_for_listing(s: &str) -> String {
    if s.len() <= LISTING_TRUNCATE_LEN {
        return s.to_string();
    }
    let mut end = LISTING_TRUNCATE_LEN;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &s[..end], TRUNCATION_SENTINEL)
}

/// Strips `<script>...</script>` fragments (case-insensitive, non-greedy)
/// and rejects the result if it exceeds `PROMPT_NOTES_MAX_LEN` bytes.
///
/// Idempotent: `sanitize_prompt_notes(sanitize_prompt_notes(x)?) == sanitize_prompt_notes(x)?`
/// because the stripped text never reintroduces a `<script>` fragment.
pub fn sanitize_prompt_notes(input: &str) -> Result<String, CortexError> {
    static SCRIPT_TAG: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = SCRIPT_TAG.get_or_init(|| {
        regex::Regex::new(r"(?is)<script>.*?</script>").expect("static pattern is valid")
    });
    let cleaned = re.replace_all(input, "").into_owned();
    if cleaned.len() > PROMPT_NOTES_MAX_LEN {
        return Err(CortexError::invalid_argument(format!(
            "prompt notes exceed {PROMPT_NOTES_MAX_LEN} bytes after sanitisation"
        )));
    }
    Ok(cleaned)
}

// ---------------------------------------------------------------------------
// Knowledge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: CortexId,
    pub collection: String,
    pub text: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    /// Internal flag recording whether the vector write succeeded; never
    /// surfaced directly to callers (spec §4.2 step 4).
    pub vector_indexed: bool,
}

impl KnowledgeEntry {
    pub fn new(
        collection: String,
        text: String,
        metadata: HashMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CortexId::new(),
            collection,
            text,
            metadata,
            created_at: now,
            vector_indexed: false,
        }
    }
}

/// A well-known collection's static documentation, merged at read time with
/// observed collections (spec §4.2 "Collection directory").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionDescriptor {
    pub name: &'static str,
    pub purpose: &'static str,
    pub category: &'static str,
    pub example_query: &'static str,
}

pub const WELL_KNOWN_COLLECTIONS: &[CollectionDescriptor] = &[
    CollectionDescriptor {
        name: "technical-knowledge",
        purpose: "Durable technical facts and how-tos discovered during work",
        category: "knowledge",
        example_query: "how does the cascade rule work",
    },
    CollectionDescriptor {
        name: "adr",
        purpose: "Architecture decision records",
        category: "decisions",
        example_query: "why was surrealdb chosen",
    },
    CollectionDescriptor {
        name: "code-patterns",
        purpose: "Reusable implementation patterns observed in the codebase",
        category: "knowledge",
        example_query: "retry pattern for embedder calls",
    },
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopularCollection {
    pub collection: String,
    pub entry_count: u64,
    pub last_activity_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Code index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderStatus {
    Active,
    Paused,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedFolder {
    pub id: CortexId,
    pub path: PathBuf,
    pub description: String,
    pub status: FolderStatus,
    pub added_at: DateTime<Utc>,
    pub last_scan_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_count: u64,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl IndexedFolder {
    pub fn new(path: PathBuf, description: String, now: DateTime<Utc>) -> Self {
        Self {
            id: CortexId::new(),
            path,
            description,
            status: FolderStatus::Active,
            added_at: now,
            last_scan_at: None,
            error_count: 0,
            last_error: None,
        }
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.error_count += 1;
        self.last_error = Some(error.into());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedFile {
    pub id: CortexId,
    pub folder_id: CortexId,
    pub relative_path: String,
    pub content_hash: String,
    pub size: u64,
    pub mod_time: DateTime<Utc>,
    pub language: String,
    pub last_indexed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeChunk {
    pub id: CortexId,
    pub file_id: CortexId,
    pub chunk_num: u32,
    pub start_line: u32,
    pub end_line: u32,
    pub text: String,
    pub content_hash: String,
}

/// Static extension → language table, consulted by the scanner's
/// allowlist and by search response shaping (spec SPEC_FULL §4.3 supplement).
pub fn infer_language(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "rs" => "rust",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" => "javascript",
        "py" => "python",
        "go" => "go",
        "java" => "java",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" => "cpp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" | "kts" => "kotlin",
        "md" | "markdown" => "markdown",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        "sh" | "bash" => "shell",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn cascade_completes_agent_task_when_all_todos_done() {
        let human_id = CortexId::new();
        let t0 = now();
        let mut task = AgentTask::new(
            human_id,
            "go-dev".into(),
            "R".into(),
            vec![Todo::new("A".into(), t0), Todo::new("B".into(), t0)],
            String::new(),
            vec![],
            vec![],
            String::new(),
            t0,
        );
        let a_id = task.todos[0].id;
        let b_id = task.todos[1].id;

        let t1 = t0 + chrono::Duration::seconds(1);
        let fired = task.apply_todo_status(a_id, TodoStatus::Completed, t1).unwrap();
        assert!(!fired);
        assert_eq!(task.status, TaskStatus::Pending);

        let t2 = t1 + chrono::Duration::seconds(1);
        let fired = task.apply_todo_status(b_id, TodoStatus::Completed, t2).unwrap();
        assert!(fired);
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.updated_at, t2);
    }

    #[test]
    fn cascade_is_a_noop_on_already_completed_task() {
        let t0 = now();
        let mut task = AgentTask::new(
            CortexId::new(),
            "a".into(),
            "r".into(),
            vec![Todo::new("A".into(), t0)],
            String::new(),
            vec![],
            vec![],
            String::new(),
            t0,
        );
        let a_id = task.todos[0].id;
        task.apply_todo_status(a_id, TodoStatus::Completed, t0).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);

        let before = task.status;
        let fired = task
            .apply_todo_status(a_id, TodoStatus::Completed, t0 + chrono::Duration::seconds(1))
            .unwrap();
        assert!(!fired);
        assert_eq!(task.status, before);
    }

    #[test]
    fn truncation_appends_sentinel_only_when_needed() {
        let short = "hello";
        assert_eq!(truncate_for_listing(short), short);

        let long = "x".repeat(1000);
        let truncated = truncate_for_listing(&long);
        assert!(truncated.ends_with(TRUNCATION_SENTINEL));
        assert_eq!(
            truncated.len(),
            LISTING_TRUNCATE_LEN + TRUNCATION_SENTINEL.len()
        );
    }

    #[test]
    fn sanitisation_strips_script_tags_and_is_idempotent() {
        let input = "hello <script>alert(1)</script> world";
        let once = sanitize_prompt_notes(input).unwrap();
        assert_eq!(once, "hello  world");
        let twice = sanitize_prompt_notes(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn sanitisation_rejects_over_length_after_stripping() {
        let input = "x".repeat(PROMPT_NOTES_MAX_LEN + 1);
        assert!(sanitize_prompt_notes(&input).is_err());
        let boundary = "x".repeat(PROMPT_NOTES_MAX_LEN);
        assert!(sanitize_prompt_notes(&boundary).is_ok());
    }

    #[test]
    fn language_inference_covers_common_extensions() {
        assert_eq!(infer_language("rs"), "rust");
        assert_eq!(infer_language("TSX"), "typescript");
        assert_eq!(infer_language("weird"), "unknown");
    }
}
