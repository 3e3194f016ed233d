//! The TaskEngine (spec §4.1): human/agent task lifecycle, the TODO
//! cascade rule, and prompt-note CRUD.

use std::sync::Arc;

use cortex_core::error::{CortexError, Result};
use cortex_core::{
    sanitize_prompt_notes, truncate_for_listing, AgentTask, Clock, CortexId, HumanTask,
    StatusTransition, TaskStatus, Todo, TodoStatus,
};
use cortex_storage::{Collection, DocStore, Filter, Sort};
use dashmap::DashMap;
use tokio::sync::Mutex;

/// Arguments accepted by `create_agent_task` (spec §4.1).
#[derive(Debug, Clone, Default)]
pub struct NewAgentTask {
    pub human_task_id: CortexId,
    pub agent_name: String,
    pub role: String,
    pub todo_descriptions: Vec<String>,
    pub context_summary: String,
    pub files_modified: Vec<String>,
    pub qdrant_collections: Vec<String>,
    pub prior_work_summary: String,
}

/// Filter + pagination for `list_agent_tasks` (spec §4.1).
#[derive(Debug, Clone, Default)]
pub struct ListAgentTasksQuery {
    pub human_task_id: Option<CortexId>,
    pub agent_name: Option<String>,
    pub offset: usize,
    pub limit: usize,
}

pub const MAX_LIST_LIMIT: usize = 50;

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
}

#[derive(Debug, Clone)]
pub struct ClearAllTasksResult {
    pub human_tasks_deleted: u64,
    pub agent_tasks_deleted: u64,
    pub cleared_at: chrono::DateTime<chrono::Utc>,
}

pub struct TaskEngine {
    human_tasks: Collection<HumanTask>,
    agent_tasks: Collection<AgentTask>,
    clock: Arc<dyn Clock>,
    /// Per-AgentTask lock, standing in for a DocStore transaction: the spec
    /// allows "a compare-and-swap loop when transactions are unavailable"
    /// (§4.1); since our DocStore trait exposes no CAS primitive, we
    /// serialise same-task mutations through an in-process lock instead,
    /// which gives the same single-writer guarantee within one process.
    locks: DashMap<CortexId, Arc<Mutex<()>>>,
}

impl TaskEngine {
    pub fn new(store: Arc<dyn DocStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            human_tasks: Collection::new(store.clone(), "human_tasks"),
            agent_tasks: Collection::new(store, "agent_tasks"),
            clock,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, id: CortexId) -> Arc<Mutex<()>> {
        self.locks.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    pub async fn create_human_task(&self, prompt: String) -> Result<HumanTask> {
        if prompt.trim().is_empty() {
            return Err(CortexError::invalid_argument("prompt must not be empty"));
        }
        let task = HumanTask::new(prompt, self.clock.now());
        self.human_tasks.insert(&task.id.to_string(), &task).await?;
        Ok(task)
    }

    pub async fn get_human_task(&self, id: CortexId) -> Result<HumanTask> {
        self.human_tasks
            .find_one(&Filter::new().eq("id", id.to_string()))
            .await?
            .ok_or_else(|| CortexError::not_found("human_task", id.to_string()))
    }

    pub async fn list_human_tasks(&self) -> Result<Vec<HumanTask>> {
        self.human_tasks
            .find(
                &Filter::new(),
                Some(&Sort::desc("created_at").then(Sort::desc("id"))),
                None,
                None,
            )
            .await
    }

    pub async fn create_agent_task(&self, args: NewAgentTask) -> Result<AgentTask> {
        // human task must exist
        self.get_human_task(args.human_task_id).await?;
        if args.todo_descriptions.is_empty() {
            return Err(CortexError::invalid_argument(
                "an agent task requires at least one todo",
            ));
        }
        if args.todo_descriptions.iter().any(|d| d.trim().is_empty()) {
            return Err(CortexError::invalid_argument(
                "every todo must have a non-empty description",
            ));
        }
        let now = self.clock.now();
        let todos = args
            .todo_descriptions
            .into_iter()
            .map(|d| Todo::new(d, now))
            .collect();
        let task = AgentTask::new(
            args.human_task_id,
            args.agent_name,
            args.role,
            todos,
            args.context_summary,
            args.files_modified,
            args.qdrant_collections,
            args.prior_work_summary,
            now,
        );
        self.agent_tasks.insert(&task.id.to_string(), &task).await?;
        Ok(task)
    }

    pub async fn get_agent_task(&self, id: CortexId) -> Result<AgentTask> {
        self.agent_tasks
            .find_one(&Filter::new().eq("id", id.to_string()))
            .await?
            .ok_or_else(|| CortexError::not_found("agent_task", id.to_string()))
    }

    /// Read-only projection over the bounded status-transition history
    /// (SPEC_FULL §4.1 supplement). Never feeds the cascade rule.
    pub async fn get_task_history(&self, id: CortexId) -> Result<Vec<StatusTransition>> {
        let task = self.get_agent_task(id).await?;
        Ok(task.history.into_iter().collect())
    }

    pub async fn list_agent_tasks(&self, query: ListAgentTasksQuery) -> Result<Page<AgentTask>> {
        if query.limit > MAX_LIST_LIMIT {
            return Err(CortexError::invalid_argument(format!(
                "limit must be <= {MAX_LIST_LIMIT}"
            )));
        }
        let mut filter = Filter::new();
        if let Some(human_id) = query.human_task_id {
            filter = filter.eq("human_task_id", human_id.to_string());
        }
        if let Some(agent_name) = &query.agent_name {
            filter = filter.eq("agent_name", agent_name.clone());
        }
        let total_count = self.agent_tasks.count(&filter).await?;
        let limit = if query.limit == 0 { MAX_LIST_LIMIT } else { query.limit };
        // spec §4.1: stable `createdAt DESC, id DESC` ordering so concatenated
        // pages over tasks sharing a `createdAt` neither drop nor duplicate rows.
        let mut items = self
            .agent_tasks
            .find(
                &filter,
                Some(&Sort::desc("created_at").then(Sort::desc("id"))),
                Some(limit),
                Some(query.offset),
            )
            .await?;
        for task in &mut items {
            truncate_agent_task_for_listing(task);
        }
        Ok(Page { items, total_count })
    }

    pub async fn update_task_status(
        &self,
        task_id: CortexId,
        status: TaskStatus,
        notes: Option<String>,
    ) -> Result<AgentTask> {
        let lock = self.lock_for(task_id);
        let _guard = lock.lock().await;

        let mut task = self.get_agent_task(task_id).await?;
        let now = self.clock.now();
        task.set_status(status, notes.clone(), now);
        if let Some(notes) = notes {
            task.notes = Some(notes);
        }
        self.persist_agent_task(&task).await?;
        Ok(task)
    }

    pub async fn update_todo_status(
        &self,
        agent_task_id: CortexId,
        todo_id: CortexId,
        status: TodoStatus,
        notes: Option<String>,
    ) -> Result<AgentTask> {
        let lock = self.lock_for(agent_task_id);
        let _guard = lock.lock().await;

        let mut task = self.get_agent_task(agent_task_id).await?;
        let now = self.clock.now();
        task.apply_todo_status(todo_id, status, now)?;
        if let Some(notes) = notes {
            if let Some(todo) = task.todos.iter_mut().find(|t| t.id == todo_id) {
                todo.notes = Some(notes);
            }
        }
        self.persist_agent_task(&task).await?;
        Ok(task)
    }

    pub async fn set_task_prompt_notes(
        &self,
        agent_task_id: CortexId,
        text: Option<String>,
    ) -> Result<()> {
        let lock = self.lock_for(agent_task_id);
        let _guard = lock.lock().await;

        let mut task = self.get_agent_task(agent_task_id).await?;
        let now = self.clock.now();
        match text {
            Some(text) => {
                task.human_prompt_notes = Some(sanitize_prompt_notes(&text)?);
                task.human_prompt_notes_added_at = Some(now);
            }
            None => {
                task.human_prompt_notes = None;
                task.human_prompt_notes_added_at = None;
            }
        }
        task.updated_at = now;
        self.persist_agent_task(&task).await?;
        Ok(())
    }

    pub async fn set_todo_prompt_notes(
        &self,
        agent_task_id: CortexId,
        todo_id: CortexId,
        text: Option<String>,
    ) -> Result<()> {
        let lock = self.lock_for(agent_task_id);
        let _guard = lock.lock().await;

        let mut task = self.get_agent_task(agent_task_id).await?;
        let now = self.clock.now();
        let todo = task
            .todos
            .iter_mut()
            .find(|t| t.id == todo_id)
            .ok_or_else(|| CortexError::not_found("todo", todo_id.to_string()))?;
        match text {
            Some(text) => {
                todo.human_prompt_notes = Some(sanitize_prompt_notes(&text)?);
                todo.human_prompt_notes_added_at = Some(now);
            }
            None => {
                todo.human_prompt_notes = None;
                todo.human_prompt_notes_added_at = None;
            }
        }
        task.updated_at = now;
        self.persist_agent_task(&task).await?;
        Ok(())
    }

    pub async fn clear_all_tasks(&self, confirm: bool) -> Result<ClearAllTasksResult> {
        if !confirm {
            return Err(CortexError::precondition_failed(
                "clear_all_tasks requires confirm=true",
            ));
        }
        let human_tasks_deleted = self.human_tasks.delete(&Filter::new()).await?;
        let agent_tasks_deleted = self.agent_tasks.delete(&Filter::new()).await?;
        self.locks.clear();
        Ok(ClearAllTasksResult {
            human_tasks_deleted,
            agent_tasks_deleted,
            cleared_at: self.clock.now(),
        })
    }

    async fn persist_agent_task(&self, task: &AgentTask) -> Result<()> {
        let patch = serde_json::to_value(task)?;
        self.agent_tasks
            .update(&Filter::new().eq("id", task.id.to_string()), patch)
            .await?;
        Ok(())
    }
}

/// Truncates the long text fields of an AgentTask (and its Todos) for the
/// listing response (spec §4.1 "Listing truncation policy").
fn truncate_agent_task_for_listing(task: &mut AgentTask) {
    task.context_summary = truncate_for_listing(&task.context_summary);
    task.prior_work_summary = truncate_for_listing(&task.prior_work_summary);
    if let Some(notes) = &task.notes {
        task.notes = Some(truncate_for_listing(notes));
    }
    if let Some(notes) = &task.human_prompt_notes {
        task.human_prompt_notes = Some(truncate_for_listing(notes));
    }
    for todo in &mut task.todos {
        if let Some(notes) = &todo.notes {
            todo.notes = Some(truncate_for_listing(notes));
        }
        if let Some(notes) = &todo.human_prompt_notes {
            todo.human_prompt_notes = Some(truncate_for_listing(notes));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::SystemClock;
    use cortex_storage::InMemoryStore;

    fn engine() -> TaskEngine {
        TaskEngine::new(InMemoryStore::new(), Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn create_human_task_round_trips() {
        let engine = engine();
        let created = engine.create_human_task("P".into()).await.unwrap();
        let fetched = engine.get_human_task(created.id).await.unwrap();
        assert_eq!(fetched.prompt, "P");
        assert_eq!(fetched.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn create_human_task_rejects_empty_prompt() {
        let engine = engine();
        let err = engine.create_human_task("  ".into()).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
    }

    #[tokio::test]
    async fn create_agent_task_requires_existing_human_task() {
        let engine = engine();
        let err = engine
            .create_agent_task(NewAgentTask {
                human_task_id: CortexId::new(),
                agent_name: "go-dev".into(),
                role: "R".into(),
                todo_descriptions: vec!["A".into()],
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    #[tokio::test]
    async fn create_agent_task_requires_todos() {
        let engine = engine();
        let human = engine.create_human_task("P".into()).await.unwrap();
        let err = engine
            .create_agent_task(NewAgentTask {
                human_task_id: human.id,
                agent_name: "go-dev".into(),
                role: "R".into(),
                todo_descriptions: vec![],
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
    }

    #[tokio::test]
    async fn cascade_end_to_end_scenario() {
        let engine = engine();
        let human = engine.create_human_task("P".into()).await.unwrap();
        let agent = engine
            .create_agent_task(NewAgentTask {
                human_task_id: human.id,
                agent_name: "go-dev".into(),
                role: "R".into(),
                todo_descriptions: vec!["A".into(), "B".into()],
                ..Default::default()
            })
            .await
            .unwrap();

        let a_id = agent.todos[0].id;
        let b_id = agent.todos[1].id;

        engine
            .update_todo_status(agent.id, a_id, TodoStatus::Completed, None)
            .await
            .unwrap();
        let updated = engine
            .update_todo_status(agent.id, b_id, TodoStatus::Completed, None)
            .await
            .unwrap();

        assert_eq!(updated.status, TaskStatus::Completed);
        assert!(updated.todos.iter().all(|t| t.status == TodoStatus::Completed));
        assert_eq!(updated.updated_at, engine.get_agent_task(agent.id).await.unwrap().updated_at);
    }

    #[tokio::test]
    async fn listing_truncates_long_fields_but_getter_returns_full() {
        let engine = engine();
        let human = engine.create_human_task("P".into()).await.unwrap();
        let long = "x".repeat(1000);
        let agent = engine
            .create_agent_task(NewAgentTask {
                human_task_id: human.id,
                agent_name: "go-dev".into(),
                role: "R".into(),
                todo_descriptions: vec!["A".into()],
                context_summary: long.clone(),
                ..Default::default()
            })
            .await
            .unwrap();

        let page = engine
            .list_agent_tasks(ListAgentTasksQuery::default())
            .await
            .unwrap();
        let listed = page.items.into_iter().find(|t| t.id == agent.id).unwrap();
        assert!(listed.context_summary.len() < long.len());
        assert!(listed.context_summary.ends_with(cortex_core::TRUNCATION_SENTINEL));

        let full = engine.get_agent_task(agent.id).await.unwrap();
        assert_eq!(full.context_summary, long);
    }

    #[tokio::test]
    async fn list_agent_tasks_rejects_limit_over_fifty() {
        let engine = engine();
        let err = engine
            .list_agent_tasks(ListAgentTasksQuery { limit: 51, ..Default::default() })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
    }

    #[tokio::test]
    async fn clear_all_tasks_requires_confirmation() {
        let engine = engine();
        let err = engine.clear_all_tasks(false).await.unwrap_err();
        assert_eq!(err.kind(), "PreconditionFailed");

        engine.create_human_task("P".into()).await.unwrap();
        let result = engine.clear_all_tasks(true).await.unwrap();
        assert_eq!(result.human_tasks_deleted, 1);
    }

    #[tokio::test]
    async fn prompt_notes_over_limit_are_rejected() {
        let engine = engine();
        let human = engine.create_human_task("P".into()).await.unwrap();
        let agent = engine
            .create_agent_task(NewAgentTask {
                human_task_id: human.id,
                agent_name: "a".into(),
                role: "r".into(),
                todo_descriptions: vec!["A".into()],
                ..Default::default()
            })
            .await
            .unwrap();

        let over = "x".repeat(5001);
        let err = engine.set_task_prompt_notes(agent.id, Some(over)).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");

        let at_limit = "x".repeat(5000);
        engine.set_task_prompt_notes(agent.id, Some(at_limit)).await.unwrap();
    }
}
