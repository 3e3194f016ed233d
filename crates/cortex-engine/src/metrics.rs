//! WorkflowMetrics (spec §4.4): pure read-side projections over
//! `ListAllAgentTasks`. No caching; every call re-derives its answer from
//! whatever DocStore returns right now.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use cortex_core::error::Result;
use cortex_core::{AgentTask, Clock, CortexId, TaskStatus, TodoStatus};
use cortex_storage::{Collection, DocStore, Filter};
use regex::Regex;
use std::sync::OnceLock;

fn uuid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
            .expect("static pattern is valid")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentActivityStatus {
    Working,
    Blocked,
    Idle,
}

#[derive(Debug, Clone)]
pub struct ActiveAgent {
    pub agent_name: String,
    pub status: AgentActivityStatus,
    pub task_count: u64,
    pub completed_count: u64,
    pub blocked_count: u64,
}

#[derive(Debug, Clone)]
pub struct TaskQueueEntry {
    pub task_id: CortexId,
    pub priority_score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyEdges {
    pub task_id: CortexId,
    pub blocked_by: Vec<CortexId>,
    pub blocks: Vec<CortexId>,
}

#[derive(Debug, Clone, Default)]
pub struct VelocityWindow {
    pub completed_count: u64,
    pub total_count: u64,
    pub completion_rate: f64,
}

#[derive(Debug, Clone)]
pub struct SquadVelocity {
    pub agent_name: String,
    pub today: VelocityWindow,
    pub week: VelocityWindow,
    pub all_time: VelocityWindow,
    /// Mean `completedAt - createdAt` across completed todos, in seconds.
    pub avg_todo_duration_secs: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ComplexityHistogram {
    pub low: u64,    // 1-3 todos
    pub medium: u64, // 4-5 todos
    pub high: u64,   // 6-7 todos
    pub very_high: u64, // 8+ todos
}

#[derive(Debug, Clone)]
pub struct DailyPoint {
    pub date: DateTime<Utc>,
    pub completed_count: u64,
}

#[derive(Debug, Clone)]
pub struct WeeklyPoint {
    pub week_start: DateTime<Utc>,
    pub completed_count: u64,
}

#[derive(Debug, Clone)]
pub struct SquadContextStats {
    pub agent_name: String,
    pub completion_rate: f64,
    pub avg_hours: f64,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct ContextEfficiency {
    pub overall_score: f64,
    pub per_squad: Vec<SquadContextStats>,
    pub daily_series: Vec<DailyPoint>,
    pub weekly_series: Vec<WeeklyPoint>,
    pub complexity_histogram: ComplexityHistogram,
}

pub struct WorkflowMetrics {
    agent_tasks: Collection<AgentTask>,
    clock: Arc<dyn Clock>,
}

impl WorkflowMetrics {
    pub fn new(store: Arc<dyn DocStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            agent_tasks: Collection::new(store, "agent_tasks"),
            clock,
        }
    }

    async fn all_tasks(&self) -> Result<Vec<AgentTask>> {
        self.agent_tasks.find(&Filter::new(), None, None, None).await
    }

    /// **ActiveAgents** (spec §4.4): per agent, activity derived from the
    /// most-recent-by-`updatedAt` task.
    pub async fn active_agents(&self) -> Result<Vec<ActiveAgent>> {
        let tasks = self.all_tasks().await?;
        let mut by_agent: HashMap<String, Vec<&AgentTask>> = HashMap::new();
        for task in &tasks {
            by_agent.entry(task.agent_name.clone()).or_default().push(task);
        }

        let mut out = Vec::new();
        for (agent_name, mut agent_tasks) in by_agent {
            agent_tasks.sort_by_key(|t| std::cmp::Reverse(t.updated_at));
            let status = match agent_tasks.first().map(|t| t.status) {
                Some(TaskStatus::InProgress) => AgentActivityStatus::Working,
                Some(TaskStatus::Blocked) => AgentActivityStatus::Blocked,
                _ => AgentActivityStatus::Idle,
            };
            let completed_count = agent_tasks.iter().filter(|t| t.status == TaskStatus::Completed).count() as u64;
            let blocked_count = agent_tasks.iter().filter(|t| t.status == TaskStatus::Blocked).count() as u64;
            out.push(ActiveAgent {
                agent_name,
                status,
                task_count: agent_tasks.len() as u64,
                completed_count,
                blocked_count,
            });
        }
        out.sort_by(|a, b| a.agent_name.cmp(&b.agent_name));
        Ok(out)
    }

    /// **TaskQueue** (spec §4.4): pending tasks ranked by priority score,
    /// ties broken by `createdAt` ascending.
    pub async fn task_queue(&self) -> Result<Vec<TaskQueueEntry>> {
        let now = self.clock.now();
        let tasks = self.all_tasks().await?;
        let mut entries: Vec<(CortexId, f64, DateTime<Utc>)> = Vec::new();
        for task in &tasks {
            if task.status != TaskStatus::Pending {
                continue;
            }
            entries.push((task.id, priority_score(task, now), task.created_at));
        }
        entries.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.2.cmp(&b.2))
        });
        Ok(entries
            .into_iter()
            .map(|(task_id, priority_score, _)| TaskQueueEntry { task_id, priority_score })
            .collect())
    }

    /// **Dependencies** (spec §4.4): UUID references inside `notes` and
    /// `priorWorkSummary` become `blockedBy` edges; `blocks` is the reverse
    /// adjacency. No transitive closure.
    pub async fn dependencies(&self) -> Result<Vec<DependencyEdges>> {
        let tasks = self.all_tasks().await?;
        let known_ids: std::collections::HashSet<CortexId> = tasks.iter().map(|t| t.id).collect();

        let mut blocked_by: HashMap<CortexId, Vec<CortexId>> = HashMap::new();
        for task in &tasks {
            let mut refs = Vec::new();
            for haystack in [task.notes.as_deref(), Some(task.prior_work_summary.as_str())] {
                let Some(text) = haystack else { continue };
                for m in uuid_regex().find_iter(text) {
                    if let Ok(id) = m.as_str().parse::<CortexId>() {
                        if known_ids.contains(&id) && id != task.id && !refs.contains(&id) {
                            refs.push(id);
                        }
                    }
                }
            }
            blocked_by.insert(task.id, refs);
        }

        let mut blocks: HashMap<CortexId, Vec<CortexId>> = HashMap::new();
        for (task_id, refs) in &blocked_by {
            for blocker in refs {
                blocks.entry(*blocker).or_default().push(*task_id);
            }
        }

        Ok(tasks
            .iter()
            .map(|t| DependencyEdges {
                task_id: t.id,
                blocked_by: blocked_by.get(&t.id).cloned().unwrap_or_default(),
                blocks: blocks.get(&t.id).cloned().unwrap_or_default(),
            })
            .collect())
    }

    /// **SquadVelocity** (spec §4.4): per-agent completion counts over
    /// today/week/all-time windows, plus average Todo duration.
    pub async fn squad_velocity(&self) -> Result<Vec<SquadVelocity>> {
        let now = self.clock.now();
        let today_start = now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
        let week_start = now - Duration::days(7);

        let tasks = self.all_tasks().await?;
        let mut by_agent: HashMap<String, Vec<&AgentTask>> = HashMap::new();
        for task in &tasks {
            by_agent.entry(task.agent_name.clone()).or_default().push(task);
        }

        let mut out = Vec::new();
        for (agent_name, agent_tasks) in by_agent {
            let today = window_stats(&agent_tasks, today_start, now);
            let week = window_stats(&agent_tasks, week_start, now);
            let epoch = DateTime::<Utc>::from_timestamp(0, 0).expect("epoch is a valid instant");
            let all_time = window_stats(&agent_tasks, epoch, now);

            let mut durations = Vec::new();
            for task in &agent_tasks {
                for todo in &task.todos {
                    if todo.status == TodoStatus::Completed {
                        if let Some(completed_at) = todo.completed_at {
                            durations.push((completed_at - todo.created_at).num_seconds() as f64);
                        }
                    }
                }
            }
            let avg_todo_duration_secs = if durations.is_empty() {
                0.0
            } else {
                durations.iter().sum::<f64>() / durations.len() as f64
            };

            out.push(SquadVelocity { agent_name, today, week, all_time, avg_todo_duration_secs });
        }
        out.sort_by(|a, b| a.agent_name.cmp(&b.agent_name));
        Ok(out)
    }

    /// **ContextEfficiency** (spec §4.4): a single blended score plus
    /// per-squad stats and short time series.
    pub async fn context_efficiency(&self) -> Result<ContextEfficiency> {
        let now = self.clock.now();
        let tasks = self.all_tasks().await?;

        let completed: Vec<&AgentTask> = tasks.iter().filter(|t| t.status == TaskStatus::Completed).collect();
        let completion_rate = if tasks.is_empty() { 0.0 } else { completed.len() as f64 / tasks.len() as f64 * 100.0 };

        let mut durations_hours = Vec::new();
        for task in &completed {
            durations_hours.push((task.updated_at - task.created_at).num_minutes() as f64 / 60.0);
        }
        let avg_hours = if durations_hours.is_empty() {
            0.0
        } else {
            durations_hours.iter().sum::<f64>() / durations_hours.len() as f64
        };
        let speed_score = (100.0 - ((avg_hours - 2.0) / 22.0) * 100.0).max(0.0);

        let span_days = (now - earliest_created(&tasks).unwrap_or(now)).num_days().max(1) as f64;
        let tasks_per_day = completed.len() as f64 / span_days;
        let throughput_score = (tasks_per_day * 10.0).min(100.0);

        let overall_score = 0.4 * completion_rate + 0.3 * speed_score + 0.3 * throughput_score;

        let mut by_agent: HashMap<String, Vec<&AgentTask>> = HashMap::new();
        for task in &tasks {
            by_agent.entry(task.agent_name.clone()).or_default().push(task);
        }
        let mut per_squad = Vec::new();
        for (agent_name, agent_tasks) in &by_agent {
            let agent_completed: Vec<&&AgentTask> = agent_tasks.iter().filter(|t| t.status == TaskStatus::Completed).collect();
            let rate = if agent_tasks.is_empty() { 0.0 } else { agent_completed.len() as f64 / agent_tasks.len() as f64 * 100.0 };
            let hours: Vec<f64> = agent_completed
                .iter()
                .map(|t| (t.updated_at - t.created_at).num_minutes() as f64 / 60.0)
                .collect();
            let avg = if hours.is_empty() { 0.0 } else { hours.iter().sum::<f64>() / hours.len() as f64 };
            let squad_speed = (100.0 - ((avg - 2.0) / 22.0) * 100.0).max(0.0);
            per_squad.push(SquadContextStats {
                agent_name: agent_name.clone(),
                completion_rate: rate,
                avg_hours: avg,
                score: 0.4 * rate + 0.6 * squad_speed,
            });
        }
        per_squad.sort_by(|a, b| a.agent_name.cmp(&b.agent_name));

        let daily_series = (0..7)
            .rev()
            .map(|days_ago| {
                let day_start = (now - Duration::days(days_ago)).date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
                let day_end = day_start + Duration::days(1);
                let count = completed
                    .iter()
                    .filter(|t| t.updated_at >= day_start && t.updated_at < day_end)
                    .count() as u64;
                DailyPoint { date: day_start, completed_count: count }
            })
            .collect();

        let weekly_series = (0..4)
            .rev()
            .map(|weeks_ago| {
                let week_start = now - Duration::weeks(weeks_ago) - Duration::days(6);
                let week_end = week_start + Duration::weeks(1);
                let count = completed
                    .iter()
                    .filter(|t| t.updated_at >= week_start && t.updated_at < week_end)
                    .count() as u64;
                WeeklyPoint { week_start, completed_count: count }
            })
            .collect();

        let mut complexity_histogram = ComplexityHistogram::default();
        for task in &tasks {
            match task.todos.len() {
                1..=3 => complexity_histogram.low += 1,
                4..=5 => complexity_histogram.medium += 1,
                6..=7 => complexity_histogram.high += 1,
                n if n >= 8 => complexity_histogram.very_high += 1,
                _ => {}
            }
        }

        Ok(ContextEfficiency {
            overall_score,
            per_squad,
            daily_series,
            weekly_series,
            complexity_histogram,
        })
    }
}

fn priority_score(task: &AgentTask, now: DateTime<Utc>) -> f64 {
    let todo_count = task.todos.len() as f64;
    let has_context = !task.context_summary.is_empty();
    let has_files = !task.files_modified.is_empty();
    let has_prior_work = !task.prior_work_summary.is_empty();
    let age_days = (now - task.created_at).num_days().max(0) as f64;

    10.0 * todo_count
        + if has_context { 50.0 } else { 0.0 }
        + if has_files { 30.0 } else { 0.0 }
        + if has_prior_work { 40.0 } else { 0.0 }
        + 5.0 * age_days.floor()
}

fn window_stats(tasks: &[&AgentTask], start: DateTime<Utc>, end: DateTime<Utc>) -> VelocityWindow {
    let in_window: Vec<&&AgentTask> = tasks.iter().filter(|t| t.updated_at >= start && t.updated_at <= end).collect();
    let completed_count = in_window.iter().filter(|t| t.status == TaskStatus::Completed).count() as u64;
    let total_count = in_window.len() as u64;
    let completion_rate = if total_count == 0 { 0.0 } else { completed_count as f64 / total_count as f64 * 100.0 };
    VelocityWindow { completed_count, total_count, completion_rate }
}

fn earliest_created(tasks: &[AgentTask]) -> Option<DateTime<Utc>> {
    tasks.iter().map(|t| t.created_at).min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::{CortexId, FixedClock, Todo};
    use cortex_storage::InMemoryStore;

    fn task(agent: &str, status: TaskStatus, human_id: CortexId, now: DateTime<Utc>) -> AgentTask {
        let mut t = AgentTask::new(human_id, agent.into(), "role".into(), vec![Todo::new("a".into(), now)], String::new(), vec![], vec![], String::new(), now);
        t.status = status;
        t
    }

    async fn seeded_metrics(tasks: Vec<AgentTask>, now: DateTime<Utc>) -> WorkflowMetrics {
        let store = InMemoryStore::new();
        let collection: Collection<AgentTask> = Collection::new(store.clone(), "agent_tasks");
        for t in &tasks {
            collection.insert(&t.id.to_string(), t).await.unwrap();
        }
        WorkflowMetrics::new(store, Arc::new(FixedClock::new(now)))
    }

    #[tokio::test]
    async fn active_agents_classifies_by_most_recent_task() {
        let now = Utc::now();
        let human = CortexId::new();
        let t = task("go-dev", TaskStatus::InProgress, human, now);
        let metrics = seeded_metrics(vec![t], now).await;
        let agents = metrics.active_agents().await.unwrap();
        assert_eq!(agents.len(), 1);
        assert!(matches!(agents[0].status, AgentActivityStatus::Working));
    }

    #[tokio::test]
    async fn task_queue_only_includes_pending_tasks() {
        let now = Utc::now();
        let human = CortexId::new();
        let pending = task("a", TaskStatus::Pending, human, now);
        let done = task("a", TaskStatus::Completed, human, now);
        let metrics = seeded_metrics(vec![pending.clone(), done], now).await;
        let queue = metrics.task_queue().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].task_id, pending.id);
    }

    #[tokio::test]
    async fn dependencies_extracts_uuid_references_from_notes() {
        let now = Utc::now();
        let human = CortexId::new();
        let mut blocker = task("a", TaskStatus::Pending, human, now);
        let mut blocked = task("a", TaskStatus::Pending, human, now);
        blocked.notes = Some(format!("waiting on {}", blocker.id));
        blocker.notes = None;

        let metrics = seeded_metrics(vec![blocker.clone(), blocked.clone()], now).await;
        let edges = metrics.dependencies().await.unwrap();
        let blocked_edges = edges.iter().find(|e| e.task_id == blocked.id).unwrap();
        assert_eq!(blocked_edges.blocked_by, vec![blocker.id]);
        let blocker_edges = edges.iter().find(|e| e.task_id == blocker.id).unwrap();
        assert_eq!(blocker_edges.blocks, vec![blocked.id]);
    }

    #[tokio::test]
    async fn context_efficiency_handles_empty_task_set() {
        let now = Utc::now();
        let metrics = seeded_metrics(vec![], now).await;
        let efficiency = metrics.context_efficiency().await.unwrap();
        assert_eq!(efficiency.overall_score, 0.0);
        assert!(efficiency.daily_series.len() == 7);
    }
}
