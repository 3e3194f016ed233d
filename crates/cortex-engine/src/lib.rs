//! The coordination engine (spec §2): TaskEngine, KnowledgeEngine,
//! CodeIndexer, WorkflowMetrics, and the OperationDispatcher that sits in
//! front of all four. Every engine here is reentrant and holds no mutable
//! state beyond what its backing DocStore/VectorStore/Embedder own — the
//! one exception is TaskEngine's per-task lock map, which stands in for a
//! DocStore compare-and-swap primitive (spec §5).

pub mod code_indexer;
pub mod dispatcher;
pub mod knowledge_engine;
pub mod metrics;
pub mod task_engine;
pub mod watch_pipeline;

pub use code_indexer::{
    CodeIndexer, CodeIndexerConfig, CodeSearchFilters, CodeSearchHit, ScanSummary, SearchMode,
};
pub use dispatcher::{DispatchError, DispatchResult, OperationDispatcher};
pub use knowledge_engine::{CollectionDirectoryEntry, KnowledgeEngine, KnowledgeHit};
pub use metrics::{
    ActiveAgent, AgentActivityStatus, ComplexityHistogram, ContextEfficiency, DailyPoint,
    DependencyEdges, SquadContextStats, SquadVelocity, TaskQueueEntry, VelocityWindow,
    WeeklyPoint, WorkflowMetrics,
};
pub use task_engine::{
    ClearAllTasksResult, ListAgentTasksQuery, NewAgentTask, Page, TaskEngine, MAX_LIST_LIMIT,
};
pub use watch_pipeline::CodeWatchPipeline;

pub mod prelude {
    pub use crate::code_indexer::{
        CodeIndexer, CodeIndexerConfig, CodeSearchFilters, CodeSearchHit, ScanSummary, SearchMode,
    };
    pub use crate::dispatcher::{DispatchError, DispatchResult, OperationDispatcher};
    pub use crate::knowledge_engine::{CollectionDirectoryEntry, KnowledgeEngine, KnowledgeHit};
    pub use crate::metrics::{
        ActiveAgent, AgentActivityStatus, ComplexityHistogram, ContextEfficiency, DailyPoint,
        DependencyEdges, SquadContextStats, SquadVelocity, TaskQueueEntry, VelocityWindow,
        WeeklyPoint, WorkflowMetrics,
    };
    pub use crate::task_engine::{
        ClearAllTasksResult, ListAgentTasksQuery, NewAgentTask, Page, TaskEngine, MAX_LIST_LIMIT,
    };
    pub use crate::watch_pipeline::CodeWatchPipeline;
}
