//! The stdio JSON-RPC tool server (spec §1 "invoked over a JSON-RPC tool
//! protocol on a stdio channel"). Speaks the same `tools/list` +
//! `tools/call` shape MCP clients expect; every tool name is one of the
//! named operations in `cortex_engine::OperationDispatcher` (spec §6.2).

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::app::CortexApp;
use crate::mcp::transport::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, StdioTransport};

/// `(name, description)` for every operation the dispatcher accepts (spec
/// §6.2). Argument schemas are validated by the dispatcher itself; this
/// list exists only to answer `tools/list`.
pub const OPERATIONS: &[(&str, &str)] = &[
    ("create_human_task", "Create a new human task from a prompt"),
    ("create_agent_task", "Create an agent task with TODOs under a human task"),
    ("get_agent_task", "Fetch a single agent task by id, untruncated"),
    ("get_task_history", "Bounded status-transition history for an agent task"),
    ("list_human_tasks", "List all human tasks"),
    ("list_agent_tasks", "Paginated, optionally-filtered agent task listing"),
    ("update_task_status", "Update a human or agent task's status"),
    ("update_todo_status", "Update a TODO's status, may cascade-complete its agent task"),
    ("clear_task_board", "Delete all tasks; requires confirm=true"),
    ("add_task_prompt_notes", "Attach prompt notes to an agent task"),
    ("update_task_prompt_notes", "Replace an agent task's prompt notes"),
    ("clear_task_prompt_notes", "Clear an agent task's prompt notes"),
    ("add_todo_prompt_notes", "Attach prompt notes to a TODO"),
    ("update_todo_prompt_notes", "Replace a TODO's prompt notes"),
    ("clear_todo_prompt_notes", "Clear a TODO's prompt notes"),
    ("upsert_knowledge", "Write a knowledge entry, embedding it if possible"),
    ("delete_knowledge_entry", "Remove a knowledge entry from DocStore and, best-effort, its vector"),
    ("query_knowledge", "Search a knowledge collection"),
    ("get_popular_collections", "Collections ranked by entry count"),
    ("list_collections", "Merge the well-known collection directory with observed collections"),
    ("recent_learnings", "Knowledge entries created in the last 24h, grouped by collection"),
    ("code_index_add_folder", "Register a folder for code indexing"),
    ("code_index_remove_folder", "Unregister a folder and delete its index data"),
    ("code_index_scan", "Scan a registered folder for new/changed/deleted files"),
    ("code_index_status", "Fetch one or all registered folders"),
    ("code_search", "Semantic search over the code index"),
    ("squad_velocity", "Per-agent completed-task counts over today/week/all-time"),
    ("context_efficiency", "Completion-rate/speed/throughput composite score"),
    ("active_agents", "Per-agent working/blocked/idle status"),
    ("task_queue", "Pending tasks ranked by priority score"),
    ("task_dependencies", "Task id cross-references found in notes"),
];

/// Runs the stdio JSON-RPC loop until stdin closes. Recognises three
/// methods: `initialize` (handshake), `tools/list`, and `tools/call`
/// (`{name, arguments}` -> dispatched to `OperationDispatcher::execute`).
/// Anything else is `method_not_found`.
pub async fn run_stdio(app: Arc<CortexApp>) -> anyhow::Result<()> {
    info!("starting stdio JSON-RPC server");
    let mut transport = StdioTransport::new();

    while let Some(request) = transport.recv().await {
        let response = handle_request(&app, request).await;
        transport.send(response)?;
    }

    info!("stdin closed, stdio JSON-RPC server exiting");
    Ok(())
}

async fn handle_request(app: &CortexApp, request: JsonRpcRequest) -> JsonRpcResponse {
    debug!(method = %request.method, "handling JSON-RPC request");
    match request.method.as_str() {
        "initialize" => JsonRpcResponse::success(
            request.id,
            json!({
                "protocolVersion": "2024-11-05",
                "serverInfo": { "name": "cortex", "version": env!("CARGO_PKG_VERSION") },
                "capabilities": { "tools": {} },
            }),
        ),
        "tools/list" => {
            let tools: Vec<Value> = OPERATIONS
                .iter()
                .map(|(name, description)| json!({ "name": name, "description": description }))
                .collect();
            JsonRpcResponse::success(request.id, json!({ "tools": tools }))
        }
        "tools/call" => handle_tool_call(app, request).await,
        other => JsonRpcResponse::error(
            request.id,
            JsonRpcError::method_not_found(format!("unknown method '{other}'")),
        ),
    }
}

async fn handle_tool_call(app: &CortexApp, request: JsonRpcRequest) -> JsonRpcResponse {
    let params = request.params.unwrap_or(Value::Null);
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return JsonRpcResponse::error(
            request.id,
            JsonRpcError::invalid_params("'name' is required".to_string()),
        );
    };
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    match app.dispatcher.execute(name, arguments).await {
        Ok(result) => JsonRpcResponse::success(request.id, result),
        Err(err) => JsonRpcResponse::error(
            request.id,
            JsonRpcError::server_error(dispatch_error_code(&err.kind), err.message),
        ),
    }
}

/// Maps the closed `DispatchError::kind` taxonomy onto JSON-RPC error
/// codes in the implementation-defined server-error range.
fn dispatch_error_code(kind: &str) -> i32 {
    match kind {
        "InvalidArgument" => -32602,
        "NotFound" => -32001,
        "AlreadyExists" => -32002,
        "PreconditionFailed" => -32003,
        "Unavailable" => -32004,
        "Cancelled" => -32005,
        _ => -32000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::CortexApp;
    use cortex_core::GlobalConfig;

    async fn test_app() -> Arc<CortexApp> {
        let mut config = GlobalConfig::new();
        config.set("docstore.uri", "mem://");
        Arc::new(CortexApp::build(config).await.unwrap())
    }

    #[tokio::test]
    async fn tools_list_enumerates_every_operation() {
        let app = test_app().await;
        let req = JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(json!(1)),
            method: "tools/list".into(),
            params: None,
        };
        let resp = handle_request(&app, req).await;
        let tools = resp.result.unwrap()["tools"].as_array().unwrap().len();
        assert_eq!(tools, OPERATIONS.len());
    }

    #[tokio::test]
    async fn tools_call_dispatches_to_the_operation_dispatcher() {
        let app = test_app().await;
        let req = JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(json!(2)),
            method: "tools/call".into(),
            params: Some(json!({ "name": "create_human_task", "arguments": { "prompt": "hi" } })),
        };
        let resp = handle_request(&app, req).await;
        assert!(resp.error.is_none());
        assert_eq!(resp.result.unwrap()["status"], "pending");
    }

    #[tokio::test]
    async fn tools_call_surfaces_dispatch_errors_as_jsonrpc_errors() {
        let app = test_app().await;
        let req = JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(json!(3)),
            method: "tools/call".into(),
            params: Some(json!({ "name": "create_human_task", "arguments": {} })),
        };
        let resp = handle_request(&app, req).await;
        assert_eq!(resp.result, None);
        assert_eq!(resp.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let app = test_app().await;
        let req = JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(json!(4)),
            method: "nonexistent".into(),
            params: None,
        };
        let resp = handle_request(&app, req).await;
        assert_eq!(resp.error.unwrap().code, -32601);
    }
}
