//! Stdio JSON-RPC tool transport (spec §1, out-of-scope collaborator) and
//! the server loop dispatching its requests to the core.

pub mod server;
pub mod transport;

pub use server::{run_stdio, OPERATIONS};
pub use transport::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, StdioTransport, SyncStdioTransport};
