//! Binary crate library surface: the composition root (`app`) plus the two
//! adapters that expose it — a stdio JSON-RPC tool server (`mcp`) and a
//! REST/HTTP surface (`rest`) — both calling the same
//! `cortex_engine::OperationDispatcher` (spec §9 "collapse into a single
//! service").

pub mod app;
pub mod mcp;
pub mod rest;

pub use app::CortexApp;
pub use cortex_core::GlobalConfig as Config;
