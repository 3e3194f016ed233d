//! Core types and abstractions shared across the agent-coordination service:
//! the closed error taxonomy, identifiers, the injectable clock, flat
//! configuration, and the domain model (tasks, knowledge, code index).

pub mod clock;
pub mod config;
pub mod error;
pub mod id;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::GlobalConfig;
pub use error::{CortexError, Result};
pub use id::CortexId;
pub use types::*;

pub mod prelude {
    pub use crate::clock::{Clock, FixedClock, SystemClock};
    pub use crate::config::GlobalConfig;
    pub use crate::error::{CortexError, Result};
    pub use crate::id::CortexId;
    pub use crate::types::*;
}
