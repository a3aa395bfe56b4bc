//! # tmws-core
//!
//! Core types, errors, and wire protocol for the TMWS multi-agent memory
//! service. This crate defines the shared vocabulary used by every other
//! crate in the workspace.

pub mod agent;
pub mod error;
pub mod memory;
pub mod protocol;
pub mod types;

pub use agent::AgentRecord;
pub use error::{Result, TmwsError};
pub use memory::{MemoryFilter, MemoryPatch, MemoryRecord, ScoredMemory, SetPatch};
pub use protocol::{WireError, WireNotification, WireRequest, WireResponse};
pub use types::*;
