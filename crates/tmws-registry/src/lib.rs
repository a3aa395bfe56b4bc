//! # tmws-registry
//!
//! Agent identity for TMWS: the immutable built-in Trinitas catalogue, a
//! mutable map of dynamically registered agents, and the per-session
//! current-agent context.

pub mod builtin;
pub mod context;
pub mod registry;

pub use builtin::{alias_to_id, builtin_by_id, is_builtin, ALIASES, TRINITAS_AGENTS};
pub use context::{AgentContext, SwitchEntry};
pub use registry::{AgentFilter, AgentRegistry, RegisterSpec, RegistryStatistics};
