//! # tmws-policy
//!
//! The policy engine evaluated on every read and write: access-control
//! decisions from agent identity, namespace, access level, ownership, and
//! share grants, plus per-agent rate limiting.

pub mod access;
pub mod ratelimit;

pub use access::{check_namespace_write, evaluate, Decision};
pub use ratelimit::{AgentRateLimiter, LimitKind, RateLimitConfig};
