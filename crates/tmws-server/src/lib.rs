//! # tmws-server
//!
//! The multi-client session layer: accepts connections over stdio,
//! WebSocket, or REST; maintains a per-session current-agent context; and
//! dispatches framed JSON tool calls to the memory service through a
//! static router.

pub mod auth;
pub mod http;
pub mod metrics;
pub mod router;
pub mod session;
pub mod state;
pub mod stdio;
pub mod tools;
pub mod wire;

pub use http::{build_router, serve};
pub use router::{ToolRouter, REQUEST_DEADLINE};
pub use session::{Session, SessionManager, IDLE_TIMEOUT};
pub use state::{ServerState, DEFAULT_AGENT_ID};
pub use stdio::run_stdio;
