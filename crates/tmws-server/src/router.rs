use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex as TokioMutex;
use tracing::error;

use tmws_core::{Result, TmwsError, WireRequest, WireResponse};

use crate::session::Session;
use crate::state::ServerState;
use crate::tools;

/// Per-request deadline; expiry surfaces `ErrTimeout`.
pub const REQUEST_DEADLINE: Duration = Duration::from_secs(30);

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// A tool handler: typed params in, JSON result out.
pub type ToolHandler = fn(Arc<ServerState>, Arc<TokioMutex<Session>>, Value) -> HandlerFuture;

/// Static name → handler table, populated once at startup. There is no
/// runtime registration surface.
pub struct ToolRouter {
    table: HashMap<&'static str, ToolHandler>,
}

impl Default for ToolRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRouter {
    pub fn new() -> Self {
        Self {
            table: tools::table(),
        }
    }

    pub fn get(&self, name: &str) -> Option<ToolHandler> {
        self.table.get(name).copied()
    }

    pub fn tool_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.table.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Run one request to completion and build its response envelope.
    /// Callers drive requests of one session strictly in arrival order.
    pub async fn dispatch(
        &self,
        state: Arc<ServerState>,
        session: Arc<TokioMutex<Session>>,
        request: WireRequest,
    ) -> WireResponse {
        state.metrics.inc_tool_calls();
        session.lock().await.touch();

        let Some(handler) = self.get(&request.tool) else {
            state.metrics.inc_tool_errors();
            return WireResponse::fail(request.id, &TmwsError::UnknownTool(request.tool));
        };

        let params = if request.params.is_null() {
            Value::Object(Default::default())
        } else {
            request.params
        };

        match tokio::time::timeout(REQUEST_DEADLINE, handler(state.clone(), session, params)).await
        {
            Err(_) => {
                state.metrics.inc_timeouts();
                state.metrics.inc_tool_errors();
                WireResponse::fail(request.id, &TmwsError::Timeout)
            }
            Ok(Ok(result)) => WireResponse::ok(request.id, result),
            Ok(Err(e)) => {
                if e.wire_code() == "ErrInternal" {
                    // Full detail stays in the log; the wire gets a
                    // generic message.
                    error!(tool = %request.tool, error = %e, "internal error handling tool call");
                }
                if e.wire_code() == "ErrRateLimited" {
                    state.metrics.inc_rate_limit_rejections();
                }
                state.metrics.inc_tool_errors();
                WireResponse::fail(request.id, &e)
            }
        }
    }
}
