//! Frame handling shared by the stdio and WebSocket transports:
//! newline-delimited (or message-delimited) JSON, 1 MiB cap, request
//! envelope in, response envelope out.

use std::sync::Arc;

use tokio::sync::Mutex as TokioMutex;

use tmws_core::{TmwsError, WireRequest, WireResponse, MAX_FRAME_BYTES};

use crate::session::Session;
use crate::state::ServerState;

/// Parse one frame and run it through the router. Malformed frames get a
/// validation error with `id: 0` since no request id could be read.
pub async fn handle_frame(
    state: &Arc<ServerState>,
    session: &Arc<TokioMutex<Session>>,
    raw: &str,
) -> WireResponse {
    if raw.len() > MAX_FRAME_BYTES {
        return WireResponse::fail(
            0,
            &TmwsError::Validation(format!("frame exceeds {MAX_FRAME_BYTES} bytes")),
        );
    }
    match serde_json::from_str::<WireRequest>(raw) {
        Ok(request) => {
            state
                .router
                .dispatch(Arc::clone(state), Arc::clone(session), request)
                .await
        }
        Err(e) => WireResponse::fail(0, &TmwsError::Validation(format!("malformed frame: {e}"))),
    }
}
