//! stdio transport: one embedded client, one session per process.
//! Newline-delimited JSON frames on stdin/stdout.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use tmws_core::Result;

use crate::session::IDLE_TIMEOUT;
use crate::state::ServerState;
use crate::wire::handle_frame;

/// Serve a single session over stdin/stdout until EOF or idle timeout.
pub async fn run_stdio(state: Arc<ServerState>) -> Result<()> {
    let agent = state.session_agent(None)?;
    let session = state.sessions.open(&agent)?;
    let session_id = session.lock().await.id;
    info!(session = %session_id, agent = %agent, "stdio session started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = match tokio::time::timeout(IDLE_TIMEOUT, lines.next_line()).await {
            Err(_) => {
                info!(session = %session_id, "stdio session idle timeout");
                break;
            }
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => break,
            Ok(Err(e)) => {
                state.sessions.close(session_id);
                return Err(e.into());
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = handle_frame(&state, &session, &line).await;
        let mut out = serde_json::to_string(&response)?;
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
    }

    state.sessions.close(session_id);
    info!(session = %session_id, "stdio session ended");
    Ok(())
}
