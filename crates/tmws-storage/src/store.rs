use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, Transaction};
use tracing::{info, warn};

use tmws_core::{Result, TmwsError};

/// How many times a transient `SQLITE_BUSY` is retried before surfacing
/// `ErrStorage`.
const BUSY_RETRIES: u32 = 3;

/// Base delay for the exponential busy backoff.
const BUSY_BACKOFF: Duration = Duration::from_millis(25);

/// The storage layer. Owns the single serialized connection; every public
/// operation runs inside one database transaction.
#[derive(Clone)]
pub struct MemoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl MemoryStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        info!(?path, "opening memory store");

        let conn = Connection::open(path)
            .map_err(|e| TmwsError::Storage(format!("failed to open database: {e}")))?;

        // WAL mode for concurrent readers
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")
            .map_err(storage_err)?;

        conn.execute_batch(SCHEMA).map_err(storage_err)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    /// Run `f` inside one transaction, retrying the whole unit of work on
    /// transient busy errors. This is the unit-of-work seam callers use to
    /// compose multi-step mutations atomically.
    pub fn with_tx<T>(&self, f: impl Fn(&Transaction) -> rusqlite::Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            let mut conn = self.conn.lock();
            let result = conn
                .transaction()
                .and_then(|tx| {
                    let value = f(&tx)?;
                    tx.commit()?;
                    Ok(value)
                });
            drop(conn);

            match result {
                Ok(value) => return Ok(value),
                Err(e) if is_busy(&e) && attempt < BUSY_RETRIES => {
                    attempt += 1;
                    let delay = BUSY_BACKOFF * 2u32.pow(attempt - 1);
                    warn!(attempt, ?delay, "database busy, retrying transaction");
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(storage_err(e)),
            }
        }
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
    )
}

pub(crate) fn storage_err(e: rusqlite::Error) -> TmwsError {
    TmwsError::Storage(e.to_string())
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS agents (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    agent_type TEXT NOT NULL DEFAULT 'custom_agent',
    namespace TEXT NOT NULL DEFAULT 'default',
    capabilities TEXT NOT NULL DEFAULT '{}',
    config TEXT NOT NULL DEFAULT '{}',
    access_level TEXT NOT NULL DEFAULT 'standard',
    is_active INTEGER NOT NULL DEFAULT 1,
    memory_count INTEGER NOT NULL DEFAULT 0,
    last_activity TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_agents_ns_id ON agents(namespace, agent_id);

CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    owner_agent_id TEXT NOT NULL,
    namespace TEXT NOT NULL DEFAULT 'default',
    access_level TEXT NOT NULL DEFAULT 'private',
    prior_access_level TEXT,
    content TEXT NOT NULL,
    summary TEXT,
    source_url TEXT,
    embedding BLOB,
    tags TEXT NOT NULL DEFAULT '[]',
    shared_with TEXT NOT NULL DEFAULT '{}',
    context TEXT NOT NULL DEFAULT '{}',
    importance REAL NOT NULL DEFAULT 0.5,
    parent_id TEXT REFERENCES memories(id),
    access_count INTEGER NOT NULL DEFAULT 0,
    is_archived INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_accessed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_memories_owner ON memories(owner_agent_id, is_archived);
CREATE INDEX IF NOT EXISTS idx_memories_ns_access ON memories(namespace, access_level);
";
