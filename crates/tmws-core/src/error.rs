use thiserror::Error;

/// Unified error type for the entire TMWS service.
///
/// Every variant maps to a stable wire code carried in the response
/// envelope as `error.code`.
#[derive(Error, Debug)]
pub enum TmwsError {
    // ── Caller errors ──────────────────────────────────────────
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("access denied: {0}")]
    Permission(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("not found: {0}")]
    NotFound(String),

    // ── Registry errors ────────────────────────────────────────
    #[error("name conflict: {0}")]
    NameConflict(String),

    #[error("duplicate agent id: {0}")]
    DuplicateId(String),

    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    // ── Infrastructure errors ──────────────────────────────────
    #[error("embedder unavailable: {0}")]
    Embedder(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("deadline exceeded")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl TmwsError {
    /// Stable identifier carried on the wire as `error.code`.
    pub fn wire_code(&self) -> &'static str {
        match self {
            TmwsError::Validation(_) => "ErrValidation",
            TmwsError::Permission(_) => "ErrPermission",
            TmwsError::RateLimited { .. } => "ErrRateLimited",
            TmwsError::NotFound(_) => "ErrNotFound",
            TmwsError::NameConflict(_) => "ErrNameConflict",
            TmwsError::DuplicateId(_) => "ErrDuplicateId",
            TmwsError::UnknownAgent(_) => "ErrUnknownAgent",
            TmwsError::UnknownTool(_) => "ErrUnknownTool",
            TmwsError::Embedder(_) => "ErrEmbedder",
            TmwsError::Storage(_) => "ErrStorage",
            TmwsError::Timeout => "ErrTimeout",
            TmwsError::Internal(_)
            | TmwsError::Io(_)
            | TmwsError::Serialization(_)
            | TmwsError::Other(_) => "ErrInternal",
        }
    }

    /// Back-off hint for rate-limited callers.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            TmwsError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Message safe to put on the wire. Internal errors are replaced with
    /// a generic message; details stay in the server log only.
    pub fn wire_message(&self) -> String {
        match self {
            TmwsError::Internal(_)
            | TmwsError::Io(_)
            | TmwsError::Serialization(_)
            | TmwsError::Other(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TmwsError>;
