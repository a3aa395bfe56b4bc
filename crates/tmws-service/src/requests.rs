//! Typed request parameters for the memory tools. The session layer
//! deserializes wire params into these; unknown fields are rejected at
//! the boundary.

use serde::Deserialize;

use tmws_core::{AccessLevel, MemoryId, Permission};

fn default_search_limit() -> usize {
    10
}

fn default_recall_limit() -> usize {
    100
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMemoryRequest {
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub importance: Option<f64>,
    pub access_level: Option<AccessLevel>,
    #[serde(default)]
    pub share_with: Vec<String>,
    /// Create on behalf of another agent (elevated principals only).
    pub as_agent: Option<String>,
    pub parent_memory_id: Option<MemoryId>,
    pub summary: Option<String>,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchMemoriesRequest {
    pub query: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    #[serde(default)]
    pub min_similarity: f32,
    #[serde(default = "default_true")]
    pub include_shared: bool,
    pub namespace: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub access_filter: Option<AccessLevel>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShareMemoryRequest {
    pub memory_id: MemoryId,
    #[serde(default)]
    pub grantees: Vec<String>,
    #[serde(default)]
    pub permission: Permission,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecallMemoriesRequest {
    pub agent_id: Option<String>,
    pub namespace: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_recall_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMemoryRequest {
    pub memory_id: MemoryId,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub source_url: Option<String>,
    pub importance: Option<f64>,
    pub access_level: Option<AccessLevel>,
    #[serde(default)]
    pub add_tags: Vec<String>,
    #[serde(default)]
    pub remove_tags: Vec<String>,
    /// Replaces the whole tag set when present; wins over add/remove.
    pub tags: Option<Vec<String>>,
    pub parent_memory_id: Option<Option<MemoryId>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteMemoryRequest {
    pub memory_id: MemoryId,
    /// Hard deletion removes the row and its embedding; admin only.
    #[serde(default)]
    pub hard: bool,
}
