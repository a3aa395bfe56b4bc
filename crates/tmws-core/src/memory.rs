use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::types::{AccessLevel, MemoryId, Permission};

/// A unit of stored knowledge: text content plus an embedding and
/// access-control metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: MemoryId,
    pub content: String,
    /// Caller-provided abstract for long content.
    pub summary: Option<String>,
    pub source_url: Option<String>,
    pub owner_agent_id: String,
    /// Copied from the owner at creation; may diverge after sharing.
    pub namespace: String,
    pub access_level: AccessLevel,
    /// The level the memory had before it was shared; restored when the
    /// share list empties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior_access_level: Option<AccessLevel>,
    pub tags: Vec<String>,
    /// Share edges: grantee agent_id → permission. Non-empty iff
    /// `access_level == Shared`.
    #[serde(default)]
    pub shared_with: BTreeMap<String, Permission>,
    /// Free-form context metadata.
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
    pub importance: f64,
    pub parent_memory_id: Option<MemoryId>,
    pub access_count: i64,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// Not serialized on the wire; persisted as a BLOB.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl MemoryRecord {
    pub fn new(owner_agent_id: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            summary: None,
            source_url: None,
            owner_agent_id: owner_agent_id.into(),
            namespace: "default".to_string(),
            access_level: AccessLevel::Private,
            prior_access_level: None,
            tags: Vec::new(),
            shared_with: BTreeMap::new(),
            context: BTreeMap::new(),
            importance: 0.5,
            parent_memory_id: None,
            access_count: 0,
            is_archived: false,
            created_at: now,
            updated_at: now,
            last_accessed_at: None,
            embedding: None,
        }
    }

    /// The grant held by `agent_id`, if any.
    pub fn grant_for(&self, agent_id: &str) -> Option<Permission> {
        self.shared_with.get(agent_id).copied()
    }
}

/// A search hit: the memory plus its cosine similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredMemory {
    #[serde(flatten)]
    pub memory: MemoryRecord,
    pub similarity: f32,
}

/// How to modify a set-valued field in an update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetPatch<T> {
    /// Replace the whole set.
    Replace(Vec<T>),
    /// Apply element-wise additions and removals.
    Diff {
        #[serde(default)]
        add: Vec<T>,
        #[serde(default)]
        remove: Vec<T>,
    },
}

/// Partial update applied to a memory. Scalar fields are
/// last-writer-wins; set-valued fields go through [`SetPatch`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryPatch {
    pub content: Option<String>,
    pub summary: Option<String>,
    pub source_url: Option<String>,
    pub importance: Option<f64>,
    pub access_level: Option<AccessLevel>,
    pub tags: Option<SetPatch<String>>,
    pub parent_memory_id: Option<Option<MemoryId>>,
    /// New embedding when the content changed.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl MemoryPatch {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.summary.is_none()
            && self.source_url.is_none()
            && self.importance.is_none()
            && self.access_level.is_none()
            && self.tags.is_none()
            && self.parent_memory_id.is_none()
            && self.embedding.is_none()
    }
}

/// Filters for non-semantic listing and for narrowing a vector search.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    pub owner_agent_id: Option<String>,
    pub namespace: Option<String>,
    pub access_levels: Option<Vec<AccessLevel>>,
    /// Every listed tag must be present on the row.
    pub tags: Option<Vec<String>>,
    pub include_archived: bool,
}
