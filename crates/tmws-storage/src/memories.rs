use chrono::{DateTime, Utc};
use rusqlite::Row;
use uuid::Uuid;

use tmws_core::{
    AccessLevel, MemoryFilter, MemoryId, MemoryPatch, MemoryRecord, Permission, Result,
    ScoredMemory, SetPatch, TmwsError,
};
use tmws_embedding::{cosine_similarity, embedding_from_bytes, embedding_to_bytes};

use crate::store::MemoryStore;

/// Ordering for non-semantic listings.
#[derive(Debug, Clone, Copy, Default)]
pub enum RecallOrder {
    #[default]
    UpdatedDesc,
    CreatedDesc,
    ImportanceDesc,
    AccessCountDesc,
}

impl RecallOrder {
    fn sql(&self) -> &'static str {
        match self {
            RecallOrder::UpdatedDesc => "updated_at DESC, id ASC",
            RecallOrder::CreatedDesc => "created_at DESC, id ASC",
            RecallOrder::ImportanceDesc => "importance DESC, updated_at DESC, id ASC",
            RecallOrder::AccessCountDesc => "access_count DESC, updated_at DESC, id ASC",
        }
    }
}

const MEMORY_COLUMNS: &str = "id, owner_agent_id, namespace, access_level, prior_access_level, \
     content, summary, source_url, embedding, tags, shared_with, context, importance, \
     parent_id, access_count, is_archived, created_at, updated_at, last_accessed_at";

impl MemoryStore {
    /// Insert a memory row, returning its id.
    pub fn insert_memory(&self, memory: &MemoryRecord) -> Result<MemoryId> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO memories (id, owner_agent_id, namespace, access_level, \
                 prior_access_level, content, summary, source_url, embedding, tags, \
                 shared_with, context, importance, parent_id, access_count, is_archived, \
                 created_at, updated_at, last_accessed_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
                rusqlite::params![
                    memory.id.to_string(),
                    memory.owner_agent_id,
                    memory.namespace,
                    memory.access_level.as_str(),
                    memory.prior_access_level.map(|l| l.as_str()),
                    memory.content,
                    memory.summary,
                    memory.source_url,
                    memory.embedding.as_deref().map(embedding_to_bytes),
                    serde_json::to_string(&memory.tags).unwrap_or_else(|_| "[]".into()),
                    shared_with_json(memory),
                    serde_json::to_string(&memory.context).unwrap_or_else(|_| "{}".into()),
                    memory.importance,
                    memory.parent_memory_id.map(|p| p.to_string()),
                    memory.access_count,
                    memory.is_archived as i64,
                    memory.created_at.to_rfc3339(),
                    memory.updated_at.to_rfc3339(),
                    memory.last_accessed_at.map(|t| t.to_rfc3339()),
                ],
            )?;
            Ok(())
        })?;
        Ok(memory.id)
    }

    /// Fetch one memory by id.
    pub fn get_memory(&self, id: MemoryId) -> Result<MemoryRecord> {
        let found = self.with_tx(|tx| {
            let mut stmt = tx.prepare(&format!(
                "SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"
            ))?;
            let mut rows = stmt.query_map([id.to_string()], row_to_memory)?;
            rows.next().transpose()
        })?;
        found.ok_or_else(|| TmwsError::NotFound(format!("memory {id}")))
    }

    /// Apply a patch: last-writer-wins on scalars, replace or diff on set
    /// fields. The read-modify-write runs in one transaction, so two
    /// concurrent updates serialize and the final row equals one of them.
    pub fn update_memory(&self, id: MemoryId, patch: &MemoryPatch) -> Result<MemoryRecord> {
        let updated = self.with_tx(|tx| {
            let mut stmt = tx.prepare(&format!(
                "SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"
            ))?;
            let mut rows = stmt.query_map([id.to_string()], row_to_memory)?;
            let Some(mut memory) = rows.next().transpose()? else {
                return Ok(None);
            };
            drop(rows);
            drop(stmt);

            apply_patch(&mut memory, patch);
            memory.updated_at = Utc::now();

            tx.execute(
                "UPDATE memories SET content = ?2, summary = ?3, source_url = ?4, \
                 embedding = COALESCE(?5, embedding), tags = ?6, access_level = ?7, \
                 importance = ?8, parent_id = ?9, updated_at = ?10 WHERE id = ?1",
                rusqlite::params![
                    id.to_string(),
                    memory.content,
                    memory.summary,
                    memory.source_url,
                    memory.embedding.as_deref().map(embedding_to_bytes),
                    serde_json::to_string(&memory.tags).unwrap_or_else(|_| "[]".into()),
                    memory.access_level.as_str(),
                    memory.importance,
                    memory.parent_memory_id.map(|p| p.to_string()),
                    memory.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(Some(memory))
        })?;
        updated.ok_or_else(|| TmwsError::NotFound(format!("memory {id}")))
    }

    /// Replace the share map, access level, and remembered prior level of
    /// a memory.
    pub fn update_memory_shares(
        &self,
        id: MemoryId,
        access_level: AccessLevel,
        prior_access_level: Option<AccessLevel>,
        shared_with: &std::collections::BTreeMap<String, Permission>,
    ) -> Result<MemoryRecord> {
        let json = serde_json::to_string(shared_with).unwrap_or_else(|_| "{}".into());
        let changed = self.with_tx(|tx| {
            let n = tx.execute(
                "UPDATE memories SET access_level = ?2, prior_access_level = ?3, \
                 shared_with = ?4, updated_at = ?5 WHERE id = ?1",
                rusqlite::params![
                    id.to_string(),
                    access_level.as_str(),
                    prior_access_level.map(|l| l.as_str()),
                    json,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(n)
        })?;
        if changed == 0 {
            return Err(TmwsError::NotFound(format!("memory {id}")));
        }
        self.get_memory(id)
    }

    /// Soft-delete: mark the row archived.
    pub fn archive_memory(&self, id: MemoryId) -> Result<()> {
        let changed = self.with_tx(|tx| {
            let n = tx.execute(
                "UPDATE memories SET is_archived = 1, updated_at = ?2 WHERE id = ?1",
                rusqlite::params![id.to_string(), Utc::now().to_rfc3339()],
            )?;
            Ok(n)
        })?;
        if changed == 0 {
            return Err(TmwsError::NotFound(format!("memory {id}")));
        }
        Ok(())
    }

    /// Hard-delete: remove the row, embedding included.
    pub fn delete_memory(&self, id: MemoryId) -> Result<()> {
        let changed = self.with_tx(|tx| {
            let n = tx.execute(
                "DELETE FROM memories WHERE id = ?1",
                [id.to_string()],
            )?;
            Ok(n)
        })?;
        if changed == 0 {
            return Err(TmwsError::NotFound(format!("memory {id}")));
        }
        Ok(())
    }

    /// Top-k cosine search among rows satisfying the filter.
    ///
    /// Ties break by `(importance DESC, updated_at DESC, id ASC)` under
    /// equal similarity, so a k-prefix is stable as k grows.
    pub fn search(
        &self,
        query_vec: &[f32],
        filter: &MemoryFilter,
        k: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredMemory>> {
        let candidates = self.fetch_filtered(filter)?;

        let mut scored: Vec<ScoredMemory> = candidates
            .into_iter()
            .filter_map(|memory| {
                let embedding = memory.embedding.as_deref()?;
                let similarity = cosine_similarity(query_vec, embedding);
                if similarity >= min_similarity {
                    Some(ScoredMemory { memory, similarity })
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.memory
                        .importance
                        .partial_cmp(&a.memory.importance)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| b.memory.updated_at.cmp(&a.memory.updated_at))
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Non-semantic paged listing.
    pub fn recall(
        &self,
        filter: &MemoryFilter,
        order: RecallOrder,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let mut rows = self.fetch_filtered_ordered(filter, order.sql())?;
        let rows = rows.split_off(rows.len().min(offset));
        Ok(rows.into_iter().take(limit).collect())
    }

    /// Record a read: bump `access_count` and `last_accessed_at` without
    /// touching `updated_at`.
    pub fn bump_access(&self, id: MemoryId) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute(
                "UPDATE memories SET access_count = access_count + 1, last_accessed_at = ?2 \
                 WHERE id = ?1",
                rusqlite::params![id.to_string(), Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    /// Number of non-archived memories owned by an agent.
    pub fn count_memories(&self, owner_agent_id: &str) -> Result<i64> {
        self.with_tx(|tx| {
            tx.query_row(
                "SELECT COUNT(*) FROM memories WHERE owner_agent_id = ?1 AND is_archived = 0",
                [owner_agent_id],
                |r| r.get(0),
            )
        })
    }

    fn fetch_filtered(&self, filter: &MemoryFilter) -> Result<Vec<MemoryRecord>> {
        self.fetch_filtered_ordered(filter, "updated_at DESC, id ASC")
    }

    fn fetch_filtered_ordered(
        &self,
        filter: &MemoryFilter,
        order_sql: &str,
    ) -> Result<Vec<MemoryRecord>> {
        let mut conditions: Vec<String> = Vec::new();
        let mut binds: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if !filter.include_archived {
            conditions.push("is_archived = 0".to_string());
        }
        if let Some(ref owner) = filter.owner_agent_id {
            binds.push(Box::new(owner.clone()));
            conditions.push(format!("owner_agent_id = ?{}", binds.len()));
        }
        if let Some(ref namespace) = filter.namespace {
            binds.push(Box::new(namespace.clone()));
            conditions.push(format!("namespace = ?{}", binds.len()));
        }
        if let Some(ref levels) = filter.access_levels {
            let placeholders: Vec<String> = levels
                .iter()
                .map(|level| {
                    binds.push(Box::new(level.as_str().to_string()));
                    format!("?{}", binds.len())
                })
                .collect();
            conditions.push(format!("access_level IN ({})", placeholders.join(", ")));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql =
            format!("SELECT {MEMORY_COLUMNS} FROM memories {where_clause} ORDER BY {order_sql}");

        let rows = self.with_tx(|tx| {
            let mut stmt = tx.prepare(&sql)?;
            let refs: Vec<&dyn rusqlite::types::ToSql> =
                binds.iter().map(|b| b.as_ref()).collect();
            let rows = stmt
                .query_map(refs.as_slice(), row_to_memory)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        // Tag-subset filtering happens here; tags live in a JSON column.
        let rows = match &filter.tags {
            Some(required) if !required.is_empty() => rows
                .into_iter()
                .filter(|m| required.iter().all(|t| m.tags.contains(t)))
                .collect(),
            _ => rows,
        };
        Ok(rows)
    }
}

fn shared_with_json(memory: &MemoryRecord) -> String {
    serde_json::to_string(&memory.shared_with).unwrap_or_else(|_| "{}".into())
}

fn apply_patch(memory: &mut MemoryRecord, patch: &MemoryPatch) {
    if let Some(ref content) = patch.content {
        memory.content = content.clone();
    }
    if let Some(ref summary) = patch.summary {
        memory.summary = Some(summary.clone());
    }
    if let Some(ref url) = patch.source_url {
        memory.source_url = Some(url.clone());
    }
    if let Some(importance) = patch.importance {
        memory.importance = importance;
    }
    if let Some(level) = patch.access_level {
        memory.access_level = level;
    }
    if let Some(parent) = patch.parent_memory_id {
        memory.parent_memory_id = parent;
    }
    if let Some(ref embedding) = patch.embedding {
        memory.embedding = Some(embedding.clone());
    }
    match &patch.tags {
        Some(SetPatch::Replace(tags)) => memory.tags = tags.clone(),
        Some(SetPatch::Diff { add, remove }) => {
            memory.tags.retain(|t| !remove.contains(t));
            for tag in add {
                if !memory.tags.contains(tag) {
                    memory.tags.push(tag.clone());
                }
            }
        }
        None => {}
    }
}

fn row_to_memory(row: &Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let id: String = row.get(0)?;
    let access_level: String = row.get(3)?;
    let prior_access_level: Option<String> = row.get(4)?;
    let embedding_blob: Option<Vec<u8>> = row.get(8)?;
    let tags_json: String = row.get(9)?;
    let shared_json: String = row.get(10)?;
    let context_json: String = row.get(11)?;
    let parent: Option<String> = row.get(13)?;
    let created_at: String = row.get(16)?;
    let updated_at: String = row.get(17)?;
    let last_accessed_at: Option<String> = row.get(18)?;

    Ok(MemoryRecord {
        id: parse_uuid(&id),
        owner_agent_id: row.get(1)?,
        namespace: row.get(2)?,
        access_level: AccessLevel::parse(&access_level).unwrap_or_default(),
        prior_access_level: prior_access_level.as_deref().and_then(AccessLevel::parse),
        content: row.get(5)?,
        summary: row.get(6)?,
        source_url: row.get(7)?,
        embedding: embedding_blob.map(|b| embedding_from_bytes(&b)),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        shared_with: serde_json::from_str(&shared_json).unwrap_or_default(),
        context: serde_json::from_str(&context_json).unwrap_or_default(),
        importance: row.get(12)?,
        parent_memory_id: parent.map(|p| parse_uuid(&p)),
        access_count: row.get(14)?,
        is_archived: row.get::<_, i64>(15)? != 0,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
        last_accessed_at: last_accessed_at.map(|t| parse_ts(&t)),
    })
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_default()
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}
