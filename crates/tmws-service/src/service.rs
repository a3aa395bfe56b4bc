use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use tmws_core::{
    AccessLevel, AgentRecord, MemoryFilter, MemoryId, MemoryPatch, MemoryRecord, Operation,
    Permission, Result, ScoredMemory, SetPatch, TmwsError, TrustLevel, PARENT_WALK_LIMIT,
};
use tmws_embedding::EmbeddingGateway;
use tmws_policy::{check_namespace_write, evaluate, AgentRateLimiter, LimitKind};
use tmws_registry::AgentRegistry;
use tmws_storage::{MemoryStore, RecallOrder};

use crate::requests::{
    CreateMemoryRequest, DeleteMemoryRequest, RecallMemoriesRequest, SearchMemoriesRequest,
    ShareMemoryRequest, UpdateMemoryRequest,
};

/// How many candidates the vector search fetches before access-control
/// filtering trims the page. Oversampling keeps the post-filtered page
/// full without scanning unbounded rows.
const SEARCH_OVERSAMPLE: usize = 8;
const SEARCH_FETCH_CAP: usize = 1024;

/// The façade used by the tool handlers. Orchestrates
/// validate → embed → store under policy and rate limits.
pub struct MemoryService {
    store: MemoryStore,
    gateway: Arc<EmbeddingGateway>,
    registry: Arc<AgentRegistry>,
    limiter: AgentRateLimiter,
}

impl MemoryService {
    pub fn new(
        store: MemoryStore,
        gateway: Arc<EmbeddingGateway>,
        registry: Arc<AgentRegistry>,
        limiter: AgentRateLimiter,
    ) -> Self {
        Self {
            store,
            gateway,
            registry,
            limiter,
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Store a new memory owned by the principal (or by `as_agent` when
    /// the principal is trusted to act on its behalf).
    pub async fn create_memory(
        &self,
        principal: &AgentRecord,
        req: CreateMemoryRequest,
    ) -> Result<MemoryRecord> {
        self.limiter.check(&principal.agent_id, LimitKind::Request)?;
        let owner = self.effective_principal(principal, req.as_agent.as_deref())?;

        tmws_validate::validate_content(&req.content)?;
        let tags = tmws_validate::sanitize_tags(&req.tags)?;
        let importance = req.importance.unwrap_or(0.5);
        tmws_validate::validate_importance(importance)?;
        let access_level = req.access_level.unwrap_or_default();

        // shared_with is non-empty exactly when the level is `shared`.
        if access_level == AccessLevel::Shared && req.share_with.is_empty() {
            return Err(TmwsError::Validation(
                "shared memories need at least one grantee".into(),
            ));
        }
        if access_level != AccessLevel::Shared && !req.share_with.is_empty() {
            return Err(TmwsError::Validation(format!(
                "share_with requires access_level=shared, not {}",
                access_level.as_str()
            )));
        }

        let mut shared_with = BTreeMap::new();
        for grantee in &req.share_with {
            tmws_validate::validate_agent_id(grantee)?;
            let agent = self.registry.resolve(grantee)?;
            if agent.agent_id != owner.agent_id {
                shared_with.insert(agent.agent_id, Permission::Read);
            }
        }
        if access_level == AccessLevel::Shared && shared_with.is_empty() {
            return Err(TmwsError::Validation(
                "no grantees besides the owner".into(),
            ));
        }

        check_namespace_write(principal, &owner.namespace).into_result()?;

        if let Some(parent_id) = req.parent_memory_id {
            // Walking the chain verifies the parent exists and is acyclic.
            self.walk_ancestors(parent_id)?;
        }

        self.limiter.check(&principal.agent_id, LimitKind::Write)?;
        let embedding = self.gateway.embed(&req.content).await?;

        let mut memory = MemoryRecord::new(owner.agent_id.clone(), req.content);
        memory.namespace = owner.namespace.clone();
        memory.access_level = access_level;
        memory.tags = tags;
        memory.importance = importance;
        memory.shared_with = shared_with;
        memory.parent_memory_id = req.parent_memory_id;
        memory.summary = req.summary;
        memory.source_url = req.source_url;
        memory.embedding = Some(embedding);

        self.store.insert_memory(&memory)?;
        self.store.adjust_memory_count(&owner.agent_id, 1)?;
        self.registry.touch(&owner.agent_id);
        info!(memory = %memory.id, owner = %owner.agent_id, "memory created");
        Ok(memory)
    }

    /// Semantic search over everything the principal may read.
    pub async fn search_memories(
        &self,
        principal: &AgentRecord,
        req: SearchMemoriesRequest,
    ) -> Result<Vec<ScoredMemory>> {
        self.limiter.check(&principal.agent_id, LimitKind::Request)?;
        self.limiter.check(&principal.agent_id, LimitKind::Search)?;

        if req.query.trim().is_empty() {
            return Err(TmwsError::Validation("query must not be empty".into()));
        }
        if req.limit == 0 {
            return Ok(Vec::new());
        }
        if let Some(ref namespace) = req.namespace {
            tmws_validate::validate_namespace(namespace)?;
        }
        let tags = tmws_validate::sanitize_tags(&req.tags)?;

        let query_vec = self.gateway.embed(&req.query).await?;

        let filter = MemoryFilter {
            namespace: req.namespace.clone(),
            tags: if tags.is_empty() { None } else { Some(tags) },
            access_levels: req.access_filter.map(|level| vec![level]),
            ..Default::default()
        };
        let fetch_k = req
            .limit
            .saturating_mul(SEARCH_OVERSAMPLE)
            .min(SEARCH_FETCH_CAP)
            .max(req.limit);

        let candidates = self
            .store
            .search(&query_vec, &filter, fetch_k, req.min_similarity)?;

        // Defence in depth: re-check access on every row the index produced.
        let hits: Vec<ScoredMemory> = candidates
            .into_iter()
            .filter(|scored| {
                let memory = &scored.memory;
                if !evaluate(principal, Operation::Read, memory).is_allowed() {
                    return false;
                }
                if !req.include_shared
                    && memory.access_level == AccessLevel::Shared
                    && memory.owner_agent_id != principal.agent_id
                {
                    return false;
                }
                true
            })
            .take(req.limit)
            .collect();

        for scored in &hits {
            self.store.bump_access(scored.memory.id)?;
        }
        self.registry.touch(&principal.agent_id);
        debug!(agent = %principal.agent_id, hits = hits.len(), "search complete");
        Ok(hits)
    }

    /// Grant (or revoke, with an empty grantee list) access to a memory.
    pub fn share_memory(
        &self,
        principal: &AgentRecord,
        req: ShareMemoryRequest,
    ) -> Result<MemoryRecord> {
        self.limiter.check(&principal.agent_id, LimitKind::Request)?;
        self.limiter.check(&principal.agent_id, LimitKind::Write)?;

        let memory = self.store.get_memory(req.memory_id)?;
        if memory.owner_agent_id != principal.agent_id
            && principal.access_level < TrustLevel::Admin
        {
            return Err(TmwsError::Permission(
                "only the owner or an admin may change sharing".into(),
            ));
        }

        if req.grantees.is_empty() {
            // Unshare: restore the remembered pre-share level.
            let restored = memory.prior_access_level.unwrap_or(AccessLevel::Private);
            info!(memory = %memory.id, "sharing cleared");
            return self
                .store
                .update_memory_shares(memory.id, restored, None, &BTreeMap::new());
        }

        let mut grants = BTreeMap::new();
        for grantee in &req.grantees {
            tmws_validate::validate_agent_id(grantee)?;
            let agent = self.registry.resolve(grantee)?;
            if agent.agent_id != memory.owner_agent_id {
                grants.insert(agent.agent_id, req.permission);
            }
        }
        if grants.is_empty() {
            return Err(TmwsError::Validation(
                "no grantees besides the owner".into(),
            ));
        }

        let prior = if memory.access_level == AccessLevel::Shared {
            memory.prior_access_level
        } else {
            Some(memory.access_level)
        };
        info!(memory = %memory.id, grantees = grants.len(), "memory shared");
        self.store
            .update_memory_shares(memory.id, AccessLevel::Shared, prior, &grants)
    }

    /// Non-semantic paged listing of readable memories.
    pub fn recall(
        &self,
        principal: &AgentRecord,
        req: RecallMemoriesRequest,
    ) -> Result<Vec<MemoryRecord>> {
        self.limiter.check(&principal.agent_id, LimitKind::Request)?;

        if let Some(ref agent_id) = req.agent_id {
            tmws_validate::validate_agent_id(agent_id)?;
        }
        if let Some(ref namespace) = req.namespace {
            tmws_validate::validate_namespace(namespace)?;
        }
        let tags = tmws_validate::sanitize_tags(&req.tags)?;

        let filter = MemoryFilter {
            owner_agent_id: req.agent_id.clone(),
            namespace: req.namespace.clone(),
            tags: if tags.is_empty() { None } else { Some(tags) },
            ..Default::default()
        };
        let rows = self
            .store
            .recall(&filter, RecallOrder::UpdatedDesc, usize::MAX, 0)?;
        Ok(rows
            .into_iter()
            .filter(|memory| evaluate(principal, Operation::Read, memory).is_allowed())
            .skip(req.offset)
            .take(req.limit)
            .collect())
    }

    /// Fetch one memory, recording the access.
    pub fn get_memory(&self, principal: &AgentRecord, id: MemoryId) -> Result<MemoryRecord> {
        self.limiter.check(&principal.agent_id, LimitKind::Request)?;
        let mut memory = self.store.get_memory(id)?;
        evaluate(principal, Operation::Read, &memory).into_result()?;
        self.store.bump_access(id)?;
        memory.access_count += 1;
        Ok(memory)
    }

    /// Apply a partial update; the content embedding refreshes when the
    /// content changes.
    pub async fn update_memory(
        &self,
        principal: &AgentRecord,
        req: UpdateMemoryRequest,
    ) -> Result<MemoryRecord> {
        self.limiter.check(&principal.agent_id, LimitKind::Request)?;
        self.limiter.check(&principal.agent_id, LimitKind::Write)?;

        let memory = self.store.get_memory(req.memory_id)?;
        evaluate(principal, Operation::Write, &memory).into_result()?;

        let mut patch = MemoryPatch::default();

        if let Some(content) = req.content {
            tmws_validate::validate_content(&content)?;
            patch.embedding = Some(self.gateway.embed(&content).await?);
            patch.content = Some(content);
        }
        if let Some(importance) = req.importance {
            tmws_validate::validate_importance(importance)?;
            patch.importance = Some(importance);
        }
        patch.summary = req.summary;
        patch.source_url = req.source_url;

        if let Some(new_level) = req.access_level {
            // The share invariant is managed by share_memory; a plain
            // update may not break it.
            if new_level == AccessLevel::Shared && memory.shared_with.is_empty() {
                return Err(TmwsError::Validation(
                    "use share_memory to share a memory".into(),
                ));
            }
            if new_level != AccessLevel::Shared && !memory.shared_with.is_empty() {
                return Err(TmwsError::Validation(
                    "clear the share list before changing the access level".into(),
                ));
            }
            patch.access_level = Some(new_level);
        }

        if let Some(replacement) = req.tags {
            patch.tags = Some(SetPatch::Replace(tmws_validate::sanitize_tags(&replacement)?));
        } else if !req.add_tags.is_empty() || !req.remove_tags.is_empty() {
            patch.tags = Some(SetPatch::Diff {
                add: tmws_validate::sanitize_tags(&req.add_tags)?,
                remove: req.remove_tags,
            });
        }

        if let Some(parent_change) = req.parent_memory_id {
            if let Some(new_parent) = parent_change {
                if new_parent == memory.id {
                    return Err(TmwsError::Validation(
                        "a memory cannot be its own parent".into(),
                    ));
                }
                let ancestors = self.walk_ancestors(new_parent)?;
                if ancestors.contains(&memory.id) {
                    return Err(TmwsError::Validation(
                        "parent change would create a cycle in the memory hierarchy".into(),
                    ));
                }
            }
            patch.parent_memory_id = Some(parent_change);
        }

        self.store.update_memory(req.memory_id, &patch)
    }

    /// Soft-archive a memory, or hard-delete it for admin callers.
    pub fn delete_memory(&self, principal: &AgentRecord, req: DeleteMemoryRequest) -> Result<()> {
        self.limiter.check(&principal.agent_id, LimitKind::Request)?;
        self.limiter.check(&principal.agent_id, LimitKind::Write)?;

        let memory = self.store.get_memory(req.memory_id)?;
        evaluate(principal, Operation::Delete, &memory).into_result()?;

        if req.hard {
            if principal.access_level < TrustLevel::Admin {
                return Err(TmwsError::Permission(
                    "hard deletion requires admin trust".into(),
                ));
            }
            self.store.delete_memory(memory.id)?;
            info!(memory = %memory.id, "memory hard-deleted");
        } else {
            self.store.archive_memory(memory.id)?;
            info!(memory = %memory.id, "memory archived");
        }
        if !memory.is_archived {
            self.store.adjust_memory_count(&memory.owner_agent_id, -1)?;
        }
        Ok(())
    }

    fn effective_principal(
        &self,
        principal: &AgentRecord,
        as_agent: Option<&str>,
    ) -> Result<AgentRecord> {
        match as_agent {
            None => Ok(principal.clone()),
            Some(name) => {
                let target = self.registry.resolve(name)?;
                if target.agent_id == principal.agent_id {
                    return Ok(target);
                }
                if principal.access_level < TrustLevel::Elevated {
                    return Err(TmwsError::Permission(
                        "acting as another agent requires elevated trust".into(),
                    ));
                }
                Ok(target)
            }
        }
    }

    /// Follow parent links from `start`, erroring on unknown links,
    /// cycles, or chains deeper than the walk bound.
    fn walk_ancestors(&self, start: MemoryId) -> Result<Vec<MemoryId>> {
        let mut seen: Vec<MemoryId> = Vec::new();
        let mut current = Some(start);
        while let Some(id) = current {
            if seen.contains(&id) {
                return Err(TmwsError::Validation(
                    "cycle detected in memory hierarchy".into(),
                ));
            }
            if seen.len() >= PARENT_WALK_LIMIT {
                return Err(TmwsError::Validation(format!(
                    "memory hierarchy deeper than {PARENT_WALK_LIMIT}"
                )));
            }
            let memory = self.store.get_memory(id)?;
            seen.push(id);
            current = memory.parent_memory_id;
        }
        Ok(seen)
    }
}
