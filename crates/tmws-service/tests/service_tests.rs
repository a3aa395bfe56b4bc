use std::sync::Arc;
use std::time::Duration;

use tmws_core::{AccessLevel, AgentRecord, Permission, TrustLevel};
use tmws_embedding::{EmbeddingGateway, HashEmbedding};
use tmws_policy::{AgentRateLimiter, RateLimitConfig};
use tmws_registry::{AgentRegistry, RegisterSpec};
use tmws_service::{
    CreateMemoryRequest, DeleteMemoryRequest, MemoryService, RecallMemoriesRequest,
    SearchMemoriesRequest, ShareMemoryRequest, UpdateMemoryRequest,
};
use tmws_storage::MemoryStore;

fn harness() -> MemoryService {
    harness_with_limits(RateLimitConfig::default())
}

fn harness_with_limits(limits: RateLimitConfig) -> MemoryService {
    let store = MemoryStore::open_in_memory().unwrap();
    let gateway = Arc::new(EmbeddingGateway::with_window(
        Arc::new(HashEmbedding::new(384)),
        Duration::ZERO,
    ));
    let registry = Arc::new(AgentRegistry::new(store.clone()).unwrap());
    for name in ["a-agent", "b-agent"] {
        registry
            .register(
                RegisterSpec {
                    agent_id: name.to_string(),
                    display_name: None,
                    agent_type: Default::default(),
                    namespace: Some("default".into()),
                    capabilities: Default::default(),
                    access_level: TrustLevel::Standard,
                },
                false,
            )
            .unwrap();
    }
    MemoryService::new(store, gateway, registry, AgentRateLimiter::new(limits))
}

fn principal(service: &MemoryService, name: &str) -> AgentRecord {
    service.registry().resolve(name).unwrap()
}

fn create_req(content: &str) -> CreateMemoryRequest {
    CreateMemoryRequest {
        content: content.to_string(),
        tags: vec![],
        importance: None,
        access_level: None,
        share_with: vec![],
        as_agent: None,
        parent_memory_id: None,
        summary: None,
        source_url: None,
    }
}

fn search_req(query: &str) -> SearchMemoriesRequest {
    SearchMemoriesRequest {
        query: query.to_string(),
        limit: 10,
        min_similarity: 0.0,
        include_shared: true,
        namespace: None,
        tags: vec![],
        access_filter: None,
    }
}

// S1: create + semantic recall through the athena principal.
#[tokio::test]
async fn create_then_search_finds_related_text() {
    let service = harness();
    let athena = principal(&service, "athena-conductor");

    let created = service
        .create_memory(
            &athena,
            CreateMemoryRequest {
                tags: vec!["project".into(), "kickoff".into()],
                importance: Some(0.8),
                ..create_req("Project Apollo kickoff")
            },
        )
        .await
        .unwrap();

    let mut req = search_req("apollo launch");
    req.limit = 5;
    let hits = service.search_memories(&athena, req).await.unwrap();

    let hit = hits
        .iter()
        .find(|h| h.memory.id == created.id)
        .expect("created memory should be found");
    assert!(hit.similarity > 0.2, "similarity was {}", hit.similarity);
}

// Property 6: idempotent create.
#[tokio::test]
async fn created_memory_reads_back_equal() {
    let service = harness();
    let a = principal(&service, "a-agent");

    let created = service
        .create_memory(
            &a,
            CreateMemoryRequest {
                tags: vec!["notes".into()],
                ..create_req("remember this exact text")
            },
        )
        .await
        .unwrap();

    let loaded = service.get_memory(&a, created.id).unwrap();
    assert_eq!(loaded.content, "remember this exact text");
    assert_eq!(loaded.tags, vec!["notes"]);
    assert_eq!(loaded.owner_agent_id, "a-agent");
    assert_eq!(loaded.access_count, 1);
}

// S2: private isolation, then share symmetry.
#[tokio::test]
async fn sharing_grants_and_revokes_visibility() {
    let service = harness();
    let a = principal(&service, "a-agent");
    let b = principal(&service, "b-agent");

    let memory = service
        .create_memory(&a, create_req("the launch codes meeting notes"))
        .await
        .unwrap();

    // Private: b sees nothing.
    let hits = service
        .search_memories(&b, search_req("launch codes"))
        .await
        .unwrap();
    assert!(hits.is_empty());

    // Shared: b sees it.
    let shared = service
        .share_memory(
            &a,
            ShareMemoryRequest {
                memory_id: memory.id,
                grantees: vec!["b-agent".into()],
                permission: Permission::Read,
            },
        )
        .unwrap();
    assert_eq!(shared.access_level, AccessLevel::Shared);

    let hits = service
        .search_memories(&b, search_req("launch codes"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].memory.id, memory.id);

    // Unshared: back to invisible, level restored.
    let unshared = service
        .share_memory(
            &a,
            ShareMemoryRequest {
                memory_id: memory.id,
                grantees: vec![],
                permission: Permission::Read,
            },
        )
        .unwrap();
    assert_eq!(unshared.access_level, AccessLevel::Private);
    assert!(unshared.shared_with.is_empty());

    let hits = service
        .search_memories(&b, search_req("launch codes"))
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn share_requires_owner_or_admin() {
    let service = harness();
    let a = principal(&service, "a-agent");
    let b = principal(&service, "b-agent");

    let memory = service.create_memory(&a, create_req("owned by a")).await.unwrap();
    let err = service
        .share_memory(
            &b,
            ShareMemoryRequest {
                memory_id: memory.id,
                grantees: vec!["b-agent".into()],
                permission: Permission::Read,
            },
        )
        .unwrap_err();
    assert_eq!(err.wire_code(), "ErrPermission");

    // Unknown grantees reject the share.
    let err = service
        .share_memory(
            &a,
            ShareMemoryRequest {
                memory_id: memory.id,
                grantees: vec!["never-registered".into()],
                permission: Permission::Read,
            },
        )
        .unwrap_err();
    assert_eq!(err.wire_code(), "ErrUnknownAgent");
}

#[tokio::test]
async fn shared_with_requires_shared_level() {
    let service = harness();
    let a = principal(&service, "a-agent");

    // share_with on a private memory is rejected.
    let err = service
        .create_memory(
            &a,
            CreateMemoryRequest {
                share_with: vec!["b-agent".into()],
                ..create_req("mislabelled")
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.wire_code(), "ErrValidation");

    // A shared memory without grantees is rejected.
    let err = service
        .create_memory(
            &a,
            CreateMemoryRequest {
                access_level: Some(AccessLevel::Shared),
                ..create_req("shared with nobody")
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.wire_code(), "ErrValidation");
}

// S3 (service side): a system principal may act as another agent.
#[tokio::test]
async fn as_agent_needs_elevated_trust() {
    let service = harness();
    let athena = principal(&service, "athena-conductor");
    let a = principal(&service, "a-agent");

    let memory = service
        .create_memory(
            &athena,
            CreateMemoryRequest {
                as_agent: Some("hestia".into()),
                ..create_req("audit trail entry")
            },
        )
        .await
        .unwrap();
    assert_eq!(memory.owner_agent_id, "hestia-auditor");
    assert_eq!(memory.namespace, "trinitas");

    let err = service
        .create_memory(
            &a,
            CreateMemoryRequest {
                as_agent: Some("b-agent".into()),
                ..create_req("impersonation attempt")
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.wire_code(), "ErrPermission");
}

#[tokio::test]
async fn reserved_namespace_needs_elevation() {
    let service = harness();
    // A standard-trust agent living in the reserved namespace.
    let intruder = service
        .registry()
        .register(
            RegisterSpec {
                agent_id: "squatter-agent".into(),
                display_name: None,
                agent_type: Default::default(),
                namespace: Some("trinitas".into()),
                capabilities: Default::default(),
                access_level: TrustLevel::Standard,
            },
            false,
        )
        .unwrap();

    let err = service
        .create_memory(&intruder, create_req("should not land"))
        .await
        .unwrap_err();
    assert_eq!(err.wire_code(), "ErrPermission");
}

// Property 10: hierarchy stays acyclic.
#[tokio::test]
async fn parent_cycles_are_rejected() {
    let service = harness();
    let a = principal(&service, "a-agent");

    let root = service.create_memory(&a, create_req("root")).await.unwrap();
    let child = service
        .create_memory(
            &a,
            CreateMemoryRequest {
                parent_memory_id: Some(root.id),
                ..create_req("child")
            },
        )
        .await
        .unwrap();

    // root → child would close the loop.
    let err = service
        .update_memory(
            &a,
            UpdateMemoryRequest {
                memory_id: root.id,
                parent_memory_id: Some(Some(child.id)),
                content: None,
                summary: None,
                source_url: None,
                importance: None,
                access_level: None,
                add_tags: vec![],
                remove_tags: vec![],
                tags: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.wire_code(), "ErrValidation");

    // Unknown parents are rejected outright.
    let err = service
        .create_memory(
            &a,
            CreateMemoryRequest {
                parent_memory_id: Some(uuid::Uuid::new_v4()),
                ..create_req("orphan")
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.wire_code(), "ErrNotFound");
}

#[tokio::test]
async fn update_reembeds_changed_content() {
    let service = harness();
    let a = principal(&service, "a-agent");

    let memory = service
        .create_memory(&a, create_req("quarterly budget review"))
        .await
        .unwrap();

    service
        .update_memory(
            &a,
            UpdateMemoryRequest {
                memory_id: memory.id,
                content: Some("zebra migration patterns".into()),
                summary: None,
                source_url: None,
                importance: None,
                access_level: None,
                add_tags: vec!["wildlife".into()],
                remove_tags: vec![],
                tags: None,
                parent_memory_id: None,
            },
        )
        .await
        .unwrap();

    let hits = service
        .search_memories(&a, search_req("zebra migration"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].similarity > 0.2);
    assert_eq!(hits[0].memory.tags, vec!["wildlife"]);

    // The old content no longer matches strongly.
    let stale = service
        .search_memories(&a, search_req("quarterly budget"))
        .await
        .unwrap();
    assert!(stale.iter().all(|h| h.similarity < 0.75));
}

#[tokio::test]
async fn delete_archives_then_hard_delete_needs_admin() {
    let service = harness();
    let a = principal(&service, "a-agent");

    let memory = service.create_memory(&a, create_req("short-lived")).await.unwrap();

    // Soft delete hides the memory from search.
    service
        .delete_memory(
            &a,
            DeleteMemoryRequest {
                memory_id: memory.id,
                hard: false,
            },
        )
        .unwrap();
    let hits = service.search_memories(&a, search_req("short-lived")).await.unwrap();
    assert!(hits.is_empty());

    // Standard trust cannot hard-delete, even its own memory.
    let err = service
        .delete_memory(
            &a,
            DeleteMemoryRequest {
                memory_id: memory.id,
                hard: true,
            },
        )
        .unwrap_err();
    assert_eq!(err.wire_code(), "ErrPermission");

    // An admin owner may remove its rows for good.
    let ops = service
        .registry()
        .register(
            RegisterSpec {
                agent_id: "ops-agent".into(),
                display_name: None,
                agent_type: Default::default(),
                namespace: Some("default".into()),
                capabilities: Default::default(),
                access_level: TrustLevel::Admin,
            },
            false,
        )
        .unwrap();
    let doomed = service.create_memory(&ops, create_req("temporary scratch")).await.unwrap();
    service
        .delete_memory(
            &ops,
            DeleteMemoryRequest {
                memory_id: doomed.id,
                hard: true,
            },
        )
        .unwrap();
    assert_eq!(
        service.get_memory(&ops, doomed.id).unwrap_err().wire_code(),
        "ErrNotFound"
    );
}

#[tokio::test]
async fn recall_lists_and_pages() {
    let service = harness();
    let a = principal(&service, "a-agent");
    let b = principal(&service, "b-agent");

    for i in 0..4 {
        service
            .create_memory(&a, create_req(&format!("note number {i}")))
            .await
            .unwrap();
    }

    let page = service
        .recall(
            &a,
            RecallMemoriesRequest {
                agent_id: Some("a-agent".into()),
                namespace: None,
                tags: vec![],
                limit: 2,
                offset: 0,
            },
        )
        .unwrap();
    assert_eq!(page.len(), 2);

    // b has no access to a's private notes.
    let none = service
        .recall(
            &b,
            RecallMemoriesRequest {
                agent_id: Some("a-agent".into()),
                namespace: None,
                tags: vec![],
                limit: 10,
                offset: 0,
            },
        )
        .unwrap();
    assert!(none.is_empty());
}

// S7 shape: the write quota runs out and reports a back-off hint.
#[tokio::test]
async fn rate_limit_denies_with_hint() {
    let service = harness_with_limits(RateLimitConfig {
        requests_per_min: 1000,
        searches_per_min: 100,
        writes_per_min: 3,
    });
    let a = principal(&service, "a-agent");

    for i in 0..3 {
        service
            .create_memory(&a, create_req(&format!("burst {i}")))
            .await
            .unwrap();
    }
    let err = service
        .create_memory(&a, create_req("one too many"))
        .await
        .unwrap_err();
    assert_eq!(err.wire_code(), "ErrRateLimited");
    assert!(err.retry_after().unwrap() <= 60);
}

#[tokio::test]
async fn include_shared_false_hides_foreign_shares() {
    let service = harness();
    let a = principal(&service, "a-agent");
    let b = principal(&service, "b-agent");

    let memory = service
        .create_memory(&a, create_req("shared design document"))
        .await
        .unwrap();
    service
        .share_memory(
            &a,
            ShareMemoryRequest {
                memory_id: memory.id,
                grantees: vec!["b-agent".into()],
                permission: Permission::Read,
            },
        )
        .unwrap();

    let visible = service
        .search_memories(&b, search_req("design document"))
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);

    let hidden = service
        .search_memories(
            &b,
            SearchMemoriesRequest {
                include_shared: false,
                ..search_req("design document")
            },
        )
        .await
        .unwrap();
    assert!(hidden.is_empty());
}
