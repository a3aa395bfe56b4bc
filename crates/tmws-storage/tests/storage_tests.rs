use tmws_core::{
    AccessLevel, AgentRecord, MemoryFilter, MemoryPatch, MemoryRecord, SetPatch, TrustLevel,
};
use tmws_storage::{MemoryStore, RecallOrder};

fn make_memory(owner: &str, content: &str, embedding: Vec<f32>) -> MemoryRecord {
    let mut m = MemoryRecord::new(owner, content);
    m.embedding = Some(embedding);
    m
}

#[test]
fn open_creates_tables() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::open(&dir.path().join("test.db")).unwrap();
    // Fresh database: nothing stored yet, queries still succeed.
    assert_eq!(store.count_memories("nobody").unwrap(), 0);
    assert!(store.list_agents(None, None, false).unwrap().is_empty());
}

#[test]
fn insert_then_get_returns_equal_record() {
    let store = MemoryStore::open_in_memory().unwrap();
    let mut m = make_memory("athena-conductor", "Project Apollo kickoff", vec![1.0, 0.0]);
    m.tags = vec!["project".into(), "kickoff".into()];
    m.importance = 0.8;

    let id = store.insert_memory(&m).unwrap();
    let loaded = store.get_memory(id).unwrap();

    assert_eq!(loaded.content, "Project Apollo kickoff");
    assert_eq!(loaded.owner_agent_id, "athena-conductor");
    assert_eq!(loaded.tags, vec!["project", "kickoff"]);
    assert_eq!(loaded.importance, 0.8);
    assert_eq!(loaded.embedding.as_deref(), Some(&[1.0, 0.0][..]));
    assert!(!loaded.is_archived);
}

#[test]
fn get_unknown_memory_is_not_found() {
    let store = MemoryStore::open_in_memory().unwrap();
    let err = store.get_memory(uuid::Uuid::new_v4()).unwrap_err();
    assert_eq!(err.wire_code(), "ErrNotFound");
}

#[test]
fn update_patches_scalars_and_tags() {
    let store = MemoryStore::open_in_memory().unwrap();
    let mut m = make_memory("a-agent", "original", vec![1.0]);
    m.tags = vec!["keep".into(), "drop".into()];
    let id = store.insert_memory(&m).unwrap();

    let patch = MemoryPatch {
        content: Some("rewritten".into()),
        importance: Some(0.9),
        tags: Some(SetPatch::Diff {
            add: vec!["new".into()],
            remove: vec!["drop".into()],
        }),
        ..Default::default()
    };
    let updated = store.update_memory(id, &patch).unwrap();

    assert_eq!(updated.content, "rewritten");
    assert_eq!(updated.importance, 0.9);
    assert_eq!(updated.tags, vec!["keep", "new"]);
    assert!(updated.updated_at >= updated.created_at);
}

#[test]
fn concurrent_style_updates_are_last_writer_wins() {
    let store = MemoryStore::open_in_memory().unwrap();
    let id = store
        .insert_memory(&make_memory("a-agent", "v0", vec![1.0]))
        .unwrap();

    let p1 = MemoryPatch {
        content: Some("from session one".into()),
        importance: Some(0.1),
        ..Default::default()
    };
    let p2 = MemoryPatch {
        content: Some("from session two".into()),
        importance: Some(0.9),
        ..Default::default()
    };
    store.update_memory(id, &p1).unwrap();
    store.update_memory(id, &p2).unwrap();

    // Final state equals one full patch, never a mix.
    let m = store.get_memory(id).unwrap();
    assert_eq!(m.content, "from session two");
    assert_eq!(m.importance, 0.9);
}

#[test]
fn archive_then_delete() {
    let store = MemoryStore::open_in_memory().unwrap();
    let id = store
        .insert_memory(&make_memory("a-agent", "ephemeral", vec![1.0]))
        .unwrap();

    store.archive_memory(id).unwrap();
    assert!(store.get_memory(id).unwrap().is_archived);

    // Archived rows disappear from default listings.
    let filter = MemoryFilter {
        owner_agent_id: Some("a-agent".into()),
        ..Default::default()
    };
    assert!(store.recall(&filter, RecallOrder::default(), 10, 0).unwrap().is_empty());

    store.delete_memory(id).unwrap();
    assert_eq!(store.get_memory(id).unwrap_err().wire_code(), "ErrNotFound");
}

#[test]
fn search_ranks_by_similarity_and_applies_floor() {
    let store = MemoryStore::open_in_memory().unwrap();
    store
        .insert_memory(&make_memory("a", "exact", vec![1.0, 0.0, 0.0]))
        .unwrap();
    store
        .insert_memory(&make_memory("a", "close", vec![0.9, 0.1, 0.0]))
        .unwrap();
    store
        .insert_memory(&make_memory("a", "orthogonal", vec![0.0, 1.0, 0.0]))
        .unwrap();

    let hits = store
        .search(&[1.0, 0.0, 0.0], &MemoryFilter::default(), 10, 0.5)
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].memory.content, "exact");
    assert_eq!(hits[1].memory.content, "close");
    assert!(hits[0].similarity > hits[1].similarity);
}

#[test]
fn search_k_prefix_is_stable() {
    let store = MemoryStore::open_in_memory().unwrap();
    for i in 0..6 {
        let v = vec![1.0, i as f32 * 0.1, 0.0];
        store
            .insert_memory(&make_memory("a", &format!("memory {i}"), v))
            .unwrap();
    }

    let query = [1.0, 0.0, 0.0];
    let top3 = store
        .search(&query, &MemoryFilter::default(), 3, 0.0)
        .unwrap();
    let top5 = store
        .search(&query, &MemoryFilter::default(), 5, 0.0)
        .unwrap();

    let ids3: Vec<_> = top3.iter().map(|s| s.memory.id).collect();
    let ids5: Vec<_> = top5.iter().map(|s| s.memory.id).collect();
    assert_eq!(&ids5[..3], &ids3[..]);
}

#[test]
fn search_filters_by_owner_namespace_and_tags() {
    let store = MemoryStore::open_in_memory().unwrap();

    let mut ours = make_memory("a", "tagged", vec![1.0, 0.0]);
    ours.tags = vec!["project".into(), "kickoff".into()];
    ours.namespace = "team-x".into();
    store.insert_memory(&ours).unwrap();

    let mut theirs = make_memory("b", "other namespace", vec![1.0, 0.0]);
    theirs.namespace = "team-y".into();
    store.insert_memory(&theirs).unwrap();

    let filter = MemoryFilter {
        namespace: Some("team-x".into()),
        tags: Some(vec!["project".into()]),
        ..Default::default()
    };
    let hits = store.search(&[1.0, 0.0], &filter, 10, 0.0).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].memory.content, "tagged");

    // Requiring a tag the row lacks excludes it.
    let filter = MemoryFilter {
        tags: Some(vec!["project".into(), "missing".into()]),
        ..Default::default()
    };
    assert!(store.search(&[1.0, 0.0], &filter, 10, 0.0).unwrap().is_empty());
}

#[test]
fn recall_pages_in_order() {
    let store = MemoryStore::open_in_memory().unwrap();
    for i in 0..5 {
        store
            .insert_memory(&make_memory("a", &format!("m{i}"), vec![1.0]))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
    }

    let filter = MemoryFilter {
        owner_agent_id: Some("a".into()),
        ..Default::default()
    };
    let page1 = store.recall(&filter, RecallOrder::UpdatedDesc, 2, 0).unwrap();
    let page2 = store.recall(&filter, RecallOrder::UpdatedDesc, 2, 2).unwrap();
    assert_eq!(page1.len(), 2);
    assert_eq!(page2.len(), 2);
    assert_eq!(page1[0].content, "m4");
    assert_eq!(page2[0].content, "m2");
}

#[test]
fn bump_access_leaves_updated_at_alone() {
    let store = MemoryStore::open_in_memory().unwrap();
    let id = store
        .insert_memory(&make_memory("a", "counted", vec![1.0]))
        .unwrap();
    let before = store.get_memory(id).unwrap();

    store.bump_access(id).unwrap();
    store.bump_access(id).unwrap();

    let after = store.get_memory(id).unwrap();
    assert_eq!(after.access_count, 2);
    assert!(after.last_accessed_at.is_some());
    assert_eq!(after.updated_at, before.updated_at);
}

#[test]
fn agent_upsert_get_list_archive() {
    let store = MemoryStore::open_in_memory().unwrap();

    let agent = AgentRecord::new("helper-agent", "Helper")
        .with_namespace("default")
        .with_access_level(TrustLevel::Standard);
    store.upsert_agent(&agent).unwrap();

    let loaded = store.get_agent("helper-agent").unwrap();
    assert_eq!(loaded.display_name, "Helper");
    assert_eq!(loaded.access_level, TrustLevel::Standard);

    // Upsert updates in place.
    let mut renamed = loaded.clone();
    renamed.display_name = "Helper v2".into();
    store.upsert_agent(&renamed).unwrap();
    assert_eq!(store.get_agent("helper-agent").unwrap().display_name, "Helper v2");
    assert_eq!(store.list_agents(None, None, true).unwrap().len(), 1);

    store.archive_agent("helper-agent").unwrap();
    assert!(store.list_agents(None, None, true).unwrap().is_empty());
    // The record itself survives archiving.
    assert!(!store.get_agent("helper-agent").unwrap().is_active);
}

#[test]
fn shared_with_roundtrip() {
    use tmws_core::Permission;
    let store = MemoryStore::open_in_memory().unwrap();
    let id = store
        .insert_memory(&make_memory("a", "to share", vec![1.0]))
        .unwrap();

    let mut grants = std::collections::BTreeMap::new();
    grants.insert("b-agent".to_string(), Permission::Read);
    let updated = store
        .update_memory_shares(id, AccessLevel::Shared, Some(AccessLevel::Private), &grants)
        .unwrap();
    assert_eq!(updated.access_level, AccessLevel::Shared);
    assert_eq!(updated.prior_access_level, Some(AccessLevel::Private));
    assert_eq!(updated.grant_for("b-agent"), Some(Permission::Read));

    // Clearing grants restores the prior level.
    let updated = store
        .update_memory_shares(id, AccessLevel::Private, None, &Default::default())
        .unwrap();
    assert_eq!(updated.access_level, AccessLevel::Private);
    assert!(updated.prior_access_level.is_none());
    assert!(updated.shared_with.is_empty());
}
