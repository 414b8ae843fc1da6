//! Bundle layout against the in-memory client

mod common;

use std::sync::Arc;

use common::{init_test_logging, name, ready_store, FolderFixture, BUNDLES};
use futures::future::join_all;
use stowage_config::StoreLayout;
use stowage_core::codec::encode_bundle;
use stowage_core::{
    ChangeLog, EntityId, ItemState, ItemStatus, NodePropBundle, NodeReferences, PropertyEntry,
    PropertyId, PropertyState, PropertyType, Value,
};
use stowage_persistence::kv::Item;
use stowage_persistence::{EntityStore, MemoryKvClient, PersistenceError};

async fn stored_fixture() -> (Arc<dyn EntityStore>, MemoryKvClient, FolderFixture) {
    let (store, client) = ready_store(StoreLayout::Bundle).await;
    let fixture = FolderFixture::new(store.as_ref());
    let mut changes = ChangeLog::new()
        .added(fixture.root.clone())
        .added(fixture.child.clone())
        .added(fixture.title.clone());
    store.store(&mut changes).await.unwrap();
    client.reset_calls();
    (store, client, fixture)
}

#[tokio::test]
async fn test_store_and_load_folder() {
    init_test_logging();
    let (store, client) = ready_store(StoreLayout::Bundle).await;
    let fixture = FolderFixture::new(store.as_ref());

    let mut changes = ChangeLog::new()
        .added(fixture.root.clone())
        .added(fixture.child.clone())
        .added(fixture.title.clone());
    store.store(&mut changes).await.unwrap();

    let calls = client.calls();
    assert_eq!(calls.put_item, 2);
    assert_eq!(calls.get_item, 0, "new nodes need no reference lookup");

    for state in &changes.added {
        assert_eq!(state.mod_count(), 1);
        match state {
            ItemState::Node(n) => assert_eq!(n.status, ItemStatus::Existing),
            ItemState::Property(p) => assert_eq!(p.status, ItemStatus::Existing),
        }
    }

    let root = store.load_node(&fixture.root.id).await.unwrap();
    assert_eq!(root.node_type, name("folder"));
    assert_eq!(root.parent_id, None);
    assert_eq!(root.children.len(), 1);
    assert_eq!(root.children[0].name, name("child1"));
    assert_eq!(root.children[0].id, fixture.child.id);
    assert!(root.property_names.contains(&name("title")));
    assert_eq!(root.mod_count, 1);

    let title = store.load_property(&fixture.title_id()).await.unwrap();
    assert_eq!(title.property_type, PropertyType::String);
    assert_eq!(title.values, vec![Value::from("")]);
    assert_eq!(title.mod_count, 1);

    assert_eq!(client.calls().get_item, 1, "property comes from the cached bundle");

    let child = store.load_node(&fixture.child.id).await.unwrap();
    assert_eq!(child.parent_id, Some(fixture.root.id));
}

#[tokio::test]
async fn test_empty_string_is_stored_as_sentinel() {
    let (_store, client, fixture) = stored_fixture().await;

    let item = client
        .raw_item(BUNDLES, &fixture.root.id.to_string())
        .unwrap();
    let doc: serde_json::Value = serde_json::from_str(item.data.as_deref().unwrap()).unwrap();
    assert_eq!(doc["properties"][0]["values"], serde_json::json!([false]));
}

#[tokio::test]
async fn test_missing_node_is_cached_negatively() {
    let (store, client) = ready_store(StoreLayout::Bundle).await;
    let missing = EntityId::random();

    let err = store.load_node(&missing).await.unwrap_err();
    assert!(err.is_not_found());
    let err = store.load_node(&missing).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!store.exists_node(&missing).await.unwrap());
    assert!(!store
        .exists_property(&PropertyId::new(missing, name("title")))
        .await
        .unwrap());

    assert_eq!(client.calls().get_item, 1);
    let stats = store.cache_stats();
    assert!(stats.hits >= 3);
    assert!(stats.hit_ratio() > 0.5);
}

#[tokio::test]
async fn test_store_evicts_written_bundles() {
    let (store, client, fixture) = stored_fixture().await;

    store.load_node(&fixture.root.id).await.unwrap();
    let mut root = store.load_node(&fixture.root.id).await.unwrap();
    assert_eq!(client.calls().get_item, 1);

    root.add_property_name(name("count"));
    let count = PropertyState::single(PropertyId::new(root.id, name("count")), Value::Long(5));
    let mut changes = ChangeLog::new().modified(root).added(count);
    store.store(&mut changes).await.unwrap();
    assert_eq!(client.calls().get_item, 2, "existing references are fetched for the put");

    let root = store.load_node(&fixture.root.id).await.unwrap();
    assert_eq!(client.calls().get_item, 3);
    assert_eq!(root.mod_count, 2);
    assert!(root.property_names.contains(&name("title")));
    assert!(root.property_names.contains(&name("count")));

    let count = store
        .load_property(&PropertyId::new(root.id, name("count")))
        .await
        .unwrap();
    assert_eq!(count.values, vec![Value::Long(5)]);
}

#[tokio::test]
async fn test_deleted_node_is_known_missing() {
    let (store, client, fixture) = stored_fixture().await;

    let mut changes = ChangeLog::new().deleted(fixture.child.clone());
    store.store(&mut changes).await.unwrap();
    assert_eq!(client.calls().delete_item, 1);
    assert_eq!(client.calls().put_item, 0);

    client.reset_calls();
    for _ in 0..2 {
        let err = store.load_node(&fixture.child.id).await.unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound(_)));
    }
    assert_eq!(client.calls().get_item, 0);
    assert!(store.exists_node(&fixture.root.id).await.unwrap());
}

#[tokio::test]
async fn test_deleted_property_leaves_bundle() {
    let (store, _client, fixture) = stored_fixture().await;

    let mut changes = ChangeLog::new().deleted(fixture.title.clone());
    store.store(&mut changes).await.unwrap();

    let err = store.load_property(&fixture.title_id()).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!store.exists_property(&fixture.title_id()).await.unwrap());

    let root = store.load_node(&fixture.root.id).await.unwrap();
    assert!(root.property_names.is_empty());
    assert_eq!(root.mod_count, 2);
}

#[tokio::test]
async fn test_reverse_references_survive_puts() {
    let (store, client, fixture) = stored_fixture().await;

    let mut source = store
        .create_new_node(EntityId::random())
        .with_parent(fixture.root.id);
    source.add_property_name(name("link"));
    let link = PropertyState::single(
        PropertyId::new(source.id, name("link")),
        Value::Reference(fixture.root.id),
    );
    let mut refs = NodeReferences::new(fixture.root.id);
    refs.add_reference(link.id.clone());

    let mut changes = ChangeLog::new()
        .added(source.clone())
        .added(link.clone())
        .modified_refs(refs);
    store.store(&mut changes).await.unwrap();
    assert_eq!(client.calls().set_references, 1);

    let references = store.load_references_to(&fixture.root.id).await.unwrap();
    assert!(references.references.contains(&link.id));
    assert!(store.exists_references_to(&fixture.root.id).await.unwrap());
    assert!(!store.exists_references_to(&source.id).await.unwrap());

    let root = store.load_node(&fixture.root.id).await.unwrap();
    let mut changes = ChangeLog::new().modified(root);
    store.store(&mut changes).await.unwrap();

    let references = store.load_references_to(&fixture.root.id).await.unwrap();
    assert_eq!(references.references.len(), 1);
    assert!(references.references.contains(&link.id));
}

#[tokio::test]
async fn test_references_only_item_fails_to_decode() {
    let (store, _client) = ready_store(StoreLayout::Bundle).await;
    let ghost = EntityId::random();
    let mut refs = NodeReferences::new(ghost);
    refs.add_reference(PropertyId::new(EntityId::random(), name("link")));

    let mut changes = ChangeLog::new().modified_refs(refs);
    store.store(&mut changes).await.unwrap();

    assert!(store.exists_references_to(&ghost).await.unwrap());
    let err = store.load_node(&ghost).await.unwrap_err();
    assert!(matches!(err, PersistenceError::Decode(ref m) if m.contains("data missing")));
}

#[tokio::test]
async fn test_references_to_absent_node() {
    let (store, _client) = ready_store(StoreLayout::Bundle).await;
    let err = store
        .load_references_to(&EntityId::random())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_corrupt_documents() {
    let (store, client) = ready_store(StoreLayout::Bundle).await;

    let garbage = EntityId::random();
    client.insert_raw(BUNDLES, &garbage.to_string(), Item::new("not json"));
    let err = store.load_node(&garbage).await.unwrap_err();
    assert!(matches!(err, PersistenceError::Decode(_)));

    let unknown = EntityId::random();
    let mut bundle = NodePropBundle::from_node_state(&store.create_new_node(unknown));
    bundle.add_property(PropertyEntry::from_state(&PropertyState::single(
        PropertyId::new(unknown, name("shape")),
        Value::from("circle"),
    )));
    let data = encode_bundle(&bundle)
        .unwrap()
        .replace("\"type\":\"String\"", "\"type\":\"Geometry\"");
    client.insert_raw(BUNDLES, &unknown.to_string(), Item::new(data));

    let err = store.load_node(&unknown).await.unwrap_err();
    assert!(matches!(err, PersistenceError::Unsupported(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_mod_count_increases_per_store() {
    let (store, _client) = ready_store(StoreLayout::Bundle).await;
    let id = EntityId::random();
    let mut changes = ChangeLog::new().added(store.create_new_node(id));
    store.store(&mut changes).await.unwrap();

    let mut last = store.load_node(&id).await.unwrap().mod_count;
    assert_eq!(last, 1);
    for _ in 0..3 {
        let node = store.load_node(&id).await.unwrap();
        let mut changes = ChangeLog::new().modified(node);
        store.store(&mut changes).await.unwrap();
        let next = store.load_node(&id).await.unwrap().mod_count;
        assert!(next > last);
        last = next;
    }
}

#[tokio::test]
async fn test_all_node_ids_pages() {
    let (store, _client) = ready_store(StoreLayout::Bundle).await;
    let mut changes = ChangeLog::new();
    for _ in 0..5 {
        changes = changes.added(store.create_new_node(EntityId::random()));
    }
    store.store(&mut changes).await.unwrap();

    let all = store.all_node_ids(None, 0).await.unwrap();
    assert_eq!(all.len(), 5);
    assert_eq!(store.all_node_ids(None, 2).await.unwrap(), all[..2].to_vec());

    let rest = store.all_node_ids(Some(&all[1]), 0).await.unwrap();
    assert_eq!(rest, all[2..].to_vec());
}

#[tokio::test]
async fn test_malformed_key_is_format_error() {
    let (store, client) = ready_store(StoreLayout::Bundle).await;
    client.insert_raw(BUNDLES, "bad", Item::new("{}"));

    let err = store.all_node_ids(None, 0).await.unwrap_err();
    assert!(matches!(err, PersistenceError::Format(_)));
}

#[tokio::test]
async fn test_external_update_invalidates_cache() {
    let (store, client, fixture) = stored_fixture().await;

    let root = store.load_node(&fixture.root.id).await.unwrap();
    store.load_node(&fixture.child.id).await.unwrap();
    assert_eq!(client.calls().get_item, 2);

    store.on_external_update(&ChangeLog::new().modified(root));
    store.load_node(&fixture.root.id).await.unwrap();
    assert_eq!(client.calls().get_item, 3);

    store.on_external_update(&ChangeLog::new().deleted(fixture.child.clone()));
    let err = store.load_node(&fixture.child.id).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(client.calls().get_item, 3);
}

#[tokio::test]
async fn test_concurrent_loads_agree() {
    let (store, _client, fixture) = stored_fixture().await;

    let loads = (0..8).map(|_| store.load_node(&fixture.root.id));
    let results = join_all(loads).await;

    let first = results[0].as_ref().unwrap();
    for result in &results {
        assert_eq!(result.as_ref().unwrap(), first);
    }
}

#[tokio::test]
async fn test_unavailable_store_leaves_states_untouched() {
    let (store, client) = ready_store(StoreLayout::Bundle).await;
    let node = store.create_new_node(EntityId::random());

    client.set_unavailable(Some("connection reset"));
    let mut changes = ChangeLog::new().added(node);
    let err = store.store(&mut changes).await.unwrap_err();
    assert!(matches!(err, PersistenceError::StoreUnavailable(_)));

    match &changes.added[0] {
        ItemState::Node(n) => {
            assert_eq!(n.status, ItemStatus::New);
            assert_eq!(n.mod_count, 0);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_mod_count_follows_stored_bundle() {
    let (store, _client, fixture) = stored_fixture().await;
    let loaded = store.load_node(&fixture.root.id).await.unwrap();

    let mut changes = ChangeLog::new().modified(loaded.clone());
    store.store(&mut changes).await.unwrap();
    assert_eq!(changes.modified[0].mod_count(), 2);

    let mut changes = ChangeLog::new().modified(loaded);
    store.store(&mut changes).await.unwrap();
    assert_eq!(changes.modified[0].mod_count(), 3);
    assert_eq!(store.load_node(&fixture.root.id).await.unwrap().mod_count, 3);
}
