//! Cache, reference and scan behavior shared by both layouts

mod common;

use std::collections::BTreeSet;

use common::{name, ready_store, FolderFixture, BUNDLES, NODES};
use stowage_config::StoreLayout;
use stowage_core::{ChangeLog, EntityId, NodeReferences, PropertyId, PropertyState, Value};
use stowage_persistence::PersistenceError;
use test_case::test_case;

#[test_case(StoreLayout::Bundle ; "bundle")]
#[test_case(StoreLayout::Split ; "split")]
#[tokio::test]
async fn test_store_clears_cached_miss(layout: StoreLayout) {
    let (store, client) = ready_store(layout).await;
    let id = EntityId::random();
    let node = store.create_new_node(id).with_type(name("folder"));

    assert!(store.load_node(&id).await.unwrap_err().is_not_found());
    assert!(!store.exists_node(&id).await.unwrap());
    let before = client.calls().get_item;

    let mut changes = ChangeLog::new().added(node);
    store.store(&mut changes).await.unwrap();

    let loaded = store.load_node(&id).await.unwrap();
    assert_eq!(loaded.node_type, name("folder"));
    assert_eq!(loaded.mod_count, 1);
    assert!(client.calls().get_item > before);
}

#[test_case(StoreLayout::Bundle ; "bundle")]
#[test_case(StoreLayout::Split ; "split")]
#[tokio::test]
async fn test_removed_reference_clears_target(layout: StoreLayout) {
    let (store, _client) = ready_store(layout).await;
    let fixture = FolderFixture::new(store.as_ref());
    let target = fixture.root.id;
    let mut changes = ChangeLog::new()
        .added(fixture.root.clone())
        .added(fixture.child.clone())
        .added(fixture.title.clone());
    store.store(&mut changes).await.unwrap();

    let mut source = store.create_new_node(EntityId::random()).with_parent(target);
    source.add_property_name(name("link"));
    let link = PropertyState::single(
        PropertyId::new(source.id, name("link")),
        Value::Reference(target),
    );
    let mut refs = NodeReferences::new(target);
    refs.add_reference(link.id.clone());
    let mut changes = ChangeLog::new()
        .added(source.clone())
        .added(link.clone())
        .modified_refs(refs);
    store.store(&mut changes).await.unwrap();
    assert!(store.exists_references_to(&target).await.unwrap());

    let mut source = store.load_node(&source.id).await.unwrap();
    source.property_names.remove(&name("link"));
    let mut changes = ChangeLog::new()
        .modified(source.clone())
        .deleted(link.clone())
        .modified_refs(NodeReferences::new(target));
    store.store(&mut changes).await.unwrap();

    assert!(!store.exists_references_to(&target).await.unwrap());
    let references = store.load_references_to(&target).await.unwrap();
    assert!(references.references.is_empty());
    assert!(!store.exists_property(&link.id).await.unwrap());
    assert!(store.load_node(&source.id).await.unwrap().property_names.is_empty());
}

#[test_case(StoreLayout::Bundle ; "bundle")]
#[test_case(StoreLayout::Split ; "split")]
#[tokio::test]
async fn test_all_node_ids_page_walk(layout: StoreLayout) {
    let (store, _client) = ready_store(layout).await;
    let mut changes = ChangeLog::new();
    for _ in 0..5 {
        changes = changes.added(store.create_new_node(EntityId::random()));
    }
    store.store(&mut changes).await.unwrap();
    let all = store.all_node_ids(None, 0).await.unwrap();
    assert_eq!(all.len(), 5);

    let mut walked = Vec::new();
    let mut after: Option<EntityId> = None;
    loop {
        let page = store.all_node_ids(after.as_ref(), 2).await.unwrap();
        assert!(page.len() <= 2);
        let Some(last) = page.last() else {
            break;
        };
        after = Some(*last);
        walked.extend(page);
    }

    let unique: BTreeSet<&EntityId> = walked.iter().collect();
    assert_eq!(unique.len(), walked.len(), "pages never repeat an id");
    assert_eq!(walked, all);
}

#[test_case(StoreLayout::Bundle, BUNDLES ; "bundle")]
#[test_case(StoreLayout::Split, NODES ; "split")]
#[tokio::test]
async fn test_dropped_table_after_init_is_unavailable(layout: StoreLayout, table: &str) {
    let (store, client) = ready_store(layout).await;
    client.drop_table(table);

    let err = store.load_node(&EntityId::random()).await.unwrap_err();
    assert!(matches!(err, PersistenceError::StoreUnavailable(ref m) if m.contains(table)));
    assert!(!err.is_fatal());

    let mut changes = ChangeLog::new().added(store.create_new_node(EntityId::random()));
    let err = store.store(&mut changes).await.unwrap_err();
    assert!(matches!(err, PersistenceError::StoreUnavailable(_)));
}
