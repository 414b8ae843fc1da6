//! Shared fixtures for entity store tests

#![allow(dead_code)]

use std::sync::Arc;

use stowage_config::{PersistenceConfig, StoreLayout};
use stowage_core::{EntityId, Name, NodeState, PropertyId, PropertyState, Value};
use stowage_persistence::{store_for, EntityStore, MemoryKvClient};

pub const BUNDLES: &str = "Bundles";
pub const NODES: &str = "Nodes";
pub const PROPERTIES: &str = "Properties";

/// Client with the tables a layout expects already provisioned
pub fn provisioned_client(layout: StoreLayout) -> MemoryKvClient {
    match layout {
        StoreLayout::Bundle => MemoryKvClient::new().with_table(BUNDLES, "id"),
        StoreLayout::Split => MemoryKvClient::new()
            .with_table(NODES, "nodeId")
            .with_table(PROPERTIES, "propertyId"),
    }
}

/// Config with a fast provisioning poll
pub fn test_config(layout: StoreLayout) -> PersistenceConfig {
    let mut config = PersistenceConfig::default().with_layout(layout);
    config.provisioning.poll_interval_ms = 1;
    config.provisioning.max_attempts = 3;
    config
}

/// Initialized store over a fresh provisioned client; call counters are reset
pub async fn ready_store(layout: StoreLayout) -> (Arc<dyn EntityStore>, MemoryKvClient) {
    let client = provisioned_client(layout);
    let store = store_for(test_config(layout), Arc::new(client.clone())).unwrap();
    store.init().await.unwrap();
    client.reset_calls();
    (store, client)
}

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn name(s: &str) -> Name {
    Name::parse(s).unwrap()
}

/// `n1` of type `folder` with child `child1 -> n2`, plus `n1/title = ""`
pub struct FolderFixture {
    pub root: NodeState,
    pub child: NodeState,
    pub title: PropertyState,
}

impl FolderFixture {
    pub fn new(store: &dyn EntityStore) -> Self {
        let root_id = EntityId::random();
        let child_id = EntityId::random();

        let mut root = store.create_new_node(root_id).with_type(name("folder"));
        root.add_child_node_entry(name("child1"), child_id);
        root.add_property_name(name("title"));

        let child = store.create_new_node(child_id).with_parent(root_id);

        let mut title = store.create_new_property(PropertyId::new(root_id, name("title")));
        title.property_type = stowage_core::PropertyType::String;
        title.values = vec![Value::from("")];

        Self { root, child, title }
    }

    pub fn title_id(&self) -> PropertyId {
        self.title.id.clone()
    }
}
