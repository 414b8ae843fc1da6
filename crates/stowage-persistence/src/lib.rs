//! Stowage persistence
//!
//! Entity stores that keep content-repository node and property states in a
//! schemaless key-value store.
//!
//! ## Features
//!
//! - **Two layouts**: [`BundleStore`] keeps a node and its properties in one
//!   item; [`StateStore`] splits nodes and properties into two tables
//! - **Positive and negative caching** of node states, evicted on write
//! - **Table provisioning** at start-up, with optional creation
//! - **Consistency checking** of parent/child links, with an optional fix mode
//! - **Pluggable clients** through [`KvClient`]: [`MemoryKvClient`] for tests,
//!   and a DynamoDB client behind the `dynamodb` feature
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use stowage_config::PersistenceConfig;
//! use stowage_core::{ChangeLog, EntityId};
//! use stowage_persistence::{store_for, EntityStore, MemoryKvClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(MemoryKvClient::new());
//! let config = PersistenceConfig::default().with_create_on_missing(true);
//! let store = store_for(config, client)?;
//! store.init().await?;
//!
//! let root = store.create_new_node(EntityId::random());
//! let mut changes = ChangeLog::new().added(root.clone());
//! store.store(&mut changes).await?;
//!
//! assert!(store.exists_node(&root.id).await?);
//! store.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod bundle_store;
pub mod cache;
pub mod consistency;
pub mod error;
pub mod kv;
pub mod lifecycle;
pub mod provisioner;
pub mod state_store;
pub mod store;

pub use bundle_store::BundleStore;
pub use cache::{CacheEntry, CacheLookup, CacheStats, NodeStateCache};
pub use consistency::{ConsistencyChecker, ConsistencyIssue, ConsistencyReport};
pub use error::{KvError, KvResult, PersistenceError, PersistenceResult};
pub use kv::{KvClient, MemoryKvClient, TableRef};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use provisioner::{TableProvisioner, TableReadiness};
pub use state_store::StateStore;
pub use store::{store_for, EntityStore, BUNDLE_KEY, NODE_KEY, PROPERTY_KEY};
