//! Key-value store client capability
//!
//! The adapters only need a small slice of a KV store: single-key reads and
//! writes, a reference-set update, batch writes, key scans and table
//! administration. Every item carries a string partition key, an optional
//! `data` attribute with the JSON document and an optional `references`
//! string set.
//!
//! [`MemoryKvClient`] backs tests. A DynamoDB binding is available behind
//! the `dynamodb` feature.

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;

use crate::error::KvResult;

#[cfg(feature = "dynamodb")]
pub mod dynamodb;
pub mod memory;

pub use memory::{KvCallCounts, MemoryKvClient};

/// Attribute holding the JSON document
pub const DATA_ATTRIBUTE: &str = "data";
/// Attribute holding the reverse-reference set
pub const REFERENCES_ATTRIBUTE: &str = "references";

/// A table together with the name of its partition-key attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub name: String,
    pub key_attribute: String,
}

impl TableRef {
    pub fn new(name: impl Into<String>, key_attribute: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_attribute: key_attribute.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableStatus {
    Creating,
    Active,
    Updating,
    Deleting,
    Other(String),
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableStatus::Creating => f.write_str("CREATING"),
            TableStatus::Active => f.write_str("ACTIVE"),
            TableStatus::Updating => f.write_str("UPDATING"),
            TableStatus::Deleting => f.write_str("DELETING"),
            TableStatus::Other(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Hash,
    Range,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchemaElement {
    pub attribute_name: String,
    pub key_type: KeyType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescription {
    pub name: String,
    pub status: TableStatus,
    pub key_schema: Vec<KeySchemaElement>,
}

impl TableDescription {
    /// Name of the HASH key attribute, if the table declares one
    pub fn hash_key(&self) -> Option<&str> {
        self.key_schema
            .iter()
            .find(|k| k.key_type == KeyType::Hash)
            .map(|k| k.attribute_name.as_str())
    }
}

/// Parameters for creating a table with a single string HASH key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub key_attribute: String,
    pub read_capacity: i64,
    pub write_capacity: i64,
}

/// Which attributes a read returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    All,
    References,
}

/// One stored item, minus its key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
    pub data: Option<String>,
    pub references: BTreeSet<String>,
}

impl Item {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: Some(data.into()),
            references: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_references(mut self, references: BTreeSet<String>) -> Self {
        self.references = references;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    Put {
        table: TableRef,
        key: String,
        item: Item,
    },
    Delete {
        table: TableRef,
        key: String,
    },
}

impl BatchOperation {
    pub fn table(&self) -> &TableRef {
        match self {
            BatchOperation::Put { table, .. } | BatchOperation::Delete { table, .. } => table,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            BatchOperation::Put { key, .. } | BatchOperation::Delete { key, .. } => key,
        }
    }
}

/// Result of a batch write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Operations the store did not apply
    pub unprocessed: Vec<BatchOperation>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.unprocessed.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanRequest {
    pub exclusive_start_key: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    pub keys: Vec<String>,
    /// Present when the scan stopped before the end of the table
    pub last_evaluated_key: Option<String>,
}

/// Client capability consumed by the entity stores
#[async_trait]
pub trait KvClient: Send + Sync {
    /// Describe a table; a missing table is `KvError::TableNotFound`
    async fn describe_table(&self, table: &str) -> KvResult<TableDescription>;

    async fn create_table(&self, spec: &TableSpec) -> KvResult<()>;

    async fn get_item(
        &self,
        table: &TableRef,
        key: &str,
        projection: Projection,
    ) -> KvResult<Option<Item>>;

    /// Replace the whole item stored under `key`
    async fn put_item(&self, table: &TableRef, key: &str, item: Item) -> KvResult<()>;

    async fn delete_item(&self, table: &TableRef, key: &str) -> KvResult<()>;

    /// Replace only the reference set; an empty set removes the attribute
    async fn set_references(
        &self,
        table: &TableRef,
        key: &str,
        references: BTreeSet<String>,
    ) -> KvResult<()>;

    async fn batch_write(&self, operations: Vec<BatchOperation>) -> KvResult<BatchOutcome>;

    /// Scan partition keys in the store's native order
    async fn scan_keys(&self, table: &TableRef, request: ScanRequest) -> KvResult<ScanPage>;
}
