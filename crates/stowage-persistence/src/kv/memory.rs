//! In-memory key-value client
//!
//! Deterministic, observable stand-in for a real store:
//!
//! - **Ordered**: scans return keys in lexicographic order
//! - **Observable**: every call is counted per operation
//! - **Error Injection**: transport failures, unprocessed batch items and
//!   slow table activation can be simulated
//!
//! # Examples
//!
//! ```rust
//! use stowage_persistence::kv::{Item, KvClient, MemoryKvClient, Projection, TableRef};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let table = TableRef::new("Bundles", "id");
//! let client = MemoryKvClient::new().with_table(&table.name, &table.key_attribute);
//!
//! client.put_item(&table, "k1", Item::new("{}")).await?;
//! assert!(client.get_item(&table, "k1", Projection::All).await?.is_some());
//! assert_eq!(client.calls().put_item, 1);
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{KvError, KvResult};
use crate::kv::{
    BatchOperation, BatchOutcome, Item, KeySchemaElement, KeyType, KvClient, Projection,
    ScanPage, ScanRequest, TableDescription, TableRef, TableSpec, TableStatus,
};

/// Per-operation call counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvCallCounts {
    pub describe_table: usize,
    pub create_table: usize,
    pub get_item: usize,
    pub put_item: usize,
    pub delete_item: usize,
    pub set_references: usize,
    pub batch_write: usize,
    pub scan_keys: usize,
}

impl KvCallCounts {
    /// Calls that read items
    pub fn reads(&self) -> usize {
        self.get_item + self.scan_keys
    }

    /// Calls that change tables or items
    pub fn mutations(&self) -> usize {
        self.create_table + self.put_item + self.delete_item + self.set_references + self.batch_write
    }
}

#[derive(Debug)]
struct MemoryTable {
    key_schema: Vec<KeySchemaElement>,
    status: TableStatus,
    /// Describes left before a `Creating` table turns `Active`
    pending_describes: u32,
    items: BTreeMap<String, Item>,
}

impl MemoryTable {
    fn new(key_attribute: &str, status: TableStatus) -> Self {
        Self {
            key_schema: vec![KeySchemaElement {
                attribute_name: key_attribute.to_string(),
                key_type: KeyType::Hash,
            }],
            status,
            pending_describes: 0,
            items: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, MemoryTable>,
    calls: KvCallCounts,
    unavailable: Option<String>,
    /// Trailing operations of the next batch to leave unprocessed
    unprocessed_next_batch: usize,
    /// Describes a freshly created table stays `Creating` for
    activation_delay: u32,
}

impl MemoryState {
    fn check_available(&self) -> KvResult<()> {
        match &self.unavailable {
            Some(msg) => Err(KvError::Transport(msg.clone())),
            None => Ok(()),
        }
    }

    fn table_mut(&mut self, name: &str) -> KvResult<&mut MemoryTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| KvError::TableNotFound(name.to_string()))
    }
}

/// In-memory [`KvClient`]
#[derive(Debug, Clone, Default)]
pub struct MemoryKvClient {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryKvClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style: add an active table with a string HASH key
    #[must_use]
    pub fn with_table(self, name: &str, key_attribute: &str) -> Self {
        self.state.lock().tables.insert(
            name.to_string(),
            MemoryTable::new(key_attribute, TableStatus::Active),
        );
        self
    }

    /// Builder-style: add a table with an arbitrary status
    #[must_use]
    pub fn with_table_status(self, name: &str, key_attribute: &str, status: TableStatus) -> Self {
        self.state
            .lock()
            .tables
            .insert(name.to_string(), MemoryTable::new(key_attribute, status));
        self
    }

    /// Builder-style: tables created later stay `Creating` for `describes` describe calls
    #[must_use]
    pub fn with_activation_delay(self, describes: u32) -> Self {
        self.state.lock().activation_delay = describes;
        self
    }

    /// Snapshot of the call counters
    pub fn calls(&self) -> KvCallCounts {
        self.state.lock().calls.clone()
    }

    pub fn reset_calls(&self) {
        self.state.lock().calls = KvCallCounts::default();
    }

    /// Make every call fail with a transport error until cleared with `None`
    pub fn set_unavailable(&self, message: Option<&str>) {
        self.state.lock().unavailable = message.map(str::to_string);
    }

    /// Leave the last `count` operations of the next batch unprocessed
    pub fn set_unprocessed_next_batch(&self, count: usize) {
        self.state.lock().unprocessed_next_batch = count;
    }

    /// Remove a table and its items
    pub fn drop_table(&self, name: &str) {
        self.state.lock().tables.remove(name);
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.state.lock().tables.contains_key(name)
    }

    /// Stored item, bypassing counters
    pub fn raw_item(&self, table: &str, key: &str) -> Option<Item> {
        self.state
            .lock()
            .tables
            .get(table)
            .and_then(|t| t.items.get(key).cloned())
    }

    /// Store an item directly, bypassing counters
    pub fn insert_raw(&self, table: &str, key: &str, item: Item) {
        if let Some(t) = self.state.lock().tables.get_mut(table) {
            t.items.insert(key.to_string(), item);
        }
    }

    pub fn item_count(&self, table: &str) -> usize {
        self.state
            .lock()
            .tables
            .get(table)
            .map_or(0, |t| t.items.len())
    }
}

fn apply(state: &mut MemoryState, operation: BatchOperation) -> KvResult<()> {
    match operation {
        BatchOperation::Put { table, key, item } => {
            state.table_mut(&table.name)?.items.insert(key, item);
        }
        BatchOperation::Delete { table, key } => {
            state.table_mut(&table.name)?.items.remove(&key);
        }
    }
    Ok(())
}

#[async_trait]
impl KvClient for MemoryKvClient {
    async fn describe_table(&self, table: &str) -> KvResult<TableDescription> {
        let mut state = self.state.lock();
        state.calls.describe_table += 1;
        state.check_available()?;

        let t = state.table_mut(table)?;
        if t.status == TableStatus::Creating {
            if t.pending_describes == 0 {
                t.status = TableStatus::Active;
            } else {
                t.pending_describes -= 1;
            }
        }
        Ok(TableDescription {
            name: table.to_string(),
            status: t.status.clone(),
            key_schema: t.key_schema.clone(),
        })
    }

    async fn create_table(&self, spec: &TableSpec) -> KvResult<()> {
        let mut state = self.state.lock();
        state.calls.create_table += 1;
        state.check_available()?;

        if state.tables.contains_key(&spec.name) {
            return Err(KvError::build(format!("table {} already exists", spec.name)));
        }
        let mut table = MemoryTable::new(&spec.key_attribute, TableStatus::Creating);
        table.pending_describes = state.activation_delay;
        state.tables.insert(spec.name.clone(), table);
        Ok(())
    }

    async fn get_item(
        &self,
        table: &TableRef,
        key: &str,
        projection: Projection,
    ) -> KvResult<Option<Item>> {
        let mut state = self.state.lock();
        state.calls.get_item += 1;
        state.check_available()?;

        let item = state.table_mut(&table.name)?.items.get(key).cloned();
        Ok(item.map(|item| match projection {
            Projection::All => item,
            Projection::References => Item {
                data: None,
                references: item.references,
            },
        }))
    }

    async fn put_item(&self, table: &TableRef, key: &str, item: Item) -> KvResult<()> {
        let mut state = self.state.lock();
        state.calls.put_item += 1;
        state.check_available()?;

        state
            .table_mut(&table.name)?
            .items
            .insert(key.to_string(), item);
        Ok(())
    }

    async fn delete_item(&self, table: &TableRef, key: &str) -> KvResult<()> {
        let mut state = self.state.lock();
        state.calls.delete_item += 1;
        state.check_available()?;

        state.table_mut(&table.name)?.items.remove(key);
        Ok(())
    }

    async fn set_references(
        &self,
        table: &TableRef,
        key: &str,
        references: BTreeSet<String>,
    ) -> KvResult<()> {
        let mut state = self.state.lock();
        state.calls.set_references += 1;
        state.check_available()?;

        let items = &mut state.table_mut(&table.name)?.items;
        match items.get_mut(key) {
            Some(item) => item.references = references,
            None if references.is_empty() => {}
            None => {
                items.insert(
                    key.to_string(),
                    Item {
                        data: None,
                        references,
                    },
                );
            }
        }
        Ok(())
    }

    async fn batch_write(&self, mut operations: Vec<BatchOperation>) -> KvResult<BatchOutcome> {
        let mut state = self.state.lock();
        state.calls.batch_write += 1;
        state.check_available()?;

        for op in &operations {
            if !state.tables.contains_key(&op.table().name) {
                return Err(KvError::TableNotFound(op.table().name.clone()));
            }
        }

        let skip = std::mem::take(&mut state.unprocessed_next_batch).min(operations.len());
        let unprocessed = operations.split_off(operations.len() - skip);
        for op in operations {
            apply(&mut state, op)?;
        }
        Ok(BatchOutcome { unprocessed })
    }

    async fn scan_keys(&self, table: &TableRef, request: ScanRequest) -> KvResult<ScanPage> {
        let mut state = self.state.lock();
        state.calls.scan_keys += 1;
        state.check_available()?;

        let items = &state.table_mut(&table.name)?.items;
        let lower = match &request.exclusive_start_key {
            Some(start) => Bound::Excluded(start.clone()),
            None => Bound::Unbounded,
        };
        let mut remaining = items.range((lower, Bound::Unbounded)).map(|(k, _)| k);

        let limit = request.limit.unwrap_or(usize::MAX);
        let keys: Vec<String> = remaining.by_ref().take(limit).cloned().collect();
        let last_evaluated_key = if remaining.next().is_some() {
            keys.last().cloned()
        } else {
            None
        };
        Ok(ScanPage {
            keys,
            last_evaluated_key,
        })
    }
}
