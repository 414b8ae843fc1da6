//! Table provisioning
//!
//! Run once at start-up. An existing table must be active and keyed by the
//! expected HASH attribute; a mismatch is never repaired. A missing table is
//! created only when allowed, then polled until it turns active or the
//! attempt budget runs out.

use std::time::Duration;

use stowage_config::ProvisioningConfig;
use tracing::{error, info, warn};

use crate::error::{KvError, PersistenceError, PersistenceResult};
use crate::kv::{KvClient, TableDescription, TableSpec, TableStatus};

/// Outcome of [`TableProvisioner::ensure_table`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableReadiness {
    Ready,
    /// Created, but not observed active within the poll budget
    Pending,
}

#[derive(Debug, Clone)]
pub struct TableProvisioner {
    poll_interval: Duration,
    max_attempts: u32,
    read_capacity: i64,
    write_capacity: i64,
}

impl TableProvisioner {
    pub fn new(config: &ProvisioningConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            max_attempts: config.max_attempts,
            read_capacity: config.read_capacity,
            write_capacity: config.write_capacity,
        }
    }

    /// Make sure `table` exists with a HASH key named `key_attribute`
    pub async fn ensure_table(
        &self,
        client: &dyn KvClient,
        table: &str,
        key_attribute: &str,
        allow_create: bool,
    ) -> PersistenceResult<TableReadiness> {
        match client.describe_table(table).await {
            Ok(description) => {
                verify(&description, key_attribute)?;
                info!(table = %table, "Table is active");
                Ok(TableReadiness::Ready)
            }
            Err(KvError::TableNotFound(_)) if !allow_create => {
                error!(table = %table, "Table does not exist and creation is disabled");
                Err(PersistenceError::configuration(format!(
                    "table {} does not exist and create_on_missing is off",
                    table
                )))
            }
            Err(KvError::TableNotFound(_)) => self.create_and_wait(client, table, key_attribute).await,
            Err(e) => {
                error!(table = %table, error = %e, "Failed to describe table");
                Err(PersistenceError::unavailable(e.to_string()))
            }
        }
    }

    async fn create_and_wait(
        &self,
        client: &dyn KvClient,
        table: &str,
        key_attribute: &str,
    ) -> PersistenceResult<TableReadiness> {
        info!(
            table = %table,
            key = %key_attribute,
            read_capacity = self.read_capacity,
            write_capacity = self.write_capacity,
            "Creating table"
        );
        client
            .create_table(&TableSpec {
                name: table.to_string(),
                key_attribute: key_attribute.to_string(),
                read_capacity: self.read_capacity,
                write_capacity: self.write_capacity,
            })
            .await
            .map_err(|e| {
                error!(table = %table, error = %e, "Failed to create table");
                PersistenceError::unavailable(e.to_string())
            })?;

        for attempt in 1..=self.max_attempts {
            tokio::time::sleep(self.poll_interval).await;
            let description = client.describe_table(table).await.map_err(|e| {
                error!(table = %table, error = %e, "Failed to poll table status");
                PersistenceError::unavailable(e.to_string())
            })?;
            if description.status == TableStatus::Active {
                info!(table = %table, attempt, "Table is active");
                return Ok(TableReadiness::Ready);
            }
            info!(table = %table, attempt, status = %description.status, "Waiting for table");
        }

        warn!(
            table = %table,
            attempts = self.max_attempts,
            "Table not active after polling; continuing"
        );
        Ok(TableReadiness::Pending)
    }
}

fn verify(description: &TableDescription, key_attribute: &str) -> PersistenceResult<()> {
    if description.status != TableStatus::Active {
        return Err(PersistenceError::configuration(format!(
            "table {} is {}, expected ACTIVE",
            description.name, description.status
        )));
    }
    match description.hash_key() {
        Some(key) if key == key_attribute => Ok(()),
        Some(key) => Err(PersistenceError::configuration(format!(
            "table {} is keyed by {}, expected {}",
            description.name, key, key_attribute
        ))),
        None => Err(PersistenceError::configuration(format!(
            "table {} has no HASH key, expected {}",
            description.name, key_attribute
        ))),
    }
}
