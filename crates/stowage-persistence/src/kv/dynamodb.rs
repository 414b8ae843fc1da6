//! DynamoDB binding for [`KvClient`]
//!
//! ## Item Schema
//!
//! ```text
//! <key attribute>: String (partition key) - entity id or property id
//! data:            String (optional)      - JSON document
//! references:      String Set (optional)  - referencing property ids
//! ```
//!
//! `references` is a DynamoDB reserved word, so every expression goes
//! through `ExpressionAttributeNames`. Batch writes are split into chunks of
//! 25 requests, the `BatchWriteItem` limit.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, DeleteRequest, KeySchemaElement as DdbKeySchemaElement,
    KeyType as DdbKeyType, ProvisionedThroughput, PutRequest, ScalarAttributeType,
    TableStatus as DdbTableStatus, WriteRequest,
};
use aws_sdk_dynamodb::Client;
use aws_smithy_types::timeout::TimeoutConfig;
use stowage_config::PersistenceConfig;
use tracing::{debug, warn};

use crate::error::{KvError, KvResult};
use crate::kv::{
    BatchOperation, BatchOutcome, Item, KeySchemaElement, KeyType, KvClient, Projection,
    ScanPage, ScanRequest, TableDescription, TableRef, TableSpec, TableStatus,
    DATA_ATTRIBUTE, REFERENCES_ATTRIBUTE,
};

/// Maximum requests per `BatchWriteItem` call
pub const MAX_BATCH_SIZE: usize = 25;

/// DynamoDB-backed key-value client
#[derive(Clone)]
pub struct DynamoDbKvClient {
    client: Client,
}

impl std::fmt::Debug for DynamoDbKvClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbKvClient").finish_non_exhaustive()
    }
}

impl DynamoDbKvClient {
    /// Build a client from an SDK config, applying region, endpoint and
    /// timeout overrides from the persistence configuration
    pub fn new(sdk_config: &aws_config::SdkConfig, config: &PersistenceConfig) -> Self {
        let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config);

        if let Some(region) = &config.region {
            builder = builder.region(aws_sdk_dynamodb::config::Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint.clone());
        }
        if let Some(timeout_ms) = config.timeout_ms {
            let timeout_config = TimeoutConfig::builder()
                .operation_timeout(Duration::from_millis(timeout_ms))
                .build();
            builder = builder.timeout_config(timeout_config);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }

    /// Load the default AWS configuration chain, then apply overrides
    pub async fn from_env(config: &PersistenceConfig) -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(&sdk_config, config)
    }

    /// Wrap a pre-built client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn key(table: &TableRef, key: &str) -> HashMap<String, AttributeValue> {
        HashMap::from([(table.key_attribute.clone(), AttributeValue::S(key.to_string()))])
    }

    fn item_attributes(table: &TableRef, key: &str, item: Item) -> HashMap<String, AttributeValue> {
        let mut attributes = Self::key(table, key);
        if let Some(data) = item.data {
            attributes.insert(DATA_ATTRIBUTE.to_string(), AttributeValue::S(data));
        }
        if !item.references.is_empty() {
            attributes.insert(
                REFERENCES_ATTRIBUTE.to_string(),
                AttributeValue::Ss(item.references.into_iter().collect()),
            );
        }
        attributes
    }

    fn parse_item(attributes: &HashMap<String, AttributeValue>) -> Item {
        Item {
            data: attributes
                .get(DATA_ATTRIBUTE)
                .and_then(|v| v.as_s().ok())
                .cloned(),
            references: attributes
                .get(REFERENCES_ATTRIBUTE)
                .and_then(|v| v.as_ss().ok())
                .map(|ss| ss.iter().cloned().collect())
                .unwrap_or_default(),
        }
    }

    fn write_request(operation: &BatchOperation) -> KvResult<WriteRequest> {
        let request = match operation {
            BatchOperation::Put { table, key, item } => WriteRequest::builder()
                .put_request(
                    PutRequest::builder()
                        .set_item(Some(Self::item_attributes(table, key, item.clone())))
                        .build()
                        .map_err(|e| KvError::build(e.to_string()))?,
                )
                .build(),
            BatchOperation::Delete { table, key } => WriteRequest::builder()
                .delete_request(
                    DeleteRequest::builder()
                        .set_key(Some(Self::key(table, key)))
                        .build()
                        .map_err(|e| KvError::build(e.to_string()))?,
                )
                .build(),
        };
        Ok(request)
    }

    /// Partition key of an unprocessed write request
    fn request_key(request: &WriteRequest, key_attribute: &str) -> Option<String> {
        let attributes = match (request.put_request(), request.delete_request()) {
            (Some(put), _) => put.item(),
            (None, Some(delete)) => delete.key(),
            (None, None) => return None,
        };
        attributes
            .get(key_attribute)
            .and_then(|v| v.as_s().ok())
            .cloned()
    }

    async fn write_chunk(&self, chunk: Vec<BatchOperation>) -> KvResult<Vec<BatchOperation>> {
        let mut request_items: HashMap<String, Vec<WriteRequest>> = HashMap::new();
        for operation in &chunk {
            request_items
                .entry(operation.table().name.clone())
                .or_default()
                .push(Self::write_request(operation)?);
        }

        let response = self
            .client
            .batch_write_item()
            .set_request_items(Some(request_items))
            .send()
            .await
            .map_err(|e| map_sdk_error("BatchWriteItem", e))?;

        let Some(unprocessed) = response.unprocessed_items() else {
            return Ok(Vec::new());
        };
        let mut remaining = Vec::new();
        for operation in chunk {
            let table = operation.table();
            let Some(requests) = unprocessed.get(&table.name) else {
                continue;
            };
            if requests
                .iter()
                .any(|r| Self::request_key(r, &table.key_attribute).as_deref() == Some(operation.key()))
            {
                remaining.push(operation);
            }
        }
        Ok(remaining)
    }
}

fn map_sdk_error<E, R>(operation: &str, err: SdkError<E, R>) -> KvError
where
    E: std::error::Error + ProvideErrorMetadata + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    if let SdkError::TimeoutError(_) = err {
        return KvError::Timeout(operation.to_string());
    }
    if err.code() == Some("ResourceNotFoundException") {
        return KvError::TableNotFound(err.message().unwrap_or(operation).to_string());
    }
    KvError::transport(format!(
        "DynamoDB {} failed: {}",
        operation,
        DisplayErrorContext(&err)
    ))
}

fn convert_status(status: Option<&DdbTableStatus>) -> TableStatus {
    match status {
        Some(DdbTableStatus::Active) => TableStatus::Active,
        Some(DdbTableStatus::Creating) => TableStatus::Creating,
        Some(DdbTableStatus::Updating) => TableStatus::Updating,
        Some(DdbTableStatus::Deleting) => TableStatus::Deleting,
        Some(other) => TableStatus::Other(other.as_str().to_string()),
        None => TableStatus::Other("UNKNOWN".to_string()),
    }
}

#[async_trait]
impl KvClient for DynamoDbKvClient {
    async fn describe_table(&self, table: &str) -> KvResult<TableDescription> {
        let response = self
            .client
            .describe_table()
            .table_name(table)
            .send()
            .await
            .map_err(|e| match map_sdk_error("DescribeTable", e) {
                KvError::TableNotFound(_) => KvError::TableNotFound(table.to_string()),
                other => other,
            })?;

        let description = response
            .table()
            .ok_or_else(|| KvError::TableNotFound(table.to_string()))?;
        let key_schema = description
            .key_schema()
            .iter()
            .map(|k| KeySchemaElement {
                attribute_name: k.attribute_name().to_string(),
                key_type: match k.key_type() {
                    DdbKeyType::Hash => KeyType::Hash,
                    _ => KeyType::Range,
                },
            })
            .collect();

        Ok(TableDescription {
            name: table.to_string(),
            status: convert_status(description.table_status()),
            key_schema,
        })
    }

    async fn create_table(&self, spec: &TableSpec) -> KvResult<()> {
        let build = |e: aws_sdk_dynamodb::error::BuildError| KvError::build(e.to_string());

        self.client
            .create_table()
            .table_name(&spec.name)
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(&spec.key_attribute)
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .map_err(build)?,
            )
            .key_schema(
                DdbKeySchemaElement::builder()
                    .attribute_name(&spec.key_attribute)
                    .key_type(DdbKeyType::Hash)
                    .build()
                    .map_err(build)?,
            )
            .provisioned_throughput(
                ProvisionedThroughput::builder()
                    .read_capacity_units(spec.read_capacity)
                    .write_capacity_units(spec.write_capacity)
                    .build()
                    .map_err(build)?,
            )
            .send()
            .await
            .map_err(|e| map_sdk_error("CreateTable", e))?;
        debug!(table = %spec.name, "CreateTable accepted");
        Ok(())
    }

    async fn get_item(
        &self,
        table: &TableRef,
        key: &str,
        projection: Projection,
    ) -> KvResult<Option<Item>> {
        let mut request = self
            .client
            .get_item()
            .table_name(&table.name)
            .set_key(Some(Self::key(table, key)))
            .consistent_read(true);
        if projection == Projection::References {
            request = request
                .projection_expression("#k, #r")
                .expression_attribute_names("#k", &table.key_attribute)
                .expression_attribute_names("#r", REFERENCES_ATTRIBUTE);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_sdk_error("GetItem", e))?;
        Ok(response.item().map(Self::parse_item))
    }

    async fn put_item(&self, table: &TableRef, key: &str, item: Item) -> KvResult<()> {
        self.client
            .put_item()
            .table_name(&table.name)
            .set_item(Some(Self::item_attributes(table, key, item)))
            .send()
            .await
            .map_err(|e| map_sdk_error("PutItem", e))?;
        Ok(())
    }

    async fn delete_item(&self, table: &TableRef, key: &str) -> KvResult<()> {
        self.client
            .delete_item()
            .table_name(&table.name)
            .set_key(Some(Self::key(table, key)))
            .send()
            .await
            .map_err(|e| map_sdk_error("DeleteItem", e))?;
        Ok(())
    }

    async fn set_references(
        &self,
        table: &TableRef,
        key: &str,
        references: BTreeSet<String>,
    ) -> KvResult<()> {
        let request = self
            .client
            .update_item()
            .table_name(&table.name)
            .set_key(Some(Self::key(table, key)))
            .expression_attribute_names("#r", REFERENCES_ATTRIBUTE);

        let request = if references.is_empty() {
            request.update_expression("REMOVE #r")
        } else {
            request
                .update_expression("SET #r = :r")
                .expression_attribute_values(
                    ":r",
                    AttributeValue::Ss(references.into_iter().collect()),
                )
        };

        request
            .send()
            .await
            .map_err(|e| map_sdk_error("UpdateItem", e))?;
        Ok(())
    }

    async fn batch_write(&self, operations: Vec<BatchOperation>) -> KvResult<BatchOutcome> {
        let mut unprocessed = Vec::new();
        let mut operations = operations.into_iter().peekable();
        while operations.peek().is_some() {
            let chunk: Vec<BatchOperation> = operations.by_ref().take(MAX_BATCH_SIZE).collect();
            let size = chunk.len();
            let remaining = self.write_chunk(chunk).await?;
            if !remaining.is_empty() {
                warn!(
                    submitted = size,
                    unprocessed = remaining.len(),
                    "BatchWriteItem returned unprocessed items"
                );
            }
            unprocessed.extend(remaining);
        }
        Ok(BatchOutcome { unprocessed })
    }

    async fn scan_keys(&self, table: &TableRef, request: ScanRequest) -> KvResult<ScanPage> {
        let limit = request
            .limit
            .map(|l| i32::try_from(l).unwrap_or(i32::MAX));
        let response = self
            .client
            .scan()
            .table_name(&table.name)
            .projection_expression("#k")
            .expression_attribute_names("#k", &table.key_attribute)
            .set_limit(limit)
            .set_exclusive_start_key(
                request
                    .exclusive_start_key
                    .as_deref()
                    .map(|start| Self::key(table, start)),
            )
            .send()
            .await
            .map_err(|e| map_sdk_error("Scan", e))?;

        let keys = response
            .items()
            .iter()
            .filter_map(|item| item.get(&table.key_attribute))
            .filter_map(|v| v.as_s().ok().cloned())
            .collect();
        let last_evaluated_key = response
            .last_evaluated_key()
            .and_then(|k| k.get(&table.key_attribute))
            .and_then(|v| v.as_s().ok().cloned());

        Ok(ScanPage {
            keys,
            last_evaluated_key,
        })
    }
}
