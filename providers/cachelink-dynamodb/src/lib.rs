//! Amazon DynamoDB backend for the cachelink connector.
//!
//! Each record is one item `{ ds_id: S, v: N, _d: S }`, where `_d` holds the
//! JSON document as a string so arbitrary documents round-trip unchanged.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::config::Credentials;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, DeleteRequest, KeySchemaElement, KeyType,
    ProvisionedThroughput, PutRequest, ScalarAttributeType, TableStatus, WriteRequest,
};
use aws_types::region::Region;
use cachelink_core::Connector;
use cachelink_spec::{ConnectorConfig, Error, Record, Result, StorageBackend, TableName, WriteOp};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

const KEY_ATTR: &str = "ds_id";
const VERSION_ATTR: &str = "v";
const DATA_ATTR: &str = "_d";
const RESOURCE_IN_USE: &str = "ResourceInUseException";
const RESOURCE_NOT_FOUND: &str = "ResourceNotFoundException";
const CREDENTIALS_PROVIDER: &str = "cachelink-static";

/// Resubmissions of `UnprocessedItems` before a batch is reported failed.
pub const MAX_UNPROCESSED_ROUNDS: u32 = 8;
const UNPROCESSED_BACKOFF: Duration = Duration::from_millis(50);

/// Start a connector over DynamoDB.
///
/// The configuration is validated before anything is spawned; the client is
/// then built and the handshake run in the background.
pub fn connect(config: ConnectorConfig) -> Result<Connector> {
    let init_config = config.clone();
    Connector::spawn(config, async move { build_backend(&init_config).await })
}

/// Same as [`connect`] with the configuration read from `CACHELINK_*` variables.
pub fn connect_from_env() -> Result<Connector> {
    connect(ConnectorConfig::from_env()?)
}

/// Build the client and run the `ListTables` handshake.
pub async fn build_backend(config: &ConnectorConfig) -> Result<DynamoBackend> {
    let backend = DynamoBackend::from_config(config).await;
    backend.ping().await?;
    info!(region = %config.region, endpoint = ?config.endpoint, "dynamodb handshake complete");
    Ok(backend)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TableSettings {
    capacity: Option<(i64, i64)>,
    wait_timeout: Duration,
    poll_interval: Duration,
}

impl TableSettings {
    fn from_config(config: &ConnectorConfig) -> Self {
        Self {
            capacity: config.capacity(),
            wait_timeout: config.table_wait_timeout(),
            poll_interval: config.table_poll_interval(),
        }
    }
}

/// [`StorageBackend`] over one DynamoDB client.
#[derive(Clone)]
pub struct DynamoBackend {
    client: Client,
    tables: TableSettings,
}

impl std::fmt::Debug for DynamoBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoBackend")
            .field("tables", &self.tables)
            .finish_non_exhaustive()
    }
}

impl DynamoBackend {
    /// Build a client from the shared AWS config plus the connector overrides.
    pub async fn from_config(config: &ConnectorConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(creds) = config.credentials.as_ref() {
            loader = loader.credentials_provider(Credentials::new(
                creds.access_key_id.clone(),
                creds.secret_access_key.clone(),
                creds.session_token.clone(),
                None,
                CREDENTIALS_PROVIDER,
            ));
        }
        let shared_config = loader.load().await;

        let mut builder = aws_sdk_dynamodb::config::Builder::from(&shared_config);
        if let Some(endpoint) = config.endpoint.as_deref() {
            builder = builder.endpoint_url(endpoint);
        }
        Self::new(Client::from_conf(builder.build()), config)
    }

    pub fn new(client: Client, config: &ConnectorConfig) -> Self {
        Self {
            client,
            tables: TableSettings::from_config(config),
        }
    }

    async fn table_status(&self, table: &TableName) -> Result<Option<TableStatus>> {
        match self
            .client
            .describe_table()
            .table_name(table.as_str())
            .send()
            .await
        {
            Ok(output) => Ok(output
                .table()
                .and_then(|desc| desc.table_status())
                .cloned()),
            Err(err) if service_code(&err) == Some(RESOURCE_NOT_FOUND) => Ok(None),
            Err(err) => Err(storage_error("describe_table", err)),
        }
    }

    async fn wait_for_table<F>(&self, table: &TableName, target: &str, done: F) -> Result<()>
    where
        F: Fn(Option<&TableStatus>) -> bool,
    {
        let poll = move || self.table_status(table);
        wait_for_status(table, target, &self.tables, poll, done).await
    }
}

type RequestItems = HashMap<String, Vec<WriteRequest>>;

/// Send `pending` and resubmit whatever comes back unprocessed.
///
/// `send` returns the unprocessed items of one round trip. Fails with
/// `Error::Backend` once `MAX_UNPROCESSED_ROUNDS` resubmissions still leave
/// writes behind.
async fn drain_unprocessed<S, Fut>(mut pending: RequestItems, mut send: S) -> Result<()>
where
    S: FnMut(RequestItems) -> Fut,
    Fut: Future<Output = Result<RequestItems>>,
{
    let mut round = 0;
    loop {
        let unprocessed: RequestItems = send(pending)
            .await?
            .into_iter()
            .filter(|(_, requests)| !requests.is_empty())
            .collect();
        if unprocessed.is_empty() {
            return Ok(());
        }

        round += 1;
        let left: usize = unprocessed.values().map(Vec::len).sum();
        if round > MAX_UNPROCESSED_ROUNDS {
            return Err(Error::Backend(format!(
                "batch_write_item left {left} writes unprocessed after {MAX_UNPROCESSED_ROUNDS} resubmissions"
            )));
        }
        debug!(round, left, "resubmitting unprocessed writes");
        tokio::time::sleep(UNPROCESSED_BACKOFF * round).await;
        pending = unprocessed;
    }
}

/// Poll the table status until `done` accepts it or the wait times out.
async fn wait_for_status<P, Fut, F>(
    table: &TableName,
    target: &str,
    settings: &TableSettings,
    mut poll: P,
    done: F,
) -> Result<()>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<TableStatus>>>,
    F: Fn(Option<&TableStatus>) -> bool,
{
    let deadline = Instant::now() + settings.wait_timeout;
    loop {
        let status = poll().await?;
        if done(status.as_ref()) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(Error::Backend(format!(
                "table {table} not {target} after {:?} (status {status:?})",
                settings.wait_timeout
            )));
        }
        debug!(table = %table, status = ?status, "waiting for table");
        tokio::time::sleep(settings.poll_interval).await;
    }
}

#[async_trait]
impl StorageBackend for DynamoBackend {
    fn kind(&self) -> &'static str {
        "dynamodb"
    }

    #[instrument(skip_all, fields(table = %table, key = %key))]
    async fn get(&self, table: &TableName, key: &str) -> Result<Option<Record>> {
        let output = self
            .client
            .get_item()
            .table_name(table.as_str())
            .key(KEY_ATTR, AttributeValue::S(key.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|err| storage_error("get_item", err))?;
        output.item().map(decode_item).transpose()
    }

    #[instrument(skip_all, fields(table = %table, key = %key))]
    async fn put(&self, table: &TableName, key: &str, record: &Record) -> Result<()> {
        self.client
            .put_item()
            .table_name(table.as_str())
            .set_item(Some(encode_item(key, record)?))
            .send()
            .await
            .map_err(|err| storage_error("put_item", err))?;
        Ok(())
    }

    #[instrument(skip_all, fields(table = %table, key = %key))]
    async fn delete(&self, table: &TableName, key: &str) -> Result<()> {
        self.client
            .delete_item()
            .table_name(table.as_str())
            .key(KEY_ATTR, AttributeValue::S(key.to_string()))
            .send()
            .await
            .map_err(|err| storage_error("delete_item", err))?;
        Ok(())
    }

    #[instrument(skip_all, fields(table = %table, writes = writes.len()))]
    async fn write_batch(&self, table: &TableName, writes: &[WriteOp]) -> Result<()> {
        let requests = writes
            .iter()
            .map(write_request)
            .collect::<Result<Vec<_>>>()?;
        let pending = HashMap::from([(table.to_string(), requests)]);
        let client = &self.client;

        drain_unprocessed(pending, |items| {
            let request = client.batch_write_item().set_request_items(Some(items));
            async move {
                let output = request
                    .send()
                    .await
                    .map_err(|err| storage_error("batch_write_item", err))?;
                Ok(output.unprocessed_items().cloned().unwrap_or_default())
            }
        })
        .await
    }

    #[instrument(skip_all, fields(table = %table))]
    async fn create_table(&self, table: &TableName) -> Result<()> {
        let key_definition = AttributeDefinition::builder()
            .attribute_name(KEY_ATTR)
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(|err| Error::Backend(format!("create_table request: {err}")))?;
        let key_schema = KeySchemaElement::builder()
            .attribute_name(KEY_ATTR)
            .key_type(KeyType::Hash)
            .build()
            .map_err(|err| Error::Backend(format!("create_table request: {err}")))?;

        let mut request = self
            .client
            .create_table()
            .table_name(table.as_str())
            .attribute_definitions(key_definition)
            .key_schema(key_schema);
        request = match self.tables.capacity {
            Some((read, write)) => {
                let throughput = ProvisionedThroughput::builder()
                    .read_capacity_units(read)
                    .write_capacity_units(write)
                    .build()
                    .map_err(|err| Error::Backend(format!("create_table request: {err}")))?;
                request
                    .billing_mode(BillingMode::Provisioned)
                    .provisioned_throughput(throughput)
            }
            None => request.billing_mode(BillingMode::PayPerRequest),
        };

        match request.send().await {
            Ok(_) => {}
            Err(err) if service_code(&err) == Some(RESOURCE_IN_USE) => {
                return Err(Error::TableExists {
                    table: table.to_string(),
                });
            }
            Err(err) => return Err(storage_error("create_table", err)),
        }

        self.wait_for_table(table, "active", is_active).await?;
        info!(table = %table, "table active");
        Ok(())
    }

    #[instrument(skip_all, fields(table = %table))]
    async fn delete_table(&self, table: &TableName) -> Result<()> {
        match self
            .client
            .delete_table()
            .table_name(table.as_str())
            .send()
            .await
        {
            Ok(_) => {}
            Err(err) if service_code(&err) == Some(RESOURCE_NOT_FOUND) => {
                return Err(Error::TableNotFound {
                    table: table.to_string(),
                });
            }
            Err(err) => return Err(storage_error("delete_table", err)),
        }

        self.wait_for_table(table, "deleted", is_gone).await?;
        info!(table = %table, "table deleted");
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .list_tables()
            .limit(1)
            .send()
            .await
            .map_err(|err| {
                warn!(error = %DisplayErrorContext(&err), "dynamodb unreachable");
                storage_error("list_tables", err)
            })?;
        Ok(())
    }
}

fn is_active(status: Option<&TableStatus>) -> bool {
    status == Some(&TableStatus::Active)
}

fn is_gone(status: Option<&TableStatus>) -> bool {
    status.is_none()
}

fn encode_item(key: &str, record: &Record) -> Result<HashMap<String, AttributeValue>> {
    Ok(HashMap::from([
        (KEY_ATTR.to_string(), AttributeValue::S(key.to_string())),
        (
            VERSION_ATTR.to_string(),
            AttributeValue::N(record.version.to_string()),
        ),
        (
            DATA_ATTR.to_string(),
            AttributeValue::S(record.data_json()?),
        ),
    ]))
}

fn decode_item(item: &HashMap<String, AttributeValue>) -> Result<Record> {
    let version = item
        .get(VERSION_ATTR)
        .and_then(|value| value.as_n().ok())
        .ok_or_else(|| Error::Serialization(format!("item is missing numeric `{VERSION_ATTR}`")))?;
    let version: i64 = version
        .parse()
        .map_err(|err| Error::Serialization(format!("invalid version {version}: {err}")))?;
    let data = item
        .get(DATA_ATTR)
        .and_then(|value| value.as_s().ok())
        .ok_or_else(|| Error::Serialization(format!("item is missing string `{DATA_ATTR}`")))?;
    Record::from_parts(data, version)
}

fn write_request(op: &WriteOp) -> Result<WriteRequest> {
    let request = match op {
        WriteOp::Put { key, record } => {
            let put = PutRequest::builder()
                .set_item(Some(encode_item(key, record)?))
                .build()
                .map_err(|err| Error::Backend(format!("put request for {key}: {err}")))?;
            WriteRequest::builder().put_request(put).build()
        }
        WriteOp::Delete { key } => {
            let delete = DeleteRequest::builder()
                .key(KEY_ATTR, AttributeValue::S(key.clone()))
                .build()
                .map_err(|err| Error::Backend(format!("delete request for {key}: {err}")))?;
            WriteRequest::builder().delete_request(delete).build()
        }
    };
    Ok(request)
}

fn service_code<E, R>(err: &SdkError<E, R>) -> Option<&str>
where
    E: ProvideErrorMetadata,
{
    err.as_service_error().and_then(|service| service.code())
}

fn storage_error<E, R>(operation: &str, err: SdkError<E, R>) -> Error
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    Error::Backend(format!("{operation} failed: {}", DisplayErrorContext(&err)))
}
