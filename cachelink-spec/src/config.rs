use crate::error::{Error, Result};
use crate::table::{TableName, TableRouting};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::fmt;
use std::time::Duration;

pub const REGION_ENV: &str = "CACHELINK_REGION";
pub const FALLBACK_REGION_ENV: &str = "AWS_REGION";
pub const BUFFER_TIMEOUT_ENV: &str = "CACHELINK_BUFFER_TIMEOUT_MS";
pub const ENDPOINT_ENV: &str = "CACHELINK_ENDPOINT";
pub const PREFIX_LEN_ENV: &str = "CACHELINK_TABLE_PREFIX_LEN";
pub const TABLE_ENV: &str = "CACHELINK_TABLE";

/// Upper bound of a single `BatchWriteItem` request.
pub const MAX_BATCH_SIZE: usize = 25;
pub const DEFAULT_TABLE_WAIT_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_TABLE_POLL_INTERVAL_MS: u64 = 500;

fn default_max_batch_size() -> usize {
    MAX_BATCH_SIZE
}

fn default_table_wait_timeout_ms() -> u64 {
    DEFAULT_TABLE_WAIT_TIMEOUT_MS
}

fn default_table_poll_interval_ms() -> u64 {
    DEFAULT_TABLE_POLL_INTERVAL_MS
}

/// Static access keys used instead of the default credential chain.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Connection settings supplied once at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConnectorConfig {
    /// Backend region, e.g. `eu-central-1`.
    pub region: String,
    /// Write buffering window in milliseconds; `0` writes through.
    pub buffer_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<StaticCredentials>,
    #[serde(default)]
    pub routing: TableRouting,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_capacity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_capacity: Option<i64>,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_table_wait_timeout_ms")]
    pub table_wait_timeout_ms: u64,
    #[serde(default = "default_table_poll_interval_ms")]
    pub table_poll_interval_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_interval_ms: Option<u64>,
}

impl ConnectorConfig {
    /// Minimal configuration; everything else takes its default.
    pub fn new(region: impl Into<String>, buffer_timeout: Duration) -> Self {
        Self {
            region: region.into(),
            buffer_timeout: u64::try_from(buffer_timeout.as_millis()).unwrap_or(u64::MAX),
            endpoint: None,
            credentials: None,
            routing: TableRouting::default(),
            read_capacity: None,
            write_capacity: None,
            max_batch_size: MAX_BATCH_SIZE,
            table_wait_timeout_ms: DEFAULT_TABLE_WAIT_TIMEOUT_MS,
            table_poll_interval_ms: DEFAULT_TABLE_POLL_INTERVAL_MS,
            health_check_interval_ms: None,
        }
    }

    /// Parse and validate a host settings mapping.
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::config(
                "settings",
                format!("expected an object, got {}", json_kind(&value)),
            ));
        }
        let config: Self = serde_json::from_value(value)
            .map_err(|err| Error::config("settings", err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration from `CACHELINK_*` environment variables.
    ///
    /// * `CACHELINK_REGION` (falls back to `AWS_REGION`) is required.
    /// * `CACHELINK_BUFFER_TIMEOUT_MS` is required.
    /// * `CACHELINK_ENDPOINT` overrides the service endpoint.
    /// * `CACHELINK_TABLE` pins every key to one table, otherwise
    ///   `CACHELINK_TABLE_PREFIX_LEN` sets the app id prefix length.
    pub fn from_env() -> Result<Self> {
        let region = non_empty_env(REGION_ENV)
            .or_else(|| non_empty_env(FALLBACK_REGION_ENV))
            .ok_or_else(|| Error::config("region", format!("{REGION_ENV} must be set")))?;

        let buffer_timeout = non_empty_env(BUFFER_TIMEOUT_ENV)
            .ok_or_else(|| {
                Error::config("bufferTimeout", format!("{BUFFER_TIMEOUT_ENV} must be set"))
            })?
            .parse::<u64>()
            .map_err(|err| Error::config("bufferTimeout", err.to_string()))?;

        let mut config = Self::new(region, Duration::from_millis(buffer_timeout));
        config.endpoint = non_empty_env(ENDPOINT_ENV);

        if let Some(table) = non_empty_env(TABLE_ENV) {
            config.routing = TableRouting::Fixed {
                table: TableName::new(table)
                    .map_err(|err| Error::config("table", err.to_string()))?,
            };
        } else if let Some(len) = non_empty_env(PREFIX_LEN_ENV) {
            let len = len
                .parse::<usize>()
                .map_err(|err| Error::config("routing", err.to_string()))?;
            config.routing = TableRouting::Prefix { len };
        }

        config.validate()?;
        Ok(config)
    }

    /// Check every field; the connector refuses to start otherwise.
    pub fn validate(&self) -> Result<()> {
        validate_region(&self.region)?;

        if let Some(endpoint) = &self.endpoint
            && !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            return Err(Error::config(
                "endpoint",
                format!("{endpoint:?} must be an http(s) url"),
            ));
        }

        if let Some(creds) = &self.credentials {
            if creds.access_key_id.trim().is_empty() {
                return Err(Error::config("credentials", "accessKeyId must not be empty"));
            }
            if creds.secret_access_key.trim().is_empty() {
                return Err(Error::config(
                    "credentials",
                    "secretAccessKey must not be empty",
                ));
            }
        }

        match (self.read_capacity, self.write_capacity) {
            (None, None) => {}
            (Some(read), Some(write)) if read > 0 && write > 0 => {}
            (Some(_), Some(_)) => {
                return Err(Error::config("capacity", "capacities must be positive"));
            }
            _ => {
                return Err(Error::config(
                    "capacity",
                    "readCapacity and writeCapacity must be set together",
                ));
            }
        }

        if !(1..=MAX_BATCH_SIZE).contains(&self.max_batch_size) {
            return Err(Error::config(
                "maxBatchSize",
                format!("must be within 1..={MAX_BATCH_SIZE}"),
            ));
        }

        if self.table_poll_interval_ms == 0 {
            return Err(Error::config("tablePollIntervalMs", "must be positive"));
        }
        if self.table_poll_interval_ms > self.table_wait_timeout_ms {
            return Err(Error::config(
                "tablePollIntervalMs",
                "must not exceed tableWaitTimeoutMs",
            ));
        }

        if self.health_check_interval_ms == Some(0) {
            return Err(Error::config("healthCheckIntervalMs", "must be positive"));
        }

        self.routing.validate()
    }

    pub fn buffer_timeout(&self) -> Duration {
        Duration::from_millis(self.buffer_timeout)
    }

    pub fn table_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.table_wait_timeout_ms)
    }

    pub fn table_poll_interval(&self) -> Duration {
        Duration::from_millis(self.table_poll_interval_ms)
    }

    pub fn health_check_interval(&self) -> Option<Duration> {
        self.health_check_interval_ms.map(Duration::from_millis)
    }

    /// Provisioned throughput, when configured.
    pub fn capacity(&self) -> Option<(i64, i64)> {
        self.read_capacity.zip(self.write_capacity)
    }
}

fn validate_region(region: &str) -> Result<()> {
    if region.trim().is_empty() {
        return Err(Error::config("region", "must not be empty"));
    }
    if !region
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '-'))
    {
        return Err(Error::config(
            "region",
            format!("{region:?} contains invalid characters"),
        ));
    }
    let segments: Vec<&str> = region.split('-').collect();
    if segments.len() < 2 || segments.iter().any(|s| s.is_empty()) {
        return Err(Error::config(
            "region",
            format!("{region:?} is not a region identifier"),
        ));
    }
    Ok(())
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
