//! Shared types and the backend contract for cachelink connectors.

pub mod backend;
pub mod config;
pub mod error;
pub mod record;
pub mod table;

pub use backend::StorageBackend;
pub use config::{ConnectorConfig, MAX_BATCH_SIZE, StaticCredentials};
pub use error::{Error, Result};
pub use record::{Record, WriteOp};
pub use table::{TableName, TableRouting};

use std::sync::Arc;

pub type DynStorageBackend = Arc<dyn StorageBackend>;

