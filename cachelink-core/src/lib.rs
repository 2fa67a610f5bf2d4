//! Cache/storage connector: a uniform key/value and table lifecycle API over
//! a remote backend, with optional write buffering and lifecycle events.

pub mod buffer;
pub mod connector;
pub mod events;
pub mod memory;
pub mod telemetry;

pub use buffer::{BufferSettings, WriteBuffer};
pub use connector::{Connector, NAME, VERSION};
pub use events::ConnectorEvent;
pub use memory::MemoryBackend;

pub use cachelink_spec::{
    ConnectorConfig, Error, Record, Result, StorageBackend, TableName, TableRouting, WriteOp,
};
