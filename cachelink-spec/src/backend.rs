use crate::error::Result;
use crate::record::{Record, WriteOp};
use crate::table::TableName;
use async_trait::async_trait;
use std::sync::Arc;

/// Storage interface implemented by provider backends.
///
/// Absence is never an error: `get` yields `Ok(None)` and `delete` of a
/// missing key succeeds. Table lifecycle calls report
/// [`Error::TableExists`](crate::Error::TableExists) and
/// [`Error::TableNotFound`](crate::Error::TableNotFound).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short identifier such as `"dynamodb"`.
    fn kind(&self) -> &'static str;

    async fn get(&self, table: &TableName, key: &str) -> Result<Option<Record>>;
    async fn put(&self, table: &TableName, key: &str, record: &Record) -> Result<()>;
    async fn delete(&self, table: &TableName, key: &str) -> Result<()>;

    /// Apply writes for distinct keys of one table in a single round trip.
    async fn write_batch(&self, table: &TableName, writes: &[WriteOp]) -> Result<()>;

    async fn create_table(&self, table: &TableName) -> Result<()>;
    async fn delete_table(&self, table: &TableName) -> Result<()>;

    /// Cheap liveness probe used by the health check.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<T> StorageBackend for Arc<T>
where
    T: StorageBackend + ?Sized,
{
    fn kind(&self) -> &'static str {
        (**self).kind()
    }

    async fn get(&self, table: &TableName, key: &str) -> Result<Option<Record>> {
        (**self).get(table, key).await
    }

    async fn put(&self, table: &TableName, key: &str, record: &Record) -> Result<()> {
        (**self).put(table, key, record).await
    }

    async fn delete(&self, table: &TableName, key: &str) -> Result<()> {
        (**self).delete(table, key).await
    }

    async fn write_batch(&self, table: &TableName, writes: &[WriteOp]) -> Result<()> {
        (**self).write_batch(table, writes).await
    }

    async fn create_table(&self, table: &TableName) -> Result<()> {
        (**self).create_table(table).await
    }

    async fn delete_table(&self, table: &TableName) -> Result<()> {
        (**self).delete_table(table).await
    }

    async fn ping(&self) -> Result<()> {
        (**self).ping().await
    }
}

#[async_trait]
impl<T> StorageBackend for Box<T>
where
    T: StorageBackend + ?Sized,
{
    fn kind(&self) -> &'static str {
        (**self).kind()
    }

    async fn get(&self, table: &TableName, key: &str) -> Result<Option<Record>> {
        (**self).get(table, key).await
    }

    async fn put(&self, table: &TableName, key: &str, record: &Record) -> Result<()> {
        (**self).put(table, key, record).await
    }

    async fn delete(&self, table: &TableName, key: &str) -> Result<()> {
        (**self).delete(table, key).await
    }

    async fn write_batch(&self, table: &TableName, writes: &[WriteOp]) -> Result<()> {
        (**self).write_batch(table, writes).await
    }

    async fn create_table(&self, table: &TableName) -> Result<()> {
        (**self).create_table(table).await
    }

    async fn delete_table(&self, table: &TableName) -> Result<()> {
        (**self).delete_table(table).await
    }

    async fn ping(&self) -> Result<()> {
        (**self).ping().await
    }
}
