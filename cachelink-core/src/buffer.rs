//! Write buffer batching `set`/`delete` calls within the `bufferTimeout` window.
//!
//! - `WriteBuffer` is the cloneable handle callers submit through
//! - a single worker task drains the queue, groups writes per table and
//!   flushes them as successive batches of distinct keys
//! - every submission carries a oneshot reply resolved with its own batch's
//!   outcome

use crate::events::EventBus;
use cachelink_spec::{DynStorageBackend, Error, Result, TableName, WriteOp};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 1024;

/// Tuning for the buffer worker.
#[derive(Debug, Clone, Copy)]
pub struct BufferSettings {
    /// How long to keep collecting after the first queued write.
    pub window: Duration,
    /// Upper bound on writes per backend batch and per collection round.
    pub max_batch_size: usize,
}

struct PendingWrite {
    table: TableName,
    op: WriteOp,
    reply: oneshot::Sender<Result<()>>,
}

/// Handle for queueing writes to the buffer worker.
#[derive(Clone)]
pub struct WriteBuffer {
    sender: mpsc::Sender<PendingWrite>,
    events: EventBus,
}

impl std::fmt::Debug for WriteBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBuffer")
            .field("sender", &"<mpsc::Sender>")
            .finish()
    }
}

impl WriteBuffer {
    /// Start the worker on the current runtime.
    pub(crate) fn spawn(
        backend: DynStorageBackend,
        settings: BufferSettings,
        events: EventBus,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(run(receiver, backend, settings));
        Self { sender, events }
    }

    /// Queue a write and wait until the batch holding it has been applied.
    pub async fn submit(&self, table: TableName, op: WriteOp) -> Result<()> {
        let (reply, outcome) = oneshot::channel();
        let pending = PendingWrite { table, op, reply };
        if self.sender.send(pending).await.is_err() {
            return Err(self.worker_lost());
        }
        match outcome.await {
            Ok(result) => result,
            Err(_) => Err(self.worker_lost()),
        }
    }

    fn worker_lost(&self) -> Error {
        let err = Error::Unavailable("write buffer worker stopped".into());
        self.events.emit_error(err.clone());
        err
    }
}

async fn run(
    mut receiver: mpsc::Receiver<PendingWrite>,
    backend: DynStorageBackend,
    settings: BufferSettings,
) {
    while let Some(first) = receiver.recv().await {
        let mut pending = vec![first];
        let deadline = Instant::now() + settings.window;
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        while pending.len() < settings.max_batch_size {
            tokio::select! {
                _ = &mut sleep => break,
                next = receiver.recv() => match next {
                    Some(write) => pending.push(write),
                    None => break,
                },
            }
        }

        flush(&backend, pending, settings.max_batch_size).await;
    }
    debug!("write buffer drained, worker exiting");
}

async fn flush(backend: &DynStorageBackend, pending: Vec<PendingWrite>, max_batch_size: usize) {
    for (table, writes) in group_by_table(pending) {
        for batch in split_batches(writes, max_batch_size) {
            let (ops, replies): (Vec<WriteOp>, Vec<_>) =
                batch.into_iter().map(|w| (w.op, w.reply)).unzip();
            debug!(table = %table, writes = ops.len(), "flushing write batch");
            let result = backend.write_batch(&table, &ops).await;
            if let Err(err) = &result {
                warn!(table = %table, writes = ops.len(), error = %err, "write batch failed");
            }
            for reply in replies {
                // The caller may have gone away.
                let _ = reply.send(result.clone());
            }
        }
    }
}

/// Group writes per table, keeping first-seen table order and issue order.
fn group_by_table(pending: Vec<PendingWrite>) -> Vec<(TableName, Vec<PendingWrite>)> {
    let mut groups: Vec<(TableName, Vec<PendingWrite>)> = Vec::new();
    for write in pending {
        match groups.iter_mut().find(|(table, _)| *table == write.table) {
            Some((_, writes)) => writes.push(write),
            None => groups.push((write.table.clone(), vec![write])),
        }
    }
    groups
}

/// Split one table's writes into batches with no repeated key.
///
/// A repeated key closes the current batch, so later writes to a key always
/// land in a later batch.
fn split_batches(writes: Vec<PendingWrite>, max_batch_size: usize) -> Vec<Vec<PendingWrite>> {
    let mut batches = Vec::new();
    let mut current: Vec<PendingWrite> = Vec::new();
    let mut keys: HashSet<String> = HashSet::new();

    for write in writes {
        if current.len() >= max_batch_size || keys.contains(write.op.key()) {
            batches.push(std::mem::take(&mut current));
            keys.clear();
        }
        keys.insert(write.op.key().to_string());
        current.push(write);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use cachelink_spec::{Record, StorageBackend};
    use serde_json::json;
    use std::sync::Arc;

    fn pending(table: &str, op: WriteOp) -> PendingWrite {
        let (reply, _) = oneshot::channel();
        PendingWrite {
            table: TableName::new(table).unwrap(),
            op,
            reply,
        }
    }

    fn put(key: &str, n: i64) -> WriteOp {
        WriteOp::Put {
            key: key.into(),
            record: Record::new(json!({"count": n}), 10),
        }
    }

    fn keys(batch: &[PendingWrite]) -> Vec<&str> {
        batch.iter().map(|w| w.op.key()).collect()
    }

    #[test]
    fn repeated_keys_go_to_later_batches() {
        let writes = vec![
            pending("app001", put("k", 1)),
            pending("app001", put("j", 1)),
            pending("app001", put("k", 2)),
            pending("app001", put("k", 3)),
        ];
        let batches = split_batches(writes, 25);
        assert_eq!(batches.len(), 3);
        assert_eq!(keys(&batches[0]), vec!["k", "j"]);
        assert_eq!(keys(&batches[1]), vec!["k"]);
        assert_eq!(keys(&batches[2]), vec!["k"]);
    }

    #[test]
    fn batches_respect_size_limit() {
        let writes = (0..5)
            .map(|i| pending("app001", put(&format!("k{i}"), i)))
            .collect();
        let batches = split_batches(writes, 2);
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn groups_keep_table_order() {
        let writes = vec![
            pending("bbb", put("b1", 1)),
            pending("aaa", put("a1", 1)),
            pending("bbb", put("b2", 1)),
        ];
        let groups = group_by_table(writes);
        let tables: Vec<&str> = groups.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(tables, vec!["bbb", "aaa"]);
        assert_eq!(keys(&groups[0].1), vec!["b1", "b2"]);
    }

    #[tokio::test]
    async fn concurrent_writes_to_one_key_keep_issue_order() {
        let backend = Arc::new(MemoryBackend::new());
        let table = TableName::new("app001").unwrap();
        backend.create_table(&table).await.unwrap();

        let buffer = WriteBuffer::spawn(
            backend.clone(),
            BufferSettings {
                window: Duration::from_millis(20),
                max_batch_size: 25,
            },
            EventBus::new(),
        );

        let (a, b, c) = tokio::join!(
            buffer.submit(table.clone(), put("k", 1)),
            buffer.submit(table.clone(), put("k", 2)),
            buffer.submit(table.clone(), put("k", 3)),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();

        let stored = backend.get(&table, "k").await.unwrap().unwrap();
        assert_eq!(stored.data["count"], 3);
        assert_eq!(backend.batch_calls(), 3);
    }

    #[tokio::test]
    async fn failed_batch_only_fails_its_writes() {
        let backend = Arc::new(MemoryBackend::new());
        let good = TableName::new("good01").unwrap();
        let bad = TableName::new("bad001").unwrap();
        backend.create_table(&good).await.unwrap();
        backend.create_table(&bad).await.unwrap();
        backend.poison_key("poisoned");

        let buffer = WriteBuffer::spawn(
            backend.clone(),
            BufferSettings {
                window: Duration::from_millis(20),
                max_batch_size: 25,
            },
            EventBus::new(),
        );

        let (ok, failed, sibling) = tokio::join!(
            buffer.submit(good.clone(), put("fine", 1)),
            buffer.submit(bad.clone(), put("poisoned", 1)),
            buffer.submit(bad.clone(), put("neighbour", 1)),
        );
        ok.unwrap();
        assert!(matches!(failed, Err(Error::Backend(_))));
        assert!(matches!(sibling, Err(Error::Backend(_))));
        assert!(backend.get(&good, "fine").await.unwrap().is_some());
        assert!(backend.get(&bad, "neighbour").await.unwrap().is_none());
    }
}
