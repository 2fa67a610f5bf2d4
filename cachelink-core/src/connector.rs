use crate::buffer::{BufferSettings, WriteBuffer};
use crate::events::{ConnectorEvent, EventBus};
use cachelink_spec::{
    ConnectorConfig, DynStorageBackend, Error, Record, Result, StorageBackend, TableName, WriteOp,
};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Connector implementation identifier.
pub const NAME: &str = env!("CARGO_PKG_NAME");
/// Connector semantic version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

enum BackendState {
    Connecting,
    Ready(ReadyBackend),
    Failed(Error),
}

#[derive(Clone)]
struct ReadyBackend {
    backend: DynStorageBackend,
    buffer: Option<WriteBuffer>,
}

struct Inner {
    config: ConnectorConfig,
    state: watch::Sender<BackendState>,
    events: EventBus,
}

/// Key/value storage connector over a remote backend.
///
/// Cloning yields another handle to the same connector and backend client.
#[derive(Clone)]
pub struct Connector {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("name", &NAME)
            .field("version", &VERSION)
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl Connector {
    /// Validate `config` and start initializing the backend produced by `init`.
    ///
    /// Validation happens before anything is spawned; an invalid configuration
    /// or a missing tokio runtime returns an error and no connector.
    pub fn spawn<B, F>(config: ConnectorConfig, init: F) -> Result<Self>
    where
        B: StorageBackend + 'static,
        F: Future<Output = Result<B>> + Send + 'static,
    {
        config.validate()?;
        let handle = Handle::try_current().map_err(|_| {
            Error::Runtime("connector must be created inside a tokio runtime".into())
        })?;

        let (state, _) = watch::channel(BackendState::Connecting);
        let inner = Arc::new(Inner {
            config,
            state,
            events: EventBus::new(),
        });

        let weak = Arc::downgrade(&inner);
        handle.spawn(async move {
            let outcome = init.await;
            if let Some(inner) = weak.upgrade() {
                let weak = Arc::downgrade(&inner);
                inner.finish_init(weak, outcome.map(|b| Arc::new(b) as DynStorageBackend));
            }
        });

        Ok(Self { inner })
    }

    /// Connector over an already constructed backend.
    pub fn with_backend<B>(config: ConnectorConfig, backend: B) -> Result<Self>
    where
        B: StorageBackend + 'static,
    {
        Self::spawn(config, async move { Ok(backend) })
    }

    pub fn name(&self) -> &'static str {
        NAME
    }

    pub fn version(&self) -> &'static str {
        VERSION
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.inner.config
    }

    /// True once the backend handshake has completed.
    pub fn is_ready(&self) -> bool {
        matches!(*self.inner.state.borrow(), BackendState::Ready(_))
    }

    /// Backend identifier, once ready.
    pub fn backend_kind(&self) -> Option<&'static str> {
        match &*self.inner.state.borrow() {
            BackendState::Ready(ready) => Some(ready.backend.kind()),
            _ => None,
        }
    }

    /// Wait for initialization; returns the handshake error if it failed.
    pub async fn wait_ready(&self) -> Result<()> {
        self.settled().await.map(|_| ())
    }

    /// Subscribe to `Ready` and out-of-band `Error` events.
    ///
    /// Events sent before subscribing are not replayed; use
    /// [`wait_ready`](Self::wait_ready) to observe readiness reliably.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectorEvent> {
        self.inner.events.subscribe()
    }

    /// Look up `key`; a missing record is `Ok(None)`.
    pub async fn get(&self, key: &str) -> Result<Option<Record>> {
        let table = self.inner.config.routing.table_for(key)?;
        let ready = self.ready().await?;
        debug!(table = %table, key, "get");
        ready.backend.get(&table, key).await
    }

    /// Store `record` under `key`, replacing any previous value.
    ///
    /// Completes once the write is visible to subsequent `get` calls.
    pub async fn set(&self, key: &str, record: Record) -> Result<()> {
        let table = self.inner.config.routing.table_for(key)?;
        let ready = self.ready().await?;
        debug!(table = %table, key, version = record.version, "set");
        match &ready.buffer {
            Some(buffer) => {
                let op = WriteOp::Put {
                    key: key.to_string(),
                    record,
                };
                buffer.submit(table, op).await
            }
            None => ready.backend.put(&table, key, &record).await,
        }
    }

    /// Remove `key`; removing a missing key succeeds.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let table = self.inner.config.routing.table_for(key)?;
        let ready = self.ready().await?;
        debug!(table = %table, key, "delete");
        match &ready.buffer {
            Some(buffer) => {
                let op = WriteOp::Delete {
                    key: key.to_string(),
                };
                buffer.submit(table, op).await
            }
            None => ready.backend.delete(&table, key).await,
        }
    }

    /// Create table `name`; fails with `TableExists` if it is already there.
    pub async fn create_table(&self, name: &str) -> Result<()> {
        let table = TableName::new(name)?;
        let ready = self.ready().await?;
        info!(table = %table, "creating table");
        ready.backend.create_table(&table).await
    }

    /// Delete table `name`; fails with `TableNotFound` if it does not exist.
    pub async fn delete_table(&self, name: &str) -> Result<()> {
        let table = TableName::new(name)?;
        let ready = self.ready().await?;
        info!(table = %table, "deleting table");
        ready.backend.delete_table(&table).await
    }

    async fn ready(&self) -> Result<ReadyBackend> {
        self.settled()
            .await
            .map_err(|err| Error::Unavailable(err.to_string()))
    }

    async fn settled(&self) -> Result<ReadyBackend> {
        let mut rx = self.inner.state.subscribe();
        let state = rx
            .wait_for(|state| !matches!(state, BackendState::Connecting))
            .await
            .map_err(|_| Error::Unavailable("connector shut down".into()))?;
        match &*state {
            BackendState::Ready(ready) => Ok(ready.clone()),
            BackendState::Failed(err) => Err(err.clone()),
            BackendState::Connecting => Err(Error::Unavailable("connector still starting".into())),
        }
    }
}

impl Inner {
    fn finish_init(&self, weak: Weak<Inner>, outcome: Result<DynStorageBackend>) {
        match outcome {
            Ok(backend) => {
                let window = self.config.buffer_timeout();
                let buffer = (!window.is_zero()).then(|| {
                    WriteBuffer::spawn(
                        backend.clone(),
                        BufferSettings {
                            window,
                            max_batch_size: self.config.max_batch_size,
                        },
                        self.events.clone(),
                    )
                });

                if let Some(interval) = self.config.health_check_interval() {
                    spawn_health_probe(weak, backend.clone(), interval);
                }

                info!(
                    backend = backend.kind(),
                    region = %self.config.region,
                    buffered = buffer.is_some(),
                    "connector ready"
                );
                self.state
                    .send_replace(BackendState::Ready(ReadyBackend { backend, buffer }));
                self.events.emit(ConnectorEvent::Ready);
            }
            Err(err) => {
                warn!(error = %err, "connector initialization failed");
                self.state.send_replace(BackendState::Failed(err.clone()));
                self.events.emit_error(err);
            }
        }
    }
}

fn spawn_health_probe(weak: Weak<Inner>, backend: DynStorageBackend, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else {
                break;
            };
            if let Err(err) = backend.ping().await {
                warn!(error = %err, "backend health probe failed");
                inner.events.emit_error(err);
            }
        }
        debug!("health probe stopped");
    });
}
