use anyhow::Result;
use async_trait::async_trait;
use cachelink_core::{Connector, ConnectorConfig, MemoryBackend};
use cachelink_provider_tests::{Capabilities, ConformanceSuite, ConnectorFactory, TestApp, TestEnv};
use serde_json::json;
use std::sync::Arc;

/// Hands out connectors sharing one in-memory backend, the way separate
/// processes would share one remote store.
struct MemoryFactory {
    backend: Arc<MemoryBackend>,
    settings: serde_json::Value,
}

impl MemoryFactory {
    fn new(buffer_timeout_ms: u64) -> Self {
        Self {
            backend: Arc::new(MemoryBackend::new()),
            settings: json!({"region": "eu-central-1", "bufferTimeout": buffer_timeout_ms}),
        }
    }
}

#[async_trait]
impl ConnectorFactory for MemoryFactory {
    async fn connect(&self) -> Result<Connector> {
        let config = ConnectorConfig::from_value(self.settings.clone())?;
        Ok(Connector::with_backend(config, self.backend.clone())?)
    }
}

fn env() -> TestEnv {
    TestEnv {
        app: TestApp::random(),
        cleanup: true,
    }
}

#[tokio::test]
async fn conformance_memory_buffered() -> Result<()> {
    let factory = MemoryFactory::new(20);
    ConformanceSuite::new("memory-buffered", &factory, Capabilities::default())
        .with_env(env())
        .run()
        .await?;
    assert!(factory.backend.batch_calls() > 0);
    assert!(factory.backend.table_names().is_empty());
    Ok(())
}

#[tokio::test]
async fn conformance_memory_write_through() -> Result<()> {
    let factory = MemoryFactory::new(0);
    ConformanceSuite::new("memory", &factory, Capabilities::default())
        .with_env(env())
        .run()
        .await?;
    assert_eq!(factory.backend.batch_calls(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn conformance_memory_multi_thread() -> Result<()> {
    let factory = MemoryFactory::new(5);
    ConformanceSuite::new("memory-mt", &factory, Capabilities::default())
        .with_env(env())
        .run()
        .await
}

#[tokio::test]
async fn kept_tables_survive_the_run() -> Result<()> {
    let factory = MemoryFactory::new(0);
    let env = TestEnv {
        app: TestApp::random(),
        cleanup: false,
    };
    let table = env.app.table().clone();
    ConformanceSuite::new("memory", &factory, Capabilities::default())
        .with_env(env)
        .run()
        .await?;
    assert_eq!(factory.backend.table_names(), vec![table]);
    Ok(())
}
