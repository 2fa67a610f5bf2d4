#![cfg(feature = "integration")]

use anyhow::{Context, Result};
use async_trait::async_trait;
use cachelink_core::{Connector, ConnectorConfig};
use cachelink_dynamodb::{build_backend, connect};
use cachelink_provider_tests::{
    Backoff, Capabilities, ConformanceSuite, ConnectorFactory, TestEnv, env_flag,
};
use std::time::Duration;

struct DynamoFactory {
    config: ConnectorConfig,
}

impl DynamoFactory {
    async fn new() -> Result<Self> {
        let config = ConnectorConfig::from_env().context("CACHELINK_* settings are incomplete")?;
        // DynamoDB Local may still be starting when the suite runs.
        Backoff::new(5, Duration::from_millis(500))
            .retry(|| build_backend(&config))
            .await
            .context("dynamodb endpoint unreachable")?;
        Ok(Self { config })
    }

    fn capabilities(&self) -> Capabilities {
        if self.config.buffer_timeout().is_zero() {
            // Unbuffered puts race on the wire.
            Capabilities::default().unordered_writes()
        } else {
            Capabilities::default()
        }
    }
}

#[async_trait]
impl ConnectorFactory for DynamoFactory {
    async fn connect(&self) -> Result<Connector> {
        Ok(connect(self.config.clone())?)
    }
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "integration test; requires CACHELINK_INTEGRATION=1"]
async fn conformance_dynamodb() -> Result<()> {
    if !env_flag("CACHELINK_INTEGRATION") {
        eprintln!("CACHELINK_INTEGRATION=1 not set; skipping conformance");
        return Ok(());
    }
    let factory = DynamoFactory::new().await?;
    ConformanceSuite::new("dynamodb", &factory, factory.capabilities())
        .with_env(TestEnv::from_env())
        .run()
        .await
}
