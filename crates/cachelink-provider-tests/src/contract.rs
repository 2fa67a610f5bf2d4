use anyhow::Result;
use async_trait::async_trait;
use cachelink_core::Connector;

/// Builds fresh connectors against the backend under test.
///
/// The suite opens a new connector for each phase, so anything a phase
/// observes must have come from the backend rather than connector state.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    async fn connect(&self) -> Result<Connector>;
}
