use crate::{
    Capabilities, ConnectorFactory, TestEnv, assert_absent, assert_get_eq, egon, mixed_payload,
    wolfram,
};
use anyhow::{Context, Result};
use cachelink_core::{Connector, Error};

/// Runs the shared conformance suite against a backend.
pub struct ConformanceSuite<'a, F: ConnectorFactory> {
    provider_name: String,
    factory: &'a F,
    caps: Capabilities,
    env: TestEnv,
}

impl<'a, F: ConnectorFactory> ConformanceSuite<'a, F> {
    pub fn new(provider_name: impl Into<String>, factory: &'a F, caps: Capabilities) -> Self {
        Self {
            provider_name: provider_name.into(),
            factory,
            caps,
            env: TestEnv::from_env(),
        }
    }

    pub fn with_env(mut self, env: TestEnv) -> Self {
        self.env = env;
        self
    }

    pub async fn run(&self) -> Result<()> {
        self.structure().await?;
        self.create_tables().await?;

        let exercised = self.values().await;
        let exercised = match exercised {
            Ok(()) => self.concurrent_writes().await,
            Err(err) => Err(err),
        };

        if self.env.cleanup {
            let dropped = self.delete_tables().await;
            exercised?;
            dropped
        } else {
            exercised
        }
    }

    async fn fresh(&self) -> Result<Connector> {
        let connector = self
            .factory
            .connect()
            .await
            .with_context(|| format!("connect failed for {}", self.provider_name))?;
        connector
            .wait_ready()
            .await
            .with_context(|| format!("{} never became ready", self.provider_name))?;
        Ok(connector)
    }

    async fn structure(&self) -> Result<()> {
        let connector = self.fresh().await?;
        if !connector.is_ready() {
            anyhow::bail!("{} reported ready but is_ready is false", self.provider_name);
        }
        if connector.name().is_empty() || connector.version().is_empty() {
            anyhow::bail!("{} must expose a name and a version", self.provider_name);
        }
        Ok(())
    }

    async fn create_tables(&self) -> Result<()> {
        let connector = self.fresh().await?;
        let table = self.env.app.table();

        connector
            .create_table(table.as_str())
            .await
            .with_context(|| format!("create_table failed for {}:{table}", self.provider_name))?;

        match connector.create_table(table.as_str()).await {
            Err(Error::TableExists { .. }) => Ok(()),
            Err(other) => Err(anyhow::anyhow!(
                "second create_table for {}:{table} failed with the wrong error: {other}",
                self.provider_name
            )),
            Ok(()) => anyhow::bail!(
                "second create_table for {}:{table} unexpectedly succeeded",
                self.provider_name
            ),
        }
    }

    async fn values(&self) -> Result<()> {
        let connector = self.fresh().await?;
        let name = &self.provider_name;
        let key = self.env.app.key("someValue");

        assert_absent(&connector, name, &key).await?;

        connector
            .set(&key, wolfram())
            .await
            .with_context(|| format!("set failed for {name}:{key}"))?;
        assert_get_eq(&connector, name, &key, &wolfram()).await?;

        connector
            .delete(&key)
            .await
            .with_context(|| format!("delete failed for {name}:{key}"))?;
        assert_absent(&connector, name, &key).await?;

        connector
            .delete(&key)
            .await
            .with_context(|| format!("deleting a missing key failed for {name}:{key}"))?;

        let mixed_key = self.env.app.key("mixed");
        let mixed = mixed_payload();
        connector
            .set(&mixed_key, mixed.clone())
            .await
            .with_context(|| format!("set failed for {name}:{mixed_key}"))?;
        let reader = self.fresh().await?;
        assert_get_eq(&reader, name, &mixed_key, &mixed).await?;
        connector.delete(&mixed_key).await?;

        Ok(())
    }

    async fn concurrent_writes(&self) -> Result<()> {
        let connector = self.fresh().await?;
        let name = &self.provider_name;
        let key = self.env.app.key("someOtherValue");

        let (first, second, third) = tokio::join!(
            connector.set(&key, egon(1)),
            connector.set(&key, egon(2)),
            connector.set(&key, egon(3)),
        );
        first.with_context(|| format!("write 1 failed for {name}:{key}"))?;
        second.with_context(|| format!("write 2 failed for {name}:{key}"))?;
        third.with_context(|| format!("write 3 failed for {name}:{key}"))?;

        let stored = connector
            .get(&key)
            .await
            .with_context(|| format!("get failed for {name}:{key}"))?
            .with_context(|| format!("no value after concurrent writes for {name}:{key}"))?;

        if self.caps.ordered_writes {
            if stored != egon(3) {
                anyhow::bail!("expected the last write for {name}:{key}, got {stored:?}");
            }
        } else if ![egon(1), egon(2), egon(3)].contains(&stored) {
            anyhow::bail!("value for {name}:{key} matches none of the writes: {stored:?}");
        }

        connector
            .delete(&key)
            .await
            .with_context(|| format!("delete failed for {name}:{key}"))
    }

    async fn delete_tables(&self) -> Result<()> {
        let connector = self.fresh().await?;
        let table = self.env.app.table();

        connector
            .delete_table(table.as_str())
            .await
            .with_context(|| format!("delete_table failed for {}:{table}", self.provider_name))?;

        match connector.delete_table(table.as_str()).await {
            Err(Error::TableNotFound { .. }) => Ok(()),
            Err(other) => Err(anyhow::anyhow!(
                "second delete_table for {}:{table} failed with the wrong error: {other}",
                self.provider_name
            )),
            Ok(()) => anyhow::bail!(
                "second delete_table for {}:{table} unexpectedly succeeded",
                self.provider_name
            ),
        }
    }
}
