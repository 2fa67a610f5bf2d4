use anyhow::{Context, Result};
use cachelink_core::{Connector, Record};

pub async fn assert_get_eq(
    connector: &Connector,
    provider_name: &str,
    key: &str,
    expected: &Record,
) -> Result<()> {
    let got = connector
        .get(key)
        .await
        .with_context(|| format!("get failed for {provider_name}:{key}"))?;
    let Some(actual) = got else {
        anyhow::bail!("expected value for {provider_name}:{key}, got none");
    };
    if &actual != expected {
        anyhow::bail!("value mismatch for {provider_name}:{key}: {actual:?} vs {expected:?}");
    }
    Ok(())
}

pub async fn assert_absent(connector: &Connector, provider_name: &str, key: &str) -> Result<()> {
    let got = connector
        .get(key)
        .await
        .with_context(|| format!("get failed for {provider_name}:{key}"))?;
    if let Some(value) = got {
        anyhow::bail!("expected no value for {provider_name}:{key}, got {value:?}");
    }
    Ok(())
}
