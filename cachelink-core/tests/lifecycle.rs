use anyhow::Result;
use cachelink_core::{Connector, ConnectorConfig, ConnectorEvent, Error, MemoryBackend, Record};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn egon(count: i64) -> Record {
    Record::new(json!({"name": "Egon", "count": count}), 10)
}

#[test]
fn gibberish_settings_are_rejected() {
    let err = ConnectorConfig::from_value(json!("gibberish")).unwrap_err();
    assert!(err.is_config());
    assert!(err.to_string().contains("expected an object"));
}

#[tokio::test]
async fn settings_without_region_never_produce_a_connector() {
    let err = ConnectorConfig::from_value(json!({"bufferTimeout": 1200})).unwrap_err();
    assert!(err.is_config());
}

#[tokio::test(start_paused = true)]
async fn buffered_writes_to_one_key_apply_in_issue_order() -> Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let config = ConnectorConfig::from_value(json!({
        "region": "eu-central-1",
        "bufferTimeout": 1200,
    }))?;
    let connector = Connector::with_backend(config, backend.clone())?;
    connector.wait_ready().await?;
    connector.create_table("Xj43s3").await?;

    let key = "Xj43s3someOtherValue";
    let (a, b, c) = tokio::join!(
        connector.set(key, egon(1)),
        connector.set(key, egon(2)),
        connector.set(key, egon(3)),
    );
    a?;
    b?;
    c?;

    assert_eq!(connector.get(key).await?, Some(egon(3)));
    // One batch per write, since a key may appear once per batch.
    assert_eq!(backend.batch_calls(), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn distinct_keys_share_one_batch() -> Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let connector = Connector::with_backend(
        ConnectorConfig::new("eu-central-1", Duration::from_millis(50)),
        backend.clone(),
    )?;
    connector.wait_ready().await?;
    connector.create_table("Xj43s3").await?;

    let (a, b) = tokio::join!(
        connector.set("Xj43s3first", egon(1)),
        connector.set("Xj43s3second", egon(2)),
    );
    a?;
    b?;

    assert_eq!(backend.batch_calls(), 1);
    assert_eq!(connector.get("Xj43s3second").await?, Some(egon(2)));
    Ok(())
}

#[tokio::test]
async fn backend_errors_reach_the_caller() -> Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let connector = Connector::with_backend(
        ConnectorConfig::new("eu-central-1", Duration::ZERO),
        backend.clone(),
    )?;
    connector.wait_ready().await?;
    connector.create_table("Xj43s3").await?;

    backend.set_outage(Some("throttled"));
    let err = connector.set("Xj43s3someValue", egon(1)).await.unwrap_err();
    assert_eq!(err, Error::Backend("throttled".into()));

    backend.set_outage(None);
    connector.set("Xj43s3someValue", egon(1)).await?;
    assert_eq!(connector.get("Xj43s3someValue").await?, Some(egon(1)));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_health_probe_is_broadcast() -> Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let config = ConnectorConfig::from_value(json!({
        "region": "eu-central-1",
        "bufferTimeout": 0,
        "healthCheckIntervalMs": 1000,
    }))?;
    let connector = Connector::with_backend(config, backend.clone())?;
    connector.wait_ready().await?;
    let mut events = connector.subscribe();

    backend.set_outage(Some("connection reset"));
    let event = events.recv().await?;
    assert_eq!(
        event,
        ConnectorEvent::Error(Error::Backend("connection reset".into()))
    );
    Ok(())
}

#[tokio::test]
async fn clones_share_readiness() -> Result<()> {
    let connector = Connector::with_backend(
        ConnectorConfig::new("eu-central-1", Duration::ZERO),
        MemoryBackend::new(),
    )?;
    let other = connector.clone();
    other.wait_ready().await?;
    assert!(connector.is_ready());
    assert_eq!(connector.name(), "cachelink-core");
    assert!(!connector.version().is_empty());
    Ok(())
}
