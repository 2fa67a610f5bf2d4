use cachelink_core::TableName;
use rand::Rng;
use rand::distr::Alphanumeric;
use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub const APP_ID_LEN: usize = 6;
const APP_ID_ENV: &str = "CACHELINK_TEST_APP_ID";
const KEEP_ENV: &str = "CACHELINK_TEST_KEEP";

/// Parsed test environment configuration.
#[derive(Debug, Clone)]
pub struct TestEnv {
    pub app: TestApp,
    pub cleanup: bool,
}

impl TestEnv {
    pub fn from_env() -> Self {
        Self {
            app: TestApp::from_env(),
            cleanup: !env_flag(KEEP_ENV),
        }
    }
}

/// True when `var` holds `1`, `true`, `yes` or `on`, in any case.
pub fn env_flag(var: &str) -> bool {
    env::var(var).is_ok_and(|value| is_truthy(&value))
}

fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    ["1", "true", "yes", "on"]
        .iter()
        .any(|truthy| value.eq_ignore_ascii_case(truthy))
}

/// Application id owning the test table, plus a key generator inside it.
#[derive(Debug, Clone)]
pub struct TestApp {
    table: TableName,
    counter: Arc<AtomicU64>,
}

impl TestApp {
    /// Uses `CACHELINK_TEST_APP_ID` when set, otherwise a random id.
    pub fn from_env() -> Self {
        env::var(APP_ID_ENV)
            .ok()
            .filter(|explicit| explicit.len() == APP_ID_LEN)
            .and_then(Self::new)
            .unwrap_or_else(Self::random)
    }

    pub fn random() -> Self {
        let id: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(APP_ID_LEN)
            .map(char::from)
            .collect();
        Self::new(id).expect("alphanumeric app ids are valid table names")
    }

    fn new(id: String) -> Option<Self> {
        let table = TableName::new(id).ok()?;
        Some(Self {
            table,
            counter: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Table name for this app; it is also the key prefix.
    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn id(&self) -> &str {
        self.table.as_str()
    }

    /// Derive a unique key inside the app's table.
    pub fn key(&self, suffix: &str) -> String {
        let next = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}{suffix}{next}", self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_unique_and_prefixed() {
        let app = TestApp::new("Xj43s3".into()).unwrap();
        let k1 = app.key("someValue");
        let k2 = app.key("someValue");
        assert_ne!(k1, k2);
        assert!(k1.starts_with("Xj43s3"));
        assert_eq!(app.table().as_str(), "Xj43s3");
    }

    #[test]
    fn truthy_flags() {
        for value in ["1", "true", "TRUE", " yes ", "On"] {
            assert!(is_truthy(value), "{value:?}");
        }
        for value in ["", "0", "false", "no", "keep"] {
            assert!(!is_truthy(value), "{value:?}");
        }
    }

    #[test]
    fn random_ids_have_app_id_width() {
        let app = TestApp::random();
        assert_eq!(app.id().len(), APP_ID_LEN);
        assert!(app.id().chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
