use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MIN_TABLE_NAME_LEN: usize = 3;
pub const MAX_TABLE_NAME_LEN: usize = 255;
pub const DEFAULT_PREFIX_LEN: usize = 6;

/// Validate a table name against the backend naming rule.
pub fn validate_table_name(value: &str) -> Result<()> {
    let len = value.chars().count();
    if !(MIN_TABLE_NAME_LEN..=MAX_TABLE_NAME_LEN).contains(&len) {
        return Err(Error::InvalidTable {
            table: value.to_string(),
            reason: format!("must be {MIN_TABLE_NAME_LEN}..={MAX_TABLE_NAME_LEN} characters"),
        });
    }

    if !value
        .chars()
        .all(|c| matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' | '.'))
    {
        return Err(Error::InvalidTable {
            table: value.to_string(),
            reason: "contains invalid characters".into(),
        });
    }

    Ok(())
}

/// Name of a logical table, usually an application id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName(String);

impl TableName {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        validate_table_name(&value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TableName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for TableName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TableName> for String {
    fn from(value: TableName) -> Self {
        value.0
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Decides which table a key lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TableRouting {
    /// The first `len` characters of the key name the table.
    Prefix { len: usize },
    /// Every key lives in one table.
    Fixed { table: TableName },
}

impl Default for TableRouting {
    fn default() -> Self {
        Self::Prefix {
            len: DEFAULT_PREFIX_LEN,
        }
    }
}

impl TableRouting {
    pub fn validate(&self) -> Result<()> {
        match self {
            TableRouting::Prefix { len } => {
                if !(MIN_TABLE_NAME_LEN..=MAX_TABLE_NAME_LEN).contains(len) {
                    return Err(Error::config(
                        "routing",
                        format!(
                            "prefix length {len} must be within {MIN_TABLE_NAME_LEN}..={MAX_TABLE_NAME_LEN}"
                        ),
                    ));
                }
                Ok(())
            }
            TableRouting::Fixed { table } => validate_table_name(table.as_str())
                .map_err(|err| Error::config("routing", err.to_string())),
        }
    }

    /// Resolve the table that owns `key`.
    pub fn table_for(&self, key: &str) -> Result<TableName> {
        if key.is_empty() {
            return Err(Error::invalid_key(key, "key must not be empty"));
        }

        match self {
            TableRouting::Fixed { table } => Ok(table.clone()),
            TableRouting::Prefix { len } => {
                let prefix: String = key.chars().take(*len).collect();
                if prefix.chars().count() < *len {
                    return Err(Error::invalid_key(
                        key,
                        format!("shorter than the {len} character table prefix"),
                    ));
                }
                TableName::new(prefix).map_err(|err| match err {
                    Error::InvalidTable { reason, .. } => Error::invalid_key(key, reason),
                    other => other,
                })
            }
        }
    }
}
