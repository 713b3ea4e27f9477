//! Typed key/value settings.

use super::Database;
use crate::error::{Error, Result};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored setting value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SettingValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Structured(Value),
}

impl SettingValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            SettingValue::String(_) => "string",
            SettingValue::Integer(_) => "integer",
            SettingValue::Float(_) => "float",
            SettingValue::Boolean(_) => "boolean",
            SettingValue::Structured(_) => "structured",
        }
    }

    fn encode(&self) -> Result<String> {
        Ok(match self {
            SettingValue::String(s) => s.clone(),
            SettingValue::Integer(i) => i.to_string(),
            SettingValue::Float(f) => f.to_string(),
            SettingValue::Boolean(b) => b.to_string(),
            SettingValue::Structured(v) => serde_json::to_string(v)?,
        })
    }

    fn decode(key: &str, value_type: &str, raw: String) -> Result<Self> {
        let bad = |what: &str, raw: &str| {
            Error::Config(format!("setting {} holds an invalid {} value: {}", key, what, raw))
        };
        match value_type {
            "string" => Ok(SettingValue::String(raw)),
            "integer" => raw.parse().map(SettingValue::Integer).map_err(|_| bad("integer", &raw)),
            "float" => raw.parse().map(SettingValue::Float).map_err(|_| bad("float", &raw)),
            "boolean" => raw.parse().map(SettingValue::Boolean).map_err(|_| bad("boolean", &raw)),
            "structured" => Ok(SettingValue::Structured(serde_json::from_str(&raw)?)),
            other => Err(Error::Config(format!(
                "setting {} has unknown type {}",
                key, other
            ))),
        }
    }
}

impl Database {
    /// Get a setting.
    pub fn get_setting(&self, key: &str) -> Result<Option<SettingValue>> {
        self.with_conn(|conn| {
            let result = conn.query_row(
                "SELECT value_type, value FROM settings WHERE key = ?1",
                params![key],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            );
            match result {
                Ok((value_type, raw)) => Ok(Some(SettingValue::decode(key, &value_type, raw)?)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Insert or replace a setting.
    pub fn set_setting(&self, key: &str, value: &SettingValue) -> Result<()> {
        let raw = value.encode()?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO settings (key, value_type, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value_type = excluded.value_type, value = excluded.value",
                params![key, value.type_name(), raw],
            )?;
            Ok(())
        })
    }

    /// Remove a setting. Returns whether it existed.
    pub fn delete_setting(&self, key: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
            Ok(deleted > 0)
        })
    }
}
