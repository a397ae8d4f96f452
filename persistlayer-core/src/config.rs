//! Flat key-value configuration with dotted sections.
//!
//! [`ConfigParams`] stores string values under keys such as `connection.host` or
//! `options.max_pool_size`. Keys keep their insertion order, which matters when
//! configuration fragments are turned into connection strings.
//!
//! # Example
//!
//! ```ignore
//! use persistlayer::config::ConfigParams;
//!
//! let config = ConfigParams::from_tuples([
//!     ("collection", "dummies"),
//!     ("connection.host", "localhost"),
//!     ("connection.port", "27017"),
//! ]);
//!
//! assert_eq!(config.get_section("connection").get("host"), Some("localhost"));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PersistenceResult;

/// Ordered string map of configuration values.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigParams {
    entries: Vec<(String, String)>,
}

impl ConfigParams {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Creates a configuration from key/value pairs. Later duplicates override earlier ones.
    pub fn from_tuples<K, V>(tuples: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut config = Self::new();
        for (key, value) in tuples {
            config.set(key, value);
        }
        config
    }

    /// Creates a configuration from a JSON object, flattening nested objects into dotted keys.
    ///
    /// Scalars are stored in their textual form, `null` becomes an empty string and
    /// arrays are kept as JSON text.
    pub fn from_json(value: &Value) -> Self {
        let mut config = Self::new();
        Self::flatten_into(&mut config, None, value);
        config
    }

    /// Parses a JSON string and flattens it with [`from_json`](Self::from_json).
    pub fn from_json_str(json: &str) -> PersistenceResult<Self> {
        Ok(Self::from_json(&serde_json::from_str(json)?))
    }

    fn flatten_into(config: &mut Self, prefix: Option<&str>, value: &Value) {
        match value {
            Value::Object(map) => {
                for (key, nested) in map {
                    let full_key = match prefix {
                        Some(prefix) => format!("{prefix}.{key}"),
                        None => key.clone(),
                    };
                    Self::flatten_into(config, Some(&full_key), nested);
                }
            }
            other => {
                if let Some(key) = prefix {
                    let text = match other {
                        Value::Null => String::new(),
                        Value::String(s) => s.clone(),
                        _ => other.to_string(),
                    };
                    config.set(key, text);
                }
            }
        }
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Iterates over key/value pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Returns the raw value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the value under `key`, or an empty string.
    pub fn get_as_string(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_string()
    }

    /// Returns the value under `key` only when it is present and non-empty.
    pub fn get_as_nullable_string(&self, key: &str) -> Option<String> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// Parses the value under `key` as an integer. Float text is truncated.
    pub fn get_as_nullable_integer(&self, key: &str) -> Option<i64> {
        let value = self.get(key)?.trim();
        value
            .parse::<i64>()
            .ok()
            .or_else(|| value.parse::<f64>().ok().map(|f| f as i64))
    }

    pub fn get_as_integer_with_default(&self, key: &str, default: i64) -> i64 {
        self.get_as_nullable_integer(key).unwrap_or(default)
    }

    /// Parses the value under `key` as a boolean (`true/false`, `1/0`, `yes/no`).
    pub fn get_as_nullable_boolean(&self, key: &str) -> Option<bool> {
        match self.get(key)?.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "y" | "t" => Some(true),
            "false" | "0" | "no" | "n" | "f" => Some(false),
            _ => None,
        }
    }

    /// Sets a value. An existing key keeps its position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();

        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Removes a key and returns its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(position).1)
    }

    /// Copies every entry of `other` into this configuration, overriding duplicates.
    pub fn append(&mut self, other: &ConfigParams) {
        for (key, value) in other.iter() {
            self.set(key, value);
        }
    }

    /// Returns the entries under `name.` with the prefix stripped.
    pub fn get_section(&self, name: &str) -> ConfigParams {
        let prefix = format!("{name}.");

        self.entries
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(&prefix)
                    .map(|rest| (rest.to_string(), v.clone()))
            })
            .collect()
    }

    /// Returns the distinct first segments of dotted keys, in first-seen order.
    pub fn section_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();

        for key in self.keys() {
            if let Some((section, _)) = key.split_once('.') {
                if !names.iter().any(|n| n == section) {
                    names.push(section.to_string());
                }
            }
        }

        names
    }

    /// Adds every entry of `section` under `name.`.
    pub fn add_section(&mut self, name: &str, section: &ConfigParams) {
        for (key, value) in section.iter() {
            self.set(format!("{name}.{key}"), value);
        }
    }

    /// Returns a copy where `other` overrides this configuration.
    pub fn override_with(&self, other: &ConfigParams) -> ConfigParams {
        let mut result = self.clone();
        result.append(other);
        result
    }

    /// Returns a copy where this configuration overrides `defaults`.
    pub fn set_defaults(&self, defaults: &ConfigParams) -> ConfigParams {
        defaults.override_with(self)
    }
}

impl<K, V> FromIterator<(K, V)> for ConfigParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_tuples(iter)
    }
}
