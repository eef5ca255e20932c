//! Configuration-string tokenizer.
//!
//! Every counter operation receives its parameters as a short text string of
//! `key:value` tokens separated by spaces:
//!
//! ```text
//! cfgstr := token (" " token)*
//! token  := key ":" value
//! ```
//!
//! Tokenizing is deliberately schema-free. [`parse`] extracts every token into
//! a [`ConfigMap`] and leaves it to the operation schemas in
//! [`crate::schema`] to pick the keys they need and coerce their values, so one
//! tokenizer serves all operations even though their key sets overlap.
//!
//! # Example
//!
//! ```
//! use counter_core::config_string::parse;
//!
//! let map = parse(Some("ch:1 cou:dc exp:125E6")).unwrap();
//! assert_eq!(map.get("ch"), Some("1"));
//! assert_eq!(map.get("exp"), Some("125E6"));
//! ```

use crate::error::{CounterError, CounterResult};
use std::collections::BTreeMap;
use tracing::warn;

/// Separator between key and value inside one token.
pub const KEY_VALUE_SEPARATOR: char = ':';

/// Separator between tokens.
pub const TOKEN_SEPARATOR: char = ' ';

/// Raw key to value mapping produced by [`parse`].
///
/// Keys and values are kept exactly as they appeared in the source string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMap {
    entries: BTreeMap<String, String>,
}

impl ConfigMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// True if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no keys were supplied.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterate over keys in key order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Insert a pair, rejecting a key that is already present.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> CounterResult<()> {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return Err(CounterError::DuplicateKey { key });
        }
        self.entries.insert(key, value.into());
        Ok(())
    }
}

/// Tokenize a configuration string.
///
/// * `None` is not an error: a warning is logged and an empty map returned,
///   so operations whose keys are all optional run with defaults.
/// * Leading and trailing whitespace is trimmed, the rest is split on single
///   spaces and empty tokens (from repeated spaces) are dropped.
/// * Each token is split once, on its first `:`. The value keeps any further
///   `:` characters.
///
/// # Errors
///
/// * [`CounterError::MalformedToken`] if a token has no `:` or an empty key.
/// * [`CounterError::DuplicateKey`] if a key appears twice.
pub fn parse(cfgstr: Option<&str>) -> CounterResult<ConfigMap> {
    let Some(raw) = cfgstr else {
        warn!("Empty configuration string passed to the config parser");
        return Ok(ConfigMap::new());
    };

    let mut map = ConfigMap::new();
    for token in raw.trim().split(TOKEN_SEPARATOR) {
        if token.is_empty() {
            continue;
        }
        let (key, value) = token
            .split_once(KEY_VALUE_SEPARATOR)
            .filter(|(key, _)| !key.is_empty())
            .ok_or_else(|| CounterError::MalformedToken {
                token: token.to_string(),
            })?;
        map.insert(key, value)?;
    }
    Ok(map)
}
