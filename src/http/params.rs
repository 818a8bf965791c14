//! Case-normalized request parameters.
//!
//! # Responsibilities
//! - Build the parameter map from a query string or a form-encoded body
//! - Upper-case keys so lookups are case-insensitive
//! - Join repeated keys into one comma-separated value
//!
//! # Design Decisions
//! - Values are trimmed; an empty value is kept (presence matters for `wsdl`)
//! - The map is immutable once handed to the dispatch stage; stages that need
//!   a different view build a new map (`without`, `merge`)

use std::collections::BTreeMap;

/// Separator used when a key occurs more than once.
pub const VALUE_SEPARATOR: char = ',';

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterMap {
    values: BTreeMap<String, String>,
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw (still percent-encoded) query string.
    pub fn from_query(query: &str) -> Self {
        Self::from_pairs(url::form_urlencoded::parse(query.as_bytes()))
    }

    /// Parse an `application/x-www-form-urlencoded` body.
    pub fn from_form(body: &[u8]) -> Self {
        Self::from_pairs(url::form_urlencoded::parse(body))
    }

    fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut map = Self::new();
        for (key, value) in pairs {
            map.insert(key.as_ref(), value.as_ref());
        }
        map
    }

    /// Add a value; a repeated key is appended with the separator.
    pub fn insert(&mut self, key: &str, value: &str) {
        let key = key.trim().to_uppercase();
        if key.is_empty() {
            return;
        }
        let value = value.trim();
        self.values
            .entry(key)
            .and_modify(|existing| {
                existing.push(VALUE_SEPARATOR);
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&key.to_uppercase()).map(String::as_str)
    }

    /// Value of `key` if present and non-empty.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(&key.to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy of the map with the given keys removed.
    pub fn without(&self, keys: &[&str]) -> Self {
        let mut copy = self.clone();
        for key in keys {
            copy.values.remove(&key.to_uppercase());
        }
        copy
    }

    /// Add every entry of `other`; keys present in both are joined.
    pub fn merge(mut self, other: &ParameterMap) -> Self {
        for (key, value) in other.iter() {
            self.insert(key, value);
        }
        self
    }
}
