//! Document: the flat attribute bag an element is stored as.

use std::collections::HashMap;
use std::collections::hash_map;

use serde::{Deserialize, Serialize};
use super::Value;

/// Well-known document keys.
pub mod keys {
    pub const ID: &str = "_id";
    pub const VALUE: &str = "value";
    pub const TYPE: &str = "type";
    pub const TAGS: &str = "tags";
    pub const DATE_CREATED: &str = "date_created";
    pub const DATE_UPDATED: &str = "date_updated";
    pub const NEXT_ANALYSIS: &str = "next_analysis";
    /// Derived by expansion, never persisted.
    pub const INCOMING_LINKS: &str = "incoming_links";
    /// Derived display-field list, never persisted.
    pub const FIELDS: &str = "fields";
}

/// A map of attribute names to values.
///
/// Write paths hand documents to the backend unchanged; read paths decode
/// them into [`Element`](super::Element)s through the type registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(HashMap<String, Value>);

impl Document {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    pub fn keys(&self) -> hash_map::Keys<'_, String, Value> {
        self.0.keys()
    }

    /// Strings held under `key`, accepting a single string or a list of strings.
    /// Returns None if the key is present with any other shape.
    pub fn get_strings(&self, key: &str) -> Option<Vec<String>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Some(Vec::new()),
            Some(Value::String(s)) => Some(vec![s.clone()]),
            Some(Value::List(items)) => items
                .iter()
                .map(|v| v.as_str().map(str::to_owned))
                .collect(),
            Some(_) => None,
        }
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = hash_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<Value>> From<Vec<(K, V)>> for Document {
    fn from(pairs: Vec<(K, V)>) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Map(doc.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_strings_accepts_scalar_and_list() {
        let doc = Document::new()
            .with("one", "a")
            .with("many", vec!["a", "b"])
            .with("bad", 3);
        assert_eq!(doc.get_strings("one"), Some(vec!["a".to_string()]));
        assert_eq!(doc.get_strings("many"), Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(doc.get_strings("missing"), Some(vec![]));
        assert_eq!(doc.get_strings("bad"), None);
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let doc = Document::new().with("value", "evil.com");
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.is_object());
        assert!(json.get("value").is_some());
    }
}
