//! API key → available tags registry.

use crate::model::{Document, Value};
use crate::storage::StorageBackend;
use crate::{Error, Result, Store};
use super::PUBLIC_API;

const API_KEY: &str = "api-key";
const AVAILABLE_TAGS: &str = "available-tags";

impl<B: StorageBackend> Store<B> {
    /// Get-or-create the record for `api_key`, then add `tag` to its set.
    pub fn add_tag_to_key(&self, api_key: &str, tag: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut tags = self.stored_tags(api_key)?;
        if tags.iter().any(|t| t == tag) {
            return Ok(());
        }
        tags.push(tag.to_string());
        let doc = Document::new()
            .with(API_KEY, api_key)
            .with(AVAILABLE_TAGS, Value::from(tags));
        self.backend.kv_put(PUBLIC_API, api_key, doc)
    }

    /// Tags available to `api_key`. Unknown keys have none.
    pub fn tags_for_key(&self, api_key: &str) -> Result<Vec<String>> {
        self.stored_tags(api_key)
    }

    fn stored_tags(&self, api_key: &str) -> Result<Vec<String>> {
        match self.backend.kv_get(PUBLIC_API, api_key)? {
            Some(doc) => doc.get_strings(AVAILABLE_TAGS).ok_or_else(|| {
                Error::Decode(format!("api key {api_key:?}: {AVAILABLE_TAGS} must be strings"))
            }),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_tag_list_is_not_overwritten() {
        let store = Store::open_memory().unwrap();
        let broken = Document::new()
            .with(API_KEY, "k1")
            .with(AVAILABLE_TAGS, Value::List(vec![Value::from("c2"), Value::Int(7)]));
        store.backend().kv_put(PUBLIC_API, "k1", broken.clone()).unwrap();

        assert!(matches!(store.add_tag_to_key("k1", "spam"), Err(Error::Decode(_))));
        assert!(matches!(store.tags_for_key("k1"), Err(Error::Decode(_))));
        assert_eq!(store.backend().kv_get(PUBLIC_API, "k1").unwrap(), Some(broken));
    }
}
