//! Element store: identity, deduplication by value, merge-upsert.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error};

use crate::model::document::keys;
use crate::model::{Document, Element, ElementFilter, ElementId, IndexHint, Value};
use crate::storage::{StorageBackend, StoredElement};
use crate::{Error, Result, Store};

/// Record counts, as shown at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub elements: u64,
    pub edges: u64,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DB loaded with {} elements", self.elements)?;
        write!(f, "Graph has {} edges", self.edges)
    }
}

impl<B: StorageBackend> Store<B> {
    /// Merge-upsert a candidate keyed by its `value`.
    ///
    /// Returns the stored element and whether it was created by this call.
    /// Tags are unioned into the existing set, `date_created` is kept,
    /// `date_updated` is refreshed. Any other key in the candidate
    /// overwrites the stored one.
    pub fn save(&self, candidate: Document) -> Result<(Element, bool)> {
        let mut payload = candidate;
        let value = match payload.get(keys::VALUE) {
            Some(Value::String(v)) if !v.is_empty() => v.clone(),
            _ => {
                return Err(Error::InvalidCandidate(
                    "candidate must carry a non-empty string value".into(),
                ));
            }
        };
        let tags = payload
            .get_strings(keys::TAGS)
            .ok_or_else(|| Error::InvalidCandidate(format!("{value}: tags must be strings")))?;
        for key in [keys::TAGS, keys::ID, keys::INCOMING_LINKS, keys::FIELDS] {
            payload.remove(key);
        }
        self.codec.registry().validate(&payload)?;
        let payload = self.codec.encode(payload);

        let now = Utc::now();
        let _guard = self.write_lock.lock();

        let is_new = match self.backend.elements_by_value(&value)?.as_slice() {
            [] => {
                self.backend.insert_element(created(payload, tags, now))?;
                true
            }
            [current] => {
                let merged = merged(&current.document, payload, tags, now);
                self.backend.replace_element(current.id, merged)?;
                false
            }
            many => return Err(uniqueness_breach(&value, many)),
        };

        let mut saved = self.backend.elements_by_value(&value)?;
        if saved.len() != 1 {
            return Err(uniqueness_breach(&value, &saved));
        }
        let element = self.codec.decode(saved.remove(0))?;

        let kind = element.kind.discriminator().unwrap_or("element");
        if is_new {
            debug!(target: "model", "(added {kind} {value})");
        } else {
            debug!(target: "model", "(updated {kind} {value})");
        }
        Ok((element, is_new))
    }

    /// Save a typed element. Its derived fields are not written.
    pub fn save_element(&self, element: &Element) -> Result<(Element, bool)> {
        self.save(element.to_document())
    }

    /// The element stored under `value`, if any.
    pub fn exists(&self, value: &str) -> Result<Option<Element>> {
        self.backend
            .elements_by_value(value)?
            .into_iter()
            .next()
            .map(|stored| self.codec.decode(stored))
            .transpose()
    }

    /// Delete by id. Absent ids are a no-op.
    pub fn remove(&self, id: ElementId) -> Result<()> {
        if self.backend.delete_element(id)? {
            debug!(target: "model", "(removed element {id})");
        }
        Ok(())
    }

    /// All elements matching `filter`, ordered by id.
    pub fn find(&self, filter: &ElementFilter) -> Result<Vec<Element>> {
        let candidates = match filter.index_hint() {
            IndexHint::Value(v) => self.backend.elements_by_value(v)?,
            IndexHint::Tag(t) => self.backend.elements_by_tag(t)?,
            IndexHint::Scan => self.backend.all_elements()?,
        };
        let mut found = self.decode_matching(candidates, filter)?;
        found.sort_by_key(|e| e.id);
        Ok(found)
    }

    pub fn find_one(&self, id: ElementId) -> Result<Option<Element>> {
        self.backend
            .get_element(id)?
            .map(|stored| self.codec.decode(stored))
            .transpose()
    }

    /// Newest elements first (ties broken by value), at most `limit`.
    pub fn find_recent(&self, filter: &ElementFilter, limit: usize) -> Result<Vec<Element>> {
        let mut out = Vec::with_capacity(limit.min(64));
        for stored in self.backend.elements_by_recency()? {
            if out.len() >= limit {
                break;
            }
            let element = self.codec.decode(stored)?;
            if filter.matches(&element) {
                out.push(element);
            }
        }
        Ok(out)
    }

    pub fn stats(&self) -> Result<Stats> {
        Ok(Stats {
            elements: self.backend.element_count()?,
            edges: self.backend.edge_count()?,
        })
    }

    /// Drop every element, edge and collaborator record.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.backend.clear()
    }

    pub(crate) fn decode_matching(
        &self,
        stored: Vec<StoredElement>,
        filter: &ElementFilter,
    ) -> Result<Vec<Element>> {
        let mut out = Vec::with_capacity(stored.len());
        for s in stored {
            let element = self.codec.decode(s)?;
            if filter.matches(&element) {
                out.push(element);
            }
        }
        Ok(out)
    }
}

/// First save of a value: stamp all three timestamps.
fn created(mut payload: Document, tags: Vec<String>, now: DateTime<Utc>) -> Document {
    payload.insert(keys::TAGS, tag_list(tags.into_iter().collect()));
    payload.insert(keys::DATE_CREATED, now);
    payload.insert(keys::DATE_UPDATED, now);
    payload.insert(keys::NEXT_ANALYSIS, now);
    payload
}

/// Later save: new document from the stored one plus the candidate.
fn merged(current: &Document, payload: Document, tags: Vec<String>, now: DateTime<Utc>) -> Document {
    let mut doc = current.clone();
    let mut union: BTreeSet<String> = current.get_strings(keys::TAGS).unwrap_or_default().into_iter().collect();
    union.extend(tags);

    for (key, value) in payload {
        if key != keys::DATE_CREATED {
            doc.insert(key, value);
        }
    }
    doc.insert(keys::TAGS, tag_list(union));
    doc.insert(keys::DATE_UPDATED, now);
    doc
}

fn tag_list(tags: BTreeSet<String>) -> Value {
    Value::List(tags.into_iter().map(Value::String).collect())
}

fn uniqueness_breach(value: &str, found: &[StoredElement]) -> Error {
    let ids: Vec<String> = found.iter().map(|s| s.id.to_string()).collect();
    error!(value, ids = ?ids, "element uniqueness violated");
    Error::InvariantViolation(format!(
        "{} elements stored for value {value:?} (ids {})",
        found.len(),
        ids.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_merged_keeps_creation_and_unions_tags() {
        let t0 = Utc::now() - Duration::hours(1);
        let current = Document::new()
            .with(keys::VALUE, "evil.com")
            .with(keys::TAGS, vec!["a", "b"])
            .with(keys::DATE_CREATED, t0)
            .with(keys::DATE_UPDATED, t0)
            .with(keys::NEXT_ANALYSIS, t0)
            .with("country", "NL");
        let payload = Document::new()
            .with(keys::VALUE, "evil.com")
            .with(keys::DATE_CREATED, Utc::now())
            .with("country", "US");

        let now = Utc::now();
        let doc = merged(&current, payload, vec!["b".into(), "c".into()], now);

        assert_eq!(doc.get_strings(keys::TAGS).unwrap(), vec!["a", "b", "c"]);
        assert_eq!(doc.get(keys::DATE_CREATED), Some(&Value::DateTime(t0)));
        assert_eq!(doc.get(keys::NEXT_ANALYSIS), Some(&Value::DateTime(t0)));
        assert_eq!(doc.get(keys::DATE_UPDATED), Some(&Value::DateTime(now)));
        assert_eq!(doc.get_str("country"), Some("US"));
    }

    #[test]
    fn test_created_stamps_everything() {
        let now = Utc::now();
        let doc = created(Document::new().with(keys::VALUE, "x"), vec!["t".into(), "t".into()], now);
        assert_eq!(doc.get_strings(keys::TAGS).unwrap(), vec!["t"]);
        for key in [keys::DATE_CREATED, keys::DATE_UPDATED, keys::NEXT_ANALYSIS] {
            assert_eq!(doc.get(key), Some(&Value::DateTime(now)));
        }
    }

    #[test]
    fn test_stats_display() {
        let stats = Stats { elements: 3, edges: 2 };
        assert_eq!(stats.to_string(), "DB loaded with 3 elements\nGraph has 2 edges");
    }
}
