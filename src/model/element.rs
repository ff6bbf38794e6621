//! Element: a typed, deduplicated entity keyed by its `value`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::keys;
use super::{Document, Value};
use crate::{Error, Result};

/// Opaque, store-assigned element identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub u64);

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A field a variant wants shown to presentation collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayField {
    pub key: &'static str,
    pub label: &'static str,
}

const fn field(key: &'static str, label: &'static str) -> DisplayField {
    DisplayField { key, label }
}

/// The closed set of element variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Hostname,
    Url,
    Ip,
    As,
    Evil,
    /// Record stored without a `type` discriminator.
    Generic,
}

impl ElementKind {
    pub const TYPED: [ElementKind; 5] = [
        ElementKind::Hostname,
        ElementKind::Url,
        ElementKind::Ip,
        ElementKind::As,
        ElementKind::Evil,
    ];

    /// The `type` string stored in documents. `Generic` has none.
    pub fn discriminator(self) -> Option<&'static str> {
        match self {
            ElementKind::Hostname => Some("hostname"),
            ElementKind::Url => Some("url"),
            ElementKind::Ip => Some("ip"),
            ElementKind::As => Some("as"),
            ElementKind::Evil => Some("evil"),
            ElementKind::Generic => None,
        }
    }

    pub fn display_fields(self) -> &'static [DisplayField] {
        const HOSTNAME: &[DisplayField] = &[
            field("value", "Hostname"),
            field("domain", "Domain"),
            field("tags", "Tags"),
            field("date_updated", "Updated"),
        ];
        const URL: &[DisplayField] = &[
            field("value", "URL"),
            field("scheme", "Scheme"),
            field("hostname", "Hostname"),
            field("path", "Path"),
            field("tags", "Tags"),
        ];
        const IP: &[DisplayField] = &[
            field("value", "IP"),
            field("version", "Version"),
            field("country", "Country"),
            field("city", "City"),
            field("tags", "Tags"),
        ];
        const AS: &[DisplayField] = &[
            field("value", "AS"),
            field("as_name", "Name"),
            field("country", "Country"),
            field("tags", "Tags"),
        ];
        const EVIL: &[DisplayField] = &[
            field("value", "Value"),
            field("description", "Description"),
            field("link", "Link"),
            field("tags", "Tags"),
        ];
        const GENERIC: &[DisplayField] = &[
            field("value", "Value"),
            field("tags", "Tags"),
        ];
        match self {
            ElementKind::Hostname => HOSTNAME,
            ElementKind::Url => URL,
            ElementKind::Ip => IP,
            ElementKind::As => AS,
            ElementKind::Evil => EVIL,
            ElementKind::Generic => GENERIC,
        }
    }

    /// Start an ingestion candidate of this kind.
    pub fn candidate(self, value: impl Into<String>) -> Document {
        let doc = Document::new().with(keys::VALUE, value.into());
        match self.discriminator() {
            Some(t) => doc.with(keys::TYPE, t),
            None => doc,
        }
    }
}

/// A decoded element.
///
/// Produced only by the type registry at the storage-read boundary. The
/// persisted form is the [`Document`] returned by [`Element::to_document`];
/// `incoming_links` and `fields` are derived and never written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Element {
    pub id: ElementId,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub value: String,
    pub tags: BTreeSet<String>,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
    pub next_analysis: Option<DateTime<Utc>>,
    /// Type-specific attributes.
    pub attributes: Document,
    /// Ring-1 edges ending at this element. Populated by single-seed expansion.
    pub incoming_links: usize,
    pub fields: &'static [DisplayField],
}

impl Element {
    /// Build an element of `kind` from a stored document.
    ///
    /// Lifts the well-known keys out of the document; whatever remains
    /// becomes the type-specific attribute bag.
    pub fn from_document(kind: ElementKind, id: ElementId, mut doc: Document) -> Result<Self> {
        let value = match doc.remove(keys::VALUE) {
            Some(Value::String(s)) if !s.is_empty() => s,
            other => {
                return Err(Error::Decode(format!(
                    "element {id}: expected non-empty string value, got {}",
                    other.map_or("nothing", |v| v.type_name())
                )));
            }
        };
        let tags = doc
            .get_strings(keys::TAGS)
            .ok_or_else(|| Error::Decode(format!("element {id}: tags must be strings")))?
            .into_iter()
            .collect();
        let date_created = take_datetime(&mut doc, keys::DATE_CREATED)
            .ok_or_else(|| Error::Decode(format!("element {id}: missing date_created")))?;
        let date_updated = take_datetime(&mut doc, keys::DATE_UPDATED).unwrap_or(date_created);
        let next_analysis = take_datetime(&mut doc, keys::NEXT_ANALYSIS);

        for key in [keys::TYPE, keys::TAGS, keys::ID, keys::INCOMING_LINKS, keys::FIELDS] {
            doc.remove(key);
        }

        Ok(Self {
            id,
            kind,
            value,
            tags,
            date_created,
            date_updated,
            next_analysis,
            attributes: doc,
            incoming_links: 0,
            fields: kind.display_fields(),
        })
    }

    /// The persisted form of this element.
    pub fn to_document(&self) -> Document {
        let mut doc = self.attributes.clone();
        doc.insert(keys::VALUE, self.value.clone());
        if let Some(t) = self.kind.discriminator() {
            doc.insert(keys::TYPE, t);
        }
        doc.insert(
            keys::TAGS,
            Value::List(self.tags.iter().cloned().map(Value::String).collect()),
        );
        doc.insert(keys::DATE_CREATED, self.date_created);
        doc.insert(keys::DATE_UPDATED, self.date_updated);
        if let Some(next) = self.next_analysis {
            doc.insert(keys::NEXT_ANALYSIS, next);
        }
        doc
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Type-specific attribute lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Look up any field by its document key, including the well-known ones.
    pub fn field(&self, key: &str) -> Option<Value> {
        match key {
            keys::VALUE => Some(Value::from(self.value.as_str())),
            keys::TYPE => self.kind.discriminator().map(Value::from),
            keys::TAGS => Some(Value::List(
                self.tags.iter().cloned().map(Value::String).collect(),
            )),
            keys::DATE_CREATED => Some(Value::DateTime(self.date_created)),
            keys::DATE_UPDATED => Some(Value::DateTime(self.date_updated)),
            keys::NEXT_ANALYSIS => self.next_analysis.map(Value::DateTime),
            keys::INCOMING_LINKS => Some(Value::Int(self.incoming_links as i64)),
            other => self.attributes.get(other).cloned(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key, value);
        self
    }
}

fn take_datetime(doc: &mut Document, key: &str) -> Option<DateTime<Utc>> {
    doc.remove(key).and_then(|v| v.as_datetime())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(kind: ElementKind, value: &str) -> Document {
        let now = Utc::now();
        kind.candidate(value)
            .with(keys::TAGS, vec!["c2"])
            .with(keys::DATE_CREATED, now)
            .with(keys::DATE_UPDATED, now)
            .with("asn", "AS1234")
    }

    #[test]
    fn test_from_document_splits_attributes() {
        let el = Element::from_document(
            ElementKind::Hostname,
            ElementId(7),
            stored(ElementKind::Hostname, "evil.com"),
        )
        .unwrap();

        assert_eq!(el.value, "evil.com");
        assert!(el.has_tag("c2"));
        assert_eq!(el.get("asn"), Some(&Value::from("AS1234")));
        assert!(el.get("value").is_none());
        assert!(el.get("type").is_none());
        assert_eq!(el.incoming_links, 0);
        assert_eq!(el.fields[0].label, "Hostname");
    }

    #[test]
    fn test_missing_value_is_decode_error() {
        let mut doc = stored(ElementKind::Ip, "1.2.3.4");
        doc.remove(keys::VALUE);
        let err = Element::from_document(ElementKind::Ip, ElementId(1), doc).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_to_document_excludes_derived_fields() {
        let mut el = Element::from_document(
            ElementKind::Evil,
            ElementId(3),
            stored(ElementKind::Evil, "zeus"),
        )
        .unwrap();
        el.incoming_links = 4;

        let doc = el.to_document();
        assert_eq!(doc.get_str(keys::TYPE), Some("evil"));
        assert!(!doc.contains_key(keys::INCOMING_LINKS));
        assert!(!doc.contains_key(keys::FIELDS));
        assert!(!doc.contains_key(keys::ID));
    }

    #[test]
    fn test_generic_candidate_has_no_type() {
        let doc = ElementKind::Generic.candidate("whatever");
        assert!(!doc.contains_key(keys::TYPE));
    }
}
