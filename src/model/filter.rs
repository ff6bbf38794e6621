//! Element filters used by `find` and neighbor expansion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Element, ElementKind, Value};

/// A predicate over decoded elements. `Default` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum ElementFilter {
    #[default]
    All,
    Type(ElementKind),
    Value(String),
    Tag(String),
    /// At least one of the tags.
    AnyTag(Vec<String>),
    /// Attribute equality; a list attribute matches if it contains the value.
    Attr { key: String, value: Value },
    CreatedAfter(DateTime<Utc>),
    And(Vec<ElementFilter>),
    Or(Vec<ElementFilter>),
    Not(Box<ElementFilter>),
}

/// Which access path can narrow the candidate set before filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexHint<'a> {
    Value(&'a str),
    Tag(&'a str),
    Scan,
}

impl ElementFilter {
    pub fn tag(tag: impl Into<String>) -> Self {
        ElementFilter::Tag(tag.into())
    }

    pub fn value(value: impl Into<String>) -> Self {
        ElementFilter::Value(value.into())
    }

    pub fn attr(key: impl Into<String>, value: impl Into<Value>) -> Self {
        ElementFilter::Attr { key: key.into(), value: value.into() }
    }

    pub fn and(self, other: ElementFilter) -> Self {
        match self {
            ElementFilter::All => other,
            ElementFilter::And(mut parts) => {
                parts.push(other);
                ElementFilter::And(parts)
            }
            this => ElementFilter::And(vec![this, other]),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, ElementFilter::All)
    }

    pub fn matches(&self, element: &Element) -> bool {
        match self {
            ElementFilter::All => true,
            ElementFilter::Type(kind) => element.kind == *kind,
            ElementFilter::Value(v) => element.value == *v,
            ElementFilter::Tag(t) => element.has_tag(t),
            ElementFilter::AnyTag(tags) => tags.iter().any(|t| element.has_tag(t)),
            ElementFilter::Attr { key, value } => element
                .field(key)
                .is_some_and(|v| v.contains_or_eq(value)),
            ElementFilter::CreatedAfter(t) => element.date_created > *t,
            ElementFilter::And(parts) => parts.iter().all(|f| f.matches(element)),
            ElementFilter::Or(parts) => parts.iter().any(|f| f.matches(element)),
            ElementFilter::Not(inner) => !inner.matches(element),
        }
    }

    /// The narrowest index this filter can be answered from.
    ///
    /// Only conjunctive positions are considered: anything under `Or` or
    /// `Not` has to scan.
    pub fn index_hint(&self) -> IndexHint<'_> {
        match self {
            ElementFilter::Value(v) => IndexHint::Value(v),
            ElementFilter::Tag(t) => IndexHint::Tag(t),
            ElementFilter::And(parts) => {
                let hints = parts.iter().map(ElementFilter::index_hint);
                let mut best = IndexHint::Scan;
                for hint in hints {
                    match hint {
                        IndexHint::Value(_) => return hint,
                        IndexHint::Tag(_) if best == IndexHint::Scan => best = hint,
                        _ => {}
                    }
                }
                best
            }
            _ => IndexHint::Scan,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Document, ElementId};

    fn element(kind: ElementKind, value: &str, tags: &[&str]) -> Element {
        let now = Utc::now();
        let doc: Document = kind
            .candidate(value)
            .with("tags", tags.to_vec())
            .with("date_created", now)
            .with("country", "NL");
        Element::from_document(kind, ElementId(1), doc).unwrap()
    }

    #[test]
    fn test_default_matches_everything() {
        let el = element(ElementKind::Ip, "1.2.3.4", &[]);
        assert!(ElementFilter::default().matches(&el));
    }

    #[test]
    fn test_composite_filters() {
        let el = element(ElementKind::Hostname, "evil.com", &["c2", "zeus"]);
        let f = ElementFilter::Type(ElementKind::Hostname).and(ElementFilter::tag("zeus"));
        assert!(f.matches(&el));

        let miss = ElementFilter::Or(vec![
            ElementFilter::Type(ElementKind::Url),
            ElementFilter::tag("phishing"),
        ]);
        assert!(!miss.matches(&el));
        assert!(ElementFilter::Not(Box::new(miss)).matches(&el));
    }

    #[test]
    fn test_attr_matches_attributes_and_tag_lists() {
        let el = element(ElementKind::Ip, "1.2.3.4", &["scanner"]);
        assert!(ElementFilter::attr("country", "NL").matches(&el));
        assert!(ElementFilter::attr("tags", "scanner").matches(&el));
        assert!(!ElementFilter::attr("country", "US").matches(&el));
        assert!(!ElementFilter::attr("missing", "x").matches(&el));
    }

    #[test]
    fn test_index_hint_prefers_value() {
        let f = ElementFilter::tag("c2").and(ElementFilter::value("evil.com"));
        assert_eq!(f.index_hint(), IndexHint::Value("evil.com"));
        assert_eq!(ElementFilter::tag("c2").index_hint(), IndexHint::Tag("c2"));
        let or = ElementFilter::Or(vec![ElementFilter::tag("a")]);
        assert_eq!(or.index_hint(), IndexHint::Scan);
    }
}
