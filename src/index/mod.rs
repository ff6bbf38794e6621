//! Index management.
//!
//! Declares the access paths the stores depend on. Indexes govern lookup
//! cost only; results are the same with or without them.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::storage::StorageBackend;
use crate::model::document::keys;
use crate::Result;

/// Type of index to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
    /// Ordered index for equality and range lookups.
    BTree,
    /// One entry per member of a set-valued field (`tags`).
    Multikey,
}

/// Record kind an index applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    Elements,
    Edges,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Elements => "elements",
            Collection::Edges => "graph",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// One declared access path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub collection: Collection,
    pub keys: Vec<(String, SortOrder)>,
    pub index_type: IndexType,
}

impl IndexSpec {
    pub fn new(collection: Collection, keys: &[(&str, SortOrder)]) -> Self {
        Self {
            collection,
            keys: keys.iter().map(|(k, o)| (k.to_string(), *o)).collect(),
            index_type: IndexType::BTree,
        }
    }

    pub fn multikey(mut self) -> Self {
        self.index_type = IndexType::Multikey;
        self
    }

    /// Stable name, e.g. `elements.date_created_-1_value_1`.
    pub fn name(&self) -> String {
        let parts: Vec<String> = self
            .keys
            .iter()
            .map(|(k, o)| match o {
                SortOrder::Ascending => format!("{k}_1"),
                SortOrder::Descending => format!("{k}_-1"),
            })
            .collect();
        format!("{}.{}", self.collection.name(), parts.join("_"))
    }

    /// True if this spec covers exactly the given key names, in order.
    pub fn is_on(&self, collection: Collection, fields: &[&str]) -> bool {
        self.collection == collection
            && self.keys.len() == fields.len()
            && self.keys.iter().zip(fields).all(|((k, _), f)| k == f)
    }
}

/// The access paths element and edge operations rely on.
pub fn required_indexes() -> Vec<IndexSpec> {
    use SortOrder::*;
    vec![
        IndexSpec::new(
            Collection::Elements,
            &[(keys::DATE_CREATED, Descending), (keys::VALUE, Ascending)],
        ),
        IndexSpec::new(Collection::Elements, &[(keys::VALUE, Ascending)]),
        IndexSpec::new(Collection::Elements, &[(keys::TAGS, Ascending)]).multikey(),
        IndexSpec::new(Collection::Edges, &[("src", Ascending), ("dst", Ascending)]),
        IndexSpec::new(Collection::Edges, &[("src", Ascending)]),
        IndexSpec::new(Collection::Edges, &[("dst", Ascending)]),
    ]
}

/// Declare every required index on the backend. Returns how many were declared.
pub fn rebuild_indexes<B: StorageBackend + ?Sized>(backend: &B) -> Result<usize> {
    info!("Rebuilding indexes...");
    let specs = required_indexes();
    for spec in &specs {
        backend.create_index(spec)?;
    }
    Ok(specs.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_names() {
        let names: Vec<String> = required_indexes().iter().map(IndexSpec::name).collect();
        assert_eq!(
            names,
            vec![
                "elements.date_created_-1_value_1",
                "elements.value_1",
                "elements.tags_1",
                "graph.src_1_dst_1",
                "graph.src_1",
                "graph.dst_1",
            ]
        );
    }

    #[test]
    fn test_tags_index_is_multikey() {
        let specs = required_indexes();
        let tags = specs.iter().find(|s| s.is_on(Collection::Elements, &["tags"])).unwrap();
        assert_eq!(tags.index_type, IndexType::Multikey);
    }
}
