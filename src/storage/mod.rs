//! # Storage Backend Trait
//!
//! This is THE contract between the element/edge stores and any storage engine.
//! Backends store raw documents and edges, maintain the declared access
//! paths, and never interpret element types: decoding happens in
//! [`codec`], above this layer.
//!
//! ## Implementations
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `MemoryBackend` | `memory` | In-memory for testing/embedding |
//! | `SledBackend` | `sled` | Persistent, one tree per access path (`sled` feature) |

pub mod codec;
pub mod memory;
#[cfg(feature = "sled")]
pub mod sled;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::index::IndexSpec;
use crate::model::*;
use crate::Result;

pub use codec::Codec;
pub use memory::MemoryBackend;
#[cfg(feature = "sled")]
pub use self::sled::SledBackend;

// ============================================================================
// Backend Configuration
// ============================================================================

/// Which storage engine to open.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "lowercase")]
pub enum BackendConfig {
    /// In-memory (no persistence)
    #[default]
    Memory,

    /// sled database directory
    #[cfg(feature = "sled")]
    Sled { path: std::path::PathBuf },
}

// ============================================================================
// Raw records
// ============================================================================

/// An element document as the backend holds it, before decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredElement {
    pub id: ElementId,
    pub document: Document,
}

// ============================================================================
// StorageBackend Trait
// ============================================================================

/// The universal storage contract.
///
/// Every call blocks until the engine answers. Individual calls are atomic;
/// sequences of calls are not, and callers needing check-then-write must
/// serialize them themselves.
pub trait StorageBackend: Send + Sync + 'static {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Shut down the backend, flushing any pending writes.
    fn shutdown(&self) -> Result<()>;

    /// Drop every record in every collection. Declared indexes survive.
    fn clear(&self) -> Result<()>;

    // ========================================================================
    // Elements
    // ========================================================================

    /// Insert a new element document and assign it an id.
    fn insert_element(&self, doc: Document) -> Result<ElementId>;

    /// Replace the document stored under `id`, inserting it if absent.
    fn replace_element(&self, id: ElementId, doc: Document) -> Result<()>;

    fn get_element(&self, id: ElementId) -> Result<Option<StoredElement>>;

    /// Delete an element. Returns true if it existed.
    fn delete_element(&self, id: ElementId) -> Result<bool>;

    /// All elements whose `value` equals `value`. More than one is a
    /// uniqueness breach the caller must report.
    fn elements_by_value(&self, value: &str) -> Result<Vec<StoredElement>>;

    /// All elements carrying `tag`.
    fn elements_by_tag(&self, tag: &str) -> Result<Vec<StoredElement>>;

    fn all_elements(&self) -> Result<Vec<StoredElement>>;

    /// Fetch several elements by id. Missing ids are skipped.
    ///
    /// Default falls back to sequential `get_element` calls.
    fn elements_by_ids(&self, ids: &[ElementId]) -> Result<Vec<StoredElement>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(el) = self.get_element(*id)? {
                out.push(el);
            }
        }
        Ok(out)
    }

    /// All elements ordered by `date_created` descending, then `value` ascending.
    ///
    /// Default sorts a full scan.
    fn elements_by_recency(&self) -> Result<Vec<StoredElement>> {
        let mut all = self.all_elements()?;
        all.sort_by(|a, b| recency_key(&a.document).cmp(&recency_key(&b.document)));
        Ok(all)
    }

    fn element_count(&self) -> Result<u64>;

    // ========================================================================
    // Edges
    // ========================================================================

    /// Reserve an id for an edge that may be persisted later.
    fn allocate_edge_id(&self) -> Result<EdgeId>;

    /// Insert or replace the edge stored under `edge.id`.
    fn put_edge(&self, edge: &Edge) -> Result<()>;

    fn get_edge(&self, id: EdgeId) -> Result<Option<Edge>>;

    /// The edge for the exact ordered pair, if any.
    fn edge_by_pair(&self, src: ElementId, dst: ElementId) -> Result<Option<Edge>>;

    fn edges_by_src(&self, src: ElementId) -> Result<Vec<Edge>>;

    fn edges_by_dst(&self, dst: ElementId) -> Result<Vec<Edge>>;

    /// Every edge with an endpoint in `ids`, deduplicated and ordered by edge id.
    ///
    /// Default unions the per-id `src` and `dst` lookups.
    fn edges_touching(&self, ids: &[ElementId]) -> Result<Vec<Edge>> {
        let mut found: BTreeMap<EdgeId, Edge> = BTreeMap::new();
        for id in ids {
            for edge in self.edges_by_src(*id)? {
                found.entry(edge.id).or_insert(edge);
            }
            for edge in self.edges_by_dst(*id)? {
                found.entry(edge.id).or_insert(edge);
            }
        }
        Ok(found.into_values().collect())
    }

    fn edge_count(&self) -> Result<u64>;

    // ========================================================================
    // Index
    // ========================================================================

    /// Declare an access path. Idempotent. Backends reject paths they cannot serve.
    fn create_index(&self, spec: &IndexSpec) -> Result<()>;

    /// Access paths declared so far.
    fn indexes(&self) -> Result<Vec<IndexSpec>>;

    // ========================================================================
    // Keyed collections (collaborator records)
    // ========================================================================

    fn kv_get(&self, collection: &str, key: &str) -> Result<Option<Document>>;

    /// Upsert by key.
    fn kv_put(&self, collection: &str, key: &str, doc: Document) -> Result<()>;

    /// Returns true if the key existed.
    fn kv_delete(&self, collection: &str, key: &str) -> Result<bool>;

    /// Every record in the collection, ordered by key.
    fn kv_list(&self, collection: &str) -> Result<Vec<Document>>;
}

/// Sort key for the (`date_created` desc, `value` asc) access path.
/// Undated documents sort last.
pub(crate) type RecencyKey = (bool, std::cmp::Reverse<Option<chrono::DateTime<chrono::Utc>>>, String);

pub(crate) fn recency_key(doc: &Document) -> RecencyKey {
    let created = doc.get(document::keys::DATE_CREATED).and_then(Value::as_datetime);
    let value = doc.get_str(document::keys::VALUE).unwrap_or_default().to_string();
    (created.is_none(), std::cmp::Reverse(created), value)
}

// ============================================================================
// Boxed backends
// ============================================================================

/// Lets a store be opened over a backend chosen at runtime from [`BackendConfig`].
impl StorageBackend for Box<dyn StorageBackend> {
    fn shutdown(&self) -> Result<()> { (**self).shutdown() }
    fn clear(&self) -> Result<()> { (**self).clear() }

    fn insert_element(&self, doc: Document) -> Result<ElementId> { (**self).insert_element(doc) }
    fn replace_element(&self, id: ElementId, doc: Document) -> Result<()> { (**self).replace_element(id, doc) }
    fn get_element(&self, id: ElementId) -> Result<Option<StoredElement>> { (**self).get_element(id) }
    fn delete_element(&self, id: ElementId) -> Result<bool> { (**self).delete_element(id) }
    fn elements_by_value(&self, value: &str) -> Result<Vec<StoredElement>> { (**self).elements_by_value(value) }
    fn elements_by_tag(&self, tag: &str) -> Result<Vec<StoredElement>> { (**self).elements_by_tag(tag) }
    fn all_elements(&self) -> Result<Vec<StoredElement>> { (**self).all_elements() }
    fn elements_by_ids(&self, ids: &[ElementId]) -> Result<Vec<StoredElement>> { (**self).elements_by_ids(ids) }
    fn elements_by_recency(&self) -> Result<Vec<StoredElement>> { (**self).elements_by_recency() }
    fn element_count(&self) -> Result<u64> { (**self).element_count() }

    fn allocate_edge_id(&self) -> Result<EdgeId> { (**self).allocate_edge_id() }
    fn put_edge(&self, edge: &Edge) -> Result<()> { (**self).put_edge(edge) }
    fn get_edge(&self, id: EdgeId) -> Result<Option<Edge>> { (**self).get_edge(id) }
    fn edge_by_pair(&self, src: ElementId, dst: ElementId) -> Result<Option<Edge>> { (**self).edge_by_pair(src, dst) }
    fn edges_by_src(&self, src: ElementId) -> Result<Vec<Edge>> { (**self).edges_by_src(src) }
    fn edges_by_dst(&self, dst: ElementId) -> Result<Vec<Edge>> { (**self).edges_by_dst(dst) }
    fn edges_touching(&self, ids: &[ElementId]) -> Result<Vec<Edge>> { (**self).edges_touching(ids) }
    fn edge_count(&self) -> Result<u64> { (**self).edge_count() }

    fn create_index(&self, spec: &IndexSpec) -> Result<()> { (**self).create_index(spec) }
    fn indexes(&self) -> Result<Vec<IndexSpec>> { (**self).indexes() }

    fn kv_get(&self, collection: &str, key: &str) -> Result<Option<Document>> { (**self).kv_get(collection, key) }
    fn kv_put(&self, collection: &str, key: &str, doc: Document) -> Result<()> { (**self).kv_put(collection, key, doc) }
    fn kv_delete(&self, collection: &str, key: &str) -> Result<bool> { (**self).kv_delete(collection, key) }
    fn kv_list(&self, collection: &str) -> Result<Vec<Document>> { (**self).kv_list(collection) }
}

/// Open the backend a config names.
pub fn open_backend(config: &BackendConfig) -> Result<Box<dyn StorageBackend>> {
    match config {
        BackendConfig::Memory => Ok(Box::new(MemoryBackend::new())),
        #[cfg(feature = "sled")]
        BackendConfig::Sled { path } => Ok(Box::new(SledBackend::open(path)?)),
    }
}
