//! sled storage backend.
//!
//! One tree per record kind plus one tree per declared access path:
//!
//! | Tree | Key | Value |
//! |------|-----|-------|
//! | `elements` | id | JSON document |
//! | `elements.value` | len-prefixed value ‖ id | empty |
//! | `elements.tags` | len-prefixed tag ‖ id | empty |
//! | `elements.recency` | inverted created secs ‖ nanos ‖ value ‖ 0 ‖ id | empty |
//! | `graph` | id | JSON edge |
//! | `graph.pair` | src ‖ dst | edge id |
//! | `graph.src` / `graph.dst` | element id ‖ edge id | empty |
//! | `kv:<collection>` | key | JSON document |
//!
//! All integers are big-endian so that byte order is numeric order.
//! Writes to several trees are not atomic as a group.

use std::path::Path;

use ::sled::{Db, Tree};
use serde::de::DeserializeOwned;
use tracing::info;

use crate::index::{required_indexes, IndexSpec};
use crate::model::document::keys;
use crate::model::*;
use crate::{Error, Result};
use super::{StorageBackend, StoredElement};

const META_INDEXES: &[u8] = b"indexes";
const KV_PREFIX: &str = "kv:";
const EMPTY: &[u8] = &[];

pub struct SledBackend {
    db: Db,
    elements: Tree,
    by_value: Tree,
    by_tag: Tree,
    by_recency: Tree,
    edges: Tree,
    edge_pairs: Tree,
    edge_src: Tree,
    edge_dst: Tree,
    meta: Tree,
}

impl SledBackend {
    /// Opens or creates a store at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!(path = %path.as_ref().display(), "opening sled backend");
        Self::from_db(::sled::open(path)?)
    }

    /// A store that is deleted when dropped.
    pub fn temporary() -> Result<Self> {
        Self::from_db(::sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self> {
        Ok(Self {
            elements: db.open_tree("elements")?,
            by_value: db.open_tree("elements.value")?,
            by_tag: db.open_tree("elements.tags")?,
            by_recency: db.open_tree("elements.recency")?,
            edges: db.open_tree("graph")?,
            edge_pairs: db.open_tree("graph.pair")?,
            edge_src: db.open_tree("graph.src")?,
            edge_dst: db.open_tree("graph.dst")?,
            meta: db.open_tree("meta")?,
            db,
        })
    }

    fn next_id(&self) -> Result<u64> {
        Ok(self.db.generate_id()? + 1)
    }

    fn load_element(&self, id: ElementId) -> Result<Option<Document>> {
        self.elements
            .get(id.0.to_be_bytes())?
            .map(|bytes| from_json(&bytes))
            .transpose()
    }

    fn load_many(&self, ids: impl IntoIterator<Item = u64>) -> Result<Vec<StoredElement>> {
        let mut out = Vec::new();
        for raw in ids {
            let id = ElementId(raw);
            if let Some(document) = self.load_element(id)? {
                out.push(StoredElement { id, document });
            }
        }
        Ok(out)
    }

    fn index_element(&self, id: ElementId, doc: &Document) -> Result<()> {
        if let Some(value) = doc.get_str(keys::VALUE) {
            self.by_value.insert(suffixed(&len_prefixed(value), id.0), EMPTY)?;
        }
        for tag in doc.get_strings(keys::TAGS).unwrap_or_default() {
            self.by_tag.insert(suffixed(&len_prefixed(&tag), id.0), EMPTY)?;
        }
        self.by_recency.insert(recency_bytes(doc, id), EMPTY)?;
        Ok(())
    }

    fn unindex_element(&self, id: ElementId, doc: &Document) -> Result<()> {
        if let Some(value) = doc.get_str(keys::VALUE) {
            self.by_value.remove(suffixed(&len_prefixed(value), id.0))?;
        }
        for tag in doc.get_strings(keys::TAGS).unwrap_or_default() {
            self.by_tag.remove(suffixed(&len_prefixed(&tag), id.0))?;
        }
        self.by_recency.remove(recency_bytes(doc, id))?;
        Ok(())
    }

    fn index_edge(&self, edge: &Edge) -> Result<()> {
        self.edge_pairs.insert(pair_bytes(edge.src, edge.dst), &edge.id.0.to_be_bytes()[..])?;
        self.edge_src.insert(suffixed(&edge.src.0.to_be_bytes(), edge.id.0), EMPTY)?;
        self.edge_dst.insert(suffixed(&edge.dst.0.to_be_bytes(), edge.id.0), EMPTY)?;
        Ok(())
    }

    fn unindex_edge(&self, edge: &Edge) -> Result<()> {
        let pair = pair_bytes(edge.src, edge.dst);
        if self.edge_pairs.get(&pair)?.as_deref() == Some(&edge.id.0.to_be_bytes()[..]) {
            self.edge_pairs.remove(&pair)?;
        }
        self.edge_src.remove(suffixed(&edge.src.0.to_be_bytes(), edge.id.0))?;
        self.edge_dst.remove(suffixed(&edge.dst.0.to_be_bytes(), edge.id.0))?;
        Ok(())
    }

    fn edges_by_prefix(&self, tree: &Tree, element: ElementId) -> Result<Vec<Edge>> {
        let mut out = Vec::new();
        for entry in tree.scan_prefix(element.0.to_be_bytes()) {
            let (key, _) = entry?;
            if let Some(edge) = self.get_edge(EdgeId(id_suffix(&key)?))? {
                out.push(edge);
            }
        }
        Ok(out)
    }

    fn ids_by_prefix(tree: &Tree, prefix: &[u8]) -> Result<Vec<u64>> {
        tree.scan_prefix(prefix)
            .map(|entry| id_suffix(&entry?.0))
            .collect()
    }

    fn kv_tree(&self, collection: &str) -> Result<Tree> {
        Ok(self.db.open_tree(format!("{KV_PREFIX}{collection}"))?)
    }
}

// ============================================================================
// Key encoding
// ============================================================================

fn len_prefixed(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + s.len());
    out.extend_from_slice(&(s.len() as u32).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
    out
}

fn suffixed(prefix: &[u8], id: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + 8);
    out.extend_from_slice(prefix);
    out.extend_from_slice(&id.to_be_bytes());
    out
}

fn pair_bytes(src: ElementId, dst: ElementId) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&src.0.to_be_bytes());
    out[8..].copy_from_slice(&dst.0.to_be_bytes());
    out
}

/// Newest first, then value ascending. Undated documents sort last.
///
/// The timestamp is seconds (sign-flipped) then subsecond nanos, both
/// inverted, so full precision survives.
fn recency_bytes(doc: &Document, id: ElementId) -> Vec<u8> {
    let (secs, nanos) = doc
        .get(keys::DATE_CREATED)
        .and_then(Value::as_datetime)
        .map_or((u64::MAX, u32::MAX), |dt| {
            (!((dt.timestamp() as u64) ^ (1 << 63)), !dt.timestamp_subsec_nanos())
        });
    let value = doc.get_str(keys::VALUE).unwrap_or_default();
    let mut out = Vec::with_capacity(12 + value.len() + 9);
    out.extend_from_slice(&secs.to_be_bytes());
    out.extend_from_slice(&nanos.to_be_bytes());
    out.extend_from_slice(value.as_bytes());
    out.push(0);
    out.extend_from_slice(&id.0.to_be_bytes());
    out
}

fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

fn id_suffix(key: &[u8]) -> Result<u64> {
    key.len()
        .checked_sub(8)
        .and_then(|start| key[start..].try_into().ok())
        .map(u64::from_be_bytes)
        .ok_or_else(|| Error::StorageError(format!("corrupt index key of {} bytes", key.len())))
}

// ============================================================================
// StorageBackend impl
// ============================================================================

impl StorageBackend for SledBackend {
    fn shutdown(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        for tree in [
            &self.elements, &self.by_value, &self.by_tag, &self.by_recency,
            &self.edges, &self.edge_pairs, &self.edge_src, &self.edge_dst,
        ] {
            tree.clear()?;
        }
        for name in self.db.tree_names() {
            if name.starts_with(KV_PREFIX.as_bytes()) {
                self.db.drop_tree(&name)?;
            }
        }
        self.db.flush()?;
        Ok(())
    }

    // ========================================================================
    // Elements
    // ========================================================================

    fn insert_element(&self, doc: Document) -> Result<ElementId> {
        let id = ElementId(self.next_id()?);
        self.elements.insert(id.0.to_be_bytes(), serde_json::to_vec(&doc)?)?;
        self.index_element(id, &doc)?;
        Ok(id)
    }

    fn replace_element(&self, id: ElementId, doc: Document) -> Result<()> {
        if let Some(old) = self.load_element(id)? {
            self.unindex_element(id, &old)?;
        }
        self.elements.insert(id.0.to_be_bytes(), serde_json::to_vec(&doc)?)?;
        self.index_element(id, &doc)
    }

    fn get_element(&self, id: ElementId) -> Result<Option<StoredElement>> {
        Ok(self.load_element(id)?.map(|document| StoredElement { id, document }))
    }

    fn delete_element(&self, id: ElementId) -> Result<bool> {
        match self.load_element(id)? {
            Some(old) => {
                self.elements.remove(id.0.to_be_bytes())?;
                self.unindex_element(id, &old)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn elements_by_value(&self, value: &str) -> Result<Vec<StoredElement>> {
        self.load_many(Self::ids_by_prefix(&self.by_value, &len_prefixed(value))?)
    }

    fn elements_by_tag(&self, tag: &str) -> Result<Vec<StoredElement>> {
        self.load_many(Self::ids_by_prefix(&self.by_tag, &len_prefixed(tag))?)
    }

    fn all_elements(&self) -> Result<Vec<StoredElement>> {
        let mut out = Vec::new();
        for entry in self.elements.iter() {
            let (key, bytes) = entry?;
            out.push(StoredElement {
                id: ElementId(id_suffix(&key)?),
                document: serde_json::from_slice(&bytes)?,
            });
        }
        Ok(out)
    }

    fn elements_by_recency(&self) -> Result<Vec<StoredElement>> {
        self.load_many(Self::ids_by_prefix(&self.by_recency, &[])?)
    }

    fn element_count(&self) -> Result<u64> {
        Ok(self.elements.len() as u64)
    }

    // ========================================================================
    // Edges
    // ========================================================================

    fn allocate_edge_id(&self) -> Result<EdgeId> {
        Ok(EdgeId(self.next_id()?))
    }

    fn put_edge(&self, edge: &Edge) -> Result<()> {
        if let Some(old) = self.get_edge(edge.id)? {
            self.unindex_edge(&old)?;
        }
        self.edges.insert(edge.id.0.to_be_bytes(), serde_json::to_vec(edge)?)?;
        self.index_edge(edge)
    }

    fn get_edge(&self, id: EdgeId) -> Result<Option<Edge>> {
        self.edges
            .get(id.0.to_be_bytes())?
            .map(|bytes| from_json(&bytes))
            .transpose()
    }

    fn edge_by_pair(&self, src: ElementId, dst: ElementId) -> Result<Option<Edge>> {
        match self.edge_pairs.get(pair_bytes(src, dst))? {
            Some(raw) => self.get_edge(EdgeId(id_suffix(&raw)?)),
            None => Ok(None),
        }
    }

    fn edges_by_src(&self, src: ElementId) -> Result<Vec<Edge>> {
        self.edges_by_prefix(&self.edge_src, src)
    }

    fn edges_by_dst(&self, dst: ElementId) -> Result<Vec<Edge>> {
        self.edges_by_prefix(&self.edge_dst, dst)
    }

    fn edge_count(&self) -> Result<u64> {
        Ok(self.edges.len() as u64)
    }

    // ========================================================================
    // Index
    // ========================================================================

    fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        if !required_indexes().contains(spec) {
            return Err(Error::StorageError(format!(
                "access path {} not supported by sled backend",
                spec.name()
            )));
        }
        let mut declared = self.indexes()?;
        if !declared.contains(spec) {
            declared.push(spec.clone());
            self.meta.insert(META_INDEXES, serde_json::to_vec(&declared)?)?;
        }
        Ok(())
    }

    fn indexes(&self) -> Result<Vec<IndexSpec>> {
        match self.meta.get(META_INDEXES)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    // ========================================================================
    // Keyed collections
    // ========================================================================

    fn kv_get(&self, collection: &str, key: &str) -> Result<Option<Document>> {
        self.kv_tree(collection)?
            .get(key.as_bytes())?
            .map(|bytes| from_json(&bytes))
            .transpose()
    }

    fn kv_put(&self, collection: &str, key: &str, doc: Document) -> Result<()> {
        self.kv_tree(collection)?.insert(key.as_bytes(), serde_json::to_vec(&doc)?)?;
        Ok(())
    }

    fn kv_delete(&self, collection: &str, key: &str) -> Result<bool> {
        Ok(self.kv_tree(collection)?.remove(key.as_bytes())?.is_some())
    }

    fn kv_list(&self, collection: &str) -> Result<Vec<Document>> {
        let mut out = Vec::new();
        for entry in self.kv_tree(collection)?.iter() {
            let (_, bytes) = entry?;
            out.push(serde_json::from_slice(&bytes)?);
        }
        Ok(out)
    }
}
