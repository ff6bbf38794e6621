//! In-memory storage backend.
//!
//! This is the reference implementation of `StorageBackend`.
//! It uses HashMaps protected by RwLock, one lock per record kind so that
//! a record and its secondary index entries change together.
//!
//! ## Limitations
//!
//! - **No persistence**: `shutdown()` is a no-op and everything is lost on drop.
//! - **Call-level atomicity only**: a lookup followed by a write is two calls.
//!   The stores serialize such sequences with their own lock.
//! - **Indexes always maintained**: `create_index()` only records the
//!   declaration; the value, tag, recency, pair, src and dst maps exist
//!   from the start.
//!
//! Use this backend for:
//! - Testing the element/edge stores and the expander
//! - Embedding in applications that don't need persistence

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::index::{required_indexes, IndexSpec};
use crate::model::document::keys;
use crate::model::*;
use crate::{Error, Result};
use super::{recency_key, RecencyKey, StorageBackend, StoredElement};

// ============================================================================
// MemoryBackend
// ============================================================================

/// In-memory element graph storage.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    elements: RwLock<ElementTable>,
    edges: RwLock<EdgeTable>,
    declared: RwLock<Vec<IndexSpec>>,
    /// collection → key → document
    collections: RwLock<HashMap<String, BTreeMap<String, Document>>>,
    next_element_id: AtomicU64,
    next_edge_id: AtomicU64,
}

#[derive(Default)]
struct ElementTable {
    docs: HashMap<ElementId, Document>,
    by_value: HashMap<String, SmallVec<[ElementId; 1]>>,
    by_tag: HashMap<String, BTreeSet<ElementId>>,
    by_recency: BTreeSet<(RecencyKey, ElementId)>,
}

impl ElementTable {
    fn index(&mut self, id: ElementId, doc: &Document) {
        if let Some(value) = doc.get_str(keys::VALUE) {
            self.by_value.entry(value.to_string()).or_default().push(id);
        }
        for tag in doc.get_strings(keys::TAGS).unwrap_or_default() {
            self.by_tag.entry(tag).or_default().insert(id);
        }
        self.by_recency.insert((recency_key(doc), id));
    }

    fn unindex(&mut self, id: ElementId, doc: &Document) {
        if let Some(value) = doc.get_str(keys::VALUE) {
            if let Some(ids) = self.by_value.get_mut(value) {
                ids.retain(|eid| *eid != id);
                if ids.is_empty() {
                    self.by_value.remove(value);
                }
            }
        }
        for tag in doc.get_strings(keys::TAGS).unwrap_or_default() {
            if let Some(ids) = self.by_tag.get_mut(&tag) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.by_tag.remove(&tag);
                }
            }
        }
        self.by_recency.remove(&(recency_key(doc), id));
    }

    fn stored(&self, id: ElementId) -> Option<StoredElement> {
        self.docs.get(&id).map(|doc| StoredElement { id, document: doc.clone() })
    }

    fn stored_many<'a>(&self, ids: impl IntoIterator<Item = &'a ElementId>) -> Vec<StoredElement> {
        ids.into_iter().filter_map(|id| self.stored(*id)).collect()
    }
}

#[derive(Default)]
struct EdgeTable {
    edges: HashMap<EdgeId, Edge>,
    by_pair: HashMap<(ElementId, ElementId), EdgeId>,
    by_src: HashMap<ElementId, SmallVec<[EdgeId; 4]>>,
    by_dst: HashMap<ElementId, SmallVec<[EdgeId; 4]>>,
}

impl EdgeTable {
    fn index(&mut self, edge: &Edge) {
        self.by_pair.insert(edge.pair(), edge.id);
        self.by_src.entry(edge.src).or_default().push(edge.id);
        self.by_dst.entry(edge.dst).or_default().push(edge.id);
    }

    fn unindex(&mut self, edge: &Edge) {
        if self.by_pair.get(&edge.pair()) == Some(&edge.id) {
            self.by_pair.remove(&edge.pair());
        }
        if let Some(ids) = self.by_src.get_mut(&edge.src) {
            ids.retain(|eid| *eid != edge.id);
        }
        if let Some(ids) = self.by_dst.get_mut(&edge.dst) {
            ids.retain(|eid| *eid != edge.id);
        }
    }

    fn collect(&self, ids: Option<&SmallVec<[EdgeId; 4]>>) -> Vec<Edge> {
        ids.map(|ids| ids.iter().filter_map(|id| self.edges.get(id).cloned()).collect())
            .unwrap_or_default()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                elements: RwLock::new(ElementTable::default()),
                edges: RwLock::new(EdgeTable::default()),
                declared: RwLock::new(Vec::new()),
                collections: RwLock::new(HashMap::new()),
                next_element_id: AtomicU64::new(1),
                next_edge_id: AtomicU64::new(1),
            }),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// StorageBackend impl
// ============================================================================

impl StorageBackend for MemoryBackend {
    fn shutdown(&self) -> Result<()> { Ok(()) }

    fn clear(&self) -> Result<()> {
        *self.inner.elements.write() = ElementTable::default();
        *self.inner.edges.write() = EdgeTable::default();
        self.inner.collections.write().clear();
        Ok(())
    }

    // ========================================================================
    // Elements
    // ========================================================================

    fn insert_element(&self, doc: Document) -> Result<ElementId> {
        let id = ElementId(self.inner.next_element_id.fetch_add(1, Ordering::Relaxed));
        let mut table = self.inner.elements.write();
        table.index(id, &doc);
        table.docs.insert(id, doc);
        Ok(id)
    }

    fn replace_element(&self, id: ElementId, doc: Document) -> Result<()> {
        let mut table = self.inner.elements.write();
        if let Some(old) = table.docs.remove(&id) {
            table.unindex(id, &old);
        }
        table.index(id, &doc);
        table.docs.insert(id, doc);
        Ok(())
    }

    fn get_element(&self, id: ElementId) -> Result<Option<StoredElement>> {
        Ok(self.inner.elements.read().stored(id))
    }

    fn delete_element(&self, id: ElementId) -> Result<bool> {
        let mut table = self.inner.elements.write();
        match table.docs.remove(&id) {
            Some(old) => {
                table.unindex(id, &old);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn elements_by_value(&self, value: &str) -> Result<Vec<StoredElement>> {
        let table = self.inner.elements.read();
        Ok(table.by_value.get(value).map(|ids| table.stored_many(ids)).unwrap_or_default())
    }

    fn elements_by_tag(&self, tag: &str) -> Result<Vec<StoredElement>> {
        let table = self.inner.elements.read();
        Ok(table.by_tag.get(tag).map(|ids| table.stored_many(ids)).unwrap_or_default())
    }

    fn all_elements(&self) -> Result<Vec<StoredElement>> {
        let table = self.inner.elements.read();
        let mut ids: Vec<ElementId> = table.docs.keys().copied().collect();
        ids.sort();
        Ok(table.stored_many(&ids))
    }

    fn elements_by_ids(&self, ids: &[ElementId]) -> Result<Vec<StoredElement>> {
        Ok(self.inner.elements.read().stored_many(ids))
    }

    fn elements_by_recency(&self) -> Result<Vec<StoredElement>> {
        let table = self.inner.elements.read();
        Ok(table.stored_many(table.by_recency.iter().map(|(_, id)| id)))
    }

    fn element_count(&self) -> Result<u64> {
        Ok(self.inner.elements.read().docs.len() as u64)
    }

    // ========================================================================
    // Edges
    // ========================================================================

    fn allocate_edge_id(&self) -> Result<EdgeId> {
        Ok(EdgeId(self.inner.next_edge_id.fetch_add(1, Ordering::Relaxed)))
    }

    fn put_edge(&self, edge: &Edge) -> Result<()> {
        let mut table = self.inner.edges.write();
        if let Some(old) = table.edges.remove(&edge.id) {
            table.unindex(&old);
        }
        table.index(edge);
        table.edges.insert(edge.id, edge.clone());
        Ok(())
    }

    fn get_edge(&self, id: EdgeId) -> Result<Option<Edge>> {
        Ok(self.inner.edges.read().edges.get(&id).cloned())
    }

    fn edge_by_pair(&self, src: ElementId, dst: ElementId) -> Result<Option<Edge>> {
        let table = self.inner.edges.read();
        Ok(table.by_pair.get(&(src, dst)).and_then(|id| table.edges.get(id)).cloned())
    }

    fn edges_by_src(&self, src: ElementId) -> Result<Vec<Edge>> {
        let table = self.inner.edges.read();
        Ok(table.collect(table.by_src.get(&src)))
    }

    fn edges_by_dst(&self, dst: ElementId) -> Result<Vec<Edge>> {
        let table = self.inner.edges.read();
        Ok(table.collect(table.by_dst.get(&dst)))
    }

    fn edges_touching(&self, ids: &[ElementId]) -> Result<Vec<Edge>> {
        let table = self.inner.edges.read();
        let mut found: BTreeMap<EdgeId, Edge> = BTreeMap::new();
        for id in ids {
            let touching = table.by_src.get(id).into_iter().chain(table.by_dst.get(id));
            for edge_id in touching.flatten() {
                if let Some(edge) = table.edges.get(edge_id) {
                    found.entry(edge.id).or_insert_with(|| edge.clone());
                }
            }
        }
        Ok(found.into_values().collect())
    }

    fn edge_count(&self) -> Result<u64> {
        Ok(self.inner.edges.read().edges.len() as u64)
    }

    // ========================================================================
    // Index (declarations only; every access path is always maintained)
    // ========================================================================

    fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        if !required_indexes().contains(spec) {
            return Err(Error::StorageError(format!(
                "access path {} not supported by memory backend",
                spec.name()
            )));
        }
        let mut declared = self.inner.declared.write();
        if !declared.contains(spec) {
            declared.push(spec.clone());
        }
        Ok(())
    }

    fn indexes(&self) -> Result<Vec<IndexSpec>> {
        Ok(self.inner.declared.read().clone())
    }

    // ========================================================================
    // Keyed collections
    // ========================================================================

    fn kv_get(&self, collection: &str, key: &str) -> Result<Option<Document>> {
        Ok(self.inner.collections.read().get(collection).and_then(|c| c.get(key)).cloned())
    }

    fn kv_put(&self, collection: &str, key: &str, doc: Document) -> Result<()> {
        self.inner
            .collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), doc);
        Ok(())
    }

    fn kv_delete(&self, collection: &str, key: &str) -> Result<bool> {
        Ok(self
            .inner
            .collections
            .write()
            .get_mut(collection)
            .and_then(|c| c.remove(key))
            .is_some())
    }

    fn kv_list(&self, collection: &str) -> Result<Vec<Document>> {
        Ok(self
            .inner
            .collections
            .read()
            .get(collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    fn doc(value: &str, tags: &[&str], created: DateTime<Utc>) -> Document {
        ElementKind::Hostname
            .candidate(value)
            .with(keys::TAGS, tags.to_vec())
            .with(keys::DATE_CREATED, created)
    }

    #[test]
    fn test_insert_and_lookup_by_value() {
        let db = MemoryBackend::new();
        let id = db.insert_element(doc("evil.com", &[], Utc::now())).unwrap();

        let found = db.elements_by_value("evil.com").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);
        assert!(db.elements_by_value("good.com").unwrap().is_empty());
    }

    #[test]
    fn test_replace_reindexes_tags() {
        let db = MemoryBackend::new();
        let now = Utc::now();
        let id = db.insert_element(doc("evil.com", &["old"], now)).unwrap();
        db.replace_element(id, doc("evil.com", &["new"], now)).unwrap();

        assert!(db.elements_by_tag("old").unwrap().is_empty());
        assert_eq!(db.elements_by_tag("new").unwrap()[0].id, id);
        assert_eq!(db.element_count().unwrap(), 1);
    }

    #[test]
    fn test_delete_element() {
        let db = MemoryBackend::new();
        let id = db.insert_element(doc("evil.com", &["x"], Utc::now())).unwrap();
        assert!(db.delete_element(id).unwrap());
        assert!(!db.delete_element(id).unwrap());
        assert!(db.elements_by_value("evil.com").unwrap().is_empty());
        assert!(db.elements_by_tag("x").unwrap().is_empty());
    }

    #[test]
    fn test_recency_order() {
        let db = MemoryBackend::new();
        let t0 = Utc::now();
        db.insert_element(doc("b.com", &[], t0)).unwrap();
        db.insert_element(doc("a.com", &[], t0)).unwrap();
        db.insert_element(doc("z.com", &[], t0 + Duration::seconds(5))).unwrap();

        let order: Vec<String> = db
            .elements_by_recency()
            .unwrap()
            .iter()
            .map(|s| s.document.get_str(keys::VALUE).unwrap().to_string())
            .collect();
        assert_eq!(order, vec!["z.com", "a.com", "b.com"]);
    }

    #[test]
    fn test_edge_pair_src_dst_lookups() {
        let db = MemoryBackend::new();
        let (a, b, c) = (ElementId(1), ElementId(2), ElementId(3));
        let ab = Edge::new(db.allocate_edge_id().unwrap(), a, b, "x");
        let cb = Edge::new(db.allocate_edge_id().unwrap(), c, b, "y");
        db.put_edge(&ab).unwrap();
        db.put_edge(&cb).unwrap();

        assert_eq!(db.edge_by_pair(a, b).unwrap(), Some(ab.clone()));
        assert_eq!(db.edge_by_pair(b, a).unwrap(), None);
        assert_eq!(db.edges_by_src(a).unwrap(), vec![ab.clone()]);
        assert_eq!(db.edges_by_dst(b).unwrap().len(), 2);
        assert_eq!(db.edges_touching(&[a, c]).unwrap(), vec![ab, cb]);
    }

    #[test]
    fn test_put_edge_replaces_in_place() {
        let db = MemoryBackend::new();
        let id = db.allocate_edge_id().unwrap();
        db.put_edge(&Edge::new(id, ElementId(1), ElementId(2), "first")).unwrap();
        db.put_edge(&Edge::new(id, ElementId(1), ElementId(2), "second")).unwrap();

        assert_eq!(db.edge_count().unwrap(), 1);
        assert_eq!(db.edges_by_src(ElementId(1)).unwrap().len(), 1);
        assert_eq!(db.get_edge(id).unwrap().unwrap().attribs, "second");
    }

    #[test]
    fn test_self_loop_touching_once() {
        let db = MemoryBackend::new();
        let a = ElementId(1);
        db.put_edge(&Edge::new(db.allocate_edge_id().unwrap(), a, a, "self")).unwrap();
        assert_eq!(db.edges_touching(&[a]).unwrap().len(), 1);
    }

    #[test]
    fn test_create_index_rejects_unknown_path() {
        let db = MemoryBackend::new();
        let bogus = IndexSpec::new(
            crate::index::Collection::Elements,
            &[("country", crate::index::SortOrder::Ascending)],
        );
        assert!(db.create_index(&bogus).is_err());
        assert!(db.indexes().unwrap().is_empty());
    }

    #[test]
    fn test_kv_collections() {
        let db = MemoryBackend::new();
        db.kv_put("public_api", "k1", Document::new().with("n", 1)).unwrap();
        db.kv_put("public_api", "k1", Document::new().with("n", 2)).unwrap();
        assert_eq!(db.kv_list("public_api").unwrap().len(), 1);
        assert_eq!(db.kv_get("public_api", "k1").unwrap().unwrap().get("n"), Some(&Value::Int(2)));
        assert!(db.kv_delete("public_api", "k1").unwrap());
        assert!(!db.kv_delete("public_api", "k1").unwrap());
    }

    #[test]
    fn test_clear() {
        let db = MemoryBackend::new();
        db.insert_element(doc("evil.com", &[], Utc::now())).unwrap();
        db.put_edge(&Edge::new(db.allocate_edge_id().unwrap(), ElementId(1), ElementId(2), "")).unwrap();
        db.clear().unwrap();
        assert_eq!(db.element_count().unwrap(), 0);
        assert_eq!(db.edge_count().unwrap(), 0);
    }
}
