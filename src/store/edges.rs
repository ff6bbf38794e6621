//! Edge store: directed, attributed links, one per ordered (src, dst) pair.

use std::collections::BTreeMap;

use tracing::debug;

use crate::model::{Edge, EdgeId, Element, ElementId};
use crate::storage::StorageBackend;
use crate::{Result, Store};

impl<B: StorageBackend> Store<B> {
    /// Link `src` to `dst`, or replace the attribs of the existing link.
    ///
    /// A missing endpoint yields `Ok(None)` and writes nothing. With
    /// `commit == false` the edge is returned unpersisted; hand it to
    /// [`commit_edges`](Self::commit_edges) later.
    pub fn connect(
        &self,
        src: Option<&Element>,
        dst: Option<&Element>,
        attribs: &str,
        commit: bool,
    ) -> Result<Option<Edge>> {
        let (Some(src), Some(dst)) = (src, dst) else {
            return Ok(None);
        };

        let _guard = self.write_lock.lock();
        let edge = match self.backend.edge_by_pair(src.id, dst.id)? {
            Some(existing) => existing.with_attribs(attribs),
            None => {
                let edge = Edge::new(self.backend.allocate_edge_id()?, src.id, dst.id, attribs);
                debug!(target: "model", "(linked {} to {} [{attribs}])", src.id, dst.id);
                edge
            }
        };
        if commit {
            self.backend.put_edge(&edge)?;
        }
        Ok(Some(edge))
    }

    /// Persist edges built with `connect(.., commit = false)`.
    ///
    /// Each pair is looked up again under the write lock: if another edge
    /// for the same pair was stored in the meantime, that edge takes the
    /// new attribs instead of a second edge being created. Returns the
    /// edges as stored.
    pub fn commit_edges(&self, edges: impl IntoIterator<Item = Edge>) -> Result<Vec<Edge>> {
        let _guard = self.write_lock.lock();
        let mut stored = Vec::new();
        for edge in edges {
            let edge = match self.backend.edge_by_pair(edge.src, edge.dst)? {
                Some(existing) if existing.id != edge.id => existing.with_attribs(edge.attribs),
                _ => edge,
            };
            self.backend.put_edge(&edge)?;
            stored.push(edge);
        }
        Ok(stored)
    }

    pub fn edge(&self, id: EdgeId) -> Result<Option<Edge>> {
        self.backend.get_edge(id)
    }

    /// Every edge with `id` as src or dst, ordered by edge id.
    pub fn edges_of(&self, id: ElementId) -> Result<Vec<Edge>> {
        let mut found: BTreeMap<EdgeId, Edge> = BTreeMap::new();
        for edge in self.backend.edges_by_src(id)?.into_iter().chain(self.backend.edges_by_dst(id)?) {
            found.entry(edge.id).or_insert(edge);
        }
        Ok(found.into_values().collect())
    }
}
