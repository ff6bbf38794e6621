//! Neighbor expander: single-seed and multi-seed graph expansion.
//!
//! Both are pure reads and never take the write lock, so a concurrent
//! save may be half-visible in the result.

use std::collections::BTreeMap;

use hashbrown::{HashMap, HashSet};
use serde::Serialize;

use crate::model::{Edge, EdgeId, Element, ElementFilter, ElementId};
use crate::storage::StorageBackend;
use crate::{Result, Store};

/// Nodes and edges returned by an expansion, both ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Neighborhood {
    pub nodes: Vec<Element>,
    pub edges: Vec<Edge>,
}

impl Neighborhood {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, id: ElementId) -> Option<&Element> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_ids(&self) -> Vec<ElementId> {
        self.nodes.iter().map(|n| n.id).collect()
    }

    pub fn edge_ids(&self) -> Vec<EdgeId> {
        self.edges.iter().map(|e| e.id).collect()
    }
}

impl<B: StorageBackend> Store<B> {
    /// Expand one ring around `seed`.
    ///
    /// Nodes are the seed and its first-hop neighbors that pass `filter`,
    /// each carrying `incoming_links`: how many ring-1 edges end at it.
    /// Edges are the ring-1 edges plus every edge touching a returned node
    /// (ring 2), so the caller can expand any returned node without another
    /// query. Ring-2 edges may point at elements not in `nodes`.
    ///
    /// With `include_original == false` the seed is left out of `nodes`;
    /// its edges are still returned.
    pub fn expand_one(
        &self,
        seed: Option<&Element>,
        filter: &ElementFilter,
        include_original: bool,
    ) -> Result<Neighborhood> {
        let Some(seed) = seed else {
            return Ok(Neighborhood::default());
        };

        // ring 1
        let mut edges: BTreeMap<EdgeId, Edge> = BTreeMap::new();
        let mut ids: HashSet<ElementId> = HashSet::new();
        ids.insert(seed.id);
        for edge in self.backend.edges_by_src(seed.id)? {
            ids.insert(edge.dst);
            edges.insert(edge.id, edge);
        }
        for edge in self.backend.edges_by_dst(seed.id)? {
            ids.insert(edge.src);
            edges.insert(edge.id, edge);
        }

        let mut incoming: HashMap<ElementId, usize> = HashMap::new();
        for edge in edges.values() {
            *incoming.entry(edge.dst).or_default() += 1;
        }

        let mut nodes = self.fetch_matching(ids, filter)?;
        for node in &mut nodes {
            node.incoming_links = incoming.get(&node.id).copied().unwrap_or(0);
        }

        // ring 2
        let fetched: Vec<ElementId> = nodes.iter().map(|n| n.id).collect();
        for edge in self.backend.edges_touching(&fetched)? {
            edges.entry(edge.id).or_insert(edge);
        }

        if !include_original {
            nodes.retain(|n| n.id != seed.id);
        }

        Ok(Neighborhood {
            nodes,
            edges: edges.into_values().collect(),
        })
    }

    /// Expand one ring around several seeds at once.
    ///
    /// Edges are those touching any seed. Nodes are every endpoint of those
    /// edges that passes `filter`; with `include_original` the seeds are
    /// added regardless of `filter`. No ring-2 prefetch, no incoming counts.
    pub fn expand_many(
        &self,
        seeds: &[Element],
        filter: &ElementFilter,
        include_original: bool,
    ) -> Result<Neighborhood> {
        if seeds.is_empty() {
            return Ok(Neighborhood::default());
        }

        let mut seed_ids: Vec<ElementId> = seeds.iter().map(|s| s.id).collect();
        seed_ids.sort_unstable();
        seed_ids.dedup();

        let edges = self.backend.edges_touching(&seed_ids)?;
        let ids: HashSet<ElementId> = edges.iter().flat_map(|e| [e.src, e.dst]).collect();

        let mut nodes: BTreeMap<ElementId, Element> = self
            .fetch_matching(ids, filter)?
            .into_iter()
            .map(|n| (n.id, n))
            .collect();

        if include_original {
            let stored = self.backend.elements_by_ids(&seed_ids)?;
            for seed in self.decode_matching(stored, &ElementFilter::All)? {
                nodes.entry(seed.id).or_insert(seed);
            }
        }

        Ok(Neighborhood {
            nodes: nodes.into_values().collect(),
            edges,
        })
    }

    /// Elements among `ids` passing `filter`, ordered by id.
    fn fetch_matching(&self, ids: HashSet<ElementId>, filter: &ElementFilter) -> Result<Vec<Element>> {
        let mut ids: Vec<ElementId> = ids.into_iter().collect();
        ids.sort_unstable();
        let stored = self.backend.elements_by_ids(&ids)?;
        self.decode_matching(stored, filter)
    }
}
