//! End-to-end tests for the edge store.

use malgraph::{Element, ElementKind, MemoryBackend, Store};
use pretty_assertions::assert_eq;

fn setup() -> (Store<MemoryBackend>, Element, Element, Element) {
    let store = Store::open_memory().unwrap();
    let (a, _) = store.save(ElementKind::Hostname.candidate("evil.com")).unwrap();
    let (b, _) = store.save(ElementKind::Ip.candidate("10.0.0.1")).unwrap();
    let (c, _) = store.save(ElementKind::As.candidate("AS666")).unwrap();
    (store, a, b, c)
}

// ============================================================================
// Edge singularity
// ============================================================================

#[test]
fn test_connect_twice_replaces_attribs() {
    let (store, a, b, _) = setup();

    let first = store.connect(Some(&a), Some(&b), "resolves_to", true).unwrap().unwrap();
    let second = store.connect(Some(&a), Some(&b), "resolved_to", true).unwrap().unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(store.stats().unwrap().edges, 1);
    assert_eq!(store.edge(first.id).unwrap().unwrap().attribs, "resolved_to");
}

#[test]
fn test_reverse_direction_is_a_distinct_edge() {
    let (store, a, b, _) = setup();
    let ab = store.connect(Some(&a), Some(&b), "x", true).unwrap().unwrap();
    let ba = store.connect(Some(&b), Some(&a), "x", true).unwrap().unwrap();

    assert_ne!(ab.id, ba.id);
    assert_eq!(store.edges_of(a.id).unwrap().len(), 2);
}

#[test]
fn test_missing_endpoint_writes_nothing() {
    let (store, a, _, _) = setup();
    assert!(store.connect(Some(&a), None, "x", true).unwrap().is_none());
    assert!(store.connect(None, Some(&a), "x", true).unwrap().is_none());
    assert!(store.connect(None, None, "x", true).unwrap().is_none());
    assert_eq!(store.stats().unwrap().edges, 0);
}

#[test]
fn test_self_loop() {
    let (store, a, _, _) = setup();
    let edge = store.connect(Some(&a), Some(&a), "self", true).unwrap().unwrap();
    assert_eq!(edge.src, edge.dst);
    assert_eq!(store.edges_of(a.id).unwrap().len(), 1);
}

// ============================================================================
// Deferred commit
// ============================================================================

#[test]
fn test_uncommitted_edge_has_id_but_is_not_stored() {
    let (store, a, b, _) = setup();
    let edge = store.connect(Some(&a), Some(&b), "x", false).unwrap().unwrap();

    assert!(store.edge(edge.id).unwrap().is_none());
    assert_eq!(store.stats().unwrap().edges, 0);

    let stored = store.commit_edges(vec![edge.clone()]).unwrap();
    assert_eq!(stored, vec![edge.clone()]);
    assert_eq!(store.edge(edge.id).unwrap(), Some(edge));
}

#[test]
fn test_commit_batch_with_duplicate_pair_keeps_one_edge() {
    let (store, a, b, c) = setup();
    let first = store.connect(Some(&a), Some(&b), "one", false).unwrap().unwrap();
    let dup = store.connect(Some(&a), Some(&b), "two", false).unwrap().unwrap();
    let other = store.connect(Some(&b), Some(&c), "asn", false).unwrap().unwrap();

    // Neither was stored, so both got fresh ids.
    assert_ne!(first.id, dup.id);

    let stored = store.commit_edges(vec![first.clone(), dup, other]).unwrap();
    assert_eq!(store.stats().unwrap().edges, 2);
    assert_eq!(stored[1].id, first.id);
    assert_eq!(store.edge(first.id).unwrap().unwrap().attribs, "two");
}

#[test]
fn test_commit_after_concurrent_connect_reuses_stored_edge() {
    let (store, a, b, _) = setup();
    let pending = store.connect(Some(&a), Some(&b), "late", false).unwrap().unwrap();
    let live = store.connect(Some(&a), Some(&b), "early", true).unwrap().unwrap();

    let stored = store.commit_edges([pending]).unwrap();
    assert_eq!(stored[0].id, live.id);
    assert_eq!(store.stats().unwrap().edges, 1);
    assert_eq!(store.edge(live.id).unwrap().unwrap().attribs, "late");
}

// ============================================================================
// Lookups
// ============================================================================

#[test]
fn test_edges_of_ordered_by_id() {
    let (store, a, b, c) = setup();
    let e1 = store.connect(Some(&a), Some(&b), "1", true).unwrap().unwrap();
    let e2 = store.connect(Some(&c), Some(&a), "2", true).unwrap().unwrap();
    store.connect(Some(&b), Some(&c), "3", true).unwrap();

    let ids: Vec<_> = store.edges_of(a.id).unwrap().into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![e1.id, e2.id]);
}

#[test]
fn test_removing_element_leaves_dangling_edge() {
    let (store, a, b, _) = setup();
    let edge = store.connect(Some(&a), Some(&b), "x", true).unwrap().unwrap();
    store.remove(b.id).unwrap();

    assert_eq!(store.edge(edge.id).unwrap().map(|e| e.dst), Some(b.id));
}
