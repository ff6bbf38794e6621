//! End-to-end tests for collaborator records: sniffer sessions and API keys.

use malgraph::{ElementKind, Error, SnifferSession, StorageBackend, Store, StoreConfig};
use pretty_assertions::assert_eq;

fn store_in(dir: &std::path::Path) -> Store<Box<dyn StorageBackend>> {
    Store::open(StoreConfig::default().with_sniffer_dir(dir)).unwrap()
}

// ============================================================================
// Sniffer sessions
// ============================================================================

#[test]
fn test_session_upsert_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());

    let mut session = SnifferSession::new("office");
    session.filter = "tcp port 80".into();
    session.pcap = false;
    store.save_sniffer_session(&session).unwrap();

    session.packet_count = 42;
    store.save_sniffer_session(&session).unwrap();

    let loaded = store.sniffer_session("office").unwrap().unwrap();
    assert_eq!(loaded.packet_count, 42);
    assert_eq!(loaded.filter, "tcp port 80");
    assert!(loaded.pcap);
    assert_eq!(store.sniffer_sessions().unwrap().len(), 1);
}

#[test]
fn test_delete_removes_capture_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());
    store.save_sniffer_session(&SnifferSession::new("lab")).unwrap();

    let pcap = store.pcap_path("lab").unwrap();
    assert_eq!(pcap, dir.path().join("lab.pcap"));
    std::fs::write(&pcap, b"\xd4\xc3\xb2\xa1").unwrap();

    assert!(store.delete_sniffer_session("lab").unwrap());
    assert!(!pcap.exists());
    assert!(store.sniffer_session("lab").unwrap().is_none());
}

#[test]
fn test_delete_without_capture_file_still_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());
    store.save_sniffer_session(&SnifferSession::new("ghost")).unwrap();

    assert!(store.delete_sniffer_session("ghost").unwrap());
    assert!(!store.delete_sniffer_session("ghost").unwrap());
}

#[test]
fn test_delete_unknown_session_leaves_files_alone() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());
    let pcap = store.pcap_path("stray").unwrap();
    std::fs::write(&pcap, b"keep").unwrap();

    assert!(!store.delete_sniffer_session("stray").unwrap());
    assert!(pcap.exists());
}

#[test]
fn test_names_cannot_escape_sniffer_dir() {
    let root = tempfile::tempdir().unwrap();
    let sniffer_dir = root.path().join("sniffer");
    std::fs::create_dir(&sniffer_dir).unwrap();
    let outside = root.path().join("victim.pcap");
    std::fs::write(&outside, b"keep").unwrap();
    let store = store_in(&sniffer_dir);

    assert!(matches!(
        store.delete_sniffer_session("../victim"),
        Err(Error::InvalidName(_))
    ));
    assert!(matches!(
        store.save_sniffer_session(&SnifferSession::new("../victim")),
        Err(Error::InvalidName(_))
    ));
    assert!(store.pcap_path("a/b").is_err());
    assert!(outside.exists());
}

// ============================================================================
// API keys
// ============================================================================

#[test]
fn test_tags_accumulate_per_key() {
    let store = Store::open_memory().unwrap();

    store.add_tag_to_key("k1", "c2").unwrap();
    store.add_tag_to_key("k1", "spam").unwrap();
    store.add_tag_to_key("k1", "c2").unwrap();
    store.add_tag_to_key("k2", "phish").unwrap();

    assert_eq!(store.tags_for_key("k1").unwrap(), vec!["c2", "spam"]);
    assert_eq!(store.tags_for_key("k2").unwrap(), vec!["phish"]);
    assert!(store.tags_for_key("nobody").unwrap().is_empty());
}

#[test]
fn test_clear_drops_collaborator_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());
    store.save(ElementKind::Evil.candidate("x")).unwrap();
    store.add_tag_to_key("k1", "c2").unwrap();
    store.save_sniffer_session(&SnifferSession::new("s")).unwrap();

    store.clear().unwrap();

    assert!(store.tags_for_key("k1").unwrap().is_empty());
    assert!(store.sniffer_sessions().unwrap().is_empty());
    assert_eq!(store.stats().unwrap().elements, 0);
}

// ============================================================================
// Opening from config
// ============================================================================

#[test]
fn test_open_from_json_config() {
    let config = StoreConfig::from_json(r#"{ "backend": { "engine": "memory" } }"#).unwrap();
    let store = Store::open(config).unwrap();

    assert_eq!(store.backend().indexes().unwrap().len(), malgraph::index::required_indexes().len());
    store.close().unwrap();
}
