//! Sniffer (packet-capture) session registry.

use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::Document;
use crate::storage::StorageBackend;
use crate::{Error, Result, Store};
use super::SNIFFER_SESSIONS;

/// A capture session, keyed by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnifferSession {
    pub name: String,
    pub filter: String,
    pub intercept_tls: bool,
    pub pcap: bool,
    pub packet_count: u64,
}

impl SnifferSession {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filter: String::new(),
            intercept_tls: false,
            pcap: true,
            packet_count: 0,
        }
    }

    pub fn to_document(&self) -> Document {
        Document::new()
            .with("name", self.name.as_str())
            .with("filter", self.filter.as_str())
            .with("intercept_tls", self.intercept_tls)
            .with("pcap", self.pcap)
            .with("packet_count", self.packet_count)
    }

    pub fn from_document(doc: &Document) -> Result<Self> {
        let name = doc
            .get_str("name")
            .ok_or_else(|| Error::Decode("sniffer session without name".into()))?;
        Ok(Self {
            name: name.to_string(),
            filter: doc.get_str("filter").unwrap_or_default().to_string(),
            intercept_tls: doc.get("intercept_tls").and_then(|v| v.as_bool()).unwrap_or(false),
            pcap: doc.get("pcap").and_then(|v| v.as_bool()).unwrap_or(true),
            packet_count: doc
                .get("packet_count")
                .and_then(|v| v.as_int())
                .map_or(0, |n| n.max(0) as u64),
        })
    }
}

impl<B: StorageBackend> Store<B> {
    /// Upsert by name. The pcap flag is always set.
    pub fn save_sniffer_session(&self, session: &SnifferSession) -> Result<()> {
        check_name(&session.name)?;
        let mut doc = session.to_document();
        doc.insert("pcap", true);
        self.backend.kv_put(SNIFFER_SESSIONS, &session.name, doc)
    }

    pub fn sniffer_session(&self, name: &str) -> Result<Option<SnifferSession>> {
        self.backend
            .kv_get(SNIFFER_SESSIONS, name)?
            .map(|doc| SnifferSession::from_document(&doc))
            .transpose()
    }

    pub fn sniffer_sessions(&self) -> Result<Vec<SnifferSession>> {
        self.backend
            .kv_list(SNIFFER_SESSIONS)?
            .iter()
            .map(SnifferSession::from_document)
            .collect()
    }

    /// Where a session's capture file lives. Always inside `sniffer_dir`.
    pub fn pcap_path(&self, name: &str) -> Result<PathBuf> {
        check_name(name)?;
        Ok(self.config.sniffer_dir.join(format!("{name}.pcap")))
    }

    /// Delete a session and its capture file. Returns true if the record existed.
    ///
    /// Unknown sessions touch nothing on disk. A capture file that cannot be
    /// removed is logged, never an error.
    pub fn delete_sniffer_session(&self, name: &str) -> Result<bool> {
        let path = self.pcap_path(name)?;
        if self.backend.kv_get(SNIFFER_SESSIONS, name)?.is_none() {
            return Ok(false);
        }
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "removed capture file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "capture file already gone")
            }
            Err(e) => warn!(path = %path.display(), error = %e, "could not remove capture file"),
        }
        self.backend.kv_delete(SNIFFER_SESSIONS, name)
    }
}

/// A session name must be a single plain path component.
fn check_name(name: &str) -> Result<()> {
    if Path::new(name).file_name() == Some(OsStr::new(name)) {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names_accepted() {
        assert!(check_name("office-lan").is_ok());
        assert!(check_name("lab.2024").is_ok());
    }

    #[test]
    fn test_path_like_names_rejected() {
        for bad in ["", "..", ".", "../victim", "a/b", "/etc/passwd", "x/.."] {
            assert!(matches!(check_name(bad), Err(Error::InvalidName(_))), "{bad:?} accepted");
        }
    }
}
