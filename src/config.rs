//! Store configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::storage::BackendConfig;
use crate::Result;

/// Everything needed to open a [`Store`](crate::Store).
///
/// ```json
/// { "backend": { "engine": "memory" }, "sniffer_dir": "/var/lib/malgraph/pcap" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendConfig,
    /// Directory holding packet-capture artifacts for sniffer sessions.
    pub sniffer_dir: PathBuf,
    /// Declare the required indexes when the store opens.
    pub rebuild_indexes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::Memory,
            sniffer_dir: PathBuf::from("sniffer"),
            rebuild_indexes: true,
        }
    }
}

impl StoreConfig {
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn with_sniffer_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sniffer_dir = dir.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let cfg = StoreConfig::from_json(r#"{ "sniffer_dir": "/tmp/pcap" }"#).unwrap();
        assert_eq!(cfg.backend, BackendConfig::Memory);
        assert_eq!(cfg.sniffer_dir, PathBuf::from("/tmp/pcap"));
        assert!(cfg.rebuild_indexes);
    }

    #[test]
    fn test_engine_tag() {
        let cfg = StoreConfig::from_json(r#"{ "backend": { "engine": "memory" }, "rebuild_indexes": false }"#)
            .unwrap();
        assert_eq!(cfg.backend, BackendConfig::Memory);
        assert!(!cfg.rebuild_indexes);
    }

    #[test]
    fn test_bad_json_is_error() {
        assert!(StoreConfig::from_json("{ nope").is_err());
    }
}
