//! # malgraph: Deduplicated Element Graph Store
//!
//! Keeps one canonical record per observed entity ("element": hostname, URL,
//! IP, AS number, evil marker) and the directed, attributed edges between
//! them, and answers the neighbor-expansion queries used to browse the graph
//! one ring at a time.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `StorageBackend` is the contract between the stores and storage
//! 2. **Value structs**: `Element`, `Edge`, `Document` cross all boundaries
//! 3. **One decode boundary**: documents become typed elements in `storage::codec`, nowhere else
//! 4. **One write lock**: check-then-write sequences are serialized store-wide; reads never lock
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use malgraph::{ElementFilter, ElementKind, Store};
//!
//! # fn example() -> malgraph::Result<()> {
//! let store = Store::open_memory()?;
//!
//! let (host, _) = store.save(ElementKind::Hostname.candidate("evil.com"))?;
//! let (ip, _) = store.save(ElementKind::Ip.candidate("1.2.3.4"))?;
//! store.connect(Some(&host), Some(&ip), "resolves_to", true)?;
//!
//! let hood = store.expand_one(Some(&host), &ElementFilter::All, true)?;
//! for node in &hood.nodes {
//!     println!("{} ({} incoming)", node.value, node.incoming_links);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage Backends
//!
//! | Backend | Feature | Description |
//! |---------|---------|-------------|
//! | Memory | (default) | In-memory store for testing/embedding |
//! | Sled | `sled` | Persistent store on local disk |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod storage;
pub mod index;
pub mod config;
pub mod store;
pub mod collab;

// ============================================================================
// Re-exports: Model (the value structs)
// ============================================================================

pub use model::{
    Document, DisplayField, Edge, EdgeId, Element, ElementFilter, ElementId, ElementKind,
    TypeRegistry, Value,
};

// ============================================================================
// Re-exports: Storage, config, stores
// ============================================================================

pub use storage::{BackendConfig, MemoryBackend, StorageBackend};
#[cfg(feature = "sled")]
pub use storage::SledBackend;
pub use config::StoreConfig;
pub use store::{Neighborhood, Stats};
pub use collab::SnifferSession;

use parking_lot::Mutex;
use tracing::info;

use storage::Codec;

// ============================================================================
// Top-level Store handle
// ============================================================================

/// The primary entry point. A `Store` wraps a storage backend, the type
/// registry that decodes what it reads, and the lock that serializes
/// check-then-write sequences.
///
/// Element, edge, expansion and collaborator operations live in
/// [`store`] and [`collab`] as further `impl` blocks on this type.
pub struct Store<B: StorageBackend> {
    backend: B,
    codec: Codec,
    /// Guards `save`, `connect` and the other lookup-then-write sequences.
    /// Reads never take it.
    write_lock: Mutex<()>,
    config: StoreConfig,
}

impl<B: StorageBackend> Store<B> {
    /// Create a Store with the given backend.
    pub fn with_backend(backend: B, config: StoreConfig) -> Result<Self> {
        Self::with_registry(backend, config, TypeRegistry::builtin())
    }

    pub fn with_registry(backend: B, config: StoreConfig, registry: TypeRegistry) -> Result<Self> {
        let store = Self {
            backend,
            codec: Codec::new(registry),
            write_lock: Mutex::new(()),
            config,
        };
        if store.config.rebuild_indexes {
            store.rebuild_indexes()?;
        }
        Ok(store)
    }

    /// Declare the required access paths on the backend.
    pub fn rebuild_indexes(&self) -> Result<usize> {
        index::rebuild_indexes(&self.backend)
    }

    /// Flush and release the backend.
    pub fn close(self) -> Result<()> {
        info!("closing store");
        self.backend.shutdown()
    }

    /// Access the underlying backend (for advanced use).
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn registry(&self) -> &TypeRegistry {
        self.codec.registry()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

/// In-memory store for testing and embedding.
impl Store<MemoryBackend> {
    pub fn open_memory() -> Result<Self> {
        Self::with_backend(MemoryBackend::new(), StoreConfig::default())
    }
}

#[cfg(feature = "sled")]
impl Store<SledBackend> {
    pub fn open_sled(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::with_backend(SledBackend::open(path)?, StoreConfig::default())
    }
}

impl Store<Box<dyn StorageBackend>> {
    /// Open whichever backend the config names.
    pub fn open(config: StoreConfig) -> Result<Self> {
        info!(backend = ?config.backend, "opening store");
        let backend = storage::open_backend(&config.backend)?;
        Self::with_backend(backend, config)
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A uniqueness guarantee is broken. Never recovered from.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Invalid candidate: {0}")]
    InvalidCandidate(String),

    #[error("Unknown element type: {0}")]
    UnknownType(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    /// A collaborator record key that cannot name a file.
    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "sled")]
    #[error("sled error: {0}")]
    Sled(#[from] ::sled::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
