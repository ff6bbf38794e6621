//! Serialization boundary between stores and backends.
//!
//! Outgoing (read) records are decoded through the type registry; incoming
//! (write) documents pass through untouched. Call sites never decode on
//! their own.

use crate::model::{Document, Element, TypeRegistry};
use crate::Result;
use super::StoredElement;

#[derive(Debug, Clone, Default)]
pub struct Codec {
    registry: TypeRegistry,
}

impl Codec {
    pub fn new(registry: TypeRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Write path: the raw attribute bag goes to the backend as-is.
    pub fn encode(&self, doc: Document) -> Document {
        doc
    }

    /// Read path.
    pub fn decode(&self, stored: StoredElement) -> Result<Element> {
        self.registry.decode(stored.id, stored.document)
    }
}
