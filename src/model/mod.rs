//! # Element Graph Model
//!
//! Value structs that cross every boundary: storage ↔ stores ↔ expander ↔ caller.
//!
//! Design rule: this module is pure data with no I/O or locks.

pub mod document;
pub mod edge;
pub mod element;
pub mod filter;
pub mod registry;
pub mod value;

pub use document::Document;
pub use edge::{Edge, EdgeId};
pub use element::{DisplayField, Element, ElementId, ElementKind};
pub use filter::{ElementFilter, IndexHint};
pub use registry::{DecodeFn, TypeRegistry};
pub use value::Value;
