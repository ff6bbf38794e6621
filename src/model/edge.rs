//! Edge: a directed, attributed link between two elements.

use serde::{Deserialize, Serialize};
use super::ElementId;

/// Opaque edge identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A directed edge. At most one exists per ordered (src, dst) pair.
///
/// Endpoints are weak references: nothing checks that they still exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub src: ElementId,
    pub dst: ElementId,
    pub attribs: String,
}

impl Edge {
    pub fn new(id: EdgeId, src: ElementId, dst: ElementId, attribs: impl Into<String>) -> Self {
        Self { id, src, dst, attribs: attribs.into() }
    }

    /// Same edge with `attribs` replaced.
    pub fn with_attribs(self, attribs: impl Into<String>) -> Self {
        Self { attribs: attribs.into(), ..self }
    }

    pub fn pair(&self) -> (ElementId, ElementId) {
        (self.src, self.dst)
    }

    /// The "other" end of the edge from the given element.
    pub fn other_end(&self, from: ElementId) -> Option<ElementId> {
        if from == self.src { Some(self.dst) }
        else if from == self.dst { Some(self.src) }
        else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_end() {
        let e = Edge::new(EdgeId(1), ElementId(10), ElementId(20), "resolves_to");
        assert_eq!(e.other_end(ElementId(10)), Some(ElementId(20)));
        assert_eq!(e.other_end(ElementId(20)), Some(ElementId(10)));
        assert_eq!(e.other_end(ElementId(30)), None);
    }

    #[test]
    fn test_with_attribs_keeps_identity() {
        let e = Edge::new(EdgeId(1), ElementId(10), ElementId(20), "a").with_attribs("b");
        assert_eq!(e.id, EdgeId(1));
        assert_eq!(e.pair(), (ElementId(10), ElementId(20)));
        assert_eq!(e.attribs, "b");
    }
}
