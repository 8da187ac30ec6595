//! Type-safe handles for the theory core.
//!
//! Every long-lived object (term, asserted fact, graph node, graph edge,
//! union-find variable, term group) is referred to by a `u32` handle into
//! an arena or table. The newtypes below keep the handle spaces apart at
//! compile time.

use std::fmt;

/// An interned term handle (1-indexed; 0 is the table sentinel).
///
/// Term handles are opaque: equality of handles is identity of terms,
/// never structural comparison.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TermId(u32);

impl TermId {
    /// Creates a term handle from a raw table index.
    ///
    /// # Panics
    ///
    /// Panics if `id == 0`. Index 0 is the table sentinel.
    pub fn new(id: u32) -> Self {
        assert_ne!(id, 0, "Term ids must be >= 1");
        TermId(id)
    }

    pub fn id(self) -> u32 {
        self.0
    }
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// A handle for an asserted fact, owned by the caller.
///
/// The engine never interprets fact handles; it only collects them into
/// explanations. The enclosing search driver maps them back to its literals.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FactId(u32);

impl FactId {
    pub fn new(id: u32) -> Self {
        FactId(id)
    }
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// A vertex of the difference graph (0-indexed arena handle).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(id: usize) -> Self {
        NodeId(id as u32)
    }
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// An edge of the difference graph (0-indexed arena handle).
///
/// Edges are shared between the source's outgoing list and the target's
/// incoming list; they are reclaimed only by scope truncation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EdgeId(u32);

impl EdgeId {
    pub fn new(id: usize) -> Self {
        EdgeId(id as u32)
    }
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// A union-find variable (0-indexed arena handle).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VarId(u32);

impl VarId {
    pub fn new(id: usize) -> Self {
        VarId(id as u32)
    }
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A term group: the congruence-closure anchor of one applied term
/// (0-indexed arena handle).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct GroupId(u32);

impl GroupId {
    pub fn new(id: usize) -> Self {
        GroupId(id as u32)
    }
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_id() {
        let t1 = TermId::new(1);
        let t2 = TermId::new(2);
        assert_eq!(t1.id(), 1);
        assert!(t1 < t2);
        assert_eq!(t1.to_string(), "t1");
    }

    #[test]
    #[should_panic(expected = "Term ids must be >= 1")]
    fn test_term_id_zero_panics() {
        TermId::new(0);
    }

    #[test]
    fn test_arena_handles() {
        assert_eq!(NodeId::new(3).index(), 3);
        assert_eq!(EdgeId::new(0).index(), 0);
        assert_eq!(VarId::new(7).to_string(), "v7");
        assert_eq!(GroupId::new(2).to_string(), "g2");
    }
}
