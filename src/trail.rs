//! The undo trail: the backbone of backtracking.
//!
//! Every in-place field write on a long-lived record that must survive a
//! scope pop first appends a typed [`Undo`] entry here. A context frame
//! captures the trail length at push time; pop walks the trail back to that
//! mark, reverting each write, then truncates. Arena growth is *not*
//! trailed — frames remember arena lengths and pop truncates them after the
//! trail has been replayed.
//!
//! Bypassing the trail for any undoable mutation breaks backtracking
//! silently; the randomized push/assert/pop tests exist to catch that.

use crate::types::{GroupId, NodeId, VarId};

/// One reversible field write.
#[derive(Debug, Clone)]
pub enum Undo {
    /// An edge was linked into `source`'s outgoing and `target`'s incoming
    /// adjacency lists; pop removes the last entry of each.
    EdgeLink { source: NodeId, target: NodeId },
    /// A ledger entry was pushed onto a graph node.
    DiffNePush { node: NodeId },
    /// A graph node was folded into another's equivalence class.
    DiffMerge { node: NodeId },
    /// A merge extended `node`'s member list; pop truncates it.
    DiffMembers { node: NodeId, old_len: usize },
    /// A union-find root was re-parented.
    CcParent { var: VarId },
    /// A disequality entry was pushed onto a union-find root.
    CcNePush { var: VarId },
    /// A term group was appended to a root's `equal_terms`.
    CcEqualTerm { var: VarId },
    /// A term group was appended to a root's `used_in_terms`.
    CcUsedIn { var: VarId },
    /// A term group was bound to (or re-bound from) a variable.
    CcGroupVar { group: GroupId, old: Option<VarId> },
}

/// The engine-owned trail, passed by reference into every mutating call.
#[derive(Debug, Default)]
pub struct Trail {
    entries: Vec<Undo>,
}

impl Trail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current length; captured by context frames.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, undo: Undo) {
        self.entries.push(undo);
    }

    /// Pop the newest entry, if the trail is above `mark`.
    pub fn pop_above(&mut self, mark: usize) -> Option<Undo> {
        if self.entries.len() > mark {
            self.entries.pop()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_above_stops_at_mark() {
        let mut trail = Trail::new();
        trail.push(Undo::DiffMerge {
            node: NodeId::new(0),
        });
        let mark = trail.len();
        trail.push(Undo::DiffMerge {
            node: NodeId::new(1),
        });
        trail.push(Undo::DiffMerge {
            node: NodeId::new(2),
        });

        let mut popped = Vec::new();
        while let Some(undo) = trail.pop_above(mark) {
            popped.push(undo);
        }
        assert_eq!(popped.len(), 2);
        assert_eq!(trail.len(), mark);
        // Newest first.
        assert!(matches!(popped[0], Undo::DiffMerge { node } if node == NodeId::new(2)));
    }
}
