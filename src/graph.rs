//! The difference-constraint graph.
//!
//! A directed, weighted multigraph over term vertices: an edge `u -> v` with
//! offset `c` encodes `u - v <= c` (`<` when strict). Nodes fold into
//! equivalence classes once propagation pins two of them to a fixed offset;
//! a merged node keeps its own edge lists, and every lookup follows the
//! `eq_merge` chain accumulating offsets, so the class behaves as a single
//! vertex without rewriting adjacency.
//!
//! Inserting an edge never detects inconsistency by itself; that is the
//! consistency checker's job (see [`crate::check`]), kept separate so the
//! caller controls when the more expensive search runs.

use log::{debug, trace};
use num_rational::BigRational;
use num_traits::Zero;

use crate::explain::Explanation;
use crate::table::Table;
use crate::trail::{Trail, Undo};
use crate::types::{EdgeId, NodeId, TermId};

/// One constraint edge: `source - target <= offset` (`<` when strict).
#[derive(Debug, Clone)]
pub struct DiffEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub offset: BigRational,
    pub strict: bool,
    pub explain: Explanation,
}

/// Equivalence-class link: `self - parent = offset`, justified by `explain`.
#[derive(Debug, Clone)]
struct EqMerge {
    parent: NodeId,
    offset: BigRational,
    explain: Explanation,
}

/// Ledger entry: `self - other != offset`, both sides expressed as the roots
/// they resolved to when the entry was recorded.
#[derive(Debug, Clone)]
struct NeEntry {
    other: NodeId,
    offset: BigRational,
    explain: Explanation,
}

#[derive(Debug)]
struct DiffNode {
    term: TermId,
    out: Vec<EdgeId>,
    inc: Vec<EdgeId>,
    ne: Vec<NeEntry>,
    eq_merge: Option<EqMerge>,
    /// Class members `(node, node - self)`; meaningful only while this node
    /// is a root. Starts as the singleton `[(self, 0)]`.
    members: Vec<(NodeId, BigRational)>,
}

pub struct DiffGraph {
    nodes: Vec<DiffNode>,
    edges: Vec<DiffEdge>,
    map: Table<TermId, NodeId>,
    /// Roots touched by new edges since the last propagation round.
    dirty: Vec<NodeId>,
}

/// Snapshot of the graph's arena lengths, captured by a context frame.
#[derive(Debug, Clone)]
pub struct DiffMark {
    nodes: usize,
    edges: usize,
    map: usize,
    dirty: Vec<NodeId>,
}

impl Default for DiffGraph {
    fn default() -> Self {
        DiffGraph::new(16)
    }
}

impl DiffGraph {
    pub fn new(bits: usize) -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            map: Table::new(bits),
            dirty: Vec::new(),
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn edge(&self, e: EdgeId) -> &DiffEdge {
        &self.edges[e.index()]
    }

    pub fn term_of(&self, n: NodeId) -> TermId {
        self.nodes[n.index()].term
    }

    /// The node for a term, if one was ever created.
    pub fn lookup(&self, term: TermId) -> Option<NodeId> {
        self.map.get(&term).map(|(_, &n)| n)
    }

    /// The node for a term, creating it on first reference.
    pub fn node(&mut self, term: TermId) -> NodeId {
        if let Some(n) = self.lookup(term) {
            return n;
        }
        let n = NodeId::new(self.nodes.len());
        self.nodes.push(DiffNode {
            term,
            out: Vec::new(),
            inc: Vec::new(),
            ne: Vec::new(),
            eq_merge: None,
            members: vec![(n, BigRational::zero())],
        });
        self.map.insert(term, n);
        trace!("new diff node {} for {}", n, term);
        n
    }

    /// Follow the merge chain: returns `(root, n - root)`.
    pub fn resolve(&self, n: NodeId) -> (NodeId, BigRational) {
        let mut cur = n;
        let mut offset = BigRational::zero();
        while let Some(link) = &self.nodes[cur.index()].eq_merge {
            offset += &link.offset;
            cur = link.parent;
        }
        (cur, offset)
    }

    /// Like [`DiffGraph::resolve`], also collecting the chain's merge
    /// explanations.
    pub fn resolve_explained(&self, n: NodeId) -> (NodeId, BigRational, Explanation) {
        let mut cur = n;
        let mut offset = BigRational::zero();
        let mut explain = Explanation::empty();
        while let Some(link) = &self.nodes[cur.index()].eq_merge {
            offset += &link.offset;
            explain.extend(&link.explain);
            cur = link.parent;
        }
        (cur, offset, explain)
    }

    /// Class members `(node, node - root)` of a root.
    pub fn members(&self, root: NodeId) -> &[(NodeId, BigRational)] {
        debug_assert!(self.nodes[root.index()].eq_merge.is_none());
        &self.nodes[root.index()].members
    }

    pub fn out_edges(&self, n: NodeId) -> &[EdgeId] {
        &self.nodes[n.index()].out
    }

    pub fn inc_edges(&self, n: NodeId) -> &[EdgeId] {
        &self.nodes[n.index()].inc
    }

    /// Assert `u - v <= c` (`<` when strict).
    ///
    /// No-op when an equal-or-tighter edge `u -> v` already exists. Never
    /// detects inconsistency; the caller runs the consistency checker when
    /// it sees fit.
    pub fn assert_le(
        &mut self,
        trail: &mut Trail,
        u: TermId,
        v: TermId,
        c: &BigRational,
        strict: bool,
        explain: Explanation,
    ) {
        let nu = self.node(u);
        let nv = self.node(v);

        // Dominance scan: an existing edge subsumes the new one if its
        // offset is smaller, or equal with at-least-as-strict comparison.
        for &e in &self.nodes[nu.index()].out {
            let edge = &self.edges[e.index()];
            if edge.target == nv && (edge.offset < *c || (edge.offset == *c && (edge.strict || !strict)))
            {
                trace!("assert_le {} - {} <= {}: dominated by {}", u, v, c, e);
                return;
            }
        }

        let e = EdgeId::new(self.edges.len());
        self.edges.push(DiffEdge {
            source: nu,
            target: nv,
            offset: c.clone(),
            strict,
            explain,
        });
        self.nodes[nu.index()].out.push(e);
        self.nodes[nv.index()].inc.push(e);
        trail.push(Undo::EdgeLink {
            source: nu,
            target: nv,
        });

        let (root, _) = self.resolve(nu);
        self.dirty.push(root);
        debug!(
            "assert_le: {} {} - {} {} {}",
            e,
            u,
            v,
            if strict { "<" } else { "<=" },
            c
        );
    }

    /// Record `u - v != offset` in the ledger (mirrored on both roots).
    ///
    /// Returns a contradiction explanation when `u` and `v` are already
    /// merged at exactly that offset.
    pub fn assert_ne(
        &mut self,
        trail: &mut Trail,
        u: TermId,
        v: TermId,
        offset: &BigRational,
        explain: Explanation,
    ) -> Result<(), Explanation> {
        let nu = self.node(u);
        let nv = self.node(v);
        let (ru, ou, eu) = self.resolve_explained(nu);
        let (rv, ov, ev) = self.resolve_explained(nv);
        // u - v != offset, u = ru + ou, v = rv + ov  =>  ru - rv != k.
        let k = offset - &ou + &ov;

        if ru == rv {
            if k.is_zero() {
                let e = explain.union(&eu).union(&ev);
                debug!("assert_ne: {} - {} != {} contradicts merge chain", u, v, offset);
                return Err(e.into_deduped());
            }
            // Already unequal by a fixed nonzero offset.
            return Ok(());
        }

        // Idempotence: skip when the ledger already carries this entry.
        for entry in &self.nodes[ru.index()].ne {
            let (ro, oo) = self.resolve(entry.other);
            if ro == rv && &entry.offset + &oo == k {
                return Ok(());
            }
        }

        let e = explain.union(&eu).union(&ev);
        self.nodes[ru.index()].ne.push(NeEntry {
            other: rv,
            offset: k.clone(),
            explain: e.clone(),
        });
        trail.push(Undo::DiffNePush { node: ru });
        self.nodes[rv.index()].ne.push(NeEntry {
            other: ru,
            offset: -k,
            explain: e,
        });
        trail.push(Undo::DiffNePush { node: rv });
        debug!("assert_ne: {} - {} != {}", u, v, offset);
        Ok(())
    }

    /// Would pinning `a - b = k` (both roots) violate `a`'s ledger?
    fn check_ne(&self, a: NodeId, b: NodeId, k: &BigRational) -> Option<Explanation> {
        for entry in &self.nodes[a.index()].ne {
            let (ro, oo, eo) = self.resolve_explained(entry.other);
            // a - other != off, other = ro + oo  =>  a - ro != off + oo.
            if ro == b && &entry.offset + &oo == *k {
                return Some(entry.explain.union(&eo));
            }
        }
        None
    }

    /// Coalesce the classes of `x` and `y`, where `x - y = k` with `why`
    /// as witness. Returns `Ok(false)` when they were already merged at
    /// that offset, `Ok(true)` on a fresh merge, and the combined
    /// contradiction explanation when the merge is vetoed by a ledger
    /// entry (or by an incompatible existing merge offset).
    pub fn merge(
        &mut self,
        trail: &mut Trail,
        x: NodeId,
        y: NodeId,
        k: &BigRational,
        why: &Explanation,
    ) -> Result<bool, Explanation> {
        let (rx, ox, ex) = self.resolve_explained(x);
        let (ry, oy, ey) = self.resolve_explained(y);
        // x - y = k, x = rx + ox, y = ry + oy  =>  rx - ry = koff.
        let koff = k - &ox + &oy;
        let why = why.union(&ex).union(&ey);

        if rx == ry {
            if koff.is_zero() {
                return Ok(false);
            }
            // The class already fixes a different offset between x and y.
            return Err(why.into_deduped());
        }

        if let Some(e) = self.check_ne(rx, ry, &koff) {
            return Err(e.union(&why).into_deduped());
        }
        if let Some(e) = self.check_ne(ry, rx, &(-&koff)) {
            return Err(e.union(&why).into_deduped());
        }

        // Absorb the smaller class into the larger.
        let (absorbed, survivor, off) =
            if self.nodes[rx.index()].members.len() <= self.nodes[ry.index()].members.len() {
                (rx, ry, koff.clone()) // rx - ry = koff
            } else {
                (ry, rx, -&koff) // ry - rx = -koff
            };

        debug!(
            "merge: {} into {} at offset {} ({})",
            absorbed, survivor, off, why
        );

        self.nodes[absorbed.index()].eq_merge = Some(EqMerge {
            parent: survivor,
            offset: off.clone(),
            explain: why.clone(),
        });
        trail.push(Undo::DiffMerge { node: absorbed });

        // Extend the survivor's member list. The absorbed root keeps its
        // own list intact so pop only has to truncate the survivor.
        let moved: Vec<(NodeId, BigRational)> = self.nodes[absorbed.index()]
            .members
            .iter()
            .map(|(m, om)| (*m, om + &off))
            .collect();
        trail.push(Undo::DiffMembers {
            node: survivor,
            old_len: self.nodes[survivor.index()].members.len(),
        });
        self.nodes[survivor.index()].members.extend(moved);

        // Re-home ledger entries, translated by the merge offset. Copies,
        // not moves: the absorbed root's list stays valid for pop.
        let rehomed: Vec<NeEntry> = self.nodes[absorbed.index()]
            .ne
            .iter()
            .map(|entry| NeEntry {
                other: entry.other,
                offset: &entry.offset - &off,
                explain: entry.explain.union(&why),
            })
            .collect();
        for entry in rehomed {
            self.nodes[survivor.index()].ne.push(entry);
            trail.push(Undo::DiffNePush { node: survivor });
        }

        self.dirty.push(survivor);
        Ok(true)
    }

    /// The fixed difference `u - v` entailed by the merge chains, when both
    /// terms have nodes in the same class.
    pub fn pinned_offset(&self, u: TermId, v: TermId) -> Option<BigRational> {
        let (ru, ou) = self.resolve(self.lookup(u)?);
        let (rv, ov) = self.resolve(self.lookup(v)?);
        if ru == rv {
            Some(ou - ov)
        } else {
            None
        }
    }

    /// Does the ledger forbid `u - v = offset`?
    pub fn known_ne(&self, u: TermId, v: TermId, offset: &BigRational) -> bool {
        let (nu, nv) = match (self.lookup(u), self.lookup(v)) {
            (Some(nu), Some(nv)) => (nu, nv),
            _ => return false,
        };
        let (ru, ou) = self.resolve(nu);
        let (rv, ov) = self.resolve(nv);
        let k = offset - &ou + &ov;
        if ru == rv {
            return !k.is_zero();
        }
        self.check_ne(ru, rv, &k).is_some()
    }

    /// Drain the dirty-seed list for a propagation round.
    pub fn take_dirty(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn undo(&mut self, undo: &Undo) {
        match undo {
            Undo::EdgeLink { source, target } => {
                self.nodes[source.index()].out.pop();
                self.nodes[target.index()].inc.pop();
            }
            Undo::DiffNePush { node } => {
                self.nodes[node.index()].ne.pop();
            }
            Undo::DiffMerge { node } => {
                self.nodes[node.index()].eq_merge = None;
            }
            Undo::DiffMembers { node, old_len } => {
                self.nodes[node.index()].members.truncate(*old_len);
            }
            _ => unreachable!("not a graph undo"),
        }
    }

    pub(crate) fn mark(&self) -> DiffMark {
        DiffMark {
            nodes: self.nodes.len(),
            edges: self.edges.len(),
            map: self.map.len(),
            dirty: self.dirty.clone(),
        }
    }

    /// Discard everything created after `mark`. The trail must already have
    /// been replayed past the matching frame.
    pub(crate) fn truncate(&mut self, mark: &DiffMark) {
        self.nodes.truncate(mark.nodes);
        self.edges.truncate(mark.edges);
        self.map.truncate(mark.map);
        self.dirty = mark.dirty.clone();
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::rel::rat;
    use crate::types::FactId;

    fn terms(n: u32) -> Vec<TermId> {
        (1..=n).map(TermId::new).collect()
    }

    #[test]
    fn test_edge_dominance() {
        let mut g = DiffGraph::default();
        let mut trail = Trail::new();
        let t = terms(2);
        g.assert_le(&mut trail, t[0], t[1], &rat(3), false, Explanation::single(FactId::new(1)));
        // Looser edge: dominated, not inserted.
        g.assert_le(&mut trail, t[0], t[1], &rat(5), false, Explanation::single(FactId::new(2)));
        assert_eq!(g.num_edges(), 1);
        // Same offset, strict: tighter, inserted.
        g.assert_le(&mut trail, t[0], t[1], &rat(3), true, Explanation::single(FactId::new(3)));
        assert_eq!(g.num_edges(), 2);
        // Exact duplicate: no-op.
        g.assert_le(&mut trail, t[0], t[1], &rat(3), true, Explanation::single(FactId::new(4)));
        assert_eq!(g.num_edges(), 2);
    }

    #[test]
    fn test_merge_and_resolve() {
        let mut g = DiffGraph::default();
        let mut trail = Trail::new();
        let t = terms(2);
        let nx = g.node(t[0]);
        let ny = g.node(t[1]);
        let why = Explanation::single(FactId::new(1));
        assert_eq!(g.merge(&mut trail, nx, ny, &rat(3), &why), Ok(true));
        // Repeat merge at the same offset: no-op.
        assert_eq!(g.merge(&mut trail, nx, ny, &rat(3), &why), Ok(false));
        // Conflicting offset: contradiction.
        assert!(g.merge(&mut trail, nx, ny, &rat(4), &why).is_err());

        let (rx, ox) = g.resolve(nx);
        let (ry, oy) = g.resolve(ny);
        assert_eq!(rx, ry);
        // x - y = 3 must survive resolution.
        assert_eq!(ox - oy, rat(3));
    }

    #[test]
    fn test_ne_vetoes_merge() {
        let mut g = DiffGraph::default();
        let mut trail = Trail::new();
        let t = terms(2);
        let ne = FactId::new(7);
        g.assert_ne(&mut trail, t[0], t[1], &rat(0), Explanation::single(ne))
            .unwrap();
        let nx = g.lookup(t[0]).unwrap();
        let ny = g.lookup(t[1]).unwrap();
        let err = g
            .merge(&mut trail, nx, ny, &rat(0), &Explanation::single(FactId::new(8)))
            .unwrap_err();
        assert!(err.facts().contains(&ne));
        // A merge at a different offset is fine.
        assert_eq!(
            g.merge(&mut trail, nx, ny, &rat(1), &Explanation::single(FactId::new(9))),
            Ok(true)
        );
    }

    #[test]
    fn test_ne_against_merged_class() {
        let mut g = DiffGraph::default();
        let mut trail = Trail::new();
        let t = terms(2);
        let nx = g.node(t[0]);
        let ny = g.node(t[1]);
        let merge_fact = FactId::new(1);
        g.merge(&mut trail, nx, ny, &rat(3), &Explanation::single(merge_fact))
            .unwrap();
        // x - y = 3, so x - y != 3 must contradict and cite the merge.
        let err = g
            .assert_ne(&mut trail, t[0], t[1], &rat(3), Explanation::single(FactId::new(2)))
            .unwrap_err();
        assert!(err.facts().contains(&merge_fact));
        // x - y != 5 is entailed: no-op.
        g.assert_ne(&mut trail, t[0], t[1], &rat(5), Explanation::single(FactId::new(3)))
            .unwrap();
    }

    #[test]
    fn test_truncate_with_trail() {
        let mut g = DiffGraph::default();
        let mut trail = Trail::new();
        let t = terms(3);
        g.assert_le(&mut trail, t[0], t[1], &rat(1), false, Explanation::empty());
        let mark = g.mark();
        let trail_mark = trail.len();

        g.assert_le(&mut trail, t[1], t[2], &rat(2), false, Explanation::empty());
        let nx = g.lookup(t[0]).unwrap();
        let ny = g.lookup(t[1]).unwrap();
        g.merge(&mut trail, nx, ny, &rat(0), &Explanation::empty())
            .unwrap();

        while let Some(undo) = trail.pop_above(trail_mark) {
            g.undo(&undo);
        }
        g.truncate(&mark);

        assert_eq!(g.num_nodes(), 2);
        assert_eq!(g.num_edges(), 1);
        assert_eq!(g.lookup(t[2]), None);
        let (rx, _) = g.resolve(nx);
        let (ry, _) = g.resolve(ny);
        assert_ne!(rx, ry);
        assert_eq!(g.members(rx).len(), 1);
    }
}
