//! The theory manager: one facade over both reasoning engines.
//!
//! [`Theory`] owns the term interner, the difference graph with its
//! consistency checker, the congruence-closure union-find, the undo trail,
//! and the stack of context frames. Callers intern terms, assert normalized
//! facts under caller-chosen fact handles, run propagation, and push/pop
//! scopes; every contradiction comes back as an [`Explanation`] listing the
//! asserted facts that caused it.
//!
//! The two engines cross-feed through [`Theory::propagate`]: equalities the
//! graph pins at offset zero become union-find unions, and unions or
//! divisions the closure derives become graph merges or ledger entries, until
//! neither side produces anything new.

use log::debug;
use num_rational::BigRational;
use num_traits::Zero;

use crate::check::Propagator;
use crate::congruence::{CcEvent, CcMark, Congruence};
use crate::explain::Explanation;
use crate::graph::{DiffGraph, DiffMark};
use crate::rel::{EqualityStatus, RelOp, Relationship};
use crate::term::{Functor, TermArena};
use crate::trail::{Trail, Undo};
use crate::types::{FactId, TermId};

/// One pushed scope: the trail mark plus both engines' arena snapshots.
struct Frame {
    trail: usize,
    diff: DiffMark,
    cc: CcMark,
}

pub struct Theory {
    pub(crate) terms: TermArena,
    pub(crate) graph: DiffGraph,
    pub(crate) cc: Congruence,
    trail: Trail,
    prop: Propagator,
    frames: Vec<Frame>,
}

impl Default for Theory {
    fn default() -> Self {
        Theory::new()
    }
}

impl Theory {
    pub fn new() -> Self {
        Self {
            terms: TermArena::default(),
            graph: DiffGraph::default(),
            cc: Congruence::default(),
            trail: Trail::new(),
            prop: Propagator::new(),
            frames: Vec::new(),
        }
    }

    // Term construction. The interner is shared vocabulary and is never
    // rolled back by pop.

    pub fn symbol(&mut self, name: &str) -> TermId {
        self.terms.symbol(name)
    }

    pub fn functor(&mut self, name: &str) -> Functor {
        self.terms.functor(name)
    }

    pub fn app(&mut self, f: Functor, args: &[TermId]) -> TermId {
        self.terms.app(f, args)
    }

    pub fn display_term(&self, t: TermId) -> String {
        self.terms.display(t)
    }

    /// Number of scopes currently pushed.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Assert one normalized fact under the caller's handle.
    ///
    /// Inequalities are checked eagerly against the existing graph before
    /// insertion; equalities and disequalities are checked against merge
    /// chains, the ledger, and the union-find. Consequences (bound
    /// tightening, discovered equalities, congruence) only surface in
    /// [`Theory::propagate`].
    ///
    /// On `Err` the engines may hold partial effects of the rejected fact;
    /// the caller is expected to pop the enclosing scope.
    pub fn assert(&mut self, fact: FactId, rel: &Relationship) -> Result<(), Explanation> {
        let why = Explanation::single(fact);
        debug!("assert {}: {}", fact, rel);
        self.note_term(rel.left)?;
        self.note_term(rel.right)?;
        match rel.op {
            RelOp::Le | RelOp::Lt => {
                let strict = rel.op == RelOp::Lt;
                let nu = self.graph.node(rel.left);
                let nv = self.graph.node(rel.right);
                if let Some(e) = self
                    .prop
                    .check_hypothesis(&self.graph, nu, nv, &rel.offset, strict)
                {
                    return Err(e.union(&why).into_deduped());
                }
                self.graph.assert_le(
                    &mut self.trail,
                    rel.left,
                    rel.right,
                    &rel.offset,
                    strict,
                    why,
                );
                Ok(())
            }
            RelOp::Eq => {
                let nu = self.graph.node(rel.left);
                let nv = self.graph.node(rel.right);
                // Both halves of the equality must survive the current
                // bounds before the merge goes in.
                if let Some(e) = self
                    .prop
                    .check_hypothesis(&self.graph, nu, nv, &rel.offset, false)
                {
                    return Err(e.union(&why).into_deduped());
                }
                if let Some(e) =
                    self.prop
                        .check_hypothesis(&self.graph, nv, nu, &-&rel.offset, false)
                {
                    return Err(e.union(&why).into_deduped());
                }
                self.graph.merge(&mut self.trail, nu, nv, &rel.offset, &why)?;
                if rel.offset.is_zero() {
                    self.cc.union_terms(
                        &self.terms,
                        &mut self.trail,
                        rel.left,
                        rel.right,
                        why,
                    )?;
                }
                Ok(())
            }
            RelOp::Ne => {
                self.graph.assert_ne(
                    &mut self.trail,
                    rel.left,
                    rel.right,
                    &rel.offset,
                    why.clone(),
                )?;
                if rel.offset.is_zero() {
                    self.cc.divide_terms(
                        &self.terms,
                        &mut self.trail,
                        rel.left,
                        rel.right,
                        why,
                    )?;
                }
                Ok(())
            }
        }
    }

    /// Run both engines to a joint fixpoint.
    ///
    /// Each round drains the graph's dirty seeds through full propagation,
    /// folds discovered equalities back in as merges, and exchanges
    /// zero-offset merges and divisions with the union-find. Rounds repeat
    /// until neither engine produces anything new.
    pub fn propagate(&mut self) -> Result<(), Explanation> {
        loop {
            let mut seeds = self.graph.take_dirty();
            let events = self.cc.take_events();
            if seeds.is_empty() && events.is_empty() {
                return Ok(());
            }

            for event in events {
                self.apply_cc_event(event)?;
            }

            seeds.sort_by_key(|n| n.index());
            seeds.dedup();
            for seed in seeds {
                let (root, _) = self.graph.resolve(seed);
                let pins = self.prop.propagate_seed(&self.graph, root)?;
                for pin in pins {
                    let fresh =
                        self.graph
                            .merge(&mut self.trail, pin.a, pin.b, &pin.offset, &pin.why)?;
                    if fresh && pin.offset.is_zero() {
                        // A zero-offset pin is a genuine term equality; let
                        // the closure see it if it knows both terms.
                        let ta = self.graph.term_of(pin.a);
                        let tb = self.graph.term_of(pin.b);
                        if self.cc.lookup(&self.terms, ta).is_some()
                            && self.cc.lookup(&self.terms, tb).is_some()
                        {
                            self.cc.union_terms(
                                &self.terms,
                                &mut self.trail,
                                ta,
                                tb,
                                pin.why,
                            )?;
                        }
                    }
                }
            }
        }
    }

    /// Make an applied term known to the closure so congruence covers it.
    /// Interning alone can derive a contradiction when the new term is
    /// congruent to one in a divided class.
    fn note_term(&mut self, t: TermId) -> Result<(), Explanation> {
        if !self.terms.is_symbol(t) {
            self.cc.intern(&self.terms, &mut self.trail, t);
            self.cc.run(&mut self.trail)?;
        }
        Ok(())
    }

    /// Fold one closure-derived merge or division into the graph.
    fn apply_cc_event(&mut self, event: CcEvent) -> Result<(), Explanation> {
        match event {
            CcEvent::Merged(t1, t2, why) => {
                if let (Some(n1), Some(n2)) = (self.graph.lookup(t1), self.graph.lookup(t2)) {
                    self.graph
                        .merge(&mut self.trail, n1, n2, &BigRational::zero(), &why)?;
                }
            }
            CcEvent::Divided(t1, t2, why) => {
                if self.graph.lookup(t1).is_some() && self.graph.lookup(t2).is_some() {
                    self.graph
                        .assert_ne(&mut self.trail, t1, t2, &BigRational::zero(), why)?;
                }
            }
        }
        Ok(())
    }

    /// Open a scope: everything asserted after this call is undone by the
    /// matching [`Theory::pop`].
    pub fn push(&mut self) {
        debug!("push to depth {}", self.frames.len() + 1);
        self.frames.push(Frame {
            trail: self.trail.len(),
            diff: self.graph.mark(),
            cc: self.cc.mark(),
        });
    }

    /// Close the innermost scope, restoring both engines exactly.
    ///
    /// # Panics
    ///
    /// Panics if no scope is open.
    pub fn pop(&mut self) {
        let frame = self.frames.pop().expect("pop without a matching push");
        debug!("pop to depth {}", self.frames.len());
        while let Some(undo) = self.trail.pop_above(frame.trail) {
            match undo {
                Undo::EdgeLink { .. }
                | Undo::DiffNePush { .. }
                | Undo::DiffMerge { .. }
                | Undo::DiffMembers { .. } => self.graph.undo(&undo),
                Undo::CcParent { .. }
                | Undo::CcNePush { .. }
                | Undo::CcEqualTerm { .. }
                | Undo::CcUsedIn { .. }
                | Undo::CcGroupVar { .. } => self.cc.undo(&undo),
            }
        }
        self.graph.truncate(&frame.diff);
        self.cc.truncate(&frame.cc);
    }

    /// Read-only entailment query, consulting both engines. `Unknown` means
    /// neither entailed nor refuted by what has been asserted and propagated
    /// so far.
    pub fn equality_status(&self, t1: TermId, t2: TermId) -> EqualityStatus {
        if t1 == t2 {
            return EqualityStatus::Equal;
        }
        if let Some(k) = self.graph.pinned_offset(t1, t2) {
            return if k.is_zero() {
                EqualityStatus::Equal
            } else {
                EqualityStatus::Disequal
            };
        }
        if self.graph.known_ne(t1, t2, &BigRational::zero()) {
            return EqualityStatus::Disequal;
        }
        if let Some((ra, rb)) = self.cc.roots_of(&self.terms, t1, t2) {
            if ra == rb {
                return EqualityStatus::Equal;
            }
            if self.cc.are_ne(ra, rb) {
                return EqualityStatus::Disequal;
            }
        }
        EqualityStatus::Unknown
    }

    /// Tightest entailed upper bound on `t1 - t2`, with its strictness.
    /// `None` when either term is unknown to the graph or no constraint
    /// path connects them.
    pub fn implied_bound(&mut self, t1: TermId, t2: TermId) -> Option<(BigRational, bool)> {
        let nu = self.graph.lookup(t1)?;
        let nv = self.graph.lookup(t2)?;
        self.prop.tightest_bound(&self.graph, nu, nv)
    }

    /// The canonical representative of a term's equivalence class, preferring
    /// the graph's zero-offset class over the union-find's.
    pub fn get_root(&self, t: TermId) -> TermId {
        if let Some(n) = self.graph.lookup(t) {
            let (root, offset) = self.graph.resolve(n);
            // A singleton class pins nothing; let the closure answer so
            // both sides of a closure-only equality agree on one
            // representative.
            if offset.is_zero() && self.graph.members(root).len() > 1 {
                return self.graph.term_of(root);
            }
        }
        if let Some(v) = self.cc.lookup(&self.terms, t) {
            return self.cc.term_of(self.cc.find(v));
        }
        t
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use test_log::test;

    use super::*;
    use crate::rel::rat;

    fn fact(id: u32) -> FactId {
        FactId::new(id)
    }

    #[test]
    fn test_negative_cycle_explanation() {
        let mut th = Theory::new();
        let x = th.symbol("x");
        let y = th.symbol("y");
        let z = th.symbol("z");
        th.assert(fact(1), &Relationship::le(x, y, rat(3))).unwrap();
        th.assert(fact(2), &Relationship::le(y, z, rat(2))).unwrap();
        let err = th
            .assert(fact(3), &Relationship::le(z, x, rat(-6)))
            .unwrap_err();
        let mut ids: Vec<u32> = err.facts().iter().map(|f| f.id()).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_discovered_equality() {
        let mut th = Theory::new();
        let x = th.symbol("x");
        let y = th.symbol("y");
        th.assert(fact(1), &Relationship::le(x, y, rat(0))).unwrap();
        assert_eq!(th.equality_status(x, y), EqualityStatus::Unknown);
        th.assert(fact(2), &Relationship::le(y, x, rat(0))).unwrap();
        th.propagate().unwrap();
        assert_eq!(th.equality_status(x, y), EqualityStatus::Equal);
        assert_eq!(th.get_root(x), th.get_root(y));
    }

    #[test]
    fn test_pinned_nonzero_offset_is_disequal() {
        let mut th = Theory::new();
        let x = th.symbol("x");
        let y = th.symbol("y");
        th.assert(fact(1), &Relationship::le(x, y, rat(3))).unwrap();
        th.assert(fact(2), &Relationship::le(y, x, rat(-3))).unwrap();
        th.propagate().unwrap();
        // x - y = 3 exactly: distinct values.
        assert_eq!(th.equality_status(x, y), EqualityStatus::Disequal);
    }

    #[test]
    fn test_strict_zero_cycle_rejected() {
        let mut th = Theory::new();
        let x = th.symbol("x");
        let y = th.symbol("y");
        th.assert(fact(1), &Relationship::lt(x, y, rat(3))).unwrap();
        let err = th
            .assert(fact(2), &Relationship::le(y, x, rat(-3)))
            .unwrap_err();
        let mut ids: Vec<u32> = err.facts().iter().map(|f| f.id()).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_implied_bound() {
        let mut th = Theory::new();
        let x = th.symbol("x");
        let y = th.symbol("y");
        let z = th.symbol("z");
        th.assert(fact(1), &Relationship::le(x, y, rat(3))).unwrap();
        th.assert(fact(2), &Relationship::lt(y, z, rat(2))).unwrap();
        // Transitive: x - z < 5.
        assert_eq!(th.implied_bound(x, z), Some((rat(5), true)));
        assert_eq!(th.implied_bound(x, y), Some((rat(3), false)));
        // No path from z back to x.
        assert_eq!(th.implied_bound(z, x), None);
        let w = th.symbol("w");
        assert_eq!(th.implied_bound(x, w), None);
    }

    #[test]
    fn test_disequality_blocks_equality() {
        let mut th = Theory::new();
        let a = th.symbol("a");
        let b = th.symbol("b");
        let c = th.symbol("c");
        th.assert(fact(1), &Relationship::ne(a, b)).unwrap();
        th.assert(fact(2), &Relationship::eq(a, c)).unwrap();
        th.propagate().unwrap();
        assert_eq!(th.equality_status(a, c), EqualityStatus::Equal);
        assert_eq!(th.equality_status(a, b), EqualityStatus::Disequal);
        let err = th.assert(fact(3), &Relationship::eq(c, b)).unwrap_err();
        assert!(err.facts().contains(&fact(1)));
        assert!(err.facts().contains(&fact(3)));
    }

    #[test]
    fn test_congruence_feeds_arithmetic() {
        let mut th = Theory::new();
        let a = th.symbol("a");
        let b = th.symbol("b");
        let f = th.functor("f");
        let fa = th.app(f, &[a]);
        let fb = th.app(f, &[b]);
        // f(a) < f(b), yet a = b forces f(a) = f(b).
        th.assert(fact(1), &Relationship::lt(fa, fb, rat(0))).unwrap();
        th.assert(fact(2), &Relationship::eq(a, b)).unwrap();
        let err = th.propagate().unwrap_err();
        let mut ids: Vec<u32> = err.facts().iter().map(|f| f.id()).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_arithmetic_feeds_congruence() {
        let mut th = Theory::new();
        let a = th.symbol("a");
        let b = th.symbol("b");
        let f = th.functor("f");
        let fa = th.app(f, &[a]);
        let fb = th.app(f, &[b]);
        // f(a) != f(b) in the closure, a pinned equal to b arithmetically.
        th.assert(fact(1), &Relationship::ne(fa, fb)).unwrap();
        th.assert(fact(2), &Relationship::le(a, b, rat(0))).unwrap();
        th.assert(fact(3), &Relationship::le(b, a, rat(0))).unwrap();
        // Propagation pins a = b, feeds the closure, and congruence makes
        // f(a) = f(b), contradicting the division.
        let err = th.propagate().unwrap_err();
        assert!(err.facts().contains(&fact(1)));
        assert!(err.facts().contains(&fact(2)));
        assert!(err.facts().contains(&fact(3)));
    }

    #[test]
    fn test_pending_cross_feed_survives_push_pop() {
        let mut th = Theory::new();
        let a = th.symbol("a");
        let b = th.symbol("b");
        let f = th.functor("f");
        let fa = th.app(f, &[a]);
        let fb = th.app(f, &[b]);
        th.assert(fact(1), &Relationship::lt(fa, fb, rat(0))).unwrap();
        th.assert(fact(2), &Relationship::eq(a, b)).unwrap();
        // The congruence of f(a) and f(b) derived before the push must
        // still reach the graph after an intervening scope.
        th.push();
        th.pop();
        let err = th.propagate().unwrap_err();
        let mut ids: Vec<u32> = err.facts().iter().map(|f| f.id()).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_argument_union_refines_disequality() {
        let mut th = Theory::new();
        let a = th.symbol("a");
        let b = th.symbol("b");
        let c = th.symbol("c");
        let d = th.symbol("d");
        let f = th.functor("f");
        let fac = th.app(f, &[a, c]);
        let fbd = th.app(f, &[b, d]);
        th.assert(fact(1), &Relationship::ne(fac, fbd)).unwrap();
        assert_eq!(th.equality_status(a, b), EqualityStatus::Unknown);
        // c = d leaves the first argument as the only differing position,
        // so a and b must come apart.
        th.assert(fact(2), &Relationship::eq(c, d)).unwrap();
        th.propagate().unwrap();
        assert_eq!(th.equality_status(a, b), EqualityStatus::Disequal);
    }

    #[test]
    fn test_get_root_agrees_for_closure_only_equality() {
        let mut th = Theory::new();
        let a = th.symbol("a");
        let b = th.symbol("b");
        let x = th.symbol("x");
        let f = th.functor("f");
        let g = th.functor("g");
        let fa = th.app(f, &[a]);
        let fb = th.app(f, &[b]);
        let gfb = th.app(g, &[fb]);
        // f(a) has a graph node; f(b) is known only to the closure.
        th.assert(fact(1), &Relationship::le(fa, x, rat(0))).unwrap();
        th.assert(fact(2), &Relationship::le(gfb, x, rat(0))).unwrap();
        th.assert(fact(3), &Relationship::eq(a, b)).unwrap();
        th.propagate().unwrap();
        assert_eq!(th.equality_status(fa, fb), EqualityStatus::Equal);
        assert_eq!(th.get_root(fa), th.get_root(fb));
    }

    /// Exact feasibility of a difference-constraint set `u - v <= c`
    /// (`<` when strict): Bellman-Ford from a virtual zero source, strict
    /// edges carrying an epsilon, infeasible when relaxation still improves
    /// after every node count has been exhausted.
    fn feasible(n: usize, cons: &[(usize, usize, BigRational, bool)]) -> bool {
        let mut dist: Vec<(BigRational, i64)> = (0..n).map(|_| (rat(0), 0)).collect();
        for _ in 0..=n {
            let mut changed = false;
            for (u, v, c, strict) in cons {
                let eps = if *strict { -1 } else { 0 };
                let cand = (&dist[*v].0 + c, dist[*v].1 + eps);
                if cand < dist[*u] {
                    dist[*u] = cand;
                    changed = true;
                }
            }
            if !changed {
                return true;
            }
        }
        false
    }

    #[test]
    fn test_randomized_feasibility_against_reference() {
        // The engine's verdict on random inequality sets must match an
        // exact reference check: no missed and no spurious contradictions.
        let mut rng = StdRng::seed_from_u64(0xbf0d);
        for instance in 0..40 {
            let mut th = Theory::new();
            let syms: Vec<TermId> = (0..5)
                .map(|i| th.symbol(&format!("s{}", i)))
                .collect();
            let mut cons: Vec<(usize, usize, BigRational, bool)> = Vec::new();
            for op in 0..12u32 {
                let i = rng.gen_range(0..syms.len());
                let j = rng.gen_range(0..syms.len());
                if i == j {
                    continue;
                }
                let k = rat(rng.gen_range(-2..=2));
                let (rel, added) = match rng.gen_range(0..3) {
                    0 => (
                        Relationship::le(syms[i], syms[j], k.clone()),
                        vec![(i, j, k, false)],
                    ),
                    1 => (
                        Relationship::lt(syms[i], syms[j], k.clone()),
                        vec![(i, j, k, true)],
                    ),
                    _ => (
                        Relationship::eq_offset(syms[i], syms[j], k.clone()),
                        vec![(i, j, k.clone(), false), (j, i, -k, false)],
                    ),
                };
                let mut attempted = cons.clone();
                attempted.extend(added);
                let result = th
                    .assert(FactId::new(op + 1), &rel)
                    .and_then(|_| th.propagate());
                match result {
                    Ok(()) => {
                        cons = attempted;
                        assert!(
                            feasible(syms.len(), &cons),
                            "missed contradiction in instance {} at op {}",
                            instance,
                            op
                        );
                    }
                    Err(_) => {
                        assert!(
                            !feasible(syms.len(), &attempted),
                            "spurious contradiction in instance {} at op {}",
                            instance,
                            op
                        );
                        break;
                    }
                }
            }
        }
    }

    #[test]
    fn test_explanation_replay() {
        // Re-asserting exactly the facts of an explanation reproduces the
        // contradiction in a fresh engine.
        let mut th = Theory::new();
        let x = th.symbol("x");
        let y = th.symbol("y");
        let z = th.symbol("z");
        let script: Vec<(FactId, Relationship)> = vec![
            (fact(1), Relationship::le(x, y, rat(1))),
            (fact(2), Relationship::le(z, x, rat(-4))),
            (fact(3), Relationship::le(y, z, rat(2))),
            (fact(4), Relationship::ne(x, z)),
        ];
        let mut culprit = None;
        let mut th1 = Theory::new();
        th1.symbol("x");
        th1.symbol("y");
        th1.symbol("z");
        for (f, rel) in &script {
            if let Err(e) = th1.assert(*f, rel).and_then(|_| th1.propagate()) {
                culprit = Some(e);
                break;
            }
        }
        let explanation = culprit.expect("the script is contradictory");

        let mut th2 = Theory::new();
        th2.symbol("x");
        th2.symbol("y");
        th2.symbol("z");
        let mut failed = false;
        for (f, rel) in &script {
            if !explanation.facts().contains(f) {
                continue;
            }
            if th2.assert(*f, rel).and_then(|_| th2.propagate()).is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed, "replaying {} must contradict", explanation);
    }

    #[test]
    fn test_push_pop_restores_entailment() {
        let mut th = Theory::new();
        let x = th.symbol("x");
        let y = th.symbol("y");
        th.assert(fact(1), &Relationship::le(x, y, rat(0))).unwrap();
        th.propagate().unwrap();

        th.push();
        th.assert(fact(2), &Relationship::le(y, x, rat(0))).unwrap();
        th.propagate().unwrap();
        assert_eq!(th.equality_status(x, y), EqualityStatus::Equal);
        th.pop();

        assert_eq!(th.equality_status(x, y), EqualityStatus::Unknown);
        // The surviving half still works with new facts after the pop.
        th.assert(fact(3), &Relationship::le(y, x, rat(0))).unwrap();
        th.propagate().unwrap();
        assert_eq!(th.equality_status(x, y), EqualityStatus::Equal);
    }

    #[test]
    fn test_pop_after_contradiction_recovers() {
        let mut th = Theory::new();
        let x = th.symbol("x");
        let y = th.symbol("y");
        th.assert(fact(1), &Relationship::le(x, y, rat(3))).unwrap();
        th.propagate().unwrap();

        th.push();
        assert!(th.assert(fact(2), &Relationship::lt(y, x, rat(-3))).is_err());
        th.pop();

        // A compatible bound is accepted afterwards.
        th.assert(fact(3), &Relationship::le(y, x, rat(-3))).unwrap();
        th.propagate().unwrap();
        assert_eq!(th.equality_status(x, y), EqualityStatus::Disequal);
    }

    #[test]
    fn test_randomized_push_pop_exactness() {
        // Random asserts inside a scope must leave no residue after pop.
        let mut rng = StdRng::seed_from_u64(0xd1ff);
        let mut th = Theory::new();
        let names = ["a", "b", "c", "d", "e", "f"];
        let syms: Vec<TermId> = names.iter().map(|n| th.symbol(n)).collect();
        let g = th.functor("g");
        let mut next_fact = 1u32;

        for _round in 0..50 {
            let nodes_before = th.graph.num_nodes();
            let edges_before = th.graph.num_edges();
            let vars_before = th.cc.num_vars();
            let status_before: Vec<EqualityStatus> = (0..names.len())
                .flat_map(|i| (0..names.len()).map(move |j| (i, j)))
                .map(|(i, j)| th.equality_status(syms[i], syms[j]))
                .collect();

            th.push();
            for _op in 0..8 {
                let i = rng.gen_range(0..names.len());
                let j = rng.gen_range(0..names.len());
                let mut t1 = syms[i];
                let mut t2 = syms[j];
                if rng.gen_bool(0.3) {
                    t1 = th.app(g, &[t1]);
                }
                if rng.gen_bool(0.3) {
                    t2 = th.app(g, &[t2]);
                }
                let k = rat(rng.gen_range(-3..=3));
                let rel = match rng.gen_range(0..4) {
                    0 => Relationship::le(t1, t2, k),
                    1 => Relationship::lt(t1, t2, k),
                    2 => Relationship::eq_offset(t1, t2, k),
                    _ => Relationship::ne(t1, t2),
                };
                let f = FactId::new(next_fact);
                next_fact += 1;
                if th.assert(f, &rel).and_then(|_| th.propagate()).is_err() {
                    break;
                }
            }
            th.pop();

            assert_eq!(th.graph.num_nodes(), nodes_before);
            assert_eq!(th.graph.num_edges(), edges_before);
            assert_eq!(th.cc.num_vars(), vars_before);
            let status_after: Vec<EqualityStatus> = (0..names.len())
                .flat_map(|i| (0..names.len()).map(move |j| (i, j)))
                .map(|(i, j)| th.equality_status(syms[i], syms[j]))
                .collect();
            assert_eq!(status_before, status_after);
        }
    }
}
