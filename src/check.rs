//! Consistency checking over the difference graph.
//!
//! Two complementary algorithms:
//!
//! - [`Propagator::check_hypothesis`]: a targeted search that disproves a
//!   single hypothesis `u - v <= d` by finding a path from `v` back to `u`
//!   closing a negative cycle, without touching the rest of the graph.
//! - [`Propagator::propagate_seed`]: full single-source relaxation in both
//!   directions, computing the tightest upper (`limit`) and lower (`bottom`)
//!   bound of every reachable node relative to the seed, carrying the
//!   uniting explanation forward on every improvement.
//!
//! Relaxation is an explicit work-stack DFS with revisit-on-improvement
//! (Bellman-Ford restricted to reachable nodes). A node relaxed more than
//! `num_nodes` times is suspected of sitting on a reachable negative cycle;
//! its `via` parent chain is walked, and only a closed chain whose weight
//! sum is negative (or zero with a strict edge) is reported. A chain that
//! runs back to the seed is a deep improvement sequence, not a cycle, and
//! relaxation continues.
//!
//! Tie-break rule used throughout: at equal offsets a strict bound dominates
//! a non-strict one. Equal offsets that are non-strict on *both* sides are
//! not a contradiction but a discovered equality (a zero-width interval),
//! reported as a [`Pin`]. A node with only one bound present yields no
//! information.

use std::collections::HashMap;

use log::{debug, trace};
use num_rational::BigRational;
use num_traits::Zero;

use crate::explain::Explanation;
use crate::graph::DiffGraph;
use crate::types::{EdgeId, NodeId};

/// A discovered equality: `a - b = offset`, both roots, with witness.
#[derive(Debug, Clone)]
pub struct Pin {
    pub a: NodeId,
    pub b: NodeId,
    pub offset: BigRational,
    pub why: Explanation,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Dir {
    /// Follow outgoing edges: `dist[x]` bounds `seed - x` from above.
    Forward,
    /// Follow incoming edges: `dist[x]` bounds `x - seed` from above.
    Backward,
}

#[derive(Debug, Clone)]
struct Dist {
    value: BigRational,
    strict: bool,
    explain: Explanation,
    /// Relaxation parent: the edge taken, the predecessor root, and the
    /// merge-chain explanations folded into this step.
    via: Option<(EdgeId, NodeId, Explanation)>,
}

/// Reusable relaxation scratch. Bounds computed here are per-propagation
/// values, never stored on nodes and never trailed.
#[derive(Debug, Default)]
pub struct Propagator {
    dist: Vec<Option<Dist>>,
    count: Vec<u32>,
    touched: Vec<NodeId>,
    fwd: Vec<Option<Dist>>,
    fwd_touched: Vec<NodeId>,
}

impl Propagator {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure(&mut self, n: usize) {
        if self.dist.len() < n {
            self.dist.resize(n, None);
            self.fwd.resize(n, None);
            self.count.resize(n, 0);
        }
    }

    fn clear(&mut self) {
        for n in self.touched.drain(..) {
            self.dist[n.index()] = None;
            self.count[n.index()] = 0;
        }
    }

    fn clear_fwd(&mut self) {
        for n in self.fwd_touched.drain(..) {
            self.fwd[n.index()] = None;
        }
    }

    /// Does `(value, strict)` improve on the current distance?
    fn improves(current: Option<&Dist>, value: &BigRational, strict: bool) -> bool {
        match current {
            None => true,
            Some(d) => *value < d.value || (*value == d.value && strict && !d.strict),
        }
    }

    /// Single-source relaxation from `seed` (a root). On return, `dist[x]`
    /// holds the tightest path sum to every reached root. Fails with the
    /// cycle's explanation when a reachable negative cycle exists.
    fn fill(&mut self, g: &DiffGraph, seed: NodeId, dir: Dir) -> Result<(), Explanation> {
        self.ensure(g.num_nodes());
        self.clear();
        debug_assert_eq!(g.resolve(seed).0, seed, "Seed must be a root");

        let limit = g.num_nodes() as u32 + 1;
        self.dist[seed.index()] = Some(Dist {
            value: BigRational::zero(),
            strict: false,
            explain: Explanation::empty(),
            via: None,
        });
        self.touched.push(seed);

        let mut stack = vec![seed];
        while let Some(n) = stack.pop() {
            let dn = match &self.dist[n.index()] {
                Some(d) => d.clone(),
                None => continue,
            };
            // One relaxation pass over the whole class's adjacency, with
            // offsets translated to the class root.
            for (m, om) in g.members(n) {
                let edge_ids = match dir {
                    Dir::Forward => g.out_edges(*m),
                    Dir::Backward => g.inc_edges(*m),
                };
                for &e in edge_ids {
                    let edge = g.edge(e);
                    let (endpoint, raw) = match dir {
                        // m - t <= c, m = n + om  =>  n - t <= c - om.
                        Dir::Forward => (edge.target, &edge.offset - om),
                        // s - m <= c, m = n + om  =>  s - n <= c + om.
                        Dir::Backward => (edge.source, &edge.offset + om),
                    };
                    let (root, ro, re) = g.resolve_explained(endpoint);
                    let step = match dir {
                        // n - root <= raw + ro.
                        Dir::Forward => raw + &ro,
                        // root - n <= raw - ro.
                        Dir::Backward => raw - &ro,
                    };
                    let value = &dn.value + &step;
                    let strict = dn.strict || edge.strict;
                    if !Self::improves(self.dist[root.index()].as_ref(), &value, strict) {
                        continue;
                    }

                    let mut extras = g.resolve_explained(*m).2;
                    extras.extend(&re);
                    let mut explain = dn.explain.union(&edge.explain);
                    explain.extend(&extras);

                    if self.dist[root.index()].is_none() {
                        self.touched.push(root);
                    }
                    self.count[root.index()] += 1;
                    self.dist[root.index()] = Some(Dist {
                        value,
                        strict,
                        explain,
                        via: Some((e, n, extras)),
                    });
                    if self.count[root.index()] > limit {
                        if let Some(e) = self.check_cycle(g, root, dir) {
                            debug!("fill: negative cycle at {}", root);
                            return Err(e);
                        }
                        // Parallel edges can improve a node many times
                        // without any cycle; restart the count.
                        self.count[root.index()] = 0;
                    }
                    stack.push(root);
                }
            }
        }
        Ok(())
    }

    /// Walk `via` parents from an over-relaxed node. Returns the combined
    /// edge explanations when the chain closes a cycle whose weight sum is
    /// negative (or zero with a strict edge); `None` when the chain runs
    /// back to the seed or the closed chain has non-negative weight.
    fn check_cycle(&self, g: &DiffGraph, start: NodeId, dir: Dir) -> Option<Explanation> {
        let mut pos: HashMap<NodeId, usize> = HashMap::new();
        let mut order: Vec<NodeId> = Vec::new();
        let mut cur = start;
        while !pos.contains_key(&cur) {
            pos.insert(cur, order.len());
            order.push(cur);
            let d = self.dist[cur.index()].as_ref().expect("relaxed node");
            match &d.via {
                Some((_, prev, _)) => cur = *prev,
                // Bottomed out at the seed: a long run of genuine
                // improvements, not a cycle.
                None => return None,
            }
        }

        let mut weight = BigRational::zero();
        let mut strict = false;
        let mut explain = Explanation::empty();
        for n in &order[pos[&cur]..] {
            let d = self.dist[n.index()].as_ref().expect("cycle node");
            let (e, _, extras) = d.via.as_ref().expect("cycle node has a parent");
            let edge = g.edge(*e);
            let (_, so) = g.resolve(edge.source);
            let (_, to) = g.resolve(edge.target);
            // The same translated step weight `fill` used; the class
            // translation offsets telescope out around the cycle.
            weight += match dir {
                Dir::Forward => &edge.offset - &so + &to,
                Dir::Backward => &edge.offset + &to - &so,
            };
            strict |= edge.strict;
            explain.extend(&edge.explain);
            explain.extend(extras);
        }
        if weight < BigRational::zero() || (weight.is_zero() && strict) {
            Some(explain.into_deduped())
        } else {
            None
        }
    }

    /// Targeted cycle search: can the hypothesis `u - v <= d` (strict when
    /// `delta`) be disproved from the current graph? Returns the
    /// contradiction explanation (without the hypothesis itself) if so.
    pub fn check_hypothesis(
        &mut self,
        g: &DiffGraph,
        u: NodeId,
        v: NodeId,
        d: &BigRational,
        delta: bool,
    ) -> Option<Explanation> {
        let (ru, ou, eu) = g.resolve_explained(u);
        let (rv, ov, ev) = g.resolve_explained(v);
        // u - v <= d  becomes  ru - rv <= d - ou + ov.
        let dd = d - &ou + &ov;

        if let Err(e) = self.fill(g, rv, Dir::Forward) {
            return Some(e);
        }
        let path = self.dist[ru.index()].as_ref()?;
        // Path gives rv - ru <= S; with the hypothesis the cycle closes at
        // S + dd, infeasible when negative, or zero with any strictness.
        let cycle = &path.value + &dd;
        if cycle < BigRational::zero() || (cycle.is_zero() && (path.strict || delta)) {
            trace!("check_hypothesis: cycle sum {} (strict {})", cycle, path.strict || delta);
            let mut e = path.explain.union(&eu);
            e.extend(&ev);
            Some(e.into_deduped())
        } else {
            None
        }
    }

    /// Tightest entailed upper bound on `u - v`, with its strictness.
    /// `None` when no constraint path connects the two (or the graph is
    /// currently inconsistent).
    pub fn tightest_bound(
        &mut self,
        g: &DiffGraph,
        u: NodeId,
        v: NodeId,
    ) -> Option<(BigRational, bool)> {
        let (ru, ou) = g.resolve(u);
        let (rv, ov) = g.resolve(v);
        if ru == rv {
            // Pinned: u - v is exactly ou - ov.
            return Some((ou - ov, false));
        }
        self.fill(g, ru, Dir::Forward).ok()?;
        let d = self.dist[rv.index()].as_ref()?;
        // ru - rv <= value, u = ru + ou, v = rv + ov.
        Some((&d.value + &ou - &ov, d.strict))
    }

    /// Full propagation from one seed: fills both directions, reports a
    /// contradiction when some node's bounds cross, and collects the
    /// zero-width intervals as discovered equalities.
    ///
    /// For a node `x` with forward distance `f` (`seed - x <= f`) and
    /// backward distance `b` (`x - seed <= b`), the interval for `x - seed`
    /// is `[-f, b]`: empty when `f + b < 0` (or zero with a strict side),
    /// a discovered equality when exactly zero with both sides non-strict.
    pub fn propagate_seed(&mut self, g: &DiffGraph, seed: NodeId) -> Result<Vec<Pin>, Explanation> {
        let (seed, _) = g.resolve(seed);
        self.clear_fwd();

        self.fill(g, seed, Dir::Forward)?;
        std::mem::swap(&mut self.dist, &mut self.fwd);
        std::mem::swap(&mut self.touched, &mut self.fwd_touched);
        for n in &self.fwd_touched {
            self.count[n.index()] = 0;
        }

        self.fill(g, seed, Dir::Backward)?;

        let mut pins = Vec::new();
        for &x in &self.touched {
            let b = match &self.dist[x.index()] {
                Some(d) => d,
                None => continue,
            };
            let f = match &self.fwd[x.index()] {
                Some(d) => d,
                None => continue,
            };
            let width = &f.value + &b.value;
            if width < BigRational::zero() || (width.is_zero() && (f.strict || b.strict)) {
                debug!("propagate_seed: bounds cross at {} (width {})", x, width);
                return Err(f.explain.union(&b.explain).into_deduped());
            }
            if width.is_zero() && x != seed {
                // Zero-width interval, non-strict witnesses on both sides:
                // x - seed is pinned to b exactly.
                pins.push(Pin {
                    a: x,
                    b: seed,
                    offset: b.value.clone(),
                    why: f.explain.union(&b.explain),
                });
            }
        }
        Ok(pins)
    }
}
