//! Congruence-closure union-find over uninterpreted terms.
//!
//! Equivalence classes of root variables, merged on asserted equality and
//! marked mutually disjoint on asserted disequality, with both congruence
//! rules propagated to a fixpoint through a single task queue:
//!
//! - equal arguments force equal applications (signature-table probing on
//!   every union that renormalizes a using term);
//! - applications forced unequal with all-but-one argument pair equal force
//!   that remaining pair unequal (divide-point search on every divide).
//!
//! The queue, not recursion, carries the fixpoint; processing stops at the
//! first contradiction.

use std::collections::VecDeque;

use log::{debug, trace};

use crate::explain::Explanation;
use crate::table::Table;
use crate::term::{Functor, TermArena};
use crate::trail::{Trail, Undo};
use crate::types::{GroupId, TermId, VarId};
use crate::utils::pairing2;

/// Where a root variable came from; fresh (term-anchor) variables are
/// preferred for absorption so named ones stay representatives.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Origin {
    Named,
    Fresh,
}

#[derive(Debug)]
struct VarData {
    term: TermId,
    origin: Origin,
    /// `None` while this variable is a class representative; otherwise the
    /// absorbing variable and the explanation justifying the link.
    parent: Option<(VarId, Explanation)>,
    /// Disequality list; live only on representatives.
    ne: Vec<(VarId, Explanation)>,
    /// Term groups known equal to this class.
    equal_terms: Vec<GroupId>,
    /// Term groups with an argument in this class.
    used_in_terms: Vec<GroupId>,
}

#[derive(Debug)]
struct GroupData {
    functor: Functor,
    args: Vec<VarId>,
    /// The variable anchoring this group's class.
    var: Option<VarId>,
}

/// Pending fixpoint work.
#[derive(Debug)]
enum Task {
    Union(VarId, VarId, Explanation),
    Divide(VarId, VarId, Explanation),
}

/// A merge or split the engine performed, for cross-feeding into the
/// difference graph.
#[derive(Debug, Clone)]
pub enum CcEvent {
    /// The classes of these two terms were united.
    Merged(TermId, TermId, Explanation),
    /// The classes of these two terms were marked disjoint.
    Divided(TermId, TermId, Explanation),
}

/// Append-only signature table with lazy validation.
///
/// Entries map a canonical-signature hash to a group. Signatures go stale
/// as classes merge; probes recompute the candidate's current signature, so
/// stale entries are skipped rather than deleted. Scope pop truncates.
struct SigTable {
    buckets: Vec<usize>,
    entries: Vec<(u64, GroupId, usize)>,
    bitmask: u64,
}

impl SigTable {
    fn new(bits: usize) -> Self {
        let size = 1 << bits.min(16);
        Self {
            buckets: vec![0; size],
            entries: vec![(0, GroupId::new(0), 0)], // Sentry at index 0.
            bitmask: (size - 1) as u64,
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn insert(&mut self, hash: u64, group: GroupId) {
        let bucket = (hash & self.bitmask) as usize;
        let index = self.entries.len();
        self.entries.push((hash, group, self.buckets[bucket]));
        self.buckets[bucket] = index;
    }

    /// All groups stored under this hash (stale entries included).
    fn probe(&self, hash: u64) -> Vec<GroupId> {
        let mut found = Vec::new();
        let mut index = self.buckets[(hash & self.bitmask) as usize];
        while index != 0 {
            let (h, g, next) = self.entries[index];
            if h == hash {
                found.push(g);
            }
            index = next;
        }
        found
    }

    fn truncate(&mut self, len: usize) {
        while self.entries.len() > len {
            let (hash, _, next) = self.entries.pop().unwrap();
            let bucket = (hash & self.bitmask) as usize;
            self.buckets[bucket] = next;
        }
    }
}

pub struct Congruence {
    vars: Vec<VarData>,
    groups: Vec<GroupData>,
    var_map: Table<TermId, VarId>,
    group_map: Table<TermId, GroupId>,
    sigs: SigTable,
    tasks: VecDeque<Task>,
    events: Vec<CcEvent>,
}

/// Snapshot of the engine's arena lengths and undelivered events, captured
/// by a context frame.
#[derive(Debug, Clone)]
pub struct CcMark {
    vars: usize,
    groups: usize,
    var_map: usize,
    group_map: usize,
    sigs: usize,
    events: Vec<CcEvent>,
}

impl Default for Congruence {
    fn default() -> Self {
        Congruence::new(16)
    }
}

impl Congruence {
    pub fn new(bits: usize) -> Self {
        Self {
            vars: Vec::new(),
            groups: Vec::new(),
            var_map: Table::new(bits),
            group_map: Table::new(bits),
            sigs: SigTable::new(bits),
            tasks: VecDeque::new(),
            events: Vec::new(),
        }
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    /// Class representative of a variable.
    pub fn find(&self, v: VarId) -> VarId {
        let mut cur = v;
        while let Some((parent, _)) = &self.vars[cur.index()].parent {
            cur = *parent;
        }
        cur
    }

    pub fn term_of(&self, v: VarId) -> TermId {
        self.vars[v.index()].term
    }

    /// The variable of a term, if the term was ever interned (read-only).
    pub fn lookup(&self, terms: &TermArena, t: TermId) -> Option<VarId> {
        if terms.is_symbol(t) {
            self.var_map.get(&t).map(|(_, &v)| v)
        } else {
            let (_, &g) = self.group_map.get(&t)?;
            self.groups[g.index()].var
        }
    }

    /// Merge-chain explanations from a variable up to its root.
    fn chain_to_root(&self, v: VarId) -> Explanation {
        let mut explain = Explanation::empty();
        let mut cur = v;
        while let Some((parent, e)) = &self.vars[cur.index()].parent {
            explain.extend(e);
            cur = *parent;
        }
        explain
    }

    /// Why are `a` and `b` in the same class? Walks both parent chains to
    /// their meet, collecting link explanations.
    ///
    /// # Panics
    ///
    /// Panics if the two variables are not in the same class.
    fn explain_eq(&self, a: VarId, b: VarId) -> Explanation {
        // Chain of `a`: nodes with the explanation accumulated so far.
        let mut a_chain: Vec<(VarId, Explanation)> = Vec::new();
        let mut acc = Explanation::empty();
        let mut cur = a;
        loop {
            a_chain.push((cur, acc.clone()));
            match &self.vars[cur.index()].parent {
                Some((parent, e)) => {
                    acc.extend(e);
                    cur = *parent;
                }
                None => break,
            }
        }

        let mut b_acc = Explanation::empty();
        let mut cur = b;
        loop {
            if let Some((_, a_acc)) = a_chain.iter().find(|(n, _)| *n == cur) {
                return a_acc.union(&b_acc);
            }
            match &self.vars[cur.index()].parent {
                Some((parent, e)) => {
                    b_acc.extend(e);
                    cur = *parent;
                }
                None => panic!("explain_eq: {} and {} are not in the same class", a, b),
            }
        }
    }

    fn new_var(&mut self, term: TermId, origin: Origin) -> VarId {
        let v = VarId::new(self.vars.len());
        self.vars.push(VarData {
            term,
            origin,
            parent: None,
            ne: Vec::new(),
            equal_terms: Vec::new(),
            used_in_terms: Vec::new(),
        });
        trace!("new cc var {} for {} ({:?})", v, term, origin);
        v
    }

    /// Canonical signature hash of a group under the current union-find.
    fn sig_hash(&self, g: GroupId) -> u64 {
        let group = &self.groups[g.index()];
        let mut h = pairing2(group.functor.id() as u64, group.args.len() as u64);
        for &arg in &group.args {
            h = pairing2(h, self.find(arg).index() as u64 + 1);
        }
        h
    }

    /// Do two groups currently have identical canonical signatures?
    fn congruent(&self, g1: GroupId, g2: GroupId) -> bool {
        let a = &self.groups[g1.index()];
        let b = &self.groups[g2.index()];
        a.functor == b.functor
            && a.args.len() == b.args.len()
            && a.args
                .iter()
                .zip(&b.args)
                .all(|(&x, &y)| self.find(x) == self.find(y))
    }

    /// Explanation that every argument pair of two congruent groups is equal.
    fn congruence_explanation(&self, g1: GroupId, g2: GroupId) -> Explanation {
        let mut e = Explanation::empty();
        let args1 = self.groups[g1.index()].args.clone();
        let args2 = self.groups[g2.index()].args.clone();
        for (x, y) in args1.into_iter().zip(args2) {
            e.extend(&self.explain_eq(x, y));
        }
        e
    }

    /// Intern a term, returning its class variable. May enqueue congruence
    /// tasks; the caller is responsible for draining them via [`Congruence::run`].
    pub fn intern(&mut self, terms: &TermArena, trail: &mut Trail, t: TermId) -> VarId {
        if terms.is_symbol(t) {
            if let Some((_, &v)) = self.var_map.get(&t) {
                return v;
            }
            let v = self.new_var(t, Origin::Named);
            self.var_map.insert(t, v);
            return v;
        }
        let g = self.intern_group(terms, trail, t);
        self.groups[g.index()].var.expect("group var is eager")
    }

    fn intern_group(&mut self, terms: &TermArena, trail: &mut Trail, t: TermId) -> GroupId {
        if let Some((_, &g)) = self.group_map.get(&t) {
            return g;
        }
        let (functor, args) = terms
            .decompose(t)
            .expect("intern_group: term is not an application");
        let args: Vec<TermId> = args.to_vec();
        let arg_vars: Vec<VarId> = args
            .iter()
            .map(|&arg| self.intern(terms, trail, arg))
            .collect();

        let g = GroupId::new(self.groups.len());
        self.groups.push(GroupData {
            functor,
            args: arg_vars.clone(),
            var: None,
        });
        self.group_map.insert(t, g);

        // Anchor variable for the new group's class.
        let v = self.new_var(t, Origin::Fresh);
        self.groups[g.index()].var = Some(v);
        trail.push(Undo::CcGroupVar { group: g, old: None });
        self.vars[v.index()].equal_terms.push(g);
        trail.push(Undo::CcEqualTerm { var: v });

        // Register argument usage on the argument roots.
        for &arg in &arg_vars {
            let root = self.find(arg);
            self.vars[root.index()].used_in_terms.push(g);
            trail.push(Undo::CcUsedIn { var: root });
        }

        // Existing congruent group: the two anchors must be equal.
        let hash = self.sig_hash(g);
        for g2 in self.sigs.probe(hash) {
            if g2 != g && self.congruent(g, g2) {
                if let Some(v2) = self.groups[g2.index()].var {
                    let e = self.congruence_explanation(g, g2);
                    self.tasks.push_back(Task::Union(v, v2, e));
                }
            }
        }
        self.sigs.insert(hash, g);
        g
    }

    /// Is there a recorded disequality between two representatives? Returns
    /// its explanation (entry plus resolution chains) when so.
    fn find_ne(&self, ra: VarId, rb: VarId) -> Option<Explanation> {
        for (v, e) in &self.vars[ra.index()].ne {
            if self.find(*v) == rb {
                return Some(e.union(&self.chain_to_root(*v)));
            }
        }
        for (v, e) in &self.vars[rb.index()].ne {
            if self.find(*v) == ra {
                return Some(e.union(&self.chain_to_root(*v)));
            }
        }
        None
    }

    /// Enqueue a union of two term classes and run to fixpoint.
    pub fn union_terms(
        &mut self,
        terms: &TermArena,
        trail: &mut Trail,
        t1: TermId,
        t2: TermId,
        why: Explanation,
    ) -> Result<(), Explanation> {
        let a = self.intern(terms, trail, t1);
        let b = self.intern(terms, trail, t2);
        self.tasks.push_back(Task::Union(a, b, why));
        self.run(trail)
    }

    /// Enqueue a permanent disequality of two term classes and run to
    /// fixpoint.
    pub fn divide_terms(
        &mut self,
        terms: &TermArena,
        trail: &mut Trail,
        t1: TermId,
        t2: TermId,
        why: Explanation,
    ) -> Result<(), Explanation> {
        let a = self.intern(terms, trail, t1);
        let b = self.intern(terms, trail, t2);
        self.tasks.push_back(Task::Divide(a, b, why));
        self.run(trail)
    }

    /// Drain the task queue, short-circuiting on the first contradiction.
    pub fn run(&mut self, trail: &mut Trail) -> Result<(), Explanation> {
        while let Some(task) = self.tasks.pop_front() {
            let result = match task {
                Task::Union(a, b, why) => self.do_union(trail, a, b, why),
                Task::Divide(a, b, why) => self.do_divide(trail, a, b, why),
            };
            if let Err(e) = result {
                self.tasks.clear();
                return Err(e.into_deduped());
            }
        }
        Ok(())
    }

    fn do_union(
        &mut self,
        trail: &mut Trail,
        a: VarId,
        b: VarId,
        why: Explanation,
    ) -> Result<(), Explanation> {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return Ok(());
        }
        let why = why.union(&self.chain_to_root(a)).union(&self.chain_to_root(b));
        if let Some(e) = self.find_ne(ra, rb) {
            debug!("union {} ~ {}: hits disequality", ra, rb);
            return Err(e.union(&why));
        }

        // Prefer absorbing a fresh (term-anchor) variable into a named one;
        // break ties by membership size.
        let size = |r: VarId| {
            self.vars[r.index()].equal_terms.len() + self.vars[r.index()].used_in_terms.len()
        };
        let a_data = &self.vars[ra.index()];
        let b_data = &self.vars[rb.index()];
        let (absorbed, survivor) = match (a_data.origin, b_data.origin) {
            (Origin::Fresh, Origin::Named) => (ra, rb),
            (Origin::Named, Origin::Fresh) => (rb, ra),
            _ => {
                if size(ra) <= size(rb) {
                    (ra, rb)
                } else {
                    (rb, ra)
                }
            }
        };
        debug!("union: {} into {} ({})", absorbed, survivor, why);

        self.vars[absorbed.index()].parent = Some((survivor, why.clone()));
        trail.push(Undo::CcParent { var: absorbed });
        self.events.push(CcEvent::Merged(
            self.vars[absorbed.index()].term,
            self.vars[survivor.index()].term,
            why.clone(),
        ));

        // Re-assert the absorbed side's disequalities on the survivor; each
        // re-runs the divide-point search against the grown class.
        let absorbed_ne = self.vars[absorbed.index()].ne.clone();
        for (v, e) in absorbed_ne {
            self.tasks.push_back(Task::Divide(survivor, v, e.union(&why)));
        }
        let survivor_ne = self.vars[survivor.index()].ne.clone();
        for (v, e) in survivor_ne {
            self.tasks.push_back(Task::Divide(survivor, v, e));
        }

        // Merge class membership (copies; the absorbed root keeps its own
        // lists intact for pop).
        let moved_equal = self.vars[absorbed.index()].equal_terms.clone();
        for g in moved_equal {
            self.vars[survivor.index()].equal_terms.push(g);
            trail.push(Undo::CcEqualTerm { var: survivor });
        }
        let moved_used = self.vars[absorbed.index()].used_in_terms.clone();
        for g in &moved_used {
            self.vars[survivor.index()].used_in_terms.push(*g);
            trail.push(Undo::CcUsedIn { var: survivor });
        }

        // Renormalize every term using the absorbed side: a term whose
        // canonical signature now matches another group's forces the two
        // anchors equal.
        for &g in &moved_used {
            let hash = self.sig_hash(g);
            for g2 in self.sigs.probe(hash) {
                if g2 != g && self.congruent(g, g2) {
                    let (v1, v2) = match (self.groups[g.index()].var, self.groups[g2.index()].var)
                    {
                        (Some(v1), Some(v2)) => (v1, v2),
                        _ => continue,
                    };
                    if self.find(v1) != self.find(v2) {
                        let e = self.congruence_explanation(g, g2);
                        self.tasks.push_back(Task::Union(v1, v2, e));
                    }
                }
            }
            self.sigs.insert(hash, g);
        }

        // A union of argument classes can open new divide points: any
        // disequality recorded on a renormalized term's class is scanned
        // again now that more argument pairs are equal.
        for &g in &moved_used {
            let anchor = match self.groups[g.index()].var {
                Some(v) => v,
                None => continue,
            };
            let r = self.find(anchor);
            let entries = self.vars[r.index()].ne.clone();
            for (v, e) in entries {
                self.tasks.push_back(Task::Divide(r, v, e));
            }
        }
        Ok(())
    }

    fn do_divide(
        &mut self,
        trail: &mut Trail,
        a: VarId,
        b: VarId,
        why: Explanation,
    ) -> Result<(), Explanation> {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            debug!("divide {} / {}: same class", a, b);
            return Err(why.union(&self.explain_eq(a, b)));
        }
        let why = why.union(&self.chain_to_root(a)).union(&self.chain_to_root(b));

        if self.find_ne(ra, rb).is_none() {
            self.vars[ra.index()].ne.push((rb, why.clone()));
            trail.push(Undo::CcNePush { var: ra });
            self.vars[rb.index()].ne.push((ra, why.clone()));
            trail.push(Undo::CcNePush { var: rb });
            self.events.push(CcEvent::Divided(
                self.vars[ra.index()].term,
                self.vars[rb.index()].term,
                why.clone(),
            ));
            debug!("divide: {} / {} ({})", ra, rb, why);
        }

        // Divide-point search: same-functor term pairs across the two
        // classes that differ in exactly one argument position force that
        // pair apart. Zero differing positions is a congruence conflict.
        let left: Vec<GroupId> = self.vars[ra.index()].equal_terms.clone();
        let right: Vec<GroupId> = self.vars[rb.index()].equal_terms.clone();
        for &g1 in &left {
            for &g2 in &right {
                let d1 = &self.groups[g1.index()];
                let d2 = &self.groups[g2.index()];
                if d1.functor != d2.functor || d1.args.len() != d2.args.len() {
                    continue;
                }
                let mut divide_point = None;
                let mut differing = 0;
                for (i, (&x, &y)) in d1.args.iter().zip(&d2.args).enumerate() {
                    if self.find(x) != self.find(y) {
                        differing += 1;
                        divide_point = Some(i);
                    }
                }
                let anchor_chains = |cc: &Self| -> Explanation {
                    let v1 = cc.groups[g1.index()].var.expect("group var is eager");
                    let v2 = cc.groups[g2.index()].var.expect("group var is eager");
                    cc.chain_to_root(v1).union(&cc.chain_to_root(v2))
                };
                match differing {
                    0 => {
                        // Congruent applications on divided classes.
                        let e = why
                            .union(&self.congruence_explanation(g1, g2))
                            .union(&anchor_chains(self));
                        debug!("divide: congruent pair {} / {} conflicts", g1, g2);
                        return Err(e);
                    }
                    1 => {
                        let j = divide_point.expect("one differing position");
                        let x = d1.args[j];
                        let y = d2.args[j];
                        if self.find_ne(self.find(x), self.find(y)).is_none() {
                            let mut e = why.union(&anchor_chains(self));
                            let args1 = self.groups[g1.index()].args.clone();
                            let args2 = self.groups[g2.index()].args.clone();
                            for (i, (p, q)) in args1.into_iter().zip(args2).enumerate() {
                                if i != j {
                                    e.extend(&self.explain_eq(p, q));
                                }
                            }
                            self.tasks.push_back(Task::Divide(x, y, e));
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Performed merges/divides since the last drain, for cross-feeding.
    pub fn take_events(&mut self) -> Vec<CcEvent> {
        std::mem::take(&mut self.events)
    }

    /// Read-only class queries. `None` when either term is unknown here.
    pub fn roots_of(&self, terms: &TermArena, t1: TermId, t2: TermId) -> Option<(VarId, VarId)> {
        let a = self.lookup(terms, t1)?;
        let b = self.lookup(terms, t2)?;
        Some((self.find(a), self.find(b)))
    }

    pub fn are_ne(&self, ra: VarId, rb: VarId) -> bool {
        self.find_ne(ra, rb).is_some()
    }

    pub(crate) fn undo(&mut self, undo: &Undo) {
        match undo {
            Undo::CcParent { var } => {
                self.vars[var.index()].parent = None;
            }
            Undo::CcNePush { var } => {
                self.vars[var.index()].ne.pop();
            }
            Undo::CcEqualTerm { var } => {
                self.vars[var.index()].equal_terms.pop();
            }
            Undo::CcUsedIn { var } => {
                self.vars[var.index()].used_in_terms.pop();
            }
            Undo::CcGroupVar { group, old } => {
                self.groups[group.index()].var = *old;
            }
            _ => unreachable!("not a congruence undo"),
        }
    }

    pub(crate) fn mark(&self) -> CcMark {
        debug_assert!(self.tasks.is_empty());
        CcMark {
            vars: self.vars.len(),
            groups: self.groups.len(),
            var_map: self.var_map.len(),
            group_map: self.group_map.len(),
            sigs: self.sigs.len(),
            events: self.events.clone(),
        }
    }

    /// Discard everything created after `mark`. The trail must already have
    /// been replayed past the matching frame.
    pub(crate) fn truncate(&mut self, mark: &CcMark) {
        self.vars.truncate(mark.vars);
        self.groups.truncate(mark.groups);
        self.var_map.truncate(mark.var_map);
        self.group_map.truncate(mark.group_map);
        self.sigs.truncate(mark.sigs);
        self.tasks.clear();
        // Events recorded before the frame stay deliverable.
        self.events = mark.events.clone();
    }
}
