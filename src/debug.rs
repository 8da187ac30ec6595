//! Debug utilities for inspecting theory state.
//!
//! This module provides helpers for exploring the difference graph and the
//! union-find classes. These are primarily useful in tests and during
//! development.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::theory::Theory;
use crate::types::{EdgeId, NodeId, VarId};

/// Detailed information about a single graph vertex.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    /// The vertex handle
    pub node: NodeId,
    /// The term this vertex stands for
    pub term: String,
    /// Current class root
    pub root: NodeId,
    /// Fixed difference `node - root`
    pub offset: String,
    /// Outgoing constraint edges
    pub out_degree: usize,
    /// Incoming constraint edges
    pub in_degree: usize,
}

impl std::fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}({}, root={}, offset={}, out={}, in={})",
            self.node, self.term, self.root, self.offset, self.out_degree, self.in_degree
        )
    }
}

impl Theory {
    /// Info records for every graph vertex.
    pub fn graph_nodes(&self) -> Vec<NodeInfo> {
        (0..self.graph.num_nodes())
            .map(|i| {
                let n = NodeId::new(i);
                let (root, offset) = self.graph.resolve(n);
                NodeInfo {
                    node: n,
                    term: self.terms.display(self.graph.term_of(n)),
                    root,
                    offset: offset.to_string(),
                    out_degree: self.graph.out_edges(n).len(),
                    in_degree: self.graph.inc_edges(n).len(),
                }
            })
            .collect()
    }

    /// Multi-line rendering of the whole difference graph.
    pub fn dump_graph(&self) -> String {
        let mut s = String::new();
        writeln!(
            s,
            "graph: {} nodes, {} edges",
            self.graph.num_nodes(),
            self.graph.num_edges()
        )
        .unwrap();
        for info in self.graph_nodes() {
            writeln!(s, "  {}", info).unwrap();
        }
        for i in 0..self.graph.num_edges() {
            let e = EdgeId::new(i);
            let edge = self.graph.edge(e);
            writeln!(
                s,
                "  {}: {} - {} {} {} ({})",
                e,
                self.terms.display(self.graph.term_of(edge.source)),
                self.terms.display(self.graph.term_of(edge.target)),
                if edge.strict { "<" } else { "<=" },
                edge.offset,
                edge.explain,
            )
            .unwrap();
        }
        s
    }

    /// Multi-line rendering of the union-find classes, grouped by root.
    pub fn dump_classes(&self) -> String {
        let mut classes: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for i in 0..self.cc.num_vars() {
            let v = VarId::new(i);
            let root = self.cc.find(v);
            classes
                .entry(root.index())
                .or_default()
                .push(self.terms.display(self.cc.term_of(v)));
        }
        let mut s = String::new();
        writeln!(s, "closure: {} vars, {} classes", self.cc.num_vars(), classes.len()).unwrap();
        for (root, members) in classes {
            writeln!(s, "  v{}: {{{}}}", root, members.join(", ")).unwrap();
        }
        s
    }
}
