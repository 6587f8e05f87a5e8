// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

use std::collections::VecDeque;

/// Capacities are integral so that max-flow terminates exactly and deterministically.
pub type Capacity = i64;

/// A directed graph with a source and a sink, solved for minimum s-t cut with
/// Dinic's algorithm.
///
/// Edges are stored in pairs: edge `e` and its reverse `e ^ 1`.
pub struct FlowGraph {
    num_nodes: usize,
    to: Vec<usize>,
    cap: Vec<Capacity>,
    adj: Vec<Vec<usize>>,
    level: Vec<i32>,
    next_edge: Vec<usize>,
    source_side: Vec<bool>,
}

impl FlowGraph {
    pub fn new(num_nodes: usize) -> Self {
        FlowGraph {
            num_nodes,
            to: vec![],
            cap: vec![],
            adj: vec![vec![]; num_nodes + 2],
            level: vec![],
            next_edge: vec![],
            source_side: vec![],
        }
    }

    #[inline]
    fn source(&self) -> usize {
        self.num_nodes
    }

    #[inline]
    fn sink(&self) -> usize {
        self.num_nodes + 1
    }

    fn push_pair(&mut self, u: usize, v: usize, cap: Capacity, rev_cap: Capacity) {
        let e = self.to.len();
        self.to.push(v);
        self.cap.push(cap);
        self.adj[u].push(e);
        self.to.push(u);
        self.cap.push(rev_cap);
        self.adj[v].push(e + 1);
    }

    /// Links `node` to the terminals. `source_cap` is paid when the node ends on the
    /// sink side, `sink_cap` when it ends on the source side.
    pub fn add_tedge(&mut self, node: usize, source_cap: Capacity, sink_cap: Capacity) {
        debug_assert!(source_cap >= 0 && sink_cap >= 0);
        let (source, sink) = (self.source(), self.sink());
        if source_cap > 0 {
            self.push_pair(source, node, source_cap, 0);
        }
        if sink_cap > 0 {
            self.push_pair(node, sink, sink_cap, 0);
        }
    }

    /// Adds `u -> v` with capacity `cap` and `v -> u` with capacity `rev_cap`.
    pub fn add_edge(&mut self, u: usize, v: usize, cap: Capacity, rev_cap: Capacity) {
        debug_assert!(cap >= 0 && rev_cap >= 0);
        if cap > 0 || rev_cap > 0 {
            self.push_pair(u, v, cap, rev_cap);
        }
    }

    fn build_levels(&mut self) -> bool {
        self.level.clear();
        self.level.resize(self.num_nodes + 2, -1);
        let source = self.source();
        self.level[source] = 0;

        let mut queue = VecDeque::new();
        queue.push_back(source);
        while let Some(u) = queue.pop_front() {
            for &e in &self.adj[u] {
                let v = self.to[e];
                if self.cap[e] > 0 && self.level[v] < 0 {
                    self.level[v] = self.level[u] + 1;
                    queue.push_back(v);
                }
            }
        }
        self.level[self.sink()] >= 0
    }

    /// Finds one augmenting path in the level graph and pushes its bottleneck.
    fn augment(&mut self, path: &mut Vec<usize>) -> Capacity {
        let (source, sink) = (self.source(), self.sink());
        path.clear();
        let mut u = source;

        loop {
            if u == sink {
                let bottleneck = path.iter().map(|&e| self.cap[e]).min().unwrap_or(0);
                for &e in path.iter() {
                    self.cap[e] -= bottleneck;
                    self.cap[e ^ 1] = self.cap[e ^ 1].saturating_add(bottleneck);
                }
                return bottleneck;
            }

            let mut advanced = false;
            while self.next_edge[u] < self.adj[u].len() {
                let e = self.adj[u][self.next_edge[u]];
                let v = self.to[e];
                if self.cap[e] > 0 && self.level[v] == self.level[u] + 1 {
                    path.push(e);
                    u = v;
                    advanced = true;
                    break;
                }
                self.next_edge[u] += 1;
            }

            if !advanced {
                // dead end, never visit again in this phase
                self.level[u] = -1;
                match path.pop() {
                    Some(e) => {
                        u = self.to[e ^ 1];
                        self.next_edge[u] += 1;
                    }
                    None => return 0,
                }
            }
        }
    }

    /// Computes the maximum flow. Afterwards [`FlowGraph::is_source_side`] describes a
    /// minimum cut.
    pub fn max_flow(&mut self) -> Capacity {
        let mut flow: Capacity = 0;
        let mut path = vec![];

        while self.build_levels() {
            self.next_edge.clear();
            self.next_edge.resize(self.num_nodes + 2, 0);
            loop {
                let pushed = self.augment(&mut path);
                if pushed == 0 {
                    break;
                }
                flow = flow.saturating_add(pushed);
            }
        }

        self.mark_source_side();
        flow
    }

    fn mark_source_side(&mut self) {
        self.source_side.clear();
        self.source_side.resize(self.num_nodes + 2, false);
        let source = self.source();
        self.source_side[source] = true;

        let mut queue = VecDeque::new();
        queue.push_back(source);
        while let Some(u) = queue.pop_front() {
            for &e in &self.adj[u] {
                let v = self.to[e];
                if self.cap[e] > 0 && !self.source_side[v] {
                    self.source_side[v] = true;
                    queue.push_back(v);
                }
            }
        }
    }

    /// Whether `node` stays connected to the source in the residual graph.
    #[inline]
    pub fn is_source_side(&self, node: usize) -> bool {
        self.source_side[node]
    }
}
