//! Exact maximum common subgraph search (Hanser's resolution graph).
//!
//! Each node of the resolution graph pairs one edge of `sub` with one edge of
//! `sup` whose endpoints can be matched. Two nodes are compatible when their
//! edges relate the same way in both graphs, and maximal cliques of
//! compatible nodes are maximal common edge-induced subgraphs.

use std::collections::{BTreeSet, HashMap};

use bit_set::BitSet;
use tracing::{debug, instrument, trace};

use crate::{
    cancel::{self, Cancellation},
    error::{Error, Result},
    graph::{Topology, UGraph},
    matching::Matcher,
};

use super::{McsSolution, SolutionList};

/// A compatible `(sub edge, sup edge)` pair.
#[derive(Debug, Clone)]
struct RePoint {
    id1: usize,
    id2: usize,
    extension: BitSet,
    forbidden: BitSet,
    allowed_g1: BitSet,
    allowed_g2: BitSet,
}

/// One maximal clique.
#[derive(Debug, Clone)]
struct Solution {
    points: BitSet,
    proj1: BitSet,
    proj2: BitSet,
    size: usize,
}

pub(crate) struct ReGraph<'g, N, E> {
    sub: &'g UGraph<N, E>,
    sup: &'g UGraph<N, E>,
    sub_topology: Topology,
    sup_topology: Topology,
    points: Vec<RePoint>,
    lookup: HashMap<(usize, usize), usize>,
    solutions: Vec<Solution>,
    max_iteration: Option<u64>,
    iterations: u64,
    find_all: bool,
    stopped: bool,
}

impl<'g, N, E> ReGraph<'g, N, E> {
    /// Build the resolution graph of `sub` and `sup`.
    #[instrument(level = "trace", skip_all)]
    pub fn build<M: Matcher<N, E>>(
        sub: &'g UGraph<N, E>,
        sup: &'g UGraph<N, E>,
        matcher: &mut M,
        cancel: Option<&Cancellation>,
    ) -> Result<Self> {
        cancel::check(cancel)?;

        let mut regraph = Self {
            sub_topology: Topology::new(sub),
            sup_topology: Topology::new(sup),
            sub,
            sup,
            points: Vec::new(),
            lookup: HashMap::new(),
            solutions: Vec::new(),
            max_iteration: None,
            iterations: 0,
            find_all: true,
            stopped: false,
        };
        regraph.construct_nodes(matcher);
        regraph.construct_edges(matcher);

        debug!(
            nodes = regraph.points.len(),
            sub_edges = regraph.sub_topology.edge_count(),
            sup_edges = regraph.sup_topology.edge_count(),
            "resolution graph built"
        );
        Ok(regraph)
    }

    pub fn set_max_iteration(&mut self, max_iteration: Option<u64>) {
        self.max_iteration = max_iteration;
    }

    /// Whether the last traversal ran out of iterations or was stopped by
    /// its solution callback.
    pub fn stopped(&self) -> bool {
        self.stopped
    }

    pub fn size(&self) -> usize {
        self.points.len()
    }

    fn construct_nodes<M: Matcher<N, E>>(&mut self, matcher: &mut M) {
        for &e1 in self.sub_topology.edges() {
            for &e2 in self.sup_topology.edges() {
                if edge_color_condition(
                    self.sub,
                    self.sup,
                    &self.sub_topology,
                    &self.sup_topology,
                    matcher,
                    e1,
                    e2,
                ) {
                    self.lookup.insert((e1, e2), self.points.len());
                    self.points.push(RePoint {
                        id1: e1,
                        id2: e2,
                        extension: BitSet::new(),
                        forbidden: BitSet::new(),
                        allowed_g1: BitSet::new(),
                        allowed_g2: BitSet::new(),
                    });
                }
            }
        }
    }

    fn construct_edges<M: Matcher<N, E>>(&mut self, matcher: &mut M) {
        let size = self.points.len();
        for (i, point) in self.points.iter_mut().enumerate() {
            point.extension = BitSet::with_capacity(size);
            point.forbidden = BitSet::with_capacity(size);
            point.allowed_g1 = BitSet::with_capacity(self.sub_topology.edge_end());
            point.allowed_g2 = BitSet::with_capacity(self.sup_topology.edge_end());
            point.forbidden.insert(i);
        }

        for i in 0..size {
            for j in i + 1..size {
                let (a1, a2) = (self.points[i].id1, self.points[i].id2);
                let (b1, b2) = (self.points[j].id1, self.points[j].id2);

                let distinct = a1 != b1 && a2 != b2;
                let symbol = distinct && self.has_common_symbol(matcher, a1, b1, a2, b2);

                if !symbol {
                    self.points[i].forbidden.insert(j);
                    self.points[j].forbidden.insert(i);
                } else {
                    if common_vertex(&self.sub_topology, a1, b1).is_some() {
                        self.points[i].extension.insert(j);
                        self.points[j].extension.insert(i);
                    }
                    self.points[i].allowed_g1.insert(b1);
                    self.points[i].allowed_g2.insert(b2);
                    self.points[j].allowed_g1.insert(a1);
                    self.points[j].allowed_g2.insert(a2);
                }
            }
        }
    }

    /// Edges `e11`,`e12` of `sub` and `e21`,`e22` of `sup` relate the same
    /// way: both pairs are disjoint, or both share compatible vertices.
    fn has_common_symbol<M: Matcher<N, E>>(
        &self,
        matcher: &mut M,
        e11: usize,
        e12: usize,
        e21: usize,
        e22: usize,
    ) -> bool {
        let s1 = common_vertex(&self.sub_topology, e11, e12);
        let s2 = common_vertex(&self.sup_topology, e21, e22);
        match (s1, s2) {
            (None, None) => true,
            (Some(s1), Some(s2)) => matcher.match_vertex(self.sub, self.sup, &[], s1, s2),
            _ => false,
        }
    }

    /// Seed the solution list from a partial vertex mapping of `sub` into
    /// `sup`. Returns whether the traversal should still look for every
    /// maximal clique (`false` once a seed was stored).
    pub fn seed<M: Matcher<N, E>>(
        &mut self,
        matcher: &mut M,
        incoming: &[Option<usize>],
        strict: bool,
        on_solution: &mut dyn FnMut(&[Option<usize>]) -> bool,
    ) -> Result<bool> {
        let mapped = incoming
            .iter()
            .enumerate()
            .filter_map(|(v, m)| m.map(|w| (v, w)))
            .collect::<Vec<_>>();

        match mapped.as_slice() {
            [] => Ok(true),
            &[(v_sub, v_sup)] => {
                let mut result = true;
                let sub_neighbors = self.sub_topology.neighbors(v_sub).to_vec();
                let sup_neighbors = self.sup_topology.neighbors(v_sup).to_vec();
                for &(n_sub, e_sub) in &sub_neighbors {
                    for &(n_sup, e_sup) in &sup_neighbors {
                        if !matcher.match_vertex(self.sub, self.sup, &[], n_sub, n_sup)
                            || !matcher.match_edge(self.sub, self.sup, e_sub, e_sup)
                        {
                            continue;
                        }
                        let mut mapping = incoming.to_vec();
                        if n_sub < mapping.len() {
                            mapping[n_sub] = Some(n_sup);
                        }
                        result &= self.insert_mapping(&mapping, strict, on_solution)?;
                    }
                }
                Ok(result)
            }
            _ => self.insert_mapping(incoming, strict, on_solution),
        }
    }

    fn insert_mapping(
        &mut self,
        mapping: &[Option<usize>],
        strict: bool,
        on_solution: &mut dyn FnMut(&[Option<usize>]) -> bool,
    ) -> Result<bool> {
        let mut points = BitSet::with_capacity(self.points.len());
        let mut proj1 = BitSet::with_capacity(self.sub_topology.edge_end());
        let mut proj2 = BitSet::with_capacity(self.sup_topology.edge_end());

        let image = |v: usize| mapping.get(v).copied().flatten();
        for &i in self.sub_topology.vertices() {
            for &j in self.sub_topology.vertices() {
                let (Some(mi), Some(mj)) = (image(i), image(j)) else {
                    continue;
                };
                if i == j {
                    continue;
                }
                let (Some(a), Some(b)) = (
                    self.sub_topology.find_edge(i, j),
                    self.sup_topology.find_edge(mi, mj),
                ) else {
                    continue;
                };
                match self.lookup.get(&(a, b)) {
                    Some(&c) => {
                        points.insert(c);
                        proj1.insert(a);
                        proj2.insert(b);
                    }
                    None if strict => return Err(Error::IncorrectMapping),
                    None => {}
                }
            }
        }

        if points.is_empty() {
            return Ok(true);
        }
        let size = proj1.len();
        let at = self
            .solutions
            .iter()
            .position(|s| s.size < size)
            .unwrap_or(self.solutions.len());
        self.insert_solution(at, points, proj1, proj2, size, on_solution);
        Ok(false)
    }

    /// Depth-first clique enumeration. Every level keeps its own traversed,
    /// extension and forbidden sets so backtracking is a level decrement.
    #[instrument(level = "trace", skip_all)]
    pub fn parse(
        &mut self,
        find_all: bool,
        cancel: Option<&Cancellation>,
        on_solution: &mut dyn FnMut(&[Option<usize>]) -> bool,
    ) -> Result<()> {
        self.find_all = find_all;
        self.stopped = false;

        let size = self.points.len();
        let n1 = self.sub_topology.edge_end();
        let n2 = self.sup_topology.edge_end();
        let depth = self.sub_topology.edge_count().min(self.sup_topology.edge_count()) + 1;

        let mut traversed = vec![BitSet::with_capacity(size); depth];
        let mut extension = vec![BitSet::with_capacity(size); depth];
        let mut forbidden = vec![BitSet::with_capacity(size); depth];
        let mut traversed_g1 = vec![BitSet::with_capacity(n1); depth];
        let mut traversed_g2 = vec![BitSet::with_capacity(n2); depth];
        let mut allowed_g1 = vec![BitSet::with_capacity(n1); depth];
        let mut allowed_g2 = vec![BitSet::with_capacity(n2); depth];
        let mut cursor: Vec<Option<usize>> = vec![None; depth];

        extension[0] = (0..size).collect();
        allowed_g1[0] = (0..n1).collect();
        allowed_g2[0] = (0..n2).collect();

        let mut level = 0;
        loop {
            while !self.stopped {
                let Some(x) = next_set_bit(&extension[level], cursor[level]) else {
                    break;
                };
                cursor[level] = Some(x);
                let next = level + 1;
                if next >= depth {
                    break;
                }
                let point = &self.points[x];

                let (cur, nxt) = step(&mut forbidden, level);
                nxt.clone_from(cur);
                nxt.union_with(&point.forbidden);

                let (cur, nxt) = step(&mut allowed_g1, level);
                nxt.clone_from(cur);
                nxt.intersect_with(&point.allowed_g1);

                let (cur, nxt) = step(&mut allowed_g2, level);
                nxt.clone_from(cur);
                nxt.intersect_with(&point.allowed_g2);

                let (cur, nxt) = step(&mut extension, level);
                if traversed[level].is_empty() {
                    nxt.clone_from(&point.extension);
                } else {
                    nxt.clone_from(cur);
                    nxt.union_with(&point.extension);
                }
                nxt.difference_with(&forbidden[next]);

                let (cur, nxt) = step(&mut traversed, level);
                nxt.clone_from(cur);
                nxt.insert(x);

                let (cur, nxt) = step(&mut traversed_g1, level);
                nxt.clone_from(cur);
                nxt.insert(point.id1);

                let (cur, nxt) = step(&mut traversed_g2, level);
                nxt.clone_from(cur);
                nxt.insert(point.id2);

                forbidden[level].insert(x);
                level = next;

                if extension[level].is_empty() {
                    self.record_solution(
                        &traversed[level],
                        &traversed_g1[level],
                        &traversed_g2[level],
                        on_solution,
                    );
                    cursor[level] = None;
                    level -= 1;
                } else {
                    let mut pnode_g1 = allowed_g1[level].clone();
                    pnode_g1.union_with(&traversed_g1[level]);
                    let mut pnode_g2 = allowed_g2[level].clone();
                    pnode_g2.union_with(&traversed_g2[level]);

                    if self.must_continue(&pnode_g1, &pnode_g2) {
                        self.iterations += 1;
                        if self.max_iteration.is_some_and(|max| self.iterations >= max) {
                            trace!(iterations = self.iterations, "iteration limit reached");
                            self.stopped = true;
                        }
                        if self.iterations % 10 == 0 {
                            cancel::check(cancel)?;
                        }
                    } else {
                        cursor[level] = None;
                        level -= 1;
                    }
                }
            }

            cursor[level] = None;
            if level == 0 || self.stopped {
                break;
            }
            level -= 1;
        }

        debug!(
            solutions = self.solutions.len(),
            iterations = self.iterations,
            stopped = self.stopped,
            "resolution graph parsed"
        );
        Ok(())
    }

    /// Keep `traversed` unless a stored clique already covers it, dropping
    /// stored cliques it covers. The list stays sorted by size, largest first.
    fn record_solution(
        &mut self,
        traversed: &BitSet,
        trav_g1: &BitSet,
        trav_g2: &BitSet,
        on_solution: &mut dyn FnMut(&[Option<usize>]) -> bool,
    ) {
        let size = trav_g1.len();
        let mut included = false;
        let mut superseded = false;
        let mut insert_at = 0;
        let mut after = false;
        let mut first_kept = false;

        let mut i = 0;
        while i < self.solutions.len() && !included {
            let solution = &self.solutions[i];
            if size < solution.size {
                if trav_g1.is_subset(&solution.proj1) || trav_g2.is_subset(&solution.proj2) {
                    included = true;
                }
                insert_at = i;
                after = true;
            } else {
                let subset = if self.find_all {
                    solution.proj1.is_subset(trav_g1) || solution.proj2.is_subset(trav_g2)
                } else {
                    solution.proj1.is_subset(trav_g1)
                        && solution.proj2.is_subset(trav_g2)
                        && solution.points.is_subset(traversed)
                };
                if subset {
                    self.solutions.remove(i);
                    superseded = true;
                    continue;
                }
                if !after && !first_kept {
                    insert_at = i;
                    first_kept = true;
                }
            }
            i += 1;
        }

        if !included && (self.find_all || superseded) {
            let at = if after { insert_at + 1 } else { insert_at };
            let at = at.min(self.solutions.len());
            self.insert_solution(
                at,
                traversed.clone(),
                trav_g1.clone(),
                trav_g2.clone(),
                size,
                on_solution,
            );
        }
    }

    fn insert_solution(
        &mut self,
        at: usize,
        points: BitSet,
        proj1: BitSet,
        proj2: BitSet,
        size: usize,
        on_solution: &mut dyn FnMut(&[Option<usize>]) -> bool,
    ) {
        let mut edge_map = vec![None; self.sub_topology.edge_end()];
        for x in points.iter() {
            edge_map[self.points[x].id1] = Some(self.points[x].id2);
        }
        trace!(size, at, "clique stored");
        self.solutions.insert(
            at,
            Solution {
                points,
                proj1,
                proj2,
                size,
            },
        );
        if !on_solution(&edge_map) {
            self.stopped = true;
        }
    }

    /// A branch is worth exploring unless a stored clique at least as large
    /// as its potential already covers it on either side.
    fn must_continue(&self, pnode_g1: &BitSet, pnode_g2: &BitSet) -> bool {
        let bound = pnode_g1.len().min(pnode_g2.len());
        for solution in &self.solutions {
            if solution.size < bound {
                break;
            }
            if pnode_g1.is_subset(&solution.proj1) || pnode_g2.is_subset(&solution.proj2) {
                return false;
            }
        }
        true
    }

    /// Vertex map of `sub` into `sup` induced by a clique.
    fn correspondence<M: Matcher<N, E>>(&self, matcher: &mut M, bits: &BitSet) -> Vec<Option<usize>> {
        let mut map = vec![None; self.sub_topology.vertex_end()];
        let selected = bits.iter().collect::<Vec<_>>();

        if let [x] = selected.as_slice() {
            let (a, b) = self.sub_topology.ends(self.points[*x].id1);
            let (c, d) = self.sup_topology.ends(self.points[*x].id2);
            if matcher.match_vertex(self.sub, self.sup, &[], a, c) {
                map[a] = Some(c);
                map[b] = Some(d);
            } else {
                map[a] = Some(d);
                map[b] = Some(c);
            }
            return map;
        }

        for &x in &selected {
            for &y in &selected {
                if x == y {
                    continue;
                }
                let (a, b) = (self.points[x].id1, self.points[y].id1);
                let Some(e) = common_vertex(&self.sub_topology, a, b) else {
                    continue;
                };
                let (c, d) = (self.points[x].id2, self.points[y].id2);
                let Some(f) = common_vertex(&self.sup_topology, c, d) else {
                    continue;
                };
                map[e] = Some(f);
                map[other_end(&self.sub_topology, a, e)] = Some(other_end(&self.sup_topology, c, f));
                map[other_end(&self.sub_topology, b, e)] = Some(other_end(&self.sup_topology, d, f));
            }
        }
        map
    }

    /// One `(vertex map, edge map)` per stored clique, in list order.
    pub fn solution_maps<M: Matcher<N, E>>(&self, matcher: &mut M) -> Vec<McsSolution> {
        self.solutions
            .iter()
            .map(|solution| {
                let vertex_map = self.correspondence(matcher, &solution.points);
                let mut edge_map = vec![None; self.sub_topology.edge_end()];
                for x in solution.points.iter() {
                    edge_map[self.points[x].id1] = Some(self.points[x].id2);
                }
                McsSolution {
                    vertex_map,
                    edge_map,
                }
            })
            .collect()
    }

    /// Vertex and edge lists of every clique on the `sub` side.
    pub fn solution_lists_sub(&self) -> Vec<SolutionList> {
        self.solutions
            .iter()
            .map(|s| make_list(&self.sub_topology, &s.proj1))
            .collect()
    }

    /// Vertex and edge lists of every clique on the `sup` side.
    pub fn solution_lists_super(&self) -> Vec<SolutionList> {
        self.solutions
            .iter()
            .map(|s| make_list(&self.sup_topology, &s.proj2))
            .collect()
    }
}

/// The edge pair `(e1, e2)` can be matched with endpoints in either
/// orientation.
pub(crate) fn edge_color_condition<N, E, M: Matcher<N, E>>(
    g1: &UGraph<N, E>,
    g2: &UGraph<N, E>,
    t1: &Topology,
    t2: &Topology,
    matcher: &mut M,
    e1: usize,
    e2: usize,
) -> bool {
    let (beg1, end1) = t1.ends(e1);
    let (beg2, end2) = t2.ends(e2);
    let a1 = matcher.match_vertex(g1, g2, &[], beg1, beg2);
    let b1 = matcher.match_vertex(g1, g2, &[], end1, end2);
    let a2 = matcher.match_vertex(g1, g2, &[], beg1, end2);
    let b2 = matcher.match_vertex(g1, g2, &[], end1, beg2);
    let colors = (a1 && b1) || (a2 && b2);
    colors && matcher.match_edge(g1, g2, e1, e2)
}

/// Vertex shared by edges `e1` and `e2`, reported as an endpoint of `e2`.
fn common_vertex(topology: &Topology, e1: usize, e2: usize) -> Option<usize> {
    let (b1, n1) = topology.ends(e1);
    let (b2, n2) = topology.ends(e2);
    if b1 == b2 || n1 == b2 {
        Some(b2)
    } else if b1 == n2 || n1 == n2 {
        Some(n2)
    } else {
        None
    }
}

fn other_end(topology: &Topology, e: usize, v: usize) -> usize {
    let (beg, end) = topology.ends(e);
    if beg == v {
        end
    } else {
        beg
    }
}

fn make_list(topology: &Topology, projection: &BitSet) -> SolutionList {
    let mut vertices = BTreeSet::new();
    let mut edges = Vec::new();
    for e in projection.iter() {
        let (beg, end) = topology.ends(e);
        vertices.insert(beg);
        vertices.insert(end);
        edges.push(e);
    }
    SolutionList {
        vertices: vertices.into_iter().collect(),
        edges,
    }
}

fn next_set_bit(bits: &BitSet, after: Option<usize>) -> Option<usize> {
    let start = after.map_or(0, |x| x + 1);
    bits.iter().find(|&x| x >= start)
}

/// Borrow level `level` immutably and level `level + 1` mutably.
fn step(levels: &mut [BitSet], level: usize) -> (&BitSet, &mut BitSet) {
    let (lo, hi) = levels.split_at_mut(level + 1);
    (&lo[level], &mut hi[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::Unlabeled;

    fn cycle(n: usize) -> UGraph<(), ()> {
        let mut g = UGraph::default();
        let nodes = (0..n).map(|_| g.add_node(())).collect::<Vec<_>>();
        for i in 0..n {
            g.add_edge(nodes[i], nodes[(i + 1) % n], ());
        }
        g
    }

    #[test]
    fn regraph_of_triangles() {
        let (g1, g2) = (cycle(3), cycle(3));
        let mut matcher = Unlabeled;
        let mut regraph = ReGraph::build(&g1, &g2, &mut matcher, None).unwrap();
        assert_eq!(regraph.size(), 9);
        regraph.parse(true, None, &mut |_: &[Option<usize>]| true).unwrap();
        assert!(!regraph.stopped());
        let lists = regraph.solution_lists_sub();
        assert!(!lists.is_empty());
        assert_eq!(lists[0].edges.len(), 3);
    }

    #[test]
    fn callback_stops_traversal() {
        let (g1, g2) = (cycle(6), cycle(6));
        let mut matcher = Unlabeled;
        let mut regraph = ReGraph::build(&g1, &g2, &mut matcher, None).unwrap();
        regraph.parse(true, None, &mut |_: &[Option<usize>]| false).unwrap();
        assert!(regraph.stopped());
    }

    #[test]
    fn cancellation_during_traversal() {
        // No clique covers everything, so the search goes on after the first.
        let (g1, g2) = (cycle(7), cycle(8));
        let mut matcher = Unlabeled;
        let mut regraph = ReGraph::build(&g1, &g2, &mut matcher, None).unwrap();
        let cancel = Cancellation::new();
        let trip = cancel.clone();
        let result = regraph.parse(true, Some(&cancel), &mut |_: &[Option<usize>]| {
            trip.cancel();
            true
        });
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn cancellation_is_reported() {
        let (g1, g2) = (cycle(4), cycle(4));
        let cancel = Cancellation::new();
        cancel.cancel();
        let mut matcher = Unlabeled;
        let result = ReGraph::build(&g1, &g2, &mut matcher, Some(&cancel));
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
