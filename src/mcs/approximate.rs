//! Approximate maximum common subgraph search.
//!
//! Two stages over dense adjacency tables: a greedy construction of a vertex
//! correspondence, then a random discrete descent that moves or swaps single
//! assignments whenever that does not increase the number of mismatched
//! edges.

use bit_set::BitSet;
use rand::{rngs::StdRng, Rng};
use tracing::{debug, instrument, trace};

use crate::{
    cancel::{self, Cancellation},
    error::Result,
    graph::{invert_map, Topology, UGraph},
    matching::Matcher,
};

use super::{regraph::edge_color_condition, McsSolution};

/// Dense tables for one (possibly swapped) pair of graphs.
///
/// Vertices taking part in the search are addressed by their position in
/// `cr1`/`cr2`; `x[i]` is the position in `cr2` assigned to position `i` of
/// `cr1` and `y` is its inverse.
pub(crate) struct AdjMatrices<'g, N, E, M> {
    graph1: &'g UGraph<N, E>,
    graph2: &'g UGraph<N, E>,
    top1: Topology,
    top2: Topology,
    swap: bool,
    matcher: M,
    map: Vec<Option<usize>>,
    cr1: Vec<usize>,
    cr2: Vec<usize>,
    adj1: Vec<BitSet>,
    edge1: Vec<Vec<Option<usize>>>,
    adj2: Vec<BitSet>,
    edge2: Vec<Vec<Option<usize>>>,
    degree1: Vec<usize>,
    degree2: Vec<usize>,
    labels: Vec<Vec<usize>>,
    error_edges: Vec<BitSet>,
    x: Vec<Option<usize>>,
    y: Vec<Option<usize>>,
}

impl<'g, N, E, M: Matcher<N, E>> AdjMatrices<'g, N, E, M> {
    /// Build the tables for `sub` and `sup`. Vertices fixed by `incoming`
    /// are kept out of the search and stay mapped in every solution.
    #[instrument(level = "trace", skip_all)]
    pub fn new(
        sub: &'g UGraph<N, E>,
        sup: &'g UGraph<N, E>,
        mut matcher: M,
        incoming: &[Option<usize>],
        rng: &mut StdRng,
    ) -> Self {
        let sub_top = Topology::new(sub);
        let sup_top = Topology::new(sup);
        let swap = check_size(sub, sup, &sub_top, &sup_top, &mut matcher, incoming);

        let (graph1, graph2, top1, top2) = if swap {
            (sup, sub, sup_top, sub_top)
        } else {
            (sub, sup, sub_top, sup_top)
        };

        let map = if incoming.iter().all(Option::is_none) {
            vec![None; top1.vertex_end()]
        } else if swap {
            let mut inv = vec![None; top2.vertex_end()];
            for &v in top2.vertices() {
                inv[v] = incoming.get(v).copied().flatten();
            }
            invert_map(&inv, top1.vertex_end())
        } else {
            let mut map = vec![None; top1.vertex_end()];
            for &v in top1.vertices() {
                map[v] = incoming.get(v).copied().flatten();
            }
            map
        };
        let invmap = invert_map(&map, top2.vertex_end());

        let mut store = Self {
            graph1,
            graph2,
            top1,
            top2,
            swap,
            matcher,
            map,
            cr1: Vec::new(),
            cr2: Vec::new(),
            adj1: Vec::new(),
            edge1: Vec::new(),
            adj2: Vec::new(),
            edge2: Vec::new(),
            degree1: Vec::new(),
            degree2: Vec::new(),
            labels: Vec::new(),
            error_edges: Vec::new(),
            x: Vec::new(),
            y: Vec::new(),
        };
        store.create_correspondence(&invmap, rng);
        store.create_adjacency();
        store.create_labels();
        store.create_error_edges();
        store
    }

    pub fn first_size(&self) -> usize {
        self.cr1.len()
    }

    pub fn second_size(&self) -> usize {
        self.cr2.len()
    }

    fn create_correspondence(&mut self, invmap: &[Option<usize>], rng: &mut StdRng) {
        let mut cr1 = self
            .top1
            .vertices()
            .iter()
            .copied()
            .filter(|&v| self.map[v].is_none())
            .collect::<Vec<_>>();
        let mut cr2 = self
            .top2
            .vertices()
            .iter()
            .copied()
            .filter(|&v| invmap[v].is_none())
            .collect::<Vec<_>>();

        let mut count1 = vec![0usize; cr1.len()];
        let mut count2 = vec![0usize; cr2.len()];
        for (i, &a) in cr1.iter().enumerate() {
            for (j, &b) in cr2.iter().enumerate() {
                if self.matcher.match_vertex(self.graph1, self.graph2, &[], a, b) {
                    count1[i] += 1;
                    count2[j] += 1;
                }
            }
        }

        sort_by_count(&mut cr1, &mut count1);
        sort_by_count(&mut cr2, &mut count2);
        cr1.truncate(count1.iter().filter(|&&c| c > 0).count());
        cr2.truncate(count2.iter().filter(|&&c| c > 0).count());

        for i in 0..cr1.len() {
            let r = rng.gen_range(0..cr1.len());
            cr1.swap(i, r);
        }
        for i in 0..cr2.len() {
            let r = rng.gen_range(0..cr2.len());
            cr2.swap(i, r);
        }

        self.x = vec![None; cr1.len()];
        self.y = vec![None; cr2.len()];
        self.cr1 = cr1;
        self.cr2 = cr2;
    }

    fn create_adjacency(&mut self) {
        let (adj1, edge1, degree1) = adjacency(&self.top1, &self.cr1);
        let (adj2, edge2, degree2) = adjacency(&self.top2, &self.cr2);
        self.adj1 = adj1;
        self.edge1 = edge1;
        self.degree1 = degree1;
        self.adj2 = adj2;
        self.edge2 = edge2;
        self.degree2 = degree2;
    }

    fn create_labels(&mut self) {
        self.labels = (0..self.cr1.len())
            .map(|i| {
                (0..self.cr2.len())
                    .filter(|&j| self.vertex_condition(i, j))
                    .collect()
            })
            .collect();
    }

    fn create_error_edges(&mut self) {
        let mut error_edges = vec![BitSet::with_capacity(self.top2.edge_end()); self.top1.edge_end()];
        for &e1 in self.top1.edges() {
            for &e2 in self.top2.edges() {
                if !edge_color_condition(
                    self.graph1,
                    self.graph2,
                    &self.top1,
                    &self.top2,
                    &mut self.matcher,
                    e1,
                    e2,
                ) {
                    error_edges[e1].insert(e2);
                }
            }
        }
        self.error_edges = error_edges;
    }

    /// Position `i` of `cr1` may take position `j` of `cr2`.
    fn vertex_condition(&mut self, i: usize, j: usize) -> bool {
        self.matcher
            .match_vertex(self.graph1, self.graph2, &[], self.cr1[i], self.cr2[j])
    }

    /// Positions `i` and `j` of `cr1` carry compatible labels.
    fn same_label(&mut self, i: usize, j: usize) -> bool {
        self.matcher
            .match_vertex(self.graph1, self.graph1, &[], self.cr1[i], self.cr1[j])
    }

    /// 1 if the edge between positions `i` and `j` does not survive the
    /// current assignment, 0 otherwise.
    fn count_error_at_edges(&self, i: usize, j: usize) -> usize {
        let (Some(xi), Some(xj)) = (self.x[i], self.x[j]) else {
            return 1;
        };
        match (self.edge1[i][j], self.edge2[xi][xj]) {
            (Some(e1), Some(e2)) => usize::from(self.error_edges[e1].contains(e2)),
            _ => 1,
        }
    }

    fn edge_weight_condition(&mut self, i: usize, j: usize) -> bool {
        let (Some(xi), Some(xj)) = (self.x[i], self.x[j]) else {
            return false;
        };
        let (Some(e1), Some(e2)) = (self.edge1[i][j], self.edge2[xi][xj]) else {
            return false;
        };
        self.matcher.match_edge(self.graph1, self.graph2, e1, e2)
            && self.vertex_condition(i, xi)
            && self.vertex_condition(j, xj)
    }

    /// Total number of mismatched edges of the current assignment.
    pub fn error(&self) -> usize {
        (0..self.cr1.len())
            .map(|i| {
                self.adj1[i]
                    .iter()
                    .map(|j| self.count_error_at_edges(i, j))
                    .sum::<usize>()
            })
            .sum::<usize>()
            / 2
    }

    fn both_edges_match(&mut self, i: usize, j: usize) -> bool {
        let (Some(mi), Some(mj)) = (self.map[i], self.map[j]) else {
            return false;
        };
        let (Some(e1), Some(e2)) = (self.top1.find_edge(i, j), self.top2.find_edge(mi, mj)) else {
            return false;
        };
        self.matcher.match_edge(self.graph1, self.graph2, e1, e2)
            && self
                .matcher
                .match_vertex(self.graph1, self.graph2, &[], i, mi)
            && self
                .matcher
                .match_vertex(self.graph1, self.graph2, &[], j, mj)
    }

    /// Split the final assignment into connected common pieces and return
    /// their vertex maps over the caller's first graph.
    fn component_maps(&mut self) -> Vec<Vec<Option<usize>>> {
        for i in 0..self.cr1.len() {
            if let Some(xi) = self.x[i] {
                if self.map[self.cr1[i]].is_none() {
                    self.map[self.cr1[i]] = Some(self.cr2[xi]);
                }
            }
        }

        let mut keep_edge = BitSet::with_capacity(self.top1.edge_end());
        let mut keep = BitSet::with_capacity(self.top1.vertex_end());
        let edges = self.top1.edges().to_vec();
        for e in edges {
            let (i, j) = self.top1.ends(e);
            if i != j && self.both_edges_match(i, j) {
                keep_edge.insert(e);
                keep.insert(i);
                keep.insert(j);
            }
        }

        let (count, label) = self
            .top1
            .components(|v| keep.contains(v), |e| keep_edge.contains(e));

        (0..count)
            .map(|comp| {
                let mut part = vec![None; self.top1.vertex_end()];
                for (v, l) in label.iter().enumerate() {
                    if *l == Some(comp) {
                        part[v] = self.map[v];
                    }
                }
                if self.swap {
                    invert_map(&part, self.top2.vertex_end())
                } else {
                    part
                }
            })
            .collect()
    }

    /// Solutions over the caller's `(sub, sup)` orientation, unsorted.
    pub fn solutions(&mut self) -> Vec<McsSolution> {
        let maps = self.component_maps();
        let (sub, sup, sub_top, sup_top) = if self.swap {
            (self.graph2, self.graph1, &self.top2, &self.top1)
        } else {
            (self.graph1, self.graph2, &self.top1, &self.top2)
        };

        maps.into_iter()
            .map(|vertex_map| {
                let mut edge_map = vec![None; sub_top.edge_end()];
                for &e in sub_top.edges() {
                    let (beg, end) = sub_top.ends(e);
                    let (Some(sb), Some(se)) = (vertex_map[beg], vertex_map[end]) else {
                        continue;
                    };
                    let Some(f) = sup_top.find_edge(sb, se) else {
                        continue;
                    };
                    if edge_color_condition(sub, sup, sub_top, sup_top, &mut self.matcher, e, f) {
                        edge_map[e] = Some(f);
                    }
                }
                McsSolution {
                    vertex_map,
                    edge_map,
                }
            })
            .collect()
    }
}

/// `true` if the second graph has fewer usable vertices than the first, in
/// which case the tables are built with the graphs swapped.
fn check_size<N, E, M: Matcher<N, E>>(
    g1: &UGraph<N, E>,
    g2: &UGraph<N, E>,
    t1: &Topology,
    t2: &Topology,
    matcher: &mut M,
    incoming: &[Option<usize>],
) -> bool {
    let inv = invert_map(incoming, t2.vertex_end());
    let mut x = vec![0usize; t1.vertex_end()];
    let mut y = vec![0usize; t2.vertex_end()];

    for &i in t1.vertices() {
        if incoming.get(i).copied().flatten().is_some() {
            continue;
        }
        for &j in t2.vertices() {
            if inv[j].is_some() {
                continue;
            }
            if matcher.match_vertex(g1, g2, &[], i, j) {
                x[i] += 1;
                y[j] += 1;
            }
        }
    }

    let size1 = t1.vertices().iter().filter(|&&v| x[v] > 0).count();
    let size2 = t2.vertices().iter().filter(|&&v| y[v] > 0).count();
    size1 > size2
}

/// Selection sort by descending candidate count, moving `items` along.
fn sort_by_count(items: &mut [usize], counts: &mut [usize]) {
    for i in 0..items.len() {
        for j in i + 1..items.len() {
            if counts[i] < counts[j] {
                items.swap(i, j);
                counts.swap(i, j);
            }
        }
    }
}

type Adjacency = (Vec<BitSet>, Vec<Vec<Option<usize>>>, Vec<usize>);

fn adjacency(topology: &Topology, cr: &[usize]) -> Adjacency {
    let mut position = vec![None; topology.vertex_end()];
    for (i, &v) in cr.iter().enumerate() {
        position[v] = Some(i);
    }

    let mut rows = vec![BitSet::with_capacity(cr.len()); cr.len()];
    let mut edges = vec![vec![None; cr.len()]; cr.len()];
    for &e in topology.edges() {
        let (beg, end) = topology.ends(e);
        if let (Some(j1), Some(j2)) = (position[beg], position[end]) {
            rows[j1].insert(j2);
            rows[j2].insert(j1);
            edges[j1][j2] = Some(e);
            edges[j2][j1] = Some(e);
        }
    }
    let degrees = rows.iter().map(BitSet::len).collect();
    (rows, edges, degrees)
}

/// Greedy construction of the initial assignment.
///
/// Positions of the first graph are grouped into label classes; each class
/// owns the candidate list of its first member. Both lists are sorted by
/// descending degree and taken from the back, so assignment starts from the
/// lowest-degree vertex and its lowest-degree candidate. It then always
/// continues with the vertex having the most assigned neighbours.
#[instrument(level = "trace", skip_all)]
pub(crate) fn greedy<N, E, M: Matcher<N, E>>(store: &mut AdjMatrices<'_, N, E, M>) {
    let n = store.first_size();
    let m = store.second_size();

    let (mut unsigned1, class_of, mut classes) = create_classes(store);
    if unsigned1.is_empty() {
        return;
    }

    store.x = vec![None; n];
    store.y = vec![None; m];
    let mut adj_status = vec![false; m];

    let mut i1 = unsigned1.len() - 1;
    let mut p = unsigned1[i1];
    let mut q = classes[class_of[p]].last().copied();

    loop {
        unsigned1.remove(i1);
        if let Some(q) = q {
            store.x[p] = Some(q);
            store.y[q] = Some(p);
            for class in classes.iter_mut() {
                class.retain(|&c| c != q);
            }
            for i in store.adj2[q].iter() {
                if store.y[i].is_none() {
                    adj_status[i] = true;
                }
            }
        }

        if unsigned1.is_empty() {
            break;
        }

        i1 = unsigned1.len() - 1;
        let mut best = 0;
        for (iter, &v) in unsigned1.iter().enumerate() {
            let assigned = store.adj1[v].iter().filter(|&i| store.x[i].is_some()).count();
            if assigned >= best {
                i1 = iter;
                best = assigned;
            }
        }
        p = unsigned1[i1];

        let own = class_of[p];
        q = if !classes[own].is_empty() {
            let mut best = 0;
            let mut chosen = classes[own].len() - 1;
            for iter in 0..classes[own].len() {
                let candidate = classes[own][iter];
                store.x[p] = Some(candidate);
                let matched = matched_edges(store);
                if matched > best || (matched >= best && adj_status[candidate]) {
                    chosen = iter;
                    best = matched;
                }
                store.x[p] = None;
            }
            Some(classes[own][chosen])
        } else if let Some(other) = classes.iter().position(|c| !c.is_empty()) {
            let mut best = usize::MAX;
            let mut chosen = 0;
            for iter in 0..classes[other].len() {
                store.x[p] = Some(classes[other][iter]);
                let matched = matched_edges(store);
                if matched < best {
                    chosen = iter;
                    best = matched;
                }
                store.x[p] = None;
            }
            Some(classes[other][chosen])
        } else {
            None
        };
    }

    trace!(error = store.error(), "greedy assignment built");
}

/// Returns the unassigned positions sorted by descending degree, the class
/// of every position, and each class's candidate list sorted by descending
/// degree.
fn create_classes<N, E, M: Matcher<N, E>>(
    store: &mut AdjMatrices<'_, N, E, M>,
) -> (Vec<usize>, Vec<usize>, Vec<Vec<usize>>) {
    let n = store.first_size();
    let mut class_of: Vec<usize> = Vec::with_capacity(n);
    let mut classes: Vec<Vec<usize>> = Vec::new();

    for i in 0..n {
        let mut found = None;
        for j in 0..i {
            if store.same_label(i, j) {
                found = Some(class_of[j]);
                break;
            }
        }
        match found {
            Some(c) => class_of.push(c),
            None => {
                classes.push(store.labels[i].clone());
                class_of.push(classes.len() - 1);
            }
        }
    }

    let mut unsigned1 = (0..n).collect::<Vec<_>>();
    unsigned1.sort_by(|&a, &b| store.degree1[b].cmp(&store.degree1[a]));
    for class in classes.iter_mut() {
        class.sort_by(|&a, &b| store.degree2[b].cmp(&store.degree2[a]));
    }
    (unsigned1, class_of, classes)
}

fn matched_edges<N, E, M: Matcher<N, E>>(store: &mut AdjMatrices<'_, N, E, M>) -> usize {
    let mut matched = 0;
    for i in 0..store.first_size() {
        let Some(xi) = store.x[i] else {
            continue;
        };
        let row = store.adj1[i].iter().collect::<Vec<_>>();
        for j in row {
            let Some(xj) = store.x[j] else {
                continue;
            };
            if store.adj2[xi].contains(xj) && store.edge_weight_condition(i, j) {
                matched += 1;
            }
        }
    }
    matched / 2
}

/// Random discrete descent over the assignment left by [`greedy`].
pub(crate) struct RandomDescent<'r> {
    rng: &'r mut StdRng,
    max_iteration: usize,
    error_list: Vec<usize>,
    error_vertices: Vec<usize>,
    error: usize,
    error_stuck: usize,
    stuck: usize,
    saved: Option<(usize, Vec<Option<usize>>, Vec<Option<usize>>)>,
    stop: bool,
}

impl<'r> RandomDescent<'r> {
    pub fn new(rng: &'r mut StdRng, max_iteration: usize) -> Self {
        Self {
            rng,
            max_iteration,
            error_list: Vec::new(),
            error_vertices: Vec::new(),
            error: 0,
            error_stuck: 0,
            stuck: 0,
            saved: None,
            stop: false,
        }
    }

    /// Number of mismatched edges after [`RandomDescent::refine`].
    pub fn error(&self) -> usize {
        self.error
    }

    #[instrument(level = "trace", skip_all)]
    pub fn refine<N, E, M: Matcher<N, E>>(
        &mut self,
        store: &mut AdjMatrices<'_, N, E, M>,
        cancel: Option<&Cancellation>,
    ) -> Result<()> {
        let n = store.first_size();
        self.stop = false;
        self.stuck = 0;
        self.error = self.goal(store);
        self.error_stuck = self.error;
        self.save(store);
        self.make_error_list(store);

        let stuck_limit = (n.max(1) as f64).ln() * n as f64;
        let mut t = 0usize;

        loop {
            t += 1;
            if t > self.max_iteration.saturating_mul(n) || self.error == 0 {
                self.stop = true;
            }
            if t % 100 == 0 {
                cancel::check(cancel)?;
            }
            if self.stop {
                break;
            }

            self.stuck += 1;
            if self.stuck as f64 > stuck_limit {
                if self.saved.as_ref().is_some_and(|s| self.error <= s.0) {
                    self.save(store);
                }
                self.stuck = 0;
                for e in self.error_list.iter_mut() {
                    *e += 1;
                }
            }

            let p = loop {
                let r = self.rng.gen_range(0..self.error_vertices.len());
                let p = self.error_vertices[r];
                let labels = &store.labels[p];
                let fixed = labels.len() == 1 && store.x[p] == Some(labels[0]);
                if !fixed && !labels.is_empty() {
                    break p;
                }
            };

            let a = store.x[p];
            let q = loop {
                let labels = &store.labels[p];
                let r = labels[self.rng.gen_range(0..labels.len())];
                if Some(r) != a {
                    break r;
                }
            };

            if let Some(b) = store.y[q] {
                store.x[b] = a;
                store.x[p] = Some(q);
                if self.accept_swap(store, b, p) {
                    self.error = self.goal(store);
                    if let Some(a) = a {
                        store.y[a] = Some(b);
                    }
                    store.y[q] = Some(p);
                    self.make_error_list(store);
                } else {
                    store.x[b] = Some(q);
                    store.x[p] = a;
                }
            } else {
                store.x[p] = Some(q);
                if self.accept_move(store, p) {
                    self.error = self.goal(store);
                    if let Some(a) = a {
                        store.y[a] = None;
                    }
                    store.y[q] = Some(p);
                    self.make_error_list(store);
                } else {
                    store.x[p] = a;
                }
            }
        }

        if let Some((error, x, y)) = self.saved.take() {
            if self.error > error {
                self.error = error;
                store.x = x;
                store.y = y;
            }
        }

        debug!(iterations = t, error = self.error, "descent finished");
        Ok(())
    }

    fn goal<N, E, M: Matcher<N, E>>(&mut self, store: &AdjMatrices<'_, N, E, M>) -> usize {
        self.error_list = (0..store.first_size())
            .map(|i| store.adj1[i].iter().map(|j| store.count_error_at_edges(i, j)).sum())
            .collect();
        self.error_list.iter().sum::<usize>() / 2
    }

    fn make_error_list<N, E, M: Matcher<N, E>>(&mut self, store: &AdjMatrices<'_, N, E, M>) {
        self.error_vertices.clear();
        let mut fixed = 0;
        for i in 0..store.first_size() {
            if self.error_list[i] > 0 {
                self.error_vertices.push(i);
                let labels = &store.labels[i];
                if labels.len() <= 1 && (labels.is_empty() || store.x[i] == Some(labels[0])) {
                    fixed += 1;
                }
            }
        }
        if self.error_vertices.len() == fixed {
            self.stop = true;
        }
        if self.error < self.error_stuck {
            self.stuck = 0;
            self.error_stuck = self.error;
        }
    }

    fn row_error<N, E, M: Matcher<N, E>>(store: &AdjMatrices<'_, N, E, M>, i: usize) -> usize {
        store.adj1[i].iter().map(|j| store.count_error_at_edges(i, j)).sum()
    }

    fn accept_move<N, E, M: Matcher<N, E>>(&self, store: &AdjMatrices<'_, N, E, M>, p: usize) -> bool {
        Self::row_error(store, p) <= self.error_list[p]
    }

    fn accept_swap<N, E, M: Matcher<N, E>>(
        &self,
        store: &AdjMatrices<'_, N, E, M>,
        b: usize,
        p: usize,
    ) -> bool {
        Self::row_error(store, b) + Self::row_error(store, p) <= self.error_list[b] + self.error_list[p]
    }

    fn save<N, E, M: Matcher<N, E>>(&mut self, store: &AdjMatrices<'_, N, E, M>) {
        self.saved = Some((self.error, store.x.clone(), store.y.clone()));
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::{error::Error, graph::node, matching::Unlabeled};

    fn path(n: usize) -> UGraph<(), ()> {
        let mut g = UGraph::default();
        let nodes = (0..n).map(|_| g.add_node(())).collect::<Vec<_>>();
        for w in nodes.windows(2) {
            g.add_edge(w[0], w[1], ());
        }
        g
    }

    #[test]
    fn greedy_assigns_every_position() {
        let (g1, g2) = (path(4), path(6));
        let mut rng = StdRng::seed_from_u64(7);
        let mut store = AdjMatrices::new(&g1, &g2, Unlabeled, &[], &mut rng);
        greedy(&mut store);
        assert!(store.x.iter().all(Option::is_some));
        let images = store.x.iter().flatten().collect::<std::collections::HashSet<_>>();
        assert_eq!(images.len(), 4);
    }

    fn cycle(n: usize) -> UGraph<(), ()> {
        let mut g = path(n);
        g.add_edge(node(n - 1), node(0), ());
        g
    }

    #[test]
    fn descent_never_worsens_greedy() {
        let mut chorded = cycle(7);
        chorded.add_edge(node(0), node(3), ());
        let pairs = [(cycle(5), cycle(6)), (chorded, cycle(8)), (path(5), cycle(5))];
        for (g1, g2) in &pairs {
            let mut rng = StdRng::seed_from_u64(54217137);
            let mut store = AdjMatrices::new(g1, g2, Unlabeled, &[], &mut rng);
            greedy(&mut store);
            let greedy_error = store.error();
            let mut descent = RandomDescent::new(&mut rng, 1000);
            descent.refine(&mut store, None).unwrap();
            assert!(descent.error() <= greedy_error);
            assert_eq!(descent.error(), store.error());
        }
    }

    #[test]
    fn descent_stops_when_cancelled() {
        // An odd ring never fits an even one, so the descent keeps running.
        let (g1, g2) = (cycle(5), cycle(6));
        let mut rng = StdRng::seed_from_u64(7);
        let mut store = AdjMatrices::new(&g1, &g2, Unlabeled, &[], &mut rng);
        greedy(&mut store);
        let cancel = Cancellation::new();
        cancel.cancel();
        let mut descent = RandomDescent::new(&mut rng, 1000);
        assert!(matches!(
            descent.refine(&mut store, Some(&cancel)),
            Err(Error::Cancelled)
        ));
    }

    #[test]
    fn descent_finds_path_inside_path() {
        let (g1, g2) = (path(4), path(6));
        let mut rng = StdRng::seed_from_u64(7);
        let mut store = AdjMatrices::new(&g1, &g2, Unlabeled, &[], &mut rng);
        greedy(&mut store);
        let mut descent = RandomDescent::new(&mut rng, 1000);
        descent.refine(&mut store, None).unwrap();
        assert_eq!(descent.error(), 0);
        let solutions = store.solutions();
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].edge_count(), 3);
    }
}
