//! Subgraph embedding enumeration.
//!
//! A VF2-style backtracking search for non-induced embeddings of a `sub`
//! graph into a `sup` graph: every vertex of `sub` is mapped to a distinct
//! vertex of `sup` so that every edge of `sub` lands on an edge of `sup`.
//! Edges of `sup` between mapped vertices need not exist in `sub`.
//!
//! Query vertices are visited in breadth-first order per connected
//! component, so each non-root vertex only tries the unmapped neighbours of
//! its parent's image.

use std::collections::VecDeque;

use tracing::trace;

use crate::{
    graph::{Topology, UGraph},
    matching::Matcher,
};

pub struct EmbeddingEnumerator<'a, N, E, M> {
    sub: &'a UGraph<N, E>,
    sup: &'a UGraph<N, E>,
    sub_topology: Topology,
    sup_topology: Topology,
    matcher: M,
    order: Vec<(usize, Option<usize>)>,
    core: Vec<Option<usize>>,
    inverse: Vec<Option<usize>>,
}

impl<'a, N, E, M> EmbeddingEnumerator<'a, N, E, M>
where
    M: Matcher<N, E>,
{
    pub fn new(sub: &'a UGraph<N, E>, sup: &'a UGraph<N, E>, matcher: M) -> Self {
        let sub_topology = Topology::new(sub);
        let sup_topology = Topology::new(sup);
        let order = search_order(&sub_topology);
        Self {
            core: vec![None; sub_topology.vertex_end()],
            inverse: vec![None; sup_topology.vertex_end()],
            sub,
            sup,
            sub_topology,
            sup_topology,
            matcher,
            order,
        }
    }

    /// Report every embedding to `callback` as `(map, inverse)`: `map[u]` is
    /// the image of `sub` vertex `u` and `inverse[v]` the preimage of `sup`
    /// vertex `v`. Returning `false` from the callback stops the
    /// enumeration. Returns `true` iff it was stopped that way.
    ///
    /// An empty `sub` has exactly one (empty) embedding.
    pub fn process<F>(&mut self, mut callback: F) -> bool
    where
        F: FnMut(&[Option<usize>], &[Option<usize>]) -> bool,
    {
        if self.sub_topology.vertex_count() > self.sup_topology.vertex_count()
            || self.sub_topology.edge_count() > self.sup_topology.edge_count()
        {
            return false;
        }
        self.search(0, &mut callback)
    }

    /// Return the first embedding found, if any.
    pub fn find_first(&mut self) -> Option<Vec<Option<usize>>> {
        let mut found = None;
        self.process(|map, _| {
            found = Some(map.to_vec());
            false
        });
        found
    }

    fn search<F>(&mut self, depth: usize, callback: &mut F) -> bool
    where
        F: FnMut(&[Option<usize>], &[Option<usize>]) -> bool,
    {
        if depth == self.order.len() {
            trace!(depth, "embedding found");
            return !callback(&self.core, &self.inverse);
        }

        let (u, parent) = self.order[depth];
        for v in self.candidates(parent) {
            if !self.is_feasible(u, v) {
                continue;
            }
            self.push_mapping(u, v);
            let stopped = self.search(depth + 1, callback);
            self.pop_mapping(u, v);
            if stopped {
                return true;
            }
        }
        false
    }

    fn candidates(&self, parent: Option<usize>) -> Vec<usize> {
        match parent.and_then(|p| self.core[p]) {
            Some(image) => self
                .sup_topology
                .neighbors(image)
                .iter()
                .map(|&(w, _)| w)
                .filter(|&w| self.inverse[w].is_none())
                .collect(),
            None => self
                .sup_topology
                .vertices()
                .iter()
                .copied()
                .filter(|&w| self.inverse[w].is_none())
                .collect(),
        }
    }

    fn is_feasible(&mut self, u: usize, v: usize) -> bool {
        self.degree_rule(u, v) && self.semantic_rule(u, v) && self.core_rule(u, v)
    }

    fn degree_rule(&self, u: usize, v: usize) -> bool {
        self.sub_topology.degree(u) <= self.sup_topology.degree(v)
    }

    fn semantic_rule(&mut self, u: usize, v: usize) -> bool {
        self.matcher
            .match_vertex(self.sub, self.sup, &self.core, u, v)
    }

    fn core_rule(&mut self, u: usize, v: usize) -> bool {
        for &(w, e) in self.sub_topology.neighbors(u) {
            let Some(image) = self.core[w] else {
                continue;
            };
            let Some(f) = self.sup_topology.find_edge(v, image) else {
                return false;
            };
            if !self.matcher.match_edge(self.sub, self.sup, e, f) {
                return false;
            }
        }
        true
    }

    fn push_mapping(&mut self, u: usize, v: usize) {
        self.core[u] = Some(v);
        self.inverse[v] = Some(u);
        for &(w, e) in self.sub_topology.neighbors(u) {
            if w == u {
                continue;
            }
            if let Some(f) = self.core[w].and_then(|image| self.sup_topology.find_edge(v, image)) {
                self.matcher.on_edge_added(self.sub, self.sup, e, f);
            }
        }
    }

    fn pop_mapping(&mut self, u: usize, v: usize) {
        self.core[u] = None;
        self.inverse[v] = None;
        self.matcher.on_vertex_removed(self.sub, u);
    }
}

/// Breadth-first visiting order, one tree per component, roots in id order.
fn search_order(topology: &Topology) -> Vec<(usize, Option<usize>)> {
    let mut seen = vec![false; topology.vertex_end()];
    let mut order = Vec::with_capacity(topology.vertex_count());
    let mut queue = VecDeque::new();

    for &root in topology.vertices() {
        if seen[root] {
            continue;
        }
        seen[root] = true;
        queue.push_back((root, None));
        while let Some((v, parent)) = queue.pop_front() {
            order.push((v, parent));
            for &(w, _) in topology.neighbors(v) {
                if !seen[w] {
                    seen[w] = true;
                    queue.push_back((w, Some(v)));
                }
            }
        }
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::{Unlabeled, WeightMatcher};

    fn cycle(n: usize) -> UGraph<(), ()> {
        let mut g = UGraph::default();
        let nodes = (0..n).map(|_| g.add_node(())).collect::<Vec<_>>();
        for i in 0..n {
            g.add_edge(nodes[i], nodes[(i + 1) % n], ());
        }
        g
    }

    fn path(n: usize) -> UGraph<(), ()> {
        let mut g = UGraph::default();
        let nodes = (0..n).map(|_| g.add_node(())).collect::<Vec<_>>();
        for w in nodes.windows(2) {
            g.add_edge(w[0], w[1], ());
        }
        g
    }

    #[test]
    fn path_embeds_in_cycle() {
        let (sub, sup) = (path(3), cycle(6));
        let mut count = 0;
        let stopped = EmbeddingEnumerator::new(&sub, &sup, Unlabeled).process(|map, _| {
            assert!(map.iter().all(Option::is_some));
            count += 1;
            true
        });
        assert!(!stopped);
        // 6 centres, 2 directions.
        assert_eq!(count, 12);
    }

    #[test]
    fn embeddings_are_not_induced() {
        let (sub, sup) = (path(6), cycle(6));
        assert!(EmbeddingEnumerator::new(&sub, &sup, Unlabeled)
            .find_first()
            .is_some());
        assert!(EmbeddingEnumerator::new(&sup, &sub, Unlabeled)
            .find_first()
            .is_none());
    }

    #[test]
    fn callback_can_stop() {
        let (sub, sup) = (path(2), cycle(5));
        let mut count = 0;
        let stopped = EmbeddingEnumerator::new(&sub, &sup, Unlabeled).process(|_, _| {
            count += 1;
            count < 3
        });
        assert!(stopped);
        assert_eq!(count, 3);
    }

    #[test]
    fn labels_restrict_embeddings() {
        let mut sub = UGraph::<char, ()>::default();
        let a = sub.add_node('N');
        let b = sub.add_node('C');
        sub.add_edge(a, b, ());

        let mut sup = UGraph::<char, ()>::default();
        let x = sup.add_node('C');
        let y = sup.add_node('C');
        let z = sup.add_node('N');
        sup.add_edge(x, y, ());
        sup.add_edge(y, z, ());

        let matcher = WeightMatcher::new(|p: &char, q: &char| p == q, |_: &(), _: &()| true);
        let map = EmbeddingEnumerator::new(&sub, &sup, matcher).find_first();
        assert_eq!(map, Some(vec![Some(2), Some(1)]));
    }

    #[test]
    fn empty_sub_has_one_embedding() {
        let sub = UGraph::<(), ()>::default();
        let sup = cycle(3);
        let mut count = 0;
        EmbeddingEnumerator::new(&sub, &sup, Unlabeled).process(|_, _| {
            count += 1;
            true
        });
        assert_eq!(count, 1);
    }
}
