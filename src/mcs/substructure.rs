//! Cheap containment test run before a full common subgraph search.
//!
//! When one graph already embeds in the other, the smaller graph is itself
//! the maximum common subgraph and the resolution graph is never built.

use crate::{
    embedding::EmbeddingEnumerator,
    graph::{Topology, UGraph},
    matching::Matcher,
};

/// Containment test between two graphs in whichever direction is possible.
///
/// The graph with fewer vertices (fewer edges on a tie) is embedded in the
/// other one. [`SubstructureMcs::is_inverted`] tells whether that was `sup`.
pub struct SubstructureMcs<'a, N, E, M> {
    sub: &'a UGraph<N, E>,
    sup: &'a UGraph<N, E>,
    matcher: M,
    inverted: bool,
}

impl<'a, N, E, M: Matcher<N, E>> SubstructureMcs<'a, N, E, M> {
    pub fn new(sub: &'a UGraph<N, E>, sup: &'a UGraph<N, E>, matcher: M) -> Self {
        let (sub_v, sup_v) = (sub.node_count(), sup.node_count());
        let inverted = match sub_v.cmp(&sup_v) {
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Equal => sub.edge_count() >= sup.edge_count(),
        };
        Self {
            sub,
            sup,
            matcher,
            inverted,
        }
    }

    /// `true` when `sup` is the graph searched for inside `sub`.
    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    /// Look for one embedding. The returned map is indexed by the vertices
    /// of `sub` and holds their images in `sup`; when inverted, vertices of
    /// `sub` outside the embedding are `None`.
    pub fn search_substructure(&mut self) -> Option<Vec<Option<usize>>> {
        if self.sub.node_count() == 0 || self.sup.node_count() == 0 {
            return None;
        }

        let (query, target) = if self.inverted {
            (self.sup, self.sub)
        } else {
            (self.sub, self.sup)
        };

        let mut found = None;
        let inverted = self.inverted;
        EmbeddingEnumerator::new(query, target, &mut self.matcher).process(|map, inverse| {
            found = Some(if inverted { inverse.to_vec() } else { map.to_vec() });
            false
        });

        let sub_end = Topology::new(self.sub).vertex_end();
        found.map(|mut map| {
            map.resize(sub_end, None);
            map
        })
    }
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

    fn path(n: usize) -> UGraph<(), ()> {
        let mut g = UGraph::default();
        let nodes = (0..n).map(|_| g.add_node(())).collect::<Vec<_>>();
        for w in nodes.windows(2) {
            g.add_edge(w[0], w[1], ());
        }
        g
    }

    #[test]
    fn smaller_graph_is_the_query() {
        let (small, big) = (path(3), cycle(5));
        let mut forward = SubstructureMcs::new(&small, &big, Unlabeled);
        assert!(!forward.is_inverted());
        let map = forward.search_substructure().unwrap();
        assert_eq!(map.len(), 3);
        assert!(map.iter().all(Option::is_some));

        let mut backward = SubstructureMcs::new(&big, &small, Unlabeled);
        assert!(backward.is_inverted());
        let map = backward.search_substructure().unwrap();
        assert_eq!(map.len(), 5);
        assert_eq!(map.iter().flatten().count(), 3);
    }

    #[test]
    fn equal_vertex_counts_compare_edges() {
        let (p, c) = (path(4), cycle(4));
        assert!(!SubstructureMcs::new(&p, &c, Unlabeled).is_inverted());
        assert!(SubstructureMcs::new(&c, &p, Unlabeled).is_inverted());
        assert!(SubstructureMcs::new(&c, &p, Unlabeled)
            .search_substructure()
            .is_some());
    }

    #[test]
    fn missing_structure_is_reported() {
        let (tri, hex) = (cycle(3), cycle(6));
        assert!(SubstructureMcs::new(&tri, &hex, Unlabeled)
            .search_substructure()
            .is_none());
    }
}
