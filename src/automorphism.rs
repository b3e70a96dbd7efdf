//! Automorphism enumeration.

use std::collections::HashSet;

use tracing::trace;

use crate::{
    embedding::EmbeddingEnumerator,
    graph::{Topology, UGraph},
    matching::Matcher,
};

/// A vertex permutation indexed by vertex id; gaps in the id space are `None`.
pub type Permutation = Vec<Option<usize>>;

/// Return every automorphism of `g` allowed by `matcher`, identity first.
///
/// An embedding of a graph into itself is injective on vertices and edges,
/// so with equal vertex and edge counts it is a bijection preserving
/// adjacency.
pub fn automorphisms<N, E, M>(g: &UGraph<N, E>, matcher: M) -> Vec<Permutation>
where
    M: Matcher<N, E>,
{
    let topology = Topology::new(g);
    let identity = identity(&topology);

    let mut seen = HashSet::new();
    seen.insert(identity.clone());
    let mut result = vec![identity];

    EmbeddingEnumerator::new(g, g, matcher).process(|map, _| {
        if seen.insert(map.to_vec()) {
            result.push(map.to_vec());
        }
        true
    });

    trace!(count = result.len(), "automorphisms enumerated");
    result
}

fn identity(topology: &Topology) -> Permutation {
    let mut id = vec![None; topology.vertex_end()];
    for &v in topology.vertices() {
        id[v] = Some(v);
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::{Unlabeled, WeightMatcher};

    #[test]
    fn hexagon_has_dihedral_group() {
        let mut g = UGraph::<(), ()>::default();
        let nodes = (0..6).map(|_| g.add_node(())).collect::<Vec<_>>();
        for i in 0..6 {
            g.add_edge(nodes[i], nodes[(i + 1) % 6], ());
        }
        let autos = automorphisms(&g, Unlabeled);
        assert_eq!(autos.len(), 12);
        assert_eq!(autos[0], (0..6).map(Some).collect::<Vec<_>>());
    }

    #[test]
    fn labels_break_symmetry() {
        let mut g = UGraph::<u8, ()>::default();
        let a = g.add_node(1);
        let b = g.add_node(2);
        let c = g.add_node(1);
        g.add_edge(a, b, ());
        g.add_edge(b, c, ());

        let labelled = WeightMatcher::new(|x: &u8, y: &u8| x == y, |_: &(), _: &()| true);
        assert_eq!(automorphisms(&g, labelled).len(), 2);

        g[c] = 3;
        let labelled = WeightMatcher::new(|x: &u8, y: &u8| x == y, |_: &(), _: &()| true);
        assert_eq!(automorphisms(&g, labelled).len(), 1);
    }
}
