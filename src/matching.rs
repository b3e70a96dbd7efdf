//! Vertex and edge compatibility predicates.
//!
//! Every search in the crate (resolution-graph construction, the approximate
//! correspondence matrices and embedding enumeration) asks a [`Matcher`]
//! whether a vertex or edge of the first graph may stand for one of the
//! second. The core never looks at weights itself.

use crate::{
    graph::{edge, node, UGraph},
    molecule::{Atom, AtomKind, Bond},
};

/// Compatibility predicates plus optional commit/rollback hooks.
///
/// `core` passed to [`Matcher::match_vertex`] is the partial mapping from
/// vertices of `g1` to vertices of `g2` built so far; searches that have no
/// partial mapping pass an empty slice.
pub trait Matcher<N, E> {
    fn match_vertex(
        &mut self,
        g1: &UGraph<N, E>,
        g2: &UGraph<N, E>,
        core: &[Option<usize>],
        v1: usize,
        v2: usize,
    ) -> bool;

    fn match_edge(&mut self, g1: &UGraph<N, E>, g2: &UGraph<N, E>, e1: usize, e2: usize) -> bool;

    /// Called when an embedding search commits edge `e1` onto `e2`.
    fn on_edge_added(&mut self, _g1: &UGraph<N, E>, _g2: &UGraph<N, E>, _e1: usize, _e2: usize) {}

    /// Called when an embedding search drops vertex `v1` from its mapping.
    fn on_vertex_removed(&mut self, _g1: &UGraph<N, E>, _v1: usize) {}
}

impl<N, E, M: Matcher<N, E> + ?Sized> Matcher<N, E> for &mut M {
    fn match_vertex(
        &mut self,
        g1: &UGraph<N, E>,
        g2: &UGraph<N, E>,
        core: &[Option<usize>],
        v1: usize,
        v2: usize,
    ) -> bool {
        (**self).match_vertex(g1, g2, core, v1, v2)
    }

    fn match_edge(&mut self, g1: &UGraph<N, E>, g2: &UGraph<N, E>, e1: usize, e2: usize) -> bool {
        (**self).match_edge(g1, g2, e1, e2)
    }

    fn on_edge_added(&mut self, g1: &UGraph<N, E>, g2: &UGraph<N, E>, e1: usize, e2: usize) {
        (**self).on_edge_added(g1, g2, e1, e2)
    }

    fn on_vertex_removed(&mut self, g1: &UGraph<N, E>, v1: usize) {
        (**self).on_vertex_removed(g1, v1)
    }
}

/// Accepts every pair: purely structural matching.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlabeled;

impl<N, E> Matcher<N, E> for Unlabeled {
    fn match_vertex(
        &mut self,
        _: &UGraph<N, E>,
        _: &UGraph<N, E>,
        _: &[Option<usize>],
        _: usize,
        _: usize,
    ) -> bool {
        true
    }

    fn match_edge(&mut self, _: &UGraph<N, E>, _: &UGraph<N, E>, _: usize, _: usize) -> bool {
        true
    }
}

/// Compares vertex and edge weights with two closures.
#[derive(Debug, Clone, Copy)]
pub struct WeightMatcher<FV, FE> {
    pub vertex: FV,
    pub edge: FE,
}

impl<FV, FE> WeightMatcher<FV, FE> {
    pub fn new(vertex: FV, edge: FE) -> Self {
        Self { vertex, edge }
    }
}

impl<N, E, FV, FE> Matcher<N, E> for WeightMatcher<FV, FE>
where
    FV: FnMut(&N, &N) -> bool,
    FE: FnMut(&E, &E) -> bool,
{
    fn match_vertex(
        &mut self,
        g1: &UGraph<N, E>,
        g2: &UGraph<N, E>,
        _: &[Option<usize>],
        v1: usize,
        v2: usize,
    ) -> bool {
        match (g1.node_weight(node(v1)), g2.node_weight(node(v2))) {
            (Some(a), Some(b)) => (self.vertex)(a, b),
            _ => false,
        }
    }

    fn match_edge(&mut self, g1: &UGraph<N, E>, g2: &UGraph<N, E>, e1: usize, e2: usize) -> bool {
        match (g1.edge_weight(edge(e1)), g2.edge_weight(edge(e2))) {
            (Some(a), Some(b)) => (self.edge)(a, b),
            _ => false,
        }
    }
}

/// Symmetric molecule comparison: same element, same bond order. R-sites
/// match R-sites regardless of their R-group index.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoleculeMatcher;

impl Matcher<Atom, Bond> for MoleculeMatcher {
    fn match_vertex(
        &mut self,
        g1: &UGraph<Atom, Bond>,
        g2: &UGraph<Atom, Bond>,
        _: &[Option<usize>],
        v1: usize,
        v2: usize,
    ) -> bool {
        let (Some(a), Some(b)) = (g1.node_weight(node(v1)), g2.node_weight(node(v2))) else {
            return false;
        };
        match (a.kind(), b.kind()) {
            (AtomKind::RSite(_), AtomKind::RSite(_)) => true,
            (x, y) => x == y,
        }
    }

    fn match_edge(
        &mut self,
        g1: &UGraph<Atom, Bond>,
        g2: &UGraph<Atom, Bond>,
        e1: usize,
        e2: usize,
    ) -> bool {
        bonds_equal(g1, g2, e1, e2)
    }
}

/// Query-to-target comparison used when embedding a scaffold.
///
/// `g1` is the query. R-sites and "any" atoms of the query match every target
/// atom; elements must be equal, and a query atom with a substituent count
/// only matches target atoms with exactly that many heavy neighbours.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScaffoldMatcher;

impl Matcher<Atom, Bond> for ScaffoldMatcher {
    fn match_vertex(
        &mut self,
        g1: &UGraph<Atom, Bond>,
        g2: &UGraph<Atom, Bond>,
        _: &[Option<usize>],
        v1: usize,
        v2: usize,
    ) -> bool {
        let (Some(query), Some(target)) = (g1.node_weight(node(v1)), g2.node_weight(node(v2)))
        else {
            return false;
        };
        let kind_ok = match query.kind() {
            AtomKind::RSite(_) | AtomKind::Any => true,
            kind => kind == target.kind(),
        };
        if !kind_ok {
            return false;
        }
        match query.substituents() {
            Some(count) => {
                let heavy = g2
                    .neighbors(node(v2))
                    .filter(|&n| !g2[n].is_hydrogen())
                    .count();
                heavy == count
            }
            None => true,
        }
    }

    fn match_edge(
        &mut self,
        g1: &UGraph<Atom, Bond>,
        g2: &UGraph<Atom, Bond>,
        e1: usize,
        e2: usize,
    ) -> bool {
        bonds_equal(g1, g2, e1, e2)
    }
}

fn bonds_equal(g1: &UGraph<Atom, Bond>, g2: &UGraph<Atom, Bond>, e1: usize, e2: usize) -> bool {
    matches!(
        (g1.edge_weight(edge(e1)), g2.edge_weight(edge(e2))),
        (Some(a), Some(b)) if a == b
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecule::{Element, Molecule};

    #[test]
    fn scaffold_matcher_enforces_substituents() {
        let mut query = Molecule::new();
        let q = query.add_atom(Atom::new(Element::Carbon));
        query.atom_mut(q).unwrap().set_substituents(Some(1));
        let r = query.add_atom(Atom::rsite(0));

        let mut target = Molecule::new();
        let a = target.add_atom(Atom::new(Element::Carbon));
        let b = target.add_atom(Atom::new(Element::Carbon));
        let c = target.add_atom(Atom::new(Element::Oxygen));
        target.add_bond(a, b, Bond::Single);
        target.add_bond(b, c, Bond::Single);

        let mut m = ScaffoldMatcher;
        let (g1, g2) = (query.graph(), target.graph());
        assert!(m.match_vertex(g1, g2, &[], q, a));
        assert!(!m.match_vertex(g1, g2, &[], q, b));
        assert!(!m.match_vertex(g1, g2, &[], q, c));
        assert!(m.match_vertex(g1, g2, &[], r, c));
    }

    #[test]
    fn weight_matcher_compares_weights() {
        let mut g1 = UGraph::<u8, u8>::default();
        let a = g1.add_node(1);
        let b = g1.add_node(2);
        g1.add_edge(a, b, 7);
        let g2 = g1.clone();

        let mut m = WeightMatcher::new(|x: &u8, y: &u8| x == y, |x: &u8, y: &u8| x == y);
        assert!(m.match_vertex(&g1, &g2, &[], 0, 0));
        assert!(!m.match_vertex(&g1, &g2, &[], 0, 1));
        assert!(m.match_edge(&g1, &g2, 0, 0));
    }
}
