//! Scaffold detection over a set of graphs.
//!
//! A [`GraphBasket`] holds candidate scaffolds. Graphs of the input set are
//! visited in order of edge count; every candidate that does not already
//! embed in the current graph is replaced by its common subgraphs with it.
//! After each step, candidates contained in others are dropped. The best
//! remaining candidate under a [`GraphOrder`] is the scaffold.

use std::cmp::Ordering;

use bit_set::BitSet;
use clap::ValueEnum;
use tracing::{debug, info, instrument, trace};

use crate::{
    cancel::{self, Cancellation},
    embedding::EmbeddingEnumerator,
    error::{Error, Result},
    graph::{edge_subgraph, UGraph},
    matching::{Matcher, MoleculeMatcher},
    mcs::{ApproximateParams, MaxCommonSubgraph, ReGraph, SubstructureMcs},
    molecule::Molecule,
};

const BASKET_CAPACITY: usize = 100;
const BASKET_GROWTH: usize = 100;

/// Comparator ranking candidate scaffolds, best first.
pub type GraphOrder<N, E> = fn(&UGraph<N, E>, &UGraph<N, E>) -> Ordering;

/// Default ranking: more independent rings first, then more edges. A graph
/// without edges is ranked by edge count alone.
pub fn ring_count_order<N, E>(g1: &UGraph<N, E>, g2: &UGraph<N, E>) -> Ordering {
    let rings = |g: &UGraph<N, E>| g.edge_count() as isize - g.node_count() as isize;
    let by_rings = rings(g2).cmp(&rings(g1));
    if by_rings == Ordering::Equal || g1.edge_count() == 0 || g2.edge_count() == 0 {
        g2.edge_count().cmp(&g1.edge_count())
    } else {
        by_rings
    }
}

/// Which common subgraph search feeds the basket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ScaffoldMode {
    /// Exact resolution-graph search; fails if the iteration cap is hit.
    #[default]
    Exact,
    /// Greedy assignment refined by random descent.
    Approximate,
}

/// Growable set of candidate scaffolds with free-slot reuse.
pub struct GraphBasket<'a, N, E> {
    set: &'a [UGraph<N, E>],
    order: Vec<usize>,
    slots: Vec<UGraph<N, E>>,
    active: BitSet,
    free: BitSet,
}

impl<'a, N: Clone, E: Clone> GraphBasket<'a, N, E> {
    /// Sort the non-empty graphs of `set` by edge count and seed the basket
    /// with the smallest one.
    pub fn new(set: &'a [UGraph<N, E>]) -> Result<Self> {
        if set.is_empty() {
            return Err(Error::EmptyGraphSet);
        }
        let mut order = (0..set.len())
            .filter(|&i| set[i].node_count() > 0)
            .collect::<Vec<_>>();
        order.sort_by_key(|&i| set[i].edge_count());
        let Some(&first) = order.first() else {
            return Err(Error::NoScaffoldsFound);
        };

        let mut slots = (0..BASKET_CAPACITY).map(|_| UGraph::default()).collect::<Vec<_>>();
        slots[0] = set[first].clone();
        let free = (1..BASKET_CAPACITY).collect::<BitSet>();
        let mut active = BitSet::with_capacity(BASKET_CAPACITY);
        active.insert(0);

        Ok(Self {
            set,
            order,
            slots,
            active,
            free,
        })
    }

    /// Number of non-empty graphs in the input set.
    pub fn set_len(&self) -> usize {
        self.order.len()
    }

    /// The `i`-th graph of the input set in edge count order.
    pub fn set_graph(&self, i: usize) -> &'a UGraph<N, E> {
        &self.set[self.order[i]]
    }

    pub fn graph(&self, slot: usize) -> &UGraph<N, E> {
        &self.slots[slot]
    }

    /// First active slot at or after `from`.
    pub fn next_active(&self, from: usize) -> Option<usize> {
        self.active.iter().find(|&x| x >= from)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn remove(&mut self, slot: usize) {
        self.active.remove(slot);
        self.free.insert(slot);
    }

    /// Store the edge subgraph of `g` spanned by `vertices` and `edges` in
    /// a free slot. The slot stays pending until [`Self::check_added`].
    pub fn add_to_next_empty_spot(&mut self, g: &UGraph<N, E>, vertices: &[usize], edges: &[usize]) {
        let slot = match self.free.iter().next() {
            Some(slot) => slot,
            None => {
                let start = self.slots.len();
                self.slots
                    .extend((0..BASKET_GROWTH).map(|_| UGraph::default()));
                self.free.extend(start..start + BASKET_GROWTH);
                trace!(capacity = self.slots.len(), "basket grown");
                start
            }
        };
        self.free.remove(slot);
        self.slots[slot] = edge_subgraph(g, vertices, edges).0;
    }

    /// Activate every pending slot unless it embeds in an active graph.
    /// A pending graph that contains an active one replaces it.
    pub fn check_added<M: Matcher<N, E>>(&mut self, matcher: &mut M) {
        let pending = (0..self.slots.len())
            .filter(|&x| !self.active.contains(x) && !self.free.contains(x))
            .collect::<Vec<_>>();

        for x in pending {
            let mut keep = true;
            let mut superseded = None;
            for y in self.active.iter() {
                let mut sub_mcs = SubstructureMcs::new(&self.slots[x], &self.slots[y], &mut *matcher);
                if sub_mcs.search_substructure().is_some() {
                    keep = false;
                    if sub_mcs.is_inverted() {
                        superseded = Some(y);
                        keep = true;
                    }
                    break;
                }
            }
            if let Some(y) = superseded {
                self.remove(y);
            }
            if keep {
                self.active.insert(x);
            } else {
                self.free.insert(x);
            }
        }
        debug!(active = self.active.len(), "basket checked");
    }

    /// Rank the active candidates with `order` and return the best one.
    pub fn into_best(mut self, order: GraphOrder<N, E>) -> Result<UGraph<N, E>> {
        let mut candidates = self
            .active
            .iter()
            .map(|slot| std::mem::take(&mut self.slots[slot]))
            .filter(|g| g.node_count() > 0)
            .collect::<Vec<_>>();
        candidates.sort_by(order);
        candidates.into_iter().next().ok_or(Error::NoScaffoldsFound)
    }
}

/// Scaffold search over a set of graphs.
pub struct ScaffoldDetection<'a, N, E, M> {
    graphs: &'a [UGraph<N, E>],
    matcher: M,
    max_iterations: usize,
    approximate: ApproximateParams,
    order: GraphOrder<N, E>,
    cancel: Option<Cancellation>,
    on_progress: Option<Box<dyn FnMut(usize, usize) -> bool + 'a>>,
}

impl<'a, N: Clone, E: Clone, M: Matcher<N, E>> ScaffoldDetection<'a, N, E, M> {
    pub fn new(graphs: &'a [UGraph<N, E>], matcher: M) -> Self {
        Self {
            graphs,
            matcher,
            max_iterations: 0,
            approximate: ApproximateParams::default(),
            order: ring_count_order,
            cancel: None,
            on_progress: None,
        }
    }

    /// Iteration cap handed to each pairwise search; `0` keeps the
    /// search's own default.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Seed settings of the approximate search.
    pub fn with_approximate_params(mut self, params: ApproximateParams) -> Self {
        self.approximate = params;
        self
    }

    pub fn with_order(mut self, order: GraphOrder<N, E>) -> Self {
        self.order = order;
        self
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Called after each input graph with `(processed, total)`. Returning
    /// `false` keeps the current basket and ends the search.
    pub fn on_progress(mut self, callback: impl FnMut(usize, usize) -> bool + 'a) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    pub fn detect(&mut self, mode: ScaffoldMode) -> Result<UGraph<N, E>> {
        match mode {
            ScaffoldMode::Exact => self.extract_exact(),
            ScaffoldMode::Approximate => self.extract_approximate(),
        }
    }

    #[instrument(level = "trace", skip_all)]
    pub fn extract_exact(&mut self) -> Result<UGraph<N, E>> {
        let mut basket = GraphBasket::new(self.graphs)?;
        let total = basket.set_len();
        let max_iteration = (self.max_iterations > 0).then_some(self.max_iterations as u64);

        for orgraph in 1..total {
            cancel::check(self.cancel.as_ref())?;
            let set_graph = basket.set_graph(orgraph);

            let mut cursor = basket.next_active(0);
            while let Some(b) = cursor {
                let lists = {
                    let basket_graph = basket.graph(b);
                    if self.is_contained(basket_graph, set_graph) {
                        cursor = basket.next_active(b + 1);
                        continue;
                    }
                    let mut regraph =
                        ReGraph::build(basket_graph, set_graph, &mut self.matcher, self.cancel.as_ref())?;
                    regraph.set_max_iteration(max_iteration);
                    regraph.parse(true, self.cancel.as_ref(), &mut |_: &[Option<usize>]| true)?;
                    if regraph.stopped() {
                        return Err(Error::IterationLimit);
                    }
                    regraph.solution_lists_super()
                };

                trace!(slot = b, solutions = lists.len(), "basket graph replaced");
                for list in &lists {
                    basket.add_to_next_empty_spot(set_graph, &list.vertices, &list.edges);
                }
                basket.remove(b);
                cursor = basket.next_active(b + 1);
            }

            basket.check_added(&mut self.matcher);
            if !self.report_progress(orgraph, total) {
                break;
            }
        }

        let scaffold = basket.into_best(self.order)?;
        info!(
            vertices = scaffold.node_count(),
            edges = scaffold.edge_count(),
            "exact scaffold found"
        );
        Ok(scaffold)
    }

    #[instrument(level = "trace", skip_all)]
    pub fn extract_approximate(&mut self) -> Result<UGraph<N, E>> {
        let mut basket = GraphBasket::new(self.graphs)?;
        let total = basket.set_len();
        let mut params = self.approximate;
        if self.max_iterations > 0 {
            params.max_iteration = self.max_iterations;
        }

        for orgraph in 1..total {
            cancel::check(self.cancel.as_ref())?;
            let set_graph = basket.set_graph(orgraph);

            let mut cursor = basket.next_active(0);
            while let Some(b) = cursor {
                let lists = {
                    let basket_graph = basket.graph(b);
                    if self.is_contained(basket_graph, set_graph) {
                        cursor = basket.next_active(b + 1);
                        continue;
                    }
                    let mut mcs = MaxCommonSubgraph::new(basket_graph, set_graph, &mut self.matcher)
                        .with_approximate_params(params);
                    if let Some(cancel) = &self.cancel {
                        mcs = mcs.with_cancellation(cancel.clone());
                    }
                    let result = mcs.find_approximate()?;
                    result
                        .solutions
                        .into_iter()
                        .map(|s| {
                            let vertices = s.vertex_map.into_iter().flatten().collect::<Vec<_>>();
                            let edges = s.edge_map.into_iter().flatten().collect::<Vec<_>>();
                            (vertices, edges)
                        })
                        .collect::<Vec<_>>()
                };

                for (vertices, edges) in &lists {
                    if vertices.len() > 1 {
                        basket.add_to_next_empty_spot(set_graph, vertices, edges);
                    }
                }
                basket.remove(b);
                cursor = basket.next_active(b + 1);
            }

            basket.check_added(&mut self.matcher);
            if !self.report_progress(orgraph, total) {
                break;
            }
        }

        let scaffold = basket.into_best(self.order)?;
        info!(
            vertices = scaffold.node_count(),
            edges = scaffold.edge_count(),
            "approximate scaffold found"
        );
        Ok(scaffold)
    }

    /// `basket_graph` embeds in `set_graph` as it is. Searched in this
    /// direction only, so a graph of equal size counts when isomorphic.
    fn is_contained(&mut self, basket_graph: &UGraph<N, E>, set_graph: &UGraph<N, E>) -> bool {
        basket_graph.node_count() > 0
            && EmbeddingEnumerator::new(basket_graph, set_graph, &mut self.matcher)
                .find_first()
                .is_some()
    }

    fn report_progress(&mut self, processed: usize, total: usize) -> bool {
        self.on_progress
            .as_mut()
            .map_or(true, |callback| callback(processed, total))
    }
}

/// Detect the scaffold of `graphs` with `matcher`.
pub fn detect_scaffold<N: Clone, E: Clone, M: Matcher<N, E>>(
    graphs: &[UGraph<N, E>],
    mode: ScaffoldMode,
    matcher: M,
) -> Result<UGraph<N, E>> {
    ScaffoldDetection::new(graphs, matcher).detect(mode)
}

/// Settings for [`detect_molecule_scaffold`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScaffoldParams {
    /// `0` keeps each search's default cap.
    pub max_iterations: usize,
    pub approximate: ApproximateParams,
}

/// Detect the common scaffold of `molecules`, comparing elements and bond
/// orders exactly.
pub fn detect_molecule_scaffold(
    molecules: &[Molecule],
    mode: ScaffoldMode,
    params: ScaffoldParams,
) -> Result<Molecule> {
    let graphs = molecules
        .iter()
        .map(|m| m.graph().clone())
        .collect::<Vec<_>>();
    let scaffold = ScaffoldDetection::new(&graphs, MoleculeMatcher)
        .with_max_iterations(params.max_iterations)
        .with_approximate_params(params.approximate)
        .detect(mode)?;
    Ok(Molecule::from_graph(scaffold))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{graph::node, matching::Unlabeled};

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
    fn ring_count_order_prefers_rings() {
        let (ring, chain) = (cycle(5), path(7));
        assert_eq!(ring_count_order(&ring, &chain), Ordering::Less);
        assert_eq!(ring_count_order(&chain, &ring), Ordering::Greater);
    }

    #[test]
    fn repeated_graph_is_its_own_scaffold() {
        let graphs = vec![cycle(6), cycle(6), cycle(6)];
        for mode in [ScaffoldMode::Exact, ScaffoldMode::Approximate] {
            let scaffold = detect_scaffold(&graphs, mode, Unlabeled).unwrap();
            assert_eq!(scaffold.node_count(), 6);
            assert_eq!(scaffold.edge_count(), 6);
        }
    }

    /// A 12-ring with three chords of uneven span.
    fn irregular_ring() -> UGraph<(), ()> {
        let mut g = cycle(12);
        for (a, b) in [(0, 5), (2, 9), (3, 7)] {
            g.add_edge(node(a), node(b), ());
        }
        g
    }

    #[test]
    fn repeated_irregular_graph_is_kept_whole() {
        let graphs = vec![irregular_ring(), irregular_ring(), irregular_ring()];
        for mode in [ScaffoldMode::Exact, ScaffoldMode::Approximate] {
            let scaffold = detect_scaffold(&graphs, mode, Unlabeled).unwrap();
            assert_eq!(scaffold.node_count(), 12, "{mode:?}");
            assert_eq!(scaffold.edge_count(), 15, "{mode:?}");
        }
    }

    #[test]
    fn contained_graph_skips_the_search() {
        // A one-step cap would fail any search that actually ran.
        let graphs = vec![irregular_ring(), irregular_ring()];
        let scaffold = ScaffoldDetection::new(&graphs, Unlabeled)
            .with_max_iterations(1)
            .extract_exact()
            .unwrap();
        assert_eq!(scaffold.edge_count(), 15);
    }

    #[test]
    fn empty_set_is_rejected() {
        let graphs: Vec<UGraph<(), ()>> = Vec::new();
        assert!(matches!(
            detect_scaffold(&graphs, ScaffoldMode::Exact, Unlabeled),
            Err(Error::EmptyGraphSet)
        ));
        let graphs = vec![UGraph::<(), ()>::default()];
        assert!(matches!(
            detect_scaffold(&graphs, ScaffoldMode::Exact, Unlabeled),
            Err(Error::NoScaffoldsFound)
        ));
    }

    #[test]
    fn progress_can_stop_early() {
        let graphs = vec![path(3), cycle(4), cycle(5), cycle(6)];
        let mut calls = 0;
        let scaffold = ScaffoldDetection::new(&graphs, Unlabeled)
            .on_progress(|processed, total| {
                calls += 1;
                assert_eq!(total, 4);
                processed < 1
            })
            .extract_exact()
            .unwrap();
        assert_eq!(calls, 1);
        assert_eq!(scaffold.edge_count(), 2);
    }

    #[test]
    fn basket_grows_past_capacity() {
        let set = vec![path(2)];
        let mut basket = GraphBasket::new(&set).unwrap();
        for _ in 0..BASKET_CAPACITY + 5 {
            basket.add_to_next_empty_spot(&set[0], &[0, 1], &[0]);
        }
        assert_eq!(basket.slots.len(), BASKET_CAPACITY + BASKET_GROWTH);
        basket.check_added(&mut Unlabeled);
        assert_eq!(basket.active_count(), 1);
    }
}
