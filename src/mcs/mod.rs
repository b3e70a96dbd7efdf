//! Maximum common subgraph search.
//!
//! [`MaxCommonSubgraph`] runs either the exact resolution-graph search or
//! the approximate greedy plus random descent search over two graphs and a
//! [`Matcher`]. [`SubstructureMcs`] is the cheap containment test used to
//! skip the full search when one graph already embeds in the other.

mod approximate;
mod regraph;
mod substructure;

use std::cmp::Ordering;

use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, instrument};

use crate::{
    cancel::Cancellation,
    error::Result,
    graph::{Topology, UGraph},
    matching::Matcher,
};

pub(crate) use regraph::ReGraph;
pub use substructure::SubstructureMcs;

use approximate::{greedy, AdjMatrices, RandomDescent};

/// One common subgraph: `vertex_map[v]` is the image in the second graph of
/// vertex `v` of the first, `edge_map[e]` likewise for edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McsSolution {
    pub vertex_map: Vec<Option<usize>>,
    pub edge_map: Vec<Option<usize>>,
}

impl McsSolution {
    pub fn vertex_count(&self) -> usize {
        self.vertex_map.iter().flatten().count()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_map.iter().flatten().count()
    }
}

/// Sorted vertex ids and edge ids of a solution on one side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolutionList {
    pub vertices: Vec<usize>,
    pub edges: Vec<usize>,
}

/// Comparator used to order solution lists, best first.
pub type SolutionOrder = fn(&McsSolution, &McsSolution) -> Ordering;

/// Default order: more independent rings first, then more edges.
pub fn ring_order(a: &McsSolution, b: &McsSolution) -> Ordering {
    let rings = |s: &McsSolution| s.edge_count() as isize - s.vertex_count() as isize;
    rings(b)
        .cmp(&rings(a))
        .then_with(|| b.edge_count().cmp(&a.edge_count()))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExactParams {
    /// Cap on resolution-graph branch expansions; `None` is unlimited.
    pub max_iteration: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApproximateParams {
    /// Descent steps per participating vertex.
    pub max_iteration: usize,
    /// Seed the generator from entropy instead of `seed`.
    pub randomize: bool,
    pub seed: u64,
}

impl Default for ApproximateParams {
    fn default() -> Self {
        Self {
            max_iteration: 1000,
            randomize: false,
            seed: 54217137,
        }
    }
}

/// Partial vertex mapping of the first graph into the second to extend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct McsInput {
    pub incoming_map: Vec<Option<usize>>,
    pub strict_incoming_map: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ExactResult {
    pub solutions: Vec<McsSolution>,
    /// The iteration cap or the solution callback ended the search early;
    /// `solutions` may then miss larger subgraphs.
    pub stopped: bool,
    pub sub_lists: Vec<SolutionList>,
    pub super_lists: Vec<SolutionList>,
}

#[derive(Debug, Clone, Default)]
pub struct ApproximateResult {
    pub solutions: Vec<McsSolution>,
    /// Edges of the first graph not preserved by the final assignment.
    pub error: usize,
}

/// Common subgraph search between `sub` and `sup`.
pub struct MaxCommonSubgraph<'a, N, E, M> {
    sub: &'a UGraph<N, E>,
    sup: &'a UGraph<N, E>,
    matcher: M,
    exact: ExactParams,
    approximate: ApproximateParams,
    input: McsInput,
    cancel: Option<Cancellation>,
    order: SolutionOrder,
    on_solution: Option<Box<dyn FnMut(&[Option<usize>]) -> bool + 'a>>,
}

impl<'a, N, E, M: Matcher<N, E>> MaxCommonSubgraph<'a, N, E, M> {
    pub fn new(sub: &'a UGraph<N, E>, sup: &'a UGraph<N, E>, matcher: M) -> Self {
        Self {
            sub,
            sup,
            matcher,
            exact: ExactParams::default(),
            approximate: ApproximateParams::default(),
            input: McsInput::default(),
            cancel: None,
            order: ring_order,
            on_solution: None,
        }
    }

    pub fn with_exact_params(mut self, params: ExactParams) -> Self {
        self.exact = params;
        self
    }

    pub fn with_approximate_params(mut self, params: ApproximateParams) -> Self {
        self.approximate = params;
        self
    }

    pub fn with_input(mut self, input: McsInput) -> Self {
        self.input = input;
        self
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_order(mut self, order: SolutionOrder) -> Self {
        self.order = order;
        self
    }

    /// Called with the edge map of every clique the exact search stores.
    /// Returning `false` stops the search.
    pub fn on_solution(mut self, callback: impl FnMut(&[Option<usize>]) -> bool + 'a) -> Self {
        self.on_solution = Some(Box::new(callback));
        self
    }

    /// Exact search. Graphs with at most one vertex on either side are
    /// resolved directly without building the resolution graph.
    #[instrument(level = "trace", skip_all)]
    pub fn find_exact(&mut self) -> Result<ExactResult> {
        if let Some(result) = self.trivial() {
            return Ok(result);
        }

        let cancel = self.cancel.as_ref();
        let mut accept_all = |_: &[Option<usize>]| true;
        let on_solution: &mut dyn FnMut(&[Option<usize>]) -> bool = match self.on_solution.as_mut() {
            Some(callback) => callback.as_mut(),
            None => &mut accept_all,
        };

        let mut regraph = ReGraph::build(self.sub, self.sup, &mut self.matcher, cancel)?;
        regraph.set_max_iteration(self.exact.max_iteration);
        let find_all = regraph.seed(
            &mut self.matcher,
            &self.input.incoming_map,
            self.input.strict_incoming_map,
            on_solution,
        )?;
        regraph.parse(find_all, cancel, on_solution)?;

        // Sort maps and both list sides together so index `i` is one solution.
        let order = self.order;
        let mut ranked = regraph
            .solution_maps(&mut self.matcher)
            .into_iter()
            .zip(regraph.solution_lists_sub())
            .zip(regraph.solution_lists_super())
            .collect::<Vec<_>>();
        ranked.sort_by(|((a, _), _), ((b, _), _)| order(a, b));
        let (pairs, super_lists): (Vec<_>, Vec<_>) = ranked.into_iter().unzip();
        let (solutions, sub_lists): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        debug!(
            solutions = solutions.len(),
            stopped = regraph.stopped(),
            "exact mcs finished"
        );

        Ok(ExactResult {
            solutions,
            stopped: regraph.stopped(),
            sub_lists,
            super_lists,
        })
    }

    fn trivial(&mut self) -> Option<ExactResult> {
        let sub_top = Topology::new(self.sub);
        let sup_top = Topology::new(self.sup);
        let (n_sub, n_sup) = (sub_top.vertex_count(), sup_top.vertex_count());

        if n_sub > 1 && n_sup > 1 {
            return None;
        }

        let pair = if n_sub == 1 {
            let v_sub = sub_top.vertices()[0];
            sup_top
                .vertices()
                .iter()
                .copied()
                .find(|&v_sup| self.matcher.match_vertex(self.sub, self.sup, &[], v_sub, v_sup))
                .map(|v_sup| (v_sub, v_sup))
        } else if n_sup == 1 {
            let v_sup = sup_top.vertices()[0];
            sub_top
                .vertices()
                .iter()
                .copied()
                .find(|&v_sub| self.matcher.match_vertex(self.sub, self.sup, &[], v_sub, v_sup))
                .map(|v_sub| (v_sub, v_sup))
        } else {
            None
        };

        let mut result = ExactResult::default();
        if let Some((v_sub, v_sup)) = pair {
            let mut vertex_map = vec![None; sub_top.vertex_end()];
            vertex_map[v_sub] = Some(v_sup);
            result.solutions.push(McsSolution {
                vertex_map,
                edge_map: vec![None; sub_top.edge_end()],
            });
            result.sub_lists.push(SolutionList {
                vertices: vec![v_sub],
                edges: Vec::new(),
            });
            result.super_lists.push(SolutionList {
                vertices: vec![v_sup],
                edges: Vec::new(),
            });
        }
        debug!(found = pair.is_some(), "trivial mcs");
        Some(result)
    }

    /// Approximate search: greedy assignment refined by random descent.
    #[instrument(level = "trace", skip_all)]
    pub fn find_approximate(&mut self) -> Result<ApproximateResult> {
        let params = self.approximate;
        let mut rng = if params.randomize {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(params.seed)
        };

        let mut store = AdjMatrices::new(
            self.sub,
            self.sup,
            &mut self.matcher,
            &self.input.incoming_map,
            &mut rng,
        );
        greedy(&mut store);
        let mut descent = RandomDescent::new(&mut rng, params.max_iteration);
        descent.refine(&mut store, self.cancel.as_ref())?;

        let mut solutions = store.solutions();
        solutions.sort_by(self.order);
        debug!(
            solutions = solutions.len(),
            error = descent.error(),
            "approximate mcs finished"
        );

        Ok(ApproximateResult {
            solutions,
            error: descent.error(),
        })
    }
}

/// Exact common subgraphs of `sub` and `sup`, best first.
pub fn find_exact_mcs<N, E, M: Matcher<N, E>>(
    sub: &UGraph<N, E>,
    sup: &UGraph<N, E>,
    matcher: M,
    params: ExactParams,
) -> Result<ExactResult> {
    MaxCommonSubgraph::new(sub, sup, matcher)
        .with_exact_params(params)
        .find_exact()
}

/// Approximate common subgraphs of `sub` and `sup`, best first.
pub fn find_approximate_mcs<N, E, M: Matcher<N, E>>(
    sub: &UGraph<N, E>,
    sup: &UGraph<N, E>,
    matcher: M,
    params: ApproximateParams,
) -> Result<ApproximateResult> {
    MaxCommonSubgraph::new(sub, sup, matcher)
        .with_approximate_params(params)
        .find_approximate()
}
