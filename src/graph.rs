//! Graph plumbing shared by every search in the crate.
//!
//! All algorithms run over `petgraph` stable graphs so that vertex and edge
//! ids survive removals. [`Topology`] snapshots the shape of one graph into
//! plain `usize` tables: adjacency lists sorted by neighbour id, edge
//! endpoints, and an endpoint-pair lookup.

use std::collections::{HashMap, VecDeque};

use petgraph::{
    stable_graph::{EdgeIndex, NodeIndex, StableGraph},
    visit::{EdgeRef, IntoEdgeReferences, NodeIndexable, EdgeIndexable},
    Undirected,
};

pub type Index = u32;

/// Undirected graph with stable ids, the common currency of this crate.
pub type UGraph<N, E> = StableGraph<N, E, Undirected, Index>;

/// Shorthand for turning a plain vertex id into a petgraph index.
pub fn node(v: usize) -> NodeIndex<Index> {
    NodeIndex::new(v)
}

/// Shorthand for turning a plain edge id into a petgraph index.
pub fn edge(e: usize) -> EdgeIndex<Index> {
    EdgeIndex::new(e)
}

/// Read-only snapshot of a graph's shape.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    vertices: Vec<usize>,
    edges: Vec<usize>,
    ends: Vec<Option<(usize, usize)>>,
    adjacency: Vec<Vec<(usize, usize)>>,
    lookup: HashMap<(usize, usize), usize>,
}

impl Topology {
    pub fn new<N, E>(g: &UGraph<N, E>) -> Self {
        let mut adjacency = vec![Vec::new(); g.node_bound()];
        let mut ends = vec![None; g.edge_bound()];
        let mut lookup = HashMap::with_capacity(g.edge_count());

        let vertices = g.node_indices().map(|n| n.index()).collect::<Vec<_>>();
        let mut edges = Vec::with_capacity(g.edge_count());

        for e in g.edge_references() {
            let (u, v, id) = (e.source().index(), e.target().index(), e.id().index());
            ends[id] = Some((u, v));
            adjacency[u].push((v, id));
            if u != v {
                adjacency[v].push((u, id));
            }
            lookup.entry(key(u, v)).or_insert(id);
            edges.push(id);
        }

        for list in adjacency.iter_mut() {
            list.sort_unstable();
        }
        let mut vertices = vertices;
        vertices.sort_unstable();
        edges.sort_unstable();

        Self {
            vertices,
            edges,
            ends,
            adjacency,
            lookup,
        }
    }

    /// One past the largest vertex id.
    pub fn vertex_end(&self) -> usize {
        self.adjacency.len()
    }

    /// One past the largest edge id.
    pub fn edge_end(&self) -> usize {
        self.ends.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Live vertex ids in ascending order.
    pub fn vertices(&self) -> &[usize] {
        &self.vertices
    }

    /// Live edge ids in ascending order.
    pub fn edges(&self) -> &[usize] {
        &self.edges
    }

    pub fn has_vertex(&self, v: usize) -> bool {
        self.vertices.binary_search(&v).is_ok()
    }

    /// Endpoints `(beg, end)` of a live edge.
    pub fn ends(&self, e: usize) -> (usize, usize) {
        self.ends.get(e).copied().flatten().unwrap_or_default()
    }

    /// `(neighbour, edge)` pairs sorted by neighbour.
    pub fn neighbors(&self, v: usize) -> &[(usize, usize)] {
        self.adjacency.get(v).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn degree(&self, v: usize) -> usize {
        self.neighbors(v).len()
    }

    pub fn find_edge(&self, u: usize, v: usize) -> Option<usize> {
        self.lookup.get(&key(u, v)).copied()
    }

    /// Label each vertex with a component number, restricted to the vertices
    /// accepted by `keep` and the edges accepted by `keep_edge`. Components
    /// are numbered in order of their smallest vertex.
    pub fn components(
        &self,
        keep: impl Fn(usize) -> bool,
        keep_edge: impl Fn(usize) -> bool,
    ) -> (usize, Vec<Option<usize>>) {
        let mut label = vec![None; self.vertex_end()];
        let mut count = 0;
        let mut queue = VecDeque::new();

        for &start in &self.vertices {
            if label[start].is_some() || !keep(start) {
                continue;
            }
            label[start] = Some(count);
            queue.push_back(start);
            while let Some(v) = queue.pop_front() {
                for &(w, e) in self.neighbors(v) {
                    if label[w].is_none() && keep(w) && keep_edge(e) {
                        label[w] = Some(count);
                        queue.push_back(w);
                    }
                }
            }
            count += 1;
        }

        (count, label)
    }
}

fn key(u: usize, v: usize) -> (usize, usize) {
    if u <= v {
        (u, v)
    } else {
        (v, u)
    }
}

/// Build a fresh graph holding `vertices` and `edges` of `g`, in list order.
/// Endpoints of listed edges are added even if they are missing from
/// `vertices`. Returns the graph and the old-to-new vertex map.
pub fn edge_subgraph<N: Clone, E: Clone>(
    g: &UGraph<N, E>,
    vertices: &[usize],
    edges: &[usize],
) -> (UGraph<N, E>, Vec<Option<usize>>) {
    let mut out = UGraph::with_capacity(vertices.len(), edges.len());
    let mut map = vec![None; g.node_bound()];

    let insert = |out: &mut UGraph<N, E>, map: &mut Vec<Option<usize>>, v: usize| {
        if map[v].is_none() {
            if let Some(w) = g.node_weight(node(v)) {
                map[v] = Some(out.add_node(w.clone()).index());
            }
        }
        map[v]
    };

    for &v in vertices {
        insert(&mut out, &mut map, v);
    }
    for &e in edges {
        let Some((u, v)) = g.edge_endpoints(edge(e)) else {
            continue;
        };
        let Some(w) = g.edge_weight(edge(e)) else {
            continue;
        };
        let (Some(nu), Some(nv)) = (
            insert(&mut out, &mut map, u.index()),
            insert(&mut out, &mut map, v.index()),
        ) else {
            continue;
        };
        out.add_edge(node(nu), node(nv), w.clone());
    }

    (out, map)
}

/// Build the subgraph of `g` induced by the vertices accepted by `keep`.
/// Returns the graph and the old-to-new vertex map.
pub fn induced_subgraph<N: Clone, E: Clone>(
    g: &UGraph<N, E>,
    keep: impl Fn(usize) -> bool,
) -> (UGraph<N, E>, Vec<Option<usize>>) {
    let mut out = UGraph::default();
    let mut map = vec![None; g.node_bound()];

    let mut vertices = g.node_indices().collect::<Vec<_>>();
    vertices.sort_unstable();
    for v in vertices {
        if keep(v.index()) {
            map[v.index()] = Some(out.add_node(g[v].clone()).index());
        }
    }

    let mut edges = g.edge_indices().collect::<Vec<_>>();
    edges.sort_unstable();
    for e in edges {
        let Some((u, v)) = g.edge_endpoints(e) else {
            continue;
        };
        if let (Some(nu), Some(nv)) = (map[u.index()], map[v.index()]) {
            out.add_edge(node(nu), node(nv), g[e].clone());
        }
    }

    (out, map)
}

/// Invert a partial map. `size` is the length of the result.
pub fn invert_map(map: &[Option<usize>], size: usize) -> Vec<Option<usize>> {
    let mut inv = vec![None; size];
    for (i, m) in map.iter().enumerate() {
        if let Some(j) = *m {
            if j < size {
                inv[j] = Some(i);
            }
        }
    }
    inv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(n: usize) -> UGraph<(), ()> {
        let mut g = UGraph::default();
        let nodes = (0..n).map(|_| g.add_node(())).collect::<Vec<_>>();
        for w in nodes.windows(2) {
            g.add_edge(w[0], w[1], ());
        }
        g
    }

    #[test]
    fn topology_survives_removal() {
        let mut g = path(4);
        g.remove_node(node(1));
        let t = Topology::new(&g);
        assert_eq!(t.vertex_end(), 4);
        assert_eq!(t.vertices(), &[0, 2, 3]);
        assert_eq!(t.edge_count(), 1);
        assert!(t.find_edge(3, 2).is_some());
        assert!(t.find_edge(0, 2).is_none());
    }

    #[test]
    fn components_split_on_removed_edge() {
        let g = path(5);
        let t = Topology::new(&g);
        let cut = t.find_edge(1, 2).unwrap();
        let (count, label) = t.components(|_| true, |e| e != cut);
        assert_eq!(count, 2);
        assert_eq!(label[0], label[1]);
        assert_ne!(label[1], label[2]);
    }

    #[test]
    fn edge_subgraph_keeps_listed_edges() {
        let g = path(5);
        let t = Topology::new(&g);
        let e = t.find_edge(2, 3).unwrap();
        let (sub, map) = edge_subgraph(&g, &[2, 3], &[e]);
        assert_eq!(sub.node_count(), 2);
        assert_eq!(sub.edge_count(), 1);
        assert_eq!(map[2], Some(0));
        assert_eq!(map[0], None);
    }
}
