use derive_new::new;
use serde_derive::{Deserialize, Serialize};

/// A vertex of the input graph. Values are replaced wholesale between supersteps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, new)]
pub struct Vertex<K, VV> {
    pub id: K,
    pub value: VV,
}

/// A directed edge. Edges are immutable for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, new)]
pub struct Edge<K, EV> {
    pub source: K,
    pub target: K,
    pub value: EV,
}

/// A message produced in one superstep and delivered to `target` in the next.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Envelope<K, M> {
    pub target: K,
    pub payload: M,
}

/// Which edges of a vertex are visible to its compute invocation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum EdgeDirection {
    /// Edges whose source is the vertex; neighbors are the targets.
    Out,
    /// Edges whose target is the vertex; neighbors are the sources.
    In,
    /// Both of the above. A self-loop is seen once in each direction.
    All,
}

impl EdgeDirection {
    pub fn description(self) -> &'static str {
        match self {
            EdgeDirection::Out => "out",
            EdgeDirection::In => "in",
            EdgeDirection::All => "all",
        }
    }
}

impl std::fmt::Display for EdgeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        write!(f, "{}", self.description())
    }
}

impl Default for EdgeDirection {
    fn default() -> Self {
        EdgeDirection::Out
    }
}

/// An entry in a vertex's adjacency list: the neighbor reached over the edge and the edge's
/// position in the run's edge set.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct AdjacentEdge<K> {
    pub neighbor: K,
    pub edge_index: usize,
}

/// Lazy, forward-only view over the edges of one vertex.
///
/// Borrows the run's immutable edge storage rather than the invocation context, so messages can
/// be sent while iterating.
pub struct Edges<'a, K, EV> {
    edges: &'a [Edge<K, EV>],
    adjacent: std::slice::Iter<'a, AdjacentEdge<K>>,
}

impl<'a, K, EV> Edges<'a, K, EV> {
    pub fn new(edges: &'a [Edge<K, EV>], adjacent: &'a [AdjacentEdge<K>]) -> Self {
        Self { edges, adjacent: adjacent.iter() }
    }
}

impl<'a, K, EV> Iterator for Edges<'a, K, EV> {
    type Item = &'a Edge<K, EV>;

    fn next(&mut self) -> Option<Self::Item> {
        let edges = self.edges;
        self.adjacent.next().map(|adjacent| &edges[adjacent.edge_index])
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.adjacent.size_hint()
    }
}

impl<'a, K, EV> ExactSizeIterator for Edges<'a, K, EV> {}
