//! Loop enumeration and ordering for the temporal measurement graph.
//!
//! Acquisition dates are graph nodes and measurements are undirected edges.
//! [`find_signed_loops`] enumerates every simple cycle up to a maximum edge
//! count, assigning each traversed edge a sign relative to its canonical
//! (earlier -> later) direction. [`sort_loops`] then imposes the total order
//! every downstream greedy step depends on: weight ascending, then edge
//! count, then the lexicographic date sequence. The tie-break fields are
//! explicit so that re-runs on identical input always produce identical
//! ordering, independent of any container iteration order.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::edge::{Edge, EdgeSign, SignedEdge};

/// A closed cycle of signed measurement edges with a scalar sort weight.
///
/// The weight is the summed temporal baseline (days) of the member edges, so
/// short-baseline loops order first. Walking the signed edges in sequence
/// returns to the starting date; [`WeightedLoop::is_closed`] checks this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedLoop {
    edges: Vec<SignedEdge>,
    weight: i64,
}

impl WeightedLoop {
    /// Build a loop from its signed edges; the weight is derived.
    pub fn new(edges: Vec<SignedEdge>) -> Self {
        let weight = edges.iter().map(|se| se.edge.span_days()).sum();
        Self { edges, weight }
    }

    /// Number of edges in the loop.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Summed temporal baseline in days.
    pub fn weight(&self) -> i64 {
        self.weight
    }

    /// The signed edges in traversal order.
    pub fn signed_edges(&self) -> &[SignedEdge] {
        &self.edges
    }

    /// The distinct unsigned edges of the loop, in traversal order.
    ///
    /// A simple cycle never repeats an edge, so no dedup is needed.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.edges.iter().map(|se| se.edge)
    }

    /// Whether the loop contains the given measurement, ignoring sign.
    pub fn contains(&self, edge: &Edge) -> bool {
        self.edges.iter().any(|se| se.edge == *edge)
    }

    /// Whether walking the signed edges in order returns to the start date.
    pub fn is_closed(&self) -> bool {
        if self.edges.is_empty() {
            return false;
        }
        let start = self.edges[0].start();
        let mut at = start;
        for se in &self.edges {
            if se.start() != at {
                return false;
            }
            at = se.end();
        }
        at == start
    }

    /// Flattened canonical date sequence, the final sort tie-breaker.
    fn date_key(&self) -> Vec<NaiveDate> {
        self.edges
            .iter()
            .flat_map(|se| [se.edge.first, se.edge.second])
            .collect()
    }
}

/// Enumerate all simple cycles of 3..=`max_loop_length` edges.
///
/// Each cycle is anchored at its smallest date and emitted exactly once: the
/// two traversal directions of the same cycle are collapsed by requiring the
/// node after the anchor to order before the node preceding it. Signs are
/// assigned per traversal step, `Forward` when the step runs from the edge's
/// earlier to its later date.
///
/// An acyclic graph (or one with no cycle within the bound) yields an empty
/// vector; that is a valid result, not an error.
pub fn find_signed_loops(edges: &[Edge], max_loop_length: usize) -> Vec<WeightedLoop> {
    let mut adjacency: BTreeMap<NaiveDate, BTreeSet<NaiveDate>> = BTreeMap::new();
    for e in edges {
        if e.first == e.second {
            continue; // degenerate measurement, cannot participate in a cycle
        }
        adjacency.entry(e.first).or_default().insert(e.second);
        adjacency.entry(e.second).or_default().insert(e.first);
    }

    let mut loops = Vec::new();
    if max_loop_length < 3 {
        return loops;
    }

    let nodes: Vec<NaiveDate> = adjacency.keys().copied().collect();
    let mut path: Vec<NaiveDate> = Vec::with_capacity(max_loop_length);
    for &anchor in &nodes {
        path.clear();
        path.push(anchor);
        extend_cycles(&adjacency, anchor, max_loop_length, &mut path, &mut loops);
    }

    debug!(
        "Found {} simple cycles with <= {} edges among {} measurements",
        loops.len(),
        max_loop_length,
        edges.len()
    );
    loops
}

/// Depth-first cycle extension. Only nodes ordering after the anchor are
/// visited, which pins the anchor as the cycle minimum and prevents the same
/// cycle being found from several starting points.
fn extend_cycles(
    adjacency: &BTreeMap<NaiveDate, BTreeSet<NaiveDate>>,
    anchor: NaiveDate,
    max_loop_length: usize,
    path: &mut Vec<NaiveDate>,
    out: &mut Vec<WeightedLoop>,
) {
    let at = *path.last().unwrap();
    for &next in &adjacency[&at] {
        if next == anchor {
            // Closing edge. Drop the reverse duplicate of each cycle by
            // keeping only the direction whose second node precedes its last.
            if path.len() >= 3 && path[1] < path[path.len() - 1] {
                out.push(loop_from_nodes(path));
            }
            continue;
        }
        if next <= anchor || path.contains(&next) {
            continue;
        }
        if path.len() == max_loop_length {
            continue;
        }
        path.push(next);
        extend_cycles(adjacency, anchor, max_loop_length, path, out);
        path.pop();
    }
}

/// Convert a node walk (closing back to the first node) into signed edges.
fn loop_from_nodes(path: &[NaiveDate]) -> WeightedLoop {
    let mut signed = Vec::with_capacity(path.len());
    for i in 0..path.len() {
        let a = path[i];
        let b = path[(i + 1) % path.len()];
        let sign = if a < b {
            EdgeSign::Forward
        } else {
            EdgeSign::Reverse
        };
        signed.push(SignedEdge::new(Edge::new(a, b), sign));
    }
    WeightedLoop::new(signed)
}

/// Impose the deterministic total order used by all greedy pruning steps:
/// weight ascending, then edge count, then lexicographic date sequence.
pub fn sort_loops(loops: &mut Vec<WeightedLoop>) {
    loops.sort_by_cached_key(|l| (l.weight(), l.len(), l.date_key()));
}

/// Enumerate and sort in one step, the order the checker consumes them in.
pub fn sorted_signed_loops(edges: &[Edge], max_loop_length: usize) -> Vec<WeightedLoop> {
    let mut loops = find_signed_loops(edges, max_loop_length);
    sort_loops(&mut loops);
    loops
}
