//! Greedy pruning of loops and measurements.
//!
//! Three stages, all order-sensitive and therefore fed from the sorted loop
//! list produced by [`super::loops::sort_loops`]:
//!
//! - length filtering drops over-long loops outright;
//! - the count pruner caps how often any one measurement may recur across
//!   the retained loops;
//! - measurement pruning drops orphans (no loop coverage) and measurements
//!   whose breach statistics jointly exceed the configured thresholds.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::loops::WeightedLoop;
use super::{BreachStats, ClosureConfig};
use crate::edge::Edge;

/// Drop loops with more than `max_loop_length` edges.
pub fn retain_loops_within_length(
    loops: Vec<WeightedLoop>,
    max_loop_length: usize,
) -> Vec<WeightedLoop> {
    loops
        .into_iter()
        .filter(|l| l.len() <= max_loop_length)
        .collect()
}

/// Greedily cap per-measurement loop membership.
///
/// Walks the sorted loop list once with a usage counter per edge, created
/// fresh for this call. A loop is discarded only when *every* one of its
/// edges has already been used more than `max_loops_in_ifg` times; a single
/// under-used edge admits the loop, and admission bumps the counter of every
/// edge, including the already-saturated ones. The outcome is only
/// deterministic because the input order is.
pub fn discard_loops_over_ifg_cap(
    loops: Vec<WeightedLoop>,
    max_loops_in_ifg: u32,
) -> Vec<WeightedLoop> {
    let mut usage: HashMap<Edge, u32> = HashMap::new();
    let mut selected = Vec::with_capacity(loops.len());
    for l in loops {
        let saturated = l
            .edges()
            .all(|e| usage.get(&e).copied().unwrap_or(0) > max_loops_in_ifg);
        if saturated {
            debug!(
                "Discarding loop of weight {} with {} edges: every member \
                 measurement already appears in more than {} retained loops",
                l.weight(),
                l.len(),
                max_loops_in_ifg
            );
            continue;
        }
        for e in l.edges() {
            *usage.entry(e).or_insert(0) += 1;
        }
        selected.push(l);
    }
    selected
}

/// Orphan rule: keep only measurements covered by at least one retained loop.
pub fn retain_edges_in_loops(edges: &[Edge], loops: &[WeightedLoop]) -> Vec<Edge> {
    let covered: HashSet<Edge> = loops.iter().flat_map(|l| l.edges()).collect();
    let selected: Vec<Edge> = edges
        .iter()
        .copied()
        .filter(|e| covered.contains(e))
        .collect();
    if selected.len() != edges.len() {
        tracing::info!(
            "Only {} of the original {} measurements participate in one or \
             more loops and are selected for further analysis",
            selected.len(),
            edges.len()
        );
    }
    selected
}

/// Threshold rule: drop measurements whose occurrence count *and* average
/// breach fraction both exceed their thresholds.
///
/// The average breach fraction is the total breach count of the measurement
/// over all pixels, divided by its occurrence count and the pixel count — a
/// per-loop, per-pixel breach rate. Either condition alone never drops a
/// measurement, and one with zero occurrences is kept: there is no data to
/// judge it on.
pub fn retain_edges_within_threshold(
    edges: &[Edge],
    stats: &BreachStats,
    config: &ClosureConfig,
) -> Vec<Edge> {
    let (rows, cols, n_ifgs) = stats.breach_count.dim();
    debug_assert_eq!(n_ifgs, edges.len());
    let cells = (rows * cols) as f64;

    let mut selected = Vec::with_capacity(edges.len());
    for (i, e) in edges.iter().enumerate() {
        let occurrences = stats.occurrences[i];
        if occurrences == 0 {
            selected.push(*e);
            continue;
        }
        let total_breaches: u64 = stats
            .breach_count
            .index_axis(ndarray::Axis(2), i)
            .iter()
            .map(|&b| b as u64)
            .sum();
        let avg_breach = total_breaches as f64 / occurrences as f64 / cells;
        let drop = occurrences > config.loops_thr_ifg
            && avg_breach > config.avg_ifg_err_thr as f64;
        if drop {
            debug!(
                "Dropping measurement {}: occurs in {} loops (> {}) with \
                 average breach fraction {:.4} (> {})",
                e, occurrences, config.loops_thr_ifg, avg_breach, config.avg_ifg_err_thr
            );
        } else {
            selected.push(*e);
        }
    }
    selected
}
