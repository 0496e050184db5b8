//! The outer fixed-point iteration over the retained measurement set.
//!
//! Each iteration re-enumerates loops from scratch, prunes them, aggregates
//! closure statistics, applies the pixel side effect and prunes the
//! measurement set. The iteration repeats until the retained set stops
//! changing, or aborts as soon as any loop-filtering stage comes up empty.
//! Because pruning only ever removes measurements, iteration count is
//! bounded by the input set size.

use anyhow::Result;
use ndarray::Array2;
use tracing::{info, warn};

use super::loops::{self, WeightedLoop};
use super::{detect, prune, sum};
use super::{BreachStats, ClosureConfig, ClosureResult, ClosureStatus, StageCounts};
use crate::edge::Edge;
use crate::stack::RasterStore;

/// What a single pass over the current measurement set produced.
enum Iteration {
    /// A loop-filtering stage came up empty; counts say which.
    Aborted(StageCounts),
    Complete(IterationData),
}

struct IterationData {
    retained: Vec<Edge>,
    loops: Vec<WeightedLoop>,
    stats: BreachStats,
    unwrap_error_map: Array2<u16>,
    counts: StageCounts,
}

/// Iterate the closure check to a stable set of measurements.
///
/// On convergence the result carries the retained set, the final loop list
/// and the last iteration's closure / breach / occurrence arrays. When loop
/// filtering leaves nothing usable the run aborts with
/// [`ClosureStatus::NoUsableLoops`] and per-stage survivor counts; the
/// caller decides whether to relax thresholds and re-invoke.
///
/// Pixel invalidation (NaN write-back through the store) is a side effect of
/// every iteration, including the final one.
pub fn filter_to_closure_checked_ifgs<S: RasterStore + ?Sized>(
    stack: &mut S,
    config: &ClosureConfig,
) -> Result<ClosureResult> {
    config.validate()?;

    let mut edges = stack.edges();
    edges.sort_unstable();
    info!(
        "Performing closure check on original set of {} measurements",
        edges.len()
    );

    let mut iterations = 0u32;
    loop {
        iterations += 1;
        match run_closure_check_once(stack, &edges, config)? {
            Iteration::Aborted(counts) => {
                warn!(
                    "No usable loops after iteration {}: {} candidate loops, \
                     {} within length bound, {} after count pruning (from {} \
                     measurements)",
                    iterations,
                    counts.candidate_loops,
                    counts.after_length_filter,
                    counts.after_count_prune,
                    counts.input_measurements
                );
                return Ok(ClosureResult::aborted(iterations, counts));
            }
            Iteration::Complete(data) => {
                if let Some(dir) = &config.output_dir {
                    let iter_dir = dir.join(format!("closure_iter_{iterations:02}"));
                    crate::persist::save_closure_results(&iter_dir, &data.stats, &data.loops)?;
                    if config.plot_closure {
                        let png = iter_dir.join("closure.png");
                        if let Err(err) = crate::plot::plot_closure(
                            &data.stats.closure,
                            &data.loops,
                            config.large_dev_thr,
                            &png,
                        ) {
                            // Plotting is fire-and-forget; never fail the run.
                            warn!("Closure plot failed: {err:#}");
                        }
                    }
                }

                // Pruning only removes measurements, so the candidate set is
                // a subset of the current one and full-identity comparison
                // costs the same as the size check while also guarding
                // against equal-size oscillation.
                if data.retained == edges {
                    info!(
                        "After closure check {} measurements are retained \
                         ({} iterations)",
                        edges.len(),
                        iterations
                    );
                    return Ok(ClosureResult {
                        status: ClosureStatus::Converged,
                        retained: edges,
                        loops: data.loops,
                        stats: Some(data.stats),
                        unwrap_error_map: Some(data.unwrap_error_map),
                        iterations,
                        stage_counts: data.counts,
                    });
                }
                edges = data.retained;
            }
        }
    }
}

/// One full pass: enumerate, order, filter, cap, sum, detect, prune.
fn run_closure_check_once<S: RasterStore + ?Sized>(
    stack: &mut S,
    edges: &[Edge],
    config: &ClosureConfig,
) -> Result<Iteration> {
    let mut counts = StageCounts {
        input_measurements: edges.len(),
        ..Default::default()
    };

    let candidates = loops::sorted_signed_loops(edges, config.max_loop_length);
    counts.candidate_loops = candidates.len();

    let within_length = prune::retain_loops_within_length(candidates, config.max_loop_length);
    counts.after_length_filter = within_length.len();
    if within_length.is_empty() {
        return Ok(Iteration::Aborted(counts));
    }
    info!(
        "After applying max_loop_length={} criteria, {} loops are retained",
        config.max_loop_length,
        within_length.len()
    );

    let retained_loops =
        prune::discard_loops_over_ifg_cap(within_length, config.max_loops_in_ifg);
    counts.after_count_prune = retained_loops.len();
    if retained_loops.is_empty() {
        return Ok(Iteration::Aborted(counts));
    }
    info!(
        "After applying max_loops_in_ifg={} criteria, {} loops are retained",
        config.max_loops_in_ifg,
        retained_loops.len()
    );

    let edges_in_loops = prune::retain_edges_in_loops(edges, &retained_loops);
    counts.measurements_in_loops = edges_in_loops.len();

    let stats = sum::sum_phase_closures(stack, &edges_in_loops, &retained_loops, config)?;
    let unwrap_error_map = detect::detect_pix_with_unwrapping_errors(
        stack,
        &edges_in_loops,
        &stats,
        config.phs_unw_err_thr,
    )?;
    let retained =
        prune::retain_edges_within_threshold(&edges_in_loops, &stats, config);

    Ok(Iteration::Complete(IterationData {
        retained,
        loops: retained_loops,
        stats,
        unwrap_error_map,
        counts,
    }))
}
