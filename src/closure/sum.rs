//! Per-pixel closure sums and breach accumulation.
//!
//! The dominant cost center of the whole check: O(loops x pixels). Each
//! loop's closure slab is an independent whole-array sum, so the loops are
//! computed in parallel with rayon and the per-measurement breach counts are
//! merged sequentially afterwards, which keeps the result identical to a
//! serial run (counter addition commutes, and slabs land at fixed indices).

use std::collections::HashMap;

use anyhow::{bail, Result};
use ndarray::{Array1, Array2, Array3, Axis, Zip};
use rayon::prelude::*;
use tracing::info;

use super::loops::WeightedLoop;
use super::{BreachStats, ClosureConfig};
use crate::edge::Edge;
use crate::stack::RasterStore;

/// Sum signed phases around every retained loop and aggregate breaches.
///
/// `edges` must be exactly the measurements covered by `loops` (the orphan
/// rule has already run) and its order fixes the measurement axis of the
/// breach-count and occurrence arrays.
///
/// Per loop: closure = Σ sign·phase over its signed edges, minus the
/// NaN-ignoring median of the slab when `subtract_median` is set. A pixel
/// breaches a loop when `|closure| > large_dev_thr`; NaN closures never
/// breach. Every breach increments the count of each measurement in that
/// loop at that pixel.
pub fn sum_phase_closures<S: RasterStore + ?Sized>(
    stack: &S,
    edges: &[Edge],
    loops: &[WeightedLoop],
    config: &ClosureConfig,
) -> Result<BreachStats> {
    let (rows, cols) = stack.dims();
    let n_ifgs = edges.len();

    let index: HashMap<Edge, usize> =
        edges.iter().enumerate().map(|(i, e)| (*e, i)).collect();
    for l in loops {
        for e in l.edges() {
            if !index.contains_key(&e) {
                bail!("loop references measurement {} absent from the working set", e);
            }
        }
    }

    // Phase reads go through the store once, up front; the parallel section
    // below is pure computation over the cached rasters.
    let phases: Vec<Array2<f32>> = edges
        .iter()
        .map(|e| stack.read_phase(e))
        .collect::<Result<_>>()?;

    info!(
        "Summing phase closures of {} loops over {} measurements ({} x {} pixels)",
        loops.len(),
        n_ifgs,
        rows,
        cols
    );

    let per_loop: Vec<(Array2<f32>, Array2<bool>)> = loops
        .par_iter()
        .map(|l| {
            let mut sum = Array2::<f32>::zeros((rows, cols));
            for se in l.signed_edges() {
                let factor = se.sign.factor();
                let phase = &phases[index[&se.edge]];
                Zip::from(&mut sum).and(phase).for_each(|s, &p| *s += factor * p);
            }
            if config.subtract_median {
                if let Some(median) = nan_median(sum.iter().copied()) {
                    sum.mapv_inplace(|v| v - median);
                }
            }
            let breach = sum.mapv(|v| v.abs() > config.large_dev_thr);
            (sum, breach)
        })
        .collect();

    let mut closure = Array3::<f32>::zeros((rows, cols, loops.len()));
    let mut breach_count = Array3::<u16>::zeros((rows, cols, n_ifgs));
    let mut occurrences = Array1::<u16>::zeros(n_ifgs);

    for (k, (l, (sum, breach))) in loops.iter().zip(per_loop).enumerate() {
        closure.index_axis_mut(Axis(2), k).assign(&sum);
        for e in l.edges() {
            let m = index[&e];
            occurrences[m] += 1;
            Zip::from(breach_count.index_axis_mut(Axis(2), m))
                .and(&breach)
                .for_each(|count, &breached| {
                    if breached {
                        *count += 1;
                    }
                });
        }
    }

    Ok(BreachStats {
        closure,
        breach_count,
        occurrences,
    })
}

/// Median of the finite values, ignoring NaN. Returns `None` when nothing is
/// finite. Even-length inputs average the two middle values, matching the
/// usual numeric-library convention.
pub(crate) fn nan_median(values: impl Iterator<Item = f32>) -> Option<f32> {
    let mut finite: Vec<f32> = values.filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_unstable_by(f32::total_cmp);
    let n = finite.len();
    if n % 2 == 1 {
        Some(finite[n / 2])
    } else {
        Some((finite[n / 2 - 1] + finite[n / 2]) / 2.0)
    }
}
