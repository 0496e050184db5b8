//! Pixel-level unwrap-error detection and stack-wide invalidation.

use anyhow::Result;
use ndarray::{Array2, Axis, Zip};
use tracing::info;

use super::BreachStats;
use crate::edge::Edge;
use crate::stack::RasterStore;

/// Count, per pixel, how many measurements breached in *every* loop they
/// participated in, and invalidate pixels that reach `phs_unw_err_thr`.
///
/// A measurement flags a pixel only when `breach_count == occurrences` there
/// — breaching in merely some of its loops is not enough. Pixels whose flag
/// count reaches the threshold are NaN-masked in the phase data of *all*
/// retained measurements, not just the flagged ones: one consistently bad
/// minority is grounds to distrust the pixel everywhere. Returns the
/// per-pixel flag-count map.
pub fn detect_pix_with_unwrapping_errors<S: RasterStore + ?Sized>(
    stack: &mut S,
    edges: &[Edge],
    stats: &BreachStats,
    phs_unw_err_thr: u16,
) -> Result<Array2<u16>> {
    let (rows, cols, n_ifgs) = stats.breach_count.dim();
    debug_assert_eq!(n_ifgs, edges.len());

    let mut pix_unwrap_error = Array2::<u16>::zeros((rows, cols));
    for m in 0..n_ifgs {
        let occurrences = stats.occurrences[m];
        if occurrences == 0 {
            continue;
        }
        Zip::from(&mut pix_unwrap_error)
            .and(stats.breach_count.index_axis(Axis(2), m))
            .for_each(|err, &count| {
                if count == occurrences {
                    *err += 1;
                }
            });
    }

    let mask = pix_unwrap_error.mapv(|c| c >= phs_unw_err_thr);
    let flagged = mask.iter().filter(|&&m| m).count();
    if flagged > 0 {
        info!(
            "Updating phase data of {} retained measurements: {} of {} pixels \
             carry unwrapping errors in {} or more measurements",
            edges.len(),
            flagged,
            rows * cols,
            phs_unw_err_thr
        );
        for e in edges {
            stack.set_invalid(e, &mask)?;
        }
    }

    Ok(pix_unwrap_error)
}
