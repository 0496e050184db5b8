//! Iterative loop-closure consistency checking.
//!
//! Summing signed phase differences around any closed cycle of measurements
//! in the temporal graph should, absent unwrapping errors, be near zero.
//! This module exploits that property to prune corrupted measurements:
//!
//! 1. **Loop enumeration**: find all simple cycles up to a maximum edge
//!    count and order them deterministically ([`loops`]).
//! 2. **Loop pruning**: drop over-long loops and greedily cap how many
//!    retained loops may reference any single measurement ([`prune`]).
//! 3. **Closure sums**: per pixel and loop, sum the signed phases and count
//!    threshold breaches per measurement ([`sum`]).
//! 4. **Pixel masking**: pixels that breach in every loop of enough
//!    measurements are invalidated across the whole stack ([`detect`]).
//! 5. **Measurement pruning**: drop orphaned and persistently-breaching
//!    measurements, then repeat from 1 until the retained set is stable
//!    ([`check`]).

pub mod check;
pub mod detect;
pub mod loops;
pub mod prune;
pub mod sum;

use std::path::PathBuf;

use anyhow::{ensure, Result};
use ndarray::{Array1, Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::edge::Edge;
use loops::WeightedLoop;

// ── Configuration ───────────────────────────────────────────────────────────

/// Thresholds and options controlling a closure-check run.
///
/// All values are configuration-driven; the engine carries no hardcoded
/// fallbacks. Defaults follow commonly used processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosureConfig {
    /// Maximum number of edges a loop may have.
    pub max_loop_length: usize,
    /// Greedy cap on how many retained loops may reference one measurement.
    pub max_loops_in_ifg: u32,
    /// Closure deviation threshold in radians; |closure| above it is a breach.
    pub large_dev_thr: f32,
    /// Subtract the per-loop (NaN-ignoring) median closure before
    /// thresholding, removing systematic per-loop bias.
    pub subtract_median: bool,
    /// Number of measurements that must flag a pixel (breached in every loop
    /// they participate in) before the pixel is invalidated stack-wide.
    pub phs_unw_err_thr: u16,
    /// Minimum loop-occurrence count before the average-breach drop rule may
    /// apply to a measurement.
    pub loops_thr_ifg: u16,
    /// Average breach fraction above which a measurement is dropped, provided
    /// its occurrence count also exceeds `loops_thr_ifg`.
    pub avg_ifg_err_thr: f32,
    /// When set, per-iteration closure results are persisted under this
    /// directory (see [`crate::persist`]).
    pub output_dir: Option<PathBuf>,
    /// Render a closure plot per iteration into `output_dir`.
    pub plot_closure: bool,
}

impl Default for ClosureConfig {
    fn default() -> Self {
        Self {
            max_loop_length: 4,
            max_loops_in_ifg: 2,
            large_dev_thr: std::f32::consts::FRAC_PI_2,
            subtract_median: true,
            phs_unw_err_thr: 5,
            loops_thr_ifg: 2,
            avg_ifg_err_thr: 0.5,
            output_dir: None,
            plot_closure: false,
        }
    }
}

impl ClosureConfig {
    /// Reject configurations the engine cannot meaningfully run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.max_loop_length >= 3,
            "max_loop_length must be at least 3, got {}",
            self.max_loop_length
        );
        ensure!(
            self.large_dev_thr > 0.0 && self.large_dev_thr.is_finite(),
            "large_dev_thr must be a positive finite number of radians, got {}",
            self.large_dev_thr
        );
        ensure!(
            self.avg_ifg_err_thr >= 0.0 && self.avg_ifg_err_thr.is_finite(),
            "avg_ifg_err_thr must be non-negative and finite, got {}",
            self.avg_ifg_err_thr
        );
        ensure!(
            self.phs_unw_err_thr > 0,
            "phs_unw_err_thr must be positive; zero would invalidate every pixel"
        );
        Ok(())
    }
}

// ── Status codes ────────────────────────────────────────────────────────────

/// Outcome of a closure-check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureStatus {
    /// The retained measurement set reached a fixed point.
    Converged,
    /// Loop filtering left nothing to work with; no usable result.
    NoUsableLoops,
}

/// How many loops and measurements survived each filtering stage of the last
/// iteration, reported for diagnosis when a run aborts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageCounts {
    /// Measurements entering the iteration.
    pub input_measurements: usize,
    /// Simple cycles enumerated within the length bound.
    pub candidate_loops: usize,
    /// Loops surviving the max-length filter.
    pub after_length_filter: usize,
    /// Loops surviving the per-measurement count cap.
    pub after_count_prune: usize,
    /// Measurements covered by at least one retained loop.
    pub measurements_in_loops: usize,
}

// ── Aggregated closure statistics ───────────────────────────────────────────

/// Per-pixel closure sums and breach bookkeeping for one iteration.
///
/// Invariant: `breach_count[[r, c, m]] <= occurrences[m]` for every pixel and
/// measurement — a measurement cannot breach in more loops than it joins.
#[derive(Debug, Clone)]
pub struct BreachStats {
    /// Summed signed phase per pixel per retained loop, `[row, col, loop]`.
    pub closure: Array3<f32>,
    /// Breaching-loop count per pixel per measurement, `[row, col, ifg]`.
    pub breach_count: Array3<u16>,
    /// Retained-loop count per measurement.
    pub occurrences: Array1<u16>,
}

// ── Run result ──────────────────────────────────────────────────────────────

/// Result of a closure-check run.
///
/// On [`ClosureStatus::Converged`] all fields are populated; on
/// [`ClosureStatus::NoUsableLoops`] only `status`, `iterations` and
/// `stage_counts` carry information and `retained` is empty.
#[derive(Debug, Clone)]
pub struct ClosureResult {
    /// Outcome status.
    pub status: ClosureStatus,
    /// The stable retained measurement set (empty on abort).
    pub retained: Vec<Edge>,
    /// Loops retained in the final iteration, in sorted order.
    pub loops: Vec<WeightedLoop>,
    /// Final closure / breach / occurrence arrays.
    pub stats: Option<BreachStats>,
    /// Per-pixel count of measurements flagged with unwrapping errors.
    pub unwrap_error_map: Option<Array2<u16>>,
    /// Number of outer iterations executed, including the aborting one.
    pub iterations: u32,
    /// Survivor counts per stage of the last iteration.
    pub stage_counts: StageCounts,
}

impl ClosureResult {
    /// Build the no-usable-loops outcome.
    pub(crate) fn aborted(iterations: u32, stage_counts: StageCounts) -> Self {
        Self {
            status: ClosureStatus::NoUsableLoops,
            retained: Vec::new(),
            loops: Vec::new(),
            stats: None,
            unwrap_error_map: None,
            iterations,
            stage_counts,
        }
    }
}
