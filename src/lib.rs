//! # phase-closure
//!
//! Iterative **loop-closure consistency checking** for interferometric phase
//! time series.
//!
//! Each measurement (interferogram) is a phase difference between two
//! acquisition dates, modeled as an edge in a temporal graph. Around any
//! closed cycle of measurements the signed phase differences should sum to
//! nearly zero; a large residual ("closure") flags phase-unwrapping errors
//! in the cycle's members. This crate enumerates those cycles, aggregates
//! per-pixel closure statistics, masks pixels with systematic unwrapping
//! errors, and iteratively prunes corrupted measurements until the retained
//! set is stable.
//!
//! ## Example
//!
//! ```no_run
//! use ndarray::Array2;
//! use phase_closure::{
//!     filter_to_closure_checked_ifgs, ClosureConfig, ClosureStatus, Edge, MemoryStack,
//! };
//!
//! # fn main() -> anyhow::Result<()> {
//! // Load phase rasters into a stack, one per date-pair measurement.
//! let mut stack = MemoryStack::new(512, 512);
//! # let (date_a, date_b) = (chrono::NaiveDate::MIN, chrono::NaiveDate::MAX);
//! # let phase = Array2::<f32>::zeros((512, 512));
//! stack.insert(Edge::new(date_a, date_b), phase)?;
//! // ... more measurements ...
//!
//! let config = ClosureConfig {
//!     max_loop_length: 4,
//!     large_dev_thr: std::f32::consts::FRAC_PI_2,
//!     ..Default::default()
//! };
//!
//! let result = filter_to_closure_checked_ifgs(&mut stack, &config)?;
//! match result.status {
//!     ClosureStatus::Converged => println!(
//!         "{} measurements retained after {} iterations",
//!         result.retained.len(),
//!         result.iterations
//!     ),
//!     ClosureStatus::NoUsableLoops => println!(
//!         "aborted: {} loops survived filtering",
//!         result.stage_counts.after_count_prune
//!     ),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Algorithm overview
//!
//! 1. **Loop enumeration** — find all simple cycles up to a configured edge
//!    count; sign each edge by its traversal direction
//! 2. **Deterministic ordering** — sort loops by weight (summed temporal
//!    baseline) with explicit tie-breaks, so greedy steps are reproducible
//! 3. **Loop capping** — greedily limit how many retained loops reference
//!    any single measurement
//! 4. **Closure sums** — per pixel and loop, sum signed phases (optionally
//!    median-centered) and count threshold breaches per measurement
//! 5. **Pixel masking** — NaN-out pixels that breach in every loop of enough
//!    measurements, across the whole stack
//! 6. **Measurement pruning** — drop orphaned and persistently-breaching
//!    measurements; repeat from 1 until the retained set is stable
//!
//! The design follows the phase-closure stage of small-baseline InSAR
//! processing chains; thresholds are entirely configuration-driven.

pub mod closure;
pub mod edge;
pub mod persist;
pub mod plot;
pub mod stack;

pub use closure::check::filter_to_closure_checked_ifgs;
pub use closure::loops::{find_signed_loops, sort_loops, sorted_signed_loops, WeightedLoop};
pub use closure::{BreachStats, ClosureConfig, ClosureResult, ClosureStatus, StageCounts};
pub use edge::{Edge, EdgeSign, SignedEdge};
pub use stack::{MemoryStack, RasterStore};
