//! Phase raster access.
//!
//! The closure engine only needs three things from storage: the date-pair
//! identity of every measurement, read access to each phase raster, and the
//! ability to mark pixels invalid (NaN) in a measurement's phase data. The
//! [`RasterStore`] trait captures exactly that boundary; [`MemoryStack`]
//! implements it in memory for tests and in-process pipelines, and file- or
//! tile-backed stores can implement it without touching the engine.

use std::collections::BTreeMap;

use anyhow::{bail, ensure, Result};
use ndarray::Array2;

use crate::edge::Edge;

/// Storage boundary of the closure engine.
///
/// All measurements share one pixel grid. `set_invalid` writes NaN into the
/// masked pixels of a measurement's phase data and persists the change,
/// whatever persistence means for the implementation.
pub trait RasterStore {
    /// Date-pair identity of every stored measurement.
    fn edges(&self) -> Vec<Edge>;

    /// Shared raster dimensions as `(rows, cols)`.
    fn dims(&self) -> (usize, usize);

    /// Read the phase raster of one measurement. Invalid pixels are NaN.
    fn read_phase(&self, edge: &Edge) -> Result<Array2<f32>>;

    /// Set the masked pixels of one measurement's phase raster to NaN.
    fn set_invalid(&mut self, edge: &Edge, mask: &Array2<bool>) -> Result<()>;
}

/// An in-memory phase stack keyed by measurement edge.
#[derive(Debug, Clone, Default)]
pub struct MemoryStack {
    rows: usize,
    cols: usize,
    phases: BTreeMap<Edge, Array2<f32>>,
}

impl MemoryStack {
    /// Create an empty stack with the given raster dimensions.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            phases: BTreeMap::new(),
        }
    }

    /// Add or replace a measurement's phase raster.
    pub fn insert(&mut self, edge: Edge, phase: Array2<f32>) -> Result<()> {
        ensure!(
            phase.dim() == (self.rows, self.cols),
            "phase raster for {} is {:?}, stack is {:?}",
            edge,
            phase.dim(),
            (self.rows, self.cols)
        );
        self.phases.insert(edge, phase);
        Ok(())
    }

    /// Number of stored measurements.
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Borrow a stored phase raster, mainly for assertions in tests.
    pub fn phase(&self, edge: &Edge) -> Option<&Array2<f32>> {
        self.phases.get(edge)
    }
}

impl RasterStore for MemoryStack {
    fn edges(&self) -> Vec<Edge> {
        self.phases.keys().copied().collect()
    }

    fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn read_phase(&self, edge: &Edge) -> Result<Array2<f32>> {
        match self.phases.get(edge) {
            Some(phase) => Ok(phase.clone()),
            None => bail!("no phase data stored for measurement {}", edge),
        }
    }

    fn set_invalid(&mut self, edge: &Edge, mask: &Array2<bool>) -> Result<()> {
        ensure!(
            mask.dim() == (self.rows, self.cols),
            "invalid-pixel mask is {:?}, stack is {:?}",
            mask.dim(),
            (self.rows, self.cols)
        );
        let Some(phase) = self.phases.get_mut(edge) else {
            bail!("no phase data stored for measurement {}", edge);
        };
        ndarray::Zip::from(phase).and(mask).for_each(|p, &m| {
            if m {
                *p = f32::NAN;
            }
        });
        Ok(())
    }
}
