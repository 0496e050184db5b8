//! Closure visualization: one heatmap panel per retained loop.
//!
//! Renders the closure array as a grid of per-loop panels, color range
//! clamped to +/- the deviation threshold so breaching pixels saturate.
//! Invoked fire-and-forget by the checker; failures are the caller's to log.

use std::path::Path;

use anyhow::{anyhow, ensure, Result};
use ndarray::{Array3, Axis};
use plotters::prelude::*;

use crate::closure::loops::WeightedLoop;

const PANEL_PX: u32 = 260;

/// Plot every loop's closure slab into a single PNG at `path`.
///
/// `closure` is indexed `[row, col, loop]` and must match `loops` along its
/// third axis. `thr` is the deviation threshold in radians; the color scale
/// runs from `-thr` (blue) through zero (white-ish) to `+thr` (red) and NaN
/// pixels render gray.
pub fn plot_closure(
    closure: &Array3<f32>,
    loops: &[WeightedLoop],
    thr: f32,
    path: &Path,
) -> Result<()> {
    let (rows, cols, n_loops) = closure.dim();
    ensure!(n_loops == loops.len(), "closure array has {} slabs for {} loops", n_loops, loops.len());
    ensure!(n_loops > 0, "nothing to plot: no loops");
    ensure!(thr > 0.0, "deviation threshold must be positive, got {}", thr);

    let grid_cols = (n_loops as f64).sqrt().ceil() as usize;
    let grid_rows = n_loops.div_ceil(grid_cols);
    let width = (grid_cols as u32) * PANEL_PX;
    let height = (grid_rows as u32) * PANEL_PX;

    let root = BitMapBackend::new(path, (width, height)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| anyhow!("filling canvas: {e}"))?;
    let panels = root.split_evenly((grid_rows, grid_cols));

    for (k, panel) in panels.iter().enumerate().take(n_loops) {
        let l = &loops[k];
        let caption = format!("loop {k}: {} edges, w={} d", l.len(), l.weight());
        let mut chart = ChartBuilder::on(panel)
            .caption(caption, ("sans-serif", 14))
            .margin(8)
            .build_cartesian_2d(0..cols as i32, 0..rows as i32)
            .map_err(|e| anyhow!("building panel {k}: {e}"))?;
        chart
            .configure_mesh()
            .disable_mesh()
            .draw()
            .map_err(|e| anyhow!("drawing mesh of panel {k}: {e}"))?;

        let slab = closure.index_axis(Axis(2), k);
        chart
            .draw_series(slab.indexed_iter().map(|((r, c), &v)| {
                Rectangle::new(
                    [
                        (c as i32, r as i32),
                        (c as i32 + 1, r as i32 + 1),
                    ],
                    closure_color(v, thr).filled(),
                )
            }))
            .map_err(|e| anyhow!("drawing panel {k}: {e}"))?;
    }

    root.present().map_err(|e| anyhow!("writing {}: {e}", path.display()))?;
    Ok(())
}

/// Map a closure value onto a diverging blue-white-red ramp clamped at
/// +/- `thr`; NaN renders as neutral gray.
fn closure_color(value: f32, thr: f32) -> RGBColor {
    if value.is_nan() {
        return RGBColor(160, 160, 160);
    }
    let t = (value.clamp(-thr, thr) / thr) as f64; // -1 ..= 1
    if t >= 0.0 {
        let fade = (255.0 * (1.0 - t)) as u8;
        RGBColor(255, fade, fade)
    } else {
        let fade = (255.0 * (1.0 + t)) as u8;
        RGBColor(fade, fade, 255)
    }
}
