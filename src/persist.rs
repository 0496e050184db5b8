//! Persistence of closure-check results for later inspection and plotting.
//!
//! Arrays are written as `.npy` so any numpy-compatible tool can load them;
//! the retained loop list goes to JSON alongside. One directory per closure
//! run holds all four artifacts.

use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use ndarray::{Array1, Array3};
use ndarray_npy::{read_npy, write_npy};
use tracing::info;

use crate::closure::loops::WeightedLoop;
use crate::closure::BreachStats;

const CLOSURE_FILE: &str = "closure.npy";
const BREACH_FILE: &str = "ifgs_breach_count.npy";
const OCCURRENCES_FILE: &str = "num_occurrences_each_ifg.npy";
const LOOPS_FILE: &str = "loops.json";

/// Write the closure, breach-count and occurrence arrays plus the retained
/// loop list into `dir`, creating it as needed.
pub fn save_closure_results(
    dir: &Path,
    stats: &BreachStats,
    loops: &[WeightedLoop],
) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("creating closure output directory {}", dir.display()))?;

    write_npy(dir.join(CLOSURE_FILE), &stats.closure)
        .with_context(|| format!("writing {}", CLOSURE_FILE))?;
    write_npy(dir.join(BREACH_FILE), &stats.breach_count)
        .with_context(|| format!("writing {}", BREACH_FILE))?;
    write_npy(dir.join(OCCURRENCES_FILE), &stats.occurrences)
        .with_context(|| format!("writing {}", OCCURRENCES_FILE))?;

    let file = fs::File::create(dir.join(LOOPS_FILE))
        .with_context(|| format!("creating {}", LOOPS_FILE))?;
    serde_json::to_writer_pretty(BufWriter::new(file), loops)
        .with_context(|| format!("writing {}", LOOPS_FILE))?;

    info!(
        "Saved closure results for {} loops to {}",
        loops.len(),
        dir.display()
    );
    Ok(())
}

/// Read back everything [`save_closure_results`] wrote.
pub fn load_closure_results(dir: &Path) -> Result<(BreachStats, Vec<WeightedLoop>)> {
    let closure: Array3<f32> = read_npy(dir.join(CLOSURE_FILE))
        .with_context(|| format!("reading {}", CLOSURE_FILE))?;
    let breach_count: Array3<u16> = read_npy(dir.join(BREACH_FILE))
        .with_context(|| format!("reading {}", BREACH_FILE))?;
    let occurrences: Array1<u16> = read_npy(dir.join(OCCURRENCES_FILE))
        .with_context(|| format!("reading {}", OCCURRENCES_FILE))?;

    let file = fs::File::open(dir.join(LOOPS_FILE))
        .with_context(|| format!("opening {}", LOOPS_FILE))?;
    let loops: Vec<WeightedLoop> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", LOOPS_FILE))?;

    Ok((
        BreachStats {
            closure,
            breach_count,
            occurrences,
        },
        loops,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::{Edge, EdgeSign, SignedEdge};
    use chrono::NaiveDate;
    use ndarray::{Array1, Array3};

    #[test]
    fn test_save_and_load_round_trip() {
        let base = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let d = |i: i64| base + chrono::Duration::days(12 * i);
        let looplist = vec![WeightedLoop::new(vec![
            SignedEdge::new(Edge::new(d(0), d(1)), EdgeSign::Forward),
            SignedEdge::new(Edge::new(d(1), d(2)), EdgeSign::Forward),
            SignedEdge::new(Edge::new(d(0), d(2)), EdgeSign::Reverse),
        ])];
        let stats = BreachStats {
            closure: Array3::from_shape_fn((2, 3, 1), |(r, c, _)| (r * 3 + c) as f32 * 0.5),
            breach_count: Array3::from_elem((2, 3, 3), 1u16),
            occurrences: Array1::from_vec(vec![1u16, 1, 1]),
        };

        let dir = tempfile::tempdir().unwrap();
        save_closure_results(dir.path(), &stats, &looplist).unwrap();
        let (back, loops_back) = load_closure_results(dir.path()).unwrap();

        assert_eq!(back.closure, stats.closure);
        assert_eq!(back.breach_count, stats.breach_count);
        assert_eq!(back.occurrences, stats.occurrences);
        assert_eq!(loops_back, looplist);
        assert_eq!(loops_back[0].weight(), 48);
    }
}
