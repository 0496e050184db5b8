//! Integration tests: build small synthetic interferogram stacks with known
//! closure behavior and verify the full iterative check end to end.

use std::f32::consts::{FRAC_PI_2, TAU};

use chrono::NaiveDate;
use ndarray::Array2;
use phase_closure::closure::sum::sum_phase_closures;
use phase_closure::{
    filter_to_closure_checked_ifgs, sorted_signed_loops, ClosureConfig, ClosureStatus, Edge,
    MemoryStack, RasterStore,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
}

fn date(i: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + chrono::Duration::days(12 * i as i64)
}

fn edge(i: u32, j: u32) -> Edge {
    Edge::new(date(i), date(j))
}

/// Four measurements forming a single 4-edge loop on a 1x2 grid. One pixel
/// of the first measurement carries a full-cycle unwrapping error.
fn square_stack() -> (MemoryStack, Vec<Edge>) {
    let mut stack = MemoryStack::new(1, 2);
    let pairs = [(0, 1), (1, 2), (2, 3), (0, 3)];
    for (i, j) in pairs {
        let phase = if (i, j) == (0, 1) {
            Array2::from_shape_vec((1, 2), vec![TAU, 0.01]).unwrap()
        } else {
            Array2::zeros((1, 2))
        };
        stack.insert(edge(i, j), phase).unwrap();
    }
    let mut edges: Vec<Edge> = pairs.iter().map(|&(i, j)| edge(i, j)).collect();
    edges.sort();
    (stack, edges)
}

/// The single-square scenario: one pixel breaches the whole loop, the other
/// does not, and with aggressive thresholds every measurement is dropped,
/// leaving the next iteration without loops.
#[test]
fn test_single_loop_breach_drops_everything() {
    init_tracing();
    let (mut stack, edges) = square_stack();
    let config = ClosureConfig {
        max_loop_length: 4,
        max_loops_in_ifg: 2,
        large_dev_thr: FRAC_PI_2,
        subtract_median: false,
        phs_unw_err_thr: 5, // never reached with 4 measurements
        loops_thr_ifg: 0,
        avg_ifg_err_thr: 0.07,
        ..Default::default()
    };

    // Stage-level expectations first: one loop, a breach at pixel 0 for all
    // four measurements and none at pixel 1.
    let loops = sorted_signed_loops(&edges, config.max_loop_length);
    assert_eq!(loops.len(), 1);
    let stats = sum_phase_closures(&stack, &edges, &loops, &config).unwrap();
    for m in 0..4 {
        assert_eq!(stats.breach_count[[0, 0, m]], 1);
        assert_eq!(stats.breach_count[[0, 1, m]], 0);
        assert_eq!(stats.occurrences[m], 1);
    }

    // Average breach fraction = 1 / 1 / 2 pixels = 0.5 > 0.07 with occurrence
    // 1 > 0, so every measurement goes; the second iteration finds no loops.
    let result = filter_to_closure_checked_ifgs(&mut stack, &config).unwrap();
    assert_eq!(result.status, ClosureStatus::NoUsableLoops);
    assert_eq!(result.iterations, 2);
    assert!(result.retained.is_empty());
    assert!(result.stats.is_none());
    assert_eq!(result.stage_counts.input_measurements, 0);
    assert_eq!(result.stage_counts.candidate_loops, 0);
}

/// A consistent stack converges on the first pass and is a fixed point:
/// re-running the check on the retained set changes nothing.
#[test]
fn test_consistent_square_is_a_fixpoint() {
    init_tracing();
    let mut stack = MemoryStack::new(1, 2);
    for (i, j) in [(0, 1), (1, 2), (2, 3), (0, 3)] {
        stack
            .insert(edge(i, j), Array2::from_elem((1, 2), 0.01))
            .unwrap();
    }
    let config = ClosureConfig {
        subtract_median: false,
        ..Default::default()
    };

    let first = filter_to_closure_checked_ifgs(&mut stack, &config).unwrap();
    assert_eq!(first.status, ClosureStatus::Converged);
    assert_eq!(first.iterations, 1);
    assert_eq!(first.retained.len(), 4);
    assert_eq!(first.stats.as_ref().unwrap().breach_count.sum(), 0);

    let second = filter_to_closure_checked_ifgs(&mut stack, &config).unwrap();
    assert_eq!(second.status, ClosureStatus::Converged);
    assert_eq!(second.retained, first.retained);
    assert_eq!(second.loops, first.loops);
}

/// K4 with one corrupted measurement: only that measurement exceeds the
/// average-breach threshold and is dropped; the remaining five converge.
#[test]
fn test_corrupted_measurement_is_pruned() {
    init_tracing();
    let mut stack = MemoryStack::new(2, 3);
    let mut edges = Vec::new();
    for i in 0..4u32 {
        for j in (i + 1)..4 {
            let phase = if (i, j) == (0, 1) {
                Array2::from_elem((2, 3), TAU)
            } else {
                Array2::zeros((2, 3))
            };
            stack.insert(edge(i, j), phase).unwrap();
            edges.push(edge(i, j));
        }
    }
    edges.sort();

    // With all 7 loops retained, each measurement occurs 4 times. The
    // corrupted edge breaches in all 4 of its loops (fraction 1.0); every
    // other edge shares at most 2 loops with it (fraction 0.5).
    let config = ClosureConfig {
        max_loop_length: 4,
        max_loops_in_ifg: 10,
        large_dev_thr: FRAC_PI_2,
        subtract_median: false,
        phs_unw_err_thr: 2,
        loops_thr_ifg: 0,
        avg_ifg_err_thr: 0.6,
        ..Default::default()
    };

    let result = filter_to_closure_checked_ifgs(&mut stack, &config).unwrap();
    assert_eq!(result.status, ClosureStatus::Converged);
    assert_eq!(result.iterations, 2);
    assert_eq!(result.retained.len(), 5);
    assert!(!result.retained.contains(&edge(0, 1)));

    // The surviving graph still closes: two triangles and one 4-cycle, all
    // consistent.
    assert_eq!(result.loops.len(), 3);
    let stats = result.stats.unwrap();
    assert_eq!(stats.breach_count.sum(), 0);
    for m in 0..5 {
        assert!(stats.occurrences[m] >= 2);
    }
}

/// Pixels breaching every loop of enough measurements are NaN-masked across
/// the whole retained stack.
#[test]
fn test_unwrap_error_pixel_masked_stack_wide() {
    init_tracing();
    let mut stack = MemoryStack::new(1, 2);
    for (i, j) in [(0, 1), (1, 2), (2, 3), (0, 3)] {
        let phase = if (i, j) == (0, 1) {
            Array2::from_shape_vec((1, 2), vec![TAU, 0.0]).unwrap()
        } else {
            Array2::zeros((1, 2))
        };
        stack.insert(edge(i, j), phase).unwrap();
    }
    // Lenient pruning thresholds: nothing is dropped, but with a single loop
    // every measurement breaches pixel 0 in all its loops, so 4 flags >= 1.
    let config = ClosureConfig {
        subtract_median: false,
        phs_unw_err_thr: 1,
        loops_thr_ifg: 10,
        avg_ifg_err_thr: 0.99,
        ..Default::default()
    };

    let result = filter_to_closure_checked_ifgs(&mut stack, &config).unwrap();
    assert_eq!(result.status, ClosureStatus::Converged);
    let map = result.unwrap_error_map.unwrap();
    assert_eq!(map[[0, 0]], 4);
    assert_eq!(map[[0, 1]], 0);

    for (i, j) in [(0, 1), (1, 2), (2, 3), (0, 3)] {
        let phase = stack.read_phase(&edge(i, j)).unwrap();
        assert!(phase[[0, 0]].is_nan(), "pixel 0 of {} not masked", edge(i, j));
        assert!(!phase[[0, 1]].is_nan());
    }
}

/// With an output directory configured the checker persists arrays, the loop
/// list and a plot for every iteration.
#[test]
fn test_outputs_written_per_iteration() {
    init_tracing();
    let (mut stack, _) = square_stack();
    let dir = tempfile::tempdir().unwrap();
    let config = ClosureConfig {
        max_loop_length: 4,
        large_dev_thr: FRAC_PI_2,
        subtract_median: false,
        phs_unw_err_thr: 5,
        loops_thr_ifg: 0,
        avg_ifg_err_thr: 0.07,
        output_dir: Some(dir.path().to_path_buf()),
        plot_closure: true,
        ..Default::default()
    };

    let result = filter_to_closure_checked_ifgs(&mut stack, &config).unwrap();
    // Aborts on the second iteration, so only the first one wrote outputs.
    assert_eq!(result.status, ClosureStatus::NoUsableLoops);

    let iter_dir = dir.path().join("closure_iter_01");
    for name in [
        "closure.npy",
        "ifgs_breach_count.npy",
        "num_occurrences_each_ifg.npy",
        "loops.json",
        "closure.png",
    ] {
        assert!(iter_dir.join(name).is_file(), "{name} missing");
    }
    assert!(!dir.path().join("closure_iter_02").exists());

    let (stats, loops) = phase_closure::persist::load_closure_results(&iter_dir).unwrap();
    assert_eq!(loops.len(), 1);
    assert_eq!(stats.closure.dim(), (1, 2, 1));
    assert_eq!(stats.occurrences.len(), 4);
}

/// Identical inputs produce identical outputs regardless of insertion order
/// quirks: the loop order and retained set are fully deterministic.
#[test]
fn test_check_is_deterministic() {
    init_tracing();
    let run = || {
        let mut stack = MemoryStack::new(2, 2);
        for i in 0..5u32 {
            for j in (i + 1)..5 {
                let v = 0.02 * (i + j) as f32;
                stack.insert(edge(i, j), Array2::from_elem((2, 2), v)).unwrap();
            }
        }
        filter_to_closure_checked_ifgs(&mut stack, &ClosureConfig::default()).unwrap()
    };

    let a = run();
    let b = run();
    assert_eq!(a.status, b.status);
    assert_eq!(a.retained, b.retained);
    assert_eq!(a.loops, b.loops);
    assert_eq!(a.iterations, b.iterations);
}
