use std::{thread, time};

use super::*;

#[test]
fn test_timer() {
    let mut timer = Timer::new();
    thread::sleep(time::Duration::from_millis(20));
    assert!(timer.elapsed() >= 0.02);
    assert!(timer.reached(0.01));
    assert!(!timer.reached(60.0));

    timer.restart();
    assert!(timer.elapsed() < 0.02);
}

#[test]
fn test_exit_status() {
    assert_eq!(ExitStatus::default(), ExitStatus::Unknown);
    assert!(ExitStatus::NodeLimit.is_forced());
    assert!(ExitStatus::TimeLimit.is_forced());
    assert!(ExitStatus::SolLimit.is_forced());
    assert!(ExitStatus::Unbounded.is_forced());
    assert!(!ExitStatus::Optimal.is_forced());
    assert!(!ExitStatus::Infeasible.is_forced());
    assert!(!ExitStatus::Feasible.is_forced());
}

#[test]
fn test_stats_node_time() {
    let mut stats = SearchStats::default();
    stats.update_node_time(0.4);
    assert_eq!(stats.node_processing_time, 0.4);
    stats.update_node_time(0.2);
    assert!((stats.node_processing_time - 0.3).abs() < 1e-12);
}

#[test]
fn test_stats_merge() {
    let mut a = SearchStats {
        nodes_processed: 10,
        nodes_branched: 4,
        nodes_discarded: 1,
        nodes_partial: 5,
        nodes_left: 2,
        tree_depth: 7,
        ..SearchStats::default()
    };
    let b = SearchStats {
        nodes_processed: 3,
        nodes_branched: 1,
        nodes_discarded: 0,
        nodes_partial: 2,
        nodes_left: 0,
        tree_depth: 11,
        ..SearchStats::default()
    };
    a.merge(&b);
    assert_eq!(a.nodes_processed, 13);
    assert_eq!(a.nodes_branched, 5);
    assert_eq!(a.nodes_discarded, 1);
    assert_eq!(a.nodes_partial, 7);
    assert_eq!(a.nodes_left, 2);
    assert_eq!(a.tree_depth, 11);
}
