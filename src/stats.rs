//! Module `stats` implement wall-clock timing and per-participant
//! search statistics.

use std::time;

/// How a search, or one unit of work, ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitStatus {
    /// Search completed and at least one solution was found.
    Optimal,
    /// A solution exists but the search was cut short.
    Feasible,
    /// Search completed without finding any solution.
    Infeasible,
    NodeLimit,
    TimeLimit,
    SolLimit,
    Unbounded,
    Unknown,
}

impl Default for ExitStatus {
    fn default() -> ExitStatus {
        ExitStatus::Unknown
    }
}

impl ExitStatus {
    /// Whether this status ends the whole search, as opposed to one
    /// unit of work.
    pub fn is_forced(&self) -> bool {
        matches!(
            self,
            ExitStatus::NodeLimit
                | ExitStatus::TimeLimit
                | ExitStatus::SolLimit
                | ExitStatus::Unbounded
        )
    }
}

/// Interval timer. `clock_type = "cpu"` is accepted by the parameters
/// and measured with the same monotone wall clock; the schedulers only
/// need intervals.
pub struct Timer {
    start: time::Instant,
}

impl Default for Timer {
    fn default() -> Timer {
        Timer::new()
    }
}

impl Timer {
    pub fn new() -> Timer {
        Timer {
            start: time::Instant::now(),
        }
    }

    pub fn restart(&mut self) {
        self.start = time::Instant::now();
    }

    /// Seconds since construction or the last restart.
    pub fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn reached(&self, limit: f64) -> bool {
        self.elapsed() >= limit
    }
}

/// Per-participant counters, gathered by the master when the search
/// ends.
#[derive(Clone, Debug, Default)]
pub struct SearchStats {
    pub nodes_processed: u64,
    pub nodes_branched: u64,
    pub nodes_discarded: u64,
    pub nodes_partial: u64,
    pub nodes_left: u64,
    pub tree_depth: i32,
    pub ramp_up_time: f64,
    pub idle_time: f64,
    pub ramp_down_time: f64,
    pub search_time: f64,
    /// Smoothed per-node processing time, seconds.
    pub node_processing_time: f64,
    pub exit_status: ExitStatus,
}

impl SearchStats {
    /// Fold a fresh per-node time measurement into the smoothed value,
    /// equal-weight blend with the previous estimate.
    pub fn update_node_time(&mut self, measured: f64) {
        if self.node_processing_time > 1.0e-14 {
            self.node_processing_time = 0.5 * (self.node_processing_time + measured);
        } else {
            self.node_processing_time = measured;
        }
    }

    /// Merge counters from another participant.
    pub fn merge(&mut self, other: &SearchStats) {
        self.nodes_processed += other.nodes_processed;
        self.nodes_branched += other.nodes_branched;
        self.nodes_discarded += other.nodes_discarded;
        self.nodes_partial += other.nodes_partial;
        self.nodes_left += other.nodes_left;
        self.tree_depth = self.tree_depth.max(other.tree_depth);
    }
}

#[cfg(test)]
#[path = "stats_test.rs"]
mod stats_test;
