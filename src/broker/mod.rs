//! Module `broker` implement the search drivers.
//!
//! [SerialBroker] drives one sub-tree to completion on the calling
//! thread. [ParBroker] spawns one participant per configured process
//! and runs the master/hub/worker schedulers. Both share the node
//! index ladder and the final [SearchReport] shape.

use crate::{knowledge::SolutionData, stats::{ExitStatus, SearchStats}, Error, Result, OBJ_MAX};

mod parallel;
mod serial;

pub use parallel::ParBroker;
pub use serial::SerialBroker;

/// Top of the global node-index space.
pub const INDEX_MAX: i64 = i64::MAX;

/// Disjoint slice of the node-index space owned by one participant.
///
/// Indices are handed out one at a time; when the slice runs dry the
/// owner refills it from the participant one level up (worker from
/// hub, hub from master) in fixed-size batches.
pub struct IndexLadder {
    next: i64,
    max: i64,
}

impl IndexLadder {
    /// Own the inclusive range `[next, max]`.
    pub fn new(next: i64, max: i64) -> IndexLadder {
        IndexLadder { next, max }
    }

    /// Allocate one index.
    pub fn next_index(&mut self) -> Result<i64> {
        if self.next > self.max {
            err_at!(IndexExhausted, msg: "ladder at {}", self.max)
        } else {
            let index = self.next;
            self.next += 1;
            Ok(index)
        }
    }

    pub fn remaining(&self) -> i64 {
        (self.max - self.next + 1).max(0)
    }

    pub fn to_next(&self) -> i64 {
        self.next
    }

    pub fn to_max(&self) -> i64 {
        self.max
    }

    /// Replace the owned range, after a refill from upstream.
    pub fn refill(&mut self, next: i64, max: i64) -> Result<()> {
        if next < 0 || max < 0 || next > max {
            err_at!(IndexExhausted, msg: "refill [{}, {}]", next, max)
        } else {
            self.next = next;
            self.max = max;
            Ok(())
        }
    }

    /// Carve a batch off this ladder for a downstream participant,
    /// keeping at least `reserve` indices for the owner. Returns the
    /// carved inclusive range, or None when the ladder cannot satisfy
    /// the request.
    pub fn carve(&mut self, batch: i64, reserve: i64) -> Option<(i64, i64)> {
        let next = self.next;
        if self.max - next <= reserve {
            None
        } else if self.max - next <= batch {
            let give_max = self.max;
            self.next = self.max + 1;
            Some((next, give_max))
        } else {
            let give_max = next + batch;
            self.next = give_max + 1;
            Some((next, give_max))
        }
    }
}

/// What a finished search hands back to the caller.
pub struct SearchReport {
    pub exit_status: ExitStatus,
    /// Best solution quality, [crate::OBJ_MAX] when none was found.
    pub best_quality: f64,
    pub solution: Option<Box<dyn SolutionData>>,
    /// Aggregated counters across every participant.
    pub stats: SearchStats,
    /// Rank that discovered the best solution.
    pub incumbent_rank: usize,
}

impl SearchReport {
    pub fn has_solution(&self) -> bool {
        self.best_quality < OBJ_MAX
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
