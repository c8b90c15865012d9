//! Module `strategy` implement the node and sub-tree selection rules.
//!
//! A strategy is a comparator pair, one ordering candidate nodes inside
//! a sub-tree, the other ordering sub-trees inside the sub-tree pool.
//! Ramp-up always runs best-first regardless of the configured rule, so
//! that the nodes handed out to participants are high quality and
//! diverse; the configured rule is installed when search begins.

use std::cmp::Ordering;

use crate::{cmp_quality, pool::PoolEntry, subtree::SubTree, Error, Result};

/// Selection rules understood by the engine.
///
/// Hybrid is best-first with a dive streak: children of a just-branched
/// node go to a secondary dive pool which is consumed before the main
/// pool, descending greedily until the streak ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchStrategy {
    BestFirst,
    BreadthFirst,
    DepthFirst,
    BestEstimate,
    Hybrid,
}

impl Default for SearchStrategy {
    fn default() -> SearchStrategy {
        SearchStrategy::Hybrid
    }
}

impl SearchStrategy {
    /// Numeric codes as they appear in parameter files.
    pub fn from_code(code: i64) -> Result<SearchStrategy> {
        let strategy = match code {
            0 => SearchStrategy::BestFirst,
            1 => SearchStrategy::BreadthFirst,
            2 => SearchStrategy::DepthFirst,
            3 => SearchStrategy::BestEstimate,
            4 => SearchStrategy::Hybrid,
            _ => return err_at!(InvalidInput, msg: "search strategy {}", code),
        };
        Ok(strategy)
    }

    pub fn to_code(&self) -> i64 {
        match self {
            SearchStrategy::BestFirst => 0,
            SearchStrategy::BreadthFirst => 1,
            SearchStrategy::DepthFirst => 2,
            SearchStrategy::BestEstimate => 3,
            SearchStrategy::Hybrid => 4,
        }
    }

    /// Whether freshly branched children go to the dive pool.
    pub fn uses_dive_pool(&self) -> bool {
        matches!(self, SearchStrategy::Hybrid)
    }

    /// Order two candidate nodes; `Less` means `a` is selected before
    /// `b`. Ties fall back to the node index so that selection is
    /// deterministic for a given tree.
    pub fn cmp_nodes(&self, a: &PoolEntry, b: &PoolEntry) -> Ordering {
        let prime = match self {
            SearchStrategy::BestFirst | SearchStrategy::Hybrid => {
                cmp_quality(a.quality, b.quality)
            }
            SearchStrategy::BreadthFirst => a.depth.cmp(&b.depth),
            SearchStrategy::DepthFirst => b.depth.cmp(&a.depth),
            SearchStrategy::BestEstimate => {
                cmp_quality(a.sol_estimate, b.sol_estimate)
            }
        };
        prime.then(a.index.cmp(&b.index))
    }

    /// Order two sub-trees; `Less` means `a` is selected before `b`.
    pub fn cmp_trees(&self, a: &SubTree, b: &SubTree) -> Ordering {
        match self {
            SearchStrategy::BestFirst | SearchStrategy::Hybrid => {
                cmp_quality(a.quality(), b.quality())
            }
            SearchStrategy::BreadthFirst => a.root_depth().cmp(&b.root_depth()),
            SearchStrategy::DepthFirst => b.root_depth().cmp(&a.root_depth()),
            SearchStrategy::BestEstimate => {
                cmp_quality(a.best_estimate(), b.best_estimate())
            }
        }
    }
}

#[cfg(test)]
#[path = "strategy_test.rs"]
mod strategy_test;
