//! Module `params` implement engine configuration.
//!
//! Parameter files are TOML; every key is optional and falls back to
//! its default. Defaults are chosen so that a single-participant run
//! with no parameters yields a functional best-first search.

use serde::Deserialize;

use std::{ffi, fs};

use crate::{strategy::SearchStrategy, Error, Result};

/// Default node limit, effectively unbounded.
pub const NODE_LIMIT: i64 = i64::MAX;
/// Default time limit in seconds, effectively unbounded.
pub const TIME_LIMIT: f64 = 1.0e75;
/// Default bound on retained solutions.
pub const SOL_LIMIT: i64 = i64::MAX;

/// Engine configuration.
///
/// Use the `set_*` methods for programmatic construction, or
/// [Params::from_file] to read a TOML parameter file.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Diagnostics level for the master, 0 silences.
    pub msg_level: i64,
    /// Diagnostics level for hubs.
    pub hub_msg_level: i64,
    /// Diagnostics level for workers.
    pub worker_msg_level: i64,
    /// Level written to the log file, 0 disables the file.
    pub log_file_level: i64,
    /// Log file location.
    pub log_file: String,

    /// Stop after this many nodes have been processed system-wide.
    pub node_limit: i64,
    /// Stop after this much wall time, in seconds.
    pub time_limit: f64,
    /// Bound on the number of retained solutions.
    pub sol_limit: i64,

    /// Node/tree selection rule during search, numeric code of
    /// [SearchStrategy].
    pub search_strategy: i64,
    /// Selection rule during ramp-up.
    pub search_strategy_ramp_up: i64,

    /// Number of participants; 0 picks the machine's logical core
    /// count.
    pub process_num: i64,
    /// Number of hubs, the master doubles as hub 0.
    pub hub_num: i64,
    /// When positive, hubs also process nodes.
    pub max_hub_work_size: i64,

    /// Master balances hubs once per this many seconds.
    pub master_balance_period: f64,
    /// Hubs report and balance once per this many seconds.
    pub hub_report_period: f64,
    /// Idle workers re-ask for work after this many seconds.
    pub worker_ask_period: f64,
    /// Hubs report to the master after this many scheduler rounds even
    /// if nothing moved.
    pub master_report_interval: i64,
    /// Work quantity below which a participant counts as idle.
    pub zero_load: f64,
    /// Work quantity below which a worker asks for more work.
    pub need_work_threshold: f64,
    /// Relative quality gap that triggers swapping the working
    /// sub-tree for the best pooled one.
    pub change_work_threshold: f64,
    /// Relative distance below average quality that marks a donor.
    pub donor_threshold: f64,
    /// Relative distance above average quality that marks a receiver.
    pub receiver_threshold: f64,
    /// Weight for quantity in the workload metric.
    pub rho: f64,

    /// Node budget of one unit of work.
    pub unit_work_nodes: i64,
    /// Wall-time budget of one unit of work, in seconds.
    pub unit_work_time: f64,

    /// Large message buffer size in bytes, bounds donation sizes.
    pub large_size: i64,
    /// Medium message buffer size in bytes.
    pub medium_size: i64,
    /// Small message buffer size in bytes.
    pub small_size: i64,
    /// Spare bytes kept on top of measured knowledge sizes.
    pub buf_spare: i64,

    /// Minimum nodes the master generates during ramp-up; adapted
    /// upward from measured node processing time.
    pub master_init_node_num: i64,
    /// Minimum nodes each hub generates during ramp-up.
    pub hub_init_node_num: i64,
    /// Number of best nodes averaged into a sub-tree's quality.
    pub elite_size: i64,

    /// Free fully fathomed ancestors eagerly. When false dead nodes
    /// stay in the arena for warm starts.
    pub delete_dead_node: bool,
    /// Enable master-driven balancing across clusters.
    pub inter_cluster_balance: bool,
    /// Enable hub-driven balancing within a cluster.
    pub intra_cluster_balance: bool,
    /// Print the best solution when the search ends.
    pub print_solution: bool,
    /// "wall" or "cpu"; interval measurement source.
    pub clock_type: String,
    /// Instance file location, application interpreted.
    pub instance: String,
    /// Emit a node count line every this many processed nodes.
    pub node_log_interval: i64,
    /// Dive streak depth bound for the hybrid strategy, 0 never cuts
    /// a streak short.
    pub max_dive_depth: i64,
    /// The donation up-walk stops once the candidate region holds
    /// more than one part in `split_ratio` of the tree's open nodes.
    pub split_ratio: i64,
}

impl Default for Params {
    fn default() -> Params {
        Params {
            msg_level: 2,
            hub_msg_level: 0,
            worker_msg_level: 0,
            log_file_level: 0,
            log_file: "parsearch.log".to_string(),

            node_limit: NODE_LIMIT,
            time_limit: TIME_LIMIT,
            sol_limit: SOL_LIMIT,

            search_strategy: SearchStrategy::Hybrid.to_code(),
            search_strategy_ramp_up: SearchStrategy::BestFirst.to_code(),

            process_num: 2,
            hub_num: 1,
            max_hub_work_size: 0,

            master_balance_period: 0.03,
            hub_report_period: 0.01,
            worker_ask_period: 0.5,
            master_report_interval: 10,
            zero_load: 1.0e-6,
            need_work_threshold: 2.0,
            change_work_threshold: 0.02,
            donor_threshold: 0.02,
            receiver_threshold: 0.02,
            rho: 0.0,

            unit_work_nodes: 20,
            unit_work_time: 0.03,

            large_size: 10485760,
            medium_size: 4096,
            small_size: 1024,
            buf_spare: 256,

            master_init_node_num: 2,
            hub_init_node_num: 2,
            elite_size: 1,

            delete_dead_node: true,
            inter_cluster_balance: true,
            intra_cluster_balance: true,
            print_solution: false,
            clock_type: "wall".to_string(),
            instance: "NONE".to_string(),
            node_log_interval: 100,
            max_dive_depth: 0,
            split_ratio: 6,
        }
    }
}

impl Params {
    /// Read parameters from a TOML file. Unknown keys are ignored,
    /// missing keys fall back to defaults.
    pub fn from_file(loc: &ffi::OsStr) -> Result<Params> {
        let text = err_at!(IOError, fs::read_to_string(loc), "{:?}", loc)?;
        err_at!(InvalidInput, toml::from_str(&text), "{:?}", loc)
    }

    /// Search-phase selection rule.
    pub fn strategy(&self) -> Result<SearchStrategy> {
        SearchStrategy::from_code(self.search_strategy)
    }

    /// Ramp-up selection rule.
    pub fn ramp_up_strategy(&self) -> Result<SearchStrategy> {
        SearchStrategy::from_code(self.search_strategy_ramp_up)
    }

    /// Whether hubs also process nodes. Single predicate used by every
    /// code path.
    pub fn hub_works(&self) -> bool {
        self.max_hub_work_size > 0
    }

    pub fn set_search_strategy(&mut self, strategy: SearchStrategy) -> &mut Self {
        self.search_strategy = strategy.to_code();
        self
    }

    pub fn set_process_num(&mut self, process_num: i64) -> &mut Self {
        self.process_num = process_num;
        self
    }

    pub fn set_hub_num(&mut self, hub_num: i64) -> &mut Self {
        self.hub_num = hub_num;
        self
    }

    pub fn set_node_limit(&mut self, node_limit: i64) -> &mut Self {
        self.node_limit = node_limit;
        self
    }

    pub fn set_time_limit(&mut self, time_limit: f64) -> &mut Self {
        self.time_limit = time_limit;
        self
    }

    pub fn set_sol_limit(&mut self, sol_limit: i64) -> &mut Self {
        self.sol_limit = sol_limit;
        self
    }

    pub fn set_unit_work(&mut self, nodes: i64, time: f64) -> &mut Self {
        self.unit_work_nodes = nodes;
        self.unit_work_time = time;
        self
    }

    pub fn set_msg_level(&mut self, msg_level: i64) -> &mut Self {
        self.msg_level = msg_level;
        self
    }
}

#[cfg(test)]
#[path = "params_test.rs"]
mod params_test;
