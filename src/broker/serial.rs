//! Serial search driver, one sub-tree explored to completion on the
//! calling thread.

use std::sync::Arc;

use crate::{
    broker::{IndexLadder, SearchReport, INDEX_MAX},
    knowledge::{Model, Prototype, Registry},
    msg::Reporter,
    node::TreeNode,
    params::{Params, NODE_LIMIT, SOL_LIMIT},
    pool::SolutionPool,
    stats::{ExitStatus, SearchStats, Timer},
    subtree::{SubTree, TreeConfig, WorkContext},
    Result,
};

/// Single-participant broker. The whole index space belongs to it and
/// no messages ever leave the process.
pub struct SerialBroker {
    params: Params,
    model: Arc<dyn Model>,
    registry: Registry,
    reporter: Reporter,
    solutions: SolutionPool,
    indices: IndexLadder,
    stats: SearchStats,
}

impl SerialBroker {
    /// Create a broker around a fully set-up model. The application
    /// must have called [Model::read_instance] and [Model::setup]
    /// already.
    pub fn new(model: Arc<dyn Model>, params: Params) -> Result<SerialBroker> {
        let mut reporter = Reporter::new("serial", params.msg_level);
        if params.log_file_level > 0 {
            reporter.set_log_file(&params.log_file, params.log_file_level)?;
        }
        let solutions = SolutionPool::new(params.sol_limit.max(1) as usize);

        Ok(SerialBroker {
            params,
            model,
            registry: Registry::new(),
            reporter,
            solutions,
            indices: IndexLadder::new(0, INDEX_MAX - 1),
            stats: SearchStats::default(),
        })
    }

    /// Register a decode prototype. Serial runs only decode knowledge
    /// when the application feeds buffers back in, but registration
    /// keeps the contract uniform with the parallel broker.
    pub fn register(&mut self, tag: &str, proto: Box<dyn Prototype>) {
        self.registry.register(tag, proto);
    }

    pub fn as_registry(&self) -> &Registry {
        &self.registry
    }

    pub fn as_stats(&self) -> &SearchStats {
        &self.stats
    }

    /// Drive the search to completion or to a limit.
    pub fn search(&mut self) -> Result<SearchReport> {
        self.model.preprocess()?;

        let timer = Timer::new();
        let mut st = SubTree::new(TreeConfig::from(&self.params));
        let root = TreeNode::new(self.indices.next_index()?, self.model.create_root()?);
        st.set_root(root);

        // Stop each burst on a new solution when a solution-count
        // limit is in force, so the limit is enforced promptly.
        let exit_on_better = self.params.sol_limit != SOL_LIMIT;

        let mut exit_status = None;
        loop {
            if (self.stats.nodes_processed as i64) >= self.params.node_limit {
                exit_status = Some(ExitStatus::NodeLimit);
                break;
            } else if timer.reached(self.params.time_limit) {
                exit_status = Some(ExitStatus::TimeLimit);
                break;
            } else if (self.solutions.len() as i64) >= self.params.sol_limit {
                exit_status = Some(ExitStatus::SolLimit);
                break;
            } else if st.is_exhausted() {
                break;
            }

            let unit_nodes = match self.params.node_limit {
                NODE_LIMIT => NODE_LIMIT,
                limit => limit - (self.stats.nodes_processed as i64),
            };
            let unit_time = self.params.time_limit - timer.elapsed();

            let mut ctx = WorkContext {
                indices: &mut self.indices,
                solutions: &mut self.solutions,
                incumbent: None,
                stats: &mut self.stats,
            };
            let out = st.explore_unit_work(unit_nodes, unit_time, exit_on_better, true, &mut ctx)?;

            if let Some(ExitStatus::Unbounded) = out.status {
                exit_status = Some(ExitStatus::Unbounded);
                break;
            }
        }

        let exit_status = match exit_status {
            Some(status) => status,
            None if self.solutions.is_empty() => ExitStatus::Infeasible,
            None => ExitStatus::Optimal,
        };

        self.stats.search_time = timer.elapsed();
        self.stats.nodes_left = st.num_nodes() as u64;
        self.stats.exit_status = exit_status;

        self.reporter.log(
            1,
            &format!(
                "search done status {:?}, processed {}, left {}, depth {}",
                exit_status,
                self.stats.nodes_processed,
                self.stats.nodes_left,
                self.stats.tree_depth
            ),
        );

        self.model.postprocess()?;

        let best_quality = self.solutions.best_quality();
        let solution = self.solutions.take_best().map(|(_, sol)| sol);
        if self.params.print_solution {
            if let Some(sol) = &solution {
                self.reporter.log(0, &sol.render());
            }
        }

        Ok(SearchReport {
            exit_status,
            best_quality,
            solution,
            stats: self.stats.clone(),
            incumbent_rank: 0,
        })
    }
}

#[cfg(test)]
#[path = "serial_test.rs"]
mod serial_test;
