//! Module `subtree` implement a self contained piece of the search
//! tree.
//!
//! A sub-tree owns an arena of nodes keyed by node index, a primary
//! candidate pool, a dive pool used by the hybrid strategy, and the
//! node currently being processed. Sub-trees are the unit of work
//! movement: they serialize to a depth-first pre-order stream and
//! rebuild on the other side by re-matching parent indices.

use std::collections::HashMap;

use crate::{
    broker::IndexLadder,
    buf::Encoded,
    cmp_quality,
    knowledge::{Registry, TYPE_SUBTREE},
    node::{BranchItem, NodeStatus, ProcessArgs, TreeNode, NO_PARENT},
    params::Params,
    pool::{NodePool, PoolEntry, SolutionPool},
    stats::{ExitStatus, SearchStats, Timer},
    strategy::SearchStrategy,
    Error, Result, OBJ_MAX,
};

/// Per-tree knobs, copied out of [Params] at construction.
#[derive(Clone)]
pub struct TreeConfig {
    pub strategy: SearchStrategy,
    /// Free fully fathomed ancestors eagerly.
    pub delete_dead_node: bool,
    /// Number of best nodes averaged into the tree quality.
    pub elite_size: usize,
    /// Dive streak depth bound, 0 = unbounded.
    pub max_dive_depth: i64,
    /// Donation up-walk stops at one part in `split_ratio` of the
    /// open nodes.
    pub split_ratio: i64,
}

impl Default for TreeConfig {
    fn default() -> TreeConfig {
        TreeConfig {
            strategy: SearchStrategy::default(),
            delete_dead_node: true,
            elite_size: 1,
            max_dive_depth: 0,
            split_ratio: 6,
        }
    }
}

impl From<&Params> for TreeConfig {
    fn from(params: &Params) -> TreeConfig {
        TreeConfig {
            strategy: params.strategy().unwrap_or_default(),
            delete_dead_node: params.delete_dead_node,
            elite_size: params.elite_size.max(1) as usize,
            max_dive_depth: params.max_dive_depth,
            split_ratio: params.split_ratio.max(1),
        }
    }
}

/// Borrowed engine state a sub-tree needs while processing nodes.
pub struct WorkContext<'a> {
    pub indices: &'a mut IndexLadder,
    pub solutions: &'a mut SolutionPool,
    /// Best known solution quality across all participants, if any.
    pub incumbent: Option<f64>,
    pub stats: &'a mut SearchStats,
}

impl<'a> WorkContext<'a> {
    fn best_known(&self) -> f64 {
        let pooled = self.solutions.best_quality();
        match self.incumbent {
            Some(val) if val < pooled => val,
            _ => pooled,
        }
    }
}

/// Outcome of one unit of work.
#[derive(Clone, Debug, Default)]
pub struct UnitWork {
    pub status: Option<ExitStatus>,
    pub processed: u64,
    pub branched: u64,
    pub fathomed: u64,
    pub discarded: u64,
    pub partial: u64,
    pub depth: i32,
    pub found_better: bool,
}

/// A rooted, movable piece of the search tree.
pub struct SubTree {
    config: TreeConfig,
    root: i64,
    nodes: HashMap<i64, TreeNode>,
    pool: NodePool,
    dive_pool: NodePool,
    active: Option<i64>,
    quality: f64,
    dive_base_depth: Option<i32>,
}

impl SubTree {
    /// Empty sub-tree; seed it with [SubTree::set_root].
    pub fn new(config: TreeConfig) -> SubTree {
        let strategy = config.strategy;
        SubTree {
            config,
            root: NO_PARENT,
            nodes: HashMap::new(),
            pool: NodePool::new(strategy),
            // Dive entries are consumed best-estimate first.
            dive_pool: NodePool::new(SearchStrategy::BestEstimate),
            active: None,
            quality: OBJ_MAX,
            dive_base_depth: None,
        }
    }

    /// Install `node` as the root and queue it as a candidate.
    pub fn set_root(&mut self, mut node: TreeNode) {
        node.parent = NO_PARENT;
        self.root = node.index;
        self.pool.push(PoolEntry::from_node(&node));
        self.nodes.insert(node.index, node);
        self.quality = self.pool.best_quality();
    }

    /// Add a free standing node to the arena and the candidate pool.
    /// Used by ramp-up containers, whose nodes need not share one
    /// root.
    pub fn seed_node(&mut self, node: TreeNode) {
        if self.root == NO_PARENT {
            self.root = node.index;
        }
        self.pool.push(PoolEntry::from_node(&node));
        self.nodes.insert(node.index, node);
    }

    /// Detach the next pooled node for hand-out to another
    /// participant. Open nodes are always leaves, so only the donor's
    /// book-keeping references go stale, and ramp-up containers are
    /// discarded right after distribution.
    pub fn take_pooled_node(&mut self) -> Option<TreeNode> {
        let entry = self.pool.pop()?;
        match self.nodes.remove(&entry.index) {
            Some(mut node) => {
                node.parent = NO_PARENT;
                node.children.clear();
                Some(node)
            }
            None => None,
        }
    }

    /// Swap the node selection rule, re-ordering the candidate pool.
    pub fn set_strategy(&mut self, strategy: SearchStrategy) {
        self.config.strategy = strategy;
        self.pool.set_strategy(strategy);
    }

    pub fn strategy(&self) -> SearchStrategy {
        self.config.strategy
    }

    /// Open work count: pooled candidates plus the active node.
    pub fn num_nodes(&self) -> usize {
        self.pool.len() + self.dive_pool.len() + self.active.map_or(0, |_| 1)
    }

    /// Every node resident in the arena, including retained terminal
    /// nodes.
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.num_nodes() == 0
    }

    pub fn quality(&self) -> f64 {
        self.quality
    }

    pub fn root_depth(&self) -> i32 {
        self.nodes.get(&self.root).map_or(0, |n| n.depth)
    }

    /// Smallest solution estimate over pooled candidates.
    pub fn best_estimate(&self) -> f64 {
        self.pool
            .iter()
            .chain(self.dive_pool.iter())
            .map(|e| e.sol_estimate)
            .fold(OBJ_MAX, |acc, v| if v < acc { v } else { acc })
    }

    /// Best node quality over the pools and the active node.
    pub fn best_quality(&self) -> f64 {
        let mut best = self.pool.best_quality();
        let dive = self.dive_pool.best_quality();
        if dive < best {
            best = dive;
        }
        if let Some(idx) = self.active {
            if let Some(node) = self.nodes.get(&idx) {
                if node.is_open() && node.quality < best {
                    best = node.quality;
                }
            }
        }
        best
    }

    pub fn node(&self, index: i64) -> Option<&TreeNode> {
        self.nodes.get(&index)
    }

    pub fn to_root(&self) -> i64 {
        self.root
    }

    /// Indices of every node reachable from the root, depth-first
    /// pre-order.
    pub fn reachable(&self) -> Vec<i64> {
        match self.root {
            NO_PARENT => vec![],
            root => self.region_indices(root),
        }
    }

    /// Re-derive the cached aggregate quality. Best-first/hybrid with
    /// an elite size of one reads the best open node; otherwise the
    /// best `elite_size` pooled qualities are averaged.
    pub fn calculate_quality(&mut self) -> f64 {
        let elite = self.config.elite_size;
        let best_like = matches!(
            self.config.strategy,
            SearchStrategy::BestFirst | SearchStrategy::Hybrid
        );

        self.quality = if best_like && elite == 1 {
            self.best_quality()
        } else {
            let mut qs: Vec<f64> = self.pool.iter().map(|e| e.quality).collect();
            if let Some(idx) = self.active {
                if let Some(node) = self.nodes.get(&idx) {
                    if node.is_open() {
                        qs.push(node.quality);
                    }
                }
            }
            qs.sort_by(|a, b| cmp_quality(*a, *b));
            qs.truncate(elite);
            match qs.is_empty() {
                true => OBJ_MAX,
                false => qs.iter().sum::<f64>() / (qs.len() as f64),
            }
        };
        self.quality
    }
}

impl SubTree {
    /// Process nodes until the node budget, the time budget, or (when
    /// `exit_on_better` is set) a strictly better solution stops the
    /// burst. With `leave_as_it` the pools and active node are left in
    /// place for the next burst; otherwise interrupted work is spilled
    /// back into the primary pool so no node is lost.
    pub fn explore_unit_work(
        &mut self,
        unit_nodes: i64,
        unit_time: f64,
        exit_on_better: bool,
        leave_as_it: bool,
        ctx: &mut WorkContext,
    ) -> Result<UnitWork> {
        let timer = Timer::new();
        let mut out = UnitWork::default();

        if !leave_as_it {
            if let Some(idx) = self.active.take() {
                if let Some(node) = self.nodes.get(&idx) {
                    self.pool.push(PoolEntry::from_node(node));
                }
            }
        }

        let mut best_known = ctx.best_known();

        while self.num_nodes() > 0 {
            if (out.processed + out.partial) as i64 >= unit_nodes {
                out.status = Some(ExitStatus::NodeLimit);
                break;
            } else if timer.reached(unit_time) {
                out.status = Some(ExitStatus::TimeLimit);
                break;
            }

            let idx = match self.active.take() {
                Some(idx) => idx,
                None => match self.select_next_node() {
                    Some(idx) => idx,
                    None => break,
                },
            };
            self.active = Some(idx);

            let status = match self.nodes.get(&idx) {
                Some(node) => node.status,
                None => {
                    return err_at!(
                        InvariantViolation,
                        msg: "pooled node {} not in arena", idx
                    )
                }
            };

            match status {
                NodeStatus::Pregnant => {
                    self.branch_active(idx, &mut out, ctx)?;
                }
                NodeStatus::Candidate | NodeStatus::Evaluated => {
                    let found = self.process_active(idx, status, false, ctx, &mut out)?;
                    if found {
                        let new_best = ctx.best_known();
                        if new_best < best_known {
                            best_known = new_best;
                            out.found_better = true;
                            out.status = Some(ExitStatus::Feasible);
                            if exit_on_better {
                                self.active = None;
                                break;
                            }
                        }
                    }
                    if let Some(ExitStatus::Unbounded) = out.status {
                        self.active = None;
                        break;
                    }
                }
                status => {
                    return err_at!(
                        InvariantViolation,
                        msg: "selected node {} with status {:?}", idx, status
                    )
                }
            }
            self.active = None;
        }

        if out.processed + out.partial > 0 {
            let measured = timer.elapsed() / ((out.processed + out.partial) as f64);
            ctx.stats.update_node_time(measured);
        }

        match out.status {
            Some(ExitStatus::NodeLimit)
            | Some(ExitStatus::TimeLimit)
            | Some(ExitStatus::Feasible)
                if !leave_as_it =>
            {
                self.spill_dive_pool();
                if let Some(idx) = self.active.take() {
                    if let Some(node) = self.nodes.get(&idx) {
                        self.pool.push(PoolEntry::from_node(node));
                    }
                }
            }
            _ => (),
        }

        out.depth = out.depth.max(ctx.stats.tree_depth);
        self.calculate_quality();
        if cfg!(feature = "debug") {
            self.check_tree()?;
        }
        Ok(out)
    }

    /// Breadth-style node generation to seed other participants. The
    /// first processed nodes are timed and `required_nodes` adapts to
    /// the measured per-node cost unless the caller pinned it.
    /// Returns the number of nodes fully processed.
    pub fn ramp_up(
        &mut self,
        min_nodes: i64,
        mut required_nodes: i64,
        depth: &mut i32,
        root: Option<TreeNode>,
        ctx: &mut WorkContext,
    ) -> Result<u64> {
        let mut processed = 0_u64;
        let mut np_count = 0;
        let mut first_call = true;
        let adaptive = required_nodes <= 0;

        if let Some(node) = root {
            self.set_root(node);
        }

        while !self.pool.is_empty()
            && ((self.pool.len() as i64) < required_nodes || first_call)
        {
            let entry = match self.pool.pop() {
                Some(entry) => entry,
                None => break,
            };
            let idx = entry.index;

            let status = match self.nodes.get(&idx) {
                Some(node) => node.status,
                None => {
                    return err_at!(
                        InvariantViolation,
                        msg: "pooled node {} not in arena", idx
                    )
                }
            };

            match status {
                NodeStatus::Pregnant => {
                    let mut out = UnitWork::default();
                    self.active = Some(idx);
                    self.branch_for_ramp_up(idx, &mut out, ctx)?;
                    self.active = None;
                    if *depth < out.depth {
                        *depth = out.depth;
                    }
                }
                NodeStatus::Candidate | NodeStatus::Evaluated => {
                    let timer = Timer::new();
                    let mut out = UnitWork::default();
                    self.active = Some(idx);
                    self.process_active(idx, status, true, ctx, &mut out)?;
                    self.active = None;
                    processed += 1;

                    let np_time = timer.elapsed();
                    if adaptive && np_count < 50 {
                        required_nodes =
                            compute_ramp_up_num_nodes(min_nodes, required_nodes, np_time);
                        np_count += 1;
                    }
                    first_call = false;
                }
                status => {
                    return err_at!(
                        InvariantViolation,
                        msg: "ramp-up node {} with status {:?}", idx, status
                    )
                }
            }
        }

        self.calculate_quality();
        Ok(processed)
    }

    fn select_next_node(&mut self) -> Option<i64> {
        if self.config.strategy.uses_dive_pool() {
            if self.stop_diving() {
                self.spill_dive_pool();
            }
            if let Some(entry) = self.dive_pool.pop() {
                return Some(entry.index);
            }
            self.dive_base_depth = None;
            self.pool.pop().map(|e| e.index)
        } else {
            self.pool.pop().map(|e| e.index)
        }
    }

    fn stop_diving(&self) -> bool {
        let bound = self.config.max_dive_depth;
        if bound <= 0 || self.dive_pool.is_empty() {
            return false;
        }
        match (self.dive_pool.top(), self.dive_base_depth) {
            (Some(top), Some(base)) => (top.depth - base) as i64 >= bound,
            _ => false,
        }
    }

    fn spill_dive_pool(&mut self) {
        for entry in self.dive_pool.drain() {
            // Re-key by quality when rejoining the primary pool.
            self.pool.push(entry);
        }
        self.dive_base_depth = None;
    }

    /// Branch the active pregnant node during search. Under the hybrid
    /// strategy the previous streak spills back first and the new
    /// children start the next streak in the dive pool.
    fn branch_active(
        &mut self,
        idx: i64,
        out: &mut UnitWork,
        ctx: &mut WorkContext,
    ) -> Result<()> {
        let to_dive = self.config.strategy.uses_dive_pool();
        if to_dive {
            self.spill_dive_pool();
        }

        let (depth, items) = match self.nodes.get_mut(&idx) {
            Some(node) => (node.depth, node.desc.branch()?),
            None => return err_at!(InvariantViolation, msg: "no node {}", idx),
        };

        self.create_children(idx, items, to_dive, ctx)?;

        // All children born dead prunes the parent out of the arena.
        let status = match self.nodes.get(&idx) {
            Some(node) => node.status,
            None => NodeStatus::Fathomed,
        };
        if out.depth < depth + 1 {
            out.depth = depth + 1;
        }
        if ctx.stats.tree_depth < depth + 1 {
            ctx.stats.tree_depth = depth + 1;
        }

        out.partial = out.partial.saturating_sub(1);
        out.processed += 1;
        ctx.stats.nodes_processed += 1;
        match status {
            NodeStatus::Branched => {
                out.branched += 1;
                ctx.stats.nodes_branched += 1;
            }
            NodeStatus::Fathomed => {
                out.fathomed += 1;
                if self.config.delete_dead_node && self.nodes.contains_key(&idx) {
                    self.remove_dead_nodes(idx)?;
                }
            }
            status => {
                return err_at!(
                    InvariantViolation,
                    msg: "node {} is {:?} after branching", idx, status
                )
            }
        }
        Ok(())
    }

    fn branch_for_ramp_up(
        &mut self,
        idx: i64,
        out: &mut UnitWork,
        ctx: &mut WorkContext,
    ) -> Result<()> {
        let (depth, items) = match self.nodes.get_mut(&idx) {
            Some(node) => (node.depth, node.desc.branch()?),
            None => return err_at!(InvariantViolation, msg: "no node {}", idx),
        };
        self.create_children(idx, items, false, ctx)?;

        let status = match self.nodes.get(&idx) {
            Some(node) => node.status,
            None => NodeStatus::Fathomed,
        };
        if out.depth < depth + 1 {
            out.depth = depth + 1;
        }
        if ctx.stats.tree_depth < depth + 1 {
            ctx.stats.tree_depth = depth + 1;
        }
        if status == NodeStatus::Branched {
            ctx.stats.nodes_branched += 1;
        } else if status == NodeStatus::Fathomed
            && self.config.delete_dead_node
            && self.nodes.contains_key(&idx)
        {
            self.remove_dead_nodes(idx)?;
        }
        Ok(())
    }

    /// Run the application `process` on the active node and apply the
    /// reported outcome. Returns whether a solution was banked.
    fn process_active(
        &mut self,
        idx: i64,
        old_status: NodeStatus,
        ramp_up: bool,
        ctx: &mut WorkContext,
        out: &mut UnitWork,
    ) -> Result<bool> {
        let is_root = idx == self.root;
        let args = ProcessArgs {
            is_root,
            ramp_up,
            incumbent: match ctx.best_known() {
                val if val < OBJ_MAX => Some(val),
                _ => None,
            },
        };

        let outcome = match self.nodes.get_mut(&idx) {
            Some(node) => {
                node.active = true;
                let outcome = node.desc.process(&args)?;
                node.active = false;
                outcome
            }
            None => return err_at!(InvariantViolation, msg: "no node {}", idx),
        };

        let mut banked = false;
        if let Some(sol) = outcome.solution {
            let quality = sol.quality();
            banked = ctx.solutions.push(quality, sol);
        }

        if outcome.unbounded {
            out.status = Some(ExitStatus::Unbounded);
        }

        // Quality never relaxes.
        {
            let node = self.nodes.get_mut(&idx).unwrap();
            if outcome.quality < node.quality || node.quality >= OBJ_MAX {
                node.quality = outcome.quality;
            }
            node.sol_estimate = outcome.sol_estimate.unwrap_or(node.quality);
            node.status = outcome.status;
        }

        match outcome.status {
            NodeStatus::Pregnant | NodeStatus::Evaluated => {
                // Partially done; back in the queue.
                out.partial += 1;
                ctx.stats.nodes_partial += 1;
                let (entry, depth) = {
                    let node = self.nodes.get(&idx).unwrap();
                    (PoolEntry::from_node(node), node.depth)
                };
                if self.config.strategy.uses_dive_pool() && !ramp_up {
                    if self.dive_base_depth.is_none() {
                        self.dive_base_depth = Some(depth);
                    }
                }
                self.pool.push(entry);
            }
            NodeStatus::Fathomed => {
                out.processed += 1;
                out.fathomed += 1;
                ctx.stats.nodes_processed += 1;
                if self.config.delete_dead_node {
                    self.remove_dead_nodes(idx)?;
                }
            }
            NodeStatus::Discarded if old_status == NodeStatus::Candidate => {
                out.discarded += 1;
                ctx.stats.nodes_discarded += 1;
                if self.config.delete_dead_node {
                    self.remove_dead_nodes(idx)?;
                }
            }
            status => {
                return err_at!(
                    InvariantViolation,
                    msg: "process left node {} as {:?} (was {:?})",
                    idx, status, old_status
                )
            }
        }

        Ok(banked)
    }

    /// Materialize `items` as children of `parent`, wiring indices and
    /// pool membership. Children born dead are pruned upward when
    /// `delete_dead_node` is set.
    pub fn create_children(
        &mut self,
        parent: i64,
        items: Vec<BranchItem>,
        to_dive: bool,
        ctx: &mut WorkContext,
    ) -> Result<()> {
        let (parent_depth, parent_quality) = match self.nodes.get_mut(&parent) {
            Some(node) => {
                // Fathomed until an open child proves otherwise.
                node.status = NodeStatus::Fathomed;
                (node.depth, node.quality)
            }
            None => return err_at!(InvariantViolation, msg: "no parent {}", parent),
        };

        let mut dead = vec![];
        for item in items {
            let index = ctx.indices.next_index()?;
            let mut child = TreeNode::new(index, item.desc);
            child.parent = parent;
            child.depth = parent_depth + 1;
            child.status = item.status;
            child.quality = if item.quality < OBJ_MAX {
                item.quality
            } else {
                parent_quality
            };
            child.sol_estimate = child.quality;

            match item.status {
                NodeStatus::Candidate | NodeStatus::Evaluated | NodeStatus::Pregnant => {
                    let node = self.nodes.get_mut(&parent).unwrap();
                    node.status = NodeStatus::Branched;
                    node.children.push(index);
                    let entry = PoolEntry::from_node(&child);
                    if to_dive {
                        if self.dive_base_depth.is_none() {
                            self.dive_base_depth = Some(child.depth);
                        }
                        self.dive_pool.push(entry);
                    } else {
                        self.pool.push(entry);
                    }
                    self.nodes.insert(index, child);
                }
                NodeStatus::Fathomed | NodeStatus::Discarded => {
                    let node = self.nodes.get_mut(&parent).unwrap();
                    node.children.push(index);
                    self.nodes.insert(index, child);
                    dead.push(index);
                }
                NodeStatus::Branched => {
                    return err_at!(
                        InvariantViolation,
                        msg: "child of {} born branched", parent
                    )
                }
            }
        }

        if self.config.delete_dead_node {
            for index in dead {
                self.remove_dead_nodes(index)?;
            }
        }
        Ok(())
    }

    /// Free a dead node and every ancestor it orphans. The root is
    /// never removed from the arena; it is marked fathomed instead.
    fn remove_dead_nodes(&mut self, index: i64) -> Result<()> {
        let mut index = index;
        loop {
            let (status, parent) = match self.nodes.get(&index) {
                Some(node) => (node.status, node.parent),
                None => return err_at!(InvariantViolation, msg: "no node {}", index),
            };
            if !matches!(status, NodeStatus::Fathomed | NodeStatus::Discarded) {
                return err_at!(
                    InvariantViolation,
                    msg: "removing live node {} ({:?})", index, status
                );
            }

            if self.active == Some(index) {
                self.active = None;
            }

            if parent == NO_PARENT {
                // Reached the sub-tree root.
                if let Some(node) = self.nodes.get_mut(&index) {
                    node.status = NodeStatus::Fathomed;
                }
                break;
            }

            self.nodes.remove(&index);
            match self.nodes.get_mut(&parent) {
                Some(pnode) => {
                    pnode.remove_child(index)?;
                    if pnode.num_children() == 0 {
                        pnode.status = NodeStatus::Fathomed;
                        index = parent;
                        continue;
                    }
                }
                None => {
                    return err_at!(
                        InvariantViolation,
                        msg: "dangling parent {} of {}", parent, index
                    )
                }
            }
            break;
        }
        Ok(())
    }
}

impl SubTree {
    /// Split off a piece of this tree for donation. Walks up from the
    /// best open leaf until the ancestor's sub-tree holds more than a
    /// sixth of the open nodes, or the donation would exceed
    /// `max_allow_nodes` derived from the encoded node size and the
    /// large-message bound. Returns None when the tree is too small to
    /// be worth splitting.
    pub fn split(&mut self, node_mem_size: usize, large_size: usize) -> Result<Option<SubTree>> {
        let total_open = self.num_nodes();
        if total_open < 2 {
            return Ok(None);
        }

        self.spill_dive_pool();
        if let Some(idx) = self.active.take() {
            if let Some(node) = self.nodes.get(&idx) {
                self.pool.push(PoolEntry::from_node(node));
            }
        }

        let max_allow_nodes = match max_allow_nodes(node_mem_size, large_size) {
            0 => return Ok(None),
            n => n,
        };

        let best_leaf = match self.pool.best_entry() {
            Some(entry) => entry.index,
            None => return Ok(None),
        };

        // Walk from the best leaf toward the root.
        let mut sub_root = best_leaf;
        let mut pre_sub_root = sub_root;
        while sub_root != self.root {
            pre_sub_root = sub_root;
            sub_root = match self.nodes.get(&sub_root) {
                Some(node) => node.parent,
                None => {
                    return err_at!(InvariantViolation, msg: "no node {}", sub_root)
                }
            };

            let (num_send, num_open) = self.count_region(sub_root);
            let ratio = self.config.split_ratio as usize;
            if ratio * num_open > total_open || num_send >= max_allow_nodes {
                break;
            }
        }

        if sub_root == self.root {
            sub_root = pre_sub_root;
        }
        if sub_root == self.root {
            // Nothing below the root worth detaching.
            return Ok(None);
        }

        // Promote the detached root to a self contained payload before
        // it loses its parent.
        {
            let parent_idx = self.nodes.get(&sub_root).unwrap().parent;
            let (mut sub_node, parent) = match self.nodes.remove(&sub_root) {
                Some(node) => (node, parent_idx),
                None => {
                    return err_at!(InvariantViolation, msg: "no node {}", sub_root)
                }
            };
            let pdesc = self.nodes.get(&parent).map(|n| n.desc.as_ref());
            sub_node.desc.make_explicit(pdesc)?;
            self.nodes.insert(sub_root, sub_node);
        }

        // Mark the region, detach it from its parent.
        let region = self.region_indices(sub_root);
        for idx in region.iter() {
            if let Some(node) = self.nodes.get_mut(idx) {
                node.sent_mark = 1;
            }
        }
        let parent = self.nodes.get(&sub_root).unwrap().parent;
        match self.nodes.get_mut(&parent) {
            Some(pnode) => pnode.remove_child(sub_root)?,
            None => {
                return err_at!(InvariantViolation, msg: "dangling parent {}", parent)
            }
        }

        // Partition the candidate pool by the mark.
        let mut donated = SubTree::new(self.config.clone());
        for entry in self.pool.drain() {
            let marked = self
                .nodes
                .get(&entry.index)
                .map(|n| n.sent_mark == 1)
                .unwrap_or(false);
            if marked {
                if let Some(node) = self.nodes.get_mut(&entry.index) {
                    node.sent_mark = 2;
                }
                donated.pool.push(entry);
            } else {
                self.pool.push(entry);
            }
        }

        // Move the arena region.
        for idx in region {
            if let Some(mut node) = self.nodes.remove(&idx) {
                if idx == sub_root {
                    node.parent = NO_PARENT;
                }
                donated.nodes.insert(idx, node);
            }
        }
        donated.root = sub_root;
        donated.calculate_quality();

        self.calculate_quality();
        if cfg!(feature = "debug") {
            self.check_tree()?;
            donated.check_tree()?;
        }
        Ok(Some(donated))
    }

    /// Count (total, open) nodes in the region rooted at `from`.
    fn count_region(&self, from: i64) -> (usize, usize) {
        let mut total = 0;
        let mut open = 0;
        let mut stack = vec![from];
        while let Some(idx) = stack.pop() {
            if let Some(node) = self.nodes.get(&idx) {
                total += 1;
                if node.is_open() {
                    open += 1;
                }
                stack.extend(node.children.iter().copied());
            }
        }
        (total, open)
    }

    /// Depth-first pre-order indices of the region rooted at `from`.
    fn region_indices(&self, from: i64) -> Vec<i64> {
        let mut order = vec![];
        let mut stack = vec![from];
        while let Some(idx) = stack.pop() {
            if let Some(node) = self.nodes.get(&idx) {
                order.push(idx);
                for child in node.children.iter().rev() {
                    stack.push(*child);
                }
            }
        }
        order
    }
}

impl SubTree {
    /// Serialize every node reachable from the root, depth-first
    /// pre-order. Pool membership rides on the sent mark.
    pub fn encode(&mut self) -> Result<Encoded> {
        if self.root == NO_PARENT {
            return err_at!(InvariantViolation, msg: "encoding an empty sub-tree");
        }

        self.spill_dive_pool();
        if let Some(idx) = self.active.take() {
            if let Some(node) = self.nodes.get(&idx) {
                self.pool.push(PoolEntry::from_node(node));
            }
        }

        for node in self.nodes.values_mut() {
            node.sent_mark = 0;
        }
        let pooled: Vec<i64> = self.pool.iter().map(|e| e.index).collect();
        for idx in pooled {
            if let Some(node) = self.nodes.get_mut(&idx) {
                node.sent_mark = 2;
            }
        }

        let order = self.region_indices(self.root);
        let mut buf = Encoded::new(TYPE_SUBTREE);
        buf.write_scalar(order.len() as u64);
        for idx in order {
            match self.nodes.get(&idx) {
                Some(node) => node.encode(&mut buf)?,
                None => return err_at!(InvariantViolation, msg: "no node {}", idx),
            }
        }
        Ok(buf)
    }

    /// Rebuild a sub-tree from its wire form. Parent/child wiring is
    /// re-derived by matching parent indices; candidates rejoin the
    /// pool by their sent mark, which is then cleared.
    pub fn decode(buf: &mut Encoded, registry: &Registry, config: TreeConfig) -> Result<SubTree> {
        let num_nodes: u64 = buf.read_scalar()?;
        if num_nodes == 0 {
            return err_at!(InvalidInput, msg: "sub-tree with zero nodes");
        }

        let mut st = SubTree::new(config);
        let mut order = Vec::with_capacity(num_nodes as usize);
        let mut wire_children = HashMap::new();

        for off in 0..num_nodes {
            let (mut node, num_children) = TreeNode::decode(buf, registry)?;
            if off == 0 {
                st.root = node.index;
                node.parent = NO_PARENT;
            }
            order.push(node.index);
            wire_children.insert(node.index, num_children);
            st.nodes.insert(node.index, node);
        }

        // Wire children to parents; the first decoded node is the root
        // and keeps no parent.
        for idx in order.iter().skip(1) {
            let parent = st.nodes.get(idx).unwrap().parent;
            match st.nodes.get_mut(&parent) {
                Some(pnode) => pnode.children.push(*idx),
                None => {
                    return err_at!(
                        InvariantViolation,
                        msg: "decoded node {} has unknown parent {}", idx, parent
                    )
                }
            }
        }
        for (idx, want) in wire_children {
            let got = st.nodes.get(&idx).unwrap().num_children();
            if got != want {
                return err_at!(
                    InvariantViolation,
                    msg: "node {} rebuilt {}/{} children", idx, got, want
                );
            }
        }

        for idx in order {
            let node = st.nodes.get_mut(&idx).unwrap();
            if node.sent_mark == 2 {
                node.sent_mark = 0;
                let entry = PoolEntry::from_node(node);
                st.pool.push(entry);
            } else {
                node.sent_mark = 0;
            }
        }

        st.calculate_quality();
        if cfg!(feature = "debug") {
            st.check_tree()?;
        }
        Ok(st)
    }

    /// Consistency audit over the arena and the pools, used by the
    /// `debug` build feature after every mutating operation. Every
    /// pooled entry must resolve to an open arena node, parent/child
    /// wiring must agree in both directions, and the active slot must
    /// be resident.
    pub fn check_tree(&self) -> Result<()> {
        for entry in self.pool.iter().chain(self.dive_pool.iter()) {
            match self.nodes.get(&entry.index) {
                Some(node) if node.is_open() => (),
                Some(node) => {
                    return err_at!(
                        InvariantViolation,
                        msg: "pooled node {} is {:?}", entry.index, node.status
                    )
                }
                None => {
                    return err_at!(
                        InvariantViolation,
                        msg: "pooled node {} not in arena", entry.index
                    )
                }
            }
        }

        for node in self.nodes.values() {
            for child in node.children.iter() {
                match self.nodes.get(child) {
                    Some(cnode) if cnode.parent == node.index => (),
                    Some(cnode) => {
                        return err_at!(
                            InvariantViolation,
                            msg: "node {} claims child {} whose parent is {}",
                            node.index, child, cnode.parent
                        )
                    }
                    None => {
                        return err_at!(
                            InvariantViolation,
                            msg: "node {} has dangling child {}", node.index, child
                        )
                    }
                }
            }
        }

        if let Some(idx) = self.active {
            if !self.nodes.contains_key(&idx) {
                return err_at!(InvariantViolation, msg: "active node {} not in arena", idx);
            }
        }
        Ok(())
    }

    /// Drop all nodes; used on forced termination.
    pub fn fathom_all_nodes(&mut self) {
        self.pool.clear();
        self.dive_pool.clear();
        self.nodes.clear();
        self.active = None;
        self.root = NO_PARENT;
        self.quality = OBJ_MAX;
    }
}

/// Donation size cap derived from the encoded byte size of one node
/// and the large-message bound.
fn max_allow_nodes(node_mem_size: usize, large_size: usize) -> usize {
    let node_mem_size = node_mem_size.max(1);
    let max = (large_size / 2) / node_mem_size;
    if max == 0 {
        0
    } else if node_mem_size < 10_000 {
        max.min(100)
    } else if node_mem_size < 50_000 {
        if max > 50 {
            30
        } else {
            max
        }
    } else if node_mem_size < 100_000 {
        if max > 30 {
            20
        } else {
            max
        }
    } else if node_mem_size < 500_000 {
        if max > 10 {
            5
        } else {
            max
        }
    } else if node_mem_size < 1_000_000 {
        max.min(3)
    } else {
        1
    }
}

/// Adapt the ramp-up production target to the measured per-node
/// processing time; fast nodes ask for more seeds, slow nodes fewer.
fn compute_ramp_up_num_nodes(min_nodes: i64, required: i64, np_time: f64) -> i64 {
    let np_time = if np_time < 1.0e-14 { 1.0e-5 } else { np_time };

    let mut new_nodes = if np_time > 0.01 {
        min_nodes
    } else if np_time > 0.001 {
        min_nodes * 2
    } else if np_time > 0.0005 {
        min_nodes * 5
    } else if np_time > 0.0001 {
        min_nodes * 30
    } else if np_time > 0.00005 {
        min_nodes * 60
    } else {
        min_nodes * 80
    };

    if required > 0 {
        new_nodes = (required + new_nodes) / 2;
    }
    new_nodes = new_nodes.max(min_nodes);

    if new_nodes > 20_000 {
        new_nodes = 20_000.min(min_nodes * 50);
        new_nodes = new_nodes.max(min_nodes * 10);
    }
    new_nodes
}

#[cfg(test)]
#[path = "subtree_test.rs"]
mod subtree_test;
