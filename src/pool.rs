//! Module `pool` implement the priority pools used by the engine.
//!
//! All three pools order by quality-like keys where smaller is better.
//! [NodePool] and [SubTreePool] are binary heaps under a swappable
//! [SearchStrategy] comparator; swapping the comparator re-heapifies
//! eagerly. [SolutionPool] is a bounded multiset of incumbents.

use crate::{
    cmp_quality, knowledge::SolutionData, node::TreeNode, strategy::SearchStrategy,
    subtree::SubTree, OBJ_MAX,
};

/// Key material for one pooled node. Everything the comparators need,
/// kept away from the node arena so re-heapify never touches payloads.
#[derive(Clone, Copy, Debug)]
pub struct PoolEntry {
    pub index: i64,
    pub quality: f64,
    pub depth: i32,
    pub sol_estimate: f64,
}

impl PoolEntry {
    pub fn from_node(node: &TreeNode) -> PoolEntry {
        PoolEntry {
            index: node.index,
            quality: node.quality,
            depth: node.depth,
            sol_estimate: node.sol_estimate,
        }
    }
}

/// Priority queue of candidate nodes.
pub struct NodePool {
    strategy: SearchStrategy,
    heap: Vec<PoolEntry>,
}

impl NodePool {
    pub fn new(strategy: SearchStrategy) -> NodePool {
        NodePool {
            strategy,
            heap: Vec::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn push(&mut self, entry: PoolEntry) {
        self.heap.push(entry);
        self.sift_up(self.heap.len() - 1);
    }

    /// Remove and return the entry the comparator likes most.
    pub fn pop(&mut self) -> Option<PoolEntry> {
        match self.heap.len() {
            0 => None,
            1 => self.heap.pop(),
            _ => {
                let top = self.heap.swap_remove(0);
                self.sift_down(0);
                Some(top)
            }
        }
    }

    pub fn top(&self) -> Option<&PoolEntry> {
        self.heap.first()
    }

    /// Swap the comparator and re-heapify, O(n).
    pub fn set_strategy(&mut self, strategy: SearchStrategy) {
        self.strategy = strategy;
        if self.heap.len() > 1 {
            for off in (0..self.heap.len() / 2).rev() {
                self.sift_down(off);
            }
        }
    }

    pub fn strategy(&self) -> SearchStrategy {
        self.strategy
    }

    /// Best quality over all pooled entries. Scans, because the heap
    /// top minimises the active comparator, not necessarily quality.
    pub fn best_quality(&self) -> f64 {
        self.heap
            .iter()
            .map(|e| e.quality)
            .fold(OBJ_MAX, |acc, q| if q < acc { q } else { acc })
    }

    /// Entry with the best quality, irrespective of the comparator.
    pub fn best_entry(&self) -> Option<&PoolEntry> {
        self.heap
            .iter()
            .min_by(|a, b| cmp_quality(a.quality, b.quality).then(a.index.cmp(&b.index)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PoolEntry> {
        self.heap.iter()
    }

    pub fn drain(&mut self) -> Vec<PoolEntry> {
        std::mem::take(&mut self.heap)
    }

    fn sift_up(&mut self, mut off: usize) {
        while off > 0 {
            let up = (off - 1) / 2;
            match self.strategy.cmp_nodes(&self.heap[off], &self.heap[up]) {
                std::cmp::Ordering::Less => {
                    self.heap.swap(off, up);
                    off = up;
                }
                _ => break,
            }
        }
    }

    fn sift_down(&mut self, mut off: usize) {
        let n = self.heap.len();
        loop {
            let (left, right) = (2 * off + 1, 2 * off + 2);
            let mut best = off;
            if left < n {
                if let std::cmp::Ordering::Less =
                    self.strategy.cmp_nodes(&self.heap[left], &self.heap[best])
                {
                    best = left;
                }
            }
            if right < n {
                if let std::cmp::Ordering::Less =
                    self.strategy.cmp_nodes(&self.heap[right], &self.heap[best])
                {
                    best = right;
                }
            }
            if best == off {
                break;
            }
            self.heap.swap(off, best);
            off = best;
        }
    }
}

/// Priority queue of whole sub-trees.
pub struct SubTreePool {
    strategy: SearchStrategy,
    heap: Vec<SubTree>,
}

impl SubTreePool {
    pub fn new(strategy: SearchStrategy) -> SubTreePool {
        SubTreePool {
            strategy,
            heap: Vec::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn push(&mut self, st: SubTree) {
        self.heap.push(st);
        self.sift_up(self.heap.len() - 1);
    }

    pub fn pop(&mut self) -> Option<SubTree> {
        match self.heap.len() {
            0 => None,
            1 => self.heap.pop(),
            _ => {
                let top = self.heap.swap_remove(0);
                self.sift_down(0);
                Some(top)
            }
        }
    }

    pub fn top(&self) -> Option<&SubTree> {
        self.heap.first()
    }

    pub fn set_strategy(&mut self, strategy: SearchStrategy) {
        self.strategy = strategy;
        if self.heap.len() > 1 {
            for off in (0..self.heap.len() / 2).rev() {
                self.sift_down(off);
            }
        }
    }

    /// Best quality over pooled sub-trees, [OBJ_MAX] when empty.
    pub fn best_quality(&self) -> f64 {
        self.heap
            .iter()
            .map(|st| st.quality())
            .fold(OBJ_MAX, |acc, q| if q < acc { q } else { acc })
    }

    /// Total number of nodes across pooled sub-trees, the work
    /// quantity this pool represents.
    pub fn total_nodes(&self) -> usize {
        self.heap.iter().map(|st| st.num_nodes()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubTree> {
        self.heap.iter()
    }

    fn sift_up(&mut self, mut off: usize) {
        while off > 0 {
            let up = (off - 1) / 2;
            match self.strategy.cmp_trees(&self.heap[off], &self.heap[up]) {
                std::cmp::Ordering::Less => {
                    self.heap.swap(off, up);
                    off = up;
                }
                _ => break,
            }
        }
    }

    fn sift_down(&mut self, mut off: usize) {
        let n = self.heap.len();
        loop {
            let (left, right) = (2 * off + 1, 2 * off + 2);
            let mut best = off;
            if left < n {
                if let std::cmp::Ordering::Less =
                    self.strategy.cmp_trees(&self.heap[left], &self.heap[best])
                {
                    best = left;
                }
            }
            if right < n {
                if let std::cmp::Ordering::Less =
                    self.strategy.cmp_trees(&self.heap[right], &self.heap[best])
                {
                    best = right;
                }
            }
            if best == off {
                break;
            }
            self.heap.swap(off, best);
            off = best;
        }
    }
}

/// Bounded multiset of incumbents, ordered by quality.
pub struct SolutionPool {
    limit: usize,
    sols: Vec<(f64, Box<dyn SolutionData>)>,
}

impl SolutionPool {
    /// `limit` bounds how many solutions are retained; 0 is treated
    /// as 1.
    pub fn new(limit: usize) -> SolutionPool {
        SolutionPool {
            limit: limit.max(1),
            sols: Vec::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.sols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sols.is_empty()
    }

    /// Add a solution; return whether it was retained. The pool stays
    /// sorted ascending by quality and never exceeds its bound.
    pub fn push(&mut self, quality: f64, sol: Box<dyn SolutionData>) -> bool {
        let off = self
            .sols
            .partition_point(|(q, _)| cmp_quality(*q, quality).is_le());
        if off >= self.limit {
            return false;
        }
        self.sols.insert(off, (quality, sol));
        self.sols.truncate(self.limit);
        true
    }

    /// Best retained solution.
    pub fn best(&self) -> Option<(f64, &dyn SolutionData)> {
        self.sols.first().map(|(q, sol)| (*q, sol.as_ref()))
    }

    pub fn best_quality(&self) -> f64 {
        self.sols.first().map(|(q, _)| *q).unwrap_or(OBJ_MAX)
    }

    pub fn take_best(&mut self) -> Option<(f64, Box<dyn SolutionData>)> {
        match self.sols.is_empty() {
            true => None,
            false => Some(self.sols.remove(0)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(f64, Box<dyn SolutionData>)> {
        self.sols.iter()
    }
}

#[cfg(test)]
#[path = "pool_test.rs"]
mod pool_test;
