//! Module `node` implement the tree node and the application payload
//! contract.
//!
//! The engine owns the search related fields of a node, index, depth,
//! status, quality, parent/child wiring. The application owns the
//! payload, a [NodeData] value, which knows how to bound itself
//! (`process`) and how to split itself (`branch`).

use crate::{
    buf::Encoded,
    knowledge::SolutionData,
    Error, Result,
};

/// Index value standing for "no parent".
pub const NO_PARENT: i64 = -1;

/// Life cycle of a tree node.
///
/// Allowed transitions:
///
/// ```text
/// Candidate -> Evaluated | Pregnant | Fathomed | Discarded
/// Evaluated -> Evaluated | Pregnant | Fathomed
/// Pregnant  -> Branched
/// ```
///
/// Branched, Fathomed and Discarded are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeStatus {
    Candidate,
    Evaluated,
    Pregnant,
    Branched,
    Fathomed,
    Discarded,
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeStatus::Branched | NodeStatus::Fathomed | NodeStatus::Discarded
        )
    }

    /// Open nodes hold un-finished work.
    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }

    pub fn to_wire(&self) -> u8 {
        match self {
            NodeStatus::Candidate => 0,
            NodeStatus::Evaluated => 1,
            NodeStatus::Pregnant => 2,
            NodeStatus::Branched => 3,
            NodeStatus::Fathomed => 4,
            NodeStatus::Discarded => 5,
        }
    }

    pub fn from_wire(val: u8) -> Result<NodeStatus> {
        let status = match val {
            0 => NodeStatus::Candidate,
            1 => NodeStatus::Evaluated,
            2 => NodeStatus::Pregnant,
            3 => NodeStatus::Branched,
            4 => NodeStatus::Fathomed,
            5 => NodeStatus::Discarded,
            _ => return err_at!(FailConvert, msg: "node status {}", val),
        };
        Ok(status)
    }
}

/// Arguments handed to [NodeData::process].
pub struct ProcessArgs {
    /// Whether the node being processed is the root of the search tree.
    pub is_root: bool,
    /// Whether the engine is still in the ramp-up phase.
    pub ramp_up: bool,
    /// Best known solution quality, if any solution is known.
    pub incumbent: Option<f64>,
}

/// What happened when a node was processed.
///
/// The engine applies the reported status and quality to the node; the
/// payload never mutates engine owned fields directly.
pub struct ProcessOutcome {
    /// New status for the node. Must honor the [NodeStatus] transition
    /// table.
    pub status: NodeStatus,
    /// Tightened quality for the node.
    pub quality: f64,
    /// Estimate of the best solution reachable below this node, when
    /// the application tracks one.
    pub sol_estimate: Option<f64>,
    /// A feasible solution discovered while processing, if any.
    pub solution: Option<Box<dyn SolutionData>>,
    /// The relaxation is unbounded; the whole search stops.
    pub unbounded: bool,
}

impl ProcessOutcome {
    /// Plain outcome carrying status and quality.
    pub fn new(status: NodeStatus, quality: f64) -> ProcessOutcome {
        ProcessOutcome {
            status,
            quality,
            sol_estimate: None,
            solution: None,
            unbounded: false,
        }
    }

    pub fn set_solution(mut self, sol: Box<dyn SolutionData>) -> ProcessOutcome {
        self.solution = Some(sol);
        self
    }
}

/// One child produced by [NodeData::branch].
pub struct BranchItem {
    pub desc: Box<dyn NodeData>,
    pub status: NodeStatus,
    pub quality: f64,
}

impl BranchItem {
    pub fn new(desc: Box<dyn NodeData>, status: NodeStatus, quality: f64) -> BranchItem {
        BranchItem {
            desc,
            status,
            quality,
        }
    }
}

/// Application payload carried by every tree node.
pub trait NodeData: Send {
    /// Evaluate/bound this node. Called while the node's status is
    /// Candidate or Evaluated, at most once per status change.
    fn process(&mut self, args: &ProcessArgs) -> Result<ProcessOutcome>;

    /// Materialize children. Called exactly when the node's status is
    /// Pregnant.
    fn branch(&mut self) -> Result<Vec<BranchItem>>;

    /// Serialize the payload. Field order is the application contract
    /// with its registered decode prototype.
    fn encode(&self, buf: &mut Encoded) -> Result<()>;

    /// Whether the payload is self contained, or differenced against
    /// its parent's payload.
    fn is_explicit(&self) -> bool {
        true
    }

    /// Promote a differenced payload to a self contained one. `parent`
    /// is the parent's payload when it is still resident.
    fn make_explicit(&mut self, _parent: Option<&dyn NodeData>) -> Result<()> {
        Ok(())
    }
}

/// A node of the search tree.
///
/// Nodes live in a [crate::subtree::SubTree] arena; `parent` and
/// `children` hold node indices, not references, which keeps ownership
/// single-sided while still allowing upward pruning.
pub struct TreeNode {
    pub index: i64,
    pub parent: i64,
    pub depth: i32,
    pub quality: f64,
    pub sol_estimate: f64,
    pub status: NodeStatus,
    pub active: bool,
    pub sent_mark: u8,
    pub children: Vec<i64>,
    pub desc: Box<dyn NodeData>,
}

impl TreeNode {
    /// Create a fresh root-like node wrapping `desc`.
    pub fn new(index: i64, desc: Box<dyn NodeData>) -> TreeNode {
        TreeNode {
            index,
            parent: NO_PARENT,
            depth: 0,
            quality: crate::OBJ_MAX,
            sol_estimate: crate::OBJ_MAX,
            status: NodeStatus::Candidate,
            active: false,
            sent_mark: 0,
            children: Vec::default(),
            desc,
        }
    }

    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Remove `child` from this node's child list.
    pub fn remove_child(&mut self, child: i64) -> Result<()> {
        match self.children.iter().position(|c| *c == child) {
            Some(off) => {
                self.children.swap_remove(off);
                Ok(())
            }
            None => err_at!(
                InvariantViolation,
                msg: "node {} has no child {}", self.index, child
            ),
        }
    }

    /// Serialize the engine owned fields followed by the payload. The
    /// payload rides as a nested, counted byte string so that its
    /// decode prototype sees a buffer tagged with the node type.
    pub fn encode(&self, buf: &mut Encoded) -> Result<()> {
        buf.write_scalar(self.desc.is_explicit());
        buf.write_scalar(self.index);
        buf.write_scalar(self.parent);
        buf.write_scalar(self.depth);
        buf.write_scalar(self.quality);
        buf.write_scalar(self.sol_estimate);
        buf.write_scalar(self.status.to_wire());
        buf.write_scalar(self.sent_mark);
        buf.write_scalar(self.children.len() as u64);

        let mut nested = Encoded::new(crate::knowledge::TYPE_NODE);
        self.desc.encode(&mut nested)?;
        buf.write_bytes(nested.as_bytes());
        Ok(())
    }

    /// Reverse of [TreeNode::encode]. Returns the node and the child
    /// count recorded on the wire; the caller re-wires children by
    /// matching parent indices.
    pub fn decode(
        buf: &mut Encoded,
        registry: &crate::knowledge::Registry,
    ) -> Result<(TreeNode, usize)> {
        let _explicit: bool = buf.read_scalar()?;
        let index: i64 = buf.read_scalar()?;
        let parent: i64 = buf.read_scalar()?;
        let depth: i32 = buf.read_scalar()?;
        let quality: f64 = buf.read_scalar()?;
        let sol_estimate: f64 = buf.read_scalar()?;
        let status = NodeStatus::from_wire(buf.read_scalar()?)?;
        let sent_mark: u8 = buf.read_scalar()?;
        let num_children: u64 = buf.read_scalar()?;
        let desc = {
            let bytes = buf.read_bytes()?;
            let mut nested = Encoded::from_parts(crate::knowledge::TYPE_NODE, bytes);
            registry.decode_node(&mut nested)?
        };

        let node = TreeNode {
            index,
            parent,
            depth,
            quality,
            sol_estimate,
            status,
            active: false,
            sent_mark,
            children: Vec::default(),
            desc,
        };
        Ok((node, num_children as usize))
    }
}

#[cfg(test)]
#[path = "node_test.rs"]
mod node_test;
