//! Module `knowledge` define the shared vocabulary between the engine
//! and the application.
//!
//! Knowledge is anything that can cross a participant boundary: the
//! model, tree nodes, solutions and whole sub-trees. The engine treats
//! application knowledge as opaque bytes; a [Registry] of decode
//! prototypes, populated before search starts, turns those bytes back
//! into live values.

use std::collections::HashMap;

use crate::{buf::Encoded, node::NodeData, Error, Result};

/// Type tag for node payloads.
pub const TYPE_NODE: &str = "node";
/// Type tag for solutions.
pub const TYPE_SOLUTION: &str = "solution";
/// Type tag for the model.
pub const TYPE_MODEL: &str = "model";
/// Type tag for serialized sub-trees.
pub const TYPE_SUBTREE: &str = "subtree";

/// Kinds of knowledge the engine moves around.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KnowledgeType {
    Model,
    Node,
    Solution,
    SubTree,
}

impl KnowledgeType {
    pub fn as_tag(&self) -> &'static str {
        match self {
            KnowledgeType::Model => TYPE_MODEL,
            KnowledgeType::Node => TYPE_NODE,
            KnowledgeType::Solution => TYPE_SOLUTION,
            KnowledgeType::SubTree => TYPE_SUBTREE,
        }
    }
}

/// Anything that can be serialized into an [Encoded] buffer.
pub trait Knowledge: Send {
    fn encode(&self, buf: &mut Encoded) -> Result<()>;
}

/// Application solution, an incumbent candidate.
pub trait SolutionData: Knowledge {
    /// Solution quality, smaller is better. For maximization problems
    /// applications negate their objective.
    fn quality(&self) -> f64;

    /// Human readable rendering, used when `print_solution` is set.
    fn render(&self) -> String;
}

/// Application model. One per search; the application reads the
/// instance and calls [Model::setup] before handing the model to a
/// broker, after which it is shared read-only by every participant.
pub trait Model: Knowledge + Sync {
    /// Load problem data from text. Format is application defined.
    fn read_instance(&mut self, text: &str) -> Result<()>;

    /// One time setup after instance data is read.
    fn setup(&mut self) -> Result<()>;

    /// Hook called by the broker when the search starts.
    fn preprocess(&self) -> Result<()> {
        Ok(())
    }

    /// Hook called by the broker when the search finishes.
    fn postprocess(&self) -> Result<()> {
        Ok(())
    }

    /// Payload for the root node of a fresh search tree.
    fn create_root(&self) -> Result<Box<dyn NodeData>>;
}

/// A decoded piece of application knowledge.
pub enum Decoded {
    Node(Box<dyn NodeData>),
    Solution(Box<dyn SolutionData>),
}

/// Decode prototype for one knowledge type. Applications register one
/// prototype per decodable type; prototypes typically hold a shared
/// handle to the model.
pub trait Prototype: Send + Sync {
    fn decode(&self, buf: &mut Encoded) -> Result<Decoded>;
}

/// Registry mapping a type tag to its decode prototype.
///
/// Populated once before ramp-up and read-only afterwards. One registry
/// per broker, passed explicitly to every decode site.
#[derive(Default)]
pub struct Registry {
    map: HashMap<String, Box<dyn Prototype>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry {
            map: HashMap::new(),
        }
    }

    /// Register `proto` as the decoder for knowledge tagged `tag`.
    /// Registering a tag twice replaces the earlier prototype.
    pub fn register(&mut self, tag: &str, proto: Box<dyn Prototype>) {
        self.map.insert(tag.to_string(), proto);
    }

    /// Look up the decode prototype for `tag`.
    pub fn decoder(&self, tag: &str) -> Result<&dyn Prototype> {
        match self.map.get(tag) {
            Some(proto) => Ok(proto.as_ref()),
            None => err_at!(UnknownType, msg: "no decoder for {:?}", tag),
        }
    }

    /// Decode a node payload from `buf`, dispatching on its type tag.
    pub fn decode_node(&self, buf: &mut Encoded) -> Result<Box<dyn NodeData>> {
        let tag = buf.as_type().to_string();
        match self.decoder(&tag)?.decode(buf)? {
            Decoded::Node(data) => Ok(data),
            _ => err_at!(Fatal, msg: "tag {:?} did not decode to a node", tag),
        }
    }

    /// Decode a solution from `buf`, dispatching on its type tag.
    pub fn decode_solution(&self, buf: &mut Encoded) -> Result<Box<dyn SolutionData>> {
        let tag = buf.as_type().to_string();
        match self.decoder(&tag)?.decode(buf)? {
            Decoded::Solution(sol) => Ok(sol),
            _ => err_at!(Fatal, msg: "tag {:?} did not decode to a solution", tag),
        }
    }
}

#[cfg(test)]
#[path = "knowledge_test.rs"]
mod knowledge_test;
