use std::sync::Arc;

use super::*;
use crate::{
    knap::KnapModel,
    knowledge::{Model, Registry, TYPE_NODE},
};

#[test]
fn test_node_status() {
    use NodeStatus::*;

    for status in [Candidate, Evaluated, Pregnant, Branched, Fathomed, Discarded].iter() {
        assert_eq!(NodeStatus::from_wire(status.to_wire()).unwrap(), *status);
    }
    assert!(NodeStatus::from_wire(6).is_err());

    assert!(Candidate.is_open());
    assert!(Evaluated.is_open());
    assert!(Pregnant.is_open());
    assert!(Branched.is_terminal());
    assert!(Fathomed.is_terminal());
    assert!(Discarded.is_terminal());
}

#[test]
fn test_node_children() {
    let model = Arc::new(KnapModel::new(10, vec![(5, 7)]));
    let mut node = TreeNode::new(1, model.create_root().unwrap());
    node.children = vec![2, 3, 4];

    node.remove_child(3).unwrap();
    assert_eq!(node.num_children(), 2);
    assert!(node.children.contains(&2));
    assert!(node.children.contains(&4));

    match node.remove_child(3) {
        Err(Error::InvariantViolation(_, _)) => (),
        res => panic!("expected InvariantViolation {:?}", res),
    }
}

#[test]
fn test_node_encode_decode() {
    let model = {
        let mut m = KnapModel::new(10, vec![(5, 7), (6, 8)]);
        m.setup().unwrap();
        Arc::new(m)
    };
    let mut registry = Registry::new();
    registry.register(TYPE_NODE, model.to_proto());

    let mut node = TreeNode::new(42, model.create_root().unwrap());
    node.parent = 7;
    node.depth = 3;
    node.quality = -13.5;
    node.sol_estimate = -14.0;
    node.status = NodeStatus::Evaluated;
    node.sent_mark = 2;
    node.children = vec![43, 44];

    let mut buf = crate::buf::Encoded::new(TYPE_NODE);
    node.encode(&mut buf).unwrap();

    let (back, num_children) = TreeNode::decode(&mut buf, &registry).unwrap();
    assert_eq!(back.index, 42);
    assert_eq!(back.parent, 7);
    assert_eq!(back.depth, 3);
    assert_eq!(back.quality, -13.5);
    assert_eq!(back.sol_estimate, -14.0);
    assert_eq!(back.status, NodeStatus::Evaluated);
    assert_eq!(back.sent_mark, 2);
    assert_eq!(num_children, 2);
    // Wiring is rebuilt by the container, not the node codec.
    assert_eq!(back.num_children(), 0);
}
