use std::sync::Arc;

use super::*;
use crate::{knap::KnapModel, Error};

#[test]
fn test_knowledge_type_tags() {
    assert_eq!(KnowledgeType::Model.as_tag(), TYPE_MODEL);
    assert_eq!(KnowledgeType::Node.as_tag(), TYPE_NODE);
    assert_eq!(KnowledgeType::Solution.as_tag(), TYPE_SOLUTION);
    assert_eq!(KnowledgeType::SubTree.as_tag(), TYPE_SUBTREE);
}

#[test]
fn test_registry_unknown_type() {
    let registry = Registry::new();
    match registry.decoder("no-such-tag") {
        Err(Error::UnknownType(_, _)) => (),
        res => panic!("expected UnknownType {:?}", res.map(|_| ())),
    }
}

#[test]
fn test_registry_decode() {
    let model = {
        let mut m = KnapModel::new(10, vec![(5, 7), (6, 8)]);
        m.setup().unwrap();
        Arc::new(m)
    };

    let mut registry = Registry::new();
    registry.register(TYPE_NODE, model.to_proto());
    registry.register(TYPE_SOLUTION, model.to_proto());

    assert!(registry.decoder(TYPE_NODE).is_ok());
    assert!(registry.decoder(TYPE_SOLUTION).is_ok());

    // A node payload round-trips through the registry.
    let desc = model.create_root().unwrap();
    let mut buf = Encoded::new(TYPE_NODE);
    desc.encode(&mut buf).unwrap();
    registry.decode_node(&mut buf).unwrap();

    // A node buffer does not decode as a solution.
    let mut buf = Encoded::new(TYPE_NODE);
    desc.encode(&mut buf).unwrap();
    assert!(registry.decode_solution(&mut buf).is_err());
}
