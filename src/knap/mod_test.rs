use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use super::*;
use crate::node::NodeStatus;

fn setup(capacity: i64, items: Vec<(i64, i64)>) -> Arc<KnapModel> {
    let mut model = KnapModel::new(capacity, items);
    model.setup().unwrap();
    Arc::new(model)
}

fn args(incumbent: Option<f64>) -> ProcessArgs {
    ProcessArgs {
        is_root: false,
        ramp_up: false,
        incumbent,
    }
}

#[test]
fn test_knap_read_instance() {
    let mut model = KnapModel::new(0, vec![]);
    model.read_instance("3 10\n5 7\n6 8\n1 1\n").unwrap();
    assert_eq!(model.to_capacity(), 10);
    assert_eq!(model.num_items(), 3);

    model.setup().unwrap();
    // Sorted by value density, densest first.
    assert_eq!(model.to_item(0), (5, 7));
    assert_eq!(model.to_item(1), (6, 8));
    assert_eq!(model.to_item(2), (1, 1));

    assert!(KnapModel::new(0, vec![])
        .read_instance("2 10\n5")
        .is_err());
    assert!(KnapModel::new(10, vec![(0, 3)]).setup().is_err());
}

#[test]
fn test_knap_process_feasible_leaf() {
    // Everything fits; the root is itself the optimal packing.
    let model = setup(10, vec![(5, 7)]);
    let mut root = model.create_root().unwrap();

    let out = root.process(&args(None)).unwrap();
    assert_eq!(out.status, NodeStatus::Fathomed);
    assert_eq!(out.quality, -7.0);
    let sol = out.solution.expect("solution");
    assert_eq!(sol.quality(), -7.0);

    // No solution is reported when the incumbent is at least as good.
    let mut root = model.create_root().unwrap();
    let out = root.process(&args(Some(-7.0))).unwrap();
    assert_eq!(out.status, NodeStatus::Fathomed);
    assert!(out.solution.is_none());
}

#[test]
fn test_knap_process_infeasible() {
    let model = setup(0, vec![(1, 1)]);
    let mut root = model.create_root().unwrap();

    let out = root.process(&args(None)).unwrap();
    assert_eq!(out.status, NodeStatus::Fathomed);
    assert!(out.solution.is_none());
    assert_eq!(out.quality, 0.0);
}

#[test]
fn test_knap_process_branch() {
    let model = setup(10, vec![(5, 7), (6, 8)]);
    let mut root = model.create_root().unwrap();

    let out = root.process(&args(None)).unwrap();
    assert_eq!(out.status, NodeStatus::Pregnant);
    // Fractional bound: 7 + 8 * 5/6.
    assert!((out.quality - -(7.0 + 8.0 * 5.0 / 6.0)).abs() < 1e-9);

    let children = root.branch().unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0].status, NodeStatus::Candidate);
    assert_eq!(children[1].status, NodeStatus::Candidate);

    // Fixing in an item bigger than the capacity births the child
    // fathomed.
    let model = setup(10, vec![(5, 7), (12, 6)]);
    let mut node = model.create_root().unwrap();
    let out = node.process(&args(None)).unwrap();
    assert_eq!(out.status, NodeStatus::Pregnant);
    let children = node.branch().unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0].status, NodeStatus::Candidate);
    assert_eq!(children[1].status, NodeStatus::Fathomed);

    // Branching an unprocessed payload is a bug.
    let mut fresh = model.create_root().unwrap();
    assert!(fresh.branch().is_err());
}

#[test]
fn test_knap_solution_render() {
    let model = setup(10, vec![(5, 7)]);
    let mut root = model.create_root().unwrap();
    let out = root.process(&args(None)).unwrap();
    let sol = out.solution.unwrap();

    assert_eq!(sol.render(), "value 7 items [0]");
}

#[test]
fn test_knap_wire_roundtrip() {
    let seed: u64 = random();
    let mut rng = SmallRng::seed_from_u64(seed);
    println!("test_knap_wire_roundtrip {}", seed);

    let model = setup(30, vec![(19, 21), (17, 18), (13, 15), (11, 14), (7, 7)]);
    let proto = model.to_proto();

    for _i in 0..100 {
        // Walk a random path down the tree, then round-trip the
        // payload and check both sides branch identically.
        let mut desc = model.create_root().unwrap();
        loop {
            let out = desc.process(&args(None)).unwrap();
            match out.status {
                NodeStatus::Pregnant => (),
                _ => break,
            }

            let mut buf = Encoded::new(TYPE_NODE);
            desc.encode(&mut buf).unwrap();
            let mut back = match proto.decode(&mut buf).unwrap() {
                Decoded::Node(back) => back,
                _ => panic!("expected node"),
            };

            let mut children = desc.branch().unwrap();
            let mut back_children = back.branch().unwrap();
            assert_eq!(children.len(), back_children.len());

            let pick = (rng.gen::<u8>() as usize) % children.len();
            desc = children.remove(pick).desc;
            back_children.clear();
        }
    }

    // Solutions ride the same registry.
    let sol = {
        let leaf_model = setup(10, vec![(5, 7)]);
        let mut leaf = leaf_model.create_root().unwrap();
        leaf.process(&args(None)).unwrap().solution.unwrap()
    };

    let mut buf = Encoded::new(TYPE_SOLUTION);
    sol.encode(&mut buf).unwrap();
    match proto.decode(&mut buf).unwrap() {
        Decoded::Solution(back) => {
            assert_eq!(back.quality(), sol.quality());
            assert_eq!(back.render(), sol.render());
        }
        _ => panic!("expected solution"),
    }

    // Unknown tags fail decode.
    let mut buf = Encoded::new("mystery");
    buf.write_bytes(&[1, 2, 3]);
    assert!(proto.decode(&mut buf).is_err());
}

#[test]
fn test_knap_gen_instance() {
    let model = KnapModel::gen_instance(20, 42);
    assert_eq!(model.num_items(), 20);
    assert!(model.to_capacity() > 0);

    // Same seed, same instance.
    let again = KnapModel::gen_instance(20, 42);
    assert_eq!(model.to_capacity(), again.to_capacity());
    for off in 0..20 {
        assert_eq!(model.to_item(off), again.to_item(off));
    }
}
