use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use std::sync::Arc;

use super::*;
use crate::{knap::KnapModel, knowledge::Model, params::Params, stats::ExitStatus};

fn setup(capacity: i64, items: Vec<(i64, i64)>) -> Arc<KnapModel> {
    let mut model = KnapModel::new(capacity, items);
    model.setup().unwrap();
    Arc::new(model)
}

fn quiet() -> Params {
    let mut params = Params::default();
    params.set_msg_level(0);
    params
}

#[test]
fn test_serial_single_item() {
    let model = setup(10, vec![(5, 7)]);
    let mut broker = SerialBroker::new(model, quiet()).unwrap();
    let report = broker.search().unwrap();

    assert_eq!(report.exit_status, ExitStatus::Optimal);
    assert!(report.has_solution());
    assert_eq!(report.best_quality, -7.0);
    assert_eq!(report.stats.nodes_processed, 1);
    assert_eq!(report.stats.nodes_left, 0);
    assert_eq!(report.incumbent_rank, 0);

    let sol = report.solution.unwrap();
    assert_eq!(sol.quality(), -7.0);
    assert_eq!(sol.render(), "value 7 items [0]");
}

#[test]
fn test_serial_two_items() {
    let model = setup(10, vec![(5, 7), (6, 8)]);
    let mut broker = SerialBroker::new(model, quiet()).unwrap();
    let report = broker.search().unwrap();

    assert_eq!(report.exit_status, ExitStatus::Optimal);
    assert_eq!(report.best_quality, -8.0);
    assert_eq!(report.stats.tree_depth, 2);
    assert_eq!(report.stats.nodes_processed, 4);
    assert_eq!(report.stats.nodes_left, 0);

    // Optimal packing holds exactly the second input item, which
    // sorts behind the denser first one.
    let sol = report.solution.unwrap();
    assert_eq!(sol.render(), "value 8 items [1]");
}

#[test]
fn test_serial_infeasible() {
    let model = setup(0, vec![(1, 1)]);
    let mut broker = SerialBroker::new(model, quiet()).unwrap();
    let report = broker.search().unwrap();

    assert_eq!(report.exit_status, ExitStatus::Infeasible);
    assert!(!report.has_solution());
    assert!(report.solution.is_none());
    assert_eq!(report.stats.nodes_processed, 1);
}

#[test]
fn test_serial_node_limit() {
    let model = setup(10, vec![(5, 7), (6, 8)]);
    let mut params = quiet();
    params.set_node_limit(0);

    let mut broker = SerialBroker::new(model, params).unwrap();
    let report = broker.search().unwrap();

    assert_eq!(report.exit_status, ExitStatus::NodeLimit);
    assert_eq!(report.stats.nodes_processed, 0);
    assert!(!report.has_solution());
}

#[test]
fn test_serial_sol_limit() {
    let model = setup(30, vec![(19, 21), (17, 18), (13, 15), (11, 14), (7, 7)]);
    let mut params = quiet();
    params.set_sol_limit(1);

    let mut broker = SerialBroker::new(model, params).unwrap();
    let report = broker.search().unwrap();

    assert_eq!(report.exit_status, ExitStatus::SolLimit);
    assert!(report.has_solution());
}

#[test]
fn test_serial_strategies_agree() {
    let model = setup(30, vec![(19, 21), (17, 18), (13, 15), (11, 14), (7, 7)]);

    let mut results = vec![];
    for code in 0..5 {
        let mut params = quiet();
        params.search_strategy = code;
        let mut broker =
            SerialBroker::new(Arc::clone(&model) as Arc<dyn Model>, params).unwrap();
        let report = broker.search().unwrap();
        assert_eq!(report.exit_status, ExitStatus::Optimal, "strategy {}", code);
        results.push(report.best_quality);
    }
    for quality in results.iter() {
        assert_eq!(*quality, results[0]);
    }
}

#[test]
fn test_serial_vs_exhaustive() {
    let seed: u64 = random();
    let mut rng = SmallRng::seed_from_u64(seed);
    println!("test_serial_vs_exhaustive {}", seed);

    for _i in 0..10 {
        let n = rng.gen_range(4..=10_usize);
        let model = {
            let mut m = KnapModel::gen_instance(n, rng.gen());
            m.setup().unwrap();
            Arc::new(m)
        };

        // Brute force over all packings.
        let mut best = 0_i64;
        for mask in 0_u32..(1 << n) {
            let mut size = 0;
            let mut value = 0;
            for off in 0..n {
                if mask & (1 << off) != 0 {
                    let (s, p) = model.to_item(off);
                    size += s;
                    value += p;
                }
            }
            if size <= model.to_capacity() && value > best {
                best = value;
            }
        }

        let mut broker = SerialBroker::new(Arc::clone(&model) as Arc<dyn Model>, quiet()).unwrap();
        let report = broker.search().unwrap();

        if best == 0 {
            assert!(!report.has_solution());
        } else {
            assert_eq!(report.best_quality, -(best as f64), "seed {}", seed);
        }
    }
}
