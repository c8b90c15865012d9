use std::sync::Arc;

use super::*;
use crate::{
    knap::KnapModel,
    knowledge::{Model, TYPE_NODE, TYPE_SOLUTION},
    params::Params,
    stats::ExitStatus,
};

fn setup(capacity: i64, items: Vec<(i64, i64)>) -> Arc<KnapModel> {
    let mut model = KnapModel::new(capacity, items);
    model.setup().unwrap();
    Arc::new(model)
}

fn broker(model: &Arc<KnapModel>, params: Params) -> ParBroker {
    let mut broker = ParBroker::new(Arc::clone(model) as Arc<dyn Model>, params).unwrap();
    broker.register(TYPE_NODE, model.to_proto());
    broker.register(TYPE_SOLUTION, model.to_proto());
    broker
}

fn quiet(process_num: i64) -> Params {
    let mut params = Params::default();
    params.set_msg_level(0).set_process_num(process_num);
    params.hub_msg_level = 0;
    params.worker_msg_level = 0;
    params
}

/// Capacity 50, ten items; the instance from the deterministic
/// end-to-end scenario.
fn ten_items() -> Arc<KnapModel> {
    setup(
        50,
        vec![
            (7, 9),
            (12, 14),
            (5, 5),
            (9, 12),
            (14, 15),
            (6, 8),
            (11, 11),
            (4, 6),
            (8, 8),
            (10, 13),
        ],
    )
}

#[test]
fn test_topology() {
    use super::band_check;

    // Hub count shrinks until the last cluster has at least two
    // ranks; bands stay disjoint throughout.
    band_check(2, 1);
    band_check(2, 2);
    band_check(4, 2);
    band_check(6, 3);
    band_check(13, 4);
}

#[test]
fn test_parallel_two_procs() {
    let model = setup(10, vec![(5, 7), (6, 8)]);
    let report = broker(&model, quiet(2)).search().unwrap();

    assert_eq!(report.exit_status, ExitStatus::Optimal);
    assert_eq!(report.best_quality, -8.0);
    assert!(report.has_solution());
    assert_eq!(report.solution.unwrap().quality(), -8.0);
    assert_eq!(report.stats.nodes_left, 0);
}

#[test]
fn test_parallel_deterministic_objective() {
    let model = ten_items();

    // The serial run pins the expected optimum.
    let serial = {
        let mut b = crate::broker::SerialBroker::new(
            Arc::clone(&model) as Arc<dyn Model>,
            quiet(1),
        )
        .unwrap();
        b.search().unwrap()
    };
    assert_eq!(serial.exit_status, ExitStatus::Optimal);
    assert!(serial.has_solution());

    // 1, 2 and 4 participants all land on the same objective value.
    for process_num in [1, 2, 4].iter() {
        let report = broker(&model, quiet(*process_num)).search().unwrap();
        assert_eq!(
            report.exit_status,
            ExitStatus::Optimal,
            "process_num {}",
            process_num
        );
        assert_eq!(
            report.best_quality, serial.best_quality,
            "process_num {}",
            process_num
        );
        assert!(report.incumbent_rank < (*process_num).max(1) as usize);
    }
}

#[test]
fn test_parallel_two_hubs() {
    let model = ten_items();

    let mut params = quiet(4);
    params.set_hub_num(2);
    let report = broker(&model, params).search().unwrap();

    assert_eq!(report.exit_status, ExitStatus::Optimal);

    let serial = {
        let mut b = crate::broker::SerialBroker::new(
            Arc::clone(&model) as Arc<dyn Model>,
            quiet(1),
        )
        .unwrap();
        b.search().unwrap()
    };
    assert_eq!(report.best_quality, serial.best_quality);
}

#[test]
fn test_parallel_working_hubs() {
    let model = ten_items();

    let mut params = quiet(4);
    params.set_hub_num(2);
    params.max_hub_work_size = 1;
    assert!(params.hub_works());

    let report = broker(&model, params).search().unwrap();
    assert_eq!(report.exit_status, ExitStatus::Optimal);

    let serial = {
        let mut b = crate::broker::SerialBroker::new(
            Arc::clone(&model) as Arc<dyn Model>,
            quiet(1),
        )
        .unwrap();
        b.search().unwrap()
    };
    assert_eq!(report.best_quality, serial.best_quality);
}

#[test]
fn test_parallel_incumbent_convergence() {
    // Four participants race on a harder instance; whoever discovers
    // the optimum, every rank converges on one (quality, origin)
    // winner and the master ends up holding the solution object.
    let model = {
        let mut m = KnapModel::gen_instance(14, 0xfeed);
        m.setup().unwrap();
        Arc::new(m)
    };

    let serial = {
        let mut b = crate::broker::SerialBroker::new(
            Arc::clone(&model) as Arc<dyn Model>,
            quiet(1),
        )
        .unwrap();
        b.search().unwrap()
    };

    let report = broker(&model, quiet(4)).search().unwrap();
    assert_eq!(report.exit_status, ExitStatus::Optimal);
    assert_eq!(report.best_quality, serial.best_quality);
    assert!(report.incumbent_rank < 4);
    let sol = report.solution.expect("gathered solution");
    assert_eq!(sol.quality(), serial.best_quality);
}

#[test]
fn test_parallel_infeasible() {
    let model = setup(0, vec![(1, 1)]);
    let report = broker(&model, quiet(4)).search().unwrap();

    assert_eq!(report.exit_status, ExitStatus::Infeasible);
    assert!(!report.has_solution());
    assert!(report.solution.is_none());
}

#[test]
fn test_parallel_node_limit() {
    let model = ten_items();
    let mut params = quiet(2);
    params.set_node_limit(0);

    let report = broker(&model, params).search().unwrap();
    assert_eq!(report.exit_status, ExitStatus::NodeLimit);
}
