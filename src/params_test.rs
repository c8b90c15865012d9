use std::{env, fs};

use super::*;
use crate::strategy::SearchStrategy;

#[test]
fn test_params_default() {
    let params = Params::default();

    assert_eq!(params.msg_level, 2);
    assert_eq!(params.hub_msg_level, 0);
    assert_eq!(params.worker_msg_level, 0);
    assert_eq!(params.node_limit, NODE_LIMIT);
    assert_eq!(params.sol_limit, SOL_LIMIT);
    assert_eq!(params.strategy().unwrap(), SearchStrategy::Hybrid);
    assert_eq!(params.ramp_up_strategy().unwrap(), SearchStrategy::BestFirst);
    assert_eq!(params.process_num, 2);
    assert_eq!(params.hub_num, 1);
    assert_eq!(params.max_hub_work_size, 0);
    assert!(!params.hub_works());
    assert_eq!(params.unit_work_nodes, 20);
    assert_eq!(params.unit_work_time, 0.03);
    assert_eq!(params.master_balance_period, 0.03);
    assert_eq!(params.hub_report_period, 0.01);
    assert_eq!(params.worker_ask_period, 0.5);
    assert_eq!(params.zero_load, 1.0e-6);
    assert_eq!(params.need_work_threshold, 2.0);
    assert_eq!(params.change_work_threshold, 0.02);
    assert_eq!(params.donor_threshold, 0.02);
    assert_eq!(params.receiver_threshold, 0.02);
    assert_eq!(params.rho, 0.0);
    assert_eq!(params.large_size, 10485760);
    assert_eq!(params.medium_size, 4096);
    assert_eq!(params.small_size, 1024);
    assert_eq!(params.buf_spare, 256);
    assert_eq!(params.master_init_node_num, 2);
    assert_eq!(params.hub_init_node_num, 2);
    assert_eq!(params.elite_size, 1);
    assert!(params.delete_dead_node);
    assert!(params.inter_cluster_balance);
    assert!(params.intra_cluster_balance);
    assert!(!params.print_solution);
    assert_eq!(params.clock_type, "wall");
    assert_eq!(params.instance, "NONE");
    assert_eq!(params.node_log_interval, 100);
    assert_eq!(params.max_dive_depth, 0);
    assert_eq!(params.split_ratio, 6);
}

#[test]
fn test_params_builders() {
    let mut params = Params::default();
    params
        .set_search_strategy(SearchStrategy::DepthFirst)
        .set_process_num(8)
        .set_hub_num(2)
        .set_node_limit(1000)
        .set_time_limit(60.0)
        .set_sol_limit(5)
        .set_unit_work(50, 0.5)
        .set_msg_level(0);

    assert_eq!(params.strategy().unwrap(), SearchStrategy::DepthFirst);
    assert_eq!(params.process_num, 8);
    assert_eq!(params.hub_num, 2);
    assert_eq!(params.node_limit, 1000);
    assert_eq!(params.time_limit, 60.0);
    assert_eq!(params.sol_limit, 5);
    assert_eq!(params.unit_work_nodes, 50);
    assert_eq!(params.unit_work_time, 0.5);
    assert_eq!(params.msg_level, 0);
}

#[test]
fn test_params_from_file() {
    let loc = env::temp_dir().join("test_params_from_file.toml");
    println!("test_params_from_file {:?}", loc);

    let text = r#"
        search_strategy = 0
        hub_num = 3
        max_hub_work_size = 1
        unit_work_nodes = 100
        unit_work_time = 1.5
        node_limit = 5000
        delete_dead_node = false
        log_file = "run.log"
    "#;
    fs::write(&loc, text).unwrap();

    let params = Params::from_file(loc.as_os_str()).unwrap();
    assert_eq!(params.strategy().unwrap(), SearchStrategy::BestFirst);
    assert_eq!(params.hub_num, 3);
    assert!(params.hub_works());
    assert_eq!(params.unit_work_nodes, 100);
    assert_eq!(params.unit_work_time, 1.5);
    assert_eq!(params.node_limit, 5000);
    assert!(!params.delete_dead_node);
    assert_eq!(params.log_file, "run.log");
    // Untouched keys keep their defaults.
    assert_eq!(params.hub_report_period, 0.01);
    assert_eq!(params.sol_limit, SOL_LIMIT);

    fs::remove_file(&loc).ok();

    assert!(Params::from_file(env::temp_dir().join("no-such.toml").as_os_str()).is_err());
}
