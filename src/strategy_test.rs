use super::*;
use crate::pool::PoolEntry;

fn entry(index: i64, quality: f64, depth: i32, estimate: f64) -> PoolEntry {
    PoolEntry {
        index,
        quality,
        depth,
        sol_estimate: estimate,
    }
}

#[test]
fn test_strategy_codes() {
    for code in 0..5 {
        let strategy = SearchStrategy::from_code(code).unwrap();
        assert_eq!(strategy.to_code(), code);
    }
    assert!(SearchStrategy::from_code(5).is_err());
    assert!(SearchStrategy::from_code(-1).is_err());

    assert_eq!(SearchStrategy::default(), SearchStrategy::Hybrid);
    assert!(SearchStrategy::Hybrid.uses_dive_pool());
    assert!(!SearchStrategy::BestFirst.uses_dive_pool());
}

#[test]
fn test_strategy_cmp_nodes() {
    let a = entry(1, -10.0, 3, -12.0);
    let b = entry(2, -8.0, 5, -20.0);

    assert_eq!(
        SearchStrategy::BestFirst.cmp_nodes(&a, &b),
        Ordering::Less
    );
    assert_eq!(SearchStrategy::Hybrid.cmp_nodes(&a, &b), Ordering::Less);
    assert_eq!(
        SearchStrategy::BreadthFirst.cmp_nodes(&a, &b),
        Ordering::Less
    );
    assert_eq!(
        SearchStrategy::DepthFirst.cmp_nodes(&a, &b),
        Ordering::Greater
    );
    assert_eq!(
        SearchStrategy::BestEstimate.cmp_nodes(&a, &b),
        Ordering::Greater
    );

    // Ties break on the node index.
    let c = entry(3, -8.0, 5, -20.0);
    let d = entry(4, -8.0, 5, -20.0);
    for strategy in [
        SearchStrategy::BestFirst,
        SearchStrategy::BreadthFirst,
        SearchStrategy::DepthFirst,
        SearchStrategy::BestEstimate,
        SearchStrategy::Hybrid,
    ]
    .iter()
    {
        assert_eq!(strategy.cmp_nodes(&c, &d), Ordering::Less, "{:?}", strategy);
    }
}
