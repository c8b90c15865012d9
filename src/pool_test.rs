use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use super::*;
use crate::{buf::Encoded, knowledge::Knowledge, Result};

fn entry(index: i64, quality: f64, depth: i32) -> PoolEntry {
    PoolEntry {
        index,
        quality,
        depth,
        sol_estimate: quality,
    }
}

#[test]
fn test_node_pool_order() {
    let seed: u64 = random();
    let mut rng = SmallRng::seed_from_u64(seed);
    println!("test_node_pool_order {}", seed);

    let mut pool = NodePool::new(SearchStrategy::BestFirst);
    assert!(pool.is_empty());
    assert_eq!(pool.best_quality(), OBJ_MAX);

    let mut entries = vec![];
    for index in 0..1000_i64 {
        let quality = rng.gen_range(-1000.0..1000.0);
        let depth = rng.gen_range(0..64);
        entries.push(entry(index, quality, depth));
    }
    for e in entries.iter() {
        pool.push(*e);
    }
    assert_eq!(pool.len(), 1000);

    let best = entries
        .iter()
        .map(|e| e.quality)
        .fold(OBJ_MAX, f64::min);
    assert_eq!(pool.best_quality(), best);
    assert_eq!(pool.top().unwrap().quality, best);
    assert_eq!(pool.best_entry().unwrap().quality, best);

    let mut prev = f64::MIN;
    while let Some(e) = pool.pop() {
        assert!(e.quality >= prev, "{} {}", e.quality, prev);
        prev = e.quality;
    }
}

#[test]
fn test_node_pool_restrategy() {
    let seed: u64 = random();
    let mut rng = SmallRng::seed_from_u64(seed);
    println!("test_node_pool_restrategy {}", seed);

    let mut pool = NodePool::new(SearchStrategy::BestFirst);
    for index in 0..500_i64 {
        pool.push(entry(
            index,
            rng.gen_range(-100.0..100.0),
            rng.gen_range(0..1000),
        ));
    }

    // Swap to depth-first; deepest nodes must pop first.
    pool.set_strategy(SearchStrategy::DepthFirst);
    assert_eq!(pool.strategy(), SearchStrategy::DepthFirst);

    let mut prev = i32::MAX;
    let mut best = OBJ_MAX;
    for _ in 0..500 {
        let e = pool.pop().unwrap();
        assert!(e.depth <= prev, "{} {}", e.depth, prev);
        prev = e.depth;
        if e.quality < best {
            best = e.quality;
        }
    }
    assert!(pool.pop().is_none());
    assert!(best < OBJ_MAX);
}

struct TestSol {
    quality: f64,
}

impl Knowledge for TestSol {
    fn encode(&self, buf: &mut Encoded) -> Result<()> {
        buf.write_scalar(self.quality);
        Ok(())
    }
}

impl SolutionData for TestSol {
    fn quality(&self) -> f64 {
        self.quality
    }

    fn render(&self) -> String {
        format!("sol {}", self.quality)
    }
}

#[test]
fn test_solution_pool() {
    let mut pool = SolutionPool::new(2);
    assert!(pool.is_empty());
    assert_eq!(pool.best_quality(), OBJ_MAX);

    assert!(pool.push(-5.0, Box::new(TestSol { quality: -5.0 })));
    assert!(pool.push(-8.0, Box::new(TestSol { quality: -8.0 })));
    assert_eq!(pool.best_quality(), -8.0);

    // Worse than both retained entries, pool is full.
    assert!(!pool.push(-1.0, Box::new(TestSol { quality: -1.0 })));
    assert_eq!(pool.len(), 2);

    // Better than the worst retained entry.
    assert!(pool.push(-7.0, Box::new(TestSol { quality: -7.0 })));
    assert_eq!(pool.len(), 2);
    let qualities: Vec<f64> = pool.iter().map(|(q, _)| *q).collect();
    assert_eq!(qualities, vec![-8.0, -7.0]);

    let (quality, sol) = pool.take_best().unwrap();
    assert_eq!(quality, -8.0);
    assert_eq!(sol.quality(), -8.0);
    assert_eq!(pool.best_quality(), -7.0);
}
