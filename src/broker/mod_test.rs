use super::*;

#[test]
fn test_index_ladder() {
    let mut ladder = IndexLadder::new(10, 14);
    assert_eq!(ladder.remaining(), 5);
    assert_eq!(ladder.to_next(), 10);
    assert_eq!(ladder.to_max(), 14);

    for want in 10..=14 {
        assert_eq!(ladder.next_index().unwrap(), want);
    }
    assert_eq!(ladder.remaining(), 0);
    match ladder.next_index() {
        Err(Error::IndexExhausted(_, _)) => (),
        res => panic!("expected IndexExhausted {:?}", res),
    }

    ladder.refill(100, 199).unwrap();
    assert_eq!(ladder.next_index().unwrap(), 100);
    assert_eq!(ladder.remaining(), 99);

    assert!(ladder.refill(-1, 10).is_err());
    assert!(ladder.refill(10, 9).is_err());
}

#[test]
fn test_index_ladder_carve() {
    let mut ladder = IndexLadder::new(0, 1000);

    // Full batch leaves the rest with the owner.
    let (low, high) = ladder.carve(100, 10).unwrap();
    assert_eq!((low, high), (0, 100));
    assert_eq!(ladder.to_next(), 101);

    // Remaining smaller than a batch is handed out whole.
    let mut small = IndexLadder::new(0, 50);
    let (low, high) = small.carve(100, 10).unwrap();
    assert_eq!((low, high), (0, 50));
    assert!(small.carve(100, 10).is_none());
    assert!(small.next_index().is_err());

    // The reserve protects the owner's tail.
    let mut tail = IndexLadder::new(0, 10);
    assert!(tail.carve(100, 10).is_none());
    assert_eq!(tail.next_index().unwrap(), 0);
}

#[test]
fn test_index_bands_disjoint() {
    // Bands handed to every participant never overlap; unique node
    // indices fall out of the partition.
    use crate::broker::parallel::band_check;

    for (n, hubs) in [(2, 1), (4, 1), (4, 2), (8, 2), (9, 3), (16, 4)].iter() {
        band_check(*n, *hubs);
    }
}
