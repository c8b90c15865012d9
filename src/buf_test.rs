use arbitrary::{Arbitrary, Unstructured};
use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use super::*;

#[test]
fn test_encoded_scalar() {
    let seed: u64 = random();
    let mut rng = SmallRng::seed_from_u64(seed);
    println!("test_encoded_scalar {}", seed);

    for _i in 0..1000 {
        let a = rng.gen::<u8>();
        let b = rng.gen::<i32>();
        let c = rng.gen::<u64>();
        let d = rng.gen::<i64>();
        let e = rng.gen::<f64>();
        let f = rng.gen::<bool>();

        let mut buf = Encoded::new("scalars");
        buf.write_scalar(a);
        buf.write_scalar(b);
        buf.write_scalar(c);
        buf.write_scalar(d);
        buf.write_scalar(e);
        buf.write_scalar(f);

        assert_eq!(buf.as_type(), "scalars");
        assert_eq!(buf.len(), 1 + 4 + 8 + 8 + 8 + 1);

        assert_eq!(buf.read_scalar::<u8>().unwrap(), a);
        assert_eq!(buf.read_scalar::<i32>().unwrap(), b);
        assert_eq!(buf.read_scalar::<u64>().unwrap(), c);
        assert_eq!(buf.read_scalar::<i64>().unwrap(), d);
        assert_eq!(buf.read_scalar::<f64>().unwrap().to_bits(), e.to_bits());
        assert_eq!(buf.read_scalar::<bool>().unwrap(), f);
        assert_eq!(buf.remaining(), 0);

        buf.rewind();
        assert_eq!(buf.read_scalar::<u8>().unwrap(), a);
    }
}

#[test]
fn test_encoded_array_str() {
    let seed: u64 = random();
    let mut rng = SmallRng::seed_from_u64(seed);
    println!("test_encoded_array_str {}", seed);

    for _i in 0..1000 {
        let bytes = rng.gen::<[u8; 32]>();
        let mut uns = Unstructured::new(&bytes);

        let arr: Vec<i64> = Vec::<i64>::arbitrary(&mut uns).unwrap();
        let text: String = String::arbitrary(&mut uns).unwrap();
        let blob: Vec<u8> = Vec::<u8>::arbitrary(&mut uns).unwrap();

        let mut buf = Encoded::new("mixed");
        buf.write_array(&arr);
        buf.write_str(&text);
        buf.write_bytes(&blob);

        assert_eq!(buf.read_array::<i64>().unwrap(), arr);
        assert_eq!(buf.read_str().unwrap(), text);
        assert_eq!(buf.read_bytes().unwrap(), blob);
        assert_eq!(buf.remaining(), 0);
    }
}

#[test]
fn test_encoded_overrun() {
    let mut buf = Encoded::new("overrun");
    buf.write_scalar(42_u32);

    assert_eq!(buf.read_scalar::<u32>().unwrap(), 42);
    match buf.read_scalar::<u8>() {
        Err(Error::BufferOverrun(_, _)) => (),
        res => panic!("expected BufferOverrun {:?}", res),
    }

    // array count present but elements missing.
    let mut buf = Encoded::new("overrun");
    buf.write_scalar(16_u64);
    match buf.read_array::<u64>() {
        Err(Error::BufferOverrun(_, _)) => (),
        res => panic!("expected BufferOverrun {:?}", res),
    }
}

#[test]
fn test_encoded_parts() {
    let mut buf = Encoded::new("parts");
    buf.write_str("hello world");
    buf.write_scalar(1_u8);

    let bytes = buf.as_bytes().to_vec();
    let mut clone = Encoded::from_parts("parts", bytes);
    assert_eq!(clone.read_str().unwrap(), "hello world");
    assert_eq!(clone.read_scalar::<u8>().unwrap(), 1);
}
