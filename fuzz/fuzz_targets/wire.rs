#![no_main]

use combined_cardinality_estimator::CombinedEstimator;
use libfuzzer_sys::fuzz_target;
use wyhash::WyHash;

type Estimator = CombinedEstimator<u32, WyHash, 4, 6, 10, 5>;

fuzz_target!(|data: &[u8]| {
    if let Ok(mut estimator) = Estimator::from_bytes(data) {
        let tier = estimator.container_type().unwrap();
        estimator.insert(1).unwrap();
        assert!(estimator.container_type().unwrap() >= tier);
        estimator.to_bytes().unwrap();
    }

    let mut estimator = Estimator::new();
    estimator.insert(7).unwrap();
    let mut input = data;
    while !input.is_empty() && estimator.read_and_merge(&mut input).is_ok() {}
    estimator.size().unwrap();
});
