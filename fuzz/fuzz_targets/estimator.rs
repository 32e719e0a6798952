#![no_main]

use combined_cardinality_estimator::CombinedEstimator;
use libfuzzer_sys::fuzz_target;
use wyhash::{wyhash, WyHash};

type Estimator = CombinedEstimator<u32, WyHash, 4, 6, 10, 5>;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let split_index = wyhash(data, 0) as usize % data.len();
    let (first_half, second_half) = data.split_at(split_index);

    let mut estimator1 = Estimator::new();
    for chunk in first_half.chunks(4) {
        let tier = estimator1.container_type().unwrap();
        estimator1.insert_item(&chunk).unwrap();
        assert!(estimator1.size().unwrap() > 0);
        assert!(estimator1.container_type().unwrap() >= tier);
    }

    let mut estimator2 = Estimator::new();
    for chunk in second_half.chunks(4) {
        estimator2.insert_item(&chunk).unwrap();
        assert!(estimator2.size_of().unwrap() > 0);
    }

    let mut streamed = estimator1.clone();
    streamed
        .read_and_merge(&mut estimator2.to_bytes().unwrap().as_slice())
        .unwrap();

    estimator1.merge(&estimator2).unwrap();
    assert_eq!(estimator1.container_type().unwrap(), streamed.container_type().unwrap());
    assert_eq!(estimator1.size().unwrap(), streamed.size().unwrap());

    let restored = Estimator::from_bytes(&estimator1.to_bytes().unwrap()).unwrap();
    assert_eq!(restored, estimator1);
});
