#![no_main]

use combined_cardinality_estimator::CombinedEstimator;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(mut estimator) = serde_json::from_slice::<CombinedEstimator<u64>>(data) {
        estimator.insert(1).unwrap();
        estimator.size().unwrap();
    }
});
