use combined_cardinality_estimator::{CombinedEstimator, ContainerType, EstimatorError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use test_case::test_case;
use wyhash::WyHash;

/// Small container holds 8 keys, medium container holds 64 keys
type Estimator = CombinedEstimator<u64, WyHash, 8, 6, 12, 6>;

const SMALL: usize = 5;
const MEDIUM: usize = 40;
const LARGE: usize = 2000;

fn random_estimator(rng: &mut StdRng, n: usize) -> Estimator {
    let mut e = Estimator::new();
    for _ in 0..n {
        e.insert(rng.gen()).unwrap();
    }
    e
}

#[test]
fn test_monotone_container_type() {
    let mut rng = StdRng::seed_from_u64(12345);
    let mut e = Estimator::new();
    let mut tier = e.container_type().unwrap();
    let mut size = 0;

    for _ in 0..2000 {
        if rng.gen_bool(0.8) {
            e.insert(rng.gen_range(0..500)).unwrap();
        } else {
            let n = rng.gen_range(0..20);
            let mut rhs = Estimator::new();
            for _ in 0..n {
                rhs.insert(rng.gen_range(0..500)).unwrap();
            }
            e.merge(&rhs).unwrap();
        }

        let next_tier = e.container_type().unwrap();
        assert!(next_tier >= tier, "{:?} -> {:?}", tier, next_tier);
        let next_size = e.size().unwrap();
        if next_tier < ContainerType::Large {
            assert!(next_size >= size);
        }
        tier = next_tier;
        size = next_size;
    }
    assert_eq!(tier, ContainerType::Large);
}

#[test]
fn test_monotone_size() {
    let mut e = Estimator::new();
    let mut tier = ContainerType::Small;
    let mut size = 0;
    for key in 0..3000 {
        e.insert(key).unwrap();
        let next_tier = e.container_type().unwrap();
        let next_size = e.size().unwrap();
        // switching from exact count to estimate may round either way
        if next_tier == tier {
            assert!(next_size >= size, "size decreased after inserting {}", key);
        }
        tier = next_tier;
        size = next_size;
    }
    assert_eq!(tier, ContainerType::Large);
}

#[test]
fn test_promotion_thresholds() {
    let mut e = Estimator::new();
    for key in 0..8 {
        e.insert(key).unwrap();
    }
    assert_eq!(e.container_type().unwrap(), ContainerType::Small);
    assert_eq!(e.size().unwrap(), 8);

    e.insert(8).unwrap();
    assert_eq!(e.container_type().unwrap(), ContainerType::Medium);
    assert_eq!(e.size().unwrap(), 9);

    for key in 9..Estimator::MEDIUM_SET_SIZE_MAX as u64 {
        e.insert(key).unwrap();
    }
    assert_eq!(e.container_type().unwrap(), ContainerType::Medium);
    assert_eq!(e.size().unwrap(), 64);

    e.insert(64).unwrap();
    assert_eq!(e.container_type().unwrap(), ContainerType::Large);
}

#[test_case(0 => ContainerType::Small)]
#[test_case(SMALL => ContainerType::Small)]
#[test_case(MEDIUM => ContainerType::Medium)]
#[test_case(LARGE => ContainerType::Large)]
fn test_round_trip(n: usize) -> ContainerType {
    let mut rng = StdRng::seed_from_u64(n as u64);
    let e = random_estimator(&mut rng, n);

    let mut restored = Estimator::new();
    restored.read(&mut e.to_bytes().unwrap().as_slice()).unwrap();

    assert_eq!(restored, e);
    assert_eq!(restored.size().unwrap(), e.size().unwrap());
    restored.container_type().unwrap()
}

#[test_case(SMALL, SMALL)]
#[test_case(SMALL, MEDIUM)]
#[test_case(SMALL, LARGE)]
#[test_case(MEDIUM, SMALL)]
#[test_case(MEDIUM, MEDIUM)]
#[test_case(MEDIUM, LARGE)]
#[test_case(LARGE, SMALL)]
#[test_case(LARGE, MEDIUM)]
#[test_case(LARGE, LARGE)]
fn test_streaming_merge_equivalence(lhs_n: usize, rhs_n: usize) {
    let mut rng = StdRng::seed_from_u64((lhs_n * 31 + rhs_n) as u64);
    let lhs = random_estimator(&mut rng, lhs_n);
    let rhs = random_estimator(&mut rng, rhs_n);

    let mut merged = lhs.clone();
    merged.merge(&rhs).unwrap();

    let mut streamed = lhs.clone();
    streamed
        .read_and_merge(&mut rhs.to_bytes().unwrap().as_slice())
        .unwrap();

    assert_eq!(
        streamed.container_type().unwrap(),
        merged.container_type().unwrap()
    );
    assert_eq!(streamed.size().unwrap(), merged.size().unwrap());
    assert_eq!(streamed, merged);

    let expected_tier = lhs
        .container_type()
        .unwrap()
        .max(rhs.container_type().unwrap());
    assert!(merged.container_type().unwrap() >= expected_tier);
    assert!(merged.size().unwrap() >= lhs.size().unwrap().max(rhs.size().unwrap()));
}

#[test]
fn test_fold_serialized_partial_states() {
    let mut rng = StdRng::seed_from_u64(7);
    let partials: Vec<Estimator> = (0..50)
        .map(|_| {
            let mut e = Estimator::new();
            for _ in 0..rng.gen_range(0..12) {
                e.insert(rng.gen_range(0..60)).unwrap();
            }
            e
        })
        .collect();

    // serialized states are self-delimiting, so they can be concatenated
    let mut stream = Vec::new();
    for partial in &partials {
        partial.write(&mut stream).unwrap();
    }

    let mut merged = Estimator::new();
    for partial in &partials {
        merged.merge(partial).unwrap();
    }

    let mut streamed = Estimator::new();
    let mut input = stream.as_slice();
    while !input.is_empty() {
        streamed.read_and_merge(&mut input).unwrap();
    }

    assert_eq!(streamed, merged);
    assert!(merged.size().unwrap() <= 60);
}

#[test_case(SMALL)]
#[test_case(MEDIUM)]
#[test_case(LARGE)]
fn test_idempotent_reinsert(n: usize) {
    let mut e = Estimator::new();
    for key in 0..n as u64 {
        e.insert(key).unwrap();
    }
    let tier = e.container_type().unwrap();
    let size = e.size().unwrap();

    for key in 0..n as u64 {
        e.insert(key).unwrap();
    }
    assert_eq!(e.container_type().unwrap(), tier);
    assert_eq!(e.size().unwrap(), size);
}

#[test]
fn test_example() {
    let mut e = CombinedEstimator::<u32, WyHash, 4, 4, 12, 6>::new();
    for key in 1..=4 {
        e.insert(key).unwrap();
    }
    assert_eq!(e.container_type().unwrap(), ContainerType::Small);
    assert_eq!(e.size().unwrap(), 4);

    e.insert(5).unwrap();
    assert_eq!(e.container_type().unwrap(), ContainerType::Medium);
    assert_eq!(e.size().unwrap(), 5);

    let mut rhs = CombinedEstimator::<u32, WyHash, 4, 4, 12, 6>::new();
    for key in 4..=6 {
        rhs.insert(key).unwrap();
    }
    e.merge(&rhs).unwrap();
    assert_eq!(e.container_type().unwrap(), ContainerType::Medium);
    assert_eq!(e.size().unwrap(), 6);
}

#[test]
fn test_read_and_merge_rejects_malformed_input() {
    let mut e = Estimator::new();
    e.insert(1).unwrap();

    let err = e.read_and_merge(&mut [4u8, 0].as_slice()).unwrap_err();
    assert!(matches!(err, EstimatorError::UnknownContainerType(4)));
    assert!(!err.is_logical());

    let err = e.read_and_merge(&mut [1u8, 9].as_slice()).unwrap_err();
    assert!(matches!(
        err,
        EstimatorError::TooManyElements {
            len: 9,
            capacity: 8
        }
    ));
    assert_eq!(e.size().unwrap(), 1);
}

#[test]
fn test_read_rejects_forged_harmonic_sum() {
    let mut e = CombinedEstimator::<u64, WyHash, 4, 3, 12, 6>::new();
    for key in 0..100 {
        e.insert(key).unwrap();
    }
    assert_eq!(e.container_type().unwrap(), ContainerType::Large);
    let mut bytes = e.to_bytes().unwrap();
    assert!(CombinedEstimator::<u64, WyHash, 4, 3, 12, 6>::from_bytes(&bytes).is_ok());

    // tag byte, zero registers count, then harmonic sum
    bytes[5..9].copy_from_slice(&f32::MIN_POSITIVE.to_bits().to_le_bytes());
    assert!(matches!(
        CombinedEstimator::<u64, WyHash, 4, 3, 12, 6>::from_bytes(&bytes),
        Err(EstimatorError::Malformed(_))
    ));
}
