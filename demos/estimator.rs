use combined_cardinality_estimator::{CombinedEstimator, EstimatorError};

fn main() -> Result<(), EstimatorError> {
    let mut estimator1 = CombinedEstimator::<u64>::new();
    for i in 0..10 {
        estimator1.insert(i)?;
    }
    println!("estimator1 = {:?}", estimator1);

    let mut estimator2 = CombinedEstimator::<u64>::new();
    for i in 10..15 {
        estimator2.insert(i)?;
    }
    println!("estimator2 = {:?}", estimator2);

    estimator1.merge(&estimator2)?;
    println!("merged = {:?}", estimator1);

    // partial states travel as bytes and are merged without deserializing them first
    let mut estimator3 = CombinedEstimator::<u64>::new();
    for i in 0..1_000_000 {
        estimator3.insert_item(&format!("item{}", i))?;
    }
    let bytes = estimator3.to_bytes()?;
    println!("estimator3 = {:?}, {} bytes serialized", estimator3, bytes.len());

    estimator1.read_and_merge(&mut bytes.as_slice())?;
    println!("merged with serialized = {:?}", estimator1);
    Ok(())
}
