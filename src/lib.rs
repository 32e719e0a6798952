//! `combined-cardinality-estimator` is a Rust crate designed to count distinct keys of a stream or dataset
//! as the state of a `count distinct` aggregate.
//!
//! The estimator starts with an exact inline set, promotes to an exact hash set and finally to a
//! HyperLogLog++ counter as the number of distinct keys grows. Partial states can be merged with each other
//! and serialized, and serialized states can be merged without deserializing them first.
//!
//! ```
//! use combined_cardinality_estimator::{CombinedEstimator, ContainerType};
//!
//! let mut lhs = CombinedEstimator::<u64>::new();
//! let mut rhs = CombinedEstimator::<u64>::new();
//! for key in 0..100 {
//!     lhs.insert(key)?;
//!     rhs.insert(key + 50)?;
//! }
//! assert_eq!(lhs.container_type()?, ContainerType::Medium);
//!
//! lhs.read_and_merge(&mut rhs.to_bytes()?.as_slice())?;
//! assert_eq!(lhs.size()?, 150);
//! # Ok::<(), combined_cardinality_estimator::EstimatorError>(())
//! ```
pub mod codec;
pub mod error;
pub mod estimator;
mod hyperloglog;
mod medium;
pub mod memory;
mod representation;
#[cfg(feature = "with_serde")]
mod serde;
mod small;

pub use codec::{ElementReader, Key};
pub use error::{EstimatorError, Result};
pub use estimator::CombinedEstimator;
pub use memory::{
    clear_current_tracker, current_tracker, set_current_tracker, MemoryCounter, MemoryTracker,
    TrackerGuard,
};
pub use representation::ContainerType;
