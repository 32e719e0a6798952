//! # Serde module for CombinedEstimator
//!
//! This module provides serde-based (serialization and deserialization) features for
//! `CombinedEstimator`. The estimator is serialized as bytes holding its binary form
//! (container type tag followed by the container payload), the same bytes produced by `write`.
//!
//! During deserialization the bytes are validated the same way as by `from_bytes`,
//! so malformed input results in a deserialization error instead of a corrupted estimator.
//!
//! Refer to the serde documentation for more details on custom serialization and deserialization:
//! - [Serialization](https://serde.rs/impl-serialize.html)
//! - [Deserialization](https://serde.rs/impl-deserialize.html)
use std::hash::Hasher;

use serde::de::Error as DeError;
use serde::ser::Error as _;
use serde::{Deserialize, Serialize};

use crate::codec::Key;
use crate::estimator::CombinedEstimator;

impl<K, H, const S: usize, const M: usize, const P: usize, const W: usize> Serialize
    for CombinedEstimator<K, H, S, M, P, W>
where
    K: Key,
    H: Hasher + Default,
{
    fn serialize<Sr>(&self, serializer: Sr) -> Result<Sr::Ok, Sr::Error>
    where
        Sr: serde::Serializer,
    {
        let bytes = self.to_bytes().map_err(Sr::Error::custom)?;
        serializer.serialize_bytes(&bytes)
    }
}

impl<'de, K, H, const S: usize, const M: usize, const P: usize, const W: usize> Deserialize<'de>
    for CombinedEstimator<K, H, S, M, P, W>
where
    K: Key,
    H: Hasher + Default,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        CombinedEstimator::from_bytes(&bytes).map_err(DeError::custom)
    }
}
