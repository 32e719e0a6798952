use std::hash::Hasher;
use std::io::{self, Write};

use enum_dispatch::enum_dispatch;

use crate::codec::Key;
use crate::hyperloglog::HyperLogLog;
use crate::medium::MediumSet;
use crate::small::SmallSet;

/// Masks used for storing and retrieving container type stored in lowest 2 bits of `data` field.
pub(crate) const CONTAINER_TYPE_MASK: usize = 0x0000_0000_0000_0003;
pub(crate) const PTR_MASK: usize = !CONTAINER_TYPE_MASK;

/// Container types used by `CombinedEstimator`, ordered by promotion.
///
/// Discriminants are used both in the estimator's tagged pointer and as the serialized tag byte.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContainerType {
    Small = 1,
    Medium = 2,
    Large = 3,
}

impl TryFrom<u8> for ContainerType {
    type Error = u8;

    #[inline]
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ContainerType::Small),
            2 => Ok(ContainerType::Medium),
            3 => Ok(ContainerType::Large),
            _ => Err(value),
        }
    }
}

/// Active container of `CombinedEstimator` borrowed for reading
#[enum_dispatch]
pub(crate) enum Representation<
    'a,
    K: Key,
    H: Hasher + Default,
    const S: usize,
    const P: usize,
    const W: usize,
> {
    Small(&'a SmallSet<K, S>),
    Medium(&'a MediumSet<K, H>),
    Large(&'a HyperLogLog<H, P, W>),
}

/// Representation trait which must be implemented by all representations.
#[enum_dispatch(Representation<K, H, S, P, W>)]
pub(crate) trait RepresentationTrait {
    /// Number of distinct elements, exact for `Small` and `Medium`, estimated for `Large`
    fn size(&self) -> usize;
    fn size_of(&self) -> usize;
    /// Write self-delimiting binary form of the container
    fn write(&self, out: &mut dyn Write) -> io::Result<()>;
    fn to_string(&self) -> String {
        format!("size: {}", self.size())
    }
}

impl<T: RepresentationTrait + ?Sized> RepresentationTrait for &T {
    #[inline]
    fn size(&self) -> usize {
        (**self).size()
    }

    #[inline]
    fn size_of(&self) -> usize {
        (**self).size_of()
    }

    #[inline]
    fn write(&self, out: &mut dyn Write) -> io::Result<()> {
        (**self).write(out)
    }
}

impl<K: Key, H: Hasher + Default, const S: usize, const P: usize, const W: usize>
    Representation<'_, K, H, S, P, W>
{
    #[inline]
    pub(crate) fn container_type(&self) -> ContainerType {
        match self {
            Representation::Small(_) => ContainerType::Small,
            Representation::Medium(_) => ContainerType::Medium,
            Representation::Large(_) => ContainerType::Large,
        }
    }
}

/// Active container of `CombinedEstimator` borrowed for modification
pub(crate) enum RepresentationMut<'a, K, H, const S: usize, const P: usize, const W: usize> {
    Small(&'a mut SmallSet<K, S>),
    Medium(&'a mut MediumSet<K, H>),
    Large(&'a mut HyperLogLog<H, P, W>),
}
