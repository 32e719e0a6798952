//! Combined cardinality estimator counts distinct keys exactly while their number is small
//! and switches to an approximate counter once exact counting becomes too expensive.
//! It is defined with const parameters:
//! - `S`: capacity of the inline small container in [1..255] range, less than `2^M`.
//! - `M`: medium container holds up to `2^M` keys, `M` is in [1..30] range.
//! - `P`: precision parameter in [4..18] range, which defines
//!   number of bits to use for HyperLogLog register indices.
//! - `W`: width parameter in [4..6] range, which defines
//!   number of bits to use for HyperLogLog register width.
//!
//! # Data-structure design rationale
//!
//! Aggregation keeps one estimator per group and the number of groups can be in the millions,
//! so the estimator itself is only the inline small container plus a single `usize` word.
//! Heap containers are allocated on promotion and their pointer shares the word with the tag.
//!
//! Promotion is one-way: `Small -> Medium -> Large` (or `Small -> Large` directly on merge).
//!
//! # Data storage format
//!
//! The `data` format:
//! - 0..1 bits     - store container type (`01` small, `10` medium, `11` large, `00` is invalid)
//! - 2..63 bits    - store pointer to `Tracked<MediumSet>` or `Tracked<HyperLogLog>`,
//!   unused for small container
//!
//! Heap containers are aligned to at least 8 bytes, which keeps the two tag bits free.
//!
//! # Serialization format
//!
//! - 1 byte container type (`1` small, `2` medium, `3` large)
//! - self-delimiting payload of the container, see `codec` and `hyperloglog` modules

use std::fmt::{Debug, Formatter};
use std::hash::{BuildHasher, BuildHasherDefault, Hash, Hasher};
use std::io::{Read, Write};
use std::mem::{align_of, size_of};

use byteorder::{ReadBytesExt, WriteBytesExt};
use log::{debug, trace};
use wyhash::WyHash;

use crate::codec::{ElementReader, Key};
use crate::error::{EstimatorError, Result};
use crate::hyperloglog::HyperLogLog;
use crate::medium::MediumSet;
use crate::memory::Tracked;
use crate::representation::{
    ContainerType, Representation, RepresentationMut, RepresentationTrait, CONTAINER_TYPE_MASK,
    PTR_MASK,
};
use crate::small::SmallSet;

/// Ensure that only 64-bit architecture is being used.
#[cfg(target_pointer_width = "64")]
pub struct CombinedEstimator<
    K: Key,
    H: Hasher + Default = WyHash,
    const S: usize = 16,
    const M: usize = 14,
    const P: usize = 17,
    const W: usize = 6,
> {
    /// Inline small container, ignored after promotion
    small: SmallSet<K, S>,
    /// Tagged pointer described above
    pub(crate) data: usize,
    /// Zero-sized build hasher
    build_hasher: BuildHasherDefault<H>,
}

impl<K: Key, H: Hasher + Default, const S: usize, const M: usize, const P: usize, const W: usize>
    CombinedEstimator<K, H, S, M, P, W>
{
    /// Ensure that `S`, `M`, `P` and `W` are in correct range at compile time
    const VALID_PARAMS: () = assert!(
        S >= 1
            && S <= 255
            && M >= 1
            && M <= 30
            && S < (1 << M)
            && P >= 4
            && P <= 18
            && W >= 4
            && W <= 6
    );
    /// Ensure that heap containers leave the tag bits of their pointers free
    const VALID_ALIGN: () = assert!(
        align_of::<Tracked<MediumSet<K, H>>>() > CONTAINER_TYPE_MASK
            && align_of::<Tracked<HyperLogLog<H, P, W>>>() > CONTAINER_TYPE_MASK
    );
    /// Maximum number of keys held by medium container
    pub const MEDIUM_SET_SIZE_MAX: usize = 1 << M;

    /// Creates new instance of `CombinedEstimator`
    #[inline]
    pub fn new() -> Self {
        // compile time check of params
        _ = Self::VALID_PARAMS;
        _ = Self::VALID_ALIGN;

        Self {
            // Start with empty small container
            small: SmallSet::new(),
            data: ContainerType::Small as usize,
            build_hasher: BuildHasherDefault::default(),
        }
    }

    /// Return container type of `CombinedEstimator`
    #[inline]
    pub fn container_type(&self) -> Result<ContainerType> {
        ContainerType::try_from((self.data & CONTAINER_TYPE_MASK) as u8)
            .map_err(|_| EstimatorError::Logical("unknown container type"))
    }

    #[inline]
    fn set_container_type(&mut self, container_type: ContainerType) {
        self.clear_container_type();
        self.data |= container_type as usize;
    }

    #[inline]
    fn clear_container_type(&mut self) {
        self.data &= PTR_MASK;
    }

    /// Return heap container stored in `data`
    ///
    /// # Safety
    /// Container type must match `T`.
    #[inline]
    unsafe fn heap<T>(&self) -> &T {
        &**((self.data & PTR_MASK) as *const Tracked<T>)
    }

    /// Return mutable heap container stored in `data`
    ///
    /// # Safety
    /// Container type must match `T`.
    #[inline]
    unsafe fn heap_mut<T>(&mut self) -> &mut T {
        &mut **((self.data & PTR_MASK) as *mut Tracked<T>)
    }

    /// Return active container
    #[inline]
    pub(crate) fn representation(&self) -> Result<Representation<'_, K, H, S, P, W>> {
        Ok(match self.container_type()? {
            ContainerType::Small => Representation::Small(&self.small),
            // SAFETY: tag guarantees that `data` points to `Tracked<MediumSet>`
            ContainerType::Medium => Representation::Medium(unsafe { self.heap() }),
            // SAFETY: tag guarantees that `data` points to `Tracked<HyperLogLog>`
            ContainerType::Large => Representation::Large(unsafe { self.heap() }),
        })
    }

    /// Return active container for modification
    #[inline]
    fn representation_mut(&mut self) -> Result<RepresentationMut<'_, K, H, S, P, W>> {
        Ok(match self.container_type()? {
            ContainerType::Small => RepresentationMut::Small(&mut self.small),
            // SAFETY: tag guarantees that `data` points to `Tracked<MediumSet>`
            ContainerType::Medium => RepresentationMut::Medium(unsafe { self.heap_mut() }),
            // SAFETY: tag guarantees that `data` points to `Tracked<HyperLogLog>`
            ContainerType::Large => RepresentationMut::Large(unsafe { self.heap_mut() }),
        })
    }

    /// Return large container, failing if estimator was not promoted to it
    #[inline]
    fn large_mut(&mut self) -> Result<&mut HyperLogLog<H, P, W>> {
        match self.representation_mut()? {
            RepresentationMut::Large(large) => Ok(large),
            _ => Err(EstimatorError::Logical("large container expected")),
        }
    }

    /// Store heap container in `data`, the previous heap container must be released already
    #[inline]
    fn install<T>(&mut self, container: Box<Tracked<T>>, container_type: ContainerType) {
        self.data = Box::into_raw(container) as usize;
        self.set_container_type(container_type);
    }

    /// Release heap container, if any, and reset tag to small container
    fn destroy(&mut self) {
        let ptr = self.data & PTR_MASK;
        match self.container_type() {
            // SAFETY: pointer was created by `install` from `Box<Tracked<MediumSet>>`
            Ok(ContainerType::Medium) => drop(unsafe {
                Box::from_raw(ptr as *mut Tracked<MediumSet<K, H>>)
            }),
            // SAFETY: pointer was created by `install` from `Box<Tracked<HyperLogLog>>`
            Ok(ContainerType::Large) => drop(unsafe {
                Box::from_raw(ptr as *mut Tracked<HyperLogLog<H, P, W>>)
            }),
            _ => {}
        }
        self.data = 0;
        self.set_container_type(ContainerType::Small);
    }

    /// Promote small container to medium container
    fn to_medium(&mut self) -> Result<()> {
        if self.container_type()? != ContainerType::Small {
            return Err(EstimatorError::Logical(
                "medium container can only be created from small container",
            ));
        }
        let mut medium = MediumSet::<K, H>::new();
        self.small.iter().for_each(|key| {
            medium.insert(key);
        });
        debug!(
            "promoting {} keys from small to medium container",
            medium.len()
        );
        self.install(Tracked::new(medium), ContainerType::Medium);
        Ok(())
    }

    /// Promote small or medium container to large container
    fn to_large(&mut self) -> Result<()> {
        let mut large = HyperLogLog::<H, P, W>::new();
        let replayed = match self.representation()? {
            Representation::Small(small) => {
                small.iter().for_each(|key| large.insert(&key));
                small.len()
            }
            Representation::Medium(medium) => {
                medium.iter().for_each(|key| large.insert(&key));
                medium.len()
            }
            Representation::Large(_) => {
                return Err(EstimatorError::Logical(
                    "large container can not be promoted",
                ))
            }
        };
        debug!(
            "promoting {} keys from {:?} to large container",
            replayed,
            self.container_type()?
        );
        // medium container is released before large container is allocated
        self.destroy();
        self.install(Tracked::new(large), ContainerType::Large);
        Ok(())
    }

    /// Promote estimator to `target` container type unless it already uses the same or higher one
    fn promote_to(&mut self, target: ContainerType) -> Result<()> {
        if self.container_type()? >= target {
            return Ok(());
        }
        match target {
            ContainerType::Small => Ok(()),
            ContainerType::Medium => self.to_medium(),
            ContainerType::Large => self.to_large(),
        }
    }

    /// Insert key into `CombinedEstimator`, promoting it when the active container is full
    #[inline]
    pub fn insert(&mut self, key: K) -> Result<()> {
        let next = match self.representation_mut()? {
            RepresentationMut::Small(small) => {
                if small.insert(key) {
                    return Ok(());
                }
                ContainerType::Medium
            }
            RepresentationMut::Medium(medium) => {
                if medium.len() < Self::MEDIUM_SET_SIZE_MAX || medium.contains(&key) {
                    medium.insert(key);
                    return Ok(());
                }
                ContainerType::Large
            }
            RepresentationMut::Large(large) => {
                large.insert(&key);
                return Ok(());
            }
        };
        self.promote_to(next)?;
        self.insert(key)
    }

    /// Insert a hashable item into `CombinedEstimator` as key derived from its hash
    #[inline]
    pub fn insert_item<T: Hash + ?Sized>(&mut self, item: &T) -> Result<()> {
        let mut hasher = self.build_hasher.build_hasher();
        item.hash(&mut hasher);
        self.insert(K::from_hash(hasher.finish()))
    }

    /// Return number of distinct keys, exact for small and medium containers
    #[inline]
    pub fn size(&self) -> Result<usize> {
        Ok(self.representation()?.size())
    }

    /// Return whether no keys were inserted
    #[inline]
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.size()? == 0)
    }

    /// Merge `rhs` into `self`, `rhs` container type becomes the lower bound of `self` container type
    pub fn merge(&mut self, rhs: &Self) -> Result<()> {
        self.promote_to(rhs.container_type()?)?;
        match rhs.representation()? {
            Representation::Small(small) => small.iter().try_for_each(|key| self.insert(key)),
            Representation::Medium(medium) => medium.iter().try_for_each(|key| self.insert(key)),
            Representation::Large(rhs_large) => {
                self.large_mut()?.merge(rhs_large);
                Ok(())
            }
        }
    }

    /// Deserialize estimator from `input` into freshly created `CombinedEstimator`
    pub fn read<R: Read + ?Sized>(&mut self, input: &mut R) -> Result<()> {
        match self.representation()? {
            Representation::Small(small) if small.is_empty() => {}
            _ => {
                return Err(EstimatorError::Logical(
                    "read is only allowed into empty estimator",
                ))
            }
        }
        let container_type = read_container_type(input)?;
        self.promote_to(container_type)?;
        match self.representation_mut()? {
            RepresentationMut::Small(small) => small.read(input),
            RepresentationMut::Medium(medium) => medium.read(input, Self::MEDIUM_SET_SIZE_MAX),
            RepresentationMut::Large(large) => large.read(input),
        }
    }

    /// Merge serialized estimator from `input` into `self` without deserializing it first
    pub fn read_and_merge<R: Read + ?Sized>(&mut self, input: &mut R) -> Result<()> {
        let rhs_type = read_container_type(input)?;
        trace!("merging serialized {:?} container", rhs_type);
        self.promote_to(rhs_type)?;
        match rhs_type {
            ContainerType::Small => ElementReader::<K, R>::new(input, S)?
                .try_for_each(|key| self.insert(key?)),
            ContainerType::Medium => ElementReader::<K, R>::new(input, Self::MEDIUM_SET_SIZE_MAX)?
                .try_for_each(|key| self.insert(key?)),
            ContainerType::Large => self.large_mut()?.read_and_merge(input),
        }
    }

    /// Serialize estimator into `out`
    pub fn write<Wr: Write>(&self, out: &mut Wr) -> Result<()> {
        let representation = self.representation()?;
        out.write_u8(representation.container_type() as u8)?;
        representation.write(out)?;
        Ok(())
    }

    /// Serialize estimator into a new byte vector
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write(&mut out)?;
        Ok(out)
    }

    /// Deserialize estimator from `bytes`, which must hold exactly one serialized estimator
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut input = bytes;
        let mut estimator = Self::new();
        estimator.read(&mut input)?;
        if !input.is_empty() {
            return Err(EstimatorError::Malformed(
                "trailing bytes after serialized estimator",
            ));
        }
        Ok(estimator)
    }

    /// Return memory size of `CombinedEstimator`
    pub fn size_of(&self) -> Result<usize> {
        let heap = match self.representation()? {
            Representation::Small(_) => 0,
            representation => representation.size_of(),
        };
        Ok(size_of::<Self>() + heap)
    }
}

/// Read serialized container type tag
#[inline]
fn read_container_type<R: Read + ?Sized>(input: &mut R) -> Result<ContainerType> {
    let tag = input.read_u8()?;
    ContainerType::try_from(tag).map_err(EstimatorError::UnknownContainerType)
}

impl<K: Key, H: Hasher + Default, const S: usize, const M: usize, const P: usize, const W: usize>
    Default for CombinedEstimator<K, H, S, M, P, W>
{
    /// Create default `CombinedEstimator`
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key, H: Hasher + Default, const S: usize, const M: usize, const P: usize, const W: usize>
    Clone for CombinedEstimator<K, H, S, M, P, W>
{
    /// Clone `CombinedEstimator`, heap container is copied into a new tracked allocation
    fn clone(&self) -> Self {
        let mut estimator = Self {
            small: self.small,
            data: ContainerType::Small as usize,
            build_hasher: BuildHasherDefault::default(),
        };
        match self.representation() {
            Ok(Representation::Medium(medium)) => {
                estimator.install(Tracked::new(medium.clone()), ContainerType::Medium)
            }
            Ok(Representation::Large(large)) => {
                estimator.install(Tracked::new(large.clone()), ContainerType::Large)
            }
            _ => {}
        }
        estimator
    }
}

impl<K: Key, H: Hasher + Default, const S: usize, const M: usize, const P: usize, const W: usize>
    Drop for CombinedEstimator<K, H, S, M, P, W>
{
    /// Free memory occupied by `CombinedEstimator`
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<K: Key, H: Hasher + Default, const S: usize, const M: usize, const P: usize, const W: usize>
    PartialEq for CombinedEstimator<K, H, S, M, P, W>
{
    /// Compare estimators by container type and content
    fn eq(&self, rhs: &Self) -> bool {
        match (self.representation(), rhs.representation()) {
            (Ok(Representation::Small(lhs)), Ok(Representation::Small(rhs))) => lhs == rhs,
            (Ok(Representation::Medium(lhs)), Ok(Representation::Medium(rhs))) => lhs == rhs,
            (Ok(Representation::Large(lhs)), Ok(Representation::Large(rhs))) => lhs == rhs,
            _ => false,
        }
    }
}

impl<K: Key, H: Hasher + Default, const S: usize, const M: usize, const P: usize, const W: usize>
    Debug for CombinedEstimator<K, H, S, M, P, W>
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.representation() {
            Ok(representation) => write!(
                f,
                "{{ representation: {:?}, {} }}",
                representation.container_type(),
                representation.to_string()
            ),
            Err(err) => write!(f, "{{ representation: Invalid, error: {} }}", err),
        }
    }
}
