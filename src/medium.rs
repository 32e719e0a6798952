//! ## Medium container
//! Exact heap allocated hash set, used once the small container overflows and until it holds
//! `2^M` keys. Keys are hashed with the estimator's hasher `H`.

use std::hash::{BuildHasherDefault, Hasher};
use std::io::{self, Read, Write};
use std::mem::size_of;

use hashbrown::HashSet;

use crate::codec::{write_elements, ElementReader, Key};
use crate::error::Result;
use crate::representation::RepresentationTrait;

/// Medium representation container
pub(crate) struct MediumSet<K, H> {
    set: HashSet<K, BuildHasherDefault<H>>,
}

impl<K: Key, H: Hasher + Default> MediumSet<K, H> {
    /// Create empty `MediumSet`
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            set: HashSet::with_hasher(BuildHasherDefault::default()),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.set.len()
    }

    #[inline]
    pub(crate) fn contains(&self, key: &K) -> bool {
        self.set.contains(key)
    }

    /// Insert key, returns whether it was not present before
    #[inline]
    pub(crate) fn insert(&mut self, key: K) -> bool {
        self.set.insert(key)
    }

    /// Return iterator over stored keys in unspecified order
    #[inline]
    pub(crate) fn iter(&self) -> impl Iterator<Item = K> + '_ {
        self.set.iter().copied()
    }

    /// Replace content with keys decoded from `input`, rejecting payloads above `capacity` keys
    pub(crate) fn read<R: Read + ?Sized>(&mut self, input: &mut R, capacity: usize) -> Result<()> {
        let reader = ElementReader::<K, R>::new(input, capacity)?;
        self.set.clear();
        self.set.reserve(reader.remaining());
        for key in reader {
            self.set.insert(key?);
        }
        Ok(())
    }
}

impl<K: Key, H: Hasher + Default> RepresentationTrait for MediumSet<K, H> {
    #[inline]
    fn size(&self) -> usize {
        self.set.len()
    }

    /// Return approximate memory size of `MediumSet`: table slots plus one control byte per slot
    fn size_of(&self) -> usize {
        size_of::<Self>() + self.set.capacity() * (size_of::<K>() + 1)
    }

    fn write(&self, out: &mut dyn Write) -> io::Result<()> {
        write_elements(self.set.len(), self.iter(), out)
    }
}

impl<K: Key, H: Hasher + Default> Clone for MediumSet<K, H> {
    fn clone(&self) -> Self {
        Self {
            set: self.set.clone(),
        }
    }
}

impl<K: Key, H: Hasher + Default> PartialEq for MediumSet<K, H> {
    fn eq(&self, rhs: &Self) -> bool {
        self.set == rhs.set
    }
}
