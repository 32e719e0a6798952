//! ## Small container
//! Exact set of up to `S` keys stored inline in the estimator, so it never allocates.
//!
//! Lookups are linear scans which is the fastest option for the small `S` values used in practice.
//! The container stays in place after promotion to a heap container, but its content is ignored.

use std::io::{self, Read, Write};
use std::mem::size_of;

use crate::codec::{write_elements, ElementReader, Key};
use crate::error::Result;
use crate::representation::RepresentationTrait;

/// Small representation container
#[derive(Clone, Copy)]
pub(crate) struct SmallSet<K, const S: usize> {
    items: [K; S],
    len: u8,
}

impl<K: Key, const S: usize> SmallSet<K, S> {
    /// Ensure that capacity fits into `u8` length at compile time
    const VALID_CAPACITY: () = assert!(S >= 1 && S <= 255);

    /// Create empty `SmallSet`
    #[inline]
    pub(crate) fn new() -> Self {
        _ = Self::VALID_CAPACITY;

        Self {
            items: [K::default(); S],
            len: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.len() == S
    }

    #[inline]
    pub(crate) fn contains(&self, key: &K) -> bool {
        self.items[..self.len()].contains(key)
    }

    /// Insert key into `SmallSet`.
    /// Returns true if key is present after the call, false if the set is full.
    #[inline]
    pub(crate) fn insert(&mut self, key: K) -> bool {
        if self.contains(&key) {
            return true;
        }
        if self.is_full() {
            return false;
        }
        self.items[self.len()] = key;
        self.len += 1;
        true
    }

    /// Return iterator over stored keys
    #[inline]
    pub(crate) fn iter(&self) -> impl Iterator<Item = K> + '_ {
        self.items[..self.len()].iter().copied()
    }

    /// Replace content with keys decoded from `input`
    pub(crate) fn read<R: Read + ?Sized>(&mut self, input: &mut R) -> Result<()> {
        let reader = ElementReader::<K, R>::new(input, S)?;
        self.len = 0;
        for key in reader {
            // payload length is already validated against capacity
            self.insert(key?);
        }
        Ok(())
    }
}

impl<K: Key, const S: usize> RepresentationTrait for SmallSet<K, S> {
    #[inline]
    fn size(&self) -> usize {
        self.len()
    }

    /// Return memory size of `SmallSet`
    fn size_of(&self) -> usize {
        size_of::<Self>()
    }

    fn write(&self, out: &mut dyn Write) -> io::Result<()> {
        write_elements(self.len(), self.iter(), out)
    }
}

impl<K: Key, const S: usize> PartialEq for SmallSet<K, S> {
    /// Compare as sets, ignoring insertion order
    fn eq(&self, rhs: &Self) -> bool {
        self.len == rhs.len && self.iter().all(|key| rhs.contains(&key))
    }
}
