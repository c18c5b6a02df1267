use alloc::{collections::BTreeMap, vec::Vec};
use core::fmt;

/// A point-in-time view of a registry's free blocks.
///
/// Size classes are listed in ascending order, and the free addresses within
/// each class are listed in ascending order. Classes with no free blocks are
/// omitted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    classes: BTreeMap<usize, Vec<usize>>,
}

impl Snapshot {
    pub(crate) fn from_classes(classes: BTreeMap<usize, Vec<usize>>) -> Snapshot {
        debug_assert!(classes.values().all(|addrs| !addrs.is_empty()));

        Snapshot { classes }
    }

    /// Returns the free addresses of the given size class, if any.
    pub fn get(&self, size: usize) -> Option<&[usize]> {
        self.classes.get(&size).map(Vec::as_slice)
    }

    /// Iterates over `(size class, free addresses)` pairs in ascending order
    /// of size class.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[usize])> + '_ {
        self.classes
            .iter()
            .map(|(&size, addrs)| (size, addrs.as_slice()))
    }

    /// Returns `true` if there are no free blocks at all.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Returns the total number of free blocks.
    pub fn num_blocks(&self) -> usize {
        self.classes.values().map(Vec::len).sum()
    }

    /// Returns the total size of all free blocks.
    pub fn free_bytes(&self) -> usize {
        self.iter().map(|(size, addrs)| size * addrs.len()).sum()
    }

    /// Consumes the snapshot, returning the underlying map.
    pub fn into_map(self) -> BTreeMap<usize, Vec<usize>> {
        self.classes
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (size, addrs) in self.iter() {
            writeln!(f, "size {size}: {addrs:?}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::{prelude::rust_2021::*, vec};

    use super::*;

    fn sample() -> Snapshot {
        let mut classes = BTreeMap::new();
        classes.insert(32, vec![0]);
        classes.insert(16, vec![48]);
        Snapshot::from_classes(classes)
    }

    #[test]
    fn iterates_in_ascending_order() {
        let snap = sample();
        let classes: Vec<usize> = snap.iter().map(|(size, _)| size).collect();

        assert_eq!(classes, [16, 32]);
        assert_eq!(snap.get(16), Some(&[48][..]));
        assert_eq!(snap.get(64), None);
        assert_eq!(snap.num_blocks(), 2);
        assert_eq!(snap.free_bytes(), 48);
    }

    #[test]
    fn display_lists_one_class_per_line() {
        assert_eq!(sample().to_string(), "size 16: [48]\nsize 32: [0]\n");
        assert_eq!(Snapshot::default().to_string(), "");
    }
}
