//! Order-preserving hash-consing of profile records.

use indexmap::IndexSet;
use std::hash::Hash;

/// Assigns dense ids to structurally equal records in order of first
/// appearance. Ids are stable for the lifetime of the interner and form
/// the contiguous range `[0, len)`.
#[derive(Clone, Debug)]
pub struct Interner<T> {
    entries: IndexSet<T>,
}

impl<T: Hash + Eq> Interner<T> {
    /// An interner whose id 0 is pre-seeded with the given sentinel,
    /// conventionally the empty/zero record meaning "absent".
    pub fn with_sentinel(sentinel: T) -> Self {
        let mut entries = IndexSet::new();
        entries.insert(sentinel);
        Self { entries }
    }

    pub fn intern(&mut self, record: T) -> u32 {
        let (id, _) = self.entries.insert_full(record);
        id as u32
    }

    pub fn lookup(&self, record: &T) -> Option<u32> {
        self.entries.get_index_of(record).map(|id| id as u32)
    }

    pub fn get(&self, id: u32) -> Option<&T> {
        self.entries.get_index(id as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_stable() {
        let mut strings = Interner::with_sentinel(String::new());
        let foo = strings.intern("foo".to_string());
        let bar = strings.intern("bar".to_string());
        assert_eq!(foo, 1);
        assert_eq!(bar, 2);
        assert_eq!(strings.intern("foo".to_string()), foo);
        assert_eq!(strings.intern(String::new()), 0);
        assert_eq!(strings.len(), 3);

        for id in 0..strings.len() as u32 {
            assert!(strings.get(id).is_some());
        }
        assert_eq!(strings.get(0).map(String::as_str), Some(""));
    }
}
