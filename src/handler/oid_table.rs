//! Sorted OID map used for GETNEXT traversal.

use crate::oid::Oid;

/// Values kept in lexicographic OID order.
///
/// The object tree stores its registered handlers here; table objects use it
/// for their materialized cell views.
#[derive(Debug, Clone)]
pub struct OidTable<V> {
    entries: Vec<(Oid, V)>,
}

impl<V> OidTable<V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Insert, replacing any value already stored under `oid`.
    pub fn insert(&mut self, oid: Oid, value: V) -> Option<V> {
        match self.entries.binary_search_by(|(o, _)| o.cmp(&oid)) {
            Ok(idx) => Some(std::mem::replace(&mut self.entries[idx].1, value)),
            Err(idx) => {
                self.entries.insert(idx, (oid, value));
                None
            }
        }
    }

    pub fn remove(&mut self, oid: &Oid) -> Option<V> {
        match self.entries.binary_search_by(|(o, _)| o.cmp(oid)) {
            Ok(idx) => Some(self.entries.remove(idx).1),
            Err(_) => None,
        }
    }

    pub fn get(&self, oid: &Oid) -> Option<&V> {
        match self.entries.binary_search_by(|(o, _)| o.cmp(oid)) {
            Ok(idx) => Some(&self.entries[idx].1),
            Err(_) => None,
        }
    }

    /// First entry strictly after `oid`.
    pub fn get_next(&self, oid: &Oid) -> Option<(&Oid, &V)> {
        let idx = match self.entries.binary_search_by(|(o, _)| o.cmp(oid)) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        };
        self.entries.get(idx).map(|(o, v)| (o, v))
    }

    /// Entries starting at the greatest key `<= oid` (or the first entry).
    ///
    /// When keys are subtree roots, the first yielded entry is the only one
    /// that can contain `oid`; everything after sorts strictly later.
    pub fn iter_from(&self, oid: &Oid) -> impl Iterator<Item = (&Oid, &V)> {
        let start = match self.entries.binary_search_by(|(o, _)| o.cmp(oid)) {
            Ok(idx) => idx,
            Err(idx) => idx.saturating_sub(1),
        };
        self.entries[start..].iter().map(|(o, v)| (o, v))
    }

    /// The entry whose key is a prefix of `oid`, if any.
    pub fn find_containing(&self, oid: &Oid) -> Option<(&Oid, &V)> {
        self.iter_from(oid)
            .next()
            .filter(|(root, _)| oid.starts_with(root))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Oid, &V)> {
        self.entries.iter().map(|(o, v)| (o, v))
    }
}

impl<V> Default for OidTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> FromIterator<(Oid, V)> for OidTable<V> {
    fn from_iter<I: IntoIterator<Item = (Oid, V)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (oid, value) in iter {
            table.insert(oid, value);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;

    fn sample() -> OidTable<&'static str> {
        [
            (oid!(1, 3, 6, 1, 4, 1, 99, 3), "table"),
            (oid!(1, 3, 6, 1, 4, 1, 99, 1), "first"),
            (oid!(1, 3, 6, 1, 4, 1, 99, 2), "second"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_insert_keeps_order_and_replaces() {
        let mut table = sample();
        assert_eq!(table.insert(oid!(1, 3, 6, 1, 4, 1, 99, 2), "again"), Some("second"));
        assert_eq!(table.len(), 3);
        let keys: Vec<_> = table.iter().map(|(o, _)| o.clone()).collect();
        assert_eq!(
            keys,
            vec![
                oid!(1, 3, 6, 1, 4, 1, 99, 1),
                oid!(1, 3, 6, 1, 4, 1, 99, 2),
                oid!(1, 3, 6, 1, 4, 1, 99, 3)
            ]
        );
    }

    #[test]
    fn test_get_next() {
        let table = sample();
        assert_eq!(table.get_next(&oid!(1, 3, 6, 1)).unwrap().1, &"first");
        assert_eq!(table.get_next(&oid!(1, 3, 6, 1, 4, 1, 99, 1)).unwrap().1, &"second");
        assert_eq!(table.get_next(&oid!(1, 3, 6, 1, 4, 1, 99, 1, 0)).unwrap().1, &"second");
        assert!(table.get_next(&oid!(1, 3, 6, 1, 4, 1, 99, 3)).is_none());
    }

    #[test]
    fn test_iter_from_starts_at_containing_root() {
        let table = sample();
        let from: Vec<_> = table
            .iter_from(&oid!(1, 3, 6, 1, 4, 1, 99, 2, 5, 1))
            .map(|(_, v)| *v)
            .collect();
        assert_eq!(from, vec!["second", "table"]);

        let from: Vec<_> = table.iter_from(&oid!(1, 3)).map(|(_, v)| *v).collect();
        assert_eq!(from.len(), 3);
    }

    #[test]
    fn test_find_containing() {
        let table = sample();
        let (root, value) = table.find_containing(&oid!(1, 3, 6, 1, 4, 1, 99, 3, 1, 2)).unwrap();
        assert_eq!(root, &oid!(1, 3, 6, 1, 4, 1, 99, 3));
        assert_eq!(value, &"table");
        assert!(table.find_containing(&oid!(1, 3, 6, 1, 4, 1, 99, 4)).is_none());
        assert!(table.find_containing(&oid!(1, 3, 6, 1, 4, 1, 98)).is_none());
    }

    #[test]
    fn test_remove() {
        let mut table = sample();
        assert_eq!(table.remove(&oid!(1, 3, 6, 1, 4, 1, 99, 1)), Some("first"));
        assert_eq!(table.remove(&oid!(1, 3, 6, 1, 4, 1, 99, 1)), None);
        assert_eq!(table.len(), 2);
        table.clear();
        assert!(table.is_empty());
    }
}
