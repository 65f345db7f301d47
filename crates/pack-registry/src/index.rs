use std::collections::BTreeMap;
use std::sync::Arc;

use crate::pack::Pack;

/// Immutable snapshot of every pack found by one scan, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Index {
    packs: BTreeMap<String, Arc<Pack>>,
}

impl Index {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an index from packs in scan order; later packs replace earlier
    /// ones with the same name.
    pub fn from_packs(packs: impl IntoIterator<Item = Pack>) -> Self {
        let mut index = Self::default();
        for pack in packs {
            index.insert(pack);
        }
        index
    }

    /// Insert during construction, returning the pack this one displaced.
    pub(crate) fn insert(&mut self, pack: Pack) -> Option<Arc<Pack>> {
        self.packs.insert(pack.name.clone(), Arc::new(pack))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Pack>> {
        self.packs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packs.contains_key(name)
    }

    /// Packs ordered by name.
    pub fn packs(&self) -> impl Iterator<Item = &Arc<Pack>> {
        self.packs.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.packs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }

    /// Compare against the index this one replaces.
    pub fn diff(&self, previous: &Index) -> IndexDiff {
        let mut diff = IndexDiff::default();
        for (name, pack) in &self.packs {
            match previous.packs.get(name) {
                None => diff.added.push(name.clone()),
                Some(old)
                    if old.fingerprint != pack.fingerprint
                        || old.source_path != pack.source_path =>
                {
                    diff.changed.push(name.clone())
                }
                Some(_) => {}
            }
        }
        diff.removed = previous
            .packs
            .keys()
            .filter(|name| !self.packs.contains_key(*name))
            .cloned()
            .collect();
        diff
    }
}

/// Names that differ between two consecutive indexes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

impl IndexDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}
