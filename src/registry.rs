//! Ordered collection of image items.
//!
//! Ids are handed out monotonically, so ordering by id is insertion order.
//! Backed by a `BTreeMap`: ordered iteration for archive assembly, and
//! removal by id in `O(log n)` without shifting positions of other items.

use crate::item::ImageItem;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Stable identity of an item for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct ItemRegistry {
    items: BTreeMap<ItemId, ImageItem>,
    next_id: u64,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next id. Ids are never reused, even after removal.
    pub fn allocate_id(&mut self) -> ItemId {
        let id = ItemId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Insert an item under its own id.
    pub fn insert(&mut self, item: ImageItem) -> ItemId {
        let id = item.id;
        self.items.insert(id, item);
        id
    }

    pub fn remove(&mut self, id: ItemId) -> Option<ImageItem> {
        self.items.remove(&id)
    }

    pub fn get(&self, id: ItemId) -> Option<&ImageItem> {
        self.items.get(&id)
    }

    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut ImageItem> {
        self.items.get_mut(&id)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains_key(&id)
    }

    /// Items in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ImageItem> {
        self.items.values()
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> Vec<ItemId> {
        self.items.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
