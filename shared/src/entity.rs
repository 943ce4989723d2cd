use log::debug;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::hash::Hash;
use crate::point::Point;

/// Anything with a stable identity and a tile position.
pub trait Entity {
    fn id(&self) -> Hash;
    fn location(&self) -> Point;
}

/// Keyed entity collection that records what was added, removed and updated
/// since the last `reset`.
///
/// Updates are flagged explicitly through [`EntityList::update`] or
/// [`EntityList::mark_updated`]. The owner must drain the three diff sets
/// before calling `reset`, once per tick.
#[derive(Debug, Clone)]
pub struct EntityList<T: Entity> {
    live: BTreeMap<Hash, T>,
    added: BTreeSet<Hash>,
    removed: BTreeSet<Hash>,
    updated: BTreeSet<Hash>,
}

impl<T: Entity> Default for EntityList<T> {
    fn default() -> Self {
        Self {
            live: BTreeMap::new(),
            added: BTreeSet::new(),
            removed: BTreeSet::new(),
            updated: BTreeSet::new(),
        }
    }
}

impl<T: Entity> EntityList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false without touching anything if the id is already live.
    pub fn add(&mut self, entity: T) -> bool {
        let id = entity.id();
        if self.live.contains_key(&id) {
            return false;
        }

        // Removed and re-added within one window: observers still know it,
        // so report a change rather than a fresh arrival.
        if self.removed.remove(&id) {
            self.updated.insert(id);
        } else {
            self.added.insert(id);
        }

        self.live.insert(id, entity);
        debug!("Added entity: {}", id);
        true
    }

    pub fn remove(&mut self, id: &Hash) -> Option<T> {
        let entity = self.live.remove(id)?;
        self.updated.remove(id);

        if !self.added.remove(id) {
            self.removed.insert(*id);
        }

        debug!("Removed entity: {}", id);
        Some(entity)
    }

    pub fn get(&self, id: &Hash) -> Option<&T> {
        self.live.get(id)
    }

    /// Mutable access without flagging an update.
    pub fn get_mut(&mut self, id: &Hash) -> Option<&mut T> {
        self.live.get_mut(id)
    }

    /// Mutates a live entity and flags it as updated.
    pub fn update<R>(&mut self, id: &Hash, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let entity = self.live.get_mut(id)?;
        let result = f(entity);
        self.updated.insert(*id);
        Some(result)
    }

    /// Flags a live entity as updated. Repeats collapse.
    pub fn mark_updated(&mut self, id: &Hash) -> bool {
        if self.live.contains_key(id) {
            self.updated.insert(*id);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, id: &Hash) -> bool {
        self.live.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Snapshot of the live ids, safe to hold while adding or removing.
    pub fn ids(&self) -> Vec<Hash> {
        self.live.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.live.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.live.values_mut()
    }

    pub fn has_new_entities(&self) -> bool {
        !self.added.is_empty()
    }

    pub fn new_entities(&self) -> impl Iterator<Item = &T> {
        self.added.iter().filter_map(|id| self.live.get(id))
    }

    pub fn has_removed_entities(&self) -> bool {
        !self.removed.is_empty()
    }

    /// Removed entities are no longer held, so only their ids are reported.
    pub fn removed_ids(&self) -> impl Iterator<Item = &Hash> {
        self.removed.iter()
    }

    pub fn has_updated_entities(&self) -> bool {
        !self.updated.is_empty()
    }

    pub fn updated_entities(&self) -> impl Iterator<Item = &T> {
        self.updated.iter().filter_map(|id| self.live.get(id))
    }

    pub fn is_new(&self, id: &Hash) -> bool {
        self.added.contains(id)
    }

    pub fn is_removed(&self, id: &Hash) -> bool {
        self.removed.contains(id)
    }

    pub fn is_updated(&self, id: &Hash) -> bool {
        self.updated.contains(id)
    }

    pub fn reset(&mut self) {
        self.added.clear();
        self.removed.clear();
        self.updated.clear();
    }
}

impl<T: Entity> fmt::Display for EntityList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entities[live = {}, new = {}, removed = {}, updated = {}]",
            self.live.len(),
            self.added.len(),
            self.removed.len(),
            self.updated.len()
        )
    }
}
