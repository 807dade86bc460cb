//! Per-kind entity index
//!
//! A `DashMap` keyed by ID. Every write is an atomic read-merge-write on
//! one shard entry, so unrelated IDs never contend and two writers on the
//! same ID are serialized without a table-wide lock.
//!
//! Each entry carries a revision stamp that every write advances. A
//! hydration records the stamp when its lookup starts; if the entry was
//! written in the meantime, the late response may only fill gaps.

use std::sync::atomic::{AtomicU64, Ordering};

use chat_core::{Entity, Snowflake};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Result of an upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert<E> {
    /// First time this ID was merged
    Created(E),
    /// The ID was already known; `before` is the state prior to the merge
    Updated { before: E, after: E },
}

impl<E> Upsert<E> {
    /// Entity state after the merge
    pub fn entity(&self) -> &E {
        match self {
            Self::Created(e) | Self::Updated { after: e, .. } => e,
        }
    }

    pub fn into_entity(self) -> E {
        match self {
            Self::Created(e) | Self::Updated { after: e, .. } => e,
        }
    }

    #[inline]
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Stored record plus whether a creation has been reported for it.
///
/// Shells made by `get_or_create` are not announced; the first upsert
/// that merges real data into them is.
#[derive(Debug, Clone)]
struct Slot<E> {
    entity: E,
    announced: bool,
    revision: u64,
}

/// How an upsert folds its payload into an existing record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeMode {
    Overwrite,
    FillGaps,
}

/// Concurrent index for one entity kind
pub struct EntityStore<E: Entity> {
    entries: DashMap<Snowflake, Slot<E>>,
    /// Source of revision stamps; never reused, even across removals
    clock: AtomicU64,
}

impl<E: Entity> EntityStore<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            clock: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Stamp of the last write to this ID, if it is cached
    pub fn revision(&self, id: Snowflake) -> Option<u64> {
        self.entries.get(&id).map(|slot| slot.revision)
    }

    /// Copy of the cached entity
    pub fn get(&self, id: Snowflake) -> Option<E> {
        self.entries.get(&id).map(|slot| slot.entity.clone())
    }

    pub fn contains(&self, id: Snowflake) -> bool {
        self.entries.contains_key(&id)
    }

    /// Cached entity, or a freshly inserted shell if absent.
    ///
    /// The flag is true when the shell was created by this call.
    pub fn get_or_create(&self, id: Snowflake, parent_id: Option<Snowflake>) -> (E, bool) {
        match self.entries.entry(id) {
            Entry::Occupied(slot) => (slot.get().entity.clone(), false),
            Entry::Vacant(vacant) => {
                let entity = E::shell(id, parent_id);
                vacant.insert(Slot {
                    entity: entity.clone(),
                    announced: false,
                    revision: self.tick(),
                });
                (entity, true)
            }
        }
    }

    /// Merge `partial` into the entity with this ID, creating it if needed
    pub fn upsert(
        &self,
        id: Snowflake,
        parent_id: Option<Snowflake>,
        partial: &E::Partial,
    ) -> Upsert<E> {
        self.write(id, parent_id, partial, |_| MergeMode::Overwrite)
    }

    /// Merge a lookup response that started when the entry stood at
    /// revision `seen` (`None`: not cached then).
    ///
    /// An entry written since then is only filled, never overwritten. An
    /// entry removed since then stays removed and `None` is returned.
    pub fn upsert_hydrated(
        &self,
        id: Snowflake,
        parent_id: Option<Snowflake>,
        partial: &E::Partial,
        seen: Option<u64>,
    ) -> Option<Upsert<E>> {
        if seen.is_some() && !self.entries.contains_key(&id) {
            return None;
        }
        Some(self.write(id, parent_id, partial, |current| {
            if current == seen {
                MergeMode::Overwrite
            } else {
                MergeMode::FillGaps
            }
        }))
    }

    fn write<F>(
        &self,
        id: Snowflake,
        parent_id: Option<Snowflake>,
        partial: &E::Partial,
        mode: F,
    ) -> Upsert<E>
    where
        F: FnOnce(Option<u64>) -> MergeMode,
    {
        match self.entries.entry(id) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                let before = slot.entity.clone();
                match mode(Some(slot.revision)) {
                    MergeMode::Overwrite => {
                        if let Some(parent_id) = parent_id {
                            slot.entity.attach(parent_id);
                        }
                        slot.entity.merge(partial);
                    }
                    MergeMode::FillGaps => {
                        if slot.entity.parent_id().is_none() {
                            if let Some(parent_id) = parent_id {
                                slot.entity.attach(parent_id);
                            }
                        }
                        slot.entity.fill(partial);
                    }
                }
                slot.revision = self.tick();

                if std::mem::replace(&mut slot.announced, true) {
                    Upsert::Updated {
                        before,
                        after: slot.entity.clone(),
                    }
                } else {
                    Upsert::Created(slot.entity.clone())
                }
            }
            Entry::Vacant(vacant) => {
                let mut entity = E::shell(id, parent_id);
                match mode(None) {
                    MergeMode::Overwrite => entity.merge(partial),
                    MergeMode::FillGaps => entity.fill(partial),
                }
                vacant.insert(Slot {
                    entity: entity.clone(),
                    announced: true,
                    revision: self.tick(),
                });
                Upsert::Created(entity)
            }
        }
    }

    /// Mutate a cached entity in place. Does not count as an upsert.
    pub fn modify<F>(&self, id: Snowflake, f: F) -> Option<E>
    where
        F: FnOnce(&mut E),
    {
        self.entries.get_mut(&id).map(|mut slot| {
            f(&mut slot.entity);
            slot.revision = self.tick();
            slot.entity.clone()
        })
    }

    /// Remove and return the entity, if present
    pub fn remove(&self, id: Snowflake) -> Option<E> {
        self.entries.remove(&id).map(|(_, slot)| slot.entity)
    }

    /// First entity matching the predicate
    pub fn find<P>(&self, predicate: P) -> Option<E>
    where
        P: Fn(&E) -> bool,
    {
        self.entries
            .iter()
            .find(|entry| predicate(&entry.value().entity))
            .map(|entry| entry.value().entity.clone())
    }

    /// All entities matching the predicate
    pub fn filter<P>(&self, predicate: P) -> Vec<E>
    where
        P: Fn(&E) -> bool,
    {
        self.entries
            .iter()
            .filter(|entry| predicate(&entry.value().entity))
            .map(|entry| entry.value().entity.clone())
            .collect()
    }

    /// Copy of every cached entity
    pub fn all(&self) -> Vec<E> {
        self.entries
            .iter()
            .map(|entry| entry.value().entity.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<E: Entity> Default for EntityStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> std::fmt::Debug for EntityStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("kind", &E::KIND)
            .field("len", &self.entries.len())
            .finish()
    }
}
