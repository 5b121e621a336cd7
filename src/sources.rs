//! Sources
//!
//! Caches the ancestor a term reads its value from. Every entry remembers
//! the entities its walk passed through and is dropped as soon as one of
//! them changes table, loses its parent or is deleted. Changes anywhere else
//! in the world leave the entry alone

use std::collections::HashSet;

use dashmap::DashMap;

use crate::{components::ComponentType, world::World, EntityId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SourceKey {
    pub start: EntityId,
    pub rel: EntityId,
    pub ty: ComponentType,
}

#[derive(Debug, Default)]
pub(crate) struct SourceCache {
    entries: DashMap<SourceKey, Option<EntityId>>,
    /// entity to the entries whose walk passed through it
    dependents: DashMap<EntityId, Vec<SourceKey>>,
}

impl SourceCache {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &SourceKey) -> Option<Option<EntityId>> {
        self.entries.get(key).map(|entry| *entry)
    }

    pub fn insert(&self, key: SourceKey, source: Option<EntityId>, chain: &[EntityId]) {
        for entity in chain {
            let mut keys = self.dependents.entry(*entity).or_default();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        self.entries.insert(key, source);
    }

    /// Drops every entry that walked through `entity`, returning how many
    pub fn invalidate(&self, entity: EntityId) -> usize {
        let Some((_, keys)) = self.dependents.remove(&entity) else {
            return 0;
        };
        let dropped = keys
            .iter()
            .filter(|key| self.entries.remove(key).is_some())
            .count();
        if dropped > 0 {
            tracing::trace!(%entity, dropped, "invalidated cached sources");
        }
        dropped
    }
}

impl World {
    /// Nearest entity from `start` upward along `rel` that has `ty`,
    /// `start` included
    pub fn source_of(&self, start: EntityId, rel: EntityId, ty: ComponentType) -> Option<EntityId> {
        let key = SourceKey { start, rel, ty };
        if let Some(source) = self.source_cache.get(&key) {
            return source;
        }

        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(start);
        let source = loop {
            let Some(entity) = current else {
                break None;
            };
            if !visited.insert(entity) {
                break None;
            }
            chain.push(entity);
            if self.type_of(entity).map_or(false, |ids| ids.has_component(&ty)) {
                break Some(entity);
            }
            current = self.get_target(entity, rel, 0);
        };
        tracing::trace!(%start, component = %ty, ?source, walked = chain.len(), "resolved source");
        self.source_cache.insert(key, source, &chain);
        source
    }
}
