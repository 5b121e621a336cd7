//! Depth
//!
//! Distance from an entity to the root of an acyclic relationship, kept up
//! to date as pairs change instead of being recomputed on every read

use std::collections::{HashMap, VecDeque};

use crate::{error::DbError, world::World, EntityId};

#[derive(Debug, Default)]
pub struct DepthTracker {
    /// entity to relationship to depth. Roots have no entry
    depths: HashMap<EntityId, HashMap<EntityId, u32>>,
}

impl DepthTracker {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn get(&self, rel: EntityId, entity: EntityId) -> u32 {
        self.depths
            .get(&entity)
            .and_then(|depths| depths.get(&rel))
            .copied()
            .unwrap_or(0)
    }

    /// Stores a depth, returning whether it changed
    pub(crate) fn set(&mut self, rel: EntityId, entity: EntityId, depth: u32) -> bool {
        if depth == 0 {
            let Some(depths) = self.depths.get_mut(&entity) else {
                return false;
            };
            let changed = depths.remove(&rel).is_some();
            if depths.is_empty() {
                self.depths.remove(&entity);
            }
            return changed;
        }
        self.depths.entry(entity).or_default().insert(rel, depth) != Some(depth)
    }

    pub(crate) fn remove_entity(&mut self, entity: EntityId) {
        self.depths.remove(&entity);
    }
}

impl World {
    /// Depth of `entity` under `rel`, zero for entities without a target
    pub fn get_depth(&self, entity: EntityId, rel: EntityId) -> Result<u32, DbError> {
        if !self.is_alive(entity) {
            return Err(DbError::EntityNotAlive(entity));
        }
        if !self.graph.is_acyclic(rel) {
            return Err(DbError::RelationshipNotAcyclic(rel));
        }
        Ok(self.depths.get(rel, entity))
    }

    /// Recomputes the depth of `entity` from its targets and pushes any
    /// change down to its descendants
    pub(crate) fn refresh_depth(&mut self, entity: EntityId, rel: EntityId) {
        let mut queue = VecDeque::from([entity]);
        while let Some(current) = queue.pop_front() {
            let depth = self
                .targets(current, rel)
                .into_iter()
                .map(|target| self.depths.get(rel, target) + 1)
                .max()
                .unwrap_or(0);
            if self.depths.set(rel, current, depth) {
                tracing::trace!(entity = %current, depth, "depth changed");
                queue.extend(self.graph.children(rel, current).iter().copied());
            }
        }
    }
}
