//! Relationships
//!
//! Pairs live in the id sets of tables. This module keeps the reverse index
//! from `(relationship, target)` to the entities holding that pair, and
//! answers target queries for both ordinary and flattened rows

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::{
    components::Id,
    entity::EntityRecord,
    error::DbError,
    guard::{self, Operation},
    table::Table,
    world::World,
    EntityId,
};

#[derive(Debug, Default)]
pub struct RelationshipGraph {
    /// `(relationship, target)` to the entities holding that pair
    children: HashMap<(EntityId, EntityId), Vec<EntityId>>,
    /// target to every relationship pointing at it
    incoming: HashMap<EntityId, BTreeSet<EntityId>>,

    acyclic: HashSet<EntityId>,
    exclusive: HashSet<EntityId>,
    cascade: HashSet<EntityId>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Default::default()
    }

    pub(crate) fn insert(&mut self, rel: EntityId, target: EntityId, source: EntityId) {
        let sources = self.children.entry((rel, target)).or_default();
        if !sources.contains(&source) {
            sources.push(source);
        }
        self.incoming.entry(target).or_default().insert(rel);
    }

    pub(crate) fn remove(&mut self, rel: EntityId, target: EntityId, source: EntityId) {
        let Some(sources) = self.children.get_mut(&(rel, target)) else {
            return;
        };
        sources.retain(|s| *s != source);
        if sources.is_empty() {
            self.children.remove(&(rel, target));
            if let Some(rels) = self.incoming.get_mut(&target) {
                rels.remove(&rel);
                if rels.is_empty() {
                    self.incoming.remove(&target);
                }
            }
        }
    }

    /// Drops every pair pointing at `target`
    pub(crate) fn forget_target(&mut self, target: EntityId) {
        if let Some(rels) = self.incoming.remove(&target) {
            for rel in rels {
                self.children.remove(&(rel, target));
            }
        }
    }

    /// Entities holding `(rel, target)`, in the order they gained it
    pub fn children(&self, rel: EntityId, target: EntityId) -> &[EntityId] {
        self.children
            .get(&(rel, target))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn relationships_targeting(&self, target: EntityId) -> Vec<EntityId> {
        self.incoming
            .get(&target)
            .map(|rels| rels.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every entity holding a pair of `rel`
    pub(crate) fn sources(&self, rel: EntityId) -> Vec<EntityId> {
        self.children
            .iter()
            .filter(|((r, _), _)| *r == rel)
            .flat_map(|(_, sources)| sources.iter().copied())
            .collect()
    }

    pub fn is_acyclic(&self, rel: EntityId) -> bool {
        self.acyclic.contains(&rel)
    }

    pub fn is_exclusive(&self, rel: EntityId) -> bool {
        self.exclusive.contains(&rel)
    }

    /// Whether deleting a target deletes the entities pointing at it
    pub fn deletes_with(&self, rel: EntityId) -> bool {
        self.cascade.contains(&rel)
    }

    pub(crate) fn mark_acyclic(&mut self, rel: EntityId) {
        self.acyclic.insert(rel);
    }

    pub(crate) fn mark_exclusive(&mut self, rel: EntityId) {
        self.exclusive.insert(rel);
    }

    pub(crate) fn mark_cascade(&mut self, rel: EntityId) {
        self.cascade.insert(rel);
    }
}

/// Targets of `rel` for the entity at `record`, in canonical id order. A
/// flattened row reports its real parent in place of the root pair
pub(crate) fn logical_targets(tables: &[Table], record: EntityRecord, rel: EntityId) -> Vec<EntityId> {
    let table = &tables[record.table.index()];
    match table.fixed_layout() {
        Some(layout) if layout.relationship == rel => {
            let mut targets: Vec<EntityId> = table.ids().targets(rel).filter(|t| *t != layout.root).collect();
            targets.extend(table.target(record.row).filter(|target| !target.is_null()));
            targets.sort_unstable();
            targets.dedup();
            targets
        }
        _ => table.ids().targets(rel).collect(),
    }
}

/// Every `(relationship, target)` pair of the entity at `record`, with the
/// flattened root pair replaced by the real parent
pub(crate) fn logical_pairs(tables: &[Table], record: EntityRecord) -> Vec<(EntityId, EntityId)> {
    let table = &tables[record.table.index()];
    let fixed = table.fixed_layout();
    let mut pairs: Vec<(EntityId, EntityId)> = table
        .ids()
        .iter()
        .filter_map(Id::as_pair)
        .filter(|(rel, target)| fixed.map_or(true, |l| l.relationship != *rel || l.root != *target))
        .collect();
    if let Some(layout) = fixed {
        if let Some(target) = table.target(record.row).filter(|t| !t.is_null()) {
            pairs.push((layout.relationship, target));
            pairs.sort_unstable();
            pairs.dedup();
        }
    }
    pairs
}

impl World {
    /// Adds `(rel, target)` to `entity`. An exclusive relationship replaces
    /// the previous target
    pub fn add_pair(&mut self, entity: EntityId, rel: EntityId, target: EntityId) -> Result<(), DbError> {
        guard::check_structural(self, entity, Operation::AddPair);
        if self.is_deferred() {
            self.enqueue(move |world| world.add_pair(entity, rel, target));
            return Ok(());
        }
        let record = self.record(entity)?;
        for e in [rel, target] {
            if !self.is_alive(e) {
                return Err(DbError::EntityNotAlive(e));
            }
        }
        let id = Id::pair(rel, target);
        if self.tables[record.table.index()].ids().contains(&id) {
            return Ok(());
        }
        if self.graph.is_acyclic(rel) && self.would_cycle(entity, rel, target) {
            tracing::debug!(%entity, %rel, %target, "rejected pair that would form a cycle");
            return Err(DbError::CyclicRelationship { entity, target });
        }

        let mut dest = record.table;
        if self.graph.is_exclusive(rel) {
            let previous: Vec<EntityId> = self.tables[record.table.index()].ids().targets(rel).collect();
            for old in previous {
                dest = self.table_without(dest, Id::pair(rel, old))?;
            }
        }
        let dest = self.table_with(dest, id)?;
        self.commit_move(entity, dest)
    }

    pub fn remove_pair(&mut self, entity: EntityId, rel: EntityId, target: EntityId) -> Result<(), DbError> {
        guard::check_structural(self, entity, Operation::RemovePair);
        if self.is_deferred() {
            self.enqueue(move |world| world.remove_pair(entity, rel, target));
            return Ok(());
        }
        let record = self.record(entity)?;
        let id = Id::pair(rel, target);
        if !self.tables[record.table.index()].ids().contains(&id) {
            return Ok(());
        }
        let dest = self.table_without(record.table, id)?;
        self.commit_move(entity, dest)
    }

    pub fn has_pair(&self, entity: EntityId, rel: EntityId, target: EntityId) -> bool {
        self.targets(entity, rel).contains(&target)
    }

    /// The `index`th target of `rel` on `entity`, counted in canonical id
    /// order. Flattening doesn't change the answer
    pub fn get_target(&self, entity: EntityId, rel: EntityId, index: usize) -> Option<EntityId> {
        self.targets(entity, rel).get(index).copied()
    }

    pub fn targets(&self, entity: EntityId, rel: EntityId) -> Vec<EntityId> {
        match self.entities.record(entity) {
            Some(record) => logical_targets(&self.tables, record, rel),
            None => Vec::new(),
        }
    }

    /// Entities holding `(rel, entity)`
    pub fn children(&self, entity: EntityId, rel: EntityId) -> &[EntityId] {
        self.graph.children(rel, entity)
    }

    /// Declares `rel` acyclic: cycles are rejected and depth is tracked
    pub fn mark_acyclic(&mut self, rel: EntityId) {
        if self.graph.is_acyclic(rel) {
            return;
        }
        self.graph.mark_acyclic(rel);
        for source in self.graph.sources(rel) {
            self.refresh_depth(source, rel);
        }
    }

    /// Whether `target` is `entity` or one of its descendants under `rel`
    fn would_cycle(&self, entity: EntityId, rel: EntityId, target: EntityId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![target];
        while let Some(current) = stack.pop() {
            if current == entity {
                return true;
            }
            if visited.insert(current) {
                stack.extend(self.targets(current, rel));
            }
        }
        false
    }
}
